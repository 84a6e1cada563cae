use serde_json::{json, Value};

pub fn ok(id: &str, result: Value) -> Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

fn error_body(code: &str, message: String, details: Option<Value>) -> Value {
    let mut error = json!({
        "code": code,
        "message": message,
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    error
}

pub fn err(id: &str, code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    json!({
        "id": id,
        "ok": false,
        "error": error_body(code, message.into(), details),
    })
}

/// Reply to a line that did not parse as a request; there is no id to echo.
pub fn bad_json(message: impl Into<String>) -> Value {
    json!({
        "ok": false,
        "error": error_body("bad_json", message.into(), None),
    })
}
