use crate::grading::Grade;
use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, optional_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, Filters, SortKey, SortSpec, ALL};
use serde_json::{json, Value};

fn is_all(s: &str) -> bool {
    s.trim().is_empty() || s.trim().eq_ignore_ascii_case(ALL)
}

/// Bounds arrive as typed text or numbers; blank means unset.
fn parse_bound(raw: Option<&Value>) -> Result<Option<f64>, HandlerErr> {
    let bad = || HandlerErr::new("bad_params", "Min/Max averages must be numeric.");
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or_else(bad),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(bad),
        Some(_) => Err(bad()),
    }
}

fn parse_filters(raw: Option<&Value>) -> Result<Filters, HandlerErr> {
    let Some(obj) = raw.and_then(|v| v.as_object()) else {
        return Ok(Filters::default());
    };
    let class = obj
        .get("class")
        .and_then(|v| v.as_str())
        .filter(|s| !is_all(s))
        .map(|s| s.trim().to_string());
    let grade = match obj.get("grade").and_then(|v| v.as_str()) {
        Some(g) if !is_all(g) => match Grade::parse(g) {
            Some(Grade::NotAvailable) | None => {
                return Err(HandlerErr::new("bad_params", "grade must be one of: All, A, B, C")
                    .with_details(json!({ "grade": g })))
            }
            Some(g) => Some(g),
        },
        _ => None,
    };
    Ok(Filters {
        class,
        grade,
        min_average: parse_bound(obj.get("minAverage"))?,
        max_average: parse_bound(obj.get("maxAverage"))?,
    })
}

fn parse_sort(raw: Option<&Value>) -> Result<SortSpec, HandlerErr> {
    let Some(obj) = raw.and_then(|v| v.as_object()) else {
        return Ok(SortSpec::default());
    };
    let key = match obj.get("key").and_then(|v| v.as_str()) {
        None => SortKey::default(),
        Some(k) => SortKey::parse(k).ok_or_else(|| {
            HandlerErr::new("bad_params", "sort key must be one of: UID, Name, Class, Average")
                .with_details(json!({ "key": k }))
        })?,
    };
    let ascending = obj
        .get("ascending")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    Ok(SortSpec { key, ascending })
}

fn handle_query(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    db_conn(state)?;
    let search = optional_str(req, "search");
    let filters = parse_filters(req.params.get("filters"))?;
    let sort = parse_sort(req.params.get("sort"))?;

    let rows = roster::query(&state.students, search, &filters, sort);
    Ok(json!({
        "rows": rows,
        "total": state.students.len(),
        "classOptions": roster::class_options(&state.students),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "roster.query" => handle_query(state, req),
        "roster.classes" => db_conn(state)
            .map(|_| json!({ "classes": roster::class_options(&state.students) })),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
