use crate::export;
use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use std::path::PathBuf;

pub const DEFAULT_CSV_NAME: &str = "students_export.csv";

fn handle_export_csv(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    db_conn(state)?;
    let out_path = PathBuf::from(required_str(req, "outPath")?);
    if state.students.is_empty() {
        return Err(HandlerErr::new("no_students", "No students to export."));
    }
    let rows = export::export_csv(&state.students, &out_path).map_err(|e| {
        HandlerErr::new("export_failed", format!("{e:#}"))
            .with_details(json!({ "path": out_path.to_string_lossy() }))
    })?;
    Ok(json!({
        "ok": true,
        "rowsExported": rows,
        "path": out_path.to_string_lossy(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "export.csv" => Some(match handle_export_csv(state, req) {
            Ok(v) => ok(&req.id, v),
            Err(e) => e.response(&req.id),
        }),
        "export.csvDefaultName" => Some(ok(&req.id, json!({ "fileName": DEFAULT_CSV_NAME }))),
        _ => None,
    }
}
