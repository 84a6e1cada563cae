use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;
use std::path::{Path, PathBuf};

/// Opens `path` as the active workspace, reconciling and closing any
/// workspace that was open before.
pub fn open_workspace(state: &mut AppState, path: &Path) -> Result<usize, HandlerErr> {
    if state.db.is_some() {
        state.close()?;
    }
    let conn = db::open_db(path)
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{e:#}")))?;
    let students = store::load_students(&conn)?;
    let count = students.len();

    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    state.students = students;
    tracing::info!(workspace = %path.display(), students = count, "workspace opened");
    Ok(count)
}

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "studentCount": state.students.len(),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match required_str(req, "path") {
        Ok(v) => PathBuf::from(v),
        Err(_) => return err(&req.id, "bad_params", "missing params.path", None),
    };

    match open_workspace(state, &path) {
        Ok(count) => ok(
            &req.id,
            json!({ "workspacePath": path.to_string_lossy(), "studentCount": count }),
        ),
        Err(e) => e.response(&req.id),
    }
}

fn handle_workspace_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.close() {
        Ok(Some(summary)) => ok(&req.id, json!({ "closed": true, "reconciled": summary })),
        Ok(None) => ok(&req.id, json!({ "closed": false })),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "workspace.close" => Some(handle_workspace_close(state, req)),
        _ => None,
    }
}
