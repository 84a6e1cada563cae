use crate::export;
use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, not_found, optional_str, required_str, workspace_path, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::report::{self, ReportCard};
use serde_json::{json, Value};
use std::path::PathBuf;

const REPORTS_DIR: &str = "reports";

fn card_for(state: &AppState, req: &Request) -> Result<ReportCard, HandlerErr> {
    db_conn(state)?;
    let workspace = workspace_path(state)?;
    let uid = required_str(req, "uid")?;
    let student = state.find(&uid).ok_or_else(|| not_found(&uid))?;
    Ok(report::build_report_card(workspace, student))
}

fn handle_card_model(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let card = card_for(state, req)?;
    Ok(json!({ "card": card }))
}

fn handle_card_pdf(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let card = card_for(state, req)?;
    let include_chart = req
        .params
        .get("includeChart")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    let out_path = match optional_str(req, "outPath") {
        Some(p) => PathBuf::from(p),
        None => workspace_path(state)?
            .join(REPORTS_DIR)
            .join(&card.default_file_name),
    };

    let (bytes, summary) = report::render_pdf(&card, include_chart);
    export::write_file_atomic(&out_path, &bytes).map_err(|e| {
        HandlerErr::new("export_failed", format!("Failed to generate PDF: {e:#}"))
            .with_details(json!({ "path": out_path.to_string_lossy() }))
    })?;
    tracing::info!(uid = %card.uid, path = %out_path.display(), pages = summary.pages, "report card written");

    Ok(json!({
        "path": out_path.to_string_lossy(),
        "bytes": bytes.len(),
        "pages": summary.pages,
        "photoEmbedded": summary.photo_embedded,
        "chartDrawn": summary.chart_drawn,
        "warnings": summary.warnings,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "reports.studentCardModel" => handle_card_model(state, req),
        "reports.studentCardPdf" => handle_card_pdf(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
