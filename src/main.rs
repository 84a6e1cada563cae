mod config;
mod db;
mod export;
mod form;
mod grading;
mod ipc;
mod pdf;
mod photos;
mod report;
mod roster;
mod store;

use std::io::{self, BufRead, Write};

fn main() {
    let config = config::Config::from_env();
    config::init_logging(&config);

    let mut state = ipc::AppState::default();
    if let Some(path) = config.workspace.as_deref() {
        if let Err(e) = ipc::open_workspace(&mut state, path) {
            tracing::error!(workspace = %path.display(), code = e.code, error = %e.message, "failed to open workspace from environment");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                let _ = writeln!(stdout, "{}", ipc::bad_json(e.to_string()));
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    // Input closed: the UI is gone, write the working set back.
    match state.close() {
        Ok(Some(summary)) => tracing::info!(
            upserted = summary.upserted,
            deleted = summary.deleted.len(),
            "shutdown reconciliation complete"
        ),
        Ok(None) => {}
        Err(e) => tracing::error!(code = e.code(), error = %e, "shutdown reconciliation failed"),
    }
}
