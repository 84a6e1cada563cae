use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::store::{self, ReconcileSummary, Student, StoreError};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Session state owned by the request loop. `students` is the working set
/// the UI edits; it is written back to `db` by reconciliation.
#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub students: Vec<Student>,
}

impl AppState {
    pub fn find(&self, uid: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.uid == uid)
    }

    /// Replaces the working set with what is stored.
    pub fn reload(&mut self) -> Result<(), StoreError> {
        if let Some(conn) = self.db.as_ref() {
            self.students = store::load_students(conn)?;
        }
        Ok(())
    }

    /// Reconciles the working set into the store and releases the
    /// workspace. The connection is kept if reconciliation fails so the
    /// caller can retry.
    pub fn close(&mut self) -> Result<Option<ReconcileSummary>, StoreError> {
        let Some(conn) = self.db.as_ref() else {
            return Ok(None);
        };
        let summary = store::reconcile(conn, &self.students)?;
        self.db = None;
        self.workspace = None;
        self.students.clear();
        Ok(Some(summary))
    }
}
