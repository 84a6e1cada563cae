use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::Path;

use crate::form::FormError;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::store::StoreError;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        HandlerErr::new(e.code(), e.to_string())
    }
}

impl From<FormError> for HandlerErr {
    fn from(e: FormError) -> Self {
        HandlerErr {
            code: e.code(),
            message: e.to_string(),
            details: e.details(),
        }
    }
}

pub fn required_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

pub fn optional_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

pub fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn workspace_path(state: &AppState) -> Result<&Path, HandlerErr> {
    state
        .workspace
        .as_deref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn not_found(uid: &str) -> HandlerErr {
    HandlerErr::new("not_found", "student not found").with_details(json!({ "uid": uid }))
}
