use crate::form::StudentForm;
use crate::grading;
use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, not_found, required_str, workspace_path, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::photos::{self, ImportedPhoto};
use crate::store::{self, Student};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::Path;

fn parse_form(req: &Request) -> Result<StudentForm, HandlerErr> {
    serde_json::from_value::<StudentForm>(req.params.clone())
        .map_err(|e| HandlerErr::new("bad_params", e.to_string()))
}

fn profile_json(s: &Student) -> Value {
    let avg = s.average();
    json!({
        "student": s,
        "average": avg,
        "averageDisplay": avg.map(grading::format_mark).unwrap_or_else(|| "N/A".to_string()),
        "grade": grading::grade(avg),
    })
}

/// Copies the chosen photo in; failure only produces a warning.
fn import_photo_or_warn(
    workspace: &Path,
    form: &StudentForm,
    uid: &str,
    warnings: &mut Vec<String>,
) -> Option<ImportedPhoto> {
    let chosen = form.image_path()?;
    match photos::import_photo(workspace, uid, Path::new(chosen)) {
        Ok(photo) => Some(photo),
        Err(e) => {
            tracing::warn!(uid, error = %format!("{e:#}"), "photo import failed");
            warnings.push(format!("Failed to copy image: {e:#}"));
            None
        }
    }
}

fn create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    db_conn(state)?;
    let workspace = workspace_path(state)?.to_path_buf();
    let form = parse_form(req)?;
    let mut student = form.validate()?;
    if state.find(&student.uid).is_some() {
        return Err(HandlerErr::new("uid_exists", "UID already exists.")
            .with_details(json!({ "uid": student.uid })));
    }

    let mut warnings = Vec::new();
    let photo = import_photo_or_warn(&workspace, &form, &student.uid, &mut warnings);
    student.image_filename = photo.as_ref().map(|p| p.reference.clone());

    let conn = db_conn(state)?;
    if let Err(e) = store::upsert_student(conn, &student) {
        if let Some(photo) = &photo {
            photo.discard();
        }
        return Err(e.into());
    }
    let saved = store::load_student(conn, &student.uid)?.unwrap_or(student);
    state.students.push(saved.clone());
    tracing::info!(uid = %saved.uid, "student added");

    Ok(json!({ "student": saved, "warnings": warnings }))
}

fn update(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    db_conn(state)?;
    let workspace = workspace_path(state)?.to_path_buf();
    let form = parse_form(req)?;
    let validated = form.validate()?;
    let Some(idx) = state.students.iter().position(|s| s.uid == validated.uid) else {
        return Err(not_found(&validated.uid));
    };

    let mut warnings = Vec::new();
    let photo = import_photo_or_warn(&workspace, &form, &validated.uid, &mut warnings);

    let previous_image = state.students[idx].image_filename.clone();
    let mut updated = state.students[idx].clone();
    updated.name = validated.name;
    updated.student_class = validated.student_class;
    updated.section = validated.section;
    updated.subjects = validated.subjects;
    if let Some(photo) = &photo {
        updated.image_filename = Some(photo.reference.clone());
    }

    let conn = db_conn(state)?;
    if let Err(e) = store::upsert_student(conn, &updated) {
        // A copy landing on the stored photo's path is still referenced.
        if let Some(photo) = photo.filter(|p| Some(&p.reference) != previous_image.as_ref()) {
            photo.discard();
        }
        return Err(e.into());
    }
    let saved = store::load_student(conn, &updated.uid)?.unwrap_or(updated);
    state.students[idx] = saved.clone();
    tracing::info!(uid = %saved.uid, "student updated");

    Ok(json!({ "student": saved, "warnings": warnings }))
}

fn delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let uid = required_str(req, "uid")?;
    let conn = db_conn(state)?;
    let in_memory = state.find(&uid).is_some();
    let in_store = store::delete_student(conn, &uid)?;
    if !in_memory && !in_store {
        return Err(not_found(&uid));
    }
    state.students.retain(|s| s.uid != uid);
    tracing::info!(uid = %uid, "student deleted");
    Ok(json!({ "ok": true, "uid": uid }))
}

fn sync(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let raw = req
        .params
        .get("students")
        .cloned()
        .ok_or_else(|| HandlerErr::new("bad_params", "missing students"))?;
    let students: Vec<Student> = serde_json::from_value(raw)
        .map_err(|e| HandlerErr::new("bad_params", e.to_string()))?;

    let mut seen = HashSet::new();
    for s in &students {
        if s.uid.trim().is_empty() {
            return Err(HandlerErr::new("bad_params", "every student needs a uid"));
        }
        if !seen.insert(s.uid.as_str()) {
            return Err(HandlerErr::new("bad_params", "duplicate uid")
                .with_details(json!({ "uid": s.uid })));
        }
    }

    let conn = db_conn(state)?;
    let summary = store::reconcile(conn, &students)?;
    // Saving trims subject names and drops blank ones; keep what was stored.
    state.students = store::load_students(conn)?;
    Ok(json!({ "reconciled": summary, "students": state.students }))
}

fn handle(
    state: &mut AppState,
    req: &Request,
    f: fn(&mut AppState, &Request) -> Result<Value, HandlerErr>,
) -> Value {
    match f(state, req) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "students.list" => Some(handle(state, req, |state, _| {
            db_conn(state)?;
            Ok(json!({ "students": state.students }))
        })),
        "students.get" => Some(handle(state, req, |state, req| {
            db_conn(state)?;
            let uid = required_str(req, "uid")?;
            state
                .find(&uid)
                .map(profile_json)
                .ok_or_else(|| not_found(&uid))
        })),
        "students.create" => Some(handle(state, req, create)),
        "students.update" => Some(handle(state, req, update)),
        "students.delete" => Some(handle(state, req, delete)),
        "students.sync" => Some(handle(state, req, sync)),
        "students.reload" => Some(handle(state, req, |state, _| {
            db_conn(state)?;
            state.reload()?;
            Ok(json!({ "studentCount": state.students.len() }))
        })),
        _ => None,
    }
}
