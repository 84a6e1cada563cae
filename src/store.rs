//! Student persistence over the normalized schema.
//!
//! Every write of a single student is one transaction: metadata replace,
//! link delete, link insert. `reconcile` makes the stored set match a given
//! in-memory set exactly.

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::grading;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMark {
    pub subject: String,
    #[serde(default)]
    pub mark: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub student_class: String,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub subjects: Vec<SubjectMark>,
    #[serde(default)]
    pub image_filename: Option<String>,
}

impl Student {
    pub fn average(&self) -> Option<f64> {
        grading::average(self.subjects.iter().map(|s| s.mark))
    }

    pub fn subject_names(&self) -> impl Iterator<Item = &str> {
        self.subjects.iter().map(|s| s.subject.as_str())
    }

    pub fn mark_texts(&self) -> impl Iterator<Item = String> + '_ {
        self.subjects
            .iter()
            .map(|s| grading::format_optional_mark(s.mark))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to load students from database: {0}")]
    Load(#[source] rusqlite::Error),
    #[error("failed to save student {uid}: {source}")]
    Save {
        uid: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to delete student {uid}: {source}")]
    Delete {
        uid: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to sync database: {0}")]
    Sync(#[source] rusqlite::Error),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Load(_) => "db_query_failed",
            StoreError::Save { .. } => "db_save_failed",
            StoreError::Delete { .. } => "db_delete_failed",
            StoreError::Sync(_) => "db_sync_failed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub upserted: usize,
    pub deleted: Vec<String>,
}

pub fn load_students(conn: &Connection) -> Result<Vec<Student>, StoreError> {
    load_students_inner(conn).map_err(StoreError::Load)
}

fn load_students_inner(conn: &Connection) -> rusqlite::Result<Vec<Student>> {
    let mut links: HashMap<String, Vec<SubjectMark>> = HashMap::new();
    let mut link_stmt = conn.prepare(
        "SELECT ss.student_uid, sub.name, ss.mark
         FROM student_subjects ss
         JOIN subjects sub ON ss.subject_id = sub.id
         ORDER BY ss.student_uid, sub.name, ss.id",
    )?;
    let rows = link_stmt.query_map([], |r| {
        let uid: String = r.get(0)?;
        let subject: String = r.get(1)?;
        let mark: Option<f64> = r.get(2)?;
        Ok((uid, SubjectMark { subject, mark }))
    })?;
    for row in rows {
        let (uid, sm) = row?;
        links.entry(uid).or_default().push(sm);
    }

    let mut stmt = conn.prepare(
        "SELECT uid, name, student_class, section, image_filename
         FROM students
         ORDER BY uid",
    )?;
    let students = stmt
        .query_map([], |r| {
            Ok(Student {
                uid: r.get(0)?,
                name: r.get(1)?,
                student_class: r.get::<_, Option<String>>(2)?.unwrap_or_default(),
                section: r.get::<_, Option<String>>(3)?.unwrap_or_default(),
                subjects: Vec::new(),
                image_filename: r
                    .get::<_, Option<String>>(4)?
                    .filter(|s| !s.trim().is_empty()),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(students
        .into_iter()
        .map(|mut s| {
            s.subjects = links.remove(&s.uid).unwrap_or_default();
            s
        })
        .collect())
}

pub fn load_student(conn: &Connection, uid: &str) -> Result<Option<Student>, StoreError> {
    load_student_inner(conn, uid).map_err(StoreError::Load)
}

fn load_student_inner(conn: &Connection, uid: &str) -> rusqlite::Result<Option<Student>> {
    let student = conn
        .query_row(
            "SELECT uid, name, student_class, section, image_filename
             FROM students
             WHERE uid = ?",
            [uid],
            |r| {
                Ok(Student {
                    uid: r.get(0)?,
                    name: r.get(1)?,
                    student_class: r.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    section: r.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    subjects: Vec::new(),
                    image_filename: r
                        .get::<_, Option<String>>(4)?
                        .filter(|s| !s.trim().is_empty()),
                })
            },
        )
        .optional()?;
    let Some(mut student) = student else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT sub.name, ss.mark
         FROM student_subjects ss
         JOIN subjects sub ON ss.subject_id = sub.id
         WHERE ss.student_uid = ?
         ORDER BY sub.name, ss.id",
    )?;
    student.subjects = stmt
        .query_map([uid], |r| {
            Ok(SubjectMark {
                subject: r.get(0)?,
                mark: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(student))
}

/// Returns the subject id for `name`, creating the subject on first use.
/// Blank names have no subject.
fn subject_id(conn: &Connection, name: &str) -> rusqlite::Result<Option<i64>> {
    let name = name.trim();
    if name.is_empty() {
        return Ok(None);
    }
    conn.execute("INSERT OR IGNORE INTO subjects(name) VALUES(?)", [name])?;
    conn.query_row("SELECT id FROM subjects WHERE name = ?", [name], |r| {
        r.get(0)
    })
    .optional()
}

pub fn upsert_student(conn: &Connection, student: &Student) -> Result<(), StoreError> {
    upsert_student_inner(conn, student).map_err(|source| StoreError::Save {
        uid: student.uid.clone(),
        source,
    })?;
    tracing::debug!(uid = %student.uid, links = student.subjects.len(), "student saved");
    Ok(())
}

fn upsert_student_inner(conn: &Connection, student: &Student) -> rusqlite::Result<()> {
    // Dropped without commit on any error, which rolls back.
    let tx = conn.unchecked_transaction()?;

    // REPLACE deletes the old row first; with foreign keys on that cascades
    // the links away, which is what the next statement does anyway.
    tx.execute(
        "INSERT OR REPLACE INTO students(uid, name, student_class, section, image_filename)
         VALUES(?, ?, ?, ?, ?)",
        (
            &student.uid,
            &student.name,
            &student.student_class,
            &student.section,
            student.image_filename.as_deref().unwrap_or(""),
        ),
    )?;
    tx.execute(
        "DELETE FROM student_subjects WHERE student_uid = ?",
        [&student.uid],
    )?;

    for sm in &student.subjects {
        let Some(sid) = subject_id(&tx, &sm.subject)? else {
            continue;
        };
        tx.execute(
            "INSERT INTO student_subjects(student_uid, subject_id, mark) VALUES(?, ?, ?)",
            (&student.uid, sid, sm.mark),
        )?;
    }

    tx.commit()
}

/// Deletes one student and its links. Returns whether the student existed.
pub fn delete_student(conn: &Connection, uid: &str) -> Result<bool, StoreError> {
    let removed = delete_students_inner(conn, std::slice::from_ref(&uid.to_string()))
        .map_err(|source| StoreError::Delete {
            uid: uid.to_string(),
            source,
        })?;
    Ok(removed > 0)
}

fn delete_students_inner(conn: &Connection, uids: &[String]) -> rusqlite::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut removed = 0usize;
    for uid in uids {
        // Explicit so no link survives even without foreign key enforcement.
        tx.execute("DELETE FROM student_subjects WHERE student_uid = ?", [uid])?;
        removed += tx.execute("DELETE FROM students WHERE uid = ?", [uid])?;
    }
    tx.commit()?;
    Ok(removed)
}

/// Makes the stored students match `students` exactly.
///
/// Each student is upserted in its own transaction; stored students absent
/// from `students` are then removed in a single transaction. The first
/// failure abandons the rest of the pass.
pub fn reconcile(conn: &Connection, students: &[Student]) -> Result<ReconcileSummary, StoreError> {
    for s in students {
        upsert_student(conn, s)?;
    }

    let keep: HashSet<&str> = students.iter().map(|s| s.uid.as_str()).collect();
    let stale = stored_uids(conn)
        .map_err(StoreError::Sync)?
        .into_iter()
        .filter(|uid| !keep.contains(uid.as_str()))
        .collect::<Vec<_>>();
    if !stale.is_empty() {
        delete_students_inner(conn, &stale).map_err(StoreError::Sync)?;
    }

    tracing::info!(
        upserted = students.len(),
        deleted = stale.len(),
        "reconciled students with database"
    );
    Ok(ReconcileSummary {
        upserted: students.len(),
        deleted: stale,
    })
}

fn stored_uids(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT uid FROM students ORDER BY uid")?;
    let uids = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(uids)
}
