use anyhow::Context;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

use crate::config::{DB_FILE_NAME, IMAGES_DIR};

pub fn db_path(workspace: &Path) -> PathBuf {
    workspace.join(DB_FILE_NAME)
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!("failed to create workspace {}", workspace.to_string_lossy())
    })?;
    std::fs::create_dir_all(workspace.join(IMAGES_DIR))
        .context("failed to create images directory")?;

    let conn = Connection::open(db_path(workspace))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    // WAL with a full sync on every commit.
    let _: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "FULL")?;

    init_schema(&conn)?;
    tracing::debug!(workspace = %workspace.display(), "database opened");
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            uid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            student_class TEXT,
            section TEXT,
            image_filename TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_subjects(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_uid TEXT NOT NULL,
            subject_id INTEGER NOT NULL,
            mark REAL,
            FOREIGN KEY(student_uid) REFERENCES students(uid) ON DELETE CASCADE,
            FOREIGN KEY(subject_id) REFERENCES subjects(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_subjects_student ON student_subjects(student_uid)",
        [],
    )?;

    Ok(())
}
