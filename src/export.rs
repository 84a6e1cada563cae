use anyhow::Context;
use std::path::Path;
use uuid::Uuid;

use crate::store::Student;

pub const CSV_HEADER: &str = "UID,Name,Class,Section,Subjects,Marks";
/// Joins multi-valued fields inside one CSV cell.
pub const LIST_DELIMITER: &str = ";";

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub fn students_csv(students: &[Student]) -> String {
    let mut csv = String::from(CSV_HEADER);
    csv.push_str("\r\n");
    for s in students {
        let subjects = s.subject_names().collect::<Vec<_>>().join(LIST_DELIMITER);
        let marks = s.mark_texts().collect::<Vec<_>>().join(LIST_DELIMITER);
        csv.push_str(&format!(
            "{},{},{},{},{},{}\r\n",
            csv_quote(&s.uid),
            csv_quote(&s.name),
            csv_quote(&s.student_class),
            csv_quote(&s.section),
            csv_quote(&subjects),
            csv_quote(&marks),
        ));
    }
    csv
}

/// Writes through a sibling temp file so a failed export never leaves a
/// truncated file at `path`.
pub fn write_file_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "export".to_string());
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    std::fs::write(&tmp, contents)
        .with_context(|| format!("failed to write {}", tmp.to_string_lossy()))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("failed to replace {}", path.to_string_lossy()));
    }
    Ok(())
}

pub fn export_csv(students: &[Student], path: &Path) -> anyhow::Result<usize> {
    write_file_atomic(path, students_csv(students).as_bytes())?;
    tracing::info!(rows = students.len(), path = %path.display(), "exported students CSV");
    Ok(students.len())
}
