use serde::Deserialize;
use thiserror::Error;

use crate::store::{Student, SubjectMark};

/// Raw add/update form fields, as typed by the user.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentForm {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub student_class: String,
    #[serde(default)]
    pub section: String,
    /// Comma separated.
    #[serde(default)]
    pub subjects: String,
    /// Comma separated, one per subject.
    #[serde(default)]
    pub marks: String,
    #[serde(default)]
    pub image_path: Option<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum FormError {
    #[error("UID, Name and Class are required.")]
    MissingFields,
    #[error("Number of subjects and marks must match.")]
    CountMismatch { subjects: usize, marks: usize },
    #[error("Marks must be numeric.")]
    InvalidMark(String),
}

impl FormError {
    pub fn code(&self) -> &'static str {
        match self {
            FormError::MissingFields => "missing_fields",
            FormError::CountMismatch { .. } => "count_mismatch",
            FormError::InvalidMark(_) => "invalid_mark",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            FormError::MissingFields => None,
            FormError::CountMismatch { subjects, marks } => {
                Some(serde_json::json!({ "subjects": subjects, "marks": marks }))
            }
            FormError::InvalidMark(raw) => Some(serde_json::json!({ "mark": raw })),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn parse_mark(raw: &str) -> Result<f64, FormError> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| FormError::InvalidMark(raw.to_string()))
}

impl StudentForm {
    /// Validates the form into a record. The image is resolved separately.
    pub fn validate(&self) -> Result<Student, FormError> {
        let uid = self.uid.trim();
        let name = self.name.trim();
        let student_class = self.student_class.trim();
        if uid.is_empty() || name.is_empty() || student_class.is_empty() {
            return Err(FormError::MissingFields);
        }

        let subjects = split_list(&self.subjects);
        let marks = split_list(&self.marks);
        if subjects.len() != marks.len() {
            return Err(FormError::CountMismatch {
                subjects: subjects.len(),
                marks: marks.len(),
            });
        }

        let pairs = subjects
            .into_iter()
            .zip(marks.iter())
            .map(|(subject, raw)| {
                Ok(SubjectMark {
                    subject,
                    mark: Some(parse_mark(raw)?),
                })
            })
            .collect::<Result<Vec<_>, FormError>>()?;

        Ok(Student {
            uid: uid.to_string(),
            name: name.to_string(),
            student_class: student_class.to_string(),
            section: self.section.trim().to_string(),
            subjects: pairs,
            image_filename: None,
        })
    }

    pub fn image_path(&self) -> Option<&str> {
        self.image_path
            .as_deref()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}
