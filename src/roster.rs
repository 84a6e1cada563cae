use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::grading::{self, Grade};
use crate::store::Student;

pub const ALL: &str = "All";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Uid,
    Name,
    Class,
    Average,
}

impl SortKey {
    pub fn parse(s: &str) -> Option<SortKey> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uid" => Some(SortKey::Uid),
            "name" => Some(SortKey::Name),
            "class" => Some(SortKey::Class),
            "average" => Some(SortKey::Average),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub key: SortKey,
    pub ascending: bool,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            key: SortKey::Uid,
            ascending: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    /// `None` matches every class.
    pub class: Option<String>,
    pub grade: Option<Grade>,
    pub min_average: Option<f64>,
    pub max_average: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub uid: String,
    pub name: String,
    pub student_class: String,
    pub section: String,
    pub average: Option<f64>,
    pub average_display: String,
    pub grade: Grade,
}

impl TableRow {
    fn from_student(s: &Student) -> Self {
        let average = s.average();
        Self {
            uid: s.uid.clone(),
            name: s.name.clone(),
            student_class: s.student_class.clone(),
            section: s.section.clone(),
            average,
            average_display: average
                .map(grading::format_mark)
                .unwrap_or_else(|| "-".to_string()),
            grade: grading::grade(average),
        }
    }
}

/// Case-insensitive substring match over every visible field, subjects and
/// marks included. A blank query matches everything.
pub fn matches_search(s: &Student, query: &str) -> bool {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return true;
    }
    let subjects = s.subject_names().collect::<Vec<_>>().join(" ");
    let marks = s.mark_texts().collect::<Vec<_>>().join(" ");
    let combined = [
        s.uid.as_str(),
        s.name.as_str(),
        s.student_class.as_str(),
        s.section.as_str(),
        subjects.as_str(),
        marks.as_str(),
    ]
    .join(" ")
    .to_lowercase();
    combined.contains(&q)
}

pub fn matches_filters(s: &Student, filters: &Filters) -> bool {
    let avg = s.average();
    if let Some(class) = filters.class.as_deref() {
        if s.student_class != class {
            return false;
        }
    }
    if let Some(g) = filters.grade {
        if grading::grade(avg) != g {
            return false;
        }
    }
    if let Some(min) = filters.min_average {
        if avg.map_or(true, |a| a < min) {
            return false;
        }
    }
    if let Some(max) = filters.max_average {
        if avg.map_or(true, |a| a > max) {
            return false;
        }
    }
    true
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum UidKey {
    Numeric(i64),
    Text(String),
}

fn uid_key(uid: &str) -> UidKey {
    match uid.trim().parse::<i64>() {
        Ok(n) => UidKey::Numeric(n),
        Err(_) => UidKey::Text(uid.to_lowercase()),
    }
}

fn compare(a: &Student, b: &Student, key: SortKey) -> Ordering {
    match key {
        SortKey::Uid => uid_key(&a.uid).cmp(&uid_key(&b.uid)),
        SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortKey::Class => a
            .student_class
            .to_lowercase()
            .cmp(&b.student_class.to_lowercase()),
        // Students without an average go after those with one.
        SortKey::Average => match (a.average(), b.average()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    }
}

pub fn sort_students(students: &mut [&Student], spec: SortSpec) {
    students.sort_by(|a, b| {
        let o = compare(a, b, spec.key);
        if spec.ascending {
            o
        } else {
            o.reverse()
        }
    });
}

pub fn query(
    students: &[Student],
    search: Option<&str>,
    filters: &Filters,
    sort: SortSpec,
) -> Vec<TableRow> {
    let mut picked = students
        .iter()
        .filter(|s| search.map_or(true, |q| matches_search(s, q)))
        .filter(|s| matches_filters(s, filters))
        .collect::<Vec<_>>();
    sort_students(&mut picked, sort);
    picked.into_iter().map(TableRow::from_student).collect()
}

/// Class filter choices: `All` then every distinct non-empty class, sorted.
pub fn class_options(students: &[Student]) -> Vec<String> {
    let classes = students
        .iter()
        .map(|s| s.student_class.as_str())
        .filter(|c| !c.is_empty())
        .collect::<BTreeSet<_>>();
    std::iter::once(ALL.to_string())
        .chain(classes.into_iter().map(|c| c.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SubjectMark;

    fn student(uid: &str, name: &str, class: &str, marks: &[f64]) -> Student {
        Student {
            uid: uid.into(),
            name: name.into(),
            student_class: class.into(),
            section: "A".into(),
            subjects: marks
                .iter()
                .enumerate()
                .map(|(i, m)| SubjectMark {
                    subject: format!("S{i}"),
                    mark: Some(*m),
                })
                .collect(),
            image_filename: None,
        }
    }

    fn uids(rows: &[TableRow]) -> Vec<&str> {
        rows.iter().map(|r| r.uid.as_str()).collect()
    }

    #[test]
    fn uid_sort_is_numeric_before_text() {
        let all = vec![
            student("10", "a", "9", &[]),
            student("b7", "b", "9", &[]),
            student("9", "c", "9", &[]),
            student("A1", "d", "9", &[]),
        ];
        let rows = query(&all, None, &Filters::default(), SortSpec::default());
        assert_eq!(uids(&rows), vec!["9", "10", "A1", "b7"]);
    }

    #[test]
    fn average_sort_puts_missing_averages_last() {
        let all = vec![
            student("1", "a", "9", &[]),
            student("2", "b", "9", &[80.0]),
            student("3", "c", "9", &[60.0]),
        ];
        let asc = SortSpec {
            key: SortKey::Average,
            ascending: true,
        };
        assert_eq!(uids(&query(&all, None, &Filters::default(), asc)), vec!["3", "2", "1"]);
        let desc = SortSpec {
            ascending: false,
            ..asc
        };
        assert_eq!(uids(&query(&all, None, &Filters::default(), desc)), vec!["1", "2", "3"]);
    }

    #[test]
    fn search_covers_subjects_and_marks() {
        let s = student("5", "Lin", "8", &[77.5]);
        assert!(matches_search(&s, "s0"));
        assert!(matches_search(&s, "77.5"));
        assert!(matches_search(&s, " LIN "));
        assert!(!matches_search(&s, "math"));
        assert!(matches_search(&s, ""));
    }

    #[test]
    fn bounds_exclude_students_without_average() {
        let all = vec![student("1", "a", "9", &[]), student("2", "b", "9", &[76.0])];
        let f = Filters {
            min_average: Some(0.0),
            ..Filters::default()
        };
        assert_eq!(uids(&query(&all, None, &f, SortSpec::default())), vec!["2"]);
        let f = Filters {
            grade: Some(Grade::B),
            class: Some("9".into()),
            max_average: Some(80.0),
            ..Filters::default()
        };
        assert_eq!(uids(&query(&all, None, &f, SortSpec::default())), vec!["2"]);
    }

    #[test]
    fn rows_show_dash_for_missing_average() {
        let rows = query(
            &[student("1", "a", "9", &[])],
            None,
            &Filters::default(),
            SortSpec::default(),
        );
        assert_eq!(rows[0].average_display, "-");
        assert_eq!(rows[0].grade, Grade::NotAvailable);
    }

    #[test]
    fn class_options_start_with_all() {
        let all = vec![
            student("1", "a", "10", &[]),
            student("2", "b", "9", &[]),
            student("3", "c", "10", &[]),
            student("4", "d", "", &[]),
        ];
        assert_eq!(class_options(&all), vec!["All", "10", "9"]);
    }
}
