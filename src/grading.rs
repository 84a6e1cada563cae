use serde::Serialize;

pub const GRADE_A_MIN: f64 = 90.0;
pub const GRADE_B_MIN: f64 = 75.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Grade {
    A,
    B,
    C,
    #[serde(rename = "N/A")]
    NotAvailable,
}

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::NotAvailable => "N/A",
        }
    }

    pub fn parse(s: &str) -> Option<Grade> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Grade::A),
            "B" => Some(Grade::B),
            "C" => Some(Grade::C),
            "N/A" => Some(Grade::NotAvailable),
            _ => None,
        }
    }
}

/// Nearest 2-decimal value to the exact binary `x`, ties to even. `74.005`
/// is stored just below the tie and so rounds to `74.0`.
pub fn round_2_decimals(x: f64) -> f64 {
    format!("{:.2}", x).parse().unwrap_or(x)
}

/// Mean of the marks that are present. `None` when nothing is present.
pub fn average<I>(marks: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let mut sum = 0.0;
    let mut count: usize = 0;
    for v in marks.into_iter().flatten() {
        sum += v;
        count += 1;
    }
    if count == 0 {
        return None;
    }
    Some(round_2_decimals(sum / count as f64))
}

pub fn grade(avg: Option<f64>) -> Grade {
    match avg {
        None => Grade::NotAvailable,
        Some(a) if a >= GRADE_A_MIN => Grade::A,
        Some(a) if a >= GRADE_B_MIN => Grade::B,
        Some(_) => Grade::C,
    }
}

/// Whole numbers keep one decimal place (`85.0`), anything else prints as-is.
pub fn format_mark(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

pub fn format_optional_mark(v: Option<f64>) -> String {
    v.map(format_mark).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_keeps_two_decimals() {
        assert_eq!(round_2_decimals(83.333333), 83.33);
        assert_eq!(round_2_decimals(66.666666), 66.67);
        assert_eq!(round_2_decimals(90.0), 90.0);
        assert_eq!(round_2_decimals(0.375), 0.38);
    }

    #[test]
    fn means_just_below_a_tie_round_down() {
        assert_eq!(average(vec![Some(74.0), Some(74.01)]), Some(74.0));
    }

    #[test]
    fn absent_marks_do_not_count() {
        assert_eq!(average(vec![Some(80.0), None, Some(90.0)]), Some(85.0));
        assert_eq!(average(vec![None, None]), None);
        assert_eq!(average(Vec::<Option<f64>>::new()), None);
    }

    #[test]
    fn mark_formatting_matches_stored_text() {
        assert_eq!(format_mark(85.0), "85.0");
        assert_eq!(format_mark(72.5), "72.5");
        assert_eq!(format_mark(0.0), "0.0");
        assert_eq!(format_optional_mark(None), "");
    }
}
