//! Cell values and their text/date coercions

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Date formats tried, in order, when a text cell is read as a date.
///
/// Only day-first layouts are accepted for numeric dates; the exports are
/// produced with day-first locales.
///
/// `%Y` also accepts a short year, so any parse landing before year 100 is
/// skipped and the explicit two-digit `%y` layouts get their turn.
const DATE_FORMATS: &[&str] = &[
    "%d-%m-%Y", "%d/%m/%Y", "%d.%m.%Y", "%Y-%m-%d", "%Y/%m/%d", "%d-%b-%Y", "%d %b %Y", "%d-%m-%y", "%d/%m/%y",
    "%d.%m.%y", "%d-%b-%y",
];

/// Earliest year a parsed date may carry
const MIN_YEAR: i32 = 100;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d/%m/%Y %H:%M",
];

/// A single spreadsheet cell value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Empty cell
    #[default]
    Blank,
    /// Text as it appeared in the source
    Text(String),
    /// Numeric cell (integers are stored as floats, like the spreadsheet does)
    Number(f64),
    /// Date or date-time cell
    Date(NaiveDateTime),
}

impl Value {
    /// Build a text value
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Build a date value at midnight
    pub fn date(date: NaiveDate) -> Self {
        Self::Date(date.and_hms_opt(0, 0, 0).unwrap_or_default())
    }

    /// Blank cells and whitespace-only text both count as blank
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Blank => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// String coercion used for prefix checks, lookups and match keys
    ///
    /// Whole numbers render without a fractional part so that a store code
    /// read as `97.0` compares equal to the text `97`.
    pub fn to_text(&self) -> String {
        match self {
            Self::Blank => String::new(),
            Self::Text(s) => s.clone(),
            Self::Number(n) => format_number(*n),
            Self::Date(dt) => {
                if dt.time() == chrono::NaiveTime::MIN {
                    format_date(dt.date())
                } else {
                    dt.format("%d-%m-%Y %H:%M:%S").to_string()
                }
            }
        }
    }

    /// Date view of the value; text is parsed with the known formats
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(dt) => Some(dt.date()),
            Self::Text(s) => parse_date_text(s).map(|dt| dt.date()),
            _ => None,
        }
    }

    /// Numeric view of the value after stripping currency and separators
    ///
    /// Keeps only digits, `.` and `-` before parsing, so `"₹1,200.50"` reads
    /// as `1200.5`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => {
                let cleaned: String = s.chars().filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-').collect();
                if cleaned.is_empty() {
                    None
                } else {
                    cleaned.parse::<f64>().ok()
                }
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        if s.is_empty() { Self::Blank } else { Self::Text(s.to_string()) }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

/// Render a date the way every generated report shows it
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d-%m-%Y").to_string()
}

/// Parse a user-supplied date (`dd-mm-yyyy` and the other known formats)
pub fn parse_date_text(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt)
            && dt.year() >= MIN_YEAR
        {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt)
            && d.year() >= MIN_YEAR
        {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.0}", n)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_numbers_render_without_fraction() {
        assert_eq!(Value::Number(97.0).to_text(), "97");
        assert_eq!(Value::Number(12.5).to_text(), "12.5");
        assert_eq!(Value::Number(-3.0).to_text(), "-3");
    }

    #[test]
    fn test_blank_detection() {
        assert!(Value::Blank.is_blank());
        assert!(Value::text("   ").is_blank());
        assert!(!Value::text("x").is_blank());
        assert!(!Value::Number(0.0).is_blank());
    }

    #[test]
    fn test_parse_day_first_dates() {
        let dt = parse_date_text("05-11-2025").unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2025, 11, 5).unwrap());

        let dt = parse_date_text("2025-11-05 10:30:00").unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2025, 11, 5).unwrap());

        assert!(parse_date_text("not a date").is_none());
        assert!(parse_date_text("").is_none());
    }

    #[test]
    fn test_two_digit_year_reads_as_this_century() {
        let dt = parse_date_text("01-01-25").unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());

        let dt = parse_date_text("15/08/24").unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2024, 8, 15).unwrap());

        assert!(parse_date_text("01-01-0025").is_none());
    }

    #[test]
    fn test_date_value_renders_day_first() {
        let v = Value::date(NaiveDate::from_ymd_opt(2025, 1, 9).unwrap());
        assert_eq!(v.to_text(), "09-01-2025");
        assert_eq!(v.as_date(), NaiveDate::from_ymd_opt(2025, 1, 9));
    }

    #[test]
    fn test_as_number_strips_separators() {
        assert_eq!(Value::text("1,200.50").as_number(), Some(1200.5));
        assert_eq!(Value::text("INR 300").as_number(), Some(300.0));
        assert_eq!(Value::text("abc").as_number(), None);
        assert_eq!(Value::Blank.as_number(), None);
    }

    #[test]
    fn test_from_str_empty_is_blank() {
        assert_eq!(Value::from(""), Value::Blank);
        assert_eq!(Value::from("a"), Value::text("a"));
    }

    #[test]
    fn test_value_serde_tagged() {
        let json = serde_json::to_string(&Value::Number(100.0)).unwrap();
        assert!(json.contains("\"type\":\"number\""));
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::Number(100.0));
    }
}
