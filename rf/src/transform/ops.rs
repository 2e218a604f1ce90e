//! Individual table transforms

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::table::{OutputTable, Value};

/// Drop rows whose value in `column` starts with any of `prefixes`
///
/// The value is string-coerced and compared untrimmed and case-sensitively.
/// Returns the number of dropped rows.
pub fn drop_prefixed_rows(table: &mut OutputTable, column: &str, prefixes: &[String]) -> usize {
    debug!(%column, ?prefixes, "drop_prefixed_rows: called");
    let Some(idx) = table.column_index(column) else {
        return 0;
    };
    let before = table.rows.len();
    table.rows.retain(|row| {
        let text = row.get(idx).map(Value::to_text).unwrap_or_default();
        !prefixes.iter().any(|p| text.starts_with(p.as_str()))
    });
    before - table.rows.len()
}

/// Overwrite `dest` with `source` on every row
pub fn copy_column(table: &mut OutputTable, source: &str, dest: &str) {
    debug!(%source, %dest, "copy_column: called");
    let (Some(src), Some(dst)) = (table.column_index(source), table.column_index(dest)) else {
        return;
    };
    for row in &mut table.rows {
        let value = row.get(src).cloned().unwrap_or_default();
        if let Some(cell) = row.get_mut(dst) {
            *cell = value;
        }
    }
}

/// Write constant text into each listed column on every row
pub fn set_fixed_values(table: &mut OutputTable, values: &BTreeMap<String, String>) {
    for (column, text) in values {
        let Some(idx) = table.column_index(column) else {
            continue;
        };
        debug!(%column, %text, "set_fixed_values: column");
        for row in &mut table.rows {
            if let Some(cell) = row.get_mut(idx) {
                *cell = Value::text(text.clone());
            }
        }
    }
}

/// Remove every ASCII case-insensitive occurrence of `marker`, then trim
pub fn strip_marker_text(text: &str, marker: &str) -> String {
    if marker.is_empty() {
        return text.trim().to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        if rest.get(..marker.len()).is_some_and(|head| head.eq_ignore_ascii_case(marker)) {
            rest = &rest[marker.len()..];
        } else {
            out.push(c);
            rest = &rest[c.len_utf8()..];
        }
    }
    out.trim().to_string()
}

/// Strip `marker` from text values in the listed columns
///
/// Numbers and dates are left untouched; a value that becomes empty is blank.
pub fn strip_marker(table: &mut OutputTable, marker: &str, columns: &[String]) {
    debug!(%marker, ?columns, "strip_marker: called");
    let indices: Vec<usize> = columns.iter().filter_map(|c| table.column_index(c)).collect();
    for row in &mut table.rows {
        for &idx in &indices {
            if let Some(cell) = row.get_mut(idx)
                && let Value::Text(text) = cell
            {
                let stripped = strip_marker_text(text, marker);
                *cell = if stripped.is_empty() { Value::Blank } else { Value::Text(stripped) };
            }
        }
    }
}

/// Inclusive date range attached to a bank upload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |d: Option<NaiveDate>| d.map(crate::table::format_date).unwrap_or_else(|| "..".to_string());
        write!(f, "{} to {}", show(self.start), show(self.end))
    }
}

/// Keep rows whose `column` value is a date within `range`
///
/// Rows with no readable date are dropped. Returns the number of dropped
/// rows.
pub fn filter_date_range(table: &mut OutputTable, column: &str, range: &DateRange) -> usize {
    debug!(%column, %range, "filter_date_range: called");
    if range.is_unbounded() {
        return 0;
    }
    let Some(idx) = table.column_index(column) else {
        return 0;
    };
    let before = table.rows.len();
    table
        .rows
        .retain(|row| row.get(idx).and_then(Value::as_date).is_some_and(|d| range.contains(d)));
    before - table.rows.len()
}
