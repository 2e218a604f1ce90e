//! Store and date column detection for MIS workbooks

use tracing::debug;

use crate::table::{OutputTable, Value, format_date};

/// Fraction of non-blank values that must parse as dates for a `DATE`-named column
const NAMED_DATE_FRACTION: f64 = 0.3;
/// Minimum date fraction for a column picked by content
const CONTENT_DATE_FRACTION: f64 = 0.5;
/// Columns at least this numeric are never picked as dates by content
const NUMERIC_EXCLUSION_FRACTION: f64 = 0.8;

/// First column whose name contains every keyword, case-insensitively
///
/// Names are tried as written, then with `_` and `-` read as spaces.
pub fn find_column_by_keywords(columns: &[String], keywords: &[&str]) -> Option<usize> {
    let keywords: Vec<String> = keywords.iter().map(|k| k.to_uppercase()).collect();
    let matches = |name: &str| keywords.iter().all(|k| name.contains(k.as_str()));

    columns
        .iter()
        .position(|c| matches(&c.to_uppercase()))
        .or_else(|| {
            columns
                .iter()
                .position(|c| matches(&c.replace(['_', '-'], " ").to_uppercase()))
        })
}

/// Store column: `STORE` and `CODE`, else anything with `STORE`
pub fn detect_store_column(columns: &[String]) -> Option<usize> {
    find_column_by_keywords(columns, &["STORE", "CODE"]).or_else(|| find_column_by_keywords(columns, &["STORE"]))
}

fn fractions(values: &[&Value]) -> (f64, f64) {
    let non_blank: Vec<&&Value> = values.iter().filter(|v| !v.is_blank()).collect();
    if non_blank.is_empty() {
        return (0.0, 0.0);
    }
    let total = non_blank.len() as f64;
    let dates = non_blank.iter().filter(|v| v.as_date().is_some()).count() as f64;
    let numbers = non_blank.iter().filter(|v| v.as_number().is_some()).count() as f64;
    (dates / total, numbers / total)
}

/// Fraction of non-blank values readable as numbers
pub fn numeric_fraction(values: &[&Value]) -> f64 {
    fractions(values).1
}

/// Date column of a table
///
/// A `DATE`-named column wins when enough of its values read as dates;
/// otherwise the column with the highest date fraction is taken, ignoring
/// store-code columns and mostly numeric ones.
pub fn detect_date_column(table: &OutputTable) -> Option<usize> {
    debug!(columns = table.columns.len(), rows = table.len(), "detect_date_column: called");
    let column_values = |idx: usize| -> Vec<&Value> {
        table.rows.iter().map(|r| r.get(idx).unwrap_or(&Value::Blank)).collect()
    };

    if let Some(idx) = find_column_by_keywords(&table.columns, &["DATE"]) {
        let (date_frac, _) = fractions(&column_values(idx));
        if date_frac >= NAMED_DATE_FRACTION {
            return Some(idx);
        }
    }

    let mut best: Option<(usize, f64)> = None;
    for (idx, name) in table.columns.iter().enumerate() {
        let upper = name.to_uppercase();
        if upper.contains("STORE") && upper.contains("CODE") {
            continue;
        }
        let (date_frac, num_frac) = fractions(&column_values(idx));
        if date_frac >= CONTENT_DATE_FRACTION
            && num_frac < NUMERIC_EXCLUSION_FRACTION
            && best.is_none_or(|(_, b)| date_frac > b)
        {
            best = Some((idx, date_frac));
        }
    }
    best.map(|(idx, _)| idx)
}

/// `store_dd-mm-yyyy` key, or `None` when either part is missing
pub fn match_key(store: &Value, date: &Value) -> Option<String> {
    let store = store.to_text();
    let store = store.trim();
    if store.is_empty() {
        return None;
    }
    let date = date.as_date()?;
    Some(format!("{}_{}", store, format_date(date)))
}
