//! VLOOKUP-style enrichment against a reference table

use std::collections::HashMap;

use tracing::debug;

use crate::rule::Lookup;
use crate::stage::WarningKind;
use crate::table::{OutputTable, Value};

/// Fill `lookup.dest_col` from the reference table
///
/// Keys are string-coerced and matched exactly; the first reference row with
/// a given key wins. Blank keys leave the destination blank silently, misses
/// leave it blank and yield a `LookupMiss` warning with the 1-based data row.
pub fn lookup_enrich(table: &mut OutputTable, lookup: &Lookup<'_>, reference: &OutputTable) -> Vec<WarningKind> {
    debug!(
        source = %lookup.source_col,
        sales = %lookup.sales_col,
        dest = %lookup.dest_col,
        value = %lookup.value_col,
        reference_rows = reference.len(),
        "lookup_enrich: called"
    );

    let (Some(key_idx), Some(value_idx)) = (
        reference.column_index(lookup.sales_col),
        reference.column_index(lookup.value_col),
    ) else {
        return Vec::new();
    };
    let (Some(src), Some(dst)) = (table.column_index(lookup.source_col), table.column_index(lookup.dest_col)) else {
        return Vec::new();
    };

    let mut index: HashMap<String, &Value> = HashMap::new();
    for row in &reference.rows {
        let Some(key) = row.get(key_idx).filter(|v| !v.is_blank()) else {
            continue;
        };
        index
            .entry(key.to_text())
            .or_insert_with(|| row.get(value_idx).unwrap_or(&Value::Blank));
    }

    let mut warnings = Vec::new();
    for (i, row) in table.rows.iter_mut().enumerate() {
        let key = row.get(src).cloned().unwrap_or_default();
        let value = if key.is_blank() {
            Value::Blank
        } else {
            let key = key.to_text();
            match index.get(&key) {
                Some(found) => (*found).clone(),
                None => {
                    warnings.push(WarningKind::LookupMiss { key, row: i + 1 });
                    Value::Blank
                }
            }
        };
        if let Some(cell) = row.get_mut(dst) {
            *cell = value;
        }
    }

    debug!(misses = warnings.len(), "lookup_enrich: done");
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup() -> Lookup<'static> {
        Lookup {
            source_col: "Store",
            sales_col: "StoreName",
            dest_col: "Store Code",
            value_col: "StoreCode",
        }
    }

    fn reference(rows: Vec<(&str, Value)>) -> OutputTable {
        let mut t = OutputTable::new(vec!["StoreName".into(), "StoreCode".into()]);
        t.rows = rows.into_iter().map(|(k, v)| vec![Value::from(k), v]).collect();
        t
    }

    fn advances(keys: &[&str]) -> OutputTable {
        let mut t = OutputTable::new(vec!["Store".into(), "Store Code".into()]);
        t.rows = keys.iter().map(|k| vec![Value::from(*k), Value::text("stale")]).collect();
        t
    }

    #[test]
    fn test_hit_and_miss() {
        let reference = reference(vec![("S1", Value::Number(100.0))]);
        let mut table = advances(&["S1", "S2"]);
        let warnings = lookup_enrich(&mut table, &lookup(), &reference);

        assert_eq!(table.get(0, "Store Code"), Some(&Value::Number(100.0)));
        assert_eq!(table.get(1, "Store Code"), Some(&Value::Blank));
        assert_eq!(warnings, vec![WarningKind::LookupMiss { key: "S2".into(), row: 2 }]);
    }

    #[test]
    fn test_first_reference_row_wins() {
        let reference = reference(vec![("S1", Value::text("first")), ("S1", Value::text("second"))]);
        let mut table = advances(&["S1"]);
        lookup_enrich(&mut table, &lookup(), &reference);
        assert_eq!(table.get(0, "Store Code"), Some(&Value::text("first")));
    }

    #[test]
    fn test_blank_key_is_silent() {
        let reference = reference(vec![("S1", Value::Number(1.0))]);
        let mut table = advances(&[""]);
        let warnings = lookup_enrich(&mut table, &lookup(), &reference);
        assert!(warnings.is_empty());
        assert_eq!(table.get(0, "Store Code"), Some(&Value::Blank));
    }

    #[test]
    fn test_numeric_key_matches_text() {
        let mut reference = OutputTable::new(vec!["StoreName".into(), "StoreCode".into()]);
        reference.rows.push(vec![Value::Number(42.0), Value::text("C42")]);
        let mut table = advances(&["42"]);
        let warnings = lookup_enrich(&mut table, &lookup(), &reference);
        assert!(warnings.is_empty());
        assert_eq!(table.get(0, "Store Code"), Some(&Value::text("C42")));
    }
}
