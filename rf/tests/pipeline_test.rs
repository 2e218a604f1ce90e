//! Integration tests for Reconflow
//!
//! These drive the pipeline end to end with in-memory workbooks, and push
//! stage output through the xlsx writer and reader the way the CLI does.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use proptest::prelude::*;

use reconflow::config::Config;
use reconflow::inspect::InspectTarget;
use reconflow::io::{read_workbook, write_tables};
use reconflow::pipeline::{BankFile, Pipeline};
use reconflow::resolve::resolve;
use reconflow::rule::{MappingRule, MemoryRuleStore, RuleKind, RuleStore};
use reconflow::stage::{
    ADVANCES_SHEET, BANKING_SHEET, COMBINE_SHEET, RunStatus, SALES_SHEET, StageError, StageKind, WarningKind,
};
use reconflow::table::{OutputTable, Sheet, Value, Workbook};
use reconflow::transform::{DateRange, apply};

fn text_row(cells: &[&str]) -> Vec<Value> {
    cells.iter().map(|c| Value::text(*c)).collect()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn pipeline_with(store: MemoryRuleStore) -> Pipeline {
    Pipeline::new(Arc::new(store), &Config::default())
}

fn sales_workbook(sheet: &str) -> Workbook {
    let mut rows = vec![vec![Value::text("Sales Report Abstract")], vec![], vec![], vec![], vec![]];
    rows.push(text_row(&["AlternateStoreCode", "StoreName", "StoreCode"]));
    rows.push(text_row(&["S1", "Alpha", "S1X"]));
    rows.push(text_row(&["S2", "Beta", "97123"]));
    rows.push(text_row(&["S3", "Gamma", "S3X"]));
    Workbook::new("sales.xlsx", vec![Sheet::new(sheet, rows)])
}

fn advances_workbook() -> Workbook {
    let rows = vec![
        vec![Value::text("Advances")],
        text_row(&["Store", "Amount"]),
        vec![Value::text("Alpha"), Value::Number(100.0)],
        vec![Value::text("Delta"), Value::Number(50.0)],
    ];
    Workbook::new("advances.xlsx", vec![Sheet::new("Sheet", rows)])
}

fn bank_rule(name: &str, amount_source: &str) -> MappingRule {
    let mut rule = MappingRule::bank(name, Vec::new())
        .with_mapping("Amount", amount_source)
        .with_mapping("Bank Credit Date", "Settlement Date");
    if let RuleKind::Bank(extras) = &mut rule.kind {
        extras.fixed_values.insert("Bank Name".to_string(), name.to_string());
        extras.date_filter_col = Some("Bank Credit Date".to_string());
    }
    rule
}

fn bank_workbook(name: &str, amount_header: &str, rows: &[(f64, NaiveDate)]) -> Workbook {
    let mut grid = vec![text_row(&[amount_header, "Settlement Date"])];
    for (amount, day) in rows {
        grid.push(vec![Value::Number(*amount), Value::date(*day)]);
    }
    Workbook::new(name, vec![Sheet::new("Report", grid)])
}

fn banking_store() -> MemoryRuleStore {
    let store = MemoryRuleStore::seeded();
    store.save_rule(bank_rule("Amex", "SUBMISSION AMOUNT")).unwrap();
    store.save_rule(bank_rule("HDFC", "Amt")).unwrap();
    store
}

// =============================================================================
// Sales and Advances
// =============================================================================

#[test]
fn test_sales_then_advances_through_xlsx() {
    let p = pipeline_with(MemoryRuleStore::seeded());

    let sales = p.run_sales(Some(&sales_workbook("SalesReportAbstract")));
    assert!(sales.is_success(), "{:?}", sales.errors);
    let sheet1 = &sales.table(SALES_SHEET).unwrap().table;
    assert_eq!(sheet1.len(), 2);
    assert_eq!(sheet1.get(0, "StoreCode"), Some(&Value::text("S1")));
    assert_eq!(sheet1.get(1, "StoreCode"), Some(&Value::text("S3")));

    // The CLI hands Advances the Sales workbook it wrote earlier
    let bytes = write_tables(sales.output.as_deref().unwrap()).unwrap();
    let reread = read_workbook("sales_out.xlsx", bytes).unwrap();
    let reference = OutputTable::from_input(reread.sheets[0].table(1).unwrap());
    assert_eq!(reference.columns, sheet1.columns);

    let advances = p.run_advances(Some(&advances_workbook()), Some(&reference));
    assert!(advances.is_success(), "{:?}", advances.errors);
    let table = &advances.table(ADVANCES_SHEET).unwrap().table;
    assert_eq!(table.get(0, "Store Code"), Some(&Value::text("S1")));
    assert!(table.get(1, "Store Code").unwrap().is_blank());

    let misses: Vec<_> = advances
        .warnings
        .iter()
        .filter_map(|w| match &w.kind {
            WarningKind::LookupMiss { key, .. } => Some(key.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(misses, vec!["Delta"]);
    assert_eq!(p.latest().unwrap().stage, StageKind::Advances);
}

#[test]
fn test_advances_without_sales_reference_fails() {
    let p = pipeline_with(MemoryRuleStore::seeded());
    let result = p.run_advances(Some(&advances_workbook()), None);
    assert_eq!(result.status, RunStatus::Failure);
    assert!(matches!(result.errors[0], StageError::MissingInput { .. }));
    assert!(result.output.is_none());
}

#[test]
fn test_lookup_hit_and_miss() {
    let mut reference = OutputTable::new(vec!["StoreName".into(), "StoreCode".into()]);
    reference.rows.push(vec![Value::text("S1"), Value::Number(100.0)]);

    let mut advances = MappingRule::advances(vec!["Store".into(), "Store Code".into()]).with_mapping("Store", "Store");
    if let RuleKind::Advances(extras) = &mut advances.kind {
        extras.vlookup_source_col = Some("Store".into());
        extras.vlookup_sales_col = Some("StoreName".into());
        extras.vlookup_dest_col = Some("Store Code".into());
        extras.vlookup_value_col = Some("StoreCode".into());
    }

    let input = reconflow::table::InputTable::new(
        vec!["Store".into()],
        vec![vec![Value::text("S1")], vec![Value::text("S2")]],
    );
    let resolved = resolve(&advances, &input.header);
    let out = apply(&advances, &resolved, &input, Some(&reference)).unwrap();

    assert_eq!(out.table.get(0, "Store Code"), Some(&Value::Number(100.0)));
    assert!(out.table.get(1, "Store Code").unwrap().is_blank());
    assert_eq!(out.warnings.len(), 1);
    assert!(matches!(&out.warnings[0], WarningKind::LookupMiss { key, .. } if key == "S2"));
}

// =============================================================================
// Banking
// =============================================================================

#[test]
fn test_banking_stacks_uploads_and_filters_dates() {
    let p = pipeline_with(banking_store());
    let amex = bank_workbook(
        "amex.xlsx",
        "SUBMISSION AMOUNT",
        &[(10.0, date(2024, 1, 5)), (20.0, date(2024, 2, 5))],
    );
    let hdfc = bank_workbook("hdfc.xlsx", "Amt", &[(30.0, date(2024, 3, 1))]);

    let result = p.run_banking(vec![
        BankFile::new("Amex", amex).with_range(DateRange::new(Some(date(2024, 1, 1)), Some(date(2024, 1, 31)))),
        BankFile::new("HDFC", hdfc),
    ]);
    assert!(result.is_success(), "{:?}", result.errors);

    let table = &result.table(BANKING_SHEET).unwrap().table;
    assert_eq!(table.len(), 2);
    assert_eq!(table.get(0, "Bank Name"), Some(&Value::text("Amex")));
    assert_eq!(table.get(0, "Amount"), Some(&Value::Number(10.0)));
    assert_eq!(table.get(1, "Bank Name"), Some(&Value::text("HDFC")));
    assert_eq!(table.get(1, "Amount"), Some(&Value::Number(30.0)));
}

#[test]
fn test_banking_with_one_misconfigured_upload_fails_whole_run() {
    let store = banking_store();
    let mut bad = MappingRule::bank("Axis", Vec::new()).with_mapping("Amount", "Amount");
    if let RuleKind::Bank(extras) = &mut bad.kind {
        extras.fixed_values = BTreeMap::from([("Not A Column".to_string(), "x".to_string())]);
    }
    store.save_rule(bad).unwrap();
    let p = pipeline_with(store);

    let result = p.run_banking(vec![
        BankFile::new("Amex", bank_workbook("amex.xlsx", "SUBMISSION AMOUNT", &[(10.0, date(2024, 1, 5))])),
        BankFile::new("Axis", bank_workbook("axis.xlsx", "Amount", &[(5.0, date(2024, 1, 6))])),
        BankFile::new("HDFC", bank_workbook("hdfc.xlsx", "Amt", &[(30.0, date(2024, 3, 1))])),
    ]);

    assert_eq!(result.status, RunStatus::Failure);
    assert!(result.output.is_none());
    match &result.errors[0] {
        StageError::InvalidRuleConfiguration { column, .. } => assert_eq!(column, "Not A Column"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(p.status().has_errors);
}

#[test]
fn test_banking_range_excluding_every_row_warns() {
    let p = pipeline_with(banking_store());
    let amex = bank_workbook("amex.xlsx", "SUBMISSION AMOUNT", &[(10.0, date(2024, 1, 5))]);
    let result = p.run_banking(vec![
        BankFile::new("Amex", amex).with_range(DateRange::new(Some(date(2025, 1, 1)), None)),
    ]);
    assert!(result.is_success());
    assert!(result.table(BANKING_SHEET).unwrap().table.is_empty());
    assert!(
        result
            .warnings
            .iter()
            .any(|w| matches!(w.kind, WarningKind::EmptyInput { .. }))
    );
}

// =============================================================================
// Inspection
// =============================================================================

#[test]
fn test_inspection_agrees_with_sheet_fallback() {
    let p = pipeline_with(MemoryRuleStore::seeded());

    for (sheet, expect_present) in [("SalesReportAbstract", true), ("Data", false)] {
        let workbook = sales_workbook(sheet);
        let inspection = p.inspect(&InspectTarget::Sales, &workbook).unwrap();
        let run = p.run_sales(Some(&workbook));
        let fell_back = run
            .warnings
            .iter()
            .any(|w| matches!(w.kind, WarningKind::SheetFallback { .. }));

        assert_eq!(inspection.preferred_present, expect_present);
        assert_eq!(inspection.preferred_present, !fell_back);
        assert_eq!(inspection.selected_sheet.as_deref(), Some(sheet));
        assert_eq!(
            inspection.sheet_columns[sheet],
            vec!["AlternateStoreCode", "StoreName", "StoreCode"]
        );
    }
}

// =============================================================================
// Combine and Final
// =============================================================================

fn combine_workbook(name: &str, store: &str, day: &str, card: f64) -> Workbook {
    let rows = vec![
        vec![Value::text("MIS")],
        vec![],
        text_row(&["Store Code", "Date", "HB-Card", "Remarks"]),
        vec![Value::text(store), Value::text(day), Value::Number(card), Value::text("ok")],
    ];
    Workbook::new(name, vec![Sheet::new("MIS Working", rows)])
}

fn final_workbook() -> Workbook {
    let target = vec![
        vec![],
        vec![],
        text_row(&["Store Code", "Date", "HB-Card"]),
        vec![Value::text("S1"), Value::date(date(2024, 3, 5)), Value::Blank],
        vec![Value::text("S9"), Value::date(date(2024, 3, 5)), Value::Number(7.0)],
    ];
    let notes = vec![vec![], vec![], text_row(&["Note"]), text_row(&["keep me"])];
    Workbook::new(
        "final.xlsx",
        vec![
            Sheet::new("Reconciliation by Date by Store", target),
            Sheet::new("Notes", notes),
        ],
    )
}

#[test]
fn test_combine_final_updates_matching_rows() {
    let p = pipeline_with(MemoryRuleStore::seeded());
    let result = p.run_combine_final(
        &[
            combine_workbook("a.xlsx", "S1", "05-03-2024", 100.0),
            combine_workbook("b.xlsx", "S2", "06-03-2024", 40.0),
        ],
        Some(&final_workbook()),
    );
    assert!(result.is_success(), "{:?}", result.errors);

    let names: Vec<&str> = result.output.as_ref().unwrap().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec![COMBINE_SHEET, "Reconciliation by Date by Store", "Notes"]);

    let combined = &result.table(COMBINE_SHEET).unwrap().table;
    assert_eq!(combined.len(), 2);
    assert_eq!(combined.get(0, "CK"), Some(&Value::text("S1_05-03-2024")));

    let target = &result.table("Reconciliation by Date by Store").unwrap().table;
    assert_eq!(target.get(0, "HB-Card"), Some(&Value::Number(100.0)));
    assert_eq!(target.get(1, "HB-Card"), Some(&Value::Number(7.0)));
    assert_eq!(target.get(0, "Remarks"), Some(&Value::text("ok")));
    assert!(target.get(1, "Remarks").unwrap().is_blank());
    assert!(target.column_index("Ad-Bank Offer").is_some());

    let notes = &result.table("Notes").unwrap().table;
    assert_eq!(notes.get(0, "Note"), Some(&Value::text("keep me")));
    assert_eq!(p.status().stage, Some(StageKind::CombineFinal));
}

#[test]
fn test_final_from_written_combine_output() {
    let p = pipeline_with(MemoryRuleStore::seeded());
    let combine = p.run_combine(&[combine_workbook("a.xlsx", "S1", "05-03-2024", 100.0)]);
    assert!(combine.is_success(), "{:?}", combine.errors);

    let bytes = write_tables(combine.output.as_deref().unwrap()).unwrap();
    let reread = read_workbook("combine_out.xlsx", bytes).unwrap();
    let selection = reread.select_sheet(COMBINE_SHEET).unwrap();
    assert!(!selection.fell_back);
    let table = OutputTable::from_input(selection.sheet.table(1).unwrap());

    let result = p.run_final(&[table], Some(&final_workbook()));
    assert!(result.is_success(), "{:?}", result.errors);
    let target = &result.table("Reconciliation by Date by Store").unwrap().table;
    assert_eq!(target.get(0, "HB-Card"), Some(&Value::Number(100.0)));
}

#[test]
fn test_combine_short_year_dates_key_and_write() {
    let p = pipeline_with(MemoryRuleStore::seeded());
    let combine = p.run_combine(&[combine_workbook("a.xlsx", "S1", "05-03-24", 100.0)]);
    assert!(combine.is_success(), "{:?}", combine.errors);

    let table = &combine.table(COMBINE_SHEET).unwrap().table;
    assert_eq!(table.get(0, "CK"), Some(&Value::text("S1_05-03-2024")));
    assert_eq!(table.get(0, "Date"), Some(&Value::date(date(2024, 3, 5))));

    let bytes = write_tables(combine.output.as_deref().unwrap()).unwrap();
    let reread = read_workbook("combine_out.xlsx", bytes).unwrap();
    let back = reread.sheets[0].table(1).unwrap();
    assert_eq!(back.rows[0][1].as_date(), Some(date(2024, 3, 5)));
}

#[test]
fn test_final_without_combine_output_fails() {
    let p = pipeline_with(MemoryRuleStore::seeded());
    let result = p.run_final(&[], Some(&final_workbook()));
    assert!(matches!(result.errors[0], StageError::MissingInput { .. }));
    assert!(result.output.is_none());
}

// =============================================================================
// Resolution properties
// =============================================================================

proptest! {
    #[test]
    fn test_full_mapping_reproduces_input_cells(
        values in proptest::collection::vec("[a-z0-9]{1,8}", 1..6),
        rows in 1usize..5,
    ) {
        let outputs: Vec<String> = (0..values.len()).map(|i| format!("Out{}", i)).collect();
        let header: Vec<String> = (0..values.len()).map(|i| format!("Src{}", i)).collect();
        let mut rule = MappingRule::bank("Prop", outputs.clone());
        for (o, s) in outputs.iter().zip(&header) {
            rule = rule.with_mapping(o.clone(), s.clone());
        }

        let body: Vec<Vec<Value>> = (0..rows).map(|_| values.iter().map(|v| Value::text(v.clone())).collect()).collect();
        let input = reconflow::table::InputTable::new(header.clone(), body.clone());

        let resolved = resolve(&rule, &input.header);
        prop_assert!(resolved.unresolved().next().is_none());
        let out = apply(&rule, &resolved, &input, None).unwrap();
        prop_assert_eq!(out.table.rows, body);
    }
}
