//! Final stage: write combine values into the reconciliation sheet
//!
//! Rows are matched on `store_dd-mm-yyyy`. Only the configured update
//! columns are touched; every other sheet of the workbook passes through.

use std::collections::HashMap;

use tracing::{debug, info};

use super::combine::{COMBINE_SHEET, combine_table};
use super::detect::{detect_date_column, detect_store_column, match_key};
use super::input::read_input_table;
use super::result::{RunResult, RunState, StageError, StageKind, StageRun};
use crate::config::{CombineConfig, FinalConfig};
use crate::table::{NamedTable, OutputTable, Value, Workbook};

const FINAL_INPUT: &str = "final";

/// Final stage over Combine output and a final workbook
///
/// `combine` is the output of a Combine run, passed in by the caller.
pub fn run_final(config: &FinalConfig, combine: &[OutputTable], workbook: Option<&Workbook>) -> RunResult {
    debug!(combine_tables = combine.len(), has_workbook = workbook.is_some(), "run_final: called");
    let mut run = StageRun::new(StageKind::Final);
    match final_tables(&mut run, config, combine, workbook) {
        Ok(output) => run.succeed(output),
        Err(e) => run.fail(e),
    }
}

/// Final stage over Combine output workbooks written by earlier runs
///
/// Each workbook's `Combining_MIS` table is read at row 1. A workbook
/// without that table fails the whole run; one that lacks the sheet falls
/// back to its first sheet with a warning.
pub fn run_final_from_outputs(
    config: &FinalConfig,
    combine_workbooks: &[Workbook],
    workbook: Option<&Workbook>,
) -> RunResult {
    debug!(combine_workbooks = combine_workbooks.len(), "run_final_from_outputs: called");
    let mut run = StageRun::new(StageKind::Final);
    let mut combine = Vec::with_capacity(combine_workbooks.len());
    for combine_wb in combine_workbooks {
        match read_input_table(&mut run, &combine_wb.name, combine_wb, COMBINE_SHEET, 1) {
            Ok(input) => combine.push(OutputTable::from_input(input)),
            Err(e) => return run.fail(e),
        }
    }
    match final_tables(&mut run, config, &combine, workbook) {
        Ok(output) => run.succeed(output),
        Err(e) => run.fail(e),
    }
}

/// Combine then Final in one run; output starts with the combine table
pub fn run_combine_final(
    combine_config: &CombineConfig,
    final_config: &FinalConfig,
    combine_workbooks: &[Workbook],
    final_workbook: Option<&Workbook>,
) -> RunResult {
    debug!(combine_workbooks = combine_workbooks.len(), "run_combine_final: called");
    let mut run = StageRun::new(StageKind::CombineFinal);

    let combined = match combine_table(&mut run, combine_config, combine_workbooks) {
        Ok(table) => table,
        Err(e) => return run.fail(e),
    };
    match final_tables(&mut run, final_config, std::slice::from_ref(&combined), final_workbook) {
        Ok(sheets) => {
            let mut output = vec![NamedTable::new(COMBINE_SHEET, combined)];
            output.extend(sheets);
            run.succeed(output)
        }
        Err(e) => run.fail(e),
    }
}

fn trimmed(mut table: OutputTable) -> OutputTable {
    for column in &mut table.columns {
        *column = column.trim().to_string();
    }
    table
}

fn missing(stage: StageKind, message: String) -> StageError {
    StageError::MissingInput {
        stage,
        input: FINAL_INPUT.to_string(),
        message,
    }
}

fn preview_columns(table: &OutputTable) -> String {
    table.columns.iter().take(10).cloned().collect::<Vec<_>>().join(", ")
}

fn final_tables(
    run: &mut StageRun,
    config: &FinalConfig,
    combine: &[OutputTable],
    workbook: Option<&Workbook>,
) -> Result<Vec<NamedTable>, StageError> {
    let stage = run.stage();
    if combine.is_empty() {
        return Err(missing(stage, "combine output not provided".to_string()));
    }
    let workbook = workbook.ok_or_else(|| missing(stage, "no final workbook uploaded".to_string()))?;

    let target_input = read_input_table(run, FINAL_INPUT, workbook, &config.sheet_name, config.start_row)?;
    let target_name = workbook
        .select_sheet(&config.sheet_name)
        .map(|s| s.sheet.name.clone())
        .unwrap_or_default();
    let mut target = trimmed(OutputTable::from_input(target_input));

    run.advance(RunState::Resolving);
    let combined = OutputTable::concat(combine.iter().cloned(), |name| name.trim().to_string());

    let combine_keys = detect_store_column(&combined.columns).zip(detect_date_column(&combined));
    let (c_store, c_date) = combine_keys.ok_or_else(|| {
        missing(
            stage,
            format!("could not identify store and date columns in combine data [{}]", preview_columns(&combined)),
        )
    })?;
    let target_keys = detect_store_column(&target.columns).zip(detect_date_column(&target));
    let (t_store, t_date) = target_keys.ok_or_else(|| {
        missing(
            stage,
            format!(
                "could not identify store and date columns in sheet '{}' [{}]",
                target_name,
                preview_columns(&target)
            ),
        )
    })?;
    debug!(c_store, c_date, t_store, t_date, "final_tables: key columns");

    run.advance(RunState::Transforming);
    for row in &mut target.rows {
        if let Some(cell) = row.get_mut(t_date)
            && let Some(date) = cell.as_date()
        {
            *cell = Value::date(date);
        }
    }

    let mut index: HashMap<String, usize> = HashMap::new();
    for (i, row) in combined.rows.iter().enumerate() {
        let key = row.get(c_store).zip(row.get(c_date)).and_then(|(s, d)| match_key(s, d));
        if let Some(key) = key {
            index.entry(key).or_insert(i);
        }
    }

    let matches: Vec<Option<usize>> = target
        .rows
        .iter()
        .map(|row| {
            row.get(t_store)
                .zip(row.get(t_date))
                .and_then(|(s, d)| match_key(s, d))
                .and_then(|key| index.get(&key).copied())
        })
        .collect();
    let matched = matches.iter().filter(|m| m.is_some()).count();
    info!(rows = target.len(), matched, "Matched final rows");

    for column in &config.update_columns {
        let source = combined.column_index(column);
        match (target.column_index(column), source) {
            (Some(t_idx), Some(c_idx)) => {
                for (row, m) in target.rows.iter_mut().zip(&matches) {
                    let Some(value) = m.and_then(|ci| combined.rows[ci].get(c_idx)) else {
                        continue;
                    };
                    if !value.is_blank()
                        && let Some(cell) = row.get_mut(t_idx)
                    {
                        *cell = value.clone();
                    }
                }
            }
            (None, Some(c_idx)) => {
                let values = matches
                    .iter()
                    .map(|m| m.and_then(|ci| combined.rows[ci].get(c_idx)).cloned().unwrap_or_default())
                    .collect();
                target.push_column(column.clone(), values);
            }
            (None, None) => target.push_column(column.clone(), Vec::new()),
            (Some(_), None) => {}
        }
    }

    let output = workbook
        .sheets
        .iter()
        .map(|sheet| {
            if sheet.name == target_name {
                NamedTable::new(sheet.name.clone(), target.clone())
            } else {
                let table = sheet
                    .table(config.start_row)
                    .map(OutputTable::from_input)
                    .map(trimmed)
                    .unwrap_or_default();
                NamedTable::new(sheet.name.clone(), table)
            }
        })
        .collect();
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{RunStatus, WarningKind};
    use crate::table::Sheet;

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|s| s.to_string()).collect()
    }

    fn combine() -> OutputTable {
        let mut t = OutputTable::new(names(&["Store Code", "Date", "HB-Card", "Remarks", "CK"]));
        t.rows = vec![
            vec![Value::text("S1"), Value::text("01-01-2025"), Value::Number(50.0), Value::Blank, Value::Blank],
            vec![Value::text("S1"), Value::text("01-01-2025"), Value::Number(99.0), Value::Blank, Value::Blank],
            vec![Value::text("S2"), Value::text("02-01-2025"), Value::Blank, Value::text("late"), Value::Blank],
        ];
        t
    }

    fn grid(rows: &[&[&str]]) -> Vec<Vec<Value>> {
        let mut out = vec![vec![Value::text("Report")], vec![]];
        out.extend(rows.iter().map(|r| r.iter().map(|c| Value::from(*c)).collect::<Vec<_>>()));
        out
    }

    fn final_workbook() -> Workbook {
        Workbook::new(
            "final.xlsx",
            vec![
                Sheet::new("Summary", grid(&[&["Total"], &["1"]])),
                Sheet::new(
                    "Reconciliation by Date by Store",
                    grid(&[
                        &["Store Code", "Date", "HB-Card", "Remarks "],
                        &["S1", "01-01-2025", "10", "old"],
                        &["S2", "02-01-2025", "20", ""],
                        &["S3", "03-01-2025", "30", "keep"],
                    ]),
                ),
            ],
        )
    }

    fn config(update: &[&str]) -> FinalConfig {
        FinalConfig {
            update_columns: names(update),
            ..Default::default()
        }
    }

    #[test]
    fn test_final_updates_matching_rows() {
        let wb = final_workbook();
        let result = run_final(&config(&["HB-Card", "Remarks", "CO-CCN"]), &[combine()], Some(&wb));
        assert_eq!(result.status, RunStatus::Success, "{:?}", result.errors);

        let output = result.output.as_ref().unwrap();
        assert_eq!(output.len(), 2);
        assert_eq!(output[0].name, "Summary");
        let target = &output[1].table;

        assert_eq!(target.columns, names(&["Store Code", "Date", "HB-Card", "Remarks", "CO-CCN"]));
        // first combine row wins, blanks never overwrite
        assert_eq!(target.get(0, "HB-Card"), Some(&Value::Number(50.0)));
        assert_eq!(target.get(0, "Remarks"), Some(&Value::text("old")));
        assert_eq!(target.get(1, "HB-Card"), Some(&Value::text("20")));
        assert_eq!(target.get(1, "Remarks"), Some(&Value::text("late")));
        assert_eq!(target.get(2, "HB-Card"), Some(&Value::text("30")));
        assert!(target.is_column_blank(4));
    }

    #[test]
    fn test_final_appends_combine_only_columns() {
        let mut c = combine();
        c.push_column("Ad-CCN", vec![Value::Number(7.0)]);
        let wb = final_workbook();
        let result = run_final(&config(&["Ad-CCN"]), &[c], Some(&wb));
        let target = &result.output.as_ref().unwrap()[1].table;
        assert_eq!(target.get(0, "Ad-CCN"), Some(&Value::Number(7.0)));
        assert_eq!(target.get(2, "Ad-CCN"), Some(&Value::Blank));
    }

    #[test]
    fn test_final_requires_combine_output() {
        let wb = final_workbook();
        let result = run_final(&FinalConfig::default(), &[], Some(&wb));
        assert!(matches!(result.errors[0], StageError::MissingInput { .. }));
        assert!(result.output.is_none());
    }

    #[test]
    fn test_final_falls_back_to_first_sheet() {
        let wb = Workbook::new(
            "final.xlsx",
            vec![Sheet::new(
                "Recon",
                grid(&[&["Store Code", "Date", "HB-Card"], &["S1", "01-01-2025", ""]]),
            )],
        );
        let result = run_final(&config(&["HB-Card"]), &[combine()], Some(&wb));
        assert!(result.is_success());
        assert!(matches!(result.warnings[0].kind, WarningKind::SheetFallback { .. }));
        assert_eq!(
            result.table("Recon").unwrap().table.get(0, "HB-Card"),
            Some(&Value::Number(50.0))
        );
    }

    #[test]
    fn test_final_undetectable_keys_is_missing_input() {
        let wb = Workbook::new(
            "final.xlsx",
            vec![Sheet::new("Reconciliation by Date by Store", grid(&[&["A", "B"], &["1", "2"]]))],
        );
        let result = run_final(&FinalConfig::default(), &[combine()], Some(&wb));
        let err = result.first_error().unwrap().to_string();
        assert!(err.contains("could not identify"));
    }

    fn combine_output(name: &str, sheet: &str) -> Workbook {
        let rows = vec![
            vec![Value::text("Store Code"), Value::text("Date"), Value::text("HB-Card")],
            vec![Value::text("S2"), Value::text("02-01-2025"), Value::Number(88.0)],
        ];
        Workbook::new(name, vec![Sheet::new(sheet, rows)])
    }

    #[test]
    fn test_final_from_outputs_reads_combine_sheet() {
        let result = run_final_from_outputs(
            &config(&["HB-Card"]),
            &[combine_output("c1.xlsx", COMBINE_SHEET)],
            Some(&final_workbook()),
        );
        assert!(result.is_success(), "{:?}", result.errors);
        assert!(result.warnings.is_empty());
        let target = &result.table("Reconciliation by Date by Store").unwrap().table;
        assert_eq!(target.get(1, "HB-Card"), Some(&Value::Number(88.0)));
    }

    #[test]
    fn test_final_from_outputs_warns_on_other_sheet() {
        let result = run_final_from_outputs(
            &config(&["HB-Card"]),
            &[combine_output("c1.xlsx", "Sheet1")],
            Some(&final_workbook()),
        );
        assert!(result.is_success(), "{:?}", result.errors);
        assert_eq!(result.warnings[0].input, "c1.xlsx");
        assert!(matches!(
            &result.warnings[0].kind,
            WarningKind::SheetFallback { preferred, used } if preferred == COMBINE_SHEET && used == "Sheet1"
        ));
    }

    #[test]
    fn test_final_from_outputs_unreadable_file_fails_run() {
        let empty = Workbook::new("broken.xlsx", vec![Sheet::new(COMBINE_SHEET, Vec::new())]);
        let result = run_final_from_outputs(
            &config(&["HB-Card"]),
            &[combine_output("c1.xlsx", COMBINE_SHEET), empty],
            Some(&final_workbook()),
        );
        assert_eq!(result.status, RunStatus::Failure);
        assert!(result.output.is_none());
        assert!(matches!(
            &result.errors[0],
            StageError::MissingInput { input, .. } if input == "broken.xlsx"
        ));
    }

    #[test]
    fn test_combine_final_outputs_both() {
        let combine_wb = Workbook::new(
            "combine.xlsx",
            vec![Sheet::new(
                "MIS Working",
                grid(&[&["Store Code", "Date", "HB-Card"], &["S2", "02-01-2025", "77"]]),
            )],
        );
        let result = run_combine_final(
            &CombineConfig::default(),
            &config(&["HB-Card"]),
            &[combine_wb],
            Some(&final_workbook()),
        );
        assert!(result.is_success(), "{:?}", result.errors);
        let output = result.output.as_ref().unwrap();
        assert_eq!(output[0].name, COMBINE_SHEET);
        assert_eq!(output.len(), 3);
        let target = &result.table("Reconciliation by Date by Store").unwrap().table;
        assert_eq!(target.get(1, "HB-Card"), Some(&Value::Number(77.0)));
    }

    #[test]
    fn test_combine_final_fails_when_final_missing() {
        let combine_wb = Workbook::new(
            "combine.xlsx",
            vec![Sheet::new("MIS Working", grid(&[&["Store Code", "Date"], &["S2", "02-01-2025"]]))],
        );
        let result = run_combine_final(&CombineConfig::default(), &FinalConfig::default(), &[combine_wb], None);
        assert_eq!(result.status, RunStatus::Failure);
        assert!(result.output.is_none());
    }
}
