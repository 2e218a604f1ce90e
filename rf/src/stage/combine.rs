//! Combine stage: stack MIS working sheets and key them by store and date

use tracing::{debug, info};

use super::detect::{detect_date_column, detect_store_column, match_key, numeric_fraction};
use super::input::read_input_table;
use super::result::{RunResult, RunState, StageError, StageKind, StageRun, WarningKind};
use crate::config::CombineConfig;
use crate::table::{NamedTable, OutputTable, Value, Workbook};

/// Sheet name of the Combine output
pub const COMBINE_SHEET: &str = "Combining_MIS";

/// Label used for warnings and errors not tied to one file
const COMBINE_INPUT: &str = "combine";

/// Columns at least this numeric are converted to numbers
const NUMERIC_FRACTION: f64 = 0.6;

/// Combine stage over one or more combine workbooks
pub fn run_combine(config: &CombineConfig, workbooks: &[Workbook]) -> RunResult {
    debug!(workbooks = workbooks.len(), "run_combine: called");
    let mut run = StageRun::new(StageKind::Combine);
    match combine_table(&mut run, config, workbooks) {
        Ok(table) => run.succeed(vec![NamedTable::new(COMBINE_SHEET, table)]),
        Err(e) => run.fail(e),
    }
}

pub(crate) fn combine_table(run: &mut StageRun, config: &CombineConfig, workbooks: &[Workbook]) -> Result<OutputTable, StageError> {
    if workbooks.is_empty() {
        return Err(StageError::MissingInput {
            stage: run.stage(),
            input: COMBINE_INPUT.to_string(),
            message: "no combine workbooks uploaded".to_string(),
        });
    }

    let mut tables = Vec::with_capacity(workbooks.len());
    for workbook in workbooks {
        let input = read_input_table(run, &workbook.name, workbook, &config.sheet_name, config.start_row)?;
        tables.push(OutputTable::from_input(input));
    }

    run.advance(RunState::Resolving);
    let mut table = OutputTable::concat(tables, |name| name.trim().to_string());
    table.remove_column(&config.key_column);

    let store_idx = detect_store_column(&table.columns);
    let date_idx = detect_date_column(&table);
    debug!(?store_idx, ?date_idx, "combine_table: detected key columns");
    for (idx, what) in [(store_idx, "store"), (date_idx, "date")] {
        if idx.is_none() {
            run.warn(COMBINE_INPUT, WarningKind::KeyColumnNotDetected { missing: what.to_string() });
        }
    }

    run.advance(RunState::Transforming);
    if let Some(date_idx) = date_idx {
        for row in &mut table.rows {
            if let Some(cell) = row.get_mut(date_idx) {
                *cell = cell.as_date().map(Value::date).unwrap_or(Value::Blank);
            }
        }
    }

    let keys: Vec<Value> = table
        .rows
        .iter()
        .map(|row| match (store_idx, date_idx) {
            (Some(s), Some(d)) => row
                .get(s)
                .zip(row.get(d))
                .and_then(|(store, date)| match_key(store, date))
                .map(Value::Text)
                .unwrap_or(Value::Blank),
            _ => Value::Blank,
        })
        .collect();

    let keep = config.max_columns.saturating_sub(1);
    if table.columns.len() > keep {
        info!(dropped = table.columns.len() - keep, "Capping combine columns");
        table.columns.truncate(keep);
        for row in &mut table.rows {
            row.truncate(keep);
        }
    }

    for idx in 0..table.columns.len() {
        if Some(idx) == date_idx || Some(idx) == store_idx || table.columns[idx].trim().eq_ignore_ascii_case("remarks") {
            continue;
        }
        let values: Vec<&Value> = table.rows.iter().map(|r| r.get(idx).unwrap_or(&Value::Blank)).collect();
        if values.iter().all(|v| v.is_blank()) || numeric_fraction(&values) < NUMERIC_FRACTION {
            continue;
        }
        debug!(column = %table.columns[idx], "combine_table: converting to numbers");
        for row in &mut table.rows {
            if let Some(cell) = row.get_mut(idx) {
                *cell = cell.as_number().map(Value::Number).unwrap_or(Value::Blank);
            }
        }
    }

    table.push_column(config.key_column.clone(), keys);
    info!(rows = table.len(), columns = table.columns.len(), "Combine built");
    Ok(table)
}
