//! Sheet selection and table extraction shared by every stage

use tracing::debug;

use super::result::{StageError, StageRun, WarningKind};
use crate::table::{InputTable, Workbook};

/// Read the table a stage works on from one workbook
///
/// Picks the sheet with [`Workbook::select_sheet`], the same choice
/// inspection reports, and cuts the table whose header sits on `start_row`.
/// A fallback away from a non-empty preferred name is a warning; a workbook
/// without sheets or without the header row is `MissingInput`.
pub fn read_input_table(
    run: &mut StageRun,
    input: &str,
    workbook: &Workbook,
    preferred: &str,
    start_row: usize,
) -> Result<InputTable, StageError> {
    debug!(%input, workbook = %workbook.name, %preferred, start_row, "read_input_table: called");
    let stage = run.stage();

    let selection = workbook.select_sheet(preferred).ok_or_else(|| StageError::MissingInput {
        stage,
        input: input.to_string(),
        message: format!("workbook '{}' has no sheets", workbook.name),
    })?;

    if selection.fell_back && !preferred.is_empty() {
        run.warn(
            input,
            WarningKind::SheetFallback {
                preferred: preferred.to_string(),
                used: selection.sheet.name.clone(),
            },
        );
    }

    let table = selection.sheet.table(start_row).ok_or_else(|| StageError::MissingInput {
        stage,
        input: input.to_string(),
        message: format!(
            "sheet '{}' of '{}' has no header row {}",
            selection.sheet.name, workbook.name, start_row
        ),
    })?;

    if table.is_empty() {
        run.warn(
            input,
            WarningKind::EmptyInput {
                detail: format!("sheet '{}' of '{}'", selection.sheet.name, workbook.name),
            },
        );
    }

    Ok(table)
}
