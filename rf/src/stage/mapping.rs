//! Rule-driven stages: Sales, Advances and Banking

use tracing::{debug, info};

use super::input::read_input_table;
use super::result::{RunResult, RunState, StageError, StageKind, StageRun, WarningKind};
use crate::resolve::resolve;
use crate::rule::{MappingRule, RuleKind, ValidationError, validate, validate_bank_set};
use crate::table::{InputTable, NamedTable, OutputTable, Workbook};
use crate::transform::{DateRange, TransformError, apply, filter_date_range};

/// Sheet name of the Sales output
pub const SALES_SHEET: &str = "Sheet1";
/// Sheet names of the Advances output
pub const ADVANCES_REFERENCE_SHEET: &str = "Sales";
pub const ADVANCES_SHEET: &str = "Advances";
/// Sheet name of the Banking output
pub const BANKING_SHEET: &str = "Banking";

/// One bank file of a Banking run
#[derive(Debug, Clone)]
pub struct BankUpload {
    pub rule: MappingRule,
    pub workbook: Workbook,
    /// Inclusive credit-date range applied after the rule's transforms
    pub range: Option<DateRange>,
}

impl BankUpload {
    pub fn new(rule: MappingRule, workbook: Workbook) -> Self {
        Self {
            rule,
            workbook,
            range: None,
        }
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.range = Some(range);
        self
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

/// Validating: the rule's structural invariants
fn check_rule(stage: StageKind, rule: &MappingRule) -> Result<(), StageError> {
    let errors = validate(rule);
    if errors.is_empty() {
        return Ok(());
    }
    Err(StageError::Validation {
        stage,
        input: rule.key().to_string(),
        message: join_errors(&errors),
    })
}

fn transform_error(stage: StageKind, input: &str, err: TransformError) -> StageError {
    match err {
        TransformError::MissingReference => StageError::MissingInput {
            stage,
            input: input.to_string(),
            message: err.to_string(),
        },
        other => StageError::InvalidRuleConfiguration {
            stage,
            input: input.to_string(),
            column: other.column().to_string(),
            message: other.to_string(),
        },
    }
}

/// Resolving then Transforming for one input table
fn map_input(
    run: &mut StageRun,
    rule: &MappingRule,
    input: &InputTable,
    reference: Option<&OutputTable>,
) -> Result<OutputTable, StageError> {
    let label = rule.key().to_string();
    debug!(input = %label, rows = input.rows.len(), "map_input: called");

    run.advance(RunState::Resolving);
    let resolved = resolve(rule, &input.header);
    run.extend_warnings(&label, resolved.warnings.iter().cloned());

    run.advance(RunState::Transforming);
    let transformed = apply(rule, &resolved, input, reference).map_err(|e| transform_error(run.stage(), &label, e))?;
    run.extend_warnings(&label, transformed.warnings);
    Ok(transformed.table)
}

fn require_workbook<'a>(stage: StageKind, rule: &MappingRule, workbook: Option<&'a Workbook>) -> Result<&'a Workbook, StageError> {
    workbook.ok_or_else(|| StageError::MissingInput {
        stage,
        input: rule.key().to_string(),
        message: "no workbook uploaded".to_string(),
    })
}

/// Sales stage: one workbook mapped into the `Sheet1` table
pub fn run_sales(rule: &MappingRule, workbook: Option<&Workbook>) -> RunResult {
    debug!(rule = %rule.key(), "run_sales: called");
    let mut run = StageRun::new(StageKind::Sales);
    match sales_tables(&mut run, rule, workbook) {
        Ok(output) => run.succeed(output),
        Err(e) => run.fail(e),
    }
}

fn sales_tables(run: &mut StageRun, rule: &MappingRule, workbook: Option<&Workbook>) -> Result<Vec<NamedTable>, StageError> {
    let stage = run.stage();
    let workbook = require_workbook(stage, rule, workbook)?;
    check_rule(stage, rule)?;
    let input = read_input_table(run, &rule.key().to_string(), workbook, &rule.sheet_name, rule.start_row)?;

    let table = map_input(run, rule, &input, None)?;
    info!(rows = table.len(), "Sales mapped");
    Ok(vec![NamedTable::new(SALES_SHEET, table)])
}

/// Advances stage: lookup-enriched advances next to the sales reference
///
/// `sales` is the processed Sales table; it is returned unchanged as the
/// `Sales` sheet.
pub fn run_advances(rule: &MappingRule, workbook: Option<&Workbook>, sales: Option<&OutputTable>) -> RunResult {
    debug!(rule = %rule.key(), has_sales = sales.is_some(), "run_advances: called");
    let mut run = StageRun::new(StageKind::Advances);
    match advances_tables(&mut run, rule, workbook, sales) {
        Ok(output) => run.succeed(output),
        Err(e) => run.fail(e),
    }
}

fn advances_tables(
    run: &mut StageRun,
    rule: &MappingRule,
    workbook: Option<&Workbook>,
    sales: Option<&OutputTable>,
) -> Result<Vec<NamedTable>, StageError> {
    let stage = run.stage();
    let workbook = require_workbook(stage, rule, workbook)?;
    let sales = sales.ok_or_else(|| StageError::MissingInput {
        stage,
        input: rule.key().to_string(),
        message: "processed sales table not provided".to_string(),
    })?;
    check_rule(stage, rule)?;
    let input = read_input_table(run, &rule.key().to_string(), workbook, &rule.sheet_name, rule.start_row)?;

    let table = map_input(run, rule, &input, Some(sales))?;
    info!(rows = table.len(), "Advances mapped");
    Ok(vec![
        NamedTable::new(ADVANCES_REFERENCE_SHEET, sales.clone()),
        NamedTable::new(ADVANCES_SHEET, table),
    ])
}

/// Banking stage: every upload mapped independently, then stacked
///
/// Any failing upload fails the whole run.
pub fn run_banking(uploads: &[BankUpload]) -> RunResult {
    debug!(uploads = uploads.len(), "run_banking: called");
    let mut run = StageRun::new(StageKind::Banking);
    match banking_tables(&mut run, uploads) {
        Ok(output) => run.succeed(output),
        Err(e) => run.fail(e),
    }
}

fn banking_tables(run: &mut StageRun, uploads: &[BankUpload]) -> Result<Vec<NamedTable>, StageError> {
    let stage = run.stage();
    if uploads.is_empty() {
        return Err(StageError::MissingInput {
            stage,
            input: "banking".to_string(),
            message: "no bank uploads".to_string(),
        });
    }

    if let Some(err) = validate_bank_set(uploads.iter().map(|u| &u.rule)).into_iter().next() {
        return Err(StageError::Validation {
            stage,
            input: "banking".to_string(),
            message: err.to_string(),
        });
    }

    // Validating covers every upload before any rows are mapped
    let mut inputs = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let label = upload.rule.key().to_string();
        if !matches!(upload.rule.kind, RuleKind::Bank(_)) {
            return Err(StageError::Validation {
                stage,
                input: label,
                message: format!("{} rule given to the banking stage", upload.rule.domain()),
            });
        }
        check_rule(stage, &upload.rule)?;
        if upload.range.is_some() && date_column(&upload.rule).is_none() {
            return Err(StageError::Validation {
                stage,
                input: label,
                message: "date range given but the rule has no date-filter-col".to_string(),
            });
        }
        let input = read_input_table(run, &label, &upload.workbook, &upload.rule.sheet_name, upload.rule.start_row)?;
        inputs.push(input);
    }

    let mut tables = Vec::with_capacity(uploads.len());
    for (upload, input) in uploads.iter().zip(&inputs) {
        let label = upload.rule.key().to_string();
        let mut table = map_input(run, &upload.rule, input, None)?;

        if let (Some(range), Some(column)) = (&upload.range, date_column(&upload.rule)) {
            let dropped = filter_date_range(&mut table, column, range);
            info!(bank = %label, %range, dropped, "Applied date range");
            if table.is_empty() && !input.is_empty() {
                run.warn(
                    &label,
                    WarningKind::EmptyInput {
                        detail: format!("no rows within {}", range),
                    },
                );
            }
        }
        tables.push(table);
    }

    let banking = OutputTable::concat(tables, str::to_string);
    info!(rows = banking.len(), banks = uploads.len(), "Banking combined");
    Ok(vec![NamedTable::new(BANKING_SHEET, banking)])
}

fn date_column(rule: &MappingRule) -> Option<&str> {
    match &rule.kind {
        RuleKind::Bank(extras) => extras.date_filter_col.as_deref(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{BankExtras, Domain, default_advances_rule, default_columns};
    use crate::stage::RunStatus;
    use crate::table::{Sheet, Value};
    use chrono::NaiveDate;

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|s| s.to_string()).collect()
    }

    fn sheet(name: &str, rows: &[&[&str]]) -> Sheet {
        Sheet::new(name, rows.iter().map(|r| r.iter().map(|c| Value::from(*c)).collect()).collect())
    }

    fn bank_rule(name: &str) -> MappingRule {
        let mut rule = MappingRule::bank(name, names(&["Bank Name", "Credit Date", "Amount"]))
            .with_mapping("Credit Date", "DATE")
            .with_mapping("Amount", "AMT");
        if let RuleKind::Bank(extras) = &mut rule.kind {
            extras.fixed_values.insert("Bank Name".into(), name.into());
            extras.date_filter_col = Some("Credit Date".into());
        }
        rule
    }

    fn bank_workbook(name: &str) -> Workbook {
        Workbook::new(
            name,
            vec![sheet(
                "Sheet1",
                &[&["DATE", "AMT"], &["01-01-2025", "10"], &["15-01-2025", "20"], &["01-02-2025", "30"]],
            )],
        )
    }

    #[test]
    fn test_sales_missing_workbook() {
        let rule = MappingRule::sales(names(&["A"]));
        let result = run_sales(&rule, None);
        assert_eq!(result.status, RunStatus::Failure);
        assert!(matches!(result.errors[0], StageError::MissingInput { .. }));
        assert!(result.output.is_none());
    }

    #[test]
    fn test_sales_invalid_rule_is_validation_error() {
        let rule = MappingRule::sales(names(&["A"])).with_start_row(0);
        let wb = Workbook::new("s.xlsx", vec![sheet("Sheet1", &[&["A"]])]);
        let result = run_sales(&rule, Some(&wb));
        assert!(matches!(result.errors[0], StageError::Validation { .. }));
    }

    #[test]
    fn test_sales_output_named_sheet1() {
        let rule = MappingRule::sales(names(&["Store", "Amount"]))
            .with_mapping("Store", "STORE")
            .with_mapping("Amount", "Gross");
        let wb = Workbook::new("s.xlsx", vec![sheet("Sheet1", &[&["STORE"], &["S1"]])]);
        let result = run_sales(&rule, Some(&wb));

        assert!(result.is_success());
        let table = &result.table(SALES_SHEET).unwrap().table;
        assert_eq!(table.get(0, "Store"), Some(&Value::text("S1")));
        assert_eq!(result.warnings.len(), 1);
        assert!(matches!(result.warnings[0].kind, WarningKind::UnresolvedColumn { .. }));
    }

    #[test]
    fn test_advances_requires_sales_reference() {
        let mut rule = default_advances_rule();
        rule.output_columns = default_columns(Domain::Advances);
        let wb = Workbook::new("a.xlsx", vec![sheet("Sheet", &[&["x"], &["Store"], &["S1"]])]);
        let result = run_advances(&rule, Some(&wb), None);
        assert!(matches!(result.errors[0], StageError::MissingInput { .. }));
    }

    #[test]
    fn test_advances_outputs_reference_and_enriched() {
        let mut rule = default_advances_rule();
        rule.output_columns = default_columns(Domain::Advances);
        let wb = Workbook::new("a.xlsx", vec![sheet("Sheet", &[&["title"], &["Store"], &["S1"], &["S2"]])]);
        let mut sales = OutputTable::new(names(&["StoreName", "StoreCode"]));
        sales.rows.push(vec![Value::text("S1"), Value::Number(100.0)]);

        let result = run_advances(&rule, Some(&wb), Some(&sales));
        assert!(result.is_success());
        let output = result.output.as_ref().unwrap();
        assert_eq!(output[0].name, "Sales");
        assert_eq!(output[0].table, sales);
        let advances = &output[1].table;
        assert_eq!(advances.get(0, "Store Code"), Some(&Value::Number(100.0)));
        assert_eq!(advances.get(1, "Store Code"), Some(&Value::Blank));
        let misses: Vec<_> = result
            .warnings
            .iter()
            .filter(|w| matches!(w.kind, WarningKind::LookupMiss { .. }))
            .collect();
        assert_eq!(misses.len(), 1);
    }

    #[test]
    fn test_banking_concatenates_with_ranges() {
        let range = DateRange::new(NaiveDate::from_ymd_opt(2025, 1, 1), NaiveDate::from_ymd_opt(2025, 1, 31));
        let uploads = vec![
            BankUpload::new(bank_rule("Amex"), bank_workbook("amex.xlsx")).with_range(range),
            BankUpload::new(bank_rule("HDFC"), bank_workbook("hdfc.xlsx")),
        ];
        let result = run_banking(&uploads);
        assert!(result.is_success(), "{:?}", result.errors);

        let table = &result.table(BANKING_SHEET).unwrap().table;
        assert_eq!(table.columns, names(&["Bank Name", "Credit Date", "Amount"]));
        assert_eq!(table.len(), 5);
        assert_eq!(table.get(0, "Bank Name"), Some(&Value::text("Amex")));
        assert_eq!(table.get(4, "Bank Name"), Some(&Value::text("HDFC")));
    }

    #[test]
    fn test_banking_duplicate_banks_rejected() {
        let uploads = vec![
            BankUpload::new(bank_rule("Amex"), bank_workbook("a.xlsx")),
            BankUpload::new(bank_rule("Amex"), bank_workbook("b.xlsx")),
        ];
        let result = run_banking(&uploads);
        assert!(matches!(result.errors[0], StageError::Validation { .. }));
        assert!(result.output.is_none());
    }

    #[test]
    fn test_banking_empty_upload_list() {
        let result = run_banking(&[]);
        assert!(matches!(result.errors[0], StageError::MissingInput { .. }));
    }

    #[test]
    fn test_banking_range_filtering_everything_warns() {
        let range = DateRange::new(NaiveDate::from_ymd_opt(2030, 1, 1), None);
        let uploads = vec![BankUpload::new(bank_rule("Amex"), bank_workbook("a.xlsx")).with_range(range)];
        let result = run_banking(&uploads);
        assert!(result.is_success());
        assert!(result.table(BANKING_SHEET).unwrap().table.is_empty());
        assert!(
            result
                .warnings
                .iter()
                .any(|w| matches!(w.kind, WarningKind::EmptyInput { .. }))
        );
    }

    #[test]
    fn test_banking_range_without_date_column_rejected() {
        let mut rule = bank_rule("Amex");
        if let RuleKind::Bank(BankExtras { date_filter_col, .. }) = &mut rule.kind {
            *date_filter_col = None;
        }
        let uploads = vec![BankUpload::new(rule, bank_workbook("a.xlsx")).with_range(DateRange::default())];
        let result = run_banking(&uploads);
        assert!(matches!(result.errors[0], StageError::Validation { .. }));
    }
}
