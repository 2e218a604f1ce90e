//! Transform engine
//!
//! Projects an input table through a resolved map, then applies the rule's
//! domain transforms in a fixed order:
//!
//! 1. `bp-remove-cols` column removal (Sales, Bank)
//! 2. fixed values, with `Bank Name` and `Mode` defaults (Bank)
//! 3. marker stripping (Sales, Bank)
//! 4. prefix row filter (Sales)
//! 5. column copy (Sales)
//! 6. lookup enrichment (Advances)
//!
//! The Bank date range filter is applied by the Banking stage afterwards
//! with [`filter_date_range`], since the range belongs to the upload rather
//! than the rule.
//!
//! Values are moved, blanked or dropped; marker stripping is the only
//! transform that edits a value, and it keeps text as text.

mod lookup;
mod ops;

use std::collections::{BTreeMap, HashSet};

use thiserror::Error;
use tracing::{debug, info};

use crate::resolve::ResolvedMap;
use crate::rule::{BankExtras, MappingRule, MarkerStrip, RuleKind};
use crate::stage::WarningKind;
use crate::table::{InputTable, OutputTable, Value};

pub use lookup::lookup_enrich;
pub use ops::{DateRange, copy_column, drop_prefixed_rows, filter_date_range, set_fixed_values, strip_marker, strip_marker_text};

/// Bank output column defaulted to the rule's bank name
pub const BANK_NAME_COLUMN: &str = "Bank Name";

/// Bank output column defaulted to [`DEFAULT_MODE`]
pub const MODE_COLUMN: &str = "Mode";

pub const DEFAULT_MODE: &str = "Card";

/// A transform references a column it cannot use
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("{transform} references '{column}', which is not an output column")]
    UnknownColumn { transform: &'static str, column: String },

    #[error("{transform} references '{column}', which bp-remove-cols removes")]
    RemovedColumn { transform: &'static str, column: String },

    #[error("reference table has no column '{column}' required by the lookup")]
    MissingReferenceColumn { column: String },

    #[error("lookup requires the processed sales table as reference")]
    MissingReference,
}

impl TransformError {
    /// Column the error is about, empty when there is none
    pub fn column(&self) -> &str {
        match self {
            Self::UnknownColumn { column, .. }
            | Self::RemovedColumn { column, .. }
            | Self::MissingReferenceColumn { column } => column,
            Self::MissingReference => "",
        }
    }
}

/// Transformed table plus row-level warnings
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub table: OutputTable,
    pub warnings: Vec<WarningKind>,
}

struct ColumnCheck<'a> {
    rule: &'a MappingRule,
    removed: HashSet<&'a str>,
}

impl<'a> ColumnCheck<'a> {
    fn new(rule: &'a MappingRule) -> Self {
        Self {
            rule,
            removed: rule.removed_columns().iter().map(String::as_str).collect(),
        }
    }

    fn known(&self, transform: &'static str, column: &str) -> Result<(), TransformError> {
        if self.rule.has_output_column(column) {
            Ok(())
        } else {
            Err(TransformError::UnknownColumn {
                transform,
                column: column.to_string(),
            })
        }
    }

    fn kept(&self, transform: &'static str, column: &str) -> Result<(), TransformError> {
        self.known(transform, column)?;
        if self.removed.contains(column) {
            return Err(TransformError::RemovedColumn {
                transform,
                column: column.to_string(),
            });
        }
        Ok(())
    }
}

/// Check every column the rule's transforms reference, before rows are touched
pub fn check_configuration(rule: &MappingRule, reference: Option<&OutputTable>) -> Result<(), TransformError> {
    debug!(rule = %rule.key(), has_reference = reference.is_some(), "check_configuration: called");
    let check = ColumnCheck::new(rule);

    for column in rule.removed_columns() {
        check.known("bp-remove-cols", column)?;
    }

    match &rule.kind {
        RuleKind::Sales(extras) => {
            check_marker_strip(&check, extras.marker_strip.as_ref())?;
            if let Some(column) = &extras.prefix_remove_col {
                check.kept("prefix-remove-col", column)?;
            }
            if let (Some(source), Some(dest)) = (&extras.copy_col_source, &extras.copy_col_dest) {
                check.kept("copy-col-source", source)?;
                check.kept("copy-col-dest", dest)?;
            }
        }
        RuleKind::Advances(extras) => {
            if let Some(lookup) = extras.lookup() {
                check.known("vlookup-source-col", lookup.source_col)?;
                check.known("vlookup-dest-col", lookup.dest_col)?;
                let reference = reference.ok_or(TransformError::MissingReference)?;
                for column in [lookup.sales_col, lookup.value_col] {
                    if reference.column_index(column).is_none() {
                        return Err(TransformError::MissingReferenceColumn {
                            column: column.to_string(),
                        });
                    }
                }
            }
        }
        RuleKind::Bank(extras) => {
            for column in extras.fixed_values.keys() {
                check.kept("fixed-values", column)?;
            }
            check_marker_strip(&check, extras.marker_strip.as_ref())?;
            if let Some(column) = &extras.date_filter_col {
                check.kept("date-filter-col", column)?;
            }
        }
    }
    Ok(())
}

fn check_marker_strip(check: &ColumnCheck<'_>, strip: Option<&MarkerStrip>) -> Result<(), TransformError> {
    for column in strip.map(|s| s.columns.as_slice()).unwrap_or_default() {
        check.kept("marker-strip", column)?;
    }
    Ok(())
}

/// Configured fixed values plus the `Bank Name` and `Mode` defaults
///
/// A default applies only when the column is neither fixed nor mapped to a
/// source column.
pub fn bank_fixed_values(rule: &MappingRule, extras: &BankExtras) -> BTreeMap<String, String> {
    let mut values = extras.fixed_values.clone();
    for (column, text) in [(BANK_NAME_COLUMN, extras.bank_name.as_str()), (MODE_COLUMN, DEFAULT_MODE)] {
        if !rule.mapping.contains_key(column) && !values.contains_key(column) {
            values.insert(column.to_string(), text.to_string());
        }
    }
    values
}

/// Build the output table by projecting every input row through `resolved`
pub fn project(resolved: &ResolvedMap, input: &InputTable) -> OutputTable {
    debug!(rows = input.rows.len(), columns = resolved.columns.len(), "project: called");
    let mut table = OutputTable::new(resolved.columns.iter().map(|c| c.output.clone()).collect());
    table.rows = input
        .rows
        .iter()
        .map(|row| {
            resolved
                .columns
                .iter()
                .map(|c| c.index.and_then(|i| row.get(i)).cloned().unwrap_or(Value::Blank))
                .collect()
        })
        .collect();
    table
}

/// Apply a rule to a resolved input table
///
/// `reference` is the processed Sales table; only Advances lookups need it.
pub fn apply(
    rule: &MappingRule,
    resolved: &ResolvedMap,
    input: &InputTable,
    reference: Option<&OutputTable>,
) -> Result<Transformed, TransformError> {
    debug!(rule = %rule.key(), rows = input.rows.len(), "apply: called");
    check_configuration(rule, reference)?;

    let mut table = project(resolved, input);
    let mut warnings = Vec::new();

    for column in rule.removed_columns() {
        table.remove_column(column);
    }

    match &rule.kind {
        RuleKind::Sales(extras) => {
            if let Some(strip) = &extras.marker_strip {
                strip_marker(&mut table, &strip.marker, &strip.columns);
            }
            if let Some(column) = &extras.prefix_remove_col
                && !extras.prefix_remove_values.is_empty()
            {
                let dropped = drop_prefixed_rows(&mut table, column, &extras.prefix_remove_values);
                info!(%column, dropped, "Dropped rows by prefix");
            }
            if let (Some(source), Some(dest)) = (&extras.copy_col_source, &extras.copy_col_dest) {
                copy_column(&mut table, source, dest);
            }
        }
        RuleKind::Advances(extras) => {
            if let (Some(lookup), Some(reference)) = (extras.lookup(), reference) {
                warnings.extend(lookup_enrich(&mut table, &lookup, reference));
            }
        }
        RuleKind::Bank(extras) => {
            set_fixed_values(&mut table, &bank_fixed_values(rule, extras));
            if let Some(strip) = &extras.marker_strip {
                strip_marker(&mut table, &strip.marker, &strip.columns);
            }
        }
    }

    debug!(rows = table.len(), warnings = warnings.len(), "apply: done");
    Ok(Transformed { table, warnings })
}
