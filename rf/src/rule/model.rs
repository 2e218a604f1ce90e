//! MappingRule domain type
//!
//! A rule binds a domain's canonical output columns to the source columns of
//! an uploaded sheet, plus the domain's special transforms. The per-domain
//! extras are a tagged variant so a Sales field can never end up on a Bank
//! rule.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Processing context a rule belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Sales,
    Advances,
    Bank,
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sales => write!(f, "sales"),
            Self::Advances => write!(f, "advances"),
            Self::Bank => write!(f, "bank"),
        }
    }
}

impl std::str::FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sales" => Ok(Self::Sales),
            "advances" => Ok(Self::Advances),
            "bank" | "banking" => Ok(Self::Bank),
            _ => Err(format!("Unknown domain: {}. Use: sales, advances, or bank", s)),
        }
    }
}

/// Identifies one stored rule
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleKey {
    Sales,
    Advances,
    Bank(String),
}

impl RuleKey {
    pub fn domain(&self) -> Domain {
        match self {
            Self::Sales => Domain::Sales,
            Self::Advances => Domain::Advances,
            Self::Bank(_) => Domain::Bank,
        }
    }
}

impl std::fmt::Display for RuleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sales => write!(f, "sales"),
            Self::Advances => write!(f, "advances"),
            Self::Bank(name) => write!(f, "bank:{}", name),
        }
    }
}

impl std::str::FromStr for RuleKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sales" => Ok(Self::Sales),
            "advances" => Ok(Self::Advances),
            _ => match s.split_once(':') {
                Some((prefix, name)) if prefix.eq_ignore_ascii_case("bank") && !name.trim().is_empty() => {
                    Ok(Self::Bank(name.trim().to_string()))
                }
                _ => Err(format!("Unknown rule: {}. Use: sales, advances, or bank:<name>", s)),
            },
        }
    }
}

/// Sales-only transforms
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SalesExtras {
    /// Column whose values are copied into `copy_col_dest`
    #[serde(rename = "copy-col-source", skip_serializing_if = "Option::is_none")]
    pub copy_col_source: Option<String>,

    #[serde(rename = "copy-col-dest", skip_serializing_if = "Option::is_none")]
    pub copy_col_dest: Option<String>,

    /// Output columns dropped from the report
    #[serde(rename = "bp-remove-cols", skip_serializing_if = "Vec::is_empty")]
    pub bp_remove_cols: Vec<String>,

    /// Column checked by the prefix row filter
    #[serde(rename = "prefix-remove-col", skip_serializing_if = "Option::is_none")]
    pub prefix_remove_col: Option<String>,

    /// Rows whose `prefix_remove_col` value starts with any of these are dropped
    #[serde(rename = "prefix-remove-values", skip_serializing_if = "Vec::is_empty")]
    pub prefix_remove_values: Vec<String>,

    /// Marker removed from store code values so they match bank SAP codes
    #[serde(rename = "marker-strip", skip_serializing_if = "Option::is_none")]
    pub marker_strip: Option<MarkerStrip>,
}

/// Advances-only transforms (VLOOKUP enrichment against processed sales)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancesExtras {
    /// Advances column holding the lookup key
    #[serde(rename = "vlookup-source-col", skip_serializing_if = "Option::is_none")]
    pub vlookup_source_col: Option<String>,

    /// Reference (sales) column the key is matched against
    #[serde(rename = "vlookup-sales-col", skip_serializing_if = "Option::is_none")]
    pub vlookup_sales_col: Option<String>,

    /// Advances column that receives the looked-up value
    #[serde(rename = "vlookup-dest-col", skip_serializing_if = "Option::is_none")]
    pub vlookup_dest_col: Option<String>,

    /// Reference (sales) column the value is taken from
    #[serde(rename = "vlookup-value-col", skip_serializing_if = "Option::is_none")]
    pub vlookup_value_col: Option<String>,
}

/// Fully configured lookup, borrowed from [`AdvancesExtras`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookup<'a> {
    pub source_col: &'a str,
    pub sales_col: &'a str,
    pub dest_col: &'a str,
    pub value_col: &'a str,
}

impl AdvancesExtras {
    /// The lookup, when all four columns are configured
    pub fn lookup(&self) -> Option<Lookup<'_>> {
        Some(Lookup {
            source_col: self.vlookup_source_col.as_deref()?,
            sales_col: self.vlookup_sales_col.as_deref()?,
            dest_col: self.vlookup_dest_col.as_deref()?,
            value_col: self.vlookup_value_col.as_deref()?,
        })
    }

    fn missing_fields(&self) -> Vec<&'static str> {
        let fields = [
            ("vlookup-source-col", &self.vlookup_source_col),
            ("vlookup-sales-col", &self.vlookup_sales_col),
            ("vlookup-dest-col", &self.vlookup_dest_col),
            ("vlookup-value-col", &self.vlookup_value_col),
        ];
        fields
            .iter()
            .filter(|(_, v)| v.as_deref().is_none_or(|s| s.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect()
    }
}

/// Marker text removed from code values (e.g. the `BP` prefix on SAP codes)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerStrip {
    #[serde(default = "default_marker")]
    pub marker: String,
    pub columns: Vec<String>,
}

fn default_marker() -> String {
    "BP".to_string()
}

/// Bank-only fields and transforms
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankExtras {
    #[serde(rename = "bank-name")]
    pub bank_name: String,

    /// Output columns dropped from the report
    #[serde(rename = "bp-remove-cols", skip_serializing_if = "Vec::is_empty")]
    pub bp_remove_cols: Vec<String>,

    /// Output column -> constant text written on every row
    #[serde(rename = "fixed-values", skip_serializing_if = "BTreeMap::is_empty")]
    pub fixed_values: BTreeMap<String, String>,

    #[serde(rename = "marker-strip", skip_serializing_if = "Option::is_none")]
    pub marker_strip: Option<MarkerStrip>,

    /// Output column holding the credit date used by the upload's date range
    #[serde(rename = "date-filter-col", skip_serializing_if = "Option::is_none")]
    pub date_filter_col: Option<String>,
}

/// Domain tag plus that domain's extras
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum RuleKind {
    Sales(SalesExtras),
    Advances(AdvancesExtras),
    Bank(BankExtras),
}

/// Declarative mapping for one domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRule {
    #[serde(flatten)]
    pub kind: RuleKind,

    /// Worksheet to read; empty means the first sheet
    #[serde(rename = "sheet-name", default)]
    pub sheet_name: String,

    /// 1-based row the table (header row) starts on
    #[serde(rename = "start-row", default = "default_start_row")]
    pub start_row: usize,

    /// Canonical output columns, filled from the column catalog on load
    #[serde(skip)]
    pub output_columns: Vec<String>,

    /// Output column -> source column; absent keys stay blank
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,
}

fn default_start_row() -> usize {
    1
}

impl MappingRule {
    fn with_kind(kind: RuleKind, output_columns: Vec<String>) -> Self {
        Self {
            kind,
            sheet_name: String::new(),
            start_row: default_start_row(),
            output_columns,
            mapping: BTreeMap::new(),
        }
    }

    /// New Sales rule with no mapping
    pub fn sales(output_columns: Vec<String>) -> Self {
        Self::with_kind(RuleKind::Sales(SalesExtras::default()), output_columns)
    }

    /// New Advances rule with no mapping
    pub fn advances(output_columns: Vec<String>) -> Self {
        Self::with_kind(RuleKind::Advances(AdvancesExtras::default()), output_columns)
    }

    /// New Bank rule with no mapping
    pub fn bank(bank_name: impl Into<String>, output_columns: Vec<String>) -> Self {
        Self::with_kind(
            RuleKind::Bank(BankExtras {
                bank_name: bank_name.into(),
                ..Default::default()
            }),
            output_columns,
        )
    }

    /// Builder: map an output column to a source column
    pub fn with_mapping(mut self, output: impl Into<String>, source: impl Into<String>) -> Self {
        self.mapping.insert(output.into(), source.into());
        self
    }

    /// Builder: set the preferred sheet
    pub fn with_sheet(mut self, sheet_name: impl Into<String>) -> Self {
        self.sheet_name = sheet_name.into();
        self
    }

    /// Builder: set the start row
    pub fn with_start_row(mut self, start_row: usize) -> Self {
        self.start_row = start_row;
        self
    }

    pub fn domain(&self) -> Domain {
        match self.kind {
            RuleKind::Sales(_) => Domain::Sales,
            RuleKind::Advances(_) => Domain::Advances,
            RuleKind::Bank(_) => Domain::Bank,
        }
    }

    pub fn bank_name(&self) -> Option<&str> {
        match &self.kind {
            RuleKind::Bank(extras) => Some(&extras.bank_name),
            _ => None,
        }
    }

    pub fn key(&self) -> RuleKey {
        match &self.kind {
            RuleKind::Sales(_) => RuleKey::Sales,
            RuleKind::Advances(_) => RuleKey::Advances,
            RuleKind::Bank(extras) => RuleKey::Bank(extras.bank_name.clone()),
        }
    }

    /// Columns the rule drops after projection
    pub fn removed_columns(&self) -> &[String] {
        match &self.kind {
            RuleKind::Sales(extras) => &extras.bp_remove_cols,
            RuleKind::Bank(extras) => &extras.bp_remove_cols,
            RuleKind::Advances(_) => &[],
        }
    }

    pub fn has_output_column(&self, column: &str) -> bool {
        self.output_columns.iter().any(|c| c == column)
    }
}

/// Structural problems with a rule, fatal before a run starts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{rule}: start row must be at least 1 (got {start_row})")]
    StartRow { rule: String, start_row: usize },

    #[error("{rule}: no output columns configured")]
    NoOutputColumns { rule: String },

    #[error("{rule}: output column '{column}' is listed more than once")]
    DuplicateOutputColumn { rule: String, column: String },

    #[error("{rule}: mapping key '{key}' is not an output column")]
    UnknownMappingKey { rule: String, key: String },

    #[error("bank rule has an empty bank name")]
    EmptyBankName,

    #[error("bank '{name}' is configured more than once")]
    DuplicateBank { name: String },

    #[error("{rule}: copy rule needs both copy-col-source and copy-col-dest")]
    IncompleteCopy { rule: String },

    #[error("{rule}: prefix-remove-values configured without prefix-remove-col")]
    PrefixWithoutColumn { rule: String },

    #[error("{rule}: prefix-remove-values contains an empty prefix")]
    EmptyPrefix { rule: String },

    #[error("{rule}: lookup is partially configured, missing {missing}")]
    IncompleteLookup { rule: String, missing: String },

    #[error("{rule}: marker-strip has an empty marker")]
    EmptyMarker { rule: String },
}

/// Check a rule's structural invariants
///
/// Whether mapped source columns exist in a file is a resolution-time concern
/// and is not checked here. Transform column references are checked by the
/// transform engine when a run starts.
pub fn validate(rule: &MappingRule) -> Vec<ValidationError> {
    let label = rule.key().to_string();
    debug!(rule = %label, "validate: called");
    let mut errors = Vec::new();

    if rule.start_row < 1 {
        errors.push(ValidationError::StartRow {
            rule: label.clone(),
            start_row: rule.start_row,
        });
    }

    errors.extend(validate_columns(&label, &rule.output_columns));

    for key in rule.mapping.keys() {
        if !rule.has_output_column(key) {
            errors.push(ValidationError::UnknownMappingKey {
                rule: label.clone(),
                key: key.clone(),
            });
        }
    }

    match &rule.kind {
        RuleKind::Sales(extras) => {
            if extras.copy_col_source.is_some() != extras.copy_col_dest.is_some() {
                errors.push(ValidationError::IncompleteCopy { rule: label.clone() });
            }
            if !extras.prefix_remove_values.is_empty() && extras.prefix_remove_col.is_none() {
                errors.push(ValidationError::PrefixWithoutColumn { rule: label.clone() });
            }
            if extras.prefix_remove_values.iter().any(|p| p.is_empty()) {
                errors.push(ValidationError::EmptyPrefix { rule: label.clone() });
            }
            if extras.marker_strip.as_ref().is_some_and(|s| s.marker.is_empty()) {
                errors.push(ValidationError::EmptyMarker { rule: label.clone() });
            }
        }
        RuleKind::Advances(extras) => {
            let missing = extras.missing_fields();
            if !missing.is_empty() && missing.len() < 4 {
                errors.push(ValidationError::IncompleteLookup {
                    rule: label.clone(),
                    missing: missing.join(", "),
                });
            }
        }
        RuleKind::Bank(extras) => {
            if extras.bank_name.trim().is_empty() {
                errors.push(ValidationError::EmptyBankName);
            }
            if let Some(strip) = &extras.marker_strip
                && strip.marker.is_empty()
            {
                errors.push(ValidationError::EmptyMarker { rule: label.clone() });
            }
        }
    }

    debug!(rule = %label, count = errors.len(), "validate: done");
    errors
}

/// Check an output column list: non-empty and without repeats
pub fn validate_columns(label: &str, columns: &[String]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if columns.is_empty() {
        errors.push(ValidationError::NoOutputColumns { rule: label.to_string() });
    }
    let mut seen = HashSet::new();
    for column in columns {
        if !seen.insert(column.as_str()) {
            errors.push(ValidationError::DuplicateOutputColumn {
                rule: label.to_string(),
                column: column.clone(),
            });
        }
    }
    errors
}

/// Check that the bank rules of one Banking run name distinct banks
pub fn validate_bank_set<'a>(rules: impl IntoIterator<Item = &'a MappingRule>) -> Vec<ValidationError> {
    let mut seen = HashSet::new();
    let mut errors = Vec::new();
    for name in rules.into_iter().filter_map(MappingRule::bank_name) {
        if !seen.insert(name) {
            errors.push(ValidationError::DuplicateBank { name: name.to_string() });
        }
    }
    errors
}
