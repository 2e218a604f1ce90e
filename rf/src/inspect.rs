//! Pre-flight inspection of uploaded workbooks
//!
//! Reports sheets and header columns without applying any rule. The sheet a
//! run would read is computed by [`Workbook::select_sheet`], the function the
//! stages use.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::table::Workbook;

/// What an upload is being inspected for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InspectTarget {
    Sales,
    Advances,
    Bank(String),
    Combine,
    Final,
}

impl std::fmt::Display for InspectTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sales => write!(f, "sales"),
            Self::Advances => write!(f, "advances"),
            Self::Bank(name) => write!(f, "bank:{}", name),
            Self::Combine => write!(f, "combine"),
            Self::Final => write!(f, "final"),
        }
    }
}

impl std::str::FromStr for InspectTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sales" => Ok(Self::Sales),
            "advances" => Ok(Self::Advances),
            "combine" => Ok(Self::Combine),
            "final" => Ok(Self::Final),
            _ => match s.split_once(':') {
                Some((prefix, name)) if prefix.eq_ignore_ascii_case("bank") && !name.trim().is_empty() => {
                    Ok(Self::Bank(name.trim().to_string()))
                }
                _ => Err(format!(
                    "Unknown inspect target: {}. Use: sales, advances, bank:<name>, combine, or final",
                    s
                )),
            },
        }
    }
}

/// Sheets and headers of one workbook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionResult {
    /// Sheet names in workbook order
    pub sheets: Vec<String>,
    pub preferred_sheet: String,
    /// True iff `preferred_sheet` exactly equals one of `sheets`
    pub preferred_present: bool,
    /// Sheet a run would read; `None` for a workbook without sheets
    pub selected_sheet: Option<String>,
    /// 1-based row the headers were read from
    pub header_row: usize,
    /// Header cells per sheet; empty when the sheet has no such row
    pub sheet_columns: BTreeMap<String, Vec<String>>,
}

/// Inspect a workbook for a preferred sheet and header row
pub fn inspect(preferred_sheet: &str, header_row: usize, workbook: &Workbook) -> InspectionResult {
    debug!(workbook = %workbook.name, %preferred_sheet, header_row, "inspect: called");
    let sheet_columns = workbook
        .sheets
        .iter()
        .map(|s| (s.name.clone(), s.header(header_row).unwrap_or_default()))
        .collect();

    InspectionResult {
        sheets: workbook.sheet_names(),
        preferred_sheet: preferred_sheet.to_string(),
        preferred_present: workbook.has_sheet(preferred_sheet),
        selected_sheet: workbook.select_sheet(preferred_sheet).map(|s| s.sheet.name.clone()),
        header_row,
        sheet_columns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Sheet, Value};

    fn workbook() -> Workbook {
        Workbook::new(
            "upload.xlsx",
            vec![
                Sheet::new("Cover", vec![vec![Value::text("title")]]),
                Sheet::new(
                    "Data",
                    vec![vec![Value::text("junk")], vec![Value::text("Store"), Value::text("Amount")]],
                ),
            ],
        )
    }

    #[test]
    fn test_preferred_present() {
        let result = inspect("Data", 2, &workbook());
        assert_eq!(result.sheets, vec!["Cover", "Data"]);
        assert!(result.preferred_present);
        assert_eq!(result.selected_sheet.as_deref(), Some("Data"));
        assert_eq!(result.sheet_columns["Data"], vec!["Store", "Amount"]);
        assert!(result.sheet_columns["Cover"].is_empty());
    }

    #[test]
    fn test_preferred_absent_reports_first_sheet() {
        let result = inspect("data", 1, &workbook());
        assert!(!result.preferred_present);
        assert_eq!(result.selected_sheet.as_deref(), Some("Cover"));
        assert_eq!(result.sheet_columns["Cover"], vec!["title"]);
    }

    #[test]
    fn test_empty_preferred_never_present() {
        let result = inspect("", 1, &workbook());
        assert!(!result.preferred_present);
        assert_eq!(result.selected_sheet.as_deref(), Some("Cover"));
    }

    #[test]
    fn test_target_parse() {
        assert_eq!("final".parse::<InspectTarget>(), Ok(InspectTarget::Final));
        assert_eq!("BANK:Amex".parse::<InspectTarget>(), Ok(InspectTarget::Bank("Amex".into())));
        assert!("banks".parse::<InspectTarget>().is_err());
        assert_eq!(InspectTarget::Combine.to_string(), "combine");
    }
}
