//! Tabular data model
//!
//! Workbooks are loaded whole into [`Workbook`]/[`Sheet`] grids, cut into
//! [`InputTable`]s at a rule's start row, and stages produce
//! [`OutputTable`]s.

mod sheet;
mod value;

pub use sheet::{InputTable, NamedTable, OutputTable, Sheet, SheetSelection, Workbook};
pub use value::{Value, format_date, parse_date_text};
