//! Spreadsheet file I/O
//!
//! Reading turns an upload's bytes into a [`Workbook`](crate::table::Workbook);
//! writing turns stage output into xlsx bytes. Nothing here knows about rules
//! or stages.

mod reader;
mod writer;

use std::path::PathBuf;

use thiserror::Error;

pub use reader::{CSV_SHEET, load_workbooks, read_workbook, read_workbook_file};
pub use writer::write_tables;

/// Errors from reading or writing spreadsheet files
#[derive(Debug, Error)]
pub enum IoError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not open {name} as a spreadsheet: {message}")]
    Spreadsheet { name: String, message: String },

    #[error("Could not parse {name} as csv: {source}")]
    Csv {
        name: String,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to write workbook: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("Output too large: {0} exceeds the sheet limit")]
    TooLarge(String),

    #[error("Background read failed: {0}")]
    Task(String),
}
