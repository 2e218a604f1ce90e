//! Stage runners
//!
//! Every stage invocation is a [`StageRun`] moving through
//! Validating -> Resolving -> Transforming -> Succeeded/Failed and ends in a
//! [`RunResult`]. Output is all-or-nothing: a failed run never carries
//! tables, and multi-file stages fail as a whole when any file fails.

mod combine;
mod detect;
mod final_mis;
mod input;
mod mapping;
mod result;

pub use combine::{COMBINE_SHEET, run_combine};
pub use detect::{detect_date_column, detect_store_column, find_column_by_keywords, match_key};
pub use final_mis::{run_combine_final, run_final, run_final_from_outputs};
pub use input::read_input_table;
pub use mapping::{
    ADVANCES_REFERENCE_SHEET, ADVANCES_SHEET, BANKING_SHEET, BankUpload, SALES_SHEET, run_advances, run_banking, run_sales,
};
pub use result::{RunResult, RunState, RunStatus, StageError, StageKind, StageRun, Warning, WarningKind};
