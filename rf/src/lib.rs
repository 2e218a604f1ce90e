//! Reconflow - rule-driven spreadsheet reconciliation
//!
//! Reconflow turns heterogeneous spreadsheet exports (sales, advances, bank
//! settlements) into tables with a fixed column layout, then merges MIS
//! working files and pushes their figures into a final reconciliation
//! workbook.
//!
//! # Core Concepts
//!
//! - **Rules, not code**: each domain is driven by a stored [`MappingRule`]
//!   mapping canonical output columns to source headers
//! - **Tolerant headers**: source columns resolve exactly, then trimmed and
//!   case-insensitive; misses become warnings, never guesses
//! - **All or nothing**: a failed run carries no output, and a multi-file
//!   run fails as a whole
//!
//! # Modules
//!
//! - [`rule`] - Rule model, validation, column catalogs and storage
//! - [`resolve`] - Header resolution
//! - [`transform`] - Domain transforms and the lookup enrichment
//! - [`stage`] - Stage runners and run results
//! - [`pipeline`] - Stage entry points and latest-run status
//! - [`inspect`] - Pre-flight inspection of uploads
//! - [`io`] - Spreadsheet reading and writing
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod inspect;
pub mod io;
pub mod pipeline;
pub mod resolve;
pub mod rule;
pub mod stage;
pub mod table;
pub mod transform;

// Re-export commonly used types
pub use config::{CombineConfig, Config, FinalConfig, StorageConfig};
pub use inspect::{InspectTarget, InspectionResult, inspect};
pub use io::{IoError, read_workbook, write_tables};
pub use pipeline::{BankFile, Pipeline, RunSummary, StatusReport};
pub use resolve::{Resolution, ResolvedColumn, ResolvedMap, resolve};
pub use rule::{
    Domain, MappingRule, MemoryRuleStore, RuleKey, RuleKind, RuleStore, StoreError, ValidationError, YamlRuleStore,
    column_letter,
};
pub use stage::{RunResult, RunState, RunStatus, StageError, StageKind, Warning, WarningKind};
pub use table::{InputTable, NamedTable, OutputTable, Sheet, Value, Workbook};
pub use transform::{DateRange, TransformError};
