//! RunResult and the per-run state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::table::NamedTable;

/// Independently invokable pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Sales,
    Advances,
    Banking,
    Combine,
    Final,
    CombineFinal,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sales => write!(f, "sales"),
            Self::Advances => write!(f, "advances"),
            Self::Banking => write!(f, "banking"),
            Self::Combine => write!(f, "combine"),
            Self::Final => write!(f, "final"),
            Self::CombineFinal => write!(f, "combine_final"),
        }
    }
}

/// States of one stage invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Checking inputs are present and rules are valid
    #[default]
    Validating,
    /// Matching configured source columns to headers
    Resolving,
    /// Projecting rows and applying domain transforms
    Transforming,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Transitions only move forward; any non-terminal state may fail
    pub fn can_transition_to(&self, next: RunState) -> bool {
        match (self, next) {
            (Self::Validating, Self::Resolving) => true,
            (Self::Resolving, Self::Transforming) => true,
            // Multi-file stages resolve and transform each file in turn
            (Self::Transforming, Self::Resolving) => true,
            (Self::Transforming, Self::Succeeded) => true,
            (s, Self::Failed) => !s.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validating => write!(f, "validating"),
            Self::Resolving => write!(f, "resolving"),
            Self::Transforming => write!(f, "transforming"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Final outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failure,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

/// Fatal stage errors; any one of these fails the whole run
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageError {
    #[error("{stage} [{input}]: invalid rule: {message}")]
    Validation {
        stage: StageKind,
        input: String,
        message: String,
    },

    #[error("{stage} [{input}]: missing input: {message}")]
    MissingInput {
        stage: StageKind,
        input: String,
        message: String,
    },

    #[error("{stage} [{input}]: invalid rule configuration for column '{column}': {message}")]
    InvalidRuleConfiguration {
        stage: StageKind,
        input: String,
        column: String,
        message: String,
    },
}

/// Non-fatal problems, accumulated and returned with the result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WarningKind {
    /// A configured source column was not found in the header
    UnresolvedColumn { column: String, source_column: String },

    /// The case-insensitive fallback matched several header entries
    AmbiguousMatch {
        column: String,
        source_column: String,
        matches: usize,
    },

    /// A lookup key had no match in the reference table
    LookupMiss { key: String, row: usize },

    /// The preferred sheet was absent and the first sheet was read
    SheetFallback { preferred: String, used: String },

    /// Store or date column could not be detected
    KeyColumnNotDetected { missing: String },

    /// The input produced no data rows
    EmptyInput { detail: String },
}

impl std::fmt::Display for WarningKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnresolvedColumn { column, source_column } => {
                write!(f, "output column '{}': source column '{}' not found", column, source_column)
            }
            Self::AmbiguousMatch {
                column,
                source_column,
                matches,
            } => write!(
                f,
                "output column '{}': source column '{}' matched {} header entries, using the first",
                column, source_column, matches
            ),
            Self::LookupMiss { key, row } => write!(f, "row {}: lookup key '{}' not found", row, key),
            Self::SheetFallback { preferred, used } => {
                write!(f, "sheet '{}' not found, read '{}' instead", preferred, used)
            }
            Self::KeyColumnNotDetected { missing } => {
                write!(f, "{} column not detected, key column left blank", missing)
            }
            Self::EmptyInput { detail } => write!(f, "no data rows: {}", detail),
        }
    }
}

/// A warning tagged with the input it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub input: String,
    #[serde(flatten)]
    pub kind: WarningKind,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.input, self.kind)
    }
}

/// Outcome of one stage invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub stage: StageKind,
    pub status: RunStatus,
    /// Present iff the run succeeded
    pub output: Option<Vec<NamedTable>>,
    pub errors: Vec<StageError>,
    pub warnings: Vec<Warning>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Output table by name
    pub fn table(&self, name: &str) -> Option<&NamedTable> {
        self.output.as_ref()?.iter().find(|t| t.name == name)
    }

    /// First fatal error, if any
    pub fn first_error(&self) -> Option<&StageError> {
        self.errors.first()
    }
}

/// Drives one invocation through its states and collects warnings
#[derive(Debug)]
pub struct StageRun {
    run_id: Uuid,
    stage: StageKind,
    state: RunState,
    warnings: Vec<Warning>,
}

impl StageRun {
    pub fn new(stage: StageKind) -> Self {
        let run_id = Uuid::now_v7();
        debug!(%stage, %run_id, "StageRun::new: called");
        Self {
            run_id,
            stage,
            state: RunState::Validating,
            warnings: Vec::new(),
        }
    }

    pub fn stage(&self) -> StageKind {
        self.stage
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Move to the next state; illegal transitions are ignored and logged
    pub fn advance(&mut self, next: RunState) {
        if self.state.can_transition_to(next) {
            debug!(stage = %self.stage, from = %self.state, to = %next, "StageRun::advance: called");
            self.state = next;
        } else {
            warn!(stage = %self.stage, from = %self.state, to = %next, "Ignoring illegal run state transition");
        }
    }

    pub fn warn(&mut self, input: impl Into<String>, kind: WarningKind) {
        let input = input.into();
        debug!(stage = %self.stage, %input, warning = %kind, "StageRun::warn: called");
        self.warnings.push(Warning { input, kind });
    }

    pub fn extend_warnings(&mut self, input: &str, kinds: impl IntoIterator<Item = WarningKind>) {
        for kind in kinds {
            self.warn(input, kind);
        }
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Terminate as Failed; no output is returned
    pub fn fail(mut self, error: StageError) -> RunResult {
        self.advance(RunState::Failed);
        warn!(stage = %self.stage, run_id = %self.run_id, %error, "Stage failed");
        RunResult {
            run_id: self.run_id,
            stage: self.stage,
            status: RunStatus::Failure,
            output: None,
            errors: vec![error],
            warnings: self.warnings,
            finished_at: Utc::now(),
        }
    }

    /// Terminate as Succeeded with the stage's tables
    pub fn succeed(mut self, output: Vec<NamedTable>) -> RunResult {
        self.advance(RunState::Succeeded);
        info!(
            stage = %self.stage,
            run_id = %self.run_id,
            tables = output.len(),
            warnings = self.warnings.len(),
            "Stage succeeded"
        );
        RunResult {
            run_id: self.run_id,
            stage: self.stage,
            status: RunStatus::Success,
            output: Some(output),
            errors: Vec::new(),
            warnings: self.warnings,
            finished_at: Utc::now(),
        }
    }
}
