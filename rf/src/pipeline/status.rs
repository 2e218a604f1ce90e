//! Latest-run summary and the status report built from it

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::stage::{RunResult, RunStatus, StageKind};

/// Summary of the most recent stage invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub stage: StageKind,
    pub status: RunStatus,
    pub error_count: usize,
    pub warning_count: usize,
    pub finished_at: DateTime<Utc>,
    /// Display text of the first fatal error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_error: Option<String>,
}

impl RunSummary {
    pub fn from_result(result: &RunResult) -> Self {
        Self {
            run_id: result.run_id,
            stage: result.stage,
            status: result.status,
            error_count: result.errors.len(),
            warning_count: result.warnings.len(),
            finished_at: result.finished_at,
            first_error: result.first_error().map(|e| e.to_string()),
        }
    }

    /// Mark a run failed after the fact, e.g. when its output could not be written
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.status = RunStatus::Failure;
        self.error_count += 1;
        if self.first_error.is_none() {
            self.first_error = Some(message.into());
        }
        self
    }
}

/// Snapshot handed to status reporting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub available: bool,
    pub has_errors: bool,
    pub error_count: usize,
    pub warning_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusReport {
    /// Report before any run has finished
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn from_summary(summary: Option<&RunSummary>) -> Self {
        let Some(summary) = summary else {
            return Self::unavailable();
        };
        Self {
            available: true,
            has_errors: summary.error_count > 0,
            error_count: summary.error_count,
            warning_count: summary.warning_count,
            stage: Some(summary.stage),
            run_id: Some(summary.run_id),
            finished_at: Some(summary.finished_at),
            message: summary.first_error.clone(),
        }
    }
}

/// Persist a summary as JSON
pub fn save_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    debug!(?path, run_id = %summary.run_id, "save_summary: called");
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).context("Failed to create status directory")?;
    }
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
    fs::write(path, json).context(format!("Failed to write status file {}", path.display()))?;
    Ok(())
}

/// Load a persisted summary; a missing file means no run yet
pub fn load_summary(path: &Path) -> Result<Option<RunSummary>> {
    debug!(?path, "load_summary: called");
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).context(format!("Failed to read status file {}", path.display()))?;
    let summary = serde_json::from_str(&content).context("Failed to parse status file")?;
    Ok(Some(summary))
}
