//! Pipeline coordinator
//!
//! One entry point per stage. Calls share nothing except the latest-run
//! summary, which is replaced wholesale after every call and read as a
//! snapshot.

mod status;

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::config::{CombineConfig, Config, FinalConfig};
use crate::inspect::{InspectTarget, InspectionResult, inspect};
use crate::rule::{MappingRule, RuleKey, RuleStore, StoreError};
use crate::stage::{self, BankUpload, RunResult, StageError, StageKind, StageRun};
use crate::table::{OutputTable, Workbook};
use crate::transform::DateRange;

pub use status::{RunSummary, StatusReport, load_summary, save_summary};

/// A bank file as uploaded: the rule is looked up by bank name
#[derive(Debug, Clone)]
pub struct BankFile {
    pub bank_name: String,
    pub workbook: Workbook,
    pub range: Option<DateRange>,
}

impl BankFile {
    pub fn new(bank_name: impl Into<String>, workbook: Workbook) -> Self {
        Self {
            bank_name: bank_name.into(),
            workbook,
            range: None,
        }
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.range = Some(range);
        self
    }
}

/// Entry point for every stage
pub struct Pipeline {
    store: Arc<dyn RuleStore>,
    combine: CombineConfig,
    final_mis: FinalConfig,
    latest: RwLock<Option<RunSummary>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("combine", &self.combine)
            .field("final_mis", &self.final_mis)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(store: Arc<dyn RuleStore>, config: &Config) -> Self {
        Self::with_settings(store, config.combine.clone(), config.final_mis.clone())
    }

    pub fn with_settings(store: Arc<dyn RuleStore>, combine: CombineConfig, final_mis: FinalConfig) -> Self {
        debug!("Pipeline::with_settings: called");
        Self {
            store,
            combine,
            final_mis,
            latest: RwLock::new(None),
        }
    }

    fn load_rule(&self, stage: StageKind, key: &RuleKey) -> Result<MappingRule, StageError> {
        self.store.load_rule(key).map_err(|e| StageError::Validation {
            stage,
            input: key.to_string(),
            message: e.to_string(),
        })
    }

    /// Replace the latest-run summary and hand the result back
    fn record(&self, result: RunResult) -> RunResult {
        let summary = RunSummary::from_result(&result);
        info!(
            stage = %summary.stage,
            status = %summary.status,
            errors = summary.error_count,
            warnings = summary.warning_count,
            "Recorded run"
        );
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(summary);
        result
    }

    pub fn run_sales(&self, workbook: Option<&Workbook>) -> RunResult {
        debug!("Pipeline::run_sales: called");
        let result = match self.load_rule(StageKind::Sales, &RuleKey::Sales) {
            Ok(rule) => stage::run_sales(&rule, workbook),
            Err(e) => StageRun::new(StageKind::Sales).fail(e),
        };
        self.record(result)
    }

    /// `sales` is the `Sheet1` table of an earlier Sales run
    pub fn run_advances(&self, workbook: Option<&Workbook>, sales: Option<&OutputTable>) -> RunResult {
        debug!("Pipeline::run_advances: called");
        let result = match self.load_rule(StageKind::Advances, &RuleKey::Advances) {
            Ok(rule) => stage::run_advances(&rule, workbook, sales),
            Err(e) => StageRun::new(StageKind::Advances).fail(e),
        };
        self.record(result)
    }

    pub fn run_banking(&self, files: Vec<BankFile>) -> RunResult {
        debug!(files = files.len(), "Pipeline::run_banking: called");
        let mut uploads = Vec::with_capacity(files.len());
        for file in files {
            let rule = match self.load_rule(StageKind::Banking, &RuleKey::Bank(file.bank_name.clone())) {
                Ok(rule) => rule,
                Err(e) => return self.record(StageRun::new(StageKind::Banking).fail(e)),
            };
            uploads.push(BankUpload {
                rule,
                workbook: file.workbook,
                range: file.range,
            });
        }
        self.record(stage::run_banking(&uploads))
    }

    pub fn run_combine(&self, workbooks: &[Workbook]) -> RunResult {
        debug!(workbooks = workbooks.len(), "Pipeline::run_combine: called");
        self.record(stage::run_combine(&self.combine, workbooks))
    }

    /// `combine` is the output of an earlier Combine run
    pub fn run_final(&self, combine: &[OutputTable], workbook: Option<&Workbook>) -> RunResult {
        debug!(combine_tables = combine.len(), "Pipeline::run_final: called");
        self.record(stage::run_final(&self.final_mis, combine, workbook))
    }

    /// Final over Combine output workbooks; every one must hold a table
    pub fn run_final_from_outputs(&self, combine_workbooks: &[Workbook], workbook: Option<&Workbook>) -> RunResult {
        debug!(combine_workbooks = combine_workbooks.len(), "Pipeline::run_final_from_outputs: called");
        self.record(stage::run_final_from_outputs(&self.final_mis, combine_workbooks, workbook))
    }

    pub fn run_combine_final(&self, combine_workbooks: &[Workbook], final_workbook: Option<&Workbook>) -> RunResult {
        debug!(combine_workbooks = combine_workbooks.len(), "Pipeline::run_combine_final: called");
        self.record(stage::run_combine_final(
            &self.combine,
            &self.final_mis,
            combine_workbooks,
            final_workbook,
        ))
    }

    /// Preferred sheet and header row a stage would use for `target`
    pub fn inspect_settings(&self, target: &InspectTarget) -> Result<(String, usize), StoreError> {
        let rule = match target {
            InspectTarget::Sales => self.store.load_rule(&RuleKey::Sales)?,
            InspectTarget::Advances => self.store.load_rule(&RuleKey::Advances)?,
            InspectTarget::Bank(name) => self.store.load_rule(&RuleKey::Bank(name.clone()))?,
            InspectTarget::Combine => return Ok((self.combine.sheet_name.clone(), self.combine.start_row)),
            InspectTarget::Final => return Ok((self.final_mis.sheet_name.clone(), self.final_mis.start_row)),
        };
        Ok((rule.sheet_name, rule.start_row))
    }

    /// Read-only preview; does not touch the latest-run summary
    pub fn inspect(&self, target: &InspectTarget, workbook: &Workbook) -> Result<InspectionResult, StoreError> {
        debug!(%target, workbook = %workbook.name, "Pipeline::inspect: called");
        let (preferred, header_row) = self.inspect_settings(target)?;
        Ok(inspect(&preferred, header_row, workbook))
    }

    /// Latest-run summary, if any run has finished
    pub fn latest(&self) -> Option<RunSummary> {
        self.latest.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn status(&self) -> StatusReport {
        StatusReport::from_summary(self.latest().as_ref())
    }
}
