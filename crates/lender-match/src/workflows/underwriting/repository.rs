use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Application, LenderProgram, LenderProgramId, LoanRequestId, MatchRunId};
use super::evaluation::{EngineFault, MatchResult, Policy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Complete,
    Failed,
}

impl RunStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Complete => "COMPLETE",
            RunStatus::Failed => "FAILED",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Complete | RunStatus::Failed)
    }
}

/// One underwriting invocation spanning every program that survived the pre-gate.
///
/// Created `RUNNING`; moves once to `COMPLETE` or `FAILED` and is immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRun {
    pub id: MatchRunId,
    pub loan_request_id: LoanRequestId,
    pub status: RunStatus,
    pub results: Vec<MatchResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<EngineFault>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl MatchRun {
    pub fn new(id: MatchRunId, loan_request_id: LoanRequestId) -> Self {
        Self {
            id,
            loan_request_id,
            status: RunStatus::Running,
            results: Vec::new(),
            failure: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Record the results and finish the run. Results are stored ordered by program id.
    pub fn complete(&mut self, mut results: Vec<MatchResult>) -> Result<(), RunTransitionError> {
        self.ensure_running()?;
        results.sort_by_key(|result| result.lender_program_id);
        self.results = results;
        self.status = RunStatus::Complete;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Fail the run; any results are discarded.
    pub fn fail(&mut self, failure: EngineFault) -> Result<(), RunTransitionError> {
        self.ensure_running()?;
        self.results.clear();
        self.failure = Some(failure);
        self.status = RunStatus::Failed;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Eligible results, best fit first.
    pub fn ranked(&self) -> Vec<&MatchResult> {
        let mut eligible: Vec<&MatchResult> =
            self.results.iter().filter(|result| result.eligible).collect();
        eligible.sort_by(|left, right| {
            right
                .fit_score
                .total_cmp(&left.fit_score)
                .then(left.lender_program_id.cmp(&right.lender_program_id))
        });
        eligible
    }

    fn ensure_running(&self) -> Result<(), RunTransitionError> {
        if self.status.is_terminal() {
            Err(RunTransitionError {
                run_id: self.id,
                status: self.status,
            })
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("match run {run_id} is already {}", .status.label())]
pub struct RunTransitionError {
    pub run_id: MatchRunId,
    pub status: RunStatus,
}

/// Read access to applications, the program catalog, and policies.
pub trait UnderwritingDirectory: Send + Sync {
    fn application(&self, id: LoanRequestId) -> Result<Option<Application>, RepositoryError>;
    /// Programs of active lenders offered for the requested amount and term.
    fn eligible_programs(
        &self,
        amount: f64,
        term_months: u32,
    ) -> Result<Vec<LenderProgram>, RepositoryError>;
    fn active_policy(&self, program: LenderProgramId) -> Result<Option<Policy>, RepositoryError>;
}

/// Storage for match runs so the service can be exercised in isolation.
pub trait MatchRunRepository: Send + Sync {
    fn insert(&self, run: MatchRun) -> Result<MatchRun, RepositoryError>;
    fn update(&self, run: MatchRun) -> Result<(), RepositoryError>;
    fn fetch(&self, id: MatchRunId) -> Result<Option<MatchRun>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
