use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::domain::{Application, LenderProgram, LoanRequestId, MatchRunId};
use super::evaluation::{
    CompiledPolicy, EngineFault, EvaluationEngine, FaultKind, MatchResult,
    PolicyConfigurationError, ProgramEvaluator,
};
use super::repository::{
    MatchRun, MatchRunRepository, RepositoryError, RunTransitionError, UnderwritingDirectory,
};
use crate::config::UnderwritingConfig;

/// Match orchestrator: snapshots the application and policies, fans evaluation out across
/// surviving programs, and folds the results into a [`MatchRun`].
pub struct UnderwritingService<D, R> {
    directory: Arc<D>,
    runs: Arc<R>,
    evaluator: Arc<dyn ProgramEvaluator>,
    config: UnderwritingConfig,
    sequence: AtomicU64,
}

/// Application and policy snapshot taken once at run start.
pub(crate) struct RunPlan {
    pub(crate) application: Arc<Application>,
    pub(crate) tasks: Vec<ProgramTask>,
}

pub(crate) struct ProgramTask {
    pub(crate) program: LenderProgram,
    pub(crate) policy: Result<CompiledPolicy, PolicyConfigurationError>,
}

impl<D, R> UnderwritingService<D, R>
where
    D: UnderwritingDirectory + 'static,
    R: MatchRunRepository + 'static,
{
    pub fn new(directory: Arc<D>, runs: Arc<R>, config: UnderwritingConfig) -> Self {
        Self {
            directory,
            runs,
            evaluator: Arc::new(EvaluationEngine::new()),
            config,
            sequence: AtomicU64::new(1),
        }
    }

    /// Replace the per-program evaluator. Defaults to [`EvaluationEngine`].
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ProgramEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Open a run and evaluate it in the background, returning the `RUNNING` snapshot.
    pub fn start_match_run(
        self: &Arc<Self>,
        loan_request_id: LoanRequestId,
    ) -> Result<MatchRun, UnderwritingServiceError> {
        let run = self.open_run(loan_request_id)?;
        let run_id = run.id;
        let service = Arc::clone(self);

        tokio::spawn(async move {
            if let Err(err) = service.execute(run_id, loan_request_id).await {
                error!(%run_id, error = %err, "match run could not be finalized");
            }
        });

        Ok(run)
    }

    /// Open a run and evaluate it to completion.
    pub async fn run_match(
        &self,
        loan_request_id: LoanRequestId,
    ) -> Result<MatchRun, UnderwritingServiceError> {
        let run = self.open_run(loan_request_id)?;
        self.execute(run.id, loan_request_id).await
    }

    /// Current snapshot of a run.
    pub fn get_match_run(&self, id: MatchRunId) -> Result<MatchRun, UnderwritingServiceError> {
        let run = self.runs.fetch(id)?.ok_or(RepositoryError::NotFound)?;
        Ok(run)
    }

    fn open_run(&self, loan_request_id: LoanRequestId) -> Result<MatchRun, UnderwritingServiceError> {
        let id = MatchRunId(self.sequence.fetch_add(1, Ordering::Relaxed));
        let run = self.runs.insert(MatchRun::new(id, loan_request_id))?;
        info!(run_id = %id, %loan_request_id, "match run started");
        Ok(run)
    }

    async fn execute(
        &self,
        run_id: MatchRunId,
        loan_request_id: LoanRequestId,
    ) -> Result<MatchRun, UnderwritingServiceError> {
        let outcome = match self.prepare(loan_request_id) {
            Ok(plan) => Ok(self.evaluate_plan(plan).await),
            Err(err) => Err(err),
        };

        let mut run = self.runs.fetch(run_id)?.ok_or(RepositoryError::NotFound)?;
        match outcome {
            Ok(results) => {
                let eligible = results.iter().filter(|result| result.eligible).count();
                run.complete(results)?;
                info!(%run_id, programs = run.results.len(), eligible, "match run complete");
            }
            Err(err) => {
                warn!(%run_id, %loan_request_id, kind = err.kind(), error = %err, "match run failed");
                run.fail(EngineFault::from(&err))?;
            }
        }

        self.runs.update(run.clone())?;
        Ok(run)
    }

    pub(crate) fn prepare(
        &self,
        loan_request_id: LoanRequestId,
    ) -> Result<RunPlan, RunPreconditionError> {
        let application = self
            .directory
            .application(loan_request_id)
            .map_err(RunPreconditionError::SnapshotUnavailable)?
            .ok_or(RunPreconditionError::UnknownApplication { loan_request_id })?;

        let amount = application.loan_request.amount;
        let term_months = application.loan_request.term_months;

        let mut programs: Vec<LenderProgram> = self
            .directory
            .eligible_programs(amount, term_months)
            .map_err(RunPreconditionError::SnapshotUnavailable)?
            .into_iter()
            .filter(|program| {
                let accepted = program.accepts(amount, term_months);
                if !accepted {
                    debug!(lender_program_id = %program.id, amount, term_months, "program excluded by pre-gate");
                }
                accepted
            })
            .collect();
        programs.sort_by_key(|program| program.id);
        programs.dedup_by_key(|program| program.id);

        if programs.is_empty() {
            return Err(RunPreconditionError::NoEligiblePrograms {
                amount,
                term_months,
            });
        }

        let tasks = programs
            .into_iter()
            .map(|program| {
                let policy = self.load_policy(&program);
                ProgramTask { program, policy }
            })
            .collect();

        Ok(RunPlan {
            application: Arc::new(application),
            tasks,
        })
    }

    fn load_policy(
        &self,
        program: &LenderProgram,
    ) -> Result<CompiledPolicy, PolicyConfigurationError> {
        let policy = self
            .directory
            .active_policy(program.id)
            .map_err(|err| PolicyConfigurationError::PolicyUnavailable {
                program: program.id,
                detail: err.to_string(),
            })?
            .filter(|policy| policy.is_active)
            .ok_or(PolicyConfigurationError::MissingPolicy {
                program: program.id,
            })?;

        if policy.lender_program_id != program.id {
            return Err(PolicyConfigurationError::ProgramMismatch {
                program: program.id,
                policy_program: policy.lender_program_id,
            });
        }

        CompiledPolicy::compile(&policy)
    }

    /// Evaluate every program concurrently; results come back ordered by program id no
    /// matter which evaluation finishes first.
    pub(crate) async fn evaluate_plan(&self, plan: RunPlan) -> Vec<MatchResult> {
        let RunPlan { application, tasks } = plan;
        let programs: Vec<LenderProgram> = tasks.iter().map(|task| task.program.clone()).collect();
        let permits = Arc::new(Semaphore::new(self.config.pool_width()));
        let budget = self.config.program_budget;

        let mut join_set = JoinSet::new();
        for (idx, task) in tasks.into_iter().enumerate() {
            let application = Arc::clone(&application);
            let permits = Arc::clone(&permits);
            let evaluator = Arc::clone(&self.evaluator);
            join_set.spawn(async move {
                let permit = permits.acquire_owned().await.ok();
                let result = evaluate_program(evaluator, task, application, budget, permit).await;
                (idx, result)
            });
        }

        let mut slots: Vec<Option<MatchResult>> = vec![None; programs.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(err) => error!(error = %err, "program evaluation task failed to join"),
            }
        }

        let mut results: Vec<MatchResult> = programs
            .iter()
            .zip(slots)
            .map(|(program, slot)| {
                slot.unwrap_or_else(|| {
                    MatchResult::faulted(
                        program,
                        EngineFault::new(
                            FaultKind::PolicyConfiguration,
                            "policy evaluation aborted before producing a result",
                        ),
                    )
                })
            })
            .collect();
        results.sort_by_key(|result| result.lender_program_id);
        results
    }
}

/// The permit travels into the blocking worker so an evaluation that overruns its budget
/// still counts against the pool until it actually returns.
async fn evaluate_program(
    evaluator: Arc<dyn ProgramEvaluator>,
    task: ProgramTask,
    application: Arc<Application>,
    budget: Duration,
    permit: Option<OwnedSemaphorePermit>,
) -> MatchResult {
    let ProgramTask { program, policy } = task;
    let policy = match policy {
        Ok(policy) => policy,
        Err(err) => {
            warn!(lender_program_id = %program.id, kind = err.kind(), error = %err, "program policy rejected");
            return MatchResult::configuration_fault(&program, &err);
        }
    };

    let scope = program.clone();
    let work = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        evaluator.evaluate(&program, &policy, &application)
    });

    match tokio::time::timeout(budget, work).await {
        Ok(Ok(result)) => {
            debug!(
                lender_program_id = %result.lender_program_id,
                eligible = result.eligible,
                fit_score = result.fit_score,
                "program evaluated"
            );
            result
        }
        Ok(Err(err)) => {
            error!(lender_program_id = %scope.id, error = %err, "program evaluation panicked");
            MatchResult::faulted(
                &scope,
                EngineFault::new(
                    FaultKind::PolicyConfiguration,
                    format!("policy evaluation aborted: {err}"),
                ),
            )
        }
        Err(_) => {
            warn!(
                lender_program_id = %scope.id,
                budget_ms = budget.as_millis() as u64,
                "program evaluation exceeded budget"
            );
            MatchResult::faulted(&scope, EngineFault::timeout(budget))
        }
    }
}

/// Run-level failure. Fatal to the run: it is marked `FAILED` with no results.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RunPreconditionError {
    #[error("loan request {loan_request_id} not found")]
    UnknownApplication { loan_request_id: LoanRequestId },
    #[error("no lender program accepts amount {amount} over {term_months} months")]
    NoEligiblePrograms { amount: f64, term_months: u32 },
    #[error("underwriting snapshot could not be loaded: {0}")]
    SnapshotUnavailable(RepositoryError),
}

impl RunPreconditionError {
    pub const fn kind(&self) -> &'static str {
        match self {
            RunPreconditionError::UnknownApplication { .. } => "unknown_application",
            RunPreconditionError::NoEligiblePrograms { .. } => "no_eligible_programs",
            RunPreconditionError::SnapshotUnavailable(_) => "snapshot_unavailable",
        }
    }
}

impl From<&RunPreconditionError> for EngineFault {
    fn from(error: &RunPreconditionError) -> Self {
        EngineFault::new(FaultKind::RunPrecondition, error.to_string())
    }
}

/// Error raised by the underwriting service.
#[derive(Debug, thiserror::Error)]
pub enum UnderwritingServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Transition(#[from] RunTransitionError),
}
