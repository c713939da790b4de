use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::response::Response;
use serde_json::{json, Value};

use crate::config::UnderwritingConfig;
use crate::workflows::underwriting::domain::{
    Application, Borrower, Guarantor, LenderId, LenderProgram, LenderProgramId, LoanRequest,
    LoanRequestId, MatchRunId,
};
use crate::workflows::underwriting::evaluation::{
    CompiledPolicy, Deduction, EvaluationEngine, MatchResult, Policy, ProgramEvaluator,
    RuleDefinition, RuleGroupDefinition, ScoringConfig, Severity,
};
use crate::workflows::underwriting::repository::{
    MatchRun, MatchRunRepository, RepositoryError, UnderwritingDirectory,
};
use crate::workflows::underwriting::UnderwritingService;

pub(super) const LOAN: LoanRequestId = LoanRequestId(7);

pub(super) fn application() -> Application {
    Application {
        borrower: Borrower {
            business_name: "Prairie Dental Group".to_string(),
            industry: "Healthcare".to_string(),
            state: "IA".to_string(),
            years_in_business: 6.0,
            annual_revenue: 1_250_000.0,
            medical_license_flag: Some(true),
            paynet_score: None,
        },
        guarantors: vec![Guarantor {
            name: "Dana Whitfield".to_string(),
            fico_score: 690,
            homeowner_flag: Some(true),
            bankruptcy_flag: false,
            delinquency_flag: Some(false),
        }],
        loan_request: LoanRequest {
            amount: 45_000.0,
            term_months: 48,
            equipment_type: "Dental Chair".to_string(),
            equipment_cost: 45_000.0,
            equipment_year: 2024,
            equipment_vendor: "Henry Schein".to_string(),
            equipment_condition: "new".to_string(),
        },
    }
}

pub(super) fn application_with_amount(amount: f64) -> Application {
    let mut application = application();
    application.loan_request.amount = amount;
    application
}

pub(super) fn program(id: u64, min_amount: f64, max_amount: f64) -> LenderProgram {
    LenderProgram {
        id: LenderProgramId(id),
        lender_id: LenderId(id * 10),
        name: format!("Program {id}"),
        min_amount,
        max_amount,
        min_term_months: 12,
        max_term_months: 72,
    }
}

pub(super) fn rule(id: &str, rule_type: &str, field: &str, params: Value, severity: Severity) -> RuleDefinition {
    RuleDefinition {
        id: id.to_string(),
        rule_type: rule_type.to_string(),
        field: Some(field.to_string()),
        params: params.as_object().cloned().unwrap_or_default(),
        severity,
        message: String::new(),
    }
}

pub(super) fn hard(id: &str, rule_type: &str, field: &str, params: Value) -> RuleDefinition {
    rule(id, rule_type, field, params, Severity::Hard)
}

pub(super) fn soft(id: &str, rule_type: &str, field: &str, params: Value) -> RuleDefinition {
    rule(id, rule_type, field, params, Severity::Soft)
}

pub(super) fn with_message(mut rule: RuleDefinition, message: &str) -> RuleDefinition {
    rule.message = message.to_string();
    rule
}

pub(super) fn policy(
    program: u64,
    hard_rules: Vec<RuleDefinition>,
    soft_rules: Vec<RuleDefinition>,
    deductions: &[(&str, f64)],
) -> Policy {
    Policy {
        lender_program_id: LenderProgramId(program),
        version: 1,
        is_active: true,
        hard_rules: RuleGroupDefinition {
            rules: hard_rules,
            ..RuleGroupDefinition::default()
        },
        soft_rules: RuleGroupDefinition {
            rules: soft_rules,
            ..RuleGroupDefinition::default()
        },
        scoring_config: ScoringConfig {
            deductions: deductions
                .iter()
                .map(|(rule_id, points)| Deduction {
                    rule_id: rule_id.to_string(),
                    points: *points,
                })
                .collect(),
            ..ScoringConfig::default()
        },
    }
}

/// Hard minimum amount of 5,000 plus a soft FICO floor of 700 worth 15 points.
pub(super) fn standard_policy(program: u64) -> Policy {
    policy(
        program,
        vec![with_message(
            hard("min-amount", "MIN_VALUE", "loan_request.amount", json!({"min": 5000})),
            "Requested amount is below the program minimum",
        )],
        vec![with_message(
            soft("fico-700", "MIN_VALUE", "guarantors[0].fico_score", json!({"min": 700})),
            "Primary guarantor FICO below 700",
        )],
        &[("fico-700", 15.0)],
    )
}

pub(super) fn compiled(policy: &Policy) -> CompiledPolicy {
    CompiledPolicy::compile(policy).expect("policy compiles")
}

pub(super) fn underwriting_config() -> UnderwritingConfig {
    UnderwritingConfig {
        program_budget: Duration::from_secs(5),
        max_concurrency: 2,
    }
}

/// Directory double. Programs are returned unfiltered so the service's own pre-gate is
/// what excludes them.
#[derive(Default)]
pub(super) struct MemoryDirectory {
    pub(super) applications: Arc<Mutex<HashMap<LoanRequestId, Application>>>,
    pub(super) programs: Arc<Mutex<Vec<LenderProgram>>>,
    pub(super) policies: Arc<Mutex<HashMap<LenderProgramId, Policy>>>,
}

impl MemoryDirectory {
    pub(super) fn with_application(self, id: LoanRequestId, application: Application) -> Self {
        self.set_application(id, application);
        self
    }

    pub(super) fn with_program(self, program: LenderProgram, policy: Option<Policy>) -> Self {
        if let Some(policy) = policy {
            self.set_policy(policy);
        }
        self.programs
            .lock()
            .expect("directory mutex poisoned")
            .push(program);
        self
    }

    pub(super) fn set_application(&self, id: LoanRequestId, application: Application) {
        self.applications
            .lock()
            .expect("directory mutex poisoned")
            .insert(id, application);
    }

    pub(super) fn set_policy(&self, policy: Policy) {
        self.policies
            .lock()
            .expect("directory mutex poisoned")
            .insert(policy.lender_program_id, policy);
    }
}

impl UnderwritingDirectory for MemoryDirectory {
    fn application(&self, id: LoanRequestId) -> Result<Option<Application>, RepositoryError> {
        let guard = self.applications.lock().expect("directory mutex poisoned");
        Ok(guard.get(&id).cloned())
    }

    fn eligible_programs(
        &self,
        _amount: f64,
        _term_months: u32,
    ) -> Result<Vec<LenderProgram>, RepositoryError> {
        let guard = self.programs.lock().expect("directory mutex poisoned");
        Ok(guard.clone())
    }

    fn active_policy(&self, program: LenderProgramId) -> Result<Option<Policy>, RepositoryError> {
        let guard = self.policies.lock().expect("directory mutex poisoned");
        Ok(guard.get(&program).cloned())
    }
}

/// Directory whose backing store is down.
pub(super) struct UnavailableDirectory;

impl UnderwritingDirectory for UnavailableDirectory {
    fn application(&self, _id: LoanRequestId) -> Result<Option<Application>, RepositoryError> {
        Err(RepositoryError::Unavailable("directory offline".to_string()))
    }

    fn eligible_programs(
        &self,
        _amount: f64,
        _term_months: u32,
    ) -> Result<Vec<LenderProgram>, RepositoryError> {
        Err(RepositoryError::Unavailable("directory offline".to_string()))
    }

    fn active_policy(&self, _program: LenderProgramId) -> Result<Option<Policy>, RepositoryError> {
        Err(RepositoryError::Unavailable("directory offline".to_string()))
    }
}

/// Directory that cannot load the policy of one program.
pub(super) struct FlakyPolicyDirectory {
    pub(super) inner: MemoryDirectory,
    pub(super) failing: LenderProgramId,
}

impl UnderwritingDirectory for FlakyPolicyDirectory {
    fn application(&self, id: LoanRequestId) -> Result<Option<Application>, RepositoryError> {
        self.inner.application(id)
    }

    fn eligible_programs(
        &self,
        amount: f64,
        term_months: u32,
    ) -> Result<Vec<LenderProgram>, RepositoryError> {
        self.inner.eligible_programs(amount, term_months)
    }

    fn active_policy(&self, program: LenderProgramId) -> Result<Option<Policy>, RepositoryError> {
        if program == self.failing {
            return Err(RepositoryError::Unavailable("policy store timeout".to_string()));
        }
        self.inner.active_policy(program)
    }
}

#[derive(Default)]
pub(super) struct MemoryRuns {
    pub(super) runs: Arc<Mutex<HashMap<MatchRunId, MatchRun>>>,
}

impl MatchRunRepository for MemoryRuns {
    fn insert(&self, run: MatchRun) -> Result<MatchRun, RepositoryError> {
        let mut guard = self.runs.lock().expect("repository mutex poisoned");
        if guard.contains_key(&run.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(run.id, run.clone());
        Ok(run)
    }

    fn update(&self, run: MatchRun) -> Result<(), RepositoryError> {
        let mut guard = self.runs.lock().expect("repository mutex poisoned");
        guard.insert(run.id, run);
        Ok(())
    }

    fn fetch(&self, id: MatchRunId) -> Result<Option<MatchRun>, RepositoryError> {
        let guard = self.runs.lock().expect("repository mutex poisoned");
        Ok(guard.get(&id).cloned())
    }
}

pub(super) struct UnavailableRuns;

impl MatchRunRepository for UnavailableRuns {
    fn insert(&self, _run: MatchRun) -> Result<MatchRun, RepositoryError> {
        Err(RepositoryError::Unavailable("run store offline".to_string()))
    }

    fn update(&self, _run: MatchRun) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("run store offline".to_string()))
    }

    fn fetch(&self, _id: MatchRunId) -> Result<Option<MatchRun>, RepositoryError> {
        Err(RepositoryError::Unavailable("run store offline".to_string()))
    }
}

pub(super) type MemoryService = UnderwritingService<MemoryDirectory, MemoryRuns>;

pub(super) fn build_service(
    directory: MemoryDirectory,
) -> (Arc<MemoryService>, Arc<MemoryDirectory>, Arc<MemoryRuns>) {
    let directory = Arc::new(directory);
    let runs = Arc::new(MemoryRuns::default());
    let service = Arc::new(UnderwritingService::new(
        directory.clone(),
        runs.clone(),
        underwriting_config(),
    ));
    (service, directory, runs)
}

/// Evaluator that blocks its worker for `delay` before evaluating `stalled`, and records
/// the peak number of evaluations running at once.
pub(super) struct StallingEvaluator {
    pub(super) stalled: LenderProgramId,
    pub(super) delay: Duration,
    in_flight: AtomicUsize,
    pub(super) peak: AtomicUsize,
}

impl StallingEvaluator {
    pub(super) fn new(stalled: LenderProgramId, delay: Duration) -> Self {
        Self {
            stalled,
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

impl ProgramEvaluator for StallingEvaluator {
    fn evaluate(
        &self,
        program: &LenderProgram,
        policy: &CompiledPolicy,
        application: &Application,
    ) -> MatchResult {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if program.id == self.stalled {
            std::thread::sleep(self.delay);
        }
        let result = EvaluationEngine::new().evaluate(program, policy, application);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub(super) fn service_with_evaluator(
    directory: MemoryDirectory,
    config: UnderwritingConfig,
    evaluator: Arc<dyn ProgramEvaluator>,
) -> Arc<MemoryService> {
    Arc::new(
        UnderwritingService::new(Arc::new(directory), Arc::new(MemoryRuns::default()), config)
            .with_evaluator(evaluator),
    )
}

/// Two in-range programs with the standard policy.
pub(super) fn standard_directory() -> MemoryDirectory {
    MemoryDirectory::default()
        .with_application(LOAN, application())
        .with_program(program(2, 10_000.0, 250_000.0), Some(standard_policy(2)))
        .with_program(program(1, 5_000.0, 100_000.0), Some(standard_policy(1)))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
