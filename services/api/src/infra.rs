use lender_match::workflows::underwriting::{
    Application, Lender, LenderId, LenderProgram, LenderProgramId, LoanRequestId, MatchRun,
    MatchRunId, MatchRunRepository, Policy, RepositoryError, UnderwritingDirectory,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lender catalog, active policies, and filed applications held in process memory.
#[derive(Default, Clone)]
pub(crate) struct InMemoryDirectory {
    lenders: Arc<Mutex<HashMap<LenderId, Lender>>>,
    programs: Arc<Mutex<Vec<LenderProgram>>>,
    policies: Arc<Mutex<HashMap<LenderProgramId, Policy>>>,
    applications: Arc<Mutex<HashMap<LoanRequestId, Application>>>,
}

impl InMemoryDirectory {
    pub(crate) fn add_lender(&self, lender: Lender) {
        lock(&self.lenders).insert(lender.id, lender);
    }

    pub(crate) fn add_program(&self, program: LenderProgram) {
        let mut programs = lock(&self.programs);
        programs.retain(|existing| existing.id != program.id);
        programs.push(program);
    }

    /// Make `policy` the single active policy of its program. Policies are stored as authored;
    /// a malformed one surfaces as a fault on the program when a run loads it.
    pub(crate) fn activate_policy(&self, mut policy: Policy) {
        policy.is_active = true;
        lock(&self.policies).insert(policy.lender_program_id, policy);
    }

    pub(crate) fn file_application(&self, id: LoanRequestId, application: Application) {
        lock(&self.applications).insert(id, application);
    }

    pub(crate) fn lender_name(&self, id: LenderId) -> Option<String> {
        lock(&self.lenders).get(&id).map(|lender| lender.name.clone())
    }

    pub(crate) fn program_name(&self, id: LenderProgramId) -> Option<String> {
        lock(&self.programs)
            .iter()
            .find(|program| program.id == id)
            .map(|program| program.name.clone())
    }
}

impl UnderwritingDirectory for InMemoryDirectory {
    fn application(&self, id: LoanRequestId) -> Result<Option<Application>, RepositoryError> {
        Ok(lock(&self.applications).get(&id).cloned())
    }

    fn eligible_programs(
        &self,
        amount: f64,
        term_months: u32,
    ) -> Result<Vec<LenderProgram>, RepositoryError> {
        let lenders = lock(&self.lenders);
        let mut programs: Vec<LenderProgram> = lock(&self.programs)
            .iter()
            .filter(|program| {
                lenders
                    .get(&program.lender_id)
                    .map_or(false, |lender| lender.active)
            })
            .filter(|program| program.accepts(amount, term_months))
            .cloned()
            .collect();
        programs.sort_by_key(|program| program.id);
        Ok(programs)
    }

    fn active_policy(&self, program: LenderProgramId) -> Result<Option<Policy>, RepositoryError> {
        Ok(lock(&self.policies)
            .get(&program)
            .filter(|policy| policy.is_active)
            .cloned())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryMatchRunRepository {
    runs: Arc<Mutex<HashMap<MatchRunId, MatchRun>>>,
}

impl MatchRunRepository for InMemoryMatchRunRepository {
    fn insert(&self, run: MatchRun) -> Result<MatchRun, RepositoryError> {
        let mut guard = lock(&self.runs);
        if guard.contains_key(&run.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(run.id, run.clone());
        Ok(run)
    }

    fn update(&self, run: MatchRun) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.runs);
        if guard.contains_key(&run.id) {
            guard.insert(run.id, run);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch(&self, id: MatchRunId) -> Result<Option<MatchRun>, RepositoryError> {
        Ok(lock(&self.runs).get(&id).cloned())
    }
}
