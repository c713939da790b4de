//! Lender policy evaluation: resolves rule fields against an application, evaluates every
//! surviving lender program concurrently, and records the outcome as a match run.

pub mod domain;
pub mod evaluation;
pub mod field;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    Application, Borrower, Guarantor, Lender, LenderId, LenderProgram, LenderProgramId,
    LoanRequest, LoanRequestId, MatchRunId,
};
pub use evaluation::{
    CompiledPolicy, Deduction, EngineFault, EvaluationEngine, FaultKind, GroupLogic,
    MatchResult, Policy, PolicyConfigurationError, ProgramEvaluator, RuleDefinition,
    RuleGroupDefinition, RuleOutcome, RuleResults, ScoringConfig, Severity,
};
pub use field::{FieldPath, FieldResolutionError, FieldValue};
pub use repository::{
    MatchRun, MatchRunRepository, RepositoryError, RunStatus, RunTransitionError,
    UnderwritingDirectory,
};
pub use router::underwriting_router;
pub use service::{RunPreconditionError, UnderwritingService, UnderwritingServiceError};
