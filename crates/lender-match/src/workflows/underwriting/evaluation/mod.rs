mod policy;
mod rules;
mod scoring;

pub use policy::{
    CompiledPolicy, Deduction, GroupLogic, Policy, PolicyConfigurationError, Rule,
    RuleDefinition, RuleGroup, RuleGroupDefinition, RuleKind, ScoringConfig, Severity,
};
pub use rules::evaluate_rule;
pub use scoring::{is_eligible, score, ScoreCard};

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::domain::{Application, LenderId, LenderProgram, LenderProgramId};
use rules::evaluate_group;

/// Evaluates one program's compiled policy against an application snapshot. Called from a
/// blocking worker under the orchestrator's per-program budget.
pub trait ProgramEvaluator: Send + Sync + 'static {
    fn evaluate(
        &self,
        program: &LenderProgram,
        policy: &CompiledPolicy,
        application: &Application,
    ) -> MatchResult;
}

/// Stateless evaluator applying one compiled policy to an application snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluationEngine;

impl EvaluationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate hard rules, then soft rules, then score. Pure in its inputs.
    pub fn evaluate(
        &self,
        program: &LenderProgram,
        policy: &CompiledPolicy,
        application: &Application,
    ) -> MatchResult {
        let hard = evaluate_group(&policy.hard_rules, application);
        let soft = evaluate_group(&policy.soft_rules, application);
        let card = score(&soft.outcomes, &policy.scoring);
        let eligible = is_eligible(&hard.outcomes, card.fit_score, &policy.scoring);

        let mut reasons: Vec<String> = hard
            .outcomes
            .iter()
            .filter(|outcome| !outcome.passed)
            .filter_map(|outcome| outcome.message.clone())
            .collect();
        reasons.extend(card.reasons);

        MatchResult {
            lender_id: program.lender_id,
            lender_program_id: program.id,
            eligible,
            fit_score: card.fit_score,
            reasons,
            rule_results: RuleResults {
                hard: hard.outcomes,
                soft: soft.outcomes,
                hard_passed: hard.passed,
                soft_passed: soft.passed,
            },
            fault: None,
        }
    }
}

impl ProgramEvaluator for EvaluationEngine {
    fn evaluate(
        &self,
        program: &LenderProgram,
        policy: &CompiledPolicy,
        application: &Application,
    ) -> MatchResult {
        EvaluationEngine::evaluate(self, program, policy, application)
    }
}

/// Result of applying one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule_id: String,
    pub field: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RuleOutcome {
    fn passed(rule: &Rule) -> Self {
        Self {
            rule_id: rule.id.clone(),
            field: rule.field.to_string(),
            passed: true,
            message: None,
        }
    }

    fn failed(rule: &Rule, message: String) -> Self {
        Self {
            rule_id: rule.id.clone(),
            field: rule.field.to_string(),
            passed: false,
            message: Some(message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleResults {
    pub hard: Vec<RuleOutcome>,
    pub soft: Vec<RuleOutcome>,
    /// Verdict of the hard rule group under its ALL/ANY logic.
    #[serde(default)]
    pub hard_passed: bool,
    #[serde(default)]
    pub soft_passed: bool,
}

/// Per-program outcome within a match run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub lender_id: LenderId,
    pub lender_program_id: LenderProgramId,
    pub eligible: bool,
    pub fit_score: f64,
    pub reasons: Vec<String>,
    pub rule_results: RuleResults,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<EngineFault>,
}

impl MatchResult {
    /// Ineligible result carrying a fault instead of rule outcomes.
    pub fn faulted(program: &LenderProgram, fault: EngineFault) -> Self {
        Self {
            lender_id: program.lender_id,
            lender_program_id: program.id,
            eligible: false,
            fit_score: 0.0,
            reasons: vec![fault.message.clone()],
            rule_results: RuleResults::default(),
            fault: Some(fault),
        }
    }

    pub fn configuration_fault(program: &LenderProgram, error: &PolicyConfigurationError) -> Self {
        Self::faulted(program, EngineFault::from(error))
    }
}

/// Category of an engine failure recorded as data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    PolicyConfiguration,
    EvaluationTimeout,
    RunPrecondition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineFault {
    pub kind: FaultKind,
    pub message: String,
}

impl EngineFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(budget: Duration) -> Self {
        Self::new(
            FaultKind::EvaluationTimeout,
            format!(
                "policy evaluation exceeded its {} ms budget",
                budget.as_millis()
            ),
        )
    }
}

impl From<&PolicyConfigurationError> for EngineFault {
    fn from(error: &PolicyConfigurationError) -> Self {
        Self::new(
            FaultKind::PolicyConfiguration,
            format!("policy configuration error: {error}"),
        )
    }
}
