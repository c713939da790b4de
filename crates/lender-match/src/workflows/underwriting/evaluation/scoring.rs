use super::policy::ScoringConfig;
use super::RuleOutcome;

/// Fit score plus the soft-rule failures that cost points, in evaluation order.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreCard {
    pub fit_score: f64,
    pub reasons: Vec<String>,
}

/// Apply deductions for failed soft outcomes. The running total never drops below zero and
/// deductions naming no soft outcome have no effect.
pub fn score(soft_outcomes: &[RuleOutcome], config: &ScoringConfig) -> ScoreCard {
    let mut fit_score = config.base_score.max(0.0);
    let mut reasons = Vec::new();

    for outcome in soft_outcomes.iter().filter(|outcome| !outcome.passed) {
        let points: f64 = config
            .deductions
            .iter()
            .filter(|deduction| deduction.rule_id == outcome.rule_id)
            .map(|deduction| deduction.points)
            .sum();

        if points == 0.0 {
            continue;
        }

        fit_score = (fit_score - points).max(0.0);
        if let Some(message) = &outcome.message {
            reasons.push(message.clone());
        }
    }

    ScoreCard { fit_score, reasons }
}

/// Every hard outcome passed and the score clears the acceptance threshold.
pub fn is_eligible(hard_outcomes: &[RuleOutcome], fit_score: f64, config: &ScoringConfig) -> bool {
    hard_outcomes.iter().all(|outcome| outcome.passed) && fit_score >= config.min_accept_score
}
