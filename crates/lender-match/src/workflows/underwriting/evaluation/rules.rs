use super::super::domain::Application;
use super::super::field::FieldValue;
use super::policy::{GroupLogic, Rule, RuleGroup, RuleKind};
use super::RuleOutcome;

/// Outcomes of one rule group, in evaluation order, plus the group's verdict under its logic.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GroupEvaluation {
    pub outcomes: Vec<RuleOutcome>,
    pub passed: bool,
}

enum Check {
    Pass,
    Fail,
    NotNumeric,
    NotBoolean,
}

/// Evaluate every rule in the group; nested groups follow the group's own rules depth first.
pub(crate) fn evaluate_group(group: &RuleGroup, application: &Application) -> GroupEvaluation {
    let mut outcomes = Vec::with_capacity(group.rule_count());
    let mut verdicts = Vec::with_capacity(group.rules.len() + group.groups.len());

    for rule in &group.rules {
        let outcome = evaluate_rule(rule, application);
        verdicts.push(outcome.passed);
        outcomes.push(outcome);
    }

    for child in &group.groups {
        let nested = evaluate_group(child, application);
        verdicts.push(nested.passed);
        outcomes.extend(nested.outcomes);
    }

    let passed = match group.logic {
        GroupLogic::All => verdicts.iter().all(|passed| *passed),
        GroupLogic::Any => verdicts.iter().any(|passed| *passed),
    };

    GroupEvaluation { outcomes, passed }
}

pub fn evaluate_rule(rule: &Rule, application: &Application) -> RuleOutcome {
    let value = match rule.target.read(application) {
        Some(value) => value,
        None => return RuleOutcome::failed(rule, format!("field '{}' not found", rule.field)),
    };

    match check(&rule.kind, &value) {
        Check::Pass => RuleOutcome::passed(rule),
        Check::Fail => {
            let message = if rule.message.is_empty() {
                rule.kind.describe(&rule.field)
            } else {
                rule.message.clone()
            };
            RuleOutcome::failed(rule, message)
        }
        Check::NotNumeric => {
            RuleOutcome::failed(rule, format!("field '{}' is not numeric", rule.field))
        }
        Check::NotBoolean => {
            RuleOutcome::failed(rule, format!("field '{}' is not a boolean", rule.field))
        }
    }
}

fn check(kind: &RuleKind, value: &FieldValue) -> Check {
    match kind {
        RuleKind::MinValue { min } => numeric(value, |n| n >= *min),
        RuleKind::MaxValue { max } => numeric(value, |n| n <= *max),
        RuleKind::Range { min, max } => numeric(value, |n| *min <= n && n <= *max),
        RuleKind::InList { list } => verdict(contains(list, value)),
        RuleKind::NotInList { list } => verdict(!contains(list, value)),
        RuleKind::BooleanIsTrue => match value.as_flag() {
            Some(flag) => verdict(flag),
            None => Check::NotBoolean,
        },
    }
}

fn numeric(value: &FieldValue, predicate: impl FnOnce(f64) -> bool) -> Check {
    match value.as_number() {
        Some(number) => verdict(predicate(number)),
        None => Check::NotNumeric,
    }
}

fn contains(list: &[String], value: &FieldValue) -> bool {
    let canonical = value.canonical();
    list.iter().any(|entry| *entry == canonical)
}

fn verdict(passed: bool) -> Check {
    if passed {
        Check::Pass
    } else {
        Check::Fail
    }
}
