use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::super::domain::LenderProgramId;
use super::super::field::{canonical_number, FieldPath, FieldResolutionError, FieldTarget};

/// Stored policy document, as produced by the authoring workflow.
///
/// Rule parameters arrive as an untyped bag; [`CompiledPolicy::compile`] turns them into
/// typed rules once, before anything is evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub lender_program_id: LenderProgramId,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub hard_rules: RuleGroupDefinition,
    #[serde(default)]
    pub soft_rules: RuleGroupDefinition,
    #[serde(default)]
    pub scoring_config: ScoringConfig,
}

fn default_version() -> u32 {
    1
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupLogic {
    #[default]
    All,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Hard,
    Soft,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Hard => f.write_str("HARD"),
            Severity::Soft => f.write_str("SOFT"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleGroupDefinition {
    #[serde(default)]
    pub logic: GroupLogic,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<RuleGroupDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub rule_type: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub params: Map<String, Value>,
    pub severity: Severity,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_base_score")]
    pub base_score: f64,
    #[serde(default = "default_min_accept_score")]
    pub min_accept_score: f64,
    #[serde(default)]
    pub deductions: Vec<Deduction>,
}

fn default_base_score() -> f64 {
    100.0
}

fn default_min_accept_score() -> f64 {
    60.0
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_score: default_base_score(),
            min_accept_score: default_min_accept_score(),
            deductions: Vec::new(),
        }
    }
}

/// Points removed from the fit score when the referenced soft rule fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deduction {
    #[serde(rename = "ruleId")]
    pub rule_id: String,
    pub points: f64,
}

/// Policy with every rule validated and typed.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPolicy {
    pub lender_program_id: LenderProgramId,
    pub version: u32,
    pub hard_rules: RuleGroup,
    pub soft_rules: RuleGroup,
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleGroup {
    pub logic: GroupLogic,
    pub rules: Vec<Rule>,
    pub groups: Vec<RuleGroup>,
}

impl RuleGroup {
    pub fn rule_count(&self) -> usize {
        self.rules.len() + self.groups.iter().map(RuleGroup::rule_count).sum::<usize>()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub id: String,
    pub kind: RuleKind,
    pub field: FieldPath,
    pub target: FieldTarget,
    pub severity: Severity,
    pub message: String,
}

/// Closed set of rule variants understood by the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    MinValue { min: f64 },
    MaxValue { max: f64 },
    InList { list: Vec<String> },
    NotInList { list: Vec<String> },
    BooleanIsTrue,
    Range { min: f64, max: f64 },
}

impl RuleKind {
    /// Fallback failure message for rules authored without one.
    pub fn describe(&self, field: &FieldPath) -> String {
        match self {
            RuleKind::MinValue { min } => format!("{field} must be at least {}", canonical_number(*min)),
            RuleKind::MaxValue { max } => format!("{field} must be at most {}", canonical_number(*max)),
            RuleKind::InList { list } => format!("{field} must be one of [{}]", list.join(", ")),
            RuleKind::NotInList { list } => {
                format!("{field} must not be one of [{}]", list.join(", "))
            }
            RuleKind::BooleanIsTrue => format!("{field} must be true"),
            RuleKind::Range { min, max } => format!(
                "{field} must be between {} and {}",
                canonical_number(*min),
                canonical_number(*max)
            ),
        }
    }
}

impl CompiledPolicy {
    pub fn compile(policy: &Policy) -> Result<Self, PolicyConfigurationError> {
        let mut seen = HashSet::new();
        let hard_rules = compile_group(&policy.hard_rules, Severity::Hard, &mut seen)?;
        let soft_rules = compile_group(&policy.soft_rules, Severity::Soft, &mut seen)?;
        validate_scoring(&policy.scoring_config)?;

        Ok(Self {
            lender_program_id: policy.lender_program_id,
            version: policy.version,
            hard_rules,
            soft_rules,
            scoring: policy.scoring_config.clone(),
        })
    }

    pub fn rule_count(&self) -> usize {
        self.hard_rules.rule_count() + self.soft_rules.rule_count()
    }
}

fn compile_group(
    group: &RuleGroupDefinition,
    expected: Severity,
    seen: &mut HashSet<String>,
) -> Result<RuleGroup, PolicyConfigurationError> {
    let rules = group
        .rules
        .iter()
        .map(|rule| compile_rule(rule, expected, seen))
        .collect::<Result<Vec<_>, _>>()?;
    let groups = group
        .groups
        .iter()
        .map(|child| compile_group(child, expected, seen))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RuleGroup {
        logic: group.logic,
        rules,
        groups,
    })
}

fn compile_rule(
    rule: &RuleDefinition,
    expected: Severity,
    seen: &mut HashSet<String>,
) -> Result<Rule, PolicyConfigurationError> {
    let id = rule.id.trim();
    if id.is_empty() {
        return Err(PolicyConfigurationError::MissingRuleId);
    }
    if !seen.insert(id.to_string()) {
        return Err(PolicyConfigurationError::DuplicateRuleId {
            rule_id: id.to_string(),
        });
    }
    if rule.severity != expected {
        return Err(PolicyConfigurationError::SeverityMismatch {
            rule_id: id.to_string(),
            declared: rule.severity,
            group: expected,
        });
    }

    let raw_field = rule
        .field
        .as_deref()
        .ok_or_else(|| PolicyConfigurationError::MissingField {
            rule_id: id.to_string(),
        })?;
    let bad_path = |source: FieldResolutionError| PolicyConfigurationError::BadFieldPath {
        rule_id: id.to_string(),
        source,
    };
    let field = FieldPath::parse(raw_field).map_err(bad_path)?;
    let target = field.target().map_err(bad_path)?;

    let kind = match rule.rule_type.trim().to_ascii_uppercase().as_str() {
        "MIN_VALUE" => RuleKind::MinValue {
            min: number_param(id, &rule.params, "min")?,
        },
        "MAX_VALUE" => RuleKind::MaxValue {
            max: number_param(id, &rule.params, "max")?,
        },
        "IN_LIST" => RuleKind::InList {
            list: list_param(id, &rule.params)?,
        },
        "NOT_IN_LIST" => RuleKind::NotInList {
            list: list_param(id, &rule.params)?,
        },
        "BOOLEAN_IS_TRUE" => RuleKind::BooleanIsTrue,
        "RANGE" => {
            let min = number_param(id, &rule.params, "min")?;
            let max = number_param(id, &rule.params, "max")?;
            if min > max {
                return Err(PolicyConfigurationError::InvalidParams {
                    rule_id: id.to_string(),
                    detail: format!("range min {min} exceeds max {max}"),
                });
            }
            RuleKind::Range { min, max }
        }
        _ => {
            return Err(PolicyConfigurationError::UnknownRuleType {
                rule_id: id.to_string(),
                rule_type: rule.rule_type.clone(),
            })
        }
    };

    Ok(Rule {
        id: id.to_string(),
        kind,
        field,
        target,
        severity: rule.severity,
        message: rule.message.trim().to_string(),
    })
}

fn number_param(
    rule_id: &str,
    params: &Map<String, Value>,
    name: &str,
) -> Result<f64, PolicyConfigurationError> {
    params
        .get(name)
        .and_then(Value::as_f64)
        .filter(|value| value.is_finite())
        .ok_or_else(|| PolicyConfigurationError::InvalidParams {
            rule_id: rule_id.to_string(),
            detail: format!("'{name}' must be a finite number"),
        })
}

fn list_param(
    rule_id: &str,
    params: &Map<String, Value>,
) -> Result<Vec<String>, PolicyConfigurationError> {
    let invalid = |detail: String| PolicyConfigurationError::InvalidParams {
        rule_id: rule_id.to_string(),
        detail,
    };

    let entries = params
        .get("list")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("'list' must be an array".to_string()))?;

    entries
        .iter()
        .map(|entry| match entry {
            Value::String(value) => Ok(value.clone()),
            Value::Bool(value) => Ok(value.to_string()),
            Value::Number(value) => value
                .as_f64()
                .map(canonical_number)
                .ok_or_else(|| invalid(format!("list entry {value} is not representable"))),
            other => Err(invalid(format!("list entry {other} is not a scalar"))),
        })
        .collect()
}

fn validate_scoring(scoring: &ScoringConfig) -> Result<(), PolicyConfigurationError> {
    if !scoring.base_score.is_finite() || !scoring.min_accept_score.is_finite() {
        return Err(PolicyConfigurationError::InvalidScoring {
            detail: "base_score and min_accept_score must be finite".to_string(),
        });
    }
    if let Some(deduction) = scoring
        .deductions
        .iter()
        .find(|deduction| !deduction.points.is_finite() || deduction.points < 0.0)
    {
        return Err(PolicyConfigurationError::InvalidScoring {
            detail: format!(
                "deduction for '{}' must be a non-negative number of points",
                deduction.rule_id
            ),
        });
    }
    Ok(())
}

/// Malformed policy. Isolated to the program the policy belongs to.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyConfigurationError {
    #[error("rule is missing an id")]
    MissingRuleId,
    #[error("rule id '{rule_id}' is used more than once")]
    DuplicateRuleId { rule_id: String },
    #[error("rule '{rule_id}' is declared {declared} inside the {group} rule group")]
    SeverityMismatch {
        rule_id: String,
        declared: Severity,
        group: Severity,
    },
    #[error("rule '{rule_id}' does not name a field")]
    MissingField { rule_id: String },
    #[error("rule '{rule_id}' has a bad field path: {source}")]
    BadFieldPath {
        rule_id: String,
        source: FieldResolutionError,
    },
    #[error("rule '{rule_id}' has unknown rule type '{rule_type}'")]
    UnknownRuleType { rule_id: String, rule_type: String },
    #[error("rule '{rule_id}' has invalid params: {detail}")]
    InvalidParams { rule_id: String, detail: String },
    #[error("scoring config is invalid: {detail}")]
    InvalidScoring { detail: String },
    #[error("policy targets program {policy_program} but is attached to program {program}")]
    ProgramMismatch {
        program: LenderProgramId,
        policy_program: LenderProgramId,
    },
    #[error("no active policy for program {program}")]
    MissingPolicy { program: LenderProgramId },
    #[error("policy for program {program} could not be loaded: {detail}")]
    PolicyUnavailable {
        program: LenderProgramId,
        detail: String,
    },
}

impl PolicyConfigurationError {
    pub const fn kind(&self) -> &'static str {
        match self {
            PolicyConfigurationError::MissingRuleId
            | PolicyConfigurationError::DuplicateRuleId { .. } => "invalid_rule_id",
            PolicyConfigurationError::SeverityMismatch { .. } => "severity_mismatch",
            PolicyConfigurationError::MissingField { .. }
            | PolicyConfigurationError::BadFieldPath { .. } => "bad_field_path",
            PolicyConfigurationError::UnknownRuleType { .. } => "unknown_rule_type",
            PolicyConfigurationError::InvalidParams { .. } => "invalid_params",
            PolicyConfigurationError::InvalidScoring { .. } => "invalid_scoring",
            PolicyConfigurationError::ProgramMismatch { .. } => "program_mismatch",
            PolicyConfigurationError::MissingPolicy { .. } => "missing_policy",
            PolicyConfigurationError::PolicyUnavailable { .. } => "policy_unavailable",
        }
    }
}
