//! Field-path addressing into an [`Application`].
//!
//! Paths are dot-separated segments, each optionally carrying a bracketed index
//! (`guarantors[0].fico_score`). A path is parsed once into [`PathSegment`]s and bound to a
//! [`FieldTarget`], a closed description of the application shape, so resolution never
//! performs open-ended lookups.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::domain::Application;

/// Parsed field path with its original spelling preserved for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<PathSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub name: String,
    pub index: Option<usize>,
}

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self, FieldResolutionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(FieldResolutionError::invalid(raw, "path is empty"));
        }

        let segments = trimmed
            .split('.')
            .map(|segment| parse_segment(trimmed, segment))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: trimmed.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Bind the path to the application shape.
    pub fn target(&self) -> Result<FieldTarget, FieldResolutionError> {
        let (root, rest) = self
            .segments
            .split_first()
            .ok_or_else(|| FieldResolutionError::invalid(&self.raw, "path is empty"))?;

        match root.name.as_str() {
            "borrower" => {
                self.reject_index(root)?;
                let attribute = self.single_attribute(rest)?;
                BorrowerField::from_name(&attribute.name)
                    .map(FieldTarget::Borrower)
                    .ok_or_else(|| self.not_found())
            }
            "loan_request" => {
                self.reject_index(root)?;
                let attribute = self.single_attribute(rest)?;
                LoanRequestField::from_name(&attribute.name)
                    .map(FieldTarget::LoanRequest)
                    .ok_or_else(|| self.not_found())
            }
            "guarantors" => {
                let index = root.index.ok_or_else(|| self.not_found())?;
                let attribute = self.single_attribute(rest)?;
                GuarantorField::from_name(&attribute.name)
                    .map(|field| FieldTarget::Guarantor { index, field })
                    .ok_or_else(|| self.not_found())
            }
            _ => Err(self.not_found()),
        }
    }

    /// Resolve the path against an application snapshot.
    pub fn resolve(&self, application: &Application) -> Result<FieldValue, FieldResolutionError> {
        self.target()?
            .read(application)
            .ok_or_else(|| self.not_found())
    }

    fn reject_index(&self, segment: &PathSegment) -> Result<(), FieldResolutionError> {
        match segment.index {
            Some(_) => Err(FieldResolutionError::NotASequence {
                path: self.raw.clone(),
                segment: segment.name.clone(),
            }),
            None => Ok(()),
        }
    }

    // Every document in the application is flat, so exactly one attribute follows the root.
    fn single_attribute<'a>(
        &self,
        rest: &'a [PathSegment],
    ) -> Result<&'a PathSegment, FieldResolutionError> {
        match rest {
            [attribute] => {
                self.reject_index(attribute)?;
                Ok(attribute)
            }
            _ => Err(self.not_found()),
        }
    }

    fn not_found(&self) -> FieldResolutionError {
        FieldResolutionError::FieldNotFound {
            path: self.raw.clone(),
        }
    }
}

impl FromStr for FieldPath {
    type Err = FieldResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn parse_segment(path: &str, segment: &str) -> Result<PathSegment, FieldResolutionError> {
    let (name, index) = match segment.find('[') {
        Some(open) => {
            let inner = segment[open + 1..].strip_suffix(']').ok_or_else(|| {
                FieldResolutionError::invalid(path, format!("unterminated index in '{segment}'"))
            })?;
            let index = inner.parse::<usize>().map_err(|_| {
                FieldResolutionError::invalid(path, format!("index '{inner}' is not an integer"))
            })?;
            (&segment[..open], Some(index))
        }
        None => (segment, None),
    };

    if name.is_empty() {
        return Err(FieldResolutionError::invalid(path, "empty segment"));
    }
    if !name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    {
        return Err(FieldResolutionError::invalid(
            path,
            format!("segment '{name}' contains unsupported characters"),
        ));
    }

    Ok(PathSegment {
        name: name.to_string(),
        index,
    })
}

/// Resolve a raw path string in one step.
pub fn resolve(path: &str, application: &Application) -> Result<FieldValue, FieldResolutionError> {
    FieldPath::parse(path)?.resolve(application)
}

/// Addressable attribute of the application, bound at policy load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTarget {
    Borrower(BorrowerField),
    Guarantor { index: usize, field: GuarantorField },
    LoanRequest(LoanRequestField),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowerField {
    BusinessName,
    Industry,
    State,
    YearsInBusiness,
    AnnualRevenue,
    MedicalLicenseFlag,
    PaynetScore,
}

impl BorrowerField {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "business_name" => Self::BusinessName,
            "industry" => Self::Industry,
            "state" => Self::State,
            "years_in_business" => Self::YearsInBusiness,
            "annual_revenue" => Self::AnnualRevenue,
            "medical_license_flag" => Self::MedicalLicenseFlag,
            "paynet_score" => Self::PaynetScore,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuarantorField {
    Name,
    FicoScore,
    HomeownerFlag,
    BankruptcyFlag,
    DelinquencyFlag,
}

impl GuarantorField {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "name" => Self::Name,
            "fico_score" => Self::FicoScore,
            "homeowner_flag" => Self::HomeownerFlag,
            "bankruptcy_flag" => Self::BankruptcyFlag,
            "delinquency_flag" => Self::DelinquencyFlag,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanRequestField {
    Amount,
    TermMonths,
    EquipmentType,
    EquipmentCost,
    EquipmentYear,
    EquipmentVendor,
    EquipmentCondition,
}

impl LoanRequestField {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "amount" => Self::Amount,
            "term_months" => Self::TermMonths,
            "equipment_type" => Self::EquipmentType,
            "equipment_cost" => Self::EquipmentCost,
            "equipment_year" => Self::EquipmentYear,
            "equipment_vendor" => Self::EquipmentVendor,
            "equipment_condition" => Self::EquipmentCondition,
            _ => return None,
        })
    }
}

impl FieldTarget {
    /// Read the addressed value. `None` means the value is absent: an out-of-range
    /// guarantor index or an optional attribute that was not supplied.
    pub fn read(&self, application: &Application) -> Option<FieldValue> {
        match *self {
            FieldTarget::Borrower(field) => {
                let borrower = &application.borrower;
                match field {
                    BorrowerField::BusinessName => Some(text(&borrower.business_name)),
                    BorrowerField::Industry => Some(text(&borrower.industry)),
                    BorrowerField::State => Some(text(&borrower.state)),
                    BorrowerField::YearsInBusiness => {
                        Some(FieldValue::Number(borrower.years_in_business))
                    }
                    BorrowerField::AnnualRevenue => {
                        Some(FieldValue::Number(borrower.annual_revenue))
                    }
                    BorrowerField::MedicalLicenseFlag => {
                        borrower.medical_license_flag.map(FieldValue::Flag)
                    }
                    BorrowerField::PaynetScore => borrower
                        .paynet_score
                        .map(|score| FieldValue::Number(f64::from(score))),
                }
            }
            FieldTarget::Guarantor { index, field } => {
                let guarantor = application.guarantors.get(index)?;
                match field {
                    GuarantorField::Name => Some(text(&guarantor.name)),
                    GuarantorField::FicoScore => {
                        Some(FieldValue::Number(f64::from(guarantor.fico_score)))
                    }
                    GuarantorField::HomeownerFlag => guarantor.homeowner_flag.map(FieldValue::Flag),
                    GuarantorField::BankruptcyFlag => Some(FieldValue::Flag(guarantor.bankruptcy_flag)),
                    GuarantorField::DelinquencyFlag => {
                        guarantor.delinquency_flag.map(FieldValue::Flag)
                    }
                }
            }
            FieldTarget::LoanRequest(field) => {
                let loan = &application.loan_request;
                match field {
                    LoanRequestField::Amount => Some(FieldValue::Number(loan.amount)),
                    LoanRequestField::TermMonths => {
                        Some(FieldValue::Number(f64::from(loan.term_months)))
                    }
                    LoanRequestField::EquipmentType => Some(text(&loan.equipment_type)),
                    LoanRequestField::EquipmentCost => Some(FieldValue::Number(loan.equipment_cost)),
                    LoanRequestField::EquipmentYear => {
                        Some(FieldValue::Number(f64::from(loan.equipment_year)))
                    }
                    LoanRequestField::EquipmentVendor => Some(text(&loan.equipment_vendor)),
                    LoanRequestField::EquipmentCondition => Some(text(&loan.equipment_condition)),
                }
            }
        }
    }
}

fn text(value: &str) -> FieldValue {
    FieldValue::Text(value.to_string())
}

/// Scalar read from the application.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Flag(bool),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            FieldValue::Flag(value) => Some(*value),
            _ => None,
        }
    }

    /// String form used for list membership.
    pub fn canonical(&self) -> String {
        match self {
            FieldValue::Number(value) => canonical_number(*value),
            FieldValue::Text(value) => value.clone(),
            FieldValue::Flag(value) => value.to_string(),
        }
    }
}

/// Integral numbers render without a fractional part so `700` and `700.0` compare equal.
pub(crate) fn canonical_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Failure to resolve a field path. Non-fatal during evaluation: it downgrades to a failed
/// rule outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldResolutionError {
    #[error("field '{path}' not found")]
    FieldNotFound { path: String },
    #[error("field '{path}' indexes '{segment}', which is not a sequence")]
    NotASequence { path: String, segment: String },
    #[error("field path '{path}' is invalid: {detail}")]
    InvalidPath { path: String, detail: String },
}

impl FieldResolutionError {
    fn invalid(path: &str, detail: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            detail: detail.into(),
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            FieldResolutionError::FieldNotFound { .. } => "field_not_found",
            FieldResolutionError::NotASequence { .. } => "not_a_sequence",
            FieldResolutionError::InvalidPath { .. } => "invalid_path",
        }
    }
}
