use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Identifier of the loan request an application is filed under.
    LoanRequestId
);
numeric_id!(LenderId);
numeric_id!(LenderProgramId);
numeric_id!(
    /// Identifier assigned to a match run when underwriting is invoked.
    MatchRunId
);

/// Business seeking equipment financing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Borrower {
    pub business_name: String,
    pub industry: String,
    pub state: String,
    pub years_in_business: f64,
    pub annual_revenue: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_license_flag: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paynet_score: Option<u32>,
}

/// Individual personally guaranteeing the loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guarantor {
    pub name: String,
    pub fico_score: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homeowner_flag: Option<bool>,
    pub bankruptcy_flag: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delinquency_flag: Option<bool>,
}

/// Financing terms and the equipment being financed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRequest {
    pub amount: f64,
    pub term_months: u32,
    pub equipment_type: String,
    pub equipment_cost: f64,
    pub equipment_year: u16,
    pub equipment_vendor: String,
    pub equipment_condition: String,
}

/// The borrower, guarantor(s), and loan request bundle being underwritten.
///
/// Guarantor order is significant: `guarantors[0]` is the primary guarantor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub borrower: Borrower,
    pub guarantors: Vec<Guarantor>,
    pub loan_request: LoanRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lender {
    pub id: LenderId,
    pub name: String,
    pub active: bool,
}

/// Product offered by a lender, gated by amount and term before any policy runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LenderProgram {
    pub id: LenderProgramId,
    pub lender_id: LenderId,
    pub name: String,
    pub min_amount: f64,
    pub max_amount: f64,
    pub min_term_months: u32,
    pub max_term_months: u32,
}

impl LenderProgram {
    /// Inclusive amount and term pre-gate.
    pub fn accepts(&self, amount: f64, term_months: u32) -> bool {
        (self.min_amount..=self.max_amount).contains(&amount)
            && (self.min_term_months..=self.max_term_months).contains(&term_months)
    }
}
