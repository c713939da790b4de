//! Demo lender catalog: programs and active policies for a handful of equipment lenders.

use crate::infra::InMemoryDirectory;
use lender_match::workflows::underwriting::{
    Application, Borrower, Deduction, GroupLogic, Guarantor, Lender, LenderId, LenderProgram,
    LenderProgramId, LoanRequest, LoanRequestId, Policy, RuleDefinition, RuleGroupDefinition,
    ScoringConfig, Severity,
};
use serde_json::{json, Map, Value};

pub(crate) const SAMPLE_LOAN: LoanRequestId = LoanRequestId(1);

const RESTRICTED_INDUSTRIES: [&str; 5] = [
    "Cannabis",
    "Gaming",
    "Adult Entertainment",
    "Firearms",
    "Check Cashing",
];

fn rule(
    id: &str,
    rule_type: &str,
    field: &str,
    params: Value,
    severity: Severity,
    message: &str,
) -> RuleDefinition {
    let params = match params {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    RuleDefinition {
        id: id.to_string(),
        rule_type: rule_type.to_string(),
        field: Some(field.to_string()),
        params,
        severity,
        message: message.to_string(),
    }
}

fn hard(id: &str, rule_type: &str, field: &str, params: Value, message: &str) -> RuleDefinition {
    rule(id, rule_type, field, params, Severity::Hard, message)
}

fn soft(id: &str, rule_type: &str, field: &str, params: Value, message: &str) -> RuleDefinition {
    rule(id, rule_type, field, params, Severity::Soft, message)
}

fn min_fico(id: &str, min: u16, severity: Severity) -> RuleDefinition {
    rule(
        id,
        "MIN_VALUE",
        "guarantors[0].fico_score",
        json!({ "min": min }),
        severity,
        &format!("FICO must be {min}+"),
    )
}

fn min_tib(id: &str, years: u32) -> RuleDefinition {
    hard(
        id,
        "MIN_VALUE",
        "borrower.years_in_business",
        json!({ "min": years }),
        &format!("{years}+ years in business"),
    )
}

fn min_paynet(id: &str, min: u32) -> RuleDefinition {
    hard(
        id,
        "MIN_VALUE",
        "borrower.paynet_score",
        json!({ "min": min }),
        &format!("PayNet {min}+ required"),
    )
}

fn no_bankruptcy(id: &str) -> RuleDefinition {
    hard(
        id,
        "NOT_IN_LIST",
        "guarantors[0].bankruptcy_flag",
        json!({ "list": [true] }),
        "No bankruptcies allowed",
    )
}

fn policy(
    program: LenderProgramId,
    hard_rules: Vec<RuleDefinition>,
    soft_rules: Vec<RuleDefinition>,
    min_accept_score: f64,
    deductions: &[(&str, f64)],
) -> Policy {
    Policy {
        lender_program_id: program,
        version: 1,
        is_active: true,
        hard_rules: RuleGroupDefinition {
            logic: GroupLogic::All,
            rules: hard_rules,
            groups: Vec::new(),
        },
        soft_rules: RuleGroupDefinition {
            logic: GroupLogic::All,
            rules: soft_rules,
            groups: Vec::new(),
        },
        scoring_config: ScoringConfig {
            base_score: 100.0,
            min_accept_score,
            deductions: deductions
                .iter()
                .map(|(rule_id, points)| Deduction {
                    rule_id: rule_id.to_string(),
                    points: *points,
                })
                .collect(),
        },
    }
}

struct SeedProgram {
    id: u64,
    name: &'static str,
    min_amount: f64,
    max_amount: f64,
    min_term_months: u32,
    max_term_months: u32,
}

fn register(directory: &InMemoryDirectory, lender: LenderId, program: SeedProgram, policy: Policy) {
    directory.add_program(LenderProgram {
        id: LenderProgramId(program.id),
        lender_id: lender,
        name: program.name.to_string(),
        min_amount: program.min_amount,
        max_amount: program.max_amount,
        min_term_months: program.min_term_months,
        max_term_months: program.max_term_months,
    });
    directory.activate_policy(policy);
}

fn lender(directory: &InMemoryDirectory, id: u64, name: &str, active: bool) -> LenderId {
    let id = LenderId(id);
    directory.add_lender(Lender {
        id,
        name: name.to_string(),
        active,
    });
    id
}

/// Build the demo catalog. The Advantage+ policy references an attribute the application
/// does not carry, so that program always reports a configuration fault.
pub(crate) fn seed_directory() -> InMemoryDirectory {
    let directory = InMemoryDirectory::default();

    let apex = lender(&directory, 1, "Apex Equipment Finance", true);
    register(
        &directory,
        apex,
        SeedProgram {
            id: 11,
            name: "Standard A",
            min_amount: 10_000.0,
            max_amount: 500_000.0,
            min_term_months: 24,
            max_term_months: 60,
        },
        policy(
            LenderProgramId(11),
            vec![min_fico("fico_650", 650, Severity::Hard), min_tib("tib_5yrs", 5)],
            vec![min_fico("ideal_fico_700", 700, Severity::Soft)],
            60.0,
            &[("ideal_fico_700", 10.0)],
        ),
    );
    register(
        &directory,
        apex,
        SeedProgram {
            id: 12,
            name: "Standard C",
            min_amount: 10_000.0,
            max_amount: 100_000.0,
            min_term_months: 24,
            max_term_months: 60,
        },
        policy(
            LenderProgramId(12),
            vec![min_fico("fico_640", 640, Severity::Hard), min_tib("tib_2yrs", 2)],
            Vec::new(),
            50.0,
            &[],
        ),
    );

    let falcon = lender(&directory, 2, "Falcon Equipment Finance", true);
    register(
        &directory,
        falcon,
        SeedProgram {
            id: 21,
            name: "Falcon A Program",
            min_amount: 10_000.0,
            max_amount: 500_000.0,
            min_term_months: 24,
            max_term_months: 60,
        },
        policy(
            LenderProgramId(21),
            vec![
                min_tib("tib_3yrs", 3),
                min_fico("fico_680", 680, Severity::Hard),
                min_paynet("paynet_660", 660),
                hard(
                    "no_private_party_sales",
                    "NOT_IN_LIST",
                    "loan_request.equipment_condition",
                    json!({ "list": ["Private Party"] }),
                    "Private party sales are not financed",
                ),
            ],
            vec![min_fico("ideal_fico_700", 700, Severity::Soft)],
            60.0,
            &[("ideal_fico_700", 10.0)],
        ),
    );

    let citizens = lender(&directory, 3, "Citizens Bank", true);
    register(
        &directory,
        citizens,
        SeedProgram {
            id: 31,
            name: "Tier 1 Program",
            min_amount: 5_000.0,
            max_amount: 1_000_000.0,
            min_term_months: 24,
            max_term_months: 60,
        },
        policy(
            LenderProgramId(31),
            vec![min_fico("fico_700", 700, Severity::Hard), min_tib("tib_2yrs", 2)],
            vec![
                soft(
                    "homeowner_check",
                    "BOOLEAN_IS_TRUE",
                    "guarantors[0].homeowner_flag",
                    json!({}),
                    "Guarantor is not a homeowner",
                ),
                soft(
                    "ideal_tib_3yrs",
                    "MIN_VALUE",
                    "borrower.years_in_business",
                    json!({ "min": 3 }),
                    "Ideal 3+ years in business",
                ),
            ],
            60.0,
            &[("homeowner_check", 5.0), ("ideal_tib_3yrs", 10.0)],
        ),
    );
    register(
        &directory,
        citizens,
        SeedProgram {
            id: 32,
            name: "Tier 3 Full Financials Program",
            min_amount: 5_000.0,
            max_amount: 1_000_000.0,
            min_term_months: 24,
            max_term_months: 60,
        },
        policy(
            LenderProgramId(32),
            vec![
                min_tib("tib_2yrs", 2),
                hard(
                    "no_CA",
                    "NOT_IN_LIST",
                    "borrower.state",
                    json!({ "list": ["CA"] }),
                    "California borrowers are not eligible",
                ),
            ],
            vec![soft(
                "medical_requires_license",
                "BOOLEAN_IS_TRUE",
                "borrower.medical_license_flag",
                json!({}),
                "Medical license on file",
            )],
            50.0,
            &[("medical_requires_license", 20.0)],
        ),
    );

    let stearns = lender(&directory, 4, "Stearns Bank", true);
    let restricted = json!({ "list": RESTRICTED_INDUSTRIES });
    register(
        &directory,
        stearns,
        SeedProgram {
            id: 41,
            name: "Tier 1",
            min_amount: 25_000.0,
            max_amount: 1_000_000.0,
            min_term_months: 24,
            max_term_months: 72,
        },
        policy(
            LenderProgramId(41),
            vec![
                min_fico("fico_725", 725, Severity::Hard),
                min_tib("tib_3", 3),
                min_paynet("paynet_685", 685),
                no_bankruptcy("no_bk_7yrs"),
                hard(
                    "restricted_industries",
                    "NOT_IN_LIST",
                    "borrower.industry",
                    restricted.clone(),
                    "Industry is restricted",
                ),
            ],
            Vec::new(),
            70.0,
            &[],
        ),
    );
    register(
        &directory,
        stearns,
        SeedProgram {
            id: 42,
            name: "Tier 2",
            min_amount: 10_000.0,
            max_amount: 500_000.0,
            min_term_months: 24,
            max_term_months: 60,
        },
        policy(
            LenderProgramId(42),
            vec![
                min_fico("fico_700", 700, Severity::Hard),
                min_tib("tib_2", 2),
                min_paynet("paynet_665", 665),
                no_bankruptcy("no_bk_7yrs"),
                hard(
                    "restricted",
                    "NOT_IN_LIST",
                    "borrower.industry",
                    restricted,
                    "Industry is restricted",
                ),
            ],
            Vec::new(),
            60.0,
            &[],
        ),
    );

    let advantage = lender(&directory, 5, "Advantage+ Financing", true);
    register(
        &directory,
        advantage,
        SeedProgram {
            id: 51,
            name: "Standard Advantage+ Program",
            min_amount: 10_000.0,
            max_amount: 75_000.0,
            min_term_months: 12,
            max_term_months: 60,
        },
        policy(
            LenderProgramId(51),
            vec![
                min_fico("min_fico_680", 680, Severity::Hard),
                no_bankruptcy("no_bankruptcies"),
                hard(
                    "no_collections",
                    "NOT_IN_LIST",
                    "borrower.has_collections_3yr",
                    json!({ "list": [true] }),
                    "No collections or charge-offs in last 3 years",
                ),
                min_tib("min_tib_3yrs", 3),
            ],
            vec![min_fico("fico_700_startup", 700, Severity::Soft)],
            60.0,
            &[("fico_700_startup", 10.0)],
        ),
    );

    let legacy = lender(&directory, 6, "Legacy Leasing", false);
    register(
        &directory,
        legacy,
        SeedProgram {
            id: 61,
            name: "Legacy Standard",
            min_amount: 1_000.0,
            max_amount: 2_000_000.0,
            min_term_months: 12,
            max_term_months: 84,
        },
        policy(
            LenderProgramId(61),
            vec![min_fico("fico_600", 600, Severity::Hard)],
            Vec::new(),
            60.0,
            &[],
        ),
    );

    directory
}

/// Sample borrower used by the demo command.
pub(crate) fn sample_application(amount: f64, term_months: u32, fico_score: u16) -> Application {
    Application {
        borrower: Borrower {
            business_name: "Heartland Earthworks LLC".to_string(),
            industry: "Construction".to_string(),
            state: "IA".to_string(),
            years_in_business: 4.0,
            annual_revenue: 1_800_000.0,
            medical_license_flag: None,
            paynet_score: Some(690),
        },
        guarantors: vec![Guarantor {
            name: "Jordan Alvarez".to_string(),
            fico_score,
            homeowner_flag: Some(true),
            bankruptcy_flag: false,
            delinquency_flag: Some(false),
        }],
        loan_request: LoanRequest {
            amount,
            term_months,
            equipment_type: "Excavator".to_string(),
            equipment_cost: amount,
            equipment_year: 2022,
            equipment_vendor: "Midwest Heavy Equipment".to_string(),
            equipment_condition: "Dealer".to_string(),
        },
    }
}
