//! Lender matching engine: resolves typed fields from a loan application, evaluates
//! per-program underwriting policies, and aggregates the outcomes into match runs.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
