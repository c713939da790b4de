use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;

use super::domain::{LoanRequestId, MatchRunId};
use super::evaluation::{CompiledPolicy, Policy};
use super::repository::{MatchRunRepository, RepositoryError, UnderwritingDirectory};
use super::service::{UnderwritingService, UnderwritingServiceError};

/// Router builder exposing underwriting runs and policy validation.
pub fn underwriting_router<D, R>(service: Arc<UnderwritingService<D, R>>) -> Router
where
    D: UnderwritingDirectory + 'static,
    R: MatchRunRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/underwriting/run/:loan_request_id",
            post(start_handler::<D, R>),
        )
        .route(
            "/api/v1/underwriting/runs/:run_id",
            get(status_handler::<D, R>),
        )
        .route("/api/v1/policies/validate", post(validate_handler))
        .with_state(service)
}

pub(crate) async fn start_handler<D, R>(
    State(service): State<Arc<UnderwritingService<D, R>>>,
    Path(loan_request_id): Path<u64>,
) -> Response
where
    D: UnderwritingDirectory + 'static,
    R: MatchRunRepository + 'static,
{
    match service.start_match_run(LoanRequestId(loan_request_id)) {
        Ok(run) => (StatusCode::ACCEPTED, axum::Json(run)).into_response(),
        Err(UnderwritingServiceError::Repository(RepositoryError::Conflict)) => {
            let payload = json!({
                "error": "match run already exists",
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        Err(other) => {
            let payload = json!({
                "error": other.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn status_handler<D, R>(
    State(service): State<Arc<UnderwritingService<D, R>>>,
    Path(run_id): Path<u64>,
) -> Response
where
    D: UnderwritingDirectory + 'static,
    R: MatchRunRepository + 'static,
{
    match service.get_match_run(MatchRunId(run_id)) {
        Ok(run) => (StatusCode::OK, axum::Json(run)).into_response(),
        Err(UnderwritingServiceError::Repository(RepositoryError::NotFound)) => {
            let payload = json!({
                "run_id": run_id,
                "error": "match run not found",
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(other) => {
            let payload = json!({
                "error": other.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

/// Compile a policy document without storing it.
pub(crate) async fn validate_handler(axum::Json(policy): axum::Json<Policy>) -> Response {
    match CompiledPolicy::compile(&policy) {
        Ok(compiled) => {
            let payload = json!({
                "valid": true,
                "lender_program_id": compiled.lender_program_id,
                "rules": compiled.rule_count(),
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => {
            let payload = json!({
                "valid": false,
                "kind": error.kind(),
                "error": error.to_string(),
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
    }
}
