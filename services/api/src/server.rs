use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryMatchRunRepository};
use crate::routes::with_underwriting_routes;
use crate::seed::{sample_application, seed_directory, SAMPLE_LOAN};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use lender_match::config::AppConfig;
use lender_match::error::AppError;
use lender_match::telemetry;
use lender_match::workflows::underwriting::UnderwritingService;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let directory = Arc::new(seed_directory());
    directory.file_application(SAMPLE_LOAN, sample_application(50_000.0, 36, 720));
    let runs = Arc::new(InMemoryMatchRunRepository::default());
    let underwriting_service = Arc::new(UnderwritingService::new(
        directory,
        runs,
        config.underwriting,
    ));

    let app = with_underwriting_routes(underwriting_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        program_budget_ms = config.underwriting.program_budget.as_millis() as u64,
        max_concurrency = config.underwriting.max_concurrency,
        sample_loan_request_id = %SAMPLE_LOAN,
        "lender match service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
