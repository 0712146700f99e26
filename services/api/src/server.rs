use crate::cli::ServeArgs;
use crate::infra::{seed_demo_data, AppState, InMemorySessionRepository, LoggingNotificationPublisher};
use crate::routes::with_onboarding_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Duration;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

use onboard::config::AppConfig;
use onboard::error::AppError;
use onboard::onboarding::access::AccessController;
use onboard::onboarding::orchestrator::{OnboardingOrchestrator, OrchestratorSettings};
use onboard::onboarding::property_cache::PropertyAccessCache;
use onboard::onboarding::token::TokenService;
use onboard::telemetry;

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

    let repository = Arc::new(InMemorySessionRepository::default());
    let seeded = seed_demo_data(&repository);
    info!(applications = seeded.len(), "seeded approved applications");

    let notifications = Arc::new(LoggingNotificationPublisher);
    let tokens = Arc::new(TokenService::new(
        repository.clone(),
        &config.onboarding.token_secret,
    ));
    let cache = Arc::new(PropertyAccessCache::with_ttl(
        repository.clone(),
        config.onboarding.property_cache_ttl,
    ));
    let access = Arc::new(AccessController::new(cache, tokens.clone()));
    let orchestrator = Arc::new(OnboardingOrchestrator::new(
        repository,
        notifications,
        access,
        tokens,
        OrchestratorSettings {
            token_ttl: Duration::hours(config.onboarding.token_ttl_hours),
            session_deadline: Duration::days(config.onboarding.session_deadline_days),
        },
    ));

    let app = with_onboarding_routes(orchestrator)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "onboarding workflow service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
