use crate::cli::ServeArgs;
use crate::infra::{AppState, LoggingTransport};
use crate::routes::with_coverage_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use shift_cover::auth::{TokenVerifier, WebhookVerifier};
use shift_cover::config::AppConfig;
use shift_cover::error::AppError;
use shift_cover::telemetry;
use shift_cover::workflows::coverage::{
    BroadcastHub, CoverageService, InMemoryCoverageStore, NotifyQueue, NotifyWorker,
};
use shift_cover::workflows::roster::RosterImporter;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

const EVENT_BUFFER: usize = 256;

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

    let store = Arc::new(InMemoryCoverageStore::new());
    match args.roster.take() {
        Some(roster) => {
            RosterImporter::from_paths(store.as_ref(), roster, args.schedule.take())?;
        }
        None => warn!("no roster supplied; starting with an empty store"),
    }

    let hub = Arc::new(BroadcastHub::new(EVENT_BUFFER));
    let (jobs, receiver) = NotifyQueue::channel();
    let retry = config.coverage.retry.clone();
    let service = Arc::new(CoverageService::new(
        store,
        Arc::new(LoggingTransport::default()),
        hub.clone(),
        jobs,
        config.coverage.clone(),
    ));
    NotifyWorker::new(service.clone(), receiver, retry).spawn();

    let verifier = Arc::new(TokenVerifier::new(&config.auth.jwt_secret));
    let webhooks = Arc::new(WebhookVerifier::new(config.auth.sms_webhook_secret.clone()));
    let app = with_coverage_routes(service, hub, verifier, webhooks)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "shift coverage service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
