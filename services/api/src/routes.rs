use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde_json::json;
use shift_cover::auth::{TokenVerifier, WebhookVerifier};
use shift_cover::workflows::coverage::{
    coverage_router, BroadcastHub, CoverageRepository, CoverageService, EventPublisher,
    NotificationTransport,
};
use std::sync::Arc;

pub(crate) fn with_coverage_routes<R, T, P>(
    service: Arc<CoverageService<R, T, P>>,
    hub: Arc<BroadcastHub>,
    verifier: Arc<TokenVerifier>,
    webhooks: Arc<WebhookVerifier>,
) -> axum::Router
where
    R: CoverageRepository + 'static,
    T: NotificationTransport + 'static,
    P: EventPublisher + 'static,
{
    coverage_router(service, hub, verifier, webhooks)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::LoggingTransport;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use shift_cover::workflows::coverage::{CoverageConfig, InMemoryCoverageStore, NotifyQueue};
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn app(ready: bool) -> axum::Router {
        let hub = Arc::new(BroadcastHub::new(8));
        let service = Arc::new(CoverageService::new(
            Arc::new(InMemoryCoverageStore::new()),
            Arc::new(LoggingTransport::default()),
            hub.clone(),
            NotifyQueue::detached(),
            CoverageConfig::default(),
        ));
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_coverage_routes(
            service,
            hub,
            Arc::new(TokenVerifier::new("routes-test")),
            Arc::new(WebhookVerifier::new("routes-webhook")),
        )
        .layer(Extension(state))
    }

    async fn get(app: axum::Router, uri: &str) -> StatusCode {
        app.oneshot(
            Request::get(uri)
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes")
        .status()
    }

    #[tokio::test]
    async fn health_is_always_ok() {
        let Json(body) = healthcheck().await;
        assert_eq!(body, json!({ "status": "ok" }));
        assert_eq!(get(app(false), "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_the_startup_flag() {
        assert_eq!(get(app(false), "/ready").await, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(get(app(true), "/ready").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_render_as_text() {
        assert_eq!(get(app(true), "/metrics").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn workflow_routes_stay_behind_auth() {
        assert_eq!(
            get(app(true), "/api/v1/sick-calls").await,
            StatusCode::UNAUTHORIZED
        );

        let response = app(true)
            .oneshot(
                Request::post("/api/v1/webhooks/sms")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"from":"5155550101","body":"YES"}"#))
                    .expect("request builds"),
            )
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
