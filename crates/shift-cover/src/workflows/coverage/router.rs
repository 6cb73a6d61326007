use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Extension, Router,
};
use futures::stream::{self, Stream};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::domain::{Actor, SickCallId, StaffId};
use super::events::{BroadcastHub, EventPublisher};
use super::notifications::NotificationTransport;
use super::ranking::RankingError;
use super::repository::{CoverageRepository, RepositoryError};
use super::service::{CoverageError, CoverageService, SickCallRequest};
use crate::auth::{AuthenticatedUser, TokenVerifier, VerifiedWebhook, WebhookVerifier};

/// Shared handler state: the workflow service plus the hub dashboards subscribe to.
pub struct RouterState<R, T, P> {
    pub service: Arc<CoverageService<R, T, P>>,
    pub hub: Arc<BroadcastHub>,
}

impl<R, T, P> Clone for RouterState<R, T, P> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            hub: self.hub.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReplyBody {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignBody {
    pub staff_id: StaffId,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Inbound SMS as posted by the messaging vendor.
#[derive(Debug, Deserialize)]
pub struct InboundSms {
    pub from: String,
    pub body: String,
}

/// Router builder exposing the sick-call workflow, SMS webhook, and dashboard stream.
pub fn coverage_router<R, T, P>(
    service: Arc<CoverageService<R, T, P>>,
    hub: Arc<BroadcastHub>,
    verifier: Arc<TokenVerifier>,
    webhooks: Arc<WebhookVerifier>,
) -> Router
where
    R: CoverageRepository + 'static,
    T: NotificationTransport + 'static,
    P: EventPublisher + 'static,
{
    Router::new()
        .route(
            "/api/v1/sick-calls",
            post(submit_handler::<R, T, P>).get(active_handler::<R, T, P>),
        )
        .route(
            "/api/v1/sick-calls/:sick_call_id/candidates",
            get(candidates_handler::<R, T, P>),
        )
        .route(
            "/api/v1/sick-calls/:sick_call_id/notify",
            post(notify_handler::<R, T, P>),
        )
        .route(
            "/api/v1/sick-calls/:sick_call_id/responses",
            post(respond_handler::<R, T, P>),
        )
        .route(
            "/api/v1/sick-calls/:sick_call_id/assign",
            post(assign_handler::<R, T, P>),
        )
        .route(
            "/api/v1/sick-calls/:sick_call_id/cancel",
            post(cancel_handler::<R, T, P>),
        )
        .route(
            "/api/v1/sick-calls/:sick_call_id/audit",
            get(audit_handler::<R, T, P>),
        )
        .route("/api/v1/webhooks/sms", post(sms_webhook_handler::<R, T, P>))
        .route("/api/v1/events", get(events_handler::<R, T, P>))
        .route(
            "/api/v1/coverage/failed-jobs",
            get(failed_jobs_handler::<R, T, P>),
        )
        .with_state(RouterState { service, hub })
        .layer(Extension(verifier))
        .layer(Extension(webhooks))
}

pub(crate) async fn submit_handler<R, T, P>(
    State(state): State<RouterState<R, T, P>>,
    AuthenticatedUser(actor): AuthenticatedUser,
    axum::Json(request): axum::Json<SickCallRequest>,
) -> Response
where
    R: CoverageRepository + 'static,
    T: NotificationTransport + 'static,
    P: EventPublisher + 'static,
{
    match state.service.submit(&actor, request) {
        Ok(sick_call) => (StatusCode::CREATED, axum::Json(sick_call)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn active_handler<R, T, P>(
    State(state): State<RouterState<R, T, P>>,
    AuthenticatedUser(actor): AuthenticatedUser,
) -> Response
where
    R: CoverageRepository + 'static,
    T: NotificationTransport + 'static,
    P: EventPublisher + 'static,
{
    match state.service.active_sick_calls(&actor.organization_id) {
        Ok(details) => (StatusCode::OK, axum::Json(details)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn candidates_handler<R, T, P>(
    State(state): State<RouterState<R, T, P>>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(sick_call_id): Path<String>,
) -> Response
where
    R: CoverageRepository + 'static,
    T: NotificationTransport + 'static,
    P: EventPublisher + 'static,
{
    if let Err(response) = require_manager(&actor) {
        return response;
    }
    match state
        .service
        .candidates(&SickCallId(sick_call_id), &actor.organization_id)
    {
        Ok(candidates) => (StatusCode::OK, axum::Json(candidates)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn notify_handler<R, T, P>(
    State(state): State<RouterState<R, T, P>>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(sick_call_id): Path<String>,
) -> Response
where
    R: CoverageRepository + 'static,
    T: NotificationTransport + 'static,
    P: EventPublisher + 'static,
{
    if let Err(response) = require_manager(&actor) {
        return response;
    }
    match state
        .service
        .notify_next(&SickCallId(sick_call_id), &actor.organization_id)
    {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn respond_handler<R, T, P>(
    State(state): State<RouterState<R, T, P>>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(sick_call_id): Path<String>,
    axum::Json(body): axum::Json<ReplyBody>,
) -> Response
where
    R: CoverageRepository + 'static,
    T: NotificationTransport + 'static,
    P: EventPublisher + 'static,
{
    let sick_call_id = SickCallId(sick_call_id);
    // replies are only accepted for sick calls in the caller's own organization
    if let Err(err) = state.service.sick_call(&sick_call_id, &actor.organization_id) {
        return error_response(err);
    }
    match state.service.respond(&sick_call_id, &actor.id, &body.text) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn assign_handler<R, T, P>(
    State(state): State<RouterState<R, T, P>>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(sick_call_id): Path<String>,
    axum::Json(body): axum::Json<AssignBody>,
) -> Response
where
    R: CoverageRepository + 'static,
    T: NotificationTransport + 'static,
    P: EventPublisher + 'static,
{
    match state.service.assign(
        &SickCallId(sick_call_id),
        &body.staff_id,
        Some(&actor),
        body.reason,
    ) {
        Ok(sick_call) => (StatusCode::OK, axum::Json(sick_call)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn cancel_handler<R, T, P>(
    State(state): State<RouterState<R, T, P>>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(sick_call_id): Path<String>,
) -> Response
where
    R: CoverageRepository + 'static,
    T: NotificationTransport + 'static,
    P: EventPublisher + 'static,
{
    match state.service.cancel(&SickCallId(sick_call_id), &actor) {
        Ok(sick_call) => (StatusCode::OK, axum::Json(sick_call)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn audit_handler<R, T, P>(
    State(state): State<RouterState<R, T, P>>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(sick_call_id): Path<String>,
) -> Response
where
    R: CoverageRepository + 'static,
    T: NotificationTransport + 'static,
    P: EventPublisher + 'static,
{
    if let Err(response) = require_manager(&actor) {
        return response;
    }
    match state
        .service
        .audit_trail(&SickCallId(sick_call_id), &actor.organization_id)
    {
        Ok(entries) => (StatusCode::OK, axum::Json(entries)).into_response(),
        Err(err) => error_response(err),
    }
}

/// Vendor callback. The vendor proves itself with the shared secret; the sender is then
/// identified by phone number.
pub(crate) async fn sms_webhook_handler<R, T, P>(
    State(state): State<RouterState<R, T, P>>,
    _verified: VerifiedWebhook,
    axum::Json(sms): axum::Json<InboundSms>,
) -> Response
where
    R: CoverageRepository + 'static,
    T: NotificationTransport + 'static,
    P: EventPublisher + 'static,
{
    match state.service.respond_by_phone(&sms.from, &sms.body) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn failed_jobs_handler<R, T, P>(
    State(state): State<RouterState<R, T, P>>,
    AuthenticatedUser(actor): AuthenticatedUser,
) -> Response
where
    R: CoverageRepository + 'static,
    T: NotificationTransport + 'static,
    P: EventPublisher + 'static,
{
    if let Err(response) = require_manager(&actor) {
        return response;
    }
    let failures = state.service.failed_notify_jobs(&actor.organization_id);
    (StatusCode::OK, axum::Json(failures)).into_response()
}

/// Server-sent event stream of the caller's organization.
pub(crate) async fn events_handler<R, T, P>(
    State(state): State<RouterState<R, T, P>>,
    AuthenticatedUser(actor): AuthenticatedUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    R: CoverageRepository + 'static,
    T: NotificationTransport + 'static,
    P: EventPublisher + 'static,
{
    let receiver = state.hub.subscribe(&actor.organization_id);
    let stream = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(published) => {
                    match Event::default()
                        .event(published.event.name())
                        .json_data(&published)
                    {
                        Ok(event) => return Some((Ok(event), receiver)),
                        Err(err) => {
                            warn!(error = %err, "could not encode dashboard event");
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "dashboard stream fell behind; events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn require_manager(actor: &Actor) -> Result<(), Response> {
    if actor.role.can_manage() {
        Ok(())
    } else {
        Err(error_response(CoverageError::Forbidden(format!(
            "{} role cannot perform this action",
            actor.role.label()
        ))))
    }
}

pub(crate) fn status_for(err: &CoverageError) -> StatusCode {
    match err {
        CoverageError::ShiftNotFound(_)
        | CoverageError::SickCallNotFound(_)
        | CoverageError::StaffNotFound(_)
        | CoverageError::UnknownPhone(_)
        | CoverageError::NoOpenOffer(_)
        | CoverageError::Ranking(RankingError::ShiftNotFound(_)) => StatusCode::NOT_FOUND,
        CoverageError::LocationMismatch { .. }
        | CoverageError::NotAssigned { .. }
        | CoverageError::ReporterCannotCover(_)
        | CoverageError::Reply(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CoverageError::DuplicateSickCall(_)
        | CoverageError::AlreadyCovered(_)
        | CoverageError::Closed { .. }
        | CoverageError::Transition(_) => StatusCode::CONFLICT,
        CoverageError::Forbidden(_) => StatusCode::FORBIDDEN,
        CoverageError::Ranking(RankingError::Repository(err))
        | CoverageError::Repository(err) => repository_status(err),
    }
}

fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Conflict
        | RepositoryError::AlreadyCovered
        | RepositoryError::StaleStatus { .. }
        | RepositoryError::Closed { .. }
        | RepositoryError::ShiftUnavailable { .. } => StatusCode::CONFLICT,
        RepositoryError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: CoverageError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        warn!(error = %err, "coverage request failed");
    }
    let payload = json!({
        "error": err.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
