use super::common::*;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::auth::{AuthenticatedUser, VerifiedWebhook, WEBHOOK_SECRET_HEADER};
use crate::workflows::coverage::router::{self, InboundSms, RouterState};
use crate::workflows::coverage::{
    Actor, BroadcastHub, CoverageError, CoverageRepository, InMemoryCoverageStore,
    RepositoryError, ShiftId, ShiftStatus, SickCallId, SickCallStatus, StaffId, TransitionError,
    UserRole,
};

async fn send(
    router: &axum::Router,
    method: &str,
    uri: &str,
    actor: Option<&Actor>,
    body: Option<Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        builder = builder.header(header::AUTHORIZATION, bearer(actor));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request builds");

    router
        .clone()
        .oneshot(request)
        .await
        .expect("route executes")
}

async fn send_sms(router: &axum::Router, secret: Option<&str>, body: Value) -> Response {
    let mut builder = Request::post("/api/v1/webhooks/sms")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(secret) = secret {
        builder = builder.header(WEBHOOK_SECRET_HEADER, secret);
    }
    router
        .clone()
        .oneshot(
            builder
                .body(Body::from(body.to_string()))
                .expect("request builds"),
        )
        .await
        .expect("route executes")
}

async fn submit_sick_call(router: &axum::Router) -> String {
    let response = send(
        router,
        "POST",
        "/api/v1/sick-calls",
        Some(&reporter()),
        Some(json!({ "shift_id": "sh-1", "location_id": "loc-1", "reason": "fever" })),
    )
    .await;
    let body = assert_status(response, StatusCode::CREATED).await;
    body["id"].as_str().expect("sick call id").to_string()
}

#[tokio::test]
async fn requests_without_a_token_are_unauthorized() {
    let (router, _, _) = router_fixture();

    let response = send(&router, "GET", "/api/v1/sick-calls", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = router
        .clone()
        .oneshot(
            Request::get("/api/v1/sick-calls")
                .header(header::AUTHORIZATION, "Token abc")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn submit_route_creates_then_rejects_duplicates() {
    let (router, _, store) = router_fixture();

    let id = submit_sick_call(&router).await;
    assert!(id.starts_with("sc-"));
    assert_eq!(
        store
            .sick_call(&SickCallId::new(id.clone()))
            .expect("store readable")
            .map(|call| call.status),
        Some(SickCallStatus::Pending)
    );

    let response = send(
        &router,
        "POST",
        "/api/v1/sick-calls",
        Some(&reporter()),
        Some(json!({ "shift_id": "sh-1", "location_id": "loc-1" })),
    )
    .await;
    let body = assert_status(response, StatusCode::CONFLICT).await;
    assert!(body["error"]
        .as_str()
        .expect("error message")
        .contains("already has an active sick call"));
}

#[tokio::test]
async fn submit_route_rejects_someone_elses_shift() {
    let (router, _, _) = router_fixture();

    let response = send(
        &router,
        "POST",
        "/api/v1/sick-calls",
        Some(&coworker("s-ada")),
        Some(json!({ "shift_id": "sh-1", "location_id": "loc-1" })),
    )
    .await;
    assert_status(response, StatusCode::UNPROCESSABLE_ENTITY).await;
}

#[tokio::test]
async fn candidates_route_is_limited_to_managers() {
    let (router, _, _) = router_fixture();
    let id = submit_sick_call(&router).await;
    let uri = format!("/api/v1/sick-calls/{id}/candidates");

    let response = send(&router, "GET", &uri, Some(&coworker("s-ada")), None).await;
    assert_status(response, StatusCode::FORBIDDEN).await;

    let response = send(&router, "GET", &uri, Some(&manager()), None).await;
    let body = assert_status(response, StatusCode::OK).await;
    let candidates = body.as_array().expect("candidate list");
    assert_eq!(candidates.len(), 3);
    assert_eq!(candidates[0]["staff"]["id"], "s-ada");
    assert_eq!(candidates[0]["rank"], 1);
}

#[tokio::test]
async fn notify_then_reply_covers_the_shift_once() {
    let (router, _, store) = router_fixture();
    let id = submit_sick_call(&router).await;

    let response = send(
        &router,
        "POST",
        &format!("/api/v1/sick-calls/{id}/notify"),
        Some(&manager()),
        None,
    )
    .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["outcome"], "offered");
    assert_eq!(body["offered_to"], "s-ada");

    let reply_uri = format!("/api/v1/sick-calls/{id}/responses");
    let response = send(
        &router,
        "POST",
        &reply_uri,
        Some(&coworker("s-ada")),
        Some(json!({ "text": "YES" })),
    )
    .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["response"]["response_type"], "ACCEPT");
    assert_eq!(body["sick_call"]["status"], "covered");

    let response = send(
        &router,
        "POST",
        &reply_uri,
        Some(&coworker("s-eve")),
        Some(json!({ "text": "YES" })),
    )
    .await;
    assert_status(response, StatusCode::CONFLICT).await;

    let shift = store
        .shift(&ShiftId::new("sh-1"))
        .expect("store readable")
        .expect("shift stored");
    assert_eq!(shift.status, ShiftStatus::Covered);
    assert_eq!(shift.assigned_to, Some(StaffId::new("s-ada")));
}

#[tokio::test]
async fn unreadable_reply_is_unprocessable() {
    let (router, _, _) = router_fixture();
    let id = submit_sick_call(&router).await;

    let response = send(
        &router,
        "POST",
        &format!("/api/v1/sick-calls/{id}/responses"),
        Some(&coworker("s-bo")),
        Some(json!({ "text": "call me" })),
    )
    .await;
    assert_status(response, StatusCode::UNPROCESSABLE_ENTITY).await;
}

#[tokio::test]
async fn other_organizations_cannot_see_the_sick_call() {
    let (router, _, _) = router_fixture();
    let id = submit_sick_call(&router).await;
    let outsider = Actor {
        id: StaffId::new("s-zed"),
        organization_id: other_org(),
        role: UserRole::Manager,
    };

    let response = send(
        &router,
        "GET",
        &format!("/api/v1/sick-calls/{id}/audit"),
        Some(&outsider),
        None,
    )
    .await;
    assert_status(response, StatusCode::NOT_FOUND).await;

    let response = send(&router, "GET", "/api/v1/sick-calls", Some(&outsider), None).await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn manager_assign_and_audit_routes() {
    let (router, _, _) = router_fixture();
    let id = submit_sick_call(&router).await;

    let response = send(
        &router,
        "POST",
        &format!("/api/v1/sick-calls/{id}/assign"),
        Some(&manager()),
        Some(json!({ "staff_id": "s-bo", "reason": "volunteered at handover" })),
    )
    .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["covered_by"], "s-bo");

    let response = send(
        &router,
        "GET",
        &format!("/api/v1/sick-calls/{id}/audit"),
        Some(&manager()),
        None,
    )
    .await;
    let body = assert_status(response, StatusCode::OK).await;
    let actions: Vec<&str> = body
        .as_array()
        .expect("audit list")
        .iter()
        .filter_map(|entry| entry["action"].as_str())
        .collect();
    assert_eq!(actions, vec!["sick_call_submitted", "manual_assignment"]);
}

#[tokio::test]
async fn cancel_route_restores_the_shift() {
    let (router, _, store) = router_fixture();
    let id = submit_sick_call(&router).await;

    let response = send(
        &router,
        "POST",
        &format!("/api/v1/sick-calls/{id}/cancel"),
        Some(&reporter()),
        None,
    )
    .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["status"], "cancelled");
    assert_eq!(
        store
            .shift(&ShiftId::new("sh-1"))
            .expect("store readable")
            .map(|shift| shift.status),
        Some(ShiftStatus::Scheduled)
    );
}

#[tokio::test]
async fn sms_webhook_routes_replies_by_phone() {
    let (router, service, _) = router_fixture();
    let id = submit_sick_call(&router).await;
    service
        .notify_next(&SickCallId::new(id.clone()), &org())
        .expect("offer sent");

    let response = send_sms(
        &router,
        Some(WEBHOOK_SECRET),
        json!({ "from": "+15155550101", "body": "Yes" }),
    )
    .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["sick_call"]["id"], id.as_str());
    assert_eq!(body["sick_call"]["covered_by"], "s-ada");

    let response = send_sms(
        &router,
        Some(WEBHOOK_SECRET),
        json!({ "from": "+15550000000", "body": "Yes" }),
    )
    .await;
    assert_status(response, StatusCode::NOT_FOUND).await;
}

#[tokio::test]
async fn sms_webhook_without_the_vendor_secret_changes_nothing() {
    let (router, service, store) = router_fixture();
    let id = submit_sick_call(&router).await;
    let sick_call_id = SickCallId::new(id.clone());
    service
        .notify_next(&sick_call_id, &org())
        .expect("offer sent");

    let reply = json!({ "from": "+1 515 555 0101", "body": "YES" });
    let response = send_sms(&router, None, reply.clone()).await;
    assert_status(response, StatusCode::UNAUTHORIZED).await;

    let response = send_sms(&router, Some("guessed-secret"), reply.clone()).await;
    assert_status(response, StatusCode::UNAUTHORIZED).await;

    // a staff member's bearer token is not a substitute for the vendor secret
    let response = router
        .clone()
        .oneshot(
            Request::post("/api/v1/webhooks/sms")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, bearer(&reporter()))
                .body(Body::from(reply.to_string()))
                .expect("request builds"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let sick_call = store
        .sick_call(&sick_call_id)
        .expect("store readable")
        .expect("sick call stored");
    assert_eq!(sick_call.status, SickCallStatus::Notifying);
    assert_eq!(sick_call.covered_by, None);
    assert!(store
        .responses_for_sick_call(&sick_call_id)
        .expect("responses readable")
        .is_empty());
}

#[tokio::test]
async fn failed_jobs_route_lists_nothing_when_healthy() {
    let (router, _, _) = router_fixture();

    let response = send(
        &router,
        "GET",
        "/api/v1/coverage/failed-jobs",
        Some(&manager()),
        None,
    )
    .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body, json!([]));

    let response = send(
        &router,
        "GET",
        "/api/v1/coverage/failed-jobs",
        Some(&reporter()),
        None,
    )
    .await;
    assert_status(response, StatusCode::FORBIDDEN).await;
}

#[tokio::test]
async fn event_stream_requires_a_token() {
    let (router, _, _) = router_fixture();

    let response = send(&router, "GET", "/api/v1/events", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&router, "GET", "/api/v1/events", Some(&manager()), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok()),
        Some("text/event-stream")
    );
}

#[tokio::test]
async fn submit_handler_can_be_called_directly() {
    let (_, service, _) = router_fixture();
    let state = RouterState {
        service,
        hub: Arc::new(BroadcastHub::new(4)),
    };

    let response = router::submit_handler::<InMemoryCoverageStore, RecordingTransport, BroadcastHub>(
        State(state.clone()),
        AuthenticatedUser(reporter()),
        axum::Json(sick_call_request()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response =
        router::sms_webhook_handler::<InMemoryCoverageStore, RecordingTransport, BroadcastHub>(
            State(state),
            VerifiedWebhook,
            axum::Json(InboundSms {
                from: "5155550102".to_string(),
                body: "YES".to_string(),
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn coverage_errors_map_to_http_statuses() {
    let cases = [
        (
            CoverageError::SickCallNotFound(SickCallId::new("sc-x")),
            StatusCode::NOT_FOUND,
        ),
        (
            CoverageError::ReporterCannotCover(StaffId::new("s-riley")),
            StatusCode::UNPROCESSABLE_ENTITY,
        ),
        (
            CoverageError::AlreadyCovered(SickCallId::new("sc-x")),
            StatusCode::CONFLICT,
        ),
        (
            CoverageError::Transition(TransitionError::SickCall {
                from: SickCallStatus::Covered,
                to: SickCallStatus::Cancelled,
            }),
            StatusCode::CONFLICT,
        ),
        (
            CoverageError::Forbidden("staff".to_string()),
            StatusCode::FORBIDDEN,
        ),
        (
            CoverageError::Repository(RepositoryError::StaleStatus {
                expected: SickCallStatus::Pending,
                found: SickCallStatus::Notifying,
            }),
            StatusCode::CONFLICT,
        ),
        (
            CoverageError::Repository(RepositoryError::Unavailable("down".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];

    for (err, expected) in cases {
        assert_eq!(router::status_for(&err), expected, "{err}");
    }
}
