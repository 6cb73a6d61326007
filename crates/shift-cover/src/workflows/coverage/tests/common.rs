use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use axum::http::StatusCode;
use axum::response::Response;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::Value;

use crate::auth::{TokenVerifier, WebhookVerifier};
use crate::workflows::coverage::{
    coverage_router, Actor, AuditEntry, BroadcastHub, ContactAddress, CoverageAssignment,
    CoverageConfig, CoverageEvent, CoverageRepository, CoverageService, EventPublisher,
    InMemoryCoverageStore, Location, LocationId, Notification, NotificationTransport, NotifyQueue,
    Organization, OrganizationId, RepositoryError, Shift, ShiftId, ShiftResponse, ShiftStatus,
    SickCall, SickCallId, SickCallRequest, SickCallStatus, StaffId, StaffMember,
    TransportError, TransportReceipt, UserRole,
};

pub(super) const TEST_SECRET: &str = "coverage-test-secret";
pub(super) const WEBHOOK_SECRET: &str = "coverage-webhook-secret";

pub(super) fn org() -> OrganizationId {
    OrganizationId::new("org-1")
}

pub(super) fn other_org() -> OrganizationId {
    OrganizationId::new("org-2")
}

/// Wednesday; the ranking week runs Mon 2024-01-08 through Sun 2024-01-14.
pub(super) fn shift_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 10).expect("valid date")
}

pub(super) fn as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 9, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn time(hour: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, 0, 0).expect("valid time")
}

pub(super) fn member(
    id: &str,
    organization: &OrganizationId,
    role: UserRole,
    phone: Option<&str>,
    seniority: Option<u32>,
) -> StaffMember {
    StaffMember {
        id: StaffId::new(id),
        organization_id: organization.clone(),
        name: id.trim_start_matches("s-").to_string(),
        role,
        phone: phone.map(str::to_string),
        email: None,
        seniority_level: seniority,
        active: true,
    }
}

pub(super) fn shift(id: &str, assignee: &str, date: NaiveDate, start: u32, end: u32) -> Shift {
    Shift {
        id: ShiftId::new(id),
        organization_id: org(),
        location_id: LocationId::new("loc-1"),
        assigned_to: Some(StaffId::new(assignee)),
        date,
        start_time: time(start),
        end_time: time(end),
        status: ShiftStatus::Scheduled,
    }
}

/// Store with the reporter's shift plus the coworkers it gets ranked against:
///
/// * `s-ada` (seniority 6) and `s-eve` (seniority 6, e-mail only) are free all week
/// * `s-bo` already has 36h scheduled, so the shift pushes him into overtime
/// * `s-cy` works the evening of the same date
/// * `s-dee` is inactive, `m-mo` is a manager, `s-zed` belongs to another organization
pub(super) fn seeded_store() -> InMemoryCoverageStore {
    let store = InMemoryCoverageStore::new();
    store
        .insert_organization(Organization {
            id: org(),
            name: "North Care".to_string(),
        })
        .expect("organization");
    store
        .insert_organization(Organization {
            id: other_org(),
            name: "South Care".to_string(),
        })
        .expect("organization");
    store
        .insert_location(Location {
            id: LocationId::new("loc-1"),
            organization_id: org(),
            name: "Maple House".to_string(),
        })
        .expect("location");

    let mut eve = member("s-eve", &org(), UserRole::Staff, None, Some(6));
    eve.email = Some("eve@example.org".to_string());
    let mut dee = member("s-dee", &org(), UserRole::Staff, Some("5155550104"), Some(9));
    dee.active = false;

    for staff in [
        member("s-riley", &org(), UserRole::Staff, Some("5155550100"), Some(3)),
        member("s-ada", &org(), UserRole::Staff, Some("5155550101"), Some(6)),
        member("s-bo", &org(), UserRole::Staff, Some("5155550102"), Some(2)),
        member("s-cy", &org(), UserRole::Staff, Some("5155550103"), Some(8)),
        dee,
        eve,
        member("m-mo", &org(), UserRole::Manager, Some("5155550199"), Some(10)),
        member("s-zed", &other_org(), UserRole::Staff, Some("5155550200"), Some(7)),
    ] {
        store.insert_staff(staff).expect("staff");
    }

    let date = shift_date();
    store
        .insert_shift(shift("sh-1", "s-riley", date, 7, 15))
        .expect("shift");
    store
        .insert_shift(shift("sh-cy", "s-cy", date, 15, 23))
        .expect("shift");
    for (index, offset) in [-2i64, -1, 1, 2].into_iter().enumerate() {
        store
            .insert_shift(shift(
                &format!("sh-bo-{index}"),
                "s-bo",
                date + chrono::Duration::days(offset),
                7,
                16,
            ))
            .expect("shift");
    }
    store
}

/// Store where nobody but the reporter and a manager can work.
pub(super) fn lonely_store() -> InMemoryCoverageStore {
    let store = InMemoryCoverageStore::new();
    store
        .insert_location(Location {
            id: LocationId::new("loc-1"),
            organization_id: org(),
            name: "Maple House".to_string(),
        })
        .expect("location");
    store
        .insert_staff(member("s-riley", &org(), UserRole::Staff, Some("5155550100"), Some(3)))
        .expect("staff");
    store
        .insert_staff(member("m-mo", &org(), UserRole::Manager, Some("5155550199"), None))
        .expect("staff");
    store
        .insert_shift(shift("sh-1", "s-riley", shift_date(), 7, 15))
        .expect("shift");
    store
}

pub(super) fn reporter() -> Actor {
    Actor {
        id: StaffId::new("s-riley"),
        organization_id: org(),
        role: UserRole::Staff,
    }
}

pub(super) fn coworker(id: &str) -> Actor {
    Actor {
        id: StaffId::new(id),
        organization_id: org(),
        role: UserRole::Staff,
    }
}

pub(super) fn manager() -> Actor {
    Actor {
        id: StaffId::new("m-mo"),
        organization_id: org(),
        role: UserRole::Manager,
    }
}

pub(super) fn sick_call_request() -> SickCallRequest {
    SickCallRequest {
        shift_id: ShiftId::new("sh-1"),
        location_id: LocationId::new("loc-1"),
        reason: Some("fever".to_string()),
    }
}

/// Outbound messages captured instead of delivered.
#[derive(Default)]
pub(super) struct RecordingTransport {
    sent: Mutex<Vec<(ContactAddress, String)>>,
    reject: AtomicBool,
}

impl RecordingTransport {
    pub(super) fn reject_all(&self) {
        self.reject.store(true, Ordering::SeqCst);
    }

    pub(super) fn sent(&self) -> Vec<(ContactAddress, String)> {
        self.sent.lock().expect("transport lock").clone()
    }
}

impl NotificationTransport for RecordingTransport {
    fn send(&self, to: &ContactAddress, body: &str) -> Result<TransportReceipt, TransportError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected("carrier refused".to_string()));
        }
        let mut sent = self.sent.lock().expect("transport lock");
        sent.push((to.clone(), body.to_string()));
        Ok(TransportReceipt {
            external_id: format!("msg-{}", sent.len()),
        })
    }
}

#[derive(Default)]
pub(super) struct RecordingPublisher {
    events: Mutex<Vec<(OrganizationId, CoverageEvent)>>,
}

impl RecordingPublisher {
    pub(super) fn events(&self) -> Vec<(OrganizationId, CoverageEvent)> {
        self.events.lock().expect("publisher lock").clone()
    }

    pub(super) fn names(&self) -> Vec<&'static str> {
        self.events()
            .iter()
            .map(|(_, event)| event.name())
            .collect()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, organization_id: &OrganizationId, event: CoverageEvent) {
        self.events
            .lock()
            .expect("publisher lock")
            .push((organization_id.clone(), event));
    }
}

pub(super) type TestService =
    CoverageService<InMemoryCoverageStore, RecordingTransport, RecordingPublisher>;

pub(super) struct Harness {
    pub(super) store: Arc<InMemoryCoverageStore>,
    pub(super) transport: Arc<RecordingTransport>,
    pub(super) publisher: Arc<RecordingPublisher>,
    pub(super) service: Arc<TestService>,
}

pub(super) fn harness() -> Harness {
    harness_with(seeded_store(), CoverageConfig::default())
}

pub(super) fn harness_with(store: InMemoryCoverageStore, config: CoverageConfig) -> Harness {
    let store = Arc::new(store);
    let transport = Arc::new(RecordingTransport::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let service = Arc::new(CoverageService::new(
        store.clone(),
        transport.clone(),
        publisher.clone(),
        NotifyQueue::detached(),
        config,
    ));
    Harness {
        store,
        transport,
        publisher,
        service,
    }
}

impl Harness {
    pub(super) fn submit(&self) -> SickCall {
        self.service
            .submit(&reporter(), sick_call_request())
            .expect("sick call submitted")
    }

    pub(super) fn audit(&self, sick_call: &SickCallId) -> Vec<AuditEntry> {
        self.store.audit_entries(sick_call).expect("audit readable")
    }

    pub(super) fn sick_call(&self, id: &SickCallId) -> SickCall {
        self.store
            .sick_call(id)
            .expect("store readable")
            .expect("sick call stored")
    }

    pub(super) fn shift(&self, id: &str) -> Shift {
        self.store
            .shift(&ShiftId::new(id))
            .expect("store readable")
            .expect("shift stored")
    }
}

pub(super) type HubService = CoverageService<InMemoryCoverageStore, RecordingTransport, BroadcastHub>;

/// Router wired the way the API binary wires it, with a real broadcast hub.
pub(super) fn router_fixture() -> (axum::Router, Arc<HubService>, Arc<InMemoryCoverageStore>) {
    let store = Arc::new(seeded_store());
    let hub = Arc::new(BroadcastHub::new(16));
    let service = Arc::new(CoverageService::new(
        store.clone(),
        Arc::new(RecordingTransport::default()),
        hub.clone(),
        NotifyQueue::detached(),
        CoverageConfig::default(),
    ));
    let router = coverage_router(
        service.clone(),
        hub,
        Arc::new(TokenVerifier::new(TEST_SECRET)),
        Arc::new(WebhookVerifier::new(WEBHOOK_SECRET)),
    );
    (router, service, store)
}

pub(super) fn bearer(actor: &Actor) -> String {
    let token = TokenVerifier::new(TEST_SECRET)
        .issue(actor, chrono::Duration::minutes(10))
        .expect("token issued");
    format!("Bearer {token}")
}

pub(super) async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub(super) async fn assert_status(response: Response, expected: StatusCode) -> Value {
    let status = response.status();
    let body = json_body(response).await;
    assert_eq!(status, expected, "unexpected body: {body}");
    body
}

/// Store whose `sick_call` lookups fail with `Unavailable` a set number of times.
pub(super) struct FlakyStore {
    pub(super) inner: InMemoryCoverageStore,
    failures_left: AtomicU32,
}

impl FlakyStore {
    pub(super) fn new(inner: InMemoryCoverageStore, failures: u32) -> Self {
        Self {
            inner,
            failures_left: AtomicU32::new(failures),
        }
    }

    fn maybe_fail(&self) -> Result<(), RepositoryError> {
        let outcome = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        match outcome {
            Ok(_) => Err(RepositoryError::Unavailable("database restarting".to_string())),
            Err(_) => Ok(()),
        }
    }
}

impl CoverageRepository for FlakyStore {
    fn location(&self, id: &LocationId) -> Result<Option<Location>, RepositoryError> {
        self.inner.location(id)
    }

    fn staff_member(&self, id: &StaffId) -> Result<Option<StaffMember>, RepositoryError> {
        self.inner.staff_member(id)
    }

    fn staff_by_phone(&self, phone: &str) -> Result<Option<StaffMember>, RepositoryError> {
        self.inner.staff_by_phone(phone)
    }

    fn staff_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<StaffMember>, RepositoryError> {
        self.inner.staff_for_organization(organization_id)
    }

    fn shift(&self, id: &ShiftId) -> Result<Option<Shift>, RepositoryError> {
        self.inner.shift(id)
    }

    fn shifts_for_staff(
        &self,
        staff_id: &StaffId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Shift>, RepositoryError> {
        self.inner.shifts_for_staff(staff_id, from, to)
    }

    fn open_sick_call(&self, sick_call: SickCall) -> Result<SickCall, RepositoryError> {
        self.inner.open_sick_call(sick_call)
    }

    fn sick_call(&self, id: &SickCallId) -> Result<Option<SickCall>, RepositoryError> {
        self.maybe_fail()?;
        self.inner.sick_call(id)
    }

    fn sick_calls_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<SickCall>, RepositoryError> {
        self.inner.sick_calls_for_organization(organization_id)
    }

    fn transition_sick_call(
        &self,
        id: &SickCallId,
        expected: SickCallStatus,
        next: SickCallStatus,
        at: DateTime<Utc>,
    ) -> Result<SickCall, RepositoryError> {
        self.inner.transition_sick_call(id, expected, next, at)
    }

    fn cover_sick_call(
        &self,
        id: &SickCallId,
        staff_id: &StaffId,
        at: DateTime<Utc>,
    ) -> Result<CoverageAssignment, RepositoryError> {
        self.inner.cover_sick_call(id, staff_id, at)
    }

    fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<Notification, RepositoryError> {
        self.inner.insert_notification(notification)
    }

    fn update_notification(&self, notification: Notification) -> Result<(), RepositoryError> {
        self.inner.update_notification(notification)
    }

    fn notifications_for_sick_call(
        &self,
        id: &SickCallId,
    ) -> Result<Vec<Notification>, RepositoryError> {
        self.inner.notifications_for_sick_call(id)
    }

    fn notifications_for_recipient(
        &self,
        staff_id: &StaffId,
    ) -> Result<Vec<Notification>, RepositoryError> {
        self.inner.notifications_for_recipient(staff_id)
    }

    fn insert_response(&self, response: ShiftResponse) -> Result<ShiftResponse, RepositoryError> {
        self.inner.insert_response(response)
    }

    fn responses_for_sick_call(
        &self,
        id: &SickCallId,
    ) -> Result<Vec<ShiftResponse>, RepositoryError> {
        self.inner.responses_for_sick_call(id)
    }

    fn accepted_pickups_since(
        &self,
        staff_id: &StaffId,
        since: DateTime<Utc>,
    ) -> Result<u32, RepositoryError> {
        self.inner.accepted_pickups_since(staff_id, since)
    }

    fn append_audit(&self, entry: AuditEntry) -> Result<(), RepositoryError> {
        self.inner.append_audit(entry)
    }

    fn audit_entries(&self, id: &SickCallId) -> Result<Vec<AuditEntry>, RepositoryError> {
        self.inner.audit_entries(id)
    }
}

/// Poll `check` until it holds or a couple of seconds pass.
pub(super) async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    check()
}
