use chrono::{DateTime, NaiveDate, Utc};

use super::domain::{
    AuditEntry, Location, LocationId, Notification, OrganizationId, Shift, ShiftId, ShiftResponse,
    ShiftStatus, SickCall, SickCallId, SickCallStatus, StaffId, StaffMember,
};

/// Result of an atomic "cover only if still open" update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageAssignment {
    pub sick_call: SickCall,
    pub shift: Shift,
    pub previous_assignee: Option<StaffId>,
}

/// Storage abstraction for the coverage workflow.
///
/// Methods that change a sick call also write its shift in the same critical section, so the
/// two statuses never drift apart. Conditional writes fail instead of overwriting state that
/// changed since the caller read it.
pub trait CoverageRepository: Send + Sync {
    fn location(&self, id: &LocationId) -> Result<Option<Location>, RepositoryError>;
    fn staff_member(&self, id: &StaffId) -> Result<Option<StaffMember>, RepositoryError>;
    fn staff_by_phone(&self, phone: &str) -> Result<Option<StaffMember>, RepositoryError>;

    /// All members of an organization, most senior first, ties broken by id.
    fn staff_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<StaffMember>, RepositoryError>;

    fn shift(&self, id: &ShiftId) -> Result<Option<Shift>, RepositoryError>;

    /// Shifts assigned to `staff_id` dated within `from..=to`, any status.
    fn shifts_for_staff(
        &self,
        staff_id: &StaffId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Shift>, RepositoryError>;

    /// Insert a sick call and flip its shift to `sick_call`.
    ///
    /// Fails with `Conflict` when the shift already has a non-cancelled sick call and with
    /// `ShiftUnavailable` when the shift is no longer scheduled.
    fn open_sick_call(&self, sick_call: SickCall) -> Result<SickCall, RepositoryError>;

    fn sick_call(&self, id: &SickCallId) -> Result<Option<SickCall>, RepositoryError>;

    fn sick_calls_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<SickCall>, RepositoryError>;

    /// Move a sick call from `expected` to `next`, writing the matching shift status.
    fn transition_sick_call(
        &self,
        id: &SickCallId,
        expected: SickCallStatus,
        next: SickCallStatus,
        at: DateTime<Utc>,
    ) -> Result<SickCall, RepositoryError>;

    /// Mark the sick call covered by `staff_id` and reassign its shift, unless it is already
    /// covered or cancelled.
    fn cover_sick_call(
        &self,
        id: &SickCallId,
        staff_id: &StaffId,
        at: DateTime<Utc>,
    ) -> Result<CoverageAssignment, RepositoryError>;

    fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<Notification, RepositoryError>;
    fn update_notification(&self, notification: Notification) -> Result<(), RepositoryError>;
    fn notifications_for_sick_call(
        &self,
        id: &SickCallId,
    ) -> Result<Vec<Notification>, RepositoryError>;
    fn notifications_for_recipient(
        &self,
        staff_id: &StaffId,
    ) -> Result<Vec<Notification>, RepositoryError>;

    fn insert_response(&self, response: ShiftResponse) -> Result<ShiftResponse, RepositoryError>;
    fn responses_for_sick_call(&self, id: &SickCallId)
        -> Result<Vec<ShiftResponse>, RepositoryError>;

    /// Count of accepted offers by `staff_id` recorded at or after `since`.
    fn accepted_pickups_since(
        &self,
        staff_id: &StaffId,
        since: DateTime<Utc>,
    ) -> Result<u32, RepositoryError>;

    fn append_audit(&self, entry: AuditEntry) -> Result<(), RepositoryError>;
    fn audit_entries(&self, id: &SickCallId) -> Result<Vec<AuditEntry>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("sick call is already covered")]
    AlreadyCovered,
    #[error("sick call status changed concurrently (expected {}, found {})", .expected.label(), .found.label())]
    StaleStatus {
        expected: SickCallStatus,
        found: SickCallStatus,
    },
    #[error("sick call is {} and can no longer be covered", .status.label())]
    Closed { status: SickCallStatus },
    #[error("shift is {} and cannot take a sick call", .status.label())]
    ShiftUnavailable { status: ShiftStatus },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Unavailable(_))
    }
}
