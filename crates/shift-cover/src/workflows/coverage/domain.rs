use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

record_id!(
    /// Tenant boundary; every record below belongs to exactly one organization.
    OrganizationId
);
record_id!(LocationId);
record_id!(
    /// Identifier for any user account (staff, manager, or admin).
    StaffId
);
record_id!(ShiftId);
record_id!(SickCallId);
record_id!(NotificationId);
record_id!(ResponseId);
record_id!(AuditEntryId);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub organization_id: OrganizationId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Staff,
    Manager,
    Admin,
}

impl UserRole {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Staff => "staff",
            Self::Manager => "manager",
            Self::Admin => "admin",
        }
    }

    /// Managers and admins may override assignment and inspect candidates.
    pub const fn can_manage(self) -> bool {
        matches!(self, Self::Manager | Self::Admin)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "staff" => Some(Self::Staff),
            "manager" => Some(Self::Manager),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Authenticated caller a workflow operation runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: StaffId,
    pub organization_id: OrganizationId,
    pub role: UserRole,
}

/// A user account as seen by the coverage workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: StaffId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub seniority_level: Option<u32>,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftStatus {
    Scheduled,
    SickCall,
    Covered,
    Unfilled,
    Cancelled,
}

impl ShiftStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::SickCall => "sick_call",
            Self::Covered => "covered",
            Self::Unfilled => "unfilled",
            Self::Cancelled => "cancelled",
        }
    }

    /// Statuses where the assignee is expected on the floor.
    pub const fn is_working(self) -> bool {
        matches!(self, Self::Scheduled | Self::Covered)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Some(Self::Scheduled),
            "sick_call" => Some(Self::SickCall),
            "covered" => Some(Self::Covered),
            "unfilled" => Some(Self::Unfilled),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    pub id: ShiftId,
    pub organization_id: OrganizationId,
    pub location_id: LocationId,
    pub assigned_to: Option<StaffId>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: ShiftStatus,
}

impl Shift {
    /// Length of the shift; an end at or before the start rolls into the next day.
    pub fn duration(&self) -> Duration {
        let span = self.end_time.signed_duration_since(self.start_time);
        if span <= Duration::zero() {
            span + Duration::days(1)
        } else {
            span
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        self.duration().num_minutes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SickCallStatus {
    Pending,
    Notifying,
    Covered,
    Unfilled,
    Cancelled,
}

impl SickCallStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Notifying => "notifying",
            Self::Covered => "covered",
            Self::Unfilled => "unfilled",
            Self::Cancelled => "cancelled",
        }
    }

    /// Everything except `cancelled` blocks a second sick call on the same shift.
    pub const fn blocks_new_sick_call(self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    /// Statuses that still need manager attention on the dashboard.
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Notifying | Self::Unfilled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SickCall {
    pub id: SickCallId,
    pub organization_id: OrganizationId,
    pub shift_id: ShiftId,
    pub reported_by: StaffId,
    pub reason: Option<String>,
    pub status: SickCallStatus,
    pub covered_by: Option<StaffId>,
    pub covered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
    Responded,
}

impl NotificationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Responded => "responded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Offer,
    Confirmation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Sms,
    Email,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub organization_id: OrganizationId,
    pub sick_call_id: SickCallId,
    pub recipient_id: StaffId,
    pub kind: NotificationKind,
    pub channel: NotificationChannel,
    pub address: String,
    pub message: String,
    pub status: NotificationStatus,
    pub external_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseType {
    Accept,
    Decline,
    NoResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftResponse {
    pub id: ResponseId,
    pub sick_call_id: SickCallId,
    pub staff_id: StaffId,
    pub response_type: ResponseType,
    pub raw_text: String,
    pub responded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    SickCallSubmitted,
    ShiftAccepted,
    ManualAssignment,
    SickCallUnfilled,
    SickCallCancelled,
    AutoNotifyFailed,
}

impl AuditAction {
    pub const fn label(self) -> &'static str {
        match self {
            Self::SickCallSubmitted => "sick_call_submitted",
            Self::ShiftAccepted => "shift_accepted",
            Self::ManualAssignment => "manual_assignment",
            Self::SickCallUnfilled => "sick_call_unfilled",
            Self::SickCallCancelled => "sick_call_cancelled",
            Self::AutoNotifyFailed => "auto_notify_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub organization_id: OrganizationId,
    pub actor_id: Option<StaffId>,
    pub sick_call_id: SickCallId,
    pub action: AuditAction,
    pub details: BTreeMap<String, String>,
    pub recorded_at: DateTime<Utc>,
}

/// Dashboard projection of an open sick call with its related records inlined.
#[derive(Debug, Clone, Serialize)]
pub struct SickCallDetail {
    pub sick_call: SickCall,
    pub shift: Shift,
    pub location: Option<Location>,
    pub reported_by: Option<StaffMember>,
    pub covered_by: Option<StaffMember>,
    pub notifications: Vec<Notification>,
    pub responses: Vec<ShiftResponse>,
}
