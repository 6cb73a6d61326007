//! Sick-call coverage: intake, candidate ranking, outreach, replies, and assignment.
//!
//! [`CoverageService`] owns the workflow; storage, outbound messaging, and real-time updates
//! are injected through [`CoverageRepository`], [`NotificationTransport`], and
//! [`EventPublisher`]. Candidate outreach after a submission runs on the [`NotifyWorker`].

pub mod config;
pub mod domain;
pub mod events;
pub mod jobs;
pub mod notifications;
pub mod ranking;
pub mod replies;
pub mod repository;
pub mod router;
pub mod service;
pub(crate) mod state;
pub mod store;

#[cfg(test)]
mod tests;

pub use config::CoverageConfig;
pub use domain::{
    Actor, AuditAction, AuditEntry, Location, LocationId, Notification, NotificationChannel,
    NotificationKind, NotificationStatus, Organization, OrganizationId, ResponseType, Shift,
    ShiftId, ShiftResponse, ShiftStatus, SickCall, SickCallDetail, SickCallId, SickCallStatus,
    StaffId, StaffMember, UserRole,
};
pub use events::{BroadcastHub, CoverageEvent, EventPublisher, PublishedEvent};
pub use jobs::{FailedNotifyJob, NotifyJob, NotifyQueue, NotifyWorker, RetryPolicy};
pub use notifications::{
    ContactAddress, DispatchError, NotificationDispatcher, NotificationTransport,
    TransportError, TransportReceipt,
};
pub use ranking::{Candidate, RankingConfig, RankingEngine, RankingError, RankingFactor};
pub use replies::{parse_reply, ReplyParseError};
pub use repository::{CoverageAssignment, CoverageRepository, RepositoryError};
pub use router::coverage_router;
pub use service::{CoverageError, CoverageService, NotifyOutcome, ReplyOutcome, SickCallRequest};
pub use state::TransitionError;
pub use store::InMemoryCoverageStore;
