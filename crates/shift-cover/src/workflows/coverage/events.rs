use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use super::domain::{
    NotificationId, NotificationStatus, OrganizationId, ResponseType, ShiftId, SickCall,
    SickCallId, StaffId,
};
use super::ranking::Candidate;

/// Workflow state changes pushed to dashboard sessions of one organization.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoverageEvent {
    SickCallSubmitted {
        sick_call: SickCall,
    },
    CandidatesFound {
        sick_call_id: SickCallId,
        shift_id: ShiftId,
        offered_to: Option<StaffId>,
        candidates: Vec<Candidate>,
    },
    ResponseReceived {
        sick_call_id: SickCallId,
        staff_id: StaffId,
        response_type: ResponseType,
    },
    ShiftCovered {
        sick_call: SickCall,
        manual: bool,
    },
    ShiftUnfilled {
        sick_call_id: SickCallId,
        shift_id: ShiftId,
    },
    NotificationSent {
        notification_id: NotificationId,
        sick_call_id: SickCallId,
        recipient_id: StaffId,
        status: NotificationStatus,
    },
    SickCallCancelled {
        sick_call_id: SickCallId,
        shift_id: ShiftId,
    },
    NotifyJobFailed {
        sick_call_id: SickCallId,
        attempts: u32,
        error: String,
    },
}

impl CoverageEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            CoverageEvent::SickCallSubmitted { .. } => "sick_call_submitted",
            CoverageEvent::CandidatesFound { .. } => "candidates_found",
            CoverageEvent::ResponseReceived { .. } => "response_received",
            CoverageEvent::ShiftCovered { .. } => "shift_covered",
            CoverageEvent::ShiftUnfilled { .. } => "shift_unfilled",
            CoverageEvent::NotificationSent { .. } => "notification_sent",
            CoverageEvent::SickCallCancelled { .. } => "sick_call_cancelled",
            CoverageEvent::NotifyJobFailed { .. } => "notify_job_failed",
        }
    }
}

/// Event as delivered to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct PublishedEvent {
    pub organization_id: OrganizationId,
    pub published_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: CoverageEvent,
}

/// Outbound hook for real-time updates. Delivery is best effort.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, organization_id: &OrganizationId, event: CoverageEvent);
}

/// Per-organization tokio broadcast channels.
///
/// Publishing with no subscribers is a no-op; subscribers that fall more than `capacity`
/// events behind lose the oldest ones and must refetch.
#[derive(Debug)]
pub struct BroadcastHub {
    capacity: usize,
    channels: Mutex<HashMap<OrganizationId, broadcast::Sender<PublishedEvent>>>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, organization_id: &OrganizationId) -> broadcast::Receiver<PublishedEvent> {
        let mut channels = match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        channels
            .entry(organization_id.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn subscriber_count(&self, organization_id: &OrganizationId) -> usize {
        match self.channels.lock() {
            Ok(channels) => channels
                .get(organization_id)
                .map(|sender| sender.receiver_count())
                .unwrap_or(0),
            Err(_) => 0,
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventPublisher for BroadcastHub {
    fn publish(&self, organization_id: &OrganizationId, event: CoverageEvent) {
        let channels = match self.channels.lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!(event = event.name(), "event hub lock poisoned; dropping event");
                return;
            }
        };
        let Some(sender) = channels.get(organization_id) else {
            trace!(event = event.name(), %organization_id, "no dashboard subscribers");
            return;
        };

        let name = event.name();
        let published = PublishedEvent {
            organization_id: organization_id.clone(),
            published_at: Utc::now(),
            event,
        };
        if sender.send(published).is_err() {
            trace!(event = name, %organization_id, "all dashboard subscribers disconnected");
        }
    }
}
