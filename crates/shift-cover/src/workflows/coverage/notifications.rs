use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::domain::{
    Location, Notification, NotificationChannel, NotificationId, NotificationKind,
    NotificationStatus, Shift, SickCallId, StaffId, StaffMember,
};
use super::events::{CoverageEvent, EventPublisher};
use super::repository::{CoverageRepository, RepositoryError};

/// Address a message is routed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactAddress {
    pub channel: NotificationChannel,
    pub address: String,
}

impl ContactAddress {
    /// Phone first, e-mail as fallback; blank values are ignored.
    pub fn for_staff(member: &StaffMember) -> Option<Self> {
        let non_blank = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        non_blank(&member.phone)
            .map(|address| ContactAddress {
                channel: NotificationChannel::Sms,
                address,
            })
            .or_else(|| {
                non_blank(&member.email).map(|address| ContactAddress {
                    channel: NotificationChannel::Email,
                    address,
                })
            })
    }
}

/// Acknowledgement returned by the outbound vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportReceipt {
    pub external_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport rejected message: {0}")]
    Rejected(String),
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// SMS/e-mail vendor boundary.
pub trait NotificationTransport: Send + Sync {
    fn send(&self, to: &ContactAddress, body: &str) -> Result<TransportReceipt, TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("recipient {0} not found")]
    UnknownRecipient(StaffId),
    #[error("recipient {0} has no phone number or e-mail address")]
    MissingContact(StaffId),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

static NOTIFICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_notification_id() -> NotificationId {
    let id = NOTIFICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    NotificationId(format!("ntf-{id:06}"))
}

/// Persists and sends one outbound message per call.
pub struct NotificationDispatcher<R, T, P> {
    repository: Arc<R>,
    transport: Arc<T>,
    publisher: Arc<P>,
}

impl<R, T, P> NotificationDispatcher<R, T, P>
where
    R: CoverageRepository,
    T: NotificationTransport,
    P: EventPublisher,
{
    pub fn new(repository: Arc<R>, transport: Arc<T>, publisher: Arc<P>) -> Self {
        Self {
            repository,
            transport,
            publisher,
        }
    }

    /// Record a pending notification, hand it to the transport, then store the outcome.
    ///
    /// Transport failures leave a `failed` row behind and are returned to the caller, who is
    /// expected to log and carry on.
    pub fn send(
        &self,
        recipient_id: &StaffId,
        sick_call_id: &SickCallId,
        kind: NotificationKind,
        message: &str,
    ) -> Result<NotificationId, DispatchError> {
        let recipient = self
            .repository
            .staff_member(recipient_id)?
            .ok_or_else(|| DispatchError::UnknownRecipient(recipient_id.clone()))?;
        let contact = ContactAddress::for_staff(&recipient).ok_or_else(|| {
            warn!(%recipient_id, %sick_call_id, "recipient has no contact address");
            DispatchError::MissingContact(recipient_id.clone())
        })?;

        let mut notification = self.repository.insert_notification(Notification {
            id: next_notification_id(),
            organization_id: recipient.organization_id.clone(),
            sick_call_id: sick_call_id.clone(),
            recipient_id: recipient_id.clone(),
            kind,
            channel: contact.channel,
            address: contact.address.clone(),
            message: message.to_string(),
            status: NotificationStatus::Pending,
            external_id: None,
            error: None,
            created_at: Utc::now(),
            sent_at: None,
        })?;

        let outcome = self.transport.send(&contact, message);
        match &outcome {
            Ok(receipt) => {
                notification.status = NotificationStatus::Sent;
                notification.sent_at = Some(Utc::now());
                notification.external_id = Some(receipt.external_id.clone());
                info!(notification_id = %notification.id, %recipient_id, kind = ?kind, "notification sent");
            }
            Err(err) => {
                notification.status = NotificationStatus::Failed;
                notification.error = Some(err.to_string());
                warn!(notification_id = %notification.id, %recipient_id, error = %err, "notification failed");
            }
        }
        self.repository.update_notification(notification.clone())?;

        self.publisher.publish(
            &notification.organization_id,
            CoverageEvent::NotificationSent {
                notification_id: notification.id.clone(),
                sick_call_id: sick_call_id.clone(),
                recipient_id: recipient_id.clone(),
                status: notification.status,
            },
        );

        outcome?;
        Ok(notification.id)
    }
}

/// Offer text sent to the top-ranked candidate.
pub fn offer_message(shift: &Shift, location: Option<&Location>) -> String {
    format!(
        "Open shift at {} on {} from {} to {}. Reply YES to accept or NO to decline.",
        location_label(shift, location),
        shift.date.format("%a %b %-d"),
        shift.start_time.format("%H:%M"),
        shift.end_time.format("%H:%M"),
    )
}

/// Confirmation text sent to whoever ends up covering the shift.
pub fn confirmation_message(shift: &Shift, location: Option<&Location>) -> String {
    format!(
        "You're confirmed for {} on {} from {} to {}. Thank you for covering!",
        location_label(shift, location),
        shift.date.format("%a %b %-d"),
        shift.start_time.format("%H:%M"),
        shift.end_time.format("%H:%M"),
    )
}

fn location_label(shift: &Shift, location: Option<&Location>) -> String {
    location
        .map(|location| location.name.clone())
        .unwrap_or_else(|| shift.location_id.to_string())
}
