use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::config::CoverageConfig;
use super::domain::{
    Actor, AuditAction, AuditEntry, AuditEntryId, LocationId, NotificationId, NotificationKind,
    NotificationStatus, OrganizationId, ResponseId, ResponseType, ShiftId, ShiftResponse,
    ShiftStatus, SickCall, SickCallDetail, SickCallId, SickCallStatus, StaffId, StaffMember,
};
use super::events::{CoverageEvent, EventPublisher};
use super::jobs::{FailedNotifyJob, NotifyJob, NotifyQueue};
use super::notifications::{
    confirmation_message, offer_message, ContactAddress, NotificationDispatcher,
    NotificationTransport,
};
use super::ranking::{Candidate, RankingEngine, RankingError};
use super::replies::{parse_reply, ReplyParseError};
use super::repository::{CoverageAssignment, CoverageRepository, RepositoryError};
use super::state::TransitionError;

/// Payload for reporting sick on an assigned shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SickCallRequest {
    pub shift_id: ShiftId,
    pub location_id: LocationId,
    #[serde(default)]
    pub reason: Option<String>,
}

/// What a notify pass ended up doing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotifyOutcome {
    /// An offer went to `offered_to`. `notification_id` is absent when delivery failed.
    Offered {
        sick_call: SickCall,
        offered_to: StaffId,
        notification_id: Option<NotificationId>,
        candidates: Vec<Candidate>,
    },
    /// Every candidate in the reported set already holds an offer.
    Exhausted {
        sick_call: SickCall,
        candidates: Vec<Candidate>,
    },
    Unfilled {
        sick_call: SickCall,
    },
}

impl NotifyOutcome {
    pub const fn label(&self) -> &'static str {
        match self {
            NotifyOutcome::Offered { .. } => "offered",
            NotifyOutcome::Exhausted { .. } => "exhausted",
            NotifyOutcome::Unfilled { .. } => "unfilled",
        }
    }

    pub fn sick_call(&self) -> &SickCall {
        match self {
            NotifyOutcome::Offered { sick_call, .. }
            | NotifyOutcome::Exhausted { sick_call, .. }
            | NotifyOutcome::Unfilled { sick_call } => sick_call,
        }
    }
}

/// A recorded reply and the sick call as it stands afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyOutcome {
    pub response: ShiftResponse,
    pub sick_call: SickCall,
}

static SICK_CALL_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static RESPONSE_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static AUDIT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_sick_call_id() -> SickCallId {
    let id = SICK_CALL_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SickCallId(format!("sc-{id:06}"))
}

fn next_response_id() -> ResponseId {
    let id = RESPONSE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ResponseId(format!("rsp-{id:06}"))
}

/// Only active staff other than the reporter may take the shift.
fn ensure_can_cover(sick_call: &SickCall, member: &StaffMember) -> Result<(), CoverageError> {
    if !member.active {
        return Err(CoverageError::StaffNotFound(member.id.clone()));
    }
    if member.id == sick_call.reported_by {
        return Err(CoverageError::ReporterCannotCover(member.id.clone()));
    }
    Ok(())
}

fn next_audit_id() -> AuditEntryId {
    let id = AUDIT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    AuditEntryId(format!("aud-{id:06}"))
}

/// Sick-call intake, candidate outreach, replies, and assignment.
pub struct CoverageService<R, T, P> {
    repository: Arc<R>,
    publisher: Arc<P>,
    ranking: RankingEngine<R>,
    dispatcher: NotificationDispatcher<R, T, P>,
    jobs: NotifyQueue,
    config: CoverageConfig,
}

impl<R, T, P> CoverageService<R, T, P>
where
    R: CoverageRepository + 'static,
    T: NotificationTransport + 'static,
    P: EventPublisher + 'static,
{
    pub fn new(
        repository: Arc<R>,
        transport: Arc<T>,
        publisher: Arc<P>,
        jobs: NotifyQueue,
        config: CoverageConfig,
    ) -> Self {
        let ranking = RankingEngine::new(repository.clone(), config.ranking.clone());
        let dispatcher =
            NotificationDispatcher::new(repository.clone(), transport, publisher.clone());
        Self {
            repository,
            publisher,
            ranking,
            dispatcher,
            jobs,
            config,
        }
    }

    pub fn config(&self) -> &CoverageConfig {
        &self.config
    }

    /// Report the caller sick for one of their shifts and queue candidate outreach.
    pub fn submit(
        &self,
        actor: &Actor,
        request: SickCallRequest,
    ) -> Result<SickCall, CoverageError> {
        let shift = self
            .repository
            .shift(&request.shift_id)?
            .filter(|shift| shift.organization_id == actor.organization_id)
            .ok_or_else(|| CoverageError::ShiftNotFound(request.shift_id.clone()))?;

        if shift.location_id != request.location_id {
            return Err(CoverageError::LocationMismatch {
                shift_id: shift.id,
                location_id: request.location_id,
            });
        }
        if shift.assigned_to.as_ref() != Some(&actor.id) {
            return Err(CoverageError::NotAssigned {
                shift_id: shift.id,
                staff_id: actor.id.clone(),
            });
        }
        let existing = self
            .repository
            .sick_calls_for_organization(&actor.organization_id)?;
        if existing
            .iter()
            .any(|call| call.shift_id == shift.id && call.status.blocks_new_sick_call())
        {
            return Err(CoverageError::DuplicateSickCall(shift.id));
        }
        shift.status.transition(ShiftStatus::SickCall)?;

        let now = Utc::now();
        let sick_call = SickCall {
            id: next_sick_call_id(),
            organization_id: actor.organization_id.clone(),
            shift_id: shift.id.clone(),
            reported_by: actor.id.clone(),
            reason: request
                .reason
                .map(|reason| reason.trim().to_string())
                .filter(|reason| !reason.is_empty()),
            status: SickCallStatus::Pending,
            covered_by: None,
            covered_at: None,
            created_at: now,
            updated_at: now,
        };
        let sick_call = self
            .repository
            .open_sick_call(sick_call)
            .map_err(|err| match err {
                RepositoryError::Conflict => CoverageError::DuplicateSickCall(shift.id.clone()),
                other => other.into(),
            })?;

        let mut details = BTreeMap::new();
        details.insert("shift_id".to_string(), shift.id.to_string());
        if let Some(reason) = &sick_call.reason {
            details.insert("reason".to_string(), reason.clone());
        }
        self.record_audit(&sick_call, Some(&actor.id), AuditAction::SickCallSubmitted, details);
        self.publisher.publish(
            &sick_call.organization_id,
            CoverageEvent::SickCallSubmitted {
                sick_call: sick_call.clone(),
            },
        );
        info!(sick_call_id = %sick_call.id, shift_id = %shift.id, staff_id = %actor.id, "sick call submitted");

        if !self.jobs.enqueue(NotifyJob::new(
            sick_call.id.clone(),
            sick_call.organization_id.clone(),
        )) {
            warn!(sick_call_id = %sick_call.id, "no notify worker attached; sick call stays pending");
        }

        Ok(sick_call)
    }

    /// Rank candidates and offer the shift to the best one not yet contacted.
    pub fn notify_next(
        &self,
        sick_call_id: &SickCallId,
        organization_id: &OrganizationId,
    ) -> Result<NotifyOutcome, CoverageError> {
        let current = self.scoped_sick_call(sick_call_id, organization_id)?;
        let next = current.status.transition(SickCallStatus::Notifying)?;
        let sick_call = self.repository.transition_sick_call(
            sick_call_id,
            current.status,
            next,
            Utc::now(),
        )?;

        let candidates: Vec<Candidate> = self
            .ranking
            .rank(&sick_call.shift_id, organization_id)?
            .into_iter()
            .filter(|candidate| candidate.is_available)
            .take(self.config.max_candidates)
            .collect();

        if candidates.is_empty() {
            let sick_call = self.repository.transition_sick_call(
                sick_call_id,
                SickCallStatus::Notifying,
                SickCallStatus::Unfilled,
                Utc::now(),
            )?;
            self.record_audit(&sick_call, None, AuditAction::SickCallUnfilled, BTreeMap::new());
            self.publisher.publish(
                organization_id,
                CoverageEvent::ShiftUnfilled {
                    sick_call_id: sick_call.id.clone(),
                    shift_id: sick_call.shift_id.clone(),
                },
            );
            warn!(sick_call_id = %sick_call.id, shift_id = %sick_call.shift_id, "no available candidates; shift unfilled");
            return Ok(NotifyOutcome::Unfilled { sick_call });
        }

        let already_offered: BTreeSet<StaffId> = self
            .repository
            .notifications_for_sick_call(sick_call_id)?
            .into_iter()
            .filter(|notification| notification.kind == NotificationKind::Offer)
            .map(|notification| notification.recipient_id)
            .collect();
        // staff with no phone or e-mail stay in the ranked set for managers but cannot be offered
        let target = candidates
            .iter()
            .filter(|candidate| !already_offered.contains(&candidate.staff.id))
            .find(|candidate| {
                let reachable = ContactAddress::for_staff(&candidate.staff).is_some();
                if !reachable {
                    debug!(sick_call_id = %sick_call.id, staff_id = %candidate.staff.id, "skipping candidate with no contact address");
                }
                reachable
            })
            .map(|candidate| candidate.staff.id.clone());

        let notification_id = match &target {
            Some(staff_id) => self.send_offer(&sick_call, staff_id)?,
            None => None,
        };

        self.publisher.publish(
            organization_id,
            CoverageEvent::CandidatesFound {
                sick_call_id: sick_call.id.clone(),
                shift_id: sick_call.shift_id.clone(),
                offered_to: target.clone(),
                candidates: candidates.clone(),
            },
        );

        match target {
            Some(offered_to) => {
                info!(sick_call_id = %sick_call.id, %offered_to, candidates = candidates.len(), "coverage offer sent");
                Ok(NotifyOutcome::Offered {
                    sick_call,
                    offered_to,
                    notification_id,
                    candidates,
                })
            }
            None => {
                info!(sick_call_id = %sick_call.id, "every top candidate already holds an offer");
                Ok(NotifyOutcome::Exhausted {
                    sick_call,
                    candidates,
                })
            }
        }
    }

    /// Record a YES/NO reply from a staff member; YES covers the shift.
    pub fn respond(
        &self,
        sick_call_id: &SickCallId,
        staff_id: &StaffId,
        text: &str,
    ) -> Result<ReplyOutcome, CoverageError> {
        let sick_call = self
            .repository
            .sick_call(sick_call_id)?
            .ok_or_else(|| CoverageError::SickCallNotFound(sick_call_id.clone()))?;
        let member = self.member_of(&sick_call.organization_id, staff_id)?;

        match sick_call.status {
            SickCallStatus::Covered => return Err(CoverageError::AlreadyCovered(sick_call.id)),
            SickCallStatus::Cancelled => {
                return Err(CoverageError::Closed {
                    sick_call_id: sick_call.id,
                    status: sick_call.status,
                })
            }
            SickCallStatus::Pending | SickCallStatus::Notifying | SickCallStatus::Unfilled => {}
        }
        let response_type = parse_reply(text)?;

        // accepts are stored only after the cover commits
        let assignment = match response_type {
            ResponseType::Accept => {
                ensure_can_cover(&sick_call, &member)?;
                Some(self.commit_cover(&sick_call.id, &member)?)
            }
            ResponseType::Decline | ResponseType::NoResponse => None,
        };

        let response = self.repository.insert_response(ShiftResponse {
            id: next_response_id(),
            sick_call_id: sick_call.id.clone(),
            staff_id: member.id.clone(),
            response_type,
            raw_text: text.to_string(),
            responded_at: Utc::now(),
        })?;
        self.mark_offer_responded(&sick_call.id, &member.id)?;
        self.publisher.publish(
            &sick_call.organization_id,
            CoverageEvent::ResponseReceived {
                sick_call_id: sick_call.id.clone(),
                staff_id: member.id.clone(),
                response_type,
            },
        );
        info!(sick_call_id = %sick_call.id, staff_id = %member.id, response = ?response_type, "coverage reply recorded");

        let sick_call = match assignment {
            Some(assignment) => self.announce_cover(assignment, &member, None, None)?,
            None => sick_call,
        };

        Ok(ReplyOutcome {
            response,
            sick_call,
        })
    }

    /// Route an inbound SMS to the sender's most recent open offer.
    pub fn respond_by_phone(&self, phone: &str, text: &str) -> Result<ReplyOutcome, CoverageError> {
        let member = self
            .repository
            .staff_by_phone(phone)?
            .ok_or_else(|| CoverageError::UnknownPhone(phone.to_string()))?;

        let mut offers: Vec<_> = self
            .repository
            .notifications_for_recipient(&member.id)?
            .into_iter()
            .filter(|notification| {
                notification.kind == NotificationKind::Offer
                    && notification.status != NotificationStatus::Responded
                    && notification.status != NotificationStatus::Failed
            })
            .collect();
        offers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        for offer in offers {
            let open = self
                .repository
                .sick_call(&offer.sick_call_id)?
                .is_some_and(|call| call.status.is_open());
            if open {
                return self.respond(&offer.sick_call_id, &member.id, text);
            }
        }
        Err(CoverageError::NoOpenOffer(member.id))
    }

    /// Cover the shift with `staff_id`.
    ///
    /// With an actor this is a manager override; without one it is an accepted offer. Either
    /// way the write only lands if the sick call is still open.
    pub fn assign(
        &self,
        sick_call_id: &SickCallId,
        staff_id: &StaffId,
        actor: Option<&Actor>,
        reason: Option<String>,
    ) -> Result<SickCall, CoverageError> {
        let sick_call = match actor {
            Some(actor) => {
                if !actor.role.can_manage() {
                    return Err(CoverageError::Forbidden(
                        "only managers can assign coverage".to_string(),
                    ));
                }
                self.scoped_sick_call(sick_call_id, &actor.organization_id)?
            }
            None => self
                .repository
                .sick_call(sick_call_id)?
                .ok_or_else(|| CoverageError::SickCallNotFound(sick_call_id.clone()))?,
        };
        if sick_call.status == SickCallStatus::Covered {
            return Err(CoverageError::AlreadyCovered(sick_call.id));
        }
        sick_call.status.transition(SickCallStatus::Covered)?;

        let member = self.member_of(&sick_call.organization_id, staff_id)?;
        ensure_can_cover(&sick_call, &member)?;

        let assignment = self.commit_cover(sick_call_id, &member)?;
        self.announce_cover(assignment, &member, actor, reason)
    }

    /// The conditional write behind every cover; loses cleanly when another accept got there first.
    fn commit_cover(
        &self,
        sick_call_id: &SickCallId,
        member: &StaffMember,
    ) -> Result<CoverageAssignment, CoverageError> {
        self.repository
            .cover_sick_call(sick_call_id, &member.id, Utc::now())
            .map_err(|err| match err {
                RepositoryError::AlreadyCovered => CoverageError::AlreadyCovered(sick_call_id.clone()),
                RepositoryError::Closed { status } => CoverageError::Closed {
                    sick_call_id: sick_call_id.clone(),
                    status,
                },
                other => other.into(),
            })
    }

    /// Audit, confirm, and publish a cover that has already been committed.
    fn announce_cover(
        &self,
        assignment: CoverageAssignment,
        member: &StaffMember,
        actor: Option<&Actor>,
        reason: Option<String>,
    ) -> Result<SickCall, CoverageError> {
        let covered = assignment.sick_call;

        let action = if actor.is_some() {
            AuditAction::ManualAssignment
        } else {
            AuditAction::ShiftAccepted
        };
        let mut details = BTreeMap::new();
        details.insert("covered_by".to_string(), member.id.to_string());
        if let Some(previous) = &assignment.previous_assignee {
            details.insert("previous_assignee".to_string(), previous.to_string());
        }
        if let Some(reason) = reason.filter(|reason| !reason.trim().is_empty()) {
            details.insert("reason".to_string(), reason);
        }
        self.record_audit(&covered, actor.map(|actor| &actor.id), action, details);

        let location = self.repository.location(&assignment.shift.location_id)?;
        if let Err(err) = self.dispatcher.send(
            &member.id,
            &covered.id,
            NotificationKind::Confirmation,
            &confirmation_message(&assignment.shift, location.as_ref()),
        ) {
            warn!(sick_call_id = %covered.id, staff_id = %member.id, error = %err, "confirmation not delivered");
        }

        self.publisher.publish(
            &covered.organization_id,
            CoverageEvent::ShiftCovered {
                sick_call: covered.clone(),
                manual: actor.is_some(),
            },
        );
        info!(sick_call_id = %covered.id, covered_by = %member.id, action = action.label(), "shift covered");
        Ok(covered)
    }

    /// Withdraw a sick call; the shift returns to its original assignee.
    pub fn cancel(&self, sick_call_id: &SickCallId, actor: &Actor) -> Result<SickCall, CoverageError> {
        let current = self.scoped_sick_call(sick_call_id, &actor.organization_id)?;
        if !actor.role.can_manage() && current.reported_by != actor.id {
            return Err(CoverageError::Forbidden(
                "only a manager or the reporter can cancel a sick call".to_string(),
            ));
        }
        let next = current.status.transition(SickCallStatus::Cancelled)?;
        let cancelled =
            self.repository
                .transition_sick_call(sick_call_id, current.status, next, Utc::now())?;

        let mut details = BTreeMap::new();
        details.insert("previous_status".to_string(), current.status.label().to_string());
        self.record_audit(&cancelled, Some(&actor.id), AuditAction::SickCallCancelled, details);
        self.publisher.publish(
            &cancelled.organization_id,
            CoverageEvent::SickCallCancelled {
                sick_call_id: cancelled.id.clone(),
                shift_id: cancelled.shift_id.clone(),
            },
        );
        info!(sick_call_id = %cancelled.id, actor = %actor.id, "sick call cancelled");
        Ok(cancelled)
    }

    /// Full ranked list for a sick call's shift, unavailable staff included when not excluded.
    pub fn candidates(
        &self,
        sick_call_id: &SickCallId,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Candidate>, CoverageError> {
        let sick_call = self.scoped_sick_call(sick_call_id, organization_id)?;
        Ok(self.ranking.rank(&sick_call.shift_id, organization_id)?)
    }

    /// Open sick calls with their related records, oldest first.
    pub fn active_sick_calls(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<SickCallDetail>, CoverageError> {
        let mut details = Vec::new();
        for sick_call in self.repository.sick_calls_for_organization(organization_id)? {
            if !sick_call.status.is_open() {
                continue;
            }
            let Some(shift) = self.repository.shift(&sick_call.shift_id)? else {
                warn!(sick_call_id = %sick_call.id, shift_id = %sick_call.shift_id, "sick call references a missing shift");
                continue;
            };
            let location = self.repository.location(&shift.location_id)?;
            let reported_by = self.repository.staff_member(&sick_call.reported_by)?;
            let covered_by = match &sick_call.covered_by {
                Some(id) => self.repository.staff_member(id)?,
                None => None,
            };
            let notifications = self.repository.notifications_for_sick_call(&sick_call.id)?;
            let responses = self.repository.responses_for_sick_call(&sick_call.id)?;
            details.push(SickCallDetail {
                sick_call,
                shift,
                location,
                reported_by,
                covered_by,
                notifications,
                responses,
            });
        }
        Ok(details)
    }

    pub fn sick_call(
        &self,
        sick_call_id: &SickCallId,
        organization_id: &OrganizationId,
    ) -> Result<SickCall, CoverageError> {
        self.scoped_sick_call(sick_call_id, organization_id)
    }

    pub fn audit_trail(
        &self,
        sick_call_id: &SickCallId,
        organization_id: &OrganizationId,
    ) -> Result<Vec<AuditEntry>, CoverageError> {
        let sick_call = self.scoped_sick_call(sick_call_id, organization_id)?;
        Ok(self.repository.audit_entries(&sick_call.id)?)
    }

    /// Background notify jobs that gave up, for one organization.
    pub fn failed_notify_jobs(&self, organization_id: &OrganizationId) -> Vec<FailedNotifyJob> {
        self.jobs
            .failures()
            .into_iter()
            .filter(|failure| &failure.organization_id == organization_id)
            .collect()
    }

    pub(crate) fn report_notify_failure(&self, failure: &FailedNotifyJob) {
        match self.repository.sick_call(&failure.sick_call_id) {
            Ok(Some(sick_call)) => {
                let mut details = BTreeMap::new();
                details.insert("attempts".to_string(), failure.attempts.to_string());
                details.insert("error".to_string(), failure.error.clone());
                self.record_audit(&sick_call, None, AuditAction::AutoNotifyFailed, details);
            }
            Ok(None) => {}
            Err(err) => {
                warn!(sick_call_id = %failure.sick_call_id, error = %err, "could not audit notify failure");
            }
        }
        self.publisher.publish(
            &failure.organization_id,
            CoverageEvent::NotifyJobFailed {
                sick_call_id: failure.sick_call_id.clone(),
                attempts: failure.attempts,
                error: failure.error.clone(),
            },
        );
    }

    fn send_offer(
        &self,
        sick_call: &SickCall,
        staff_id: &StaffId,
    ) -> Result<Option<NotificationId>, CoverageError> {
        let shift = self
            .repository
            .shift(&sick_call.shift_id)?
            .ok_or_else(|| CoverageError::ShiftNotFound(sick_call.shift_id.clone()))?;
        let location = self.repository.location(&shift.location_id)?;
        let message = offer_message(&shift, location.as_ref());

        match self
            .dispatcher
            .send(staff_id, &sick_call.id, NotificationKind::Offer, &message)
        {
            Ok(id) => Ok(Some(id)),
            Err(err) => {
                warn!(sick_call_id = %sick_call.id, %staff_id, error = %err, "offer not delivered");
                Ok(None)
            }
        }
    }

    fn mark_offer_responded(
        &self,
        sick_call_id: &SickCallId,
        staff_id: &StaffId,
    ) -> Result<(), RepositoryError> {
        let latest = self
            .repository
            .notifications_for_sick_call(sick_call_id)?
            .into_iter()
            .filter(|notification| {
                &notification.recipient_id == staff_id
                    && notification.kind == NotificationKind::Offer
                    && notification.status != NotificationStatus::Responded
            })
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        if let Some(mut offer) = latest {
            offer.status = NotificationStatus::Responded;
            self.repository.update_notification(offer)?;
        }
        Ok(())
    }

    fn scoped_sick_call(
        &self,
        sick_call_id: &SickCallId,
        organization_id: &OrganizationId,
    ) -> Result<SickCall, CoverageError> {
        self.repository
            .sick_call(sick_call_id)?
            .filter(|call| &call.organization_id == organization_id)
            .ok_or_else(|| CoverageError::SickCallNotFound(sick_call_id.clone()))
    }

    fn member_of(
        &self,
        organization_id: &OrganizationId,
        staff_id: &StaffId,
    ) -> Result<StaffMember, CoverageError> {
        self.repository
            .staff_member(staff_id)?
            .filter(|member| &member.organization_id == organization_id)
            .ok_or_else(|| CoverageError::StaffNotFound(staff_id.clone()))
    }

    /// Audit writes happen after the state change has committed; a failure here is logged
    /// rather than reported as a failed operation.
    fn record_audit(
        &self,
        sick_call: &SickCall,
        actor_id: Option<&StaffId>,
        action: AuditAction,
        details: BTreeMap<String, String>,
    ) {
        let entry = AuditEntry {
            id: next_audit_id(),
            organization_id: sick_call.organization_id.clone(),
            actor_id: actor_id.cloned(),
            sick_call_id: sick_call.id.clone(),
            action,
            details,
            recorded_at: Utc::now(),
        };
        if let Err(err) = self.repository.append_audit(entry) {
            warn!(sick_call_id = %sick_call.id, action = action.label(), error = %err, "audit entry not recorded");
        }
    }
}

/// Error raised by the coverage service.
#[derive(Debug, thiserror::Error)]
pub enum CoverageError {
    #[error("shift {0} not found")]
    ShiftNotFound(ShiftId),
    #[error("sick call {0} not found")]
    SickCallNotFound(SickCallId),
    #[error("staff member {0} not found")]
    StaffNotFound(StaffId),
    #[error("no staff member is registered for phone number {0}")]
    UnknownPhone(String),
    #[error("staff member {0} has no open shift offer")]
    NoOpenOffer(StaffId),
    #[error("shift {shift_id} is not at location {location_id}")]
    LocationMismatch {
        shift_id: ShiftId,
        location_id: LocationId,
    },
    #[error("shift {shift_id} is not assigned to {staff_id}")]
    NotAssigned { shift_id: ShiftId, staff_id: StaffId },
    #[error("{0} reported the sick call and cannot cover it")]
    ReporterCannotCover(StaffId),
    #[error("shift {0} already has an active sick call")]
    DuplicateSickCall(ShiftId),
    #[error("sick call {0} is already covered")]
    AlreadyCovered(SickCallId),
    #[error("sick call {sick_call_id} is {}", .status.label())]
    Closed {
        sick_call_id: SickCallId,
        status: SickCallStatus,
    },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Reply(#[from] ReplyParseError),
    #[error(transparent)]
    Ranking(#[from] RankingError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl CoverageError {
    /// Failures a background retry could get past.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoverageError::Repository(err) => err.is_transient(),
            CoverageError::Ranking(RankingError::Repository(err)) => err.is_transient(),
            _ => false,
        }
    }
}
