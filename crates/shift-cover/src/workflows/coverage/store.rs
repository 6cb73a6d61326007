use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};

use super::domain::{
    AuditEntry, Location, LocationId, Notification, NotificationId, Organization, OrganizationId,
    ResponseType, Shift, ShiftId, ShiftResponse, ShiftStatus, SickCall, SickCallId,
    SickCallStatus, StaffId, StaffMember,
};
use super::repository::{CoverageAssignment, CoverageRepository, RepositoryError};

#[derive(Debug, Default)]
struct StoreState {
    organizations: HashMap<OrganizationId, Organization>,
    locations: HashMap<LocationId, Location>,
    staff: HashMap<StaffId, StaffMember>,
    shifts: HashMap<ShiftId, Shift>,
    sick_calls: BTreeMap<SickCallId, SickCall>,
    notifications: BTreeMap<NotificationId, Notification>,
    responses: Vec<ShiftResponse>,
    audit: Vec<AuditEntry>,
}

/// Process-local record store.
///
/// A single lock covers every table so the conditional writes required by
/// [`CoverageRepository`] are atomic with respect to each other.
#[derive(Debug, Default)]
pub struct InMemoryCoverageStore {
    state: Mutex<StoreState>,
}

impl InMemoryCoverageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store lock poisoned".to_string()))
    }

    pub fn insert_organization(&self, organization: Organization) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        if state.organizations.contains_key(&organization.id) {
            return Err(RepositoryError::Conflict);
        }
        state
            .organizations
            .insert(organization.id.clone(), organization);
        Ok(())
    }

    pub fn insert_location(&self, location: Location) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        if state.locations.contains_key(&location.id) {
            return Err(RepositoryError::Conflict);
        }
        state.locations.insert(location.id.clone(), location);
        Ok(())
    }

    pub fn insert_staff(&self, member: StaffMember) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        if state.staff.contains_key(&member.id) {
            return Err(RepositoryError::Conflict);
        }
        state.staff.insert(member.id.clone(), member);
        Ok(())
    }

    pub fn insert_shift(&self, shift: Shift) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        if state.shifts.contains_key(&shift.id) {
            return Err(RepositoryError::Conflict);
        }
        state.shifts.insert(shift.id.clone(), shift);
        Ok(())
    }

    pub fn organizations(&self) -> Result<Vec<Organization>, RepositoryError> {
        let state = self.state()?;
        let mut organizations: Vec<Organization> = state.organizations.values().cloned().collect();
        organizations.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(organizations)
    }

    /// Shifts for an organization ordered by date and start time.
    pub fn shifts_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Shift>, RepositoryError> {
        let state = self.state()?;
        let mut shifts: Vec<Shift> = state
            .shifts
            .values()
            .filter(|shift| &shift.organization_id == organization_id)
            .cloned()
            .collect();
        shifts.sort_by(|a, b| {
            (a.date, a.start_time, &a.id).cmp(&(b.date, b.start_time, &b.id))
        });
        Ok(shifts)
    }
}

impl CoverageRepository for InMemoryCoverageStore {
    fn location(&self, id: &LocationId) -> Result<Option<Location>, RepositoryError> {
        Ok(self.state()?.locations.get(id).cloned())
    }

    fn staff_member(&self, id: &StaffId) -> Result<Option<StaffMember>, RepositoryError> {
        Ok(self.state()?.staff.get(id).cloned())
    }

    fn staff_by_phone(&self, phone: &str) -> Result<Option<StaffMember>, RepositoryError> {
        let wanted = normalize_phone(phone);
        if wanted.is_empty() {
            return Ok(None);
        }
        let state = self.state()?;
        let mut matches: Vec<&StaffMember> = state
            .staff
            .values()
            .filter(|member| {
                member
                    .phone
                    .as_deref()
                    .map(|candidate| normalize_phone(candidate) == wanted)
                    .unwrap_or(false)
            })
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches.first().map(|member| (*member).clone()))
    }

    fn staff_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<StaffMember>, RepositoryError> {
        let state = self.state()?;
        let mut members: Vec<StaffMember> = state
            .staff
            .values()
            .filter(|member| &member.organization_id == organization_id)
            .cloned()
            .collect();
        members.sort_by(|a, b| {
            b.seniority_level
                .unwrap_or(0)
                .cmp(&a.seniority_level.unwrap_or(0))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(members)
    }

    fn shift(&self, id: &ShiftId) -> Result<Option<Shift>, RepositoryError> {
        Ok(self.state()?.shifts.get(id).cloned())
    }

    fn shifts_for_staff(
        &self,
        staff_id: &StaffId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Shift>, RepositoryError> {
        let state = self.state()?;
        let mut shifts: Vec<Shift> = state
            .shifts
            .values()
            .filter(|shift| {
                shift.assigned_to.as_ref() == Some(staff_id)
                    && shift.date >= from
                    && shift.date <= to
            })
            .cloned()
            .collect();
        shifts.sort_by(|a, b| (a.date, a.start_time).cmp(&(b.date, b.start_time)));
        Ok(shifts)
    }

    fn open_sick_call(&self, sick_call: SickCall) -> Result<SickCall, RepositoryError> {
        let mut state = self.state()?;

        if state.sick_calls.contains_key(&sick_call.id)
            || state.sick_calls.values().any(|existing| {
                existing.shift_id == sick_call.shift_id && existing.status.blocks_new_sick_call()
            })
        {
            return Err(RepositoryError::Conflict);
        }

        let shift = state
            .shifts
            .get_mut(&sick_call.shift_id)
            .ok_or(RepositoryError::NotFound)?;
        if shift.status != ShiftStatus::Scheduled {
            return Err(RepositoryError::ShiftUnavailable {
                status: shift.status,
            });
        }
        shift.status = sick_call.status.shift_status();

        state
            .sick_calls
            .insert(sick_call.id.clone(), sick_call.clone());
        Ok(sick_call)
    }

    fn sick_call(&self, id: &SickCallId) -> Result<Option<SickCall>, RepositoryError> {
        Ok(self.state()?.sick_calls.get(id).cloned())
    }

    fn sick_calls_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<SickCall>, RepositoryError> {
        let state = self.state()?;
        let mut calls: Vec<SickCall> = state
            .sick_calls
            .values()
            .filter(|call| &call.organization_id == organization_id)
            .cloned()
            .collect();
        calls.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(calls)
    }

    fn transition_sick_call(
        &self,
        id: &SickCallId,
        expected: SickCallStatus,
        next: SickCallStatus,
        at: DateTime<Utc>,
    ) -> Result<SickCall, RepositoryError> {
        let mut guard = self.state()?;
        let state = &mut *guard;

        let call = state.sick_calls.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if call.status != expected {
            return Err(RepositoryError::StaleStatus {
                expected,
                found: call.status,
            });
        }
        let shift = state
            .shifts
            .get_mut(&call.shift_id)
            .ok_or(RepositoryError::NotFound)?;

        call.status = next;
        call.updated_at = at;
        shift.status = next.shift_status();
        Ok(call.clone())
    }

    fn cover_sick_call(
        &self,
        id: &SickCallId,
        staff_id: &StaffId,
        at: DateTime<Utc>,
    ) -> Result<CoverageAssignment, RepositoryError> {
        let mut guard = self.state()?;
        let state = &mut *guard;

        let call = state.sick_calls.get_mut(id).ok_or(RepositoryError::NotFound)?;
        match call.status {
            SickCallStatus::Covered => return Err(RepositoryError::AlreadyCovered),
            SickCallStatus::Cancelled => {
                return Err(RepositoryError::Closed {
                    status: call.status,
                })
            }
            SickCallStatus::Pending | SickCallStatus::Notifying | SickCallStatus::Unfilled => {}
        }
        let shift = state
            .shifts
            .get_mut(&call.shift_id)
            .ok_or(RepositoryError::NotFound)?;

        call.status = SickCallStatus::Covered;
        call.covered_by = Some(staff_id.clone());
        call.covered_at = Some(at);
        call.updated_at = at;

        let previous_assignee = shift.assigned_to.replace(staff_id.clone());
        shift.status = ShiftStatus::Covered;

        Ok(CoverageAssignment {
            sick_call: call.clone(),
            shift: shift.clone(),
            previous_assignee,
        })
    }

    fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<Notification, RepositoryError> {
        let mut state = self.state()?;
        if state.notifications.contains_key(&notification.id) {
            return Err(RepositoryError::Conflict);
        }
        state
            .notifications
            .insert(notification.id.clone(), notification.clone());
        Ok(notification)
    }

    fn update_notification(&self, notification: Notification) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        match state.notifications.get_mut(&notification.id) {
            Some(existing) => {
                *existing = notification;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn notifications_for_sick_call(
        &self,
        id: &SickCallId,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let state = self.state()?;
        let mut notifications: Vec<Notification> = state
            .notifications
            .values()
            .filter(|notification| &notification.sick_call_id == id)
            .cloned()
            .collect();
        notifications.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(notifications)
    }

    fn notifications_for_recipient(
        &self,
        staff_id: &StaffId,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let state = self.state()?;
        let mut notifications: Vec<Notification> = state
            .notifications
            .values()
            .filter(|notification| &notification.recipient_id == staff_id)
            .cloned()
            .collect();
        notifications.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(notifications)
    }

    fn insert_response(&self, response: ShiftResponse) -> Result<ShiftResponse, RepositoryError> {
        let mut state = self.state()?;
        if state.responses.iter().any(|existing| existing.id == response.id) {
            return Err(RepositoryError::Conflict);
        }
        state.responses.push(response.clone());
        Ok(response)
    }

    fn responses_for_sick_call(
        &self,
        id: &SickCallId,
    ) -> Result<Vec<ShiftResponse>, RepositoryError> {
        let state = self.state()?;
        Ok(state
            .responses
            .iter()
            .filter(|response| &response.sick_call_id == id)
            .cloned()
            .collect())
    }

    fn accepted_pickups_since(
        &self,
        staff_id: &StaffId,
        since: DateTime<Utc>,
    ) -> Result<u32, RepositoryError> {
        let state = self.state()?;
        let count = state
            .responses
            .iter()
            .filter(|response| {
                &response.staff_id == staff_id
                    && response.response_type == ResponseType::Accept
                    && response.responded_at >= since
            })
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    fn append_audit(&self, entry: AuditEntry) -> Result<(), RepositoryError> {
        self.state()?.audit.push(entry);
        Ok(())
    }

    fn audit_entries(&self, id: &SickCallId) -> Result<Vec<AuditEntry>, RepositoryError> {
        let state = self.state()?;
        Ok(state
            .audit
            .iter()
            .filter(|entry| &entry.sick_call_id == id)
            .cloned()
            .collect())
    }
}

/// Digits only, with a leading US country code dropped, so "+1 (515) 555-0100" matches
/// "5155550100".
fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 11 && digits.starts_with('1') {
        digits[1..].to_string()
    } else {
        digits
    }
}
