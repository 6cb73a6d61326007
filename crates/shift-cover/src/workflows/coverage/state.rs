//! Transition tables for sick calls and the shifts they vacate.
//!
//! Every status write in the workflow is checked here first; the store then applies it as a
//! compare-and-set against the status the caller observed.

use super::domain::{ShiftStatus, SickCallStatus};

/// Raised when a status change is not in the transition table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("sick call cannot move from {} to {}", .from.label(), .to.label())]
    SickCall {
        from: SickCallStatus,
        to: SickCallStatus,
    },
    #[error("shift cannot move from {} to {}", .from.label(), .to.label())]
    Shift { from: ShiftStatus, to: ShiftStatus },
}

impl SickCallStatus {
    pub const fn allowed_transitions(self) -> &'static [SickCallStatus] {
        use SickCallStatus::*;
        match self {
            Pending => &[Notifying, Covered, Unfilled, Cancelled],
            // notifying -> notifying is a manager re-running the offer step
            Notifying => &[Notifying, Covered, Unfilled, Cancelled],
            Unfilled => &[Notifying, Covered, Cancelled],
            Covered | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: SickCallStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub const fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn transition(self, next: SickCallStatus) -> Result<SickCallStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError::SickCall {
                from: self,
                to: next,
            })
        }
    }

    /// Shift status that must accompany this sick call status.
    pub const fn shift_status(self) -> ShiftStatus {
        match self {
            SickCallStatus::Pending | SickCallStatus::Notifying => ShiftStatus::SickCall,
            SickCallStatus::Covered => ShiftStatus::Covered,
            SickCallStatus::Unfilled => ShiftStatus::Unfilled,
            SickCallStatus::Cancelled => ShiftStatus::Scheduled,
        }
    }
}

impl ShiftStatus {
    pub const fn allowed_transitions(self) -> &'static [ShiftStatus] {
        use ShiftStatus::*;
        match self {
            Scheduled => &[SickCall, Cancelled],
            SickCall => &[Covered, Unfilled, Scheduled],
            Unfilled => &[SickCall, Covered, Scheduled],
            Covered | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: ShiftStatus) -> bool {
        self == next || self.allowed_transitions().contains(&next)
    }

    pub fn transition(self, next: ShiftStatus) -> Result<ShiftStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError::Shift {
                from: self,
                to: next,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covered_sick_calls_are_terminal() {
        assert!(SickCallStatus::Covered.is_terminal());
        assert!(SickCallStatus::Cancelled.is_terminal());
        assert_eq!(
            SickCallStatus::Covered.transition(SickCallStatus::Notifying),
            Err(TransitionError::SickCall {
                from: SickCallStatus::Covered,
                to: SickCallStatus::Notifying,
            })
        );
    }

    #[test]
    fn manual_override_is_allowed_from_every_open_status() {
        for status in [
            SickCallStatus::Pending,
            SickCallStatus::Notifying,
            SickCallStatus::Unfilled,
        ] {
            assert!(status.can_transition_to(SickCallStatus::Covered), "{status:?}");
        }
    }

    #[test]
    fn pending_cannot_skip_back_from_notifying() {
        assert!(!SickCallStatus::Notifying.can_transition_to(SickCallStatus::Pending));
        assert!(!SickCallStatus::Unfilled.can_transition_to(SickCallStatus::Pending));
    }

    #[test]
    fn every_sick_call_transition_has_a_legal_shift_transition() {
        let statuses = [
            SickCallStatus::Pending,
            SickCallStatus::Notifying,
            SickCallStatus::Covered,
            SickCallStatus::Unfilled,
            SickCallStatus::Cancelled,
        ];
        for from in statuses {
            for to in from.allowed_transitions() {
                assert!(
                    from.shift_status().can_transition_to(to.shift_status()),
                    "{from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn renotifying_an_unfilled_call_reopens_its_shift() {
        assert!(SickCallStatus::Unfilled.can_transition_to(SickCallStatus::Notifying));
        assert_eq!(
            ShiftStatus::Unfilled.transition(ShiftStatus::SickCall),
            Ok(ShiftStatus::SickCall)
        );
    }

    #[test]
    fn covered_shift_cannot_reopen() {
        assert!(ShiftStatus::Covered
            .transition(ShiftStatus::SickCall)
            .is_err());
        assert!(ShiftStatus::Scheduled
            .transition(ShiftStatus::SickCall)
            .is_ok());
    }
}
