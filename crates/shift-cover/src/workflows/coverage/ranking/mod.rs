mod config;
mod rules;

pub use config::RankingConfig;

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{OrganizationId, Shift, ShiftId, StaffMember, UserRole};
use super::repository::{CoverageRepository, RepositoryError};
use rules::{minutes_to_hours, score_candidate, CandidateSignals};

/// Scoring inputs reported alongside each candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingFactor {
    Base,
    Availability,
    Overtime,
    Seniority,
    Fairness,
}

/// Discrete contribution to a candidate score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreComponent {
    pub factor: RankingFactor,
    pub score: i32,
    pub notes: String,
}

/// A staff member evaluated for a vacated shift. Computed per call, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub staff: StaffMember,
    pub score: i32,
    pub rank: usize,
    pub is_available: bool,
    pub would_overtime: bool,
    pub hours_this_week: f64,
    pub reasons: Vec<String>,
    pub components: Vec<ScoreComponent>,
}

#[derive(Debug, thiserror::Error)]
pub enum RankingError {
    #[error("shift {0} not found")]
    ShiftNotFound(ShiftId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Read-only ranking of coworkers who could pick up a shift.
pub struct RankingEngine<R> {
    repository: Arc<R>,
    config: RankingConfig,
}

impl<R> RankingEngine<R>
where
    R: CoverageRepository,
{
    pub fn new(repository: Arc<R>, config: RankingConfig) -> Self {
        Self { repository, config }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    pub fn rank(
        &self,
        shift_id: &ShiftId,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Candidate>, RankingError> {
        self.rank_at(shift_id, organization_id, Utc::now())
    }

    /// Rank candidates with the fairness window measured back from `as_of`.
    pub fn rank_at(
        &self,
        shift_id: &ShiftId,
        organization_id: &OrganizationId,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Candidate>, RankingError> {
        let shift = self
            .repository
            .shift(shift_id)?
            .filter(|shift| &shift.organization_id == organization_id)
            .ok_or_else(|| RankingError::ShiftNotFound(shift_id.clone()))?;

        let week_start =
            shift.date - Duration::days(i64::from(shift.date.weekday().num_days_from_monday()));
        let week_end = week_start + Duration::days(6);
        let fairness_since = as_of - Duration::days(i64::from(self.config.fairness_window_days));
        let shift_minutes = shift.duration_minutes();

        let mut candidates = Vec::new();
        for member in self.repository.staff_for_organization(organization_id)? {
            if !is_in_pool(&member, &shift) {
                continue;
            }

            let week = self
                .repository
                .shifts_for_staff(&member.id, week_start, week_end)?;
            let working: Vec<&Shift> = week
                .iter()
                .filter(|other| other.id != shift.id && other.status.is_working())
                .collect();
            let already_working = working.iter().any(|other| other.date == shift.date);

            if already_working && self.config.exclude_conflicting_staff {
                debug!(staff_id = %member.id, shift_id = %shift.id, "excluding staff already working that date");
                continue;
            }

            let signals = CandidateSignals {
                already_working,
                scheduled_minutes_this_week: working.iter().map(|other| other.duration_minutes()).sum(),
                shift_minutes,
                seniority_level: member.seniority_level,
                recent_pickups: self
                    .repository
                    .accepted_pickups_since(&member.id, fairness_since)?,
            };
            let (components, score) = score_candidate(&signals, &self.config);
            let reasons = components
                .iter()
                .skip(1)
                .map(|component| component.notes.clone())
                .collect();

            candidates.push(Candidate {
                staff: member,
                score,
                rank: 0,
                is_available: !signals.already_working,
                would_overtime: signals.would_overtime(&self.config),
                hours_this_week: minutes_to_hours(signals.scheduled_minutes_this_week),
                reasons,
                components,
            });
        }

        // stable: equal scores keep seniority order
        candidates.sort_by(|a, b| b.score.cmp(&a.score));
        for (index, candidate) in candidates.iter_mut().enumerate() {
            candidate.rank = index + 1;
        }

        debug!(shift_id = %shift.id, candidates = candidates.len(), "ranked coverage candidates");
        Ok(candidates)
    }
}

fn is_in_pool(member: &StaffMember, shift: &Shift) -> bool {
    member.active
        && member.role == UserRole::Staff
        && shift.assigned_to.as_ref() != Some(&member.id)
}
