use super::config::RankingConfig;
use super::{RankingFactor, ScoreComponent};

const BASE_SCORE: i32 = 1000;
const AVAILABLE_BONUS: i32 = 500;
const CONFLICT_PENALTY: i32 = -1000;
const WITHIN_HOURS_BONUS: i32 = 300;
const OVERTIME_PENALTY: i32 = -200;
const SENIORITY_WEIGHT: u32 = 10;
const FAIRNESS_CEILING: i64 = 100;
const PICKUP_PENALTY: i64 = 20;

/// Facts about one staff member relative to the vacated shift.
pub(crate) struct CandidateSignals {
    pub already_working: bool,
    pub scheduled_minutes_this_week: i64,
    pub shift_minutes: i64,
    pub seniority_level: Option<u32>,
    pub recent_pickups: u32,
}

impl CandidateSignals {
    pub(crate) fn would_overtime(&self, config: &RankingConfig) -> bool {
        let threshold_minutes = i64::from(config.overtime_threshold_hours) * 60;
        self.scheduled_minutes_this_week + self.shift_minutes > threshold_minutes
    }
}

/// Minutes as fractional hours; absurd totals saturate instead of wrapping.
pub(crate) fn minutes_to_hours(minutes: i64) -> f64 {
    let clamped = i32::try_from(minutes).unwrap_or(if minutes < 0 { i32::MIN } else { i32::MAX });
    f64::from(clamped) / 60.0
}

pub(crate) fn score_candidate(
    signals: &CandidateSignals,
    config: &RankingConfig,
) -> (Vec<ScoreComponent>, i32) {
    let mut components = Vec::with_capacity(5);

    components.push(ScoreComponent {
        factor: RankingFactor::Base,
        score: BASE_SCORE,
        notes: "base score".to_string(),
    });

    if signals.already_working {
        components.push(ScoreComponent {
            factor: RankingFactor::Availability,
            score: CONFLICT_PENALTY,
            notes: "already scheduled on the shift date".to_string(),
        });
    } else {
        components.push(ScoreComponent {
            factor: RankingFactor::Availability,
            score: AVAILABLE_BONUS,
            notes: "not working on the shift date".to_string(),
        });
    }

    let total_hours =
        minutes_to_hours(signals.scheduled_minutes_this_week.saturating_add(signals.shift_minutes));
    if signals.would_overtime(config) {
        components.push(ScoreComponent {
            factor: RankingFactor::Overtime,
            score: OVERTIME_PENALTY,
            notes: format!(
                "{total_hours:.1}h this week with the shift exceeds {}h",
                config.overtime_threshold_hours
            ),
        });
    } else {
        components.push(ScoreComponent {
            factor: RankingFactor::Overtime,
            score: WITHIN_HOURS_BONUS,
            notes: format!(
                "{total_hours:.1}h this week with the shift, within {}h",
                config.overtime_threshold_hours
            ),
        });
    }

    if let Some(level) = signals.seniority_level {
        let score = i32::try_from(level.saturating_mul(SENIORITY_WEIGHT)).unwrap_or(i32::MAX);
        components.push(ScoreComponent {
            factor: RankingFactor::Seniority,
            score,
            notes: format!("seniority level {level}"),
        });
    }

    let fairness = (FAIRNESS_CEILING - i64::from(signals.recent_pickups) * PICKUP_PENALTY).max(0);
    components.push(ScoreComponent {
        factor: RankingFactor::Fairness,
        score: i32::try_from(fairness).unwrap_or_default(),
        notes: format!(
            "{} accepted pickup(s) in the last {} days",
            signals.recent_pickups, config.fairness_window_days
        ),
    });

    let total = components
        .iter()
        .fold(0i32, |acc, component| acc.saturating_add(component.score));

    (components, total)
}
