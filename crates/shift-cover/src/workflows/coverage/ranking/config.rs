use serde::{Deserialize, Serialize};

/// Scoring dials for candidate ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingConfig {
    pub overtime_threshold_hours: u32,
    pub exclude_conflicting_staff: bool,
    pub fairness_window_days: u32,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            overtime_threshold_hours: 40,
            exclude_conflicting_staff: true,
            fairness_window_days: 30,
        }
    }
}
