use serde::{Deserialize, Serialize};

use super::jobs::RetryPolicy;
use super::ranking::RankingConfig;

/// Tunables for the coverage workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageConfig {
    pub ranking: RankingConfig,
    /// Size of the candidate set reported when notifying.
    pub max_candidates: usize,
    pub retry: RetryPolicy,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            ranking: RankingConfig::default(),
            max_candidates: 5,
            retry: RetryPolicy::default(),
        }
    }
}
