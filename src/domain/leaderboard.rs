use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::trader::{Window, WindowPerformance};

/// One row of the venue's leaderboard fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub eth: String,
    pub account_value: f64,
    pub window_performance: HashMap<Window, WindowPerformance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competition_prize: Option<f64>,
}

impl LeaderboardRow {
    pub fn window(&self, w: Window) -> WindowPerformance {
        self.window_performance.get(&w).copied().unwrap_or_else(WindowPerformance::zero)
    }
}

/// An ordered fetch produced every refresh interval (spec §3). Consumed to
/// recompute scores, then discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardSnapshot {
    pub fetched_at: i64,
    pub rows: Vec<LeaderboardRow>,
}
