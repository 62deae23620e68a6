//! Tracked-trader lifecycle: the delta between two qualifying leaderboard
//! sets is the only path by which the subscription manager learns about
//! new or departed traders (spec §4.2).

use std::collections::{HashMap, HashSet};

use crate::scoring::ScoredRow;

/// A single delta event for the subscription manager to act on.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackedSetDelta {
    Add(String),
    Remove(String),
    /// Present in both the previous and current qualifying set; row state
    /// (score, tags) should be upserted without touching the subscription.
    Upsert(String),
}

/// Computes `next \ prev` (Add), `prev \ next` (Remove), `next ∩ prev`
/// (Upsert). A failed refresh must never call this with a partial `next` —
/// the caller keeps the previous set active in that case (spec §4.2
/// Failures).
pub fn diff(prev: &HashSet<String>, next: &[ScoredRow]) -> Vec<TrackedSetDelta> {
    let next_ids: HashSet<String> = next.iter().map(|s| s.row.eth.clone()).collect();

    let mut deltas = Vec::with_capacity(next_ids.len() + prev.len());
    for id in &next_ids {
        if prev.contains(id) {
            deltas.push(TrackedSetDelta::Upsert(id.clone()));
        } else {
            deltas.push(TrackedSetDelta::Add(id.clone()));
        }
    }
    for id in prev {
        if !next_ids.contains(id) {
            deltas.push(TrackedSetDelta::Remove(id.clone()));
        }
    }
    deltas
}

/// In-process view of the current tracked set, kept by the leaderboard
/// scheduler and consulted by the WS manager's diff API only — never
/// mutated directly by another task (spec §5).
#[derive(Debug, Default)]
pub struct TrackedSet {
    active: HashSet<String>,
    scores: HashMap<String, f64>,
}

impl TrackedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_ids(&self) -> &HashSet<String> {
        &self.active
    }

    pub fn score_of(&self, eth: &str) -> Option<f64> {
        self.scores.get(eth).copied()
    }

    /// Applies a freshly scored set, returning the deltas to publish. Does
    /// not mutate `self` on its own; call [`TrackedSet::apply`] with the
    /// same `next` afterward once deltas have been acted on.
    pub fn diff_against(&self, next: &[ScoredRow]) -> Vec<TrackedSetDelta> {
        diff(&self.active, next)
    }

    pub fn apply(&mut self, next: &[ScoredRow]) {
        self.active = next.iter().map(|s| s.row.eth.clone()).collect();
        self.scores = next.iter().map(|s| (s.row.eth.clone(), s.score)).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LeaderboardRow;
    use std::collections::HashMap as Map;

    fn scored(eth: &str, score: f64) -> ScoredRow {
        ScoredRow {
            row: LeaderboardRow {
                eth: eth.to_string(),
                account_value: 0.0,
                window_performance: Map::new(),
                display_name: None,
                competition_prize: None,
            },
            score,
            tags: vec![],
        }
    }

    #[test]
    fn scenario_s2_leaderboard_removal() {
        let mut tracked = TrackedSet::new();
        tracked.apply(&[scored("0xA", 90.0), scored("0xB", 85.0)]);

        let next = vec![scored("0xA", 90.0)];
        let deltas = tracked.diff_against(&next);

        assert!(deltas.contains(&TrackedSetDelta::Remove("0xB".to_string())));
        assert!(deltas.contains(&TrackedSetDelta::Upsert("0xA".to_string())));
        assert!(!deltas.iter().any(|d| matches!(d, TrackedSetDelta::Add(_))));
    }

    #[test]
    fn failed_refresh_keeps_previous_set() {
        let mut tracked = TrackedSet::new();
        tracked.apply(&[scored("0xA", 90.0)]);
        // A failed refresh simply never calls diff_against/apply; the set
        // is untouched.
        assert!(tracked.active_ids().contains("0xA"));
    }

    #[test]
    fn add_and_remove_together() {
        let mut tracked = TrackedSet::new();
        tracked.apply(&[scored("0xA", 90.0)]);
        let next = vec![scored("0xB", 95.0)];
        let deltas = tracked.diff_against(&next);
        assert_eq!(deltas.len(), 2);
        assert!(deltas.contains(&TrackedSetDelta::Add("0xB".to_string())));
        assert!(deltas.contains(&TrackedSetDelta::Remove("0xA".to_string())));
    }
}
