//! Leaderboard scoring and tagging (spec §4.2).
//!
//! Grounded on the teacher's `signals/wallet_analytics.rs` style of
//! deriving several named metrics from a handful of raw inputs via small,
//! independently testable functions.

use std::collections::HashMap;

use crate::config::ScoringConfig;
use crate::domain::{LeaderboardRow, Tag, Window};

/// A tiered step function: the first `(threshold, points)` pair (sorted
/// descending by threshold) whose threshold the value clears wins; below
/// the lowest threshold scores zero.
fn tiered(value: f64, tiers: &[(f64, f64)]) -> f64 {
    tiers
        .iter()
        .find(|(threshold, _)| value >= *threshold)
        .map(|(_, points)| *points)
        .unwrap_or(0.0)
}

/// Raw additive score for one leaderboard row (spec §4.2 table).
pub fn score_row(row: &LeaderboardRow, cfg: &ScoringConfig) -> f64 {
    let all_time = row.window(Window::AllTime);
    let month = row.window(Window::Month);
    let week = row.window(Window::Week);
    let day = row.window(Window::Day);

    let mut score = 0.0;
    score += all_time.roi * cfg.roi_multipliers.all_time;
    score += month.roi * cfg.roi_multipliers.month;
    score += week.roi * cfg.roi_multipliers.week;
    score += tiered(row.account_value, &cfg.account_value_tiers);
    score += tiered(month.vlm, &cfg.monthly_volume_tiers);

    let all_positive = [day.roi, week.roi, month.roi, all_time.roi]
        .iter()
        .all(|roi| *roi > 0.0);
    if all_positive {
        score += cfg.consistency_bonus;
    }

    score
}

/// Tag assignment for a scored row (spec §4.2, closed vocabulary).
pub fn tag_row(row: &LeaderboardRow, score: f64, cfg: &ScoringConfig) -> Vec<Tag> {
    let mut tags = Vec::new();
    let day = row.window(Window::Day);
    let week = row.window(Window::Week);
    let month = row.window(Window::Month);
    let all_time = row.window(Window::AllTime);

    if row.account_value >= cfg.tags.whale {
        tags.push(Tag::Whale);
    }
    if row.account_value >= cfg.tags.large {
        tags.push(Tag::Large);
    }
    if score >= 80.0 {
        tags.push(Tag::TopPerformer);
    }
    if score >= 90.0 {
        tags.push(Tag::Elite);
    }
    if day.roi > 0.0 && week.roi > 0.0 && month.roi > 0.0 {
        tags.push(Tag::Consistent);
    }
    if all_time.roi >= 1.0 {
        tags.push(Tag::HighPerformer);
    }
    if month.vlm >= 100_000_000.0 {
        tags.push(Tag::HighVolume);
    } else if month.vlm >= 10_000_000.0 {
        tags.push(Tag::MediumVolume);
    }

    tags
}

/// One row carried through scoring: the raw inputs plus derived score and
/// tags, ready for filtering.
#[derive(Debug, Clone)]
pub struct ScoredRow {
    pub row: LeaderboardRow,
    pub score: f64,
    pub tags: Vec<Tag>,
}

pub fn score_and_tag(rows: Vec<LeaderboardRow>, cfg: &ScoringConfig) -> Vec<ScoredRow> {
    rows.into_iter()
        .map(|row| {
            let score = score_row(&row, cfg);
            let tags = tag_row(&row, score, cfg);
            ScoredRow { row, score, tags }
        })
        .collect()
}

fn passes_require_positive(row: &LeaderboardRow, cfg: &ScoringConfig) -> bool {
    cfg.require_positive_windows
        .iter()
        .all(|w| row.window(*w).roi > 0.0)
}

/// Applies spec §4.2 filters and returns the qualifying set, sorted by
/// score descending with an id tiebreak, clamped to `max_count`.
///
/// Deterministic for any permutation of the input (spec §8, invariant 1):
/// the sort key is `(score, eth)`, never insertion order.
pub fn filter_and_rank(mut scored: Vec<ScoredRow>, cfg: &ScoringConfig) -> Vec<ScoredRow> {
    scored.retain(|s| {
        s.score >= cfg.min_score
            && s.row.account_value >= cfg.min_account_value
            && passes_require_positive(&s.row, cfg)
            && !cfg.exclude_addresses.contains(&s.row.eth.to_lowercase())
            && !s.tags.iter().any(|t| cfg.exclude_tags.contains(t))
    });

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.row.eth.cmp(&b.row.eth))
    });

    scored.truncate(cfg.max_count);
    scored
}

/// Convenience: maps eth -> `ScoredRow` for set-diffing against the
/// previously tracked set.
pub fn index_by_eth(rows: &[ScoredRow]) -> HashMap<String, &ScoredRow> {
    rows.iter().map(|s| (s.row.eth.clone(), s)).collect()
}
