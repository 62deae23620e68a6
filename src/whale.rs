//! Whale alert detection (spec §4.6): significance triggers, priority and
//! change-type classification, a bounded ring buffer with age-based
//! pruning and timestamp-bucketed dedup.
//!
//! Grounded on the teacher's alert surface in
//! `ExoMonk-polyderboard/src/api/alerts.rs` for the priority/ring-buffer
//! shape; the trigger and classification rules themselves are spec facts.

use std::collections::{HashMap, VecDeque};

use crate::config::AlertsConfig;
use crate::domain::{ChangeType, Direction, MarketContext, Position, Priority, Tier, WhaleAlert};

fn direction_of(position: Option<&Position>) -> Direction {
    position.map(|p| p.direction()).unwrap_or(Direction::Neutral)
}

fn size_of(position: Option<&Position>) -> f64 {
    position.map(|p| p.szi.abs()).unwrap_or(0.0)
}

/// Whether a trader qualifies for whale-alert evaluation at all (spec
/// §4.6: account value ≥ whale threshold OR score ≥ elite threshold).
pub fn is_alert_eligible(account_value: f64, score: f64, cfg: &AlertsConfig) -> bool {
    account_value >= cfg.whale_threshold || score >= cfg.elite_threshold
}

/// Significance trigger: direction flip, ≥20% size change with both sides
/// non-zero, entry from NEUTRAL, or exit to NEUTRAL.
pub fn is_significant(previous: Option<&Position>, current: Option<&Position>) -> bool {
    let prev_dir = direction_of(previous);
    let curr_dir = direction_of(current);
    let prev_size = size_of(previous);
    let curr_size = size_of(current);

    if prev_dir != curr_dir {
        return true;
    }
    if prev_size > 0.0 && curr_size > 0.0 {
        let change = (curr_size - prev_size).abs() / prev_size;
        if change >= 0.20 {
            return true;
        }
    }
    false
}

pub fn classify_change(prev_dir: Direction, curr_dir: Direction) -> ChangeType {
    match (prev_dir, curr_dir) {
        (Direction::Long, Direction::Short) | (Direction::Short, Direction::Long) => {
            ChangeType::Reversal
        }
        (Direction::Neutral, _) => ChangeType::Entry,
        (_, Direction::Neutral) => ChangeType::Exit,
        _ => ChangeType::SizeChange,
    }
}

pub fn classify_priority(account_value: f64, score: f64, cfg: &AlertsConfig) -> Priority {
    if account_value >= cfg.alpha_whale_threshold {
        Priority::Critical
    } else if account_value >= cfg.whale_threshold {
        Priority::High
    } else if score >= cfg.elite_threshold {
        Priority::Medium
    } else {
        Priority::Low
    }
}

fn recommendation_text(change_type: ChangeType, tier: Tier, current: Direction) -> String {
    match change_type {
        ChangeType::Reversal => format!("{tier:?} reversed to {current:?}; watch for follow-through"),
        ChangeType::Entry => format!("{tier:?} entered {current:?}; new directional conviction"),
        ChangeType::Exit => format!("{tier:?} exited to flat; conviction unwound"),
        ChangeType::SizeChange => format!("{tier:?} adjusted size while staying {current:?}"),
    }
}

/// Aggregate whale direction counts used for `market_context.whale_bias`
/// (spec §4.6): `(long - short) / total`.
pub fn whale_bias(counts: &MarketContext) -> f64 {
    let total = (counts.whales_long + counts.whales_short + counts.whales_flat) as f64;
    if total == 0.0 {
        0.0
    } else {
        (counts.whales_long as f64 - counts.whales_short as f64) / total
    }
}

/// Builds a fully-formed alert for a significant, eligible position change.
#[allow(clippy::too_many_arguments)]
pub fn build_alert(
    eth: &str,
    coin: &str,
    t: i64,
    previous: Option<&Position>,
    current: Option<&Position>,
    account_value: f64,
    score: f64,
    tier: Tier,
    market_context: MarketContext,
    cfg: &AlertsConfig,
) -> WhaleAlert {
    let prev_dir = direction_of(previous);
    let curr_dir = direction_of(current);
    let change_type = classify_change(prev_dir, curr_dir);
    let priority = classify_priority(account_value, score, cfg);

    WhaleAlert {
        eth: eth.to_string(),
        coin: coin.to_string(),
        t,
        priority,
        change_type,
        previous_direction: prev_dir,
        current_direction: curr_dir,
        previous_size: size_of(previous),
        current_size: size_of(current),
        tier,
        recommendation: recommendation_text(change_type, tier, curr_dir),
        market_context,
    }
}

/// Bounded, age-pruned, dedup ring of recent alerts — the Signal System's
/// only persistent memory of whale activity (spec §3 ownership: in-memory
/// only).
pub struct AlertRing {
    capacity: usize,
    max_age_seconds: i64,
    alerts: VecDeque<WhaleAlert>,
    seen: HashMap<(String, ChangeType, i64), ()>,
}

impl AlertRing {
    pub fn new(cfg: &AlertsConfig) -> Self {
        Self {
            capacity: cfg.ring_capacity,
            max_age_seconds: cfg.max_age_hours * 3600,
            alerts: VecDeque::with_capacity(cfg.ring_capacity.min(1024)),
            seen: HashMap::new(),
        }
    }

    fn dedup_key(alert: &WhaleAlert) -> (String, ChangeType, i64) {
        (alert.eth.clone(), alert.change_type, alert.t)
    }

    /// Inserts an alert unless it is a duplicate of one already recorded
    /// for `(trader, change_type, timestamp-to-second)`. Returns whether it
    /// was inserted.
    pub fn push(&mut self, alert: WhaleAlert) -> bool {
        let key = Self::dedup_key(&alert);
        if self.seen.contains_key(&key) {
            return false;
        }
        self.seen.insert(key, ());
        self.alerts.push_back(alert);
        while self.alerts.len() > self.capacity {
            if let Some(evicted) = self.alerts.pop_front() {
                self.seen.remove(&Self::dedup_key(&evicted));
            }
        }
        true
    }

    /// Prunes alerts older than `max_age_hours` and returns the remaining
    /// ones in insertion order, newest last.
    pub fn recent(&mut self, now: i64) -> Vec<WhaleAlert> {
        while let Some(front) = self.alerts.front() {
            if now - front.t > self.max_age_seconds {
                if let Some(evicted) = self.alerts.pop_front() {
                    self.seen.remove(&Self::dedup_key(&evicted));
                }
            } else {
                break;
            }
        }
        self.alerts.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(szi: f64) -> Position {
        Position {
            eth: "0xA".into(),
            coin: "BTC".into(),
            szi,
            ep: 60_000.0,
            mp: 60_000.0,
            upnl: 0.0,
            lev: 5,
            liquidation_price: None,
            position_value: szi.abs() * 60_000.0,
            t: 0,
        }
    }

    #[test]
    fn scenario_s1_entry_from_neutral_is_significant() {
        assert!(is_significant(None, Some(&position(10.0))));
        assert_eq!(
            classify_change(Direction::Neutral, Direction::Long),
            ChangeType::Entry
        );
    }

    #[test]
    fn scenario_s3_reversal() {
        let prev = position(5.0);
        let curr = position(-5.0);
        assert!(is_significant(Some(&prev), Some(&curr)));
        assert_eq!(
            classify_change(prev.direction(), curr.direction()),
            ChangeType::Reversal
        );
    }

    #[test]
    fn priority_thresholds_match_spec_table() {
        let cfg = AlertsConfig {
            alpha_whale_threshold: 20_000_000.0,
            whale_threshold: 10_000_000.0,
            elite_threshold: 80.0,
            max_age_hours: 24,
            ring_capacity: 2048,
        };
        assert_eq!(classify_priority(25_000_000.0, 0.0, &cfg), Priority::Critical);
        assert_eq!(classify_priority(15_000_000.0, 0.0, &cfg), Priority::High);
        assert_eq!(classify_priority(1_000.0, 85.0, &cfg), Priority::Medium);
        assert_eq!(classify_priority(1_000.0, 10.0, &cfg), Priority::Low);
    }

    #[test]
    fn twenty_percent_size_change_is_significant_but_less_is_not() {
        assert!(is_significant(Some(&position(10.0)), Some(&position(12.0))));
        assert!(!is_significant(Some(&position(10.0)), Some(&position(10.5))));
    }

    #[test]
    fn dedup_by_trader_change_type_and_second() {
        let cfg = AlertsConfig {
            alpha_whale_threshold: 20_000_000.0,
            whale_threshold: 10_000_000.0,
            elite_threshold: 80.0,
            max_age_hours: 24,
            ring_capacity: 16,
        };
        let mut ring = AlertRing::new(&cfg);
        let mc = MarketContext {
            whale_bias: 0.0,
            whales_long: 1,
            whales_short: 0,
            whales_flat: 0,
        };
        let alert = build_alert(
            "0xA", "BTC", 1_000, None, Some(&position(10.0)), 15_000_000.0, 90.0,
            Tier::AlphaWhale, mc.clone(), &cfg,
        );
        assert!(ring.push(alert.clone()));
        assert!(!ring.push(alert));
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn pruning_drops_alerts_older_than_max_age() {
        let cfg = AlertsConfig {
            alpha_whale_threshold: 20_000_000.0,
            whale_threshold: 10_000_000.0,
            elite_threshold: 80.0,
            max_age_hours: 1,
            ring_capacity: 16,
        };
        let mut ring = AlertRing::new(&cfg);
        let mc = MarketContext {
            whale_bias: 0.0,
            whales_long: 1,
            whales_short: 0,
            whales_flat: 0,
        };
        let alert = build_alert(
            "0xA", "BTC", 0, None, Some(&position(10.0)), 15_000_000.0, 90.0,
            Tier::AlphaWhale, mc, &cfg,
        );
        ring.push(alert);
        let recent = ring.recent(10_000);
        assert!(recent.is_empty());
    }
}
