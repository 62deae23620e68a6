use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::position::Direction;

/// Derived per-trader weight (spec §4.4). Never persisted; cached by trader
/// id and invalidated on regime change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraderWeight {
    pub performance: f64,
    pub size: f64,
    pub recency: f64,
    pub regime: f64,
    pub composite: f64,
}

/// Tier label derived from `(size, performance)` (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    AlphaWhale,
    Whale,
    Large,
    Elite,
    Standard,
    Small,
}

impl Tier {
    pub fn classify(size: f64, performance: f64) -> Tier {
        if size >= 3.0 && performance >= 80.0 {
            Tier::AlphaWhale
        } else if size >= 2.5 && performance >= 70.0 {
            Tier::Whale
        } else if size >= 2.0 && performance >= 65.0 {
            Tier::Large
        } else if performance >= 60.0 {
            Tier::Elite
        } else if performance >= 50.0 {
            Tier::Standard
        } else {
            Tier::Small
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Buy,
    Sell,
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionCounts {
    pub long: u32,
    pub short: u32,
    pub flat: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopPosition {
    pub eth: String,
    pub coin: String,
    pub direction: Direction,
    pub composite_weight: f64,
    pub position_value: f64,
}

/// One symbol's current aggregate read (spec §3/§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSignal {
    pub symbol: String,
    pub t: i64,
    pub rec: Recommendation,
    pub conf: f64,
    pub long_bias: f64,
    pub short_bias: f64,
    pub net_exposure: f64,
    pub counts: DirectionCounts,
    pub whale_breakdown: HashMap<Tier, DirectionCounts>,
    pub top_positions: Vec<TopPosition>,
    pub price_at_signal: f64,
}
