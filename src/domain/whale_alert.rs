use serde::{Deserialize, Serialize};

use super::position::Direction;
use super::signal::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Reversal,
    Entry,
    Exit,
    SizeChange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketContext {
    pub whale_bias: f64,
    pub whales_long: u32,
    pub whales_short: u32,
    pub whales_flat: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhaleAlert {
    pub eth: String,
    pub coin: String,
    pub t: i64,
    pub priority: Priority,
    pub change_type: ChangeType,
    pub previous_direction: Direction,
    pub current_direction: Direction,
    pub previous_size: f64,
    pub current_size: f64,
    pub tier: Tier,
    pub market_context: MarketContext,
    pub recommendation: String,
}
