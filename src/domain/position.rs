use serde::{Deserialize, Serialize};

/// Signed position direction, derived from `szi`'s sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
    Neutral,
}

impl Direction {
    pub fn from_szi(szi: f64) -> Self {
        if szi > 0.0 {
            Direction::Long
        } else if szi < 0.0 {
            Direction::Short
        } else {
            Direction::Neutral
        }
    }
}

/// A trader's position in one coin, as of the latest WS snapshot.
///
/// Invariant (spec §3): at most one row per `(eth, coin)`; a re-sent
/// snapshot for the same pair replaces the prior one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub eth: String,
    pub coin: String,
    /// Signed size: positive long, negative short, zero flat.
    pub szi: f64,
    pub ep: f64,
    pub mp: f64,
    pub upnl: f64,
    pub lev: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidation_price: Option<f64>,
    pub position_value: f64,
    pub t: i64,
}

impl Position {
    pub fn direction(&self) -> Direction {
        Direction::from_szi(self.szi)
    }

    pub fn is_flat(&self) -> bool {
        self.szi == 0.0
    }

    /// The `(szi, leverage, entry price)` tuple used by the event-driven
    /// persistence dedup (spec §4.1): a snapshot is written only if this
    /// tuple changed from the previously stored one for the same
    /// `(eth, coin)`.
    pub fn dedup_key(&self) -> (u64, u32, u64) {
        (self.szi.to_bits(), self.lev, self.ep.to_bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_from_szi() {
        assert_eq!(Direction::from_szi(10.0), Direction::Long);
        assert_eq!(Direction::from_szi(-5.0), Direction::Short);
        assert_eq!(Direction::from_szi(0.0), Direction::Neutral);
    }
}
