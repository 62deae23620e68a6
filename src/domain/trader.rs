use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Closed tag vocabulary (spec §3/§4.2). Unknown tags never appear on the
/// wire; this enum is exhaustive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Whale,
    Large,
    Elite,
    TopPerformer,
    Consistent,
    HighPerformer,
    HighVolume,
    MediumVolume,
}

/// The four named performance windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Window {
    Day,
    Week,
    Month,
    AllTime,
}

impl Window {
    pub const ALL: [Window; 4] = [Window::Day, Window::Week, Window::Month, Window::AllTime];
}

/// `{pnl, roi, vlm}` bound to one window. Precise decimals travel as strings
/// on the wire (spec §3) and as `f64` internally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowPerformance {
    pub pnl: f64,
    pub roi: f64,
    pub vlm: f64,
}

impl WindowPerformance {
    pub fn zero() -> Self {
        Self {
            pnl: 0.0,
            roi: 0.0,
            vlm: 0.0,
        }
    }
}

/// A tracked (or formerly tracked) trader. Keyed by `eth`, a 42-character
/// hex account identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trader {
    pub eth: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub score: f64,
    pub tags: Vec<Tag>,
    pub active: bool,
    pub added_at: i64,
    pub updated_at: i64,
    pub account_value: f64,
    pub window_performance: HashMap<Window, WindowPerformance>,
}

impl Trader {
    pub fn window(&self, w: Window) -> WindowPerformance {
        self.window_performance.get(&w).copied().unwrap_or_else(WindowPerformance::zero)
    }

    pub fn is_valid_identifier(eth: &str) -> bool {
        eth.len() == 42
            && eth.starts_with("0x")
            && eth[2..].chars().all(|c| c.is_ascii_hexdigit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_validation() {
        assert!(Trader::is_valid_identifier(
            "0x1234567890abcdef1234567890abcdef12345678"
        ));
        assert!(!Trader::is_valid_identifier("0x1234"));
        assert!(!Trader::is_valid_identifier(
            "1234567890abcdef1234567890abcdef1234567890"
        ));
    }

    #[test]
    fn window_defaults_to_zero() {
        let t = Trader {
            eth: "0x1234567890abcdef1234567890abcdef12345678".into(),
            display_name: None,
            score: 0.0,
            tags: vec![],
            active: true,
            added_at: 0,
            updated_at: 0,
            account_value: 0.0,
            window_performance: HashMap::new(),
        };
        assert_eq!(t.window(Window::Day), WindowPerformance::zero());
    }
}
