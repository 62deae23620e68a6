use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::{Interval, LeaderboardRow, Window, WindowPerformance};

// ---------------------------------------------------------------------------
// REST: POST /info
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum InfoRequest {
    #[serde(rename = "candleSnapshot")]
    CandleSnapshot { req: CandleSnapshotReq },
    #[serde(rename = "userFills")]
    UserFills { user: String },
    #[serde(rename = "metaAndAssetCtxs")]
    MetaAndAssetCtxs,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandleSnapshotReq {pub coin: String, pub interval: String, #[serde(rename = "startTime")] pub start_time: i64, #[serde(rename = "endTime")] pub end_time: i64}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCandle {
    #[serde(rename = "t")]
    pub open_time: i64,
    #[serde(rename = "T")]
    pub close_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "o", with = "rust_decimal_str")]
    pub open: f64,
    #[serde(rename = "h", with = "rust_decimal_str")]
    pub high: f64,
    #[serde(rename = "l", with = "rust_decimal_str")]
    pub low: f64,
    #[serde(rename = "c", with = "rust_decimal_str")]
    pub close: f64,
    #[serde(rename = "v", with = "rust_decimal_str")]
    pub volume: f64,
}

impl RawCandle {
    pub fn into_candle(self, interval: Interval) -> crate::domain::Candle {
        crate::domain::Candle {
            t: interval.bucket_start(self.open_time / 1000),
            o: self.open,
            h: self.high,
            l: self.low,
            c: self.close,
            v: self.volume,
        }
    }
}

/// Hyperliquid numeric fields travel as JSON strings on the wire.
mod rust_decimal_str {
    use serde::{self, Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<f64>().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Leaderboard: CloudFront JSON
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardResponse {
    #[serde(rename = "leaderboardRows")]
    pub leaderboard_rows: Vec<RawLeaderboardRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLeaderboardRow {
    #[serde(rename = "ethAddress")]
    pub eth_address: String,
    #[serde(rename = "accountValue")]
    pub account_value: String,
    #[serde(rename = "windowPerformances")]
    pub window_performances: Vec<(String, RawWindowPerformance)>,
    #[serde(default)]
    pub prize: Option<f64>,
    #[serde(default, rename = "displayName")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawWindowPerformance {
    pub pnl: String,
    pub roi: String,
    pub vlm: String,
}

fn parse_window_name(name: &str) -> Option<Window> {
    match name {
        "day" => Some(Window::Day),
        "week" => Some(Window::Week),
        "month" => Some(Window::Month),
        "allTime" => Some(Window::AllTime),
        _ => None,
    }
}

impl RawLeaderboardRow {
    pub fn into_row(self) -> Option<LeaderboardRow> {
        let account_value: f64 = self.account_value.parse().ok()?;
        let mut window_performance = HashMap::new();
        for (name, wp) in self.window_performances {
            if let Some(window) = parse_window_name(&name) {
                window_performance.insert(
                    window,
                    WindowPerformance {
                        pnl: wp.pnl.parse().unwrap_or(0.0),
                        roi: wp.roi.parse().unwrap_or(0.0),
                        vlm: wp.vlm.parse().unwrap_or(0.0),
                    },
                );
            }
        }
        Some(LeaderboardRow {
            eth: self.eth_address,
            account_value,
            window_performance,
            display_name: self.display_name,
            competition_prize: self.prize,
        })
    }
}

// ---------------------------------------------------------------------------
// WebSocket subscriptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type")]
pub enum Subscription {
    #[serde(rename = "webData2")]
    WebData2 { user: String },
    #[serde(rename = "candle")]
    Candle { coin: String, interval: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum Outgoing {
    #[serde(rename = "subscribe")]
    Subscribe { subscription: Subscription },
    #[serde(rename = "unsubscribe")]
    Unsubscribe { subscription: Subscription },
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsEnvelope {
    pub channel: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLeverage {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAssetPosition {
    pub position: RawPosition,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPosition {
    pub coin: String,
    #[serde(with = "rust_decimal_str")]
    pub szi: f64,
    #[serde(rename = "entryPx", with = "rust_decimal_str")]
    pub entry_px: f64,
    #[serde(rename = "positionValue", with = "rust_decimal_str")]
    pub position_value: f64,
    #[serde(rename = "unrealizedPnl", with = "rust_decimal_str")]
    pub unrealized_pnl: f64,
    pub leverage: RawLeverage,
    #[serde(rename = "liquidationPx", default)]
    pub liquidation_px: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawClearinghouseState {
    #[serde(rename = "assetPositions")]
    pub asset_positions: Vec<RawAssetPosition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawWebData2 {
    pub user: Option<String>,
    #[serde(rename = "clearinghouseState")]
    pub clearinghouse_state: RawClearinghouseState,
}

impl RawPosition {
    /// Hyperliquid's `positionValue = |szi| * markPx`; the venue does not
    /// carry mark price directly on the position, so we invert it here.
    pub fn mark_price(&self) -> f64 {
        if self.szi != 0.0 {
            self.position_value / self.szi.abs()
        } else {
            self.entry_px
        }
    }
}
