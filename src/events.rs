//! The inter-service event envelope (spec §4.3, Design Notes §9).
//!
//! The source represents every message as a duck-typed `{event_type,
//! payload}` bag; here that becomes a closed, tagged variant so every
//! handler is a total function over the enum. The wire format keeps the
//! `event_type` JSON discriminator for compatibility.

use serde::{Deserialize, Serialize};

use crate::domain::{AggregateSignal, Candle, WhaleAlert};

pub const CHANNEL_POSITIONS_RAW: &str = "positions.raw";
pub const CHANNEL_POSITIONS_SCORED: &str = "positions.scored";
pub const CHANNEL_CANDLES: &str = "candles";
pub const CHANNEL_SIGNALS_OUT: &str = "signals.out";

/// Payload of `positions.raw`: every persisted position snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRawPayload {
    pub address: String,
    pub coin: String,
    pub szi: f64,
    pub ep: f64,
    pub mp: f64,
    pub upnl: f64,
    pub lev: u32,
    pub t: i64,
}

/// Payload of `positions.scored`: the same position enriched with the
/// trader's current score and tags at emission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionScoredPayload {
    pub address: String,
    pub coin: String,
    pub szi: f64,
    pub ep: f64,
    pub mp: f64,
    pub upnl: f64,
    pub lev: u32,
    pub t: i64,
    pub score: f64,
    pub tags: Vec<crate::domain::Tag>,
    pub account_value: f64,
}

/// Payload of `candles`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandlePayload {
    pub symbol: String,
    pub interval: String,
    pub t: i64,
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
    pub v: f64,
}

impl CandlePayload {
    pub fn from_candle(symbol: &str, interval: &str, candle: &Candle) -> Self {
        Self {
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            t: candle.t,
            o: candle.o,
            h: candle.h,
            l: candle.l,
            c: candle.c,
            v: candle.v,
        }
    }
}

/// Payload of `signals.out`: either the aggregate signal update or a whale
/// alert, emitted by the Signal System back to the Scraper for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalsOutPayload {
    Aggregate(AggregateSignal),
    Whale(WhaleAlert),
}

/// The closed set of inter-service events, tagged by `event_type` on the
/// wire exactly as spec's Design Notes require.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "snake_case")]
pub enum Event {
    PositionsRaw(PositionRawPayload),
    PositionsScored(PositionScoredPayload),
    Candle(CandlePayload),
    SignalsOut(SignalsOutPayload),
}

impl Event {
    /// The flat pub/sub topic this event travels on (spec §4.3).
    pub fn channel(&self) -> &'static str {
        match self {
            Event::PositionsRaw(_) => CHANNEL_POSITIONS_RAW,
            Event::PositionsScored(_) => CHANNEL_POSITIONS_SCORED,
            Event::Candle(_) => CHANNEL_CANDLES,
            Event::SignalsOut(_) => CHANNEL_SIGNALS_OUT,
        }
    }

    /// The idempotence key consumers must dedup on: `(event_type, trader|symbol, t)`.
    pub fn idempotence_key(&self) -> (&'static str, String, i64) {
        match self {
            Event::PositionsRaw(p) => ("positions.raw", format!("{}:{}", p.address, p.coin), p.t),
            Event::PositionsScored(p) => {
                ("positions.scored", format!("{}:{}", p.address, p.coin), p.t)
            }
            Event::Candle(c) => ("candles", format!("{}:{}", c.symbol, c.interval), c.t),
            Event::SignalsOut(SignalsOutPayload::Aggregate(a)) => {
                ("signals.out.aggregate", a.symbol.clone(), a.t)
            }
            Event::SignalsOut(SignalsOutPayload::Whale(w)) => {
                ("signals.out.whale", w.eth.clone(), w.t)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_routing() {
        let e = Event::PositionsRaw(PositionRawPayload {
            address: "0xabc".into(),
            coin: "BTC".into(),
            szi: 1.0,
            ep: 1.0,
            mp: 1.0,
            upnl: 0.0,
            lev: 1,
            t: 0,
        });
        assert_eq!(e.channel(), CHANNEL_POSITIONS_RAW);
    }

    #[test]
    fn roundtrips_through_json_with_discriminator() {
        let e = Event::Candle(CandlePayload {
            symbol: "BTC".into(),
            interval: "1h".into(),
            t: 3600,
            o: 1.0,
            h: 2.0,
            l: 0.5,
            c: 1.5,
            v: 10.0,
        });
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"event_type\":\"candle\""));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.channel(), CHANNEL_CANDLES);
    }
}
