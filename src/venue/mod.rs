//! Hyperliquid venue client (spec §6): outbound-only REST + WebSocket.
//!
//! These wire shapes are given facts the spec requires reproducing
//! bit-for-bit, not a design choice — the venue interface, leaderboard
//! CloudFront shape, and subscription vocabulary are fixed externally.

pub mod rest;
pub mod types;
pub mod ws;

pub use rest::VenueRestClient;
pub use types::*;
pub use ws::{decode_candle, decode_web_data2, VenueWsClient};
