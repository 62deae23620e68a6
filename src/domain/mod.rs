//! Core entities shared between the Scraper and the Signal System.
//!
//! Field names follow the wire/on-disk convention from spec §3 exactly
//! (`eth`, `szi`, `ep`, `mp`, `upnl`, `lev`, `t`, `o/h/l/c/v`, `rec`, `conf`)
//! so both services serialize identically across the event bus and the
//! document store.

pub mod candle;
pub mod leaderboard;
pub mod position;
pub mod signal;
pub mod trader;
pub mod whale_alert;

pub use candle::{Candle, Interval};
pub use leaderboard::{LeaderboardRow, LeaderboardSnapshot};
pub use position::{Direction, Position};
pub use signal::{AggregateSignal, DirectionCounts, Recommendation, Tier, TopPosition, TraderWeight};
pub use trader::{Tag, Trader, Window, WindowPerformance};
pub use whale_alert::{ChangeType, MarketContext, Priority, WhaleAlert};
