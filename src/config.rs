//! Process-wide configuration, loaded once at boot.
//!
//! Mirrors the teacher's `models::Config::from_env` read-with-default idiom.
//! Recognized options are exactly the set enumerated in spec §6; recognized
//! env vars use the `SECTION__KEY` double-underscore convention.

use std::collections::HashSet;

use crate::domain::{Tag, Window};
use crate::error::PipelineError;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub mongo_url: String,
    pub mongo_database: String,
    pub retention_positions_days: i64,
    pub retention_scores_days: i64,
    pub retention_candles_days: i64,
    pub retention_signals_days: i64,
    pub retention_leaderboard_days: i64,
}

#[derive(Debug, Clone)]
pub struct BusConfig {
    pub redis_url: String,
    pub subscriber_queue_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct VenueConfig {
    pub symbol: String,
    pub trade_min_usd: f64,
    pub ws_url: String,
    pub rest_url: String,
    pub leaderboard_url: String,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub leaderboard_refresh_seconds: u64,
    pub health_check_seconds: u64,
    /// How often the Signal System re-reads the external regime label
    /// (spec §6: "supplied by an external detector" — out of scope, so
    /// this implementation polls an env var rather than a real detector).
    pub regime_poll_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct RoiMultipliers {
    pub all_time: f64,
    pub month: f64,
    pub week: f64,
}

#[derive(Debug, Clone)]
pub struct TagThresholds {
    pub whale: f64,
    pub large: f64,
}

#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub roi_multipliers: RoiMultipliers,
    pub account_value_tiers: Vec<(f64, f64)>, // (threshold, points), descending
    pub monthly_volume_tiers: Vec<(f64, f64)>,
    pub consistency_bonus: f64,
    pub tags: TagThresholds,
    pub min_score: f64,
    pub min_account_value: f64,
    pub max_count: usize,
    pub require_positive_windows: Vec<Window>,
    pub exclude_addresses: HashSet<String>,
    pub exclude_tags: HashSet<Tag>,
}

#[derive(Debug, Clone)]
pub struct PerformanceSubWeights {
    pub sharpe: f64,
    pub sortino: f64,
    pub consistency: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
}

#[derive(Debug, Clone)]
pub struct DimensionWeights {
    pub performance: f64,
    pub size: f64,
    pub recency: f64,
    pub regime: f64,
}

#[derive(Debug, Clone)]
pub struct WeightingConfig {
    pub performance_sub_weights: PerformanceSubWeights,
    pub dimension_weights: DimensionWeights,
    pub size_tiers: Vec<(f64, f64)>, // account value threshold -> size dimension, descending
}

#[derive(Debug, Clone)]
pub struct AlertsConfig {
    pub alpha_whale_threshold: f64,
    pub whale_threshold: f64,
    pub elite_threshold: f64,
    pub max_age_hours: i64,
    pub ring_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    /// The Signal System's own `/health` port (spec §7); distinct from
    /// `api_port` since the two services are separate processes.
    pub signal_api_port: u16,
    /// Base URL of the Scraper's HTTP surface, used for the Signal
    /// System's bootstrap snapshot call (spec §4.3).
    pub scraper_base_url: String,
    pub log_level: String,
    pub storage: StorageConfig,
    pub bus: BusConfig,
    pub venue: VenueConfig,
    pub scheduler: SchedulerConfig,
    pub scoring: ScoringConfig,
    pub weighting: WeightingConfig,
    pub alerts: AlertsConfig,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            roi_multipliers: RoiMultipliers {
                all_time: 30.0,
                month: 50.0,
                week: 100.0,
            },
            account_value_tiers: vec![
                (10_000_000.0, 15.0),
                (5_000_000.0, 12.0),
                (1_000_000.0, 8.0),
                (100_000.0, 4.0),
            ],
            monthly_volume_tiers: vec![
                (100_000_000.0, 10.0),
                (50_000_000.0, 7.0),
                (10_000_000.0, 4.0),
                (1_000_000.0, 2.0),
            ],
            consistency_bonus: 5.0,
            tags: TagThresholds {
                whale: 10_000_000.0,
                large: 1_000_000.0,
            },
            min_score: 50.0,
            min_account_value: 0.0,
            max_count: 500,
            require_positive_windows: Vec::new(),
            exclude_addresses: HashSet::new(),
            exclude_tags: HashSet::new(),
        }
    }
}

impl Default for WeightingConfig {
    fn default() -> Self {
        Self {
            performance_sub_weights: PerformanceSubWeights {
                sharpe: 0.25,
                sortino: 0.20,
                consistency: 0.20,
                max_drawdown: 0.15,
                win_rate: 0.10,
                profit_factor: 0.10,
            },
            dimension_weights: DimensionWeights {
                performance: 0.40,
                size: 0.30,
                recency: 0.20,
                regime: 0.10,
            },
            size_tiers: vec![
                (20_000_000.0, 3.0),
                (10_000_000.0, 2.5),
                (5_000_000.0, 2.0),
                (1_000_000.0, 1.5),
                (100_000.0, 1.0),
            ],
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, PipelineError> {
        dotenv::dotenv().ok();

        let api_host = env_or("API_HOST", "0.0.0.0");
        let api_port: u16 = env_parse("API_PORT", 8080);
        let signal_api_port: u16 = env_parse("SIGNAL_API_PORT", 8081);
        let scraper_base_url = env_or("SCRAPER__BASE_URL", "http://127.0.0.1:8080");
        let log_level = env_or("LOG_LEVEL", "info");

        let storage = StorageConfig {
            mongo_url: env_or("MONGO__URL", "sqlite://./hl_telemetry.db"),
            mongo_database: env_or("MONGO__DATABASE", "hl_telemetry"),
            retention_positions_days: env_parse("RETENTION_POSITIONS_DAYS", 30),
            retention_scores_days: env_parse("RETENTION_SCORES_DAYS", 90),
            retention_candles_days: env_parse("RETENTION_CANDLES_DAYS", 30),
            retention_signals_days: env_parse("RETENTION_SIGNALS_DAYS", 30),
            retention_leaderboard_days: env_parse("RETENTION_LEADERBOARD_DAYS", 90),
        };

        let bus = BusConfig {
            redis_url: env_or("REDIS__URL", "redis://127.0.0.1:6379"),
            subscriber_queue_capacity: env_parse("BUS_SUBSCRIBER_QUEUE_CAPACITY", 10_000),
        };

        let venue = VenueConfig {
            symbol: env_or("HYPERLIQUID__SYMBOL", "BTC"),
            trade_min_usd: env_parse("HYPERLIQUID__TRADE_MIN_USD", 0.0),
            ws_url: env_or("HYPERLIQUID__WS_URL", "wss://api.hyperliquid.xyz/ws"),
            rest_url: env_or("HYPERLIQUID__REST_URL", "https://api.hyperliquid.xyz/info"),
            leaderboard_url: env_or(
                "HYPERLIQUID__LEADERBOARD_URL",
                "https://stats-data.hyperliquid.xyz/Mainnet/leaderboard",
            ),
        };

        let scheduler = SchedulerConfig {
            leaderboard_refresh_seconds: env_parse("LEADERBOARD_REFRESH_SECONDS", 3600),
            health_check_seconds: env_parse("HEALTH_CHECK_SECONDS", 600),
            regime_poll_seconds: env_parse("REGIME_POLL_SECONDS", 30),
        };

        let alerts = AlertsConfig {
            alpha_whale_threshold: env_parse("ALPHA_WHALE_THRESHOLD", 20_000_000.0),
            whale_threshold: env_parse("WHALE_THRESHOLD", 10_000_000.0),
            elite_threshold: env_parse("ELITE_THRESHOLD", 80.0),
            max_age_hours: env_parse("ALERT_MAX_AGE_HOURS", 24),
            ring_capacity: env_parse("ALERT_RING_CAPACITY", 2048),
        };

        if api_port == 0 {
            return Err(PipelineError::Config("API_PORT must be non-zero".into()));
        }

        let mut scoring = ScoringConfig::default();
        if let Ok(v) = std::env::var("SCORING__MIN_SCORE") {
            scoring.min_score = v.parse().unwrap_or(scoring.min_score);
        }
        if let Ok(v) = std::env::var("SCORING__MAX_COUNT") {
            scoring.max_count = v.parse().unwrap_or(scoring.max_count);
        }
        if let Ok(v) = std::env::var("SCORING__EXCLUDE_ADDRESSES") {
            scoring.exclude_addresses = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_lowercase)
                .collect();
        }
        if let Ok(v) = std::env::var("SCORING__REQUIRE_POSITIVE_WINDOWS") {
            scoring.require_positive_windows = v
                .split(',')
                .filter_map(|s| match s.trim() {
                    "day" => Some(Window::Day),
                    "week" => Some(Window::Week),
                    "month" => Some(Window::Month),
                    "allTime" => Some(Window::AllTime),
                    _ => None,
                })
                .collect();
        }

        Ok(Self {
            api_host,
            api_port,
            signal_api_port,
            scraper_base_url,
            log_level,
            storage,
            bus,
            venue,
            scheduler,
            scoring,
            weighting: WeightingConfig::default(),
            alerts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let scoring = ScoringConfig::default();
        assert_eq!(scoring.roi_multipliers.all_time, 30.0);
        assert_eq!(scoring.roi_multipliers.week, 100.0);
        assert_eq!(scoring.max_count, 500);
        assert_eq!(scoring.tags.whale, 10_000_000.0);

        let weighting = WeightingConfig::default();
        assert_eq!(weighting.dimension_weights.performance, 0.40);
        assert_eq!(weighting.size_tiers[0], (20_000_000.0, 3.0));
    }

    #[test]
    fn rejects_zero_port() {
        std::env::set_var("API_PORT", "0");
        let err = Config::from_env().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
        std::env::remove_var("API_PORT");
    }
}
