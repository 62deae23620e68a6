//! Multi-dimensional trader weighting (spec §4.4).
//!
//! The functional forms here are given facts, not a design choice — see
//! the open question preserved in SPEC_FULL.md about not "correcting" the
//! Sharpe/Sortino approximations to real statistics.

use crate::config::{PerformanceSubWeights, WeightingConfig};
use crate::domain::{Tier, Trader, TraderWeight, Window};

/// External market regime label (glossary). `Unknown` maps to a neutral
/// regime dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    DeepAccumulation,
    EarlyBull,
    MidBull,
    LateBull,
    Distribution,
    Bear,
    HighVolatility,
    Trending,
    Ranging,
    Unknown,
}

impl Regime {
    pub fn parse(s: &str) -> Regime {
        match s {
            "deep_accumulation" => Regime::DeepAccumulation,
            "early_bull" => Regime::EarlyBull,
            "mid_bull" => Regime::MidBull,
            "late_bull" => Regime::LateBull,
            "distribution" => Regime::Distribution,
            "bear" => Regime::Bear,
            "high_volatility" => Regime::HighVolatility,
            "trending" => Regime::Trending,
            "ranging" => Regime::Ranging,
            _ => Regime::Unknown,
        }
    }
}

fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
    v.max(lo).min(hi)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Sharpe approximation from the three available ROI points (spec §4.4:
/// "the point is the functional form, not calibration").
fn sharpe_estimate(day_roi: f64, week_roi: f64, month_roi: f64) -> f64 {
    let points = [day_roi, week_roi / 7.0, month_roi / 30.0];
    let sd = stdev(&points);
    if sd == 0.0 {
        0.0
    } else {
        mean(&points) / sd
    }
}

/// Sortino approximation: mean over the downside deviation (root-mean-
/// square of below-zero excursions, MAR=0) of the same three points. No
/// observed downside is the best case, not a zero case, so it maps to a
/// large ratio the caller's clamp saturates.
fn sortino_estimate(day_roi: f64, week_roi: f64, month_roi: f64) -> f64 {
    let points = [day_roi, week_roi / 7.0, month_roi / 30.0];
    let downside_variance =
        mean(&points.iter().map(|p| if *p < 0.0 { p * p } else { 0.0 }).collect::<Vec<_>>());
    let downside_dev = downside_variance.sqrt();
    if downside_dev == 0.0 {
        10.0
    } else {
        mean(&points) / downside_dev
    }
}

fn performance_dimension(trader: &Trader, sub: &PerformanceSubWeights) -> f64 {
    let day = trader.window(Window::Day);
    let week = trader.window(Window::Week);
    let month = trader.window(Window::Month);
    let all_time = trader.window(Window::AllTime);

    let sharpe = sharpe_estimate(day.roi, week.roi, month.roi);
    let sortino = sortino_estimate(day.roi, week.roi, month.roi);
    let consistency = [day.roi, week.roi, month.roi, all_time.roi]
        .iter()
        .filter(|roi| **roi > 0.0)
        .count() as f64
        / 4.0;
    // max_drawdown is estimated from the score band: a higher composite
    // score implies a shallower observed drawdown, so the dimension is
    // scored as drawdown *control* (higher is better) directly from score.
    let max_drawdown = clamp(trader.score / 100.0, 0.0, 1.0);
    let win_rate = if day.roi > 0.0 && week.roi > 0.0 {
        1.0
    } else if day.roi > 0.0 || week.roi > 0.0 {
        0.5
    } else {
        0.0
    };
    let profit_factor = clamp(all_time.roi / 2.0, 0.0, 1.0);

    let raw = sub.sharpe * clamp(sharpe / 3.0, -1.0, 1.0)
        + sub.sortino * clamp(sortino / 3.0, -1.0, 1.0)
        + sub.consistency * consistency
        + sub.max_drawdown * max_drawdown
        + sub.win_rate * win_rate
        + sub.profit_factor * profit_factor;

    clamp(raw * 100.0, 0.0, 100.0)
}

fn size_dimension(account_value: f64, tiers: &[(f64, f64)]) -> f64 {
    tiers
        .iter()
        .find(|(threshold, _)| account_value >= *threshold)
        .map(|(_, points)| *points)
        .unwrap_or(0.5)
}

fn recency_dimension(trader: &Trader) -> f64 {
    let day = trader.window(Window::Day).roi;
    let week = trader.window(Window::Week).roi;
    let month = trader.window(Window::Month).roi;
    let weighted = day * 0.50 + week * 0.30 + month * 0.20;
    // Linear map of magnitude onto [0.5, 1.5]; a weighted ROI magnitude of
    // 1.0 (100%) saturates the range.
    0.5 + clamp(weighted.abs(), 0.0, 1.0) * 1.0
}

fn regime_dimension(trader: &Trader, regime: Regime) -> f64 {
    let month_roi = trader.window(Window::Month).roi;
    match regime {
        Regime::HighVolatility => {
            let consistency = [
                trader.window(Window::Day).roi,
                trader.window(Window::Week).roi,
                trader.window(Window::Month).roi,
                trader.window(Window::AllTime).roi,
            ]
            .iter()
            .filter(|roi| **roi > 0.0)
            .count() as f64
                / 4.0;
            0.8 + consistency * 0.4
        }
        Regime::Trending => 0.8 + clamp(month_roi.abs() * 0.4, 0.0, 0.4),
        Regime::Ranging => 0.9,
        _ => 1.0,
    }
}

/// Computes a trader's weight. Pure function of `(trader, config, regime)`
/// — calling it twice with unchanged inputs yields identical output (spec
/// §4.4 determinism invariant).
pub fn compute_weight(trader: &Trader, cfg: &WeightingConfig, regime: Regime) -> TraderWeight {
    let performance = performance_dimension(trader, &cfg.performance_sub_weights);
    let size = size_dimension(trader.account_value, &cfg.size_tiers);
    let recency = recency_dimension(trader);
    let regime_dim = regime_dimension(trader, regime);

    let w = &cfg.dimension_weights;
    let composite =
        w.performance * performance + w.size * size + w.recency * recency + w.regime * regime_dim;

    TraderWeight {
        performance,
        size,
        recency,
        regime: regime_dim,
        composite,
    }
}

pub fn tier_of(weight: &TraderWeight) -> Tier {
    Tier::classify(weight.size, weight.performance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeightingConfig;
    use crate::domain::{Tag, Window, WindowPerformance};
    use std::collections::HashMap;

    fn trader(account_value: f64, score: f64, windows: &[(Window, f64)]) -> Trader {
        let mut wp = HashMap::new();
        for (w, roi) in windows {
            wp.insert(
                *w,
                WindowPerformance {
                    pnl: 0.0,
                    roi: *roi,
                    vlm: 0.0,
                },
            );
        }
        Trader {
            eth: "0xabc".into(),
            display_name: None,
            score,
            tags: vec![Tag::Whale],
            active: true,
            added_at: 0,
            updated_at: 0,
            account_value,
            window_performance: wp,
        }
    }

    #[test]
    fn determinism_across_repeated_calls() {
        let cfg = WeightingConfig::default();
        let t = trader(15_000_000.0, 90.0, &[(Window::Day, 0.02), (Window::Week, 0.1)]);
        let w1 = compute_weight(&t, &cfg, Regime::Unknown);
        let w2 = compute_weight(&t, &cfg, Regime::Unknown);
        assert_eq!(w1, w2);
    }

    #[test]
    fn size_dimension_is_monotonic_in_account_value() {
        let cfg = WeightingConfig::default();
        let small = size_dimension(50_000.0, &cfg.size_tiers);
        let big = size_dimension(25_000_000.0, &cfg.size_tiers);
        assert!(big > small);
    }

    #[test]
    fn alpha_whale_tier_requires_size_and_performance() {
        let cfg = WeightingConfig::default();
        let t = trader(
            25_000_000.0,
            100.0,
            &[
                (Window::Day, 0.05),
                (Window::Week, 0.2),
                (Window::Month, 0.5),
                (Window::AllTime, 3.0),
            ],
        );
        let w = compute_weight(&t, &cfg, Regime::Unknown);
        assert_eq!(w.size, 3.0);
        assert!(w.performance >= 80.0, "performance was {}", w.performance);
        assert_eq!(tier_of(&w), Tier::AlphaWhale);
    }

    #[test]
    fn unavailable_regime_is_neutral() {
        assert_eq!(regime_dimension(&trader(0.0, 0.0, &[]), Regime::Unknown), 1.0);
    }
}
