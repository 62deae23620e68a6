//! Signal aggregation (spec §4.5): folds every tracked trader's current
//! position and cached weight into one `AggregateSignal` per symbol.
//!
//! The fold is stateless and commutative over trader updates (spec §5),
//! so it is implemented as a pure function over a snapshot of the
//! in-memory position map rather than incremental bookkeeping.

use std::collections::HashMap;

use crate::domain::{
    AggregateSignal, Direction, DirectionCounts, Position, Recommendation, Tier, TopPosition,
    TraderWeight,
};

const BUY_THRESHOLD: f64 = 0.2;
const SELL_THRESHOLD: f64 = -0.2;

/// One trader's inputs to the fold: position, weight, and tier (tier is
/// derived from weight but passed explicitly to avoid recomputing it here).
pub struct TraderInput<'a> {
    pub position: &'a Position,
    pub weight: TraderWeight,
    pub tier: Tier,
}

fn clamp01(v: f64) -> f64 {
    v.max(0.0).min(1.0)
}

/// Computes the aggregate signal for one symbol from a snapshot of all
/// tracked traders' current positions in that symbol. An empty input
/// produces the "warming" signal: NEUTRAL, confidence 0 (spec §4.3, §7).
pub fn aggregate(symbol: &str, t: i64, price_at_signal: f64, inputs: &[TraderInput<'_>]) -> AggregateSignal {
    let mut weighted_long = 0.0;
    let mut weighted_short = 0.0;
    let mut counts = DirectionCounts { long: 0, short: 0, flat: 0 };
    let mut whale_breakdown: HashMap<Tier, DirectionCounts> = HashMap::new();
    let mut top_positions: Vec<TopPosition> = Vec::new();

    for input in inputs {
        let direction = input.position.direction();
        match direction {
            Direction::Long => counts.long += 1,
            Direction::Short => counts.short += 1,
            Direction::Neutral => counts.flat += 1,
        }

        let entry = whale_breakdown.entry(input.tier).or_insert(DirectionCounts {
            long: 0,
            short: 0,
            flat: 0,
        });
        match direction {
            Direction::Long => entry.long += 1,
            Direction::Short => entry.short += 1,
            Direction::Neutral => entry.flat += 1,
        }

        if direction == Direction::Neutral {
            continue;
        }

        let size_factor = input.position.position_value / 1_000_000.0;
        let effective = input.weight.composite * size_factor;
        match direction {
            Direction::Long => weighted_long += effective,
            Direction::Short => weighted_short += effective,
            Direction::Neutral => unreachable!(),
        }

        top_positions.push(TopPosition {
            eth: input.position.eth.clone(),
            coin: input.position.coin.clone(),
            direction,
            composite_weight: input.weight.composite,
            position_value: input.position.position_value,
        });
    }

    top_positions.sort_by(|a, b| {
        b.composite_weight
            .partial_cmp(&a.composite_weight)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    top_positions.truncate(10);

    let total_weight = weighted_long + weighted_short;
    let (long_bias, short_bias) = if total_weight > 0.0 {
        (weighted_long / total_weight, weighted_short / total_weight)
    } else {
        (0.0, 0.0)
    };
    let net_bias = long_bias - short_bias;

    let rec = if net_bias > BUY_THRESHOLD {
        Recommendation::Buy
    } else if net_bias < SELL_THRESHOLD {
        Recommendation::Sell
    } else {
        Recommendation::Neutral
    };

    let active = counts.long + counts.short;
    let conf = 0.5 * net_bias.abs()
        + 0.3 * clamp01(active as f64 / 100.0)
        + 0.2 * clamp01(total_weight / 100.0);

    AggregateSignal {
        symbol: symbol.to_string(),
        t,
        rec,
        conf,
        long_bias,
        short_bias,
        net_exposure: net_bias,
        counts,
        whale_breakdown,
        top_positions,
        price_at_signal,
    }
}

/// The signal produced while the Signal System has not yet completed
/// bootstrap (spec §4.3, §7): `NEUTRAL`, confidence 0, regardless of any
/// buffered updates.
pub fn warming_signal(symbol: &str, t: i64, price_at_signal: f64) -> AggregateSignal {
    AggregateSignal {
        symbol: symbol.to_string(),
        t,
        rec: Recommendation::Neutral,
        conf: 0.0,
        long_bias: 0.0,
        short_bias: 0.0,
        net_exposure: 0.0,
        counts: DirectionCounts { long: 0, short: 0, flat: 0 },
        whale_breakdown: HashMap::new(),
        top_positions: Vec::new(),
        price_at_signal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(eth: &str, szi: f64, position_value: f64) -> Position {
        Position {
            eth: eth.to_string(),
            coin: "BTC".into(),
            szi,
            ep: 60_000.0,
            mp: 60_000.0,
            upnl: 0.0,
            lev: 5,
            liquidation_price: None,
            position_value,
            t: 0,
        }
    }

    fn weight(composite: f64) -> TraderWeight {
        TraderWeight {
            performance: 90.0,
            size: 3.0,
            recency: 1.0,
            regime: 1.0,
            composite,
        }
    }

    #[test]
    fn scenario_s1_single_whale_long() {
        let pos = position("A", 10.0, 600_000.0);
        let inputs = vec![TraderInput {
            position: &pos,
            weight: weight(0.9),
            tier: Tier::AlphaWhale,
        }];
        let signal = aggregate("BTC", 1000, 60_000.0, &inputs);
        assert_eq!(signal.rec, Recommendation::Buy);
        assert_eq!(signal.long_bias, 1.0);
        assert_eq!(signal.short_bias, 0.0);
        assert_eq!(signal.net_exposure, 1.0);
        assert_eq!(signal.counts.long, 1);
        assert_eq!(signal.counts.short, 0);
    }

    #[test]
    fn scenario_s5_two_whale_agreement() {
        let pos_a = position("A", 10.0, 1_000_000.0);
        let pos_b = position("B", 10.0, 2_000_000.0);
        let inputs = vec![
            TraderInput { position: &pos_a, weight: weight(0.9), tier: Tier::AlphaWhale },
            TraderInput { position: &pos_b, weight: weight(0.8), tier: Tier::Whale },
        ];
        let signal = aggregate("BTC", 1000, 60_000.0, &inputs);
        assert!((signal.long_bias - 1.0).abs() < 1e-9);
        assert_eq!(signal.rec, Recommendation::Buy);
        assert!((signal.conf - 0.511).abs() < 1e-3, "conf was {}", signal.conf);
    }

    #[test]
    fn bounds_hold_for_mixed_directions() {
        let pos_a = position("A", 10.0, 1_000_000.0);
        let pos_b = position("B", -5.0, 500_000.0);
        let inputs = vec![
            TraderInput { position: &pos_a, weight: weight(0.9), tier: Tier::AlphaWhale },
            TraderInput { position: &pos_b, weight: weight(0.6), tier: Tier::Standard },
        ];
        let signal = aggregate("BTC", 1000, 60_000.0, &inputs);
        assert!(signal.long_bias >= 0.0 && signal.long_bias <= 1.0);
        assert!(signal.short_bias >= 0.0 && signal.short_bias <= 1.0);
        assert!((signal.long_bias + signal.short_bias - 1.0).abs() < 1e-9);
        assert!(signal.net_exposure >= -1.0 && signal.net_exposure <= 1.0);
        assert!(signal.conf >= 0.0 && signal.conf <= 1.0);
    }

    #[test]
    fn empty_input_is_neutral_with_zero_confidence() {
        let signal = aggregate("BTC", 1000, 60_000.0, &[]);
        assert_eq!(signal.rec, Recommendation::Neutral);
        assert_eq!(signal.conf, 0.0);
    }

    #[test]
    fn warming_state_ignores_price_and_stays_neutral() {
        let signal = warming_signal("BTC", 1000, 60_000.0);
        assert_eq!(signal.rec, Recommendation::Neutral);
        assert_eq!(signal.conf, 0.0);
    }
}
