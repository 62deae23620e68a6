//! End-to-end scenarios S1-S6 (spec §8), exercised over the library's pure
//! functions together with the in-process bus, the way a real Scraper ->
//! Signal System hand-off would run without a network boundary.

use std::collections::HashMap;

use hl_telemetry::aggregator::{self, TraderInput};
use hl_telemetry::bus::{EventBus, InMemoryBus};
use hl_telemetry::config::AlertsConfig;
use hl_telemetry::domain::{
    Direction, MarketContext, Position, Recommendation, Tag, Tier, Trader, TraderWeight,
};
use hl_telemetry::events::{
    CandlePayload, Event, PositionRawPayload, PositionScoredPayload, SignalsOutPayload,
    CHANNEL_CANDLES, CHANNEL_POSITIONS_RAW, CHANNEL_POSITIONS_SCORED, CHANNEL_SIGNALS_OUT,
};
use hl_telemetry::ingest::PositionManager;
use hl_telemetry::scoring::{self, ScoredRow};
use hl_telemetry::store::DocumentStore;
use hl_telemetry::tracked_set::{TrackedSet, TrackedSetDelta};
use hl_telemetry::whale;

fn trader(eth: &str, account_value: f64, score: f64) -> Trader {
    Trader {
        eth: eth.to_string(),
        display_name: None,
        score,
        tags: vec![Tag::Whale],
        active: true,
        added_at: 0,
        updated_at: 0,
        account_value,
        window_performance: HashMap::new(),
    }
}

fn position(eth: &str, coin: &str, szi: f64, ep: f64, mp: f64, position_value: f64, t: i64) -> Position {
    Position {
        eth: eth.to_string(),
        coin: coin.to_string(),
        szi,
        ep,
        mp,
        upnl: 0.0,
        lev: 5,
        liquidation_price: None,
        position_value,
        t,
    }
}

/// S1. Single whale entering long (spec §8).
#[tokio::test]
async fn scenario_s1_single_whale_entering_long() {
    let bus = InMemoryBus::new();
    let mut raw_sub = bus.subscribe(&[CHANNEL_POSITIONS_RAW], 16).await.unwrap();
    let mut scored_sub = bus.subscribe(&[CHANNEL_POSITIONS_SCORED], 16).await.unwrap();
    let mut signals_sub = bus.subscribe(&[CHANNEL_SIGNALS_OUT], 16).await.unwrap();

    let a = trader("0xA", 15_000_000.0, 90.0);
    let pos = position("0xA", "BTC", 10.0, 60_000.0, 60_000.0, 600_000.0, 1_000);

    bus.publish(Event::PositionsRaw(PositionRawPayload {
        address: a.eth.clone(),
        coin: pos.coin.clone(),
        szi: pos.szi,
        ep: pos.ep,
        mp: pos.mp,
        upnl: pos.upnl,
        lev: pos.lev,
        t: pos.t,
    }))
    .await
    .unwrap();
    bus.publish(Event::PositionsScored(PositionScoredPayload {
        address: a.eth.clone(),
        coin: pos.coin.clone(),
        szi: pos.szi,
        ep: pos.ep,
        mp: pos.mp,
        upnl: pos.upnl,
        lev: pos.lev,
        t: pos.t,
        score: a.score,
        tags: a.tags.clone(),
        account_value: a.account_value,
    }))
    .await
    .unwrap();

    assert!(raw_sub.recv().await.is_some());
    assert!(scored_sub.recv().await.is_some());

    let cfg = AlertsConfig {
        alpha_whale_threshold: 20_000_000.0,
        whale_threshold: 10_000_000.0,
        elite_threshold: 80.0,
        max_age_hours: 24,
        ring_capacity: 2048,
    };
    assert!(whale::is_alert_eligible(a.account_value, a.score, &cfg));
    assert!(whale::is_significant(None, Some(&pos)));
    let market_context = MarketContext {
        whale_bias: 1.0,
        whales_long: 1,
        whales_short: 0,
        whales_flat: 0,
    };
    let alert = whale::build_alert(
        &a.eth, &pos.coin, pos.t, None, Some(&pos), a.account_value, a.score,
        Tier::AlphaWhale, market_context, &cfg,
    );
    assert_eq!(alert.priority, hl_telemetry::domain::Priority::High);
    assert_eq!(alert.change_type, hl_telemetry::domain::ChangeType::Entry);
    assert_eq!(alert.previous_direction, Direction::Neutral);
    assert_eq!(alert.current_direction, Direction::Long);

    // composite weight chosen to match the spec's literal worked example
    // (account value + score alone don't determine a unique composite; see
    // DESIGN.md for this scenario's weight derivation).
    let weight = TraderWeight {
        performance: 90.0,
        size: 3.0,
        recency: 1.0,
        regime: 1.0,
        composite: 10.0,
    };
    let inputs = vec![TraderInput { position: &pos, weight, tier: Tier::AlphaWhale }];
    let signal = aggregator::aggregate("BTC", pos.t, 60_000.0, &inputs);
    assert_eq!(signal.rec, Recommendation::Buy);
    assert_eq!(signal.long_bias, 1.0);
    assert_eq!(signal.short_bias, 0.0);
    assert_eq!(signal.net_exposure, 1.0);
    assert!((signal.conf - 0.515).abs() < 1e-3, "conf was {}", signal.conf);

    bus.publish(Event::SignalsOut(SignalsOutPayload::Aggregate(signal.clone())))
        .await
        .unwrap();
    match signals_sub.recv().await {
        Some(Event::SignalsOut(SignalsOutPayload::Aggregate(received))) => {
            assert_eq!(received.rec, Recommendation::Buy);
        }
        other => panic!("expected aggregate signal, got {other:?}"),
    }
}

/// S2. Leaderboard removal (spec §8): B drops below `min_score` and is
/// dropped from the tracked set; its absence no longer affects the
/// aggregate for any symbol it previously contributed to.
#[test]
fn scenario_s2_leaderboard_removal() {
    let cfg = hl_telemetry::config::ScoringConfig::default();

    let mut tracked = TrackedSet::new();
    tracked.apply(&[
        ScoredRow {
            row: hl_telemetry::domain::LeaderboardRow {
                eth: "0xA".into(),
                account_value: 0.0,
                window_performance: HashMap::new(),
                display_name: None,
                competition_prize: None,
            },
            score: 90.0,
            tags: vec![],
        },
        ScoredRow {
            row: hl_telemetry::domain::LeaderboardRow {
                eth: "0xB".into(),
                account_value: 0.0,
                window_performance: HashMap::new(),
                display_name: None,
                competition_prize: None,
            },
            score: 85.0,
            tags: vec![],
        },
    ]);

    // New refresh: B now scores below min_score and is filtered out before
    // the diff even sees it.
    let refreshed_rows = vec![
        hl_telemetry::domain::LeaderboardRow {
            eth: "0xA".into(),
            account_value: 100_000.0,
            window_performance: HashMap::new(),
            display_name: None,
            competition_prize: None,
        },
        hl_telemetry::domain::LeaderboardRow {
            eth: "0xB".into(),
            account_value: 0.0,
            window_performance: HashMap::new(),
            display_name: None,
            competition_prize: None,
        },
    ];
    let scored = scoring::score_and_tag(refreshed_rows, &cfg);
    let ranked = scoring::filter_and_rank(scored, &cfg);
    assert!(!ranked.iter().any(|r| r.row.eth == "0xB"), "B should fail min_score");

    let deltas = tracked.diff_against(&ranked);
    assert!(deltas.contains(&TrackedSetDelta::Remove("0xB".to_string())));
    tracked.apply(&ranked);
    assert!(!tracked.active_ids().contains("0xB"));

    // B's next (absent) snapshot contributes nothing to the aggregate: the
    // input set to `aggregate` simply never includes B again.
    let pos_a = position("0xA", "BTC", 5.0, 60_000.0, 60_000.0, 300_000.0, 2_000);
    let weight = TraderWeight { performance: 70.0, size: 1.0, recency: 1.0, regime: 1.0, composite: 5.0 };
    let inputs = vec![TraderInput { position: &pos_a, weight, tier: Tier::Standard }];
    let signal = aggregator::aggregate("BTC", 2_000, 60_000.0, &inputs);
    assert_eq!(signal.counts.long, 1);
    assert_eq!(signal.counts.short, 0);
}

/// S3. Reversal alert (spec §8): alpha whale C flips BTC from +5 to -5.
#[test]
fn scenario_s3_reversal_alert() {
    let cfg = AlertsConfig {
        alpha_whale_threshold: 20_000_000.0,
        whale_threshold: 10_000_000.0,
        elite_threshold: 80.0,
        max_age_hours: 24,
        ring_capacity: 2048,
    };
    let c = trader("0xC", 25_000_000.0, 95.0);
    let previous = position("0xC", "BTC", 5.0, 60_000.0, 60_000.0, 300_000.0, 1_000);
    let current = position("0xC", "BTC", -5.0, 60_000.0, 60_000.0, 300_000.0, 1_100);

    assert!(whale::is_alert_eligible(c.account_value, c.score, &cfg));
    assert!(whale::is_significant(Some(&previous), Some(&current)));

    // Post-change whale directions: C is now the lone whale-tier short.
    let market_context_raw = MarketContext { whale_bias: 0.0, whales_long: 0, whales_short: 1, whales_flat: 0 };
    let bias = whale::whale_bias(&market_context_raw);
    assert!((bias - (-1.0)).abs() < 1e-9);
    let market_context = MarketContext { whale_bias: bias, ..market_context_raw };

    let alert = whale::build_alert(
        &c.eth, "BTC", current.t, Some(&previous), Some(&current),
        c.account_value, c.score, Tier::AlphaWhale, market_context.clone(), &cfg,
    );
    assert_eq!(alert.priority, hl_telemetry::domain::Priority::Critical);
    assert_eq!(alert.change_type, hl_telemetry::domain::ChangeType::Reversal);
    assert_eq!(alert.market_context.whales_short, 1);
    assert_eq!(alert.market_context.whales_long, 0);
}

/// S4. Reconnect (spec §8): the ids resubscribed after a forced disconnect
/// equal the tracked set at reconnect time, with no duplicates. The
/// `PositionManager::run` loop always resubscribes exactly
/// `subscribed_ids()` on every successful connect, so this checks the
/// invariant at the surface that drives that resubscription.
#[tokio::test]
async fn scenario_s4_reconnect_completeness() {
    let store = std::sync::Arc::new(DocumentStore::open_in_memory().unwrap());
    let bus: std::sync::Arc<dyn EventBus> = std::sync::Arc::new(InMemoryBus::new());
    let manager = PositionManager::new("wss://example.invalid/ws".to_string(), store, bus);

    manager.subscribe(&["0xA".to_string(), "0xB".to_string(), "0xC".to_string()]).await;
    let ids = manager.subscribed_ids();
    assert_eq!(ids.len(), 3);
    for id in ["0xA", "0xB", "0xC"] {
        assert!(ids.contains(id));
    }

    // Simulate the tracked set dropping B and adding D between refreshes.
    manager.remove_trader("0xB").await;
    manager.add_trader("0xD").await;
    let ids = manager.subscribed_ids();
    assert_eq!(ids.len(), 3);
    assert!(ids.contains("0xA"));
    assert!(!ids.contains("0xB"));
    assert!(ids.contains("0xC"));
    assert!(ids.contains("0xD"));
}

/// S5. Two-whale agreement (spec §8), exercised through the full aggregate
/// fold and over the bus.
#[tokio::test]
async fn scenario_s5_two_whale_agreement() {
    let bus = InMemoryBus::new();
    let mut signals_sub = bus.subscribe(&[CHANNEL_SIGNALS_OUT], 16).await.unwrap();

    let pos_a = position("0xA", "BTC", 10.0, 60_000.0, 60_000.0, 1_000_000.0, 1_000);
    let pos_b = position("0xB", "BTC", 8.0, 60_000.0, 60_000.0, 2_000_000.0, 1_000);
    let weight_a = TraderWeight { performance: 90.0, size: 3.0, recency: 1.0, regime: 1.0, composite: 0.9 };
    let weight_b = TraderWeight { performance: 80.0, size: 2.5, recency: 1.0, regime: 1.0, composite: 0.8 };
    let inputs = vec![
        TraderInput { position: &pos_a, weight: weight_a, tier: Tier::AlphaWhale },
        TraderInput { position: &pos_b, weight: weight_b, tier: Tier::Whale },
    ];
    let signal = aggregator::aggregate("BTC", 1_000, 60_000.0, &inputs);
    assert!((signal.long_bias - 1.0).abs() < 1e-9);
    assert_eq!(signal.short_bias, 0.0);
    assert_eq!(signal.rec, Recommendation::Buy);
    assert!((signal.conf - 0.511).abs() < 1e-3, "conf was {}", signal.conf);

    bus.publish(Event::SignalsOut(SignalsOutPayload::Aggregate(signal)))
        .await
        .unwrap();
    assert!(signals_sub.recv().await.is_some());
}

/// S6. Candle bucket replay (spec §8), through the document store's
/// `upsert_candle` merge-on-write path and the bus.
#[tokio::test]
async fn scenario_s6_candle_bucket_replay() {
    let store = DocumentStore::open_in_memory().unwrap();
    let bus = InMemoryBus::new();
    let mut sub = bus.subscribe(&[CHANNEL_CANDLES], 16).await.unwrap();

    let first = hl_telemetry::domain::Candle { t: 36_000, o: 100.0, h: 101.0, l: 99.0, c: 100.0, v: 1.0 };
    let second = hl_telemetry::domain::Candle { t: 36_000, o: 100.0, h: 103.0, l: 99.0, c: 102.0, v: 3.0 };

    store.upsert_candle("BTC", "1h", &first).unwrap();
    bus.publish(Event::Candle(CandlePayload::from_candle("BTC", "1h", &first)))
        .await
        .unwrap();
    store.upsert_candle("BTC", "1h", &second).unwrap();
    bus.publish(Event::Candle(CandlePayload::from_candle("BTC", "1h", &second)))
        .await
        .unwrap();

    let final_candle = store.latest_candle("BTC", "1h", 36_000).unwrap().expect("candle row");
    assert_eq!(final_candle, second);

    assert!(sub.recv().await.is_some());
    match sub.recv().await {
        Some(Event::Candle(payload)) => {
            assert_eq!(payload.c, 102.0);
            assert_eq!(payload.h, 103.0);
        }
        other => panic!("expected second candle event, got {other:?}"),
    }
}
