//! Signal System composition root (spec §1, §4.3, §4.4, §4.5, §4.6).
//!
//! Bootstraps from the Scraper's synchronous `/snapshot` endpoint, then
//! subscribes to `positions.scored` and `candles`, maintaining in-memory
//! per-trader weights and per-symbol aggregate signals entirely in process
//! memory (spec §3: this service owns no durable state).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hl_telemetry::aggregator::{self, TraderInput};
use hl_telemetry::bus::{EventBus, RedisBus};
use hl_telemetry::config::Config;
use hl_telemetry::domain::{Position, Tier, Trader, TraderWeight, Window, WindowPerformance};
use hl_telemetry::events::{
    CandlePayload, Event, PositionScoredPayload, SignalsOutPayload, CHANNEL_CANDLES,
    CHANNEL_POSITIONS_SCORED,
};
use hl_telemetry::http::{health_router, HealthRegistry, SnapshotPayload};
use hl_telemetry::weighting::{self, Regime};
use hl_telemetry::whale::{self, AlertRing};

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("hl_telemetry={level},tower_http=info").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Everything the Signal System holds about the world, entirely in memory
/// (spec §3): no collection here is ever written to disk.
struct SharedState {
    traders: RwLock<HashMap<String, Trader>>,
    positions: RwLock<HashMap<(String, String), Position>>,
    weights: RwLock<HashMap<String, (TraderWeight, Tier)>>,
    latest_price: RwLock<HashMap<String, f64>>,
    alerts: Mutex<AlertRing>,
    regime: RwLock<Regime>,
}

impl SharedState {
    fn new(alerts_cfg: &hl_telemetry::config::AlertsConfig) -> Self {
        Self {
            traders: RwLock::new(HashMap::new()),
            positions: RwLock::new(HashMap::new()),
            weights: RwLock::new(HashMap::new()),
            latest_price: RwLock::new(HashMap::new()),
            alerts: Mutex::new(AlertRing::new(alerts_cfg)),
            regime: RwLock::new(Regime::Unknown),
        }
    }

    fn refresh_weight(&self, cfg: &Config, eth: &str) -> Option<(TraderWeight, Tier)> {
        let trader = self.traders.read().get(eth).cloned()?;
        let regime = *self.regime.read();
        let weight = weighting::compute_weight(&trader, &cfg.weighting, regime);
        let tier = weighting::tier_of(&weight);
        self.weights.write().insert(eth.to_string(), (weight, tier));
        Some((weight, tier))
    }
}

async fn wait_or_shutdown(delay: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = shutdown.recv() => true,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("loading config")?;
    init_tracing(&config.log_level);
    info!("signal system starting");

    let bus: Arc<dyn EventBus> = Arc::new(
        RedisBus::connect(&config.bus.redis_url)
            .await
            .context("connecting to event bus")?,
    );
    let health = HealthRegistry::new();
    health.set_degraded("bootstrap", "warming");
    let state = Arc::new(SharedState::new(&config.alerts));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    {
        let config = config.clone();
        let bus = bus.clone();
        let state = state.clone();
        let health = health.clone();
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            run_pipeline(config, bus, state, health, &mut shutdown).await;
        });
    }

    {
        let config = config.clone();
        let state = state.clone();
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            regime_poll_loop(config.scheduler.regime_poll_seconds.max(1), state, &mut shutdown).await;
        });
    }

    let app: Router = health_router(health.clone());
    let addr = format!("{}:{}", config.api_host, config.signal_api_port);
    let listener = TcpListener::bind(&addr).await.context("binding http listener")?;
    info!(addr = %addr, "signal system http surface listening");

    tokio::spawn({
        let shutdown_tx = shutdown_tx.clone();
        async move { wait_for_shutdown_signal(&shutdown_tx).await }
    });

    let mut http_shutdown = shutdown_tx.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = http_shutdown.recv().await;
        })
        .await
        .context("http server error")?;

    Ok(())
}

async fn wait_for_shutdown_signal(shutdown_tx: &broadcast::Sender<()>) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received, draining");
        let _ = shutdown_tx.send(());
    }
}

/// The regime label is supplied by an out-of-scope external detector (spec
/// §6); this polls an env var in its place so the weighting engine still
/// exercises the regime dimension end to end.
async fn regime_poll_loop(interval_secs: u64, state: Arc<SharedState>, shutdown: &mut broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            _ = shutdown.recv() => return,
            _ = ticker.tick() => {
                let label = std::env::var("REGIME_LABEL").unwrap_or_else(|_| "unknown".to_string());
                let next = Regime::parse(&label);
                let mut current = state.regime.write();
                if *current != next {
                    info!(from = ?*current, to = ?next, "regime changed, weight cache will recompute lazily");
                    *current = next;
                }
            }
        }
    }
}

/// Bootstrap (spec §4.3): block on the Scraper's synchronous snapshot
/// endpoint before subscribing to the bus at all. Until it succeeds, the
/// Signal System has nothing to aggregate and reports degraded.
async fn bootstrap(config: &Config, state: &SharedState, health: &Arc<HealthRegistry>, shutdown: &mut broadcast::Receiver<()>) -> bool {
    let client = reqwest::Client::new();
    let url = format!("{}/snapshot", config.scraper_base_url.trim_end_matches('/'));
    let mut delay_ms = 1_000u64;

    loop {
        match client.get(&url).timeout(Duration::from_secs(10)).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<SnapshotPayload>().await {
                Ok(snapshot) => {
                    apply_snapshot(config, state, snapshot);
                    health.set_healthy("bootstrap");
                    info!("bootstrap complete");
                    return true;
                }
                Err(e) => warn!(error = %e, "bootstrap response undecodable"),
            },
            Ok(resp) => warn!(status = %resp.status(), "bootstrap snapshot call failed"),
            Err(e) => warn!(error = %e, "bootstrap snapshot call failed"),
        }
        health.set_degraded("bootstrap", "waiting for scraper snapshot");
        if wait_or_shutdown(Duration::from_millis(delay_ms), shutdown).await {
            return false;
        }
        delay_ms = (delay_ms * 2).min(30_000);
    }
}

fn apply_snapshot(config: &Config, state: &SharedState, snapshot: SnapshotPayload) {
    {
        let mut traders = state.traders.write();
        for trader in snapshot.traders {
            traders.insert(trader.eth.clone(), trader);
        }
    }
    {
        let mut positions = state.positions.write();
        for position in snapshot.positions {
            positions.insert((position.eth.clone(), position.coin.clone()), position);
        }
    }
    let ids: Vec<String> = state.traders.read().keys().cloned().collect();
    for id in ids {
        state.refresh_weight(config, &id);
    }
}

async fn run_pipeline(
    config: Config,
    bus: Arc<dyn EventBus>,
    state: Arc<SharedState>,
    health: Arc<HealthRegistry>,
    shutdown: &mut broadcast::Receiver<()>,
) {
    if !bootstrap(&config, &state, &health, shutdown).await {
        return;
    }

    let mut sub = match bus
        .subscribe(&[CHANNEL_POSITIONS_SCORED, CHANNEL_CANDLES], config.bus.subscriber_queue_capacity)
        .await
    {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "event bus subscribe failed");
            health.set_unhealthy("event_loop", e.to_string());
            return;
        }
    };
    health.set_healthy("event_loop");

    loop {
        tokio::select! {
            _ = shutdown.recv() => return,
            event = sub.recv() => {
                match event {
                    Some(Event::PositionsScored(payload)) => {
                        handle_position_scored(&config, &state, &bus, payload).await;
                    }
                    Some(Event::Candle(payload)) => {
                        handle_candle(&state, payload);
                    }
                    Some(_) => {}
                    None => {
                        warn!("event bus subscription closed");
                        health.set_unhealthy("event_loop", "subscription closed");
                        return;
                    }
                }
            }
        }
    }
}

fn upsert_trader_from_scored(state: &SharedState, payload: &PositionScoredPayload) -> Trader {
    let mut traders = state.traders.write();
    let entry = traders.entry(payload.address.clone()).or_insert_with(|| Trader {
        eth: payload.address.clone(),
        display_name: None,
        score: payload.score,
        tags: payload.tags.clone(),
        active: true,
        added_at: payload.t,
        updated_at: payload.t,
        account_value: payload.account_value,
        window_performance: HashMap::<Window, WindowPerformance>::new(),
    });
    entry.score = payload.score;
    entry.tags = payload.tags.clone();
    entry.account_value = payload.account_value;
    entry.updated_at = payload.t;
    entry.clone()
}

async fn handle_position_scored(
    config: &Config,
    state: &Arc<SharedState>,
    bus: &Arc<dyn EventBus>,
    payload: PositionScoredPayload,
) {
    let trader = upsert_trader_from_scored(state, &payload);
    let Some((_, tier)) = state.refresh_weight(config, &trader.eth) else {
        return;
    };

    let position = Position {
        eth: payload.address.clone(),
        coin: payload.coin.clone(),
        szi: payload.szi,
        ep: payload.ep,
        mp: payload.mp,
        upnl: payload.upnl,
        lev: payload.lev,
        liquidation_price: None,
        position_value: payload.szi.abs() * payload.mp,
        t: payload.t,
    };
    let key = (position.eth.clone(), position.coin.clone());
    let previous = state.positions.read().get(&key).cloned();
    state.positions.write().insert(key, position.clone());

    if whale::is_alert_eligible(trader.account_value, trader.score, &config.alerts)
        && whale::is_significant(previous.as_ref(), Some(&position))
    {
        let market_context = whale_market_context(state, &position.coin, &config.alerts);
        let alert = whale::build_alert(
            &trader.eth,
            &position.coin,
            payload.t,
            previous.as_ref(),
            Some(&position),
            trader.account_value,
            trader.score,
            tier,
            market_context,
            &config.alerts,
        );
        let inserted = state.alerts.lock().push(alert.clone());
        if inserted {
            if let Err(e) = bus.publish(Event::SignalsOut(SignalsOutPayload::Whale(alert))).await {
                error!(error = %e, "publishing whale alert failed");
            }
        }
    }

    recompute_and_publish(state, bus, &position.coin, payload.t).await;
}

/// Direction counts across every currently tracked whale position in
/// `coin` (spec §4.6 `market_context.whale_bias`). "Whale" here is the
/// alert-eligibility population (`account_value >= whale_threshold OR
/// score >= elite_threshold`), the same population `is_alert_eligible`
/// gated on above, not the §4.4 performance/size tier.
fn whale_market_context(
    state: &SharedState,
    coin: &str,
    alerts_config: &hl_telemetry::config::AlertsConfig,
) -> hl_telemetry::domain::MarketContext {
    let traders = state.traders.read();
    let (mut long, mut short, mut flat) = (0u32, 0u32, 0u32);
    for position in state.positions.read().values() {
        if position.coin != coin {
            continue;
        }
        let Some(trader) = traders.get(&position.eth) else { continue };
        if !whale::is_alert_eligible(trader.account_value, trader.score, alerts_config) {
            continue;
        }
        match position.direction() {
            hl_telemetry::domain::Direction::Long => long += 1,
            hl_telemetry::domain::Direction::Short => short += 1,
            hl_telemetry::domain::Direction::Neutral => flat += 1,
        }
    }
    let mut context = hl_telemetry::domain::MarketContext {
        whale_bias: 0.0,
        whales_long: long,
        whales_short: short,
        whales_flat: flat,
    };
    context.whale_bias = whale::whale_bias(&context);
    context
}

fn handle_candle(state: &SharedState, payload: CandlePayload) {
    state.latest_price.write().insert(payload.symbol, payload.c);
}

async fn recompute_and_publish(
    state: &Arc<SharedState>,
    bus: &Arc<dyn EventBus>,
    symbol: &str,
    t: i64,
) {
    let price = *state.latest_price.read().get(symbol).unwrap_or(&0.0);
    let owned: Vec<(Position, TraderWeight, Tier)> = {
        let weights = state.weights.read();
        state
            .positions
            .read()
            .values()
            .filter(|p| p.coin == symbol)
            .filter_map(|p| weights.get(&p.eth).map(|(w, tier)| (p.clone(), *w, *tier)))
            .collect()
    };

    let inputs: Vec<TraderInput<'_>> = owned
        .iter()
        .map(|(position, weight, tier)| TraderInput {
            position,
            weight: *weight,
            tier: *tier,
        })
        .collect();

    // The event loop only starts after bootstrap succeeds (spec §4.3), so
    // by the time this runs there is always at least an empty snapshot to
    // aggregate over; `warming_signal` only ever backs the pre-bootstrap gap.
    let signal = aggregator::aggregate(symbol, t, price, &inputs);

    if let Err(e) = bus.publish(Event::SignalsOut(SignalsOutPayload::Aggregate(signal))).await {
        error!(error = %e, symbol, "publishing aggregate signal failed");
    }
}
