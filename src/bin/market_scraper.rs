//! Market Scraper composition root (spec §1, §4.1, §4.2).
//!
//! Owns venue ingest (positions + candles), the leaderboard scoring
//! scheduler, the document store, and the two HTTP endpoints
//! (`/health`, `/snapshot`) the Signal System depends on.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hl_telemetry::bus::{EventBus, RedisBus};
use hl_telemetry::config::Config;
use hl_telemetry::domain::{Interval, LeaderboardRow, Trader};
use hl_telemetry::events::{Event, SignalsOutPayload};
use hl_telemetry::http::{health_router, snapshot_router, HealthRegistry};
use hl_telemetry::ingest::{CandleManager, PositionManager};
use hl_telemetry::scoring::{self, ScoredRow};
use hl_telemetry::store::DocumentStore;
use hl_telemetry::tracked_set::{TrackedSet, TrackedSetDelta};
use hl_telemetry::venue::VenueRestClient;

const ALL_INTERVALS: [Interval; 6] = [
    Interval::OneMinute,
    Interval::FiveMinutes,
    Interval::FifteenMinutes,
    Interval::OneHour,
    Interval::FourHours,
    Interval::OneDay,
];
const LEADERBOARD_MAX_RETRIES: u32 = 5;

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("hl_telemetry={level},tower_http=info").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("loading config")?;
    init_tracing(&config.log_level);
    info!("market scraper starting");

    let store = Arc::new(DocumentStore::open(&config.storage).context("opening document store")?);
    let bus: Arc<dyn EventBus> = Arc::new(
        RedisBus::connect(&config.bus.redis_url)
            .await
            .context("connecting to event bus")?,
    );
    let health = HealthRegistry::new();

    let position_manager = PositionManager::new(
        config.venue.ws_url.clone(),
        store.clone(),
        bus.clone(),
    );
    let initial_ids: Vec<String> = store
        .active_traders()
        .context("loading active traders")?
        .into_iter()
        .map(|t| t.eth)
        .collect();
    position_manager.subscribe(&initial_ids).await;

    let candle_subscriptions: Vec<(String, Interval)> = ALL_INTERVALS
        .iter()
        .map(|i| (config.venue.symbol.clone(), *i))
        .collect();
    let candle_manager = CandleManager::new(
        config.venue.ws_url.clone(),
        candle_subscriptions,
        store.clone(),
        bus.clone(),
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let pm = position_manager.clone();
    let pm_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move { pm.run(pm_shutdown).await });

    let cm = candle_manager.clone();
    let cm_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move { cm.run(cm_shutdown).await });

    {
        let config = config.clone();
        let store = store.clone();
        let position_manager = position_manager.clone();
        let health = health.clone();
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            leaderboard_loop(config, store, position_manager, health, &mut shutdown).await;
        });
    }

    {
        let store = store.clone();
        let interval_secs = config.scheduler.health_check_seconds.max(1);
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            housekeeping_loop(store, interval_secs, &mut shutdown).await;
        });
    }

    {
        let store = store.clone();
        let bus = bus.clone();
        let capacity = config.bus.subscriber_queue_capacity;
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            signals_out_loop(store, bus, capacity, &mut shutdown).await;
        });
    }

    let app: Router = Router::new()
        .merge(health_router(health.clone()))
        .merge(snapshot_router(store.clone()));
    let addr = format!("{}:{}", config.api_host, config.api_port);
    let listener = TcpListener::bind(&addr).await.context("binding http listener")?;
    info!(addr = %addr, "http surface listening");

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

async fn leaderboard_loop(
    config: Config,
    store: Arc<DocumentStore>,
    position_manager: Arc<PositionManager>,
    health: Arc<HealthRegistry>,
    shutdown: &mut broadcast::Receiver<()>,
) {
    let rest = VenueRestClient::new(&config.venue.rest_url, &config.venue.leaderboard_url);
    let mut tracked = TrackedSet::new();
    let seeded: Vec<ScoredRow> = store
        .active_traders()
        .unwrap_or_default()
        .into_iter()
        .map(|t| ScoredRow {
            row: LeaderboardRow {
                eth: t.eth,
                account_value: t.account_value,
                window_performance: t.window_performance,
                display_name: t.display_name,
                competition_prize: None,
            },
            score: t.score,
            tags: t.tags,
        })
        .collect();
    tracked.apply(&seeded);

    let mut ticker = tokio::time::interval(Duration::from_secs(config.scheduler.leaderboard_refresh_seconds));
    loop {
        tokio::select! {
            _ = shutdown.recv() => return,
            _ = ticker.tick() => {
                refresh_leaderboard(&rest, &config, &store, &position_manager, &health, &mut tracked).await;
            }
        }
    }
}

async fn refresh_leaderboard(
    rest: &VenueRestClient,
    config: &Config,
    store: &Arc<DocumentStore>,
    position_manager: &Arc<PositionManager>,
    health: &Arc<HealthRegistry>,
    tracked: &mut TrackedSet,
) {
    let snapshot = match fetch_with_retry(rest).await {
        Ok(s) => s,
        Err(e) => {
            // Retries exhausted: the previous tracked set remains active,
            // no removals occur from a failed refresh (spec §4.2).
            warn!(error = %e, "leaderboard refresh exhausted retries; keeping previous tracked set");
            health.set_degraded("leaderboard_poller", e.to_string());
            return;
        }
    };

    let scored = scoring::score_and_tag(snapshot.rows.clone(), &config.scoring);
    let ranked = scoring::filter_and_rank(scored, &config.scoring);
    let deltas = tracked.diff_against(&ranked);
    let now = chrono::Utc::now().timestamp();

    for delta in &deltas {
        match delta {
            TrackedSetDelta::Add(id) => {
                position_manager.add_trader(id).await;
                info!(trader = %id, "tracked-set add");
            }
            TrackedSetDelta::Remove(id) => {
                position_manager.remove_trader(id).await;
                if let Err(e) = store.deactivate_trader(id, now) {
                    error!(error = %e, trader = %id, "deactivate_trader failed");
                }
                info!(trader = %id, "tracked-set remove");
            }
            TrackedSetDelta::Upsert(_) => {}
        }
    }

    for row in &ranked {
        let trader = Trader {
            eth: row.row.eth.clone(),
            display_name: row.row.display_name.clone(),
            score: row.score,
            tags: row.tags.clone(),
            active: true,
            added_at: now,
            updated_at: now,
            account_value: row.row.account_value,
            window_performance: row.row.window_performance.clone(),
        };
        if let Err(e) = store.upsert_trader(&trader) {
            error!(error = %e, trader = %trader.eth, "upsert_trader failed");
        }
        if let Err(e) = store.store_score(&trader.eth, now, trader.score) {
            error!(error = %e, trader = %trader.eth, "store_score failed");
        }
    }
    tracked.apply(&ranked);

    if let Ok(payload_json) = serde_json::to_string(&snapshot) {
        if let Err(e) = store.archive_leaderboard(snapshot.fetched_at, &payload_json) {
            warn!(error = %e, "archive_leaderboard failed");
        }
    }

    health.set_healthy("leaderboard_poller");
    info!(tracked = ranked.len(), "leaderboard refresh complete");
}

/// Capped exponential backoff over the leaderboard fetch (spec §4.2:
/// "retried with capped exponential backoff up to max_retries").
async fn fetch_with_retry(
    rest: &VenueRestClient,
) -> hl_telemetry::Result<hl_telemetry::domain::LeaderboardSnapshot> {
    let mut delay_ms = 1_000u64;
    let mut last_err = None;
    for attempt in 0..LEADERBOARD_MAX_RETRIES {
        match rest.leaderboard().await {
            Ok(snapshot) => return Ok(snapshot),
            Err(e) => {
                warn!(attempt, error = %e, "leaderboard fetch failed");
                last_err = Some(e);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(30_000);
            }
        }
    }
    Err(last_err.expect("loop runs at least once"))
}

/// Persists the Signal System's output back into the document store (spec
/// §4.3: `signals.out` exists so the Scraper — the sole owner of durable
/// state — can archive signals and whale alerts the Signal System itself
/// only ever holds in memory).
async fn signals_out_loop(
    store: Arc<DocumentStore>,
    bus: Arc<dyn EventBus>,
    queue_capacity: usize,
    shutdown: &mut broadcast::Receiver<()>,
) {
    let mut sub = match bus.subscribe(&[hl_telemetry::events::CHANNEL_SIGNALS_OUT], queue_capacity).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "signals.out subscribe failed; persistence disabled");
            return;
        }
    };
    loop {
        tokio::select! {
            _ = shutdown.recv() => return,
            event = sub.recv() => {
                match event {
                    Some(Event::SignalsOut(SignalsOutPayload::Aggregate(signal))) => {
                        if let Err(e) = store.store_signal(&signal.symbol, signal.t, &signal) {
                            error!(error = %e, symbol = %signal.symbol, "store_signal failed");
                        }
                    }
                    Some(Event::SignalsOut(SignalsOutPayload::Whale(alert))) => {
                        if let Err(e) = store.store_trader_signal(&alert.eth, alert.t, &alert) {
                            error!(error = %e, trader = %alert.eth, "store_trader_signal failed");
                        }
                    }
                    Some(_) => {}
                    None => return,
                }
            }
        }
    }
}

async fn housekeeping_loop(store: Arc<DocumentStore>, interval_secs: u64, shutdown: &mut broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            _ = shutdown.recv() => return,
            _ = ticker.tick() => {
                let now = chrono::Utc::now().timestamp();
                if let Err(e) = store.prune_expired(now) {
                    warn!(error = %e, "ttl sweep failed");
                }
            }
        }
    }
}

