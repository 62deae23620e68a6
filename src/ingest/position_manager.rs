//! Position Subscription Manager (spec §4.1).
//!
//! One long-lived WS connection multiplexes every tracked trader's
//! `webData2` subscription. Persistence is event-driven: a snapshot is
//! only written and published when the `(szi, leverage, entry price)`
//! tuple actually changed from the last stored one for that
//! `(trader, coin)` pair — the "85% reduction" invariant.
//!
//! Grounded on the teacher's `scrapers/binance_session.rs` reconnect
//! loop, generalized from Binance's single-stream model to
//! Hyperliquid's subscribe/unsubscribe-per-id multiplexed one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::domain::Position;
use crate::error::Result;
use crate::events::{Event, PositionRawPayload, PositionScoredPayload};
use crate::ingest::session::{BackoffConfig, Session, SessionState};
use crate::store::DocumentStore;
use crate::venue::{decode_web_data2, Subscription, VenueWsClient, WsEnvelope};

/// Rolling-window reject count at which a trader is reported degraded
/// without being dropped from the subscribed set (spec §4.1).
const DEGRADED_REJECT_THRESHOLD: u32 = 5;
const DRAIN_DEADLINE: Duration = Duration::from_secs(5);

enum Command {
    Subscribe(Vec<String>),
    AddTrader(String),
    RemoveTrader(String),
}

#[derive(Default)]
struct RejectCounters {
    counts: HashMap<String, u32>,
}

impl RejectCounters {
    fn record_failure(&mut self, id: &str) {
        *self.counts.entry(id.to_string()).or_insert(0) += 1;
    }

    fn record_success(&mut self, id: &str) {
        self.counts.remove(id);
    }

    fn is_degraded(&self, id: &str) -> bool {
        self.counts.get(id).copied().unwrap_or(0) >= DEGRADED_REJECT_THRESHOLD
    }
}

pub struct PositionManager {
    ws_url: String,
    store: Arc<DocumentStore>,
    bus: Arc<dyn EventBus>,
    session: Session,
    subscribed: Mutex<HashSet<String>>,
    buffered: Mutex<HashMap<(String, String), Position>>,
    rejects: Mutex<RejectCounters>,
    commands_tx: mpsc::Sender<Command>,
    commands_rx: Mutex<Option<mpsc::Receiver<Command>>>,
}

async fn wait_or_shutdown(delay: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = shutdown.recv() => true,
    }
}

impl PositionManager {
    pub fn new(ws_url: String, store: Arc<DocumentStore>, bus: Arc<dyn EventBus>) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(256);
        Arc::new(Self {
            ws_url,
            store,
            bus,
            session: Session::new(BackoffConfig::default(), 0xA5F3),
            subscribed: Mutex::new(HashSet::new()),
            buffered: Mutex::new(HashMap::new()),
            rejects: Mutex::new(RejectCounters::default()),
            commands_tx: tx,
            commands_rx: Mutex::new(Some(rx)),
        })
    }

    /// Bulk subscribe at startup; idempotent per id (spec §4.1 `Subscribe`).
    pub async fn subscribe(&self, ids: &[String]) {
        self.subscribed.lock().extend(ids.iter().cloned());
        let _ = self.commands_tx.send(Command::Subscribe(ids.to_vec())).await;
    }

    pub async fn add_trader(&self, id: &str) {
        self.subscribed.lock().insert(id.to_string());
        let _ = self.commands_tx.send(Command::AddTrader(id.to_string())).await;
    }

    pub async fn remove_trader(&self, id: &str) {
        self.subscribed.lock().remove(id);
        let _ = self.commands_tx.send(Command::RemoveTrader(id.to_string())).await;
    }

    /// Current buffered position set for one trader (spec §4.1 `Snapshot`).
    pub fn snapshot(&self, id: &str) -> Vec<Position> {
        self.buffered
            .lock()
            .iter()
            .filter(|((eth, _), _)| eth == id)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn is_degraded(&self, id: &str) -> bool {
        self.rejects.lock().is_degraded(id)
    }

    /// The ids resubscribed on every reconnect (spec §8 invariant 6): the
    /// `run()` loop always subscribes exactly this set after a successful
    /// connect, so this is the surface the reconnect-completeness property
    /// is checked against.
    pub fn subscribed_ids(&self) -> HashSet<String> {
        self.subscribed.lock().clone()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    async fn handle_envelope(&self, env: &WsEnvelope) -> Result<()> {
        let raw = decode_web_data2(env)?;
        let Some(eth) = raw.user else { return Ok(()) };
        let now = chrono::Utc::now().timestamp();

        for asset in raw.clearinghouse_state.asset_positions {
            let pos = asset.position;
            let mp = pos.mark_price();
            let key = (pos.szi, pos.leverage.value, pos.entry_px);
            let previous = self.store.last_position_key(&eth, &pos.coin)?;
            if previous == Some(key) {
                // Unchanged since last stored snapshot for this (trader, coin):
                // skip both persistence and publication.
                continue;
            }

            let payload = PositionRawPayload {
                address: eth.clone(),
                coin: pos.coin.clone(),
                szi: pos.szi,
                ep: pos.entry_px,
                mp,
                upnl: pos.unrealized_pnl,
                lev: pos.leverage.value,
                t: now,
            };
            self.store.upsert_position(&payload)?;

            let domain_position = Position {
                eth: eth.clone(),
                coin: pos.coin.clone(),
                szi: pos.szi,
                ep: pos.entry_px,
                mp,
                upnl: pos.unrealized_pnl,
                lev: pos.leverage.value,
                liquidation_price: pos.liquidation_px.as_deref().and_then(|s| s.parse().ok()),
                position_value: pos.position_value,
                t: now,
            };
            self.buffered
                .lock()
                .insert((eth.clone(), pos.coin.clone()), domain_position);

            if let Ok(Some(trader)) = self.store.get_trader(&eth) {
                // `positions.scored` carries the trader's score/tags as of
                // emission time (spec §4.3); a trader not yet scored (e.g.
                // a subscription predating its first leaderboard refresh)
                // simply has no scored event this cycle.
                self.bus
                    .publish(Event::PositionsScored(PositionScoredPayload {
                        address: payload.address.clone(),
                        coin: payload.coin.clone(),
                        szi: payload.szi,
                        ep: payload.ep,
                        mp: payload.mp,
                        upnl: payload.upnl,
                        lev: payload.lev,
                        t: payload.t,
                        score: trader.score,
                        tags: trader.tags,
                        account_value: trader.account_value,
                    }))
                    .await?;
            }
            self.bus.publish(Event::PositionsRaw(payload)).await?;
            self.rejects.lock().record_success(&eth);
        }
        Ok(())
    }

    async fn drain_and_close(&self, client: &mut VenueWsClient, rx: &mut mpsc::Receiver<Command>) {
        let deadline = tokio::time::Instant::now() + DRAIN_DEADLINE;
        while tokio::time::Instant::now() < deadline {
            match timeout(Duration::from_millis(50), rx.recv()).await {
                Ok(Some(Command::RemoveTrader(id))) => {
                    let _ = client.unsubscribe(Subscription::WebData2 { user: id }).await;
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            }
        }
        let _ = client.close().await;
    }

    /// Runs the reconnect loop until `shutdown` fires. Intended to be
    /// spawned as its own task by the composition root.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut rx = self.commands_rx.lock().take().expect("run() called once");

        'outer: loop {
            self.session.set_state(SessionState::Connecting);
            let mut client = match VenueWsClient::connect(&self.ws_url).await {
                Ok(c) => c,
                Err(e) => {
                    error!(error = %e, "position ws connect failed");
                    let delay = self.session.on_failure();
                    if wait_or_shutdown(delay, &mut shutdown).await {
                        break 'outer;
                    }
                    continue;
                }
            };

            self.session.set_state(SessionState::Subscribing);
            let ids: Vec<String> = self.subscribed.lock().iter().cloned().collect();
            let mut subscribe_failed = false;
            for id in &ids {
                if client
                    .subscribe(Subscription::WebData2 { user: id.clone() })
                    .await
                    .is_err()
                {
                    self.rejects.lock().record_failure(id);
                    subscribe_failed = true;
                    break;
                }
            }
            if subscribe_failed {
                let delay = self.session.on_failure();
                if wait_or_shutdown(delay, &mut shutdown).await {
                    break 'outer;
                }
                continue;
            }

            self.session.on_connect_success();
            info!(count = ids.len(), "position manager streaming");

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        self.session.set_state(SessionState::Shutdown);
                        self.drain_and_close(&mut client, &mut rx).await;
                        break 'outer;
                    }
                    cmd = rx.recv() => {
                        match cmd {
                            Some(Command::AddTrader(id)) => {
                                let _ = client.subscribe(Subscription::WebData2 { user: id }).await;
                            }
                            Some(Command::RemoveTrader(id)) => {
                                let _ = client
                                    .unsubscribe(Subscription::WebData2 { user: id.clone() })
                                    .await;
                                self.buffered.lock().retain(|(eth, _), _| eth != &id);
                            }
                            Some(Command::Subscribe(ids)) => {
                                for id in ids {
                                    let _ = client.subscribe(Subscription::WebData2 { user: id }).await;
                                }
                            }
                            None => {}
                        }
                    }
                    envelope = client.next_envelope() => {
                        match envelope {
                            Ok(Some(env)) if env.channel == "webData2" => {
                                if let Err(e) = self.handle_envelope(&env).await {
                                    debug!(error = %e, "dropping unparseable webData2 envelope");
                                }
                            }
                            Ok(Some(_)) => {}
                            Ok(None) => {
                                warn!("venue closed position ws");
                                break;
                            }
                            Err(e) => {
                                warn!(error = %e, "position ws read error");
                                break;
                            }
                        }
                    }
                }
            }

            // Any buffered-but-unpersisted snapshot from mid-gap is discarded
            // by construction: the next webData2 snapshot per trader is
            // authoritative and simply overwrites it (spec §4.1).
            let delay = self.session.on_failure();
            if wait_or_shutdown(delay, &mut shutdown).await {
                break 'outer;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_counters_mark_degraded_after_threshold() {
        let mut counters = RejectCounters::default();
        for _ in 0..4 {
            counters.record_failure("0xA");
        }
        assert!(!counters.is_degraded("0xA"));
        counters.record_failure("0xA");
        assert!(counters.is_degraded("0xA"));
        counters.record_success("0xA");
        assert!(!counters.is_degraded("0xA"));
    }
}
