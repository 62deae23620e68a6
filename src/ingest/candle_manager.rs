//! Candle WS Manager (spec §4.1, §3).
//!
//! Mirrors [`crate::ingest::position_manager::PositionManager`]'s
//! reconnect/backoff shape for the `candle` subscription, over a fixed
//! set of `(coin, interval)` pairs configured at startup rather than a
//! dynamically diffed trader set.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::domain::Interval;
use crate::error::Result;
use crate::events::{CandlePayload, Event};
use crate::ingest::session::{BackoffConfig, Session, SessionState};
use crate::store::DocumentStore;
use crate::venue::{decode_candle, Subscription, VenueWsClient, WsEnvelope};

async fn wait_or_shutdown(delay: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = shutdown.recv() => true,
    }
}

pub struct CandleManager {
    ws_url: String,
    subscriptions: Vec<(String, Interval)>,
    store: Arc<DocumentStore>,
    bus: Arc<dyn EventBus>,
    session: Session,
}

impl CandleManager {
    pub fn new(
        ws_url: String,
        subscriptions: Vec<(String, Interval)>,
        store: Arc<DocumentStore>,
        bus: Arc<dyn EventBus>,
    ) -> Arc<Self> {
        Arc::new(Self {
            ws_url,
            subscriptions,
            store,
            bus,
            session: Session::new(BackoffConfig::default(), 0xC4DE),
        })
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    async fn handle_envelope(&self, env: &WsEnvelope) -> Result<()> {
        let raw = decode_candle(env)?;
        let Some(interval) = Interval::parse(&raw.interval) else {
            debug!(interval = %raw.interval, "unrecognized candle interval, dropping");
            return Ok(());
        };
        let symbol = raw.symbol.clone();
        let candle = raw.into_candle(interval);
        self.store.upsert_candle(&symbol, interval.as_str(), &candle)?;

        self.bus
            .publish(Event::Candle(CandlePayload::from_candle(
                &symbol,
                interval.as_str(),
                &candle,
            )))
            .await?;
        Ok(())
    }

    /// Runs the reconnect loop until `shutdown` fires.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        'outer: loop {
            self.session.set_state(SessionState::Connecting);
            let mut client = match VenueWsClient::connect(&self.ws_url).await {
                Ok(c) => c,
                Err(e) => {
                    error!(error = %e, "candle ws connect failed");
                    let delay = self.session.on_failure();
                    if wait_or_shutdown(delay, &mut shutdown).await {
                        break 'outer;
                    }
                    continue;
                }
            };

            self.session.set_state(SessionState::Subscribing);
            let mut subscribe_failed = false;
            for (coin, interval) in &self.subscriptions {
                if client
                    .subscribe(Subscription::Candle {
                        coin: coin.clone(),
                        interval: interval.as_str().to_string(),
                    })
                    .await
                    .is_err()
                {
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
            info!(count = self.subscriptions.len(), "candle manager streaming");

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        self.session.set_state(SessionState::Shutdown);
                        let _ = client.close().await;
                        break 'outer;
                    }
                    envelope = client.next_envelope() => {
                        match envelope {
                            Ok(Some(env)) if env.channel == "candle" => {
                                if let Err(e) = self.handle_envelope(&env).await {
                                    debug!(error = %e, "dropping unparseable candle envelope");
                                }
                            }
                            Ok(Some(_)) => {}
                            Ok(None) => {
                                warn!("venue closed candle ws");
                                break;
                            }
                            Err(e) => {
                                warn!(error = %e, "candle ws read error");
                                break;
                            }
                        }
                    }
                }
            }

            let delay = self.session.on_failure();
            if wait_or_shutdown(delay, &mut shutdown).await {
                break 'outer;
            }
        }
    }
}
