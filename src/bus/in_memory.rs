use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

use super::{try_deliver, EventBus, Subscription};
use crate::error::Result;
use crate::events::Event;

/// Single-node in-process bus for development and tests: a `broadcast`
/// channel per process, matching the teacher's fan-out idiom in `main.rs`.
pub struct InMemoryBus {
    tx: broadcast::Sender<Event>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(10_000);
        Self { tx }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, event: Event) -> Result<()> {
        // No active subscribers is not an error: the publisher does not
        // block on consumers (spec §4.3).
        let _ = self.tx.send(event);
        Ok(())
    }

    async fn subscribe(&self, channels: &[&str], queue_capacity: usize) -> Result<Subscription> {
        let channels: Vec<String> = channels.iter().map(|s| s.to_string()).collect();
        let mut rx = self.tx.subscribe();
        let (tx, shared_rx, sub) = Subscription::new(queue_capacity);
        let dropped = sub.dropped_handle();
        let forward_tx = Arc::new(Mutex::new(tx));

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if channels.iter().any(|c| c == event.channel()) {
                            let tx = forward_tx.lock().await;
                            try_deliver(&tx, &shared_rx, &dropped, event).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(sub)
    }
}
