//! Inter-service pub/sub (spec §4.3, §6).
//!
//! A single-node in-memory implementation is used for development and the
//! test suite; production wires [`RedisBus`] against an external broker.
//! Delivery is at-least-once; ordering is guaranteed only within one
//! publisher's single connection. Each subscriber drains into a bounded
//! in-process queue and drops the oldest event on overflow, incrementing a
//! monotonic counter exposed on the health surface (spec §4.3 Backpressure).

mod in_memory;
mod redis_bus;

pub use in_memory::InMemoryBus;
pub use redis_bus::RedisBus;

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::error::Result;
use crate::events::Event;

type SharedReceiver = Arc<AsyncMutex<mpsc::Receiver<Event>>>;

/// A bounded, overflow-tracking handle to one subscriber's queue.
pub struct Subscription {
    rx: SharedReceiver,
    dropped: Arc<AtomicU64>,
}

impl Subscription {
    /// Returns the sender, a handle to the same receiver shared with
    /// [`try_deliver`] (so it can evict the oldest buffered event on
    /// overflow), and the `Subscription` itself.
    pub fn new(capacity: usize) -> (mpsc::Sender<Event>, SharedReceiver, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        let rx = Arc::new(AsyncMutex::new(rx));
        (
            tx,
            rx.clone(),
            Self {
                rx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
        )
    }

    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.lock().await.recv().await
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn dropped_handle(&self) -> Arc<AtomicU64> {
        self.dropped.clone()
    }
}

/// Push `event` into `tx`. On overflow, evicts the oldest buffered event
/// before retrying rather than dropping the incoming one, incrementing the
/// monotonic drop counter (spec §4.3 Backpressure: drop oldest, not
/// newest).
pub async fn try_deliver(tx: &mpsc::Sender<Event>, rx: &SharedReceiver, dropped: &AtomicU64, event: Event) {
    if let Err(mpsc::error::TrySendError::Full(event)) = tx.try_send(event) {
        let mut guard = rx.lock().await;
        let _ = guard.try_recv();
        drop(guard);
        let _ = tx.try_send(event);
        dropped.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: Event) -> Result<()>;

    /// Subscribe to the given flat topic names, returning a bounded queue of
    /// decoded events.
    async fn subscribe(&self, channels: &[&str], queue_capacity: usize) -> Result<Subscription>;
}
