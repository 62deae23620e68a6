use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::warn;

use super::{try_deliver, EventBus, Subscription};
use crate::error::{PipelineError, Result};
use crate::events::Event;

/// Production pub/sub backed by an external Redis-compatible broker (spec
/// §6). `ConnectionManager` gives us automatic reconnect on the publish
/// side; the subscribe side owns its own dedicated connection per Redis's
/// pub/sub protocol.
pub struct RedisBus {
    client: redis::Client,
    publish_conn: ConnectionManager,
}

impl RedisBus {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(PipelineError::from)?;
        let publish_conn = client
            .get_connection_manager()
            .await
            .map_err(PipelineError::from)?;
        Ok(Self {
            client,
            publish_conn,
        })
    }
}

#[async_trait]
impl EventBus for RedisBus {
    async fn publish(&self, event: Event) -> Result<()> {
        let channel = event.channel();
        let payload = serde_json::to_string(&event)?;
        let mut conn = self.publish_conn.clone();
        let _: i64 = conn
            .publish(channel, payload)
            .await
            .map_err(PipelineError::from)?;
        Ok(())
    }

    async fn subscribe(&self, channels: &[&str], queue_capacity: usize) -> Result<Subscription> {
        let conn = self
            .client
            .get_async_connection()
            .await
            .map_err(PipelineError::from)?;
        let mut pubsub = conn.into_pubsub();
        for channel in channels {
            pubsub.subscribe(*channel).await.map_err(PipelineError::from)?;
        }

        let (tx, shared_rx, sub) = Subscription::new(queue_capacity);
        let dropped = sub.dropped_handle();

        tokio::spawn(async move {
            let mut stream = pubsub.into_on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("redis bus: non-string payload: {e}");
                        continue;
                    }
                };
                match serde_json::from_str::<Event>(&payload) {
                    Ok(event) => try_deliver(&tx, &shared_rx, &dropped, event).await,
                    Err(e) => warn!("redis bus: undecodable event: {e}"),
                }
            }
        });

        Ok(sub)
    }
}
