use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::error::{PipelineError, Result};

use super::types::{Outgoing, RawCandle, RawWebData2, Subscription, WsEnvelope};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A single WebSocket connection to the venue. Reconnection, backoff and
/// re-subscription are the ingest managers' job; this type only knows how
/// to speak the wire protocol over one live socket.
pub struct VenueWsClient {
    socket: Socket,
}

impl VenueWsClient {
    pub async fn connect(url: &str) -> Result<Self> {
        let (socket, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| PipelineError::Transport(format!("ws connect to {url}: {e}")))?;
        Ok(Self { socket })
    }

    pub async fn subscribe(&mut self, subscription: Subscription) -> Result<()> {
        self.send(Outgoing::Subscribe { subscription }).await
    }

    pub async fn unsubscribe(&mut self, subscription: Subscription) -> Result<()> {
        self.send(Outgoing::Unsubscribe { subscription }).await
    }

    async fn send(&mut self, frame: Outgoing) -> Result<()> {
        let text = serde_json::to_string(&frame)?;
        trace!(frame = %text, "ws send");
        self.socket
            .send(Message::Text(text))
            .await
            .map_err(|e| PipelineError::Transport(format!("ws send: {e}")))
    }

    /// Reads the next application message, transparently answering pings.
    /// Returns `Ok(None)` once the peer has closed the connection.
    pub async fn next_envelope(&mut self) -> Result<Option<WsEnvelope>> {
        loop {
            let msg = match self.socket.next().await {
                Some(Ok(m)) => m,
                Some(Err(e)) => return Err(PipelineError::Transport(format!("ws read: {e}"))),
                None => return Ok(None),
            };

            match msg {
                Message::Text(text) => {
                    let envelope: WsEnvelope = serde_json::from_str(&text)?;
                    return Ok(Some(envelope));
                }
                Message::Ping(payload) => {
                    self.socket
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|e| PipelineError::Transport(format!("ws pong: {e}")))?;
                }
                Message::Close(frame) => {
                    debug!(?frame, "ws closed by peer");
                    return Ok(None);
                }
                Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {}
            }
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        self.socket
            .close(None)
            .await
            .map_err(|e| PipelineError::Transport(format!("ws close: {e}")))
    }
}

/// Decodes a `webData2` channel envelope's `data` field.
pub fn decode_web_data2(envelope: &WsEnvelope) -> Result<RawWebData2> {
    serde_json::from_value(envelope.data.clone()).map_err(PipelineError::from)
}

/// Decodes a `candle` channel envelope's `data` field.
pub fn decode_candle(envelope: &WsEnvelope) -> Result<RawCandle> {
    serde_json::from_value(envelope.data.clone()).map_err(PipelineError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_web_data2_envelope() {
        let envelope = WsEnvelope {
            channel: "webData2".to_string(),
            data: json!({
                "user": "0xabc",
                "clearinghouseState": {
                    "assetPositions": []
                }
            }),
        };
        let raw = decode_web_data2(&envelope).unwrap();
        assert_eq!(raw.user.as_deref(), Some("0xabc"));
        assert!(raw.clearinghouse_state.asset_positions.is_empty());
    }

    #[test]
    fn decodes_candle_envelope() {
        let envelope = WsEnvelope {
            channel: "candle".to_string(),
            data: json!({
                "t": 1000, "T": 1060, "s": "BTC", "i": "1m",
                "o": "100.0", "h": "101.0", "l": "99.0", "c": "100.5", "v": "2.0"
            }),
        };
        let raw = decode_candle(&envelope).unwrap();
        assert_eq!(raw.symbol, "BTC");
        assert_eq!(raw.open, 100.0);
    }
}
