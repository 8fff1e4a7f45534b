//! WebSocket channel implementation using `tokio-tungstenite`.
//!
//! Each channel owns one WebSocket connection and carries one topic.
//! Frames are JSON text messages:
//!
//! ```text
//! { "topic": "room:42", "event": "game_action", "payload": { ... } }
//! ```
//!
//! `subscribe` and `unsubscribe` are control frames with empty payloads.
//! The write half and the read half are locked separately, so a task
//! parked in `recv` never blocks a concurrent `send`.

use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;

use crate::{Channel, ChannelId, Connector, Frame, TransportError};

/// Counter for generating unique channel IDs.
static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const SUBSCRIBE: &str = "subscribe";
const UNSUBSCRIBE: &str = "unsubscribe";

#[derive(Debug, Serialize, Deserialize)]
struct WireFrame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: serde_json::Value,
}

/// Opens [`WebSocketChannel`]s against one endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    /// `url` is a `ws://` or `wss://` endpoint of the realtime service.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Connector for WebSocketConnector {
    type Channel = WebSocketChannel;

    async fn open(&self, topic: &str) -> Result<WebSocketChannel, TransportError> {
        let (ws, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| {
                TransportError::ConnectFailed(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    e,
                ))
            })?;

        let id = ChannelId::new(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, url = %self.url, topic, "WebSocket channel opened");

        let (sink, stream) = ws.split();
        Ok(WebSocketChannel {
            id,
            topic: topic.to_string(),
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

/// A single topic carried over its own WebSocket connection.
pub struct WebSocketChannel {
    id: ChannelId,
    topic: String,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WebSocketChannel {
    async fn send_frame(
        &self,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), TransportError> {
        let frame = WireFrame {
            topic: self.topic.clone(),
            event: event.to_string(),
            payload,
        };
        let text = serde_json::to_string(&frame).map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e,
            ))
        })?;
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| {
                TransportError::SendFailed(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    e,
                ))
            })
    }
}

impl Channel for WebSocketChannel {
    async fn subscribe(&self) -> Result<(), TransportError> {
        self.send_frame(SUBSCRIBE, serde_json::Value::Null)
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))
    }

    async fn unsubscribe(&self) -> Result<(), TransportError> {
        // Best effort: the server drops the subscription with the socket
        // anyway, so a failed control frame is not worth surfacing.
        if let Err(e) = self.send_frame(UNSUBSCRIBE, serde_json::Value::Null).await {
            tracing::debug!(id = %self.id, error = %e, "unsubscribe frame not delivered");
        }
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn send(&self, event: &str, payload: &[u8]) -> Result<(), TransportError> {
        let payload: serde_json::Value = serde_json::from_slice(payload).map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e,
            ))
        })?;
        self.send_frame(event, payload).await
    }

    async fn recv(&self) -> Result<Option<Frame>, TransportError> {
        loop {
            let msg = self.stream.lock().await.next().await;
            let text = match msg {
                Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                Some(Ok(Message::Binary(data))) => {
                    String::from_utf8_lossy(&data).into_owned()
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            };

            let frame: WireFrame = match serde_json::from_str(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::debug!(id = %self.id, error = %e, "skipping malformed frame");
                    continue;
                }
            };
            if frame.topic != self.topic {
                continue;
            }
            let payload = serde_json::to_vec(&frame.payload).map_err(|e| {
                TransportError::ReceiveFailed(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    e,
                ))
            })?;
            return Ok(Some(Frame {
                event: frame.event,
                payload,
            }));
        }
    }

    fn id(&self) -> ChannelId {
        self.id
    }
}
