//! WebSocket transport adapter
//!
//! Wraps a tokio-tungstenite client stream behind the [`Transport`] contract.
//! Unknown or malformed coordinator frames are skipped without giving up the
//! rest of the wait window; a close frame or stream end surfaces as a
//! transport failure so the session can back off.

use super::{Connector, Transport};
use crate::error::TransportError;
use crate::protocol::{decode_inbound, Inbound, Outbound};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

/// Connects to the coordinator's WebSocket endpoint.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// Validate the endpoint eagerly: a URL that can never yield a transport
    /// is a fatal configuration error, not something to retry forever.
    pub fn new(url: impl Into<String>) -> Result<Self, TransportError> {
        let url = url.into();
        let authority = url
            .strip_prefix("ws://")
            .or_else(|| url.strip_prefix("wss://"))
            .and_then(|rest| rest.split('/').next());
        match authority {
            Some(host) if !host.is_empty() => Ok(Self { url }),
            _ => Err(TransportError::Connect(format!(
                "unusable coordinator url: {url}"
            ))),
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&mut self) -> Result<Box<dyn Transport>, TransportError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        info!(url = %self.url, "connected to coordinator");
        Ok(Box::new(WsTransport { stream }))
    }
}

pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, message: &Outbound) -> Result<(), TransportError> {
        let text =
            serde_json::to_string(message).map_err(|err| TransportError::Send(err.to_string()))?;
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|err| TransportError::Send(err.to_string()))
    }

    async fn receive(&mut self, wait: Duration) -> Result<Option<Inbound>, TransportError> {
        let deadline = Instant::now() + wait;

        loop {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Ok(None);
            };

            let frame = match timeout(remaining, self.stream.next()).await {
                Err(_) => return Ok(None),
                Ok(None) => return Err(TransportError::Closed),
                Ok(Some(Err(err))) => return Err(TransportError::Receive(err.to_string())),
                Ok(Some(Ok(frame))) => frame,
            };

            match frame {
                Message::Text(text) => {
                    if let Some(message) = decode_inbound(&text) {
                        return Ok(Some(message));
                    }
                    // Unknown payloads are skipped; keep waiting.
                }
                Message::Close(_) => return Err(TransportError::Closed),
                other => debug!(?other, "ignoring non-text frame"),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
