//! WebSocket transport seam.
//!
//! The connection loop talks to these traits instead of a concrete
//! `WebSocketStream`, so integration tests can drive the whole client over
//! an in-memory channel. [`WsConnector`] is the production implementation
//! over tokio-tungstenite.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};

/// Events the read half of a transport can yield.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame from the relay.
    Text(String),
    /// A ping frame; the connection loop answers with a pong.
    Ping(Bytes),
    /// The transport closed, with the close frame's code and reason when
    /// the peer sent one.
    Closed {
        code: Option<u16>,
        reason: Option<String>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket handshake failed: {0}")]
    Handshake(String),
    #[error("websocket send failed: {0}")]
    Send(String),
}

/// Write half of a transport.
#[async_trait]
pub trait TransportSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;
    async fn send_pong(&mut self, payload: Bytes) -> Result<(), TransportError>;
}

/// Read half of a transport. Returns `None` once the stream is exhausted
/// after a `Closed` event.
#[async_trait]
pub trait TransportStream: Send {
    async fn next_event(&mut self) -> Option<TransportEvent>;
}

/// A connected, not yet split, transport.
pub trait Transport: Send {
    fn split(self: Box<Self>) -> (Box<dyn TransportSink>, Box<dyn TransportStream>);
}

/// Opens transports to a relay URL.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError>;
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Production connector over tokio-tungstenite.
///
/// When `bearer` is set the HTTP upgrade request carries an
/// `Authorization: Bearer` header in addition to the in-band auth message;
/// some relay deployments gate the upgrade itself.
pub struct WsConnector {
    bearer: Option<String>,
}

impl WsConnector {
    pub fn new() -> Self {
        Self { bearer: None }
    }

    pub fn with_bearer(token: impl Into<String>) -> Self {
        Self {
            bearer: Some(token.into()),
        }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
        let ws_stream = match &self.bearer {
            Some(token) => {
                let parsed = url::Url::parse(url)
                    .map_err(|e| TransportError::Handshake(e.to_string()))?;
                let host = parsed
                    .host_str()
                    .ok_or_else(|| TransportError::Handshake("url has no host".into()))?;
                let host_header = match parsed.port() {
                    Some(port) => format!("{host}:{port}"),
                    None => host.to_string(),
                };

                let request = http::Request::builder()
                    .uri(url)
                    .header("Authorization", format!("Bearer {token}"))
                    .header(
                        "Sec-WebSocket-Key",
                        tungstenite::handshake::client::generate_key(),
                    )
                    .header("Sec-WebSocket-Version", "13")
                    .header("Connection", "Upgrade")
                    .header("Upgrade", "websocket")
                    .header("Host", host_header)
                    .body(())
                    .map_err(|e| TransportError::Handshake(e.to_string()))?;

                let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
                    .await
                    .map_err(|e| TransportError::Handshake(e.to_string()))?;
                ws_stream
            }
            None => {
                let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
                    .await
                    .map_err(|e| TransportError::Handshake(e.to_string()))?;
                ws_stream
            }
        };

        Ok(Box::new(WsTransport { ws_stream }))
    }
}

struct WsTransport {
    ws_stream: WsStream,
}

impl Transport for WsTransport {
    fn split(self: Box<Self>) -> (Box<dyn TransportSink>, Box<dyn TransportStream>) {
        let (sink, stream) = self.ws_stream.split();
        (Box::new(WsSink { sink }), Box::new(WsRead { stream }))
    }
}

struct WsSink {
    sink: futures_util::stream::SplitSink<WsStream, Message>,
}

#[async_trait]
impl TransportSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn send_pong(&mut self, payload: Bytes) -> Result<(), TransportError> {
        self.sink
            .send(Message::Pong(payload))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

struct WsRead {
    stream: futures_util::stream::SplitStream<WsStream>,
}

#[async_trait]
impl TransportStream for WsRead {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(TransportEvent::Text(text.to_string())),
                Ok(Message::Ping(data)) => return Some(TransportEvent::Ping(data)),
                Ok(Message::Close(frame)) => {
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), Some(f.reason.to_string())),
                        None => (None, None),
                    };
                    return Some(TransportEvent::Closed { code, reason });
                }
                Ok(Message::Binary(_)) => {
                    tracing::warn!("ignoring unexpected binary frame from relay");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("websocket read error: {}", e);
                    return Some(TransportEvent::Closed {
                        code: None,
                        reason: Some(e.to_string()),
                    });
                }
            }
        }
    }
}
