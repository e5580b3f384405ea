//! Connection lifecycle: establish the socket, run the in-band auth
//! handshake, then pump messages both ways until disconnect.
//!
//! Establishing and authenticating are separate steps with independent
//! timeouts; a relay that accepts the TCP/WebSocket upgrade quickly but
//! stalls on auth hits the auth timeout, not the connect timeout.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::{VoiceError, VoiceResult};
use crate::protocol::{ClientEvent, ServerEvent};
use crate::transport::{Connector, Transport, TransportEvent, TransportSink, TransportStream};

/// Bounded depth of the outbound event channel. At ~170ms of audio per
/// frame this is far more headroom than a healthy link ever needs;
/// hitting the bound means the socket is wedged and dropping is correct.
pub(crate) const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// Low-level link phase, distinct from the conversation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    Closed,
    Connecting,
    AwaitingAuth,
    Open,
}

/// Cloneable handle for queueing events to the socket.
///
/// Sending is fire-and-forget: while the link is not `Open`, or the
/// channel is full, the event is dropped. Audio frames are only useful
/// live; buffering them for a dead socket would replay stale speech.
#[derive(Clone)]
pub struct OutboundHandle {
    phase: Arc<RwLock<LinkPhase>>,
    tx: mpsc::Sender<ClientEvent>,
}

impl OutboundHandle {
    pub fn is_open(&self) -> bool {
        *self.phase.read() == LinkPhase::Open
    }

    pub fn send(&self, event: ClientEvent) {
        if !self.is_open() {
            return;
        }
        if let Err(e) = self.tx.try_send(event) {
            tracing::warn!("dropping outbound event, channel unavailable: {}", e);
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(
        phase: Arc<RwLock<LinkPhase>>,
        tx: mpsc::Sender<ClientEvent>,
    ) -> Self {
        Self { phase, tx }
    }
}

/// What a successful auth handshake yields.
#[derive(Debug)]
pub struct AuthAck {
    pub session_id: Option<String>,
}

/// Owns the socket task and the outbound channel.
pub struct ConnectionManager {
    phase: Arc<RwLock<LinkPhase>>,
    outbound: Option<OutboundHandle>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            phase: Arc::new(RwLock::new(LinkPhase::Closed)),
            outbound: None,
            task: None,
        }
    }

    pub fn is_open(&self) -> bool {
        *self.phase.read() == LinkPhase::Open
    }

    pub fn phase(&self) -> LinkPhase {
        *self.phase.read()
    }

    pub fn handle(&self) -> Option<OutboundHandle> {
        self.outbound.clone()
    }

    /// Open the socket, bounded by the connect timeout.
    pub async fn establish(
        &mut self,
        connector: &dyn Connector,
        config: &ClientConfig,
    ) -> VoiceResult<Box<dyn Transport>> {
        *self.phase.write() = LinkPhase::Connecting;
        let deadline = Duration::from_millis(config.connect_timeout_ms);

        let connected = tokio::time::timeout(deadline, connector.connect(&config.relay_url)).await;
        match connected {
            Ok(Ok(transport)) => Ok(transport),
            Ok(Err(e)) => {
                *self.phase.write() = LinkPhase::Closed;
                Err(VoiceError::Connect(e.to_string()))
            }
            Err(_) => {
                *self.phase.write() = LinkPhase::Closed;
                Err(VoiceError::Connect(format!(
                    "no connection within {}ms",
                    config.connect_timeout_ms
                )))
            }
        }
    }

    /// Send the auth message and await confirmation, bounded by the auth
    /// timeout. On success the socket task is left running, parsed server
    /// events flow into `events_tx`, and [`OutboundHandle::send`] works.
    pub async fn authenticate(
        &mut self,
        transport: Box<dyn Transport>,
        config: &ClientConfig,
        events_tx: mpsc::Sender<ServerEvent>,
    ) -> VoiceResult<AuthAck> {
        let (mut sink, stream) = transport.split();

        let auth = ClientEvent::Auth {
            api_key: config.api_key.clone(),
            session: config.session.handshake_payload(),
        };
        let json = serde_json::to_string(&auth)
            .map_err(|e| VoiceError::Protocol(format!("failed to serialize auth: {e}")))?;
        sink.send_text(json)
            .await
            .map_err(|e| VoiceError::Connect(e.to_string()))?;
        *self.phase.write() = LinkPhase::AwaitingAuth;

        let (auth_tx, auth_rx) = oneshot::channel::<Result<AuthAck, VoiceError>>();
        let (out_tx, out_rx) = mpsc::channel::<ClientEvent>(OUTBOUND_CHANNEL_CAPACITY);

        let phase = self.phase.clone();
        let task = tokio::spawn(run_loop(sink, stream, out_rx, events_tx, auth_tx, phase));

        self.outbound = Some(OutboundHandle {
            phase: self.phase.clone(),
            tx: out_tx,
        });
        self.task = Some(task);

        let deadline = Duration::from_millis(config.auth_timeout_ms);
        match tokio::time::timeout(deadline, auth_rx).await {
            Ok(Ok(Ok(ack))) => Ok(ack),
            Ok(Ok(Err(e))) => {
                self.disconnect();
                Err(e)
            }
            Ok(Err(_)) => {
                self.disconnect();
                Err(VoiceError::Connect("socket closed before auth".into()))
            }
            Err(_) => {
                self.disconnect();
                Err(VoiceError::AuthTimeout(deadline))
            }
        }
    }

    /// Tear the link down. Safe to call in any phase, any number of times.
    pub fn disconnect(&mut self) {
        self.outbound = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        *self.phase.write() = LinkPhase::Closed;
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn run_loop(
    mut sink: Box<dyn TransportSink>,
    mut stream: Box<dyn TransportStream>,
    mut out_rx: mpsc::Receiver<ClientEvent>,
    events_tx: mpsc::Sender<ServerEvent>,
    auth_tx: oneshot::Sender<Result<AuthAck, VoiceError>>,
    phase: Arc<RwLock<LinkPhase>>,
) {
    let mut auth_tx = Some(auth_tx);

    loop {
        tokio::select! {
            Some(event) = out_rx.recv() => {
                let json = match serde_json::to_string(&event) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::error!("failed to serialize client event: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sink.send_text(json).await {
                    tracing::error!("websocket send failed: {}", e);
                    break;
                }
            }

            ev = stream.next_event() => {
                match ev {
                    Some(TransportEvent::Text(text)) => {
                        let event = match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(event) => event,
                            Err(e) => {
                                // Malformed frames are absorbed, not fatal
                                tracing::warn!("failed to parse server event: {} - {}", e, text);
                                continue;
                            }
                        };

                        match &event {
                            ServerEvent::AuthSuccess { session_id } => {
                                if let Some(tx) = auth_tx.take() {
                                    *phase.write() = LinkPhase::Open;
                                    let _ = tx.send(Ok(AuthAck {
                                        session_id: session_id.clone(),
                                    }));
                                }
                            }
                            ServerEvent::Error { error } if auth_tx.is_some() => {
                                // An error while auth is pending is a rejection
                                if let Some(tx) = auth_tx.take() {
                                    let _ = tx.send(Err(VoiceError::AuthRejected(
                                        error.message.clone(),
                                    )));
                                }
                                break;
                            }
                            _ => {}
                        }

                        if events_tx.send(event).await.is_err() {
                            tracing::debug!("event receiver gone, stopping socket task");
                            break;
                        }
                    }
                    Some(TransportEvent::Ping(payload)) => {
                        if let Err(e) = sink.send_pong(payload).await {
                            tracing::error!("failed to send pong: {}", e);
                        }
                    }
                    Some(TransportEvent::Closed { code, reason }) => {
                        tracing::info!(?code, ?reason, "websocket closed");
                        let _ = events_tx
                            .send(ServerEvent::ConnectionClosed { code, reason })
                            .await;
                        break;
                    }
                    None => {
                        let _ = events_tx
                            .send(ServerEvent::ConnectionClosed {
                                code: None,
                                reason: None,
                            })
                            .await;
                        break;
                    }
                }
            }

            else => break,
        }
    }

    *phase.write() = LinkPhase::Closed;
}
