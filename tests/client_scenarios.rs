//! End-to-end client scenarios over an in-memory transport.
//!
//! These tests drive the full pipeline: connect, auth, capture, server
//! events, playback scheduling and state transitions, with fake devices
//! and a scripted relay instead of hardware and a network. Timeout tests
//! run on tokio's paused clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_test::assert_ok;

use voicestream::capture::{AudioInput, AudioSource};
use voicestream::error::CaptureError;
use voicestream::playback::{AudioSink, PlaybackClock};
use voicestream::transport::{
    Connector, Transport, TransportError, TransportEvent, TransportSink, TransportStream,
};
use voicestream::{
    ClientConfig, ConversationState, LinkPhase, Speaker, VoiceClient, VoiceError,
};

// ---------------------------------------------------------------------------
// Fakes

/// Scripted relay endpoint. Outbound JSON is recorded; inbound events are
/// pushed through a channel by the test. The sender is swappable so a
/// reconnect gets a fresh channel into the same relay.
struct FakeRelay {
    outbound: Mutex<Vec<String>>,
    inbound_tx: Mutex<mpsc::UnboundedSender<TransportEvent>>,
}

impl FakeRelay {
    fn send(&self, event: TransportEvent) {
        let _ = self.inbound_tx.lock().send(event);
    }

    fn send_json(&self, json: &str) {
        self.send(TransportEvent::Text(json.to_string()));
    }

    fn sent_types(&self) -> Vec<String> {
        self.outbound
            .lock()
            .iter()
            .filter_map(|json| {
                serde_json::from_str::<serde_json::Value>(json)
                    .ok()
                    .and_then(|v| v["type"].as_str().map(str::to_string))
            })
            .collect()
    }
}

struct FakeTransport {
    relay: Arc<FakeRelay>,
    inbound_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl Transport for FakeTransport {
    fn split(self: Box<Self>) -> (Box<dyn TransportSink>, Box<dyn TransportStream>) {
        (
            Box::new(FakeSink { relay: self.relay }),
            Box::new(FakeStream {
                inbound_rx: self.inbound_rx,
            }),
        )
    }
}

struct FakeSink {
    relay: Arc<FakeRelay>,
}

#[async_trait]
impl TransportSink for FakeSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.relay.outbound.lock().push(text);
        Ok(())
    }

    async fn send_pong(&mut self, _payload: Bytes) -> Result<(), TransportError> {
        self.relay.outbound.lock().push("\"pong\"".to_string());
        Ok(())
    }
}

struct FakeStream {
    inbound_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl TransportStream for FakeStream {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.inbound_rx.recv().await
    }
}

/// Connector handing out one FakeTransport wired to a shared FakeRelay.
/// With `auto_auth` the relay answers the auth message immediately.
struct FakeConnector {
    relay: Arc<FakeRelay>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    auto_auth: bool,
}

impl FakeConnector {
    fn new(auto_auth: bool) -> (Arc<Self>, Arc<FakeRelay>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let relay = Arc::new(FakeRelay {
            outbound: Mutex::new(Vec::new()),
            inbound_tx: Mutex::new(inbound_tx),
        });
        let connector = Arc::new(Self {
            relay: relay.clone(),
            inbound_rx: Mutex::new(Some(inbound_rx)),
            auto_auth,
        });
        (connector, relay)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>, TransportError> {
        let inbound_rx = match self.inbound_rx.lock().take() {
            Some(rx) => rx,
            None => {
                // Reconnect: wire a fresh channel into the same relay.
                // Events queued for the previous transport are gone, like
                // frames in flight on a real torn-down socket.
                let (tx, rx) = mpsc::unbounded_channel();
                *self.relay.inbound_tx.lock() = tx;
                rx
            }
        };
        if self.auto_auth {
            self.relay
                .send_json(r#"{"type":"auth.success","session_id":"sess_42"}"#);
        }
        Ok(Box::new(FakeTransport {
            relay: self.relay.clone(),
            inbound_rx,
        }))
    }
}

/// Connector whose connect future never resolves.
struct HangingConnector;

#[async_trait]
impl Connector for HangingConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>, TransportError> {
        std::future::pending().await
    }
}

struct FakeMic;

impl AudioInput for FakeMic {
    fn open(&self) -> Result<Box<dyn AudioSource>, CaptureError> {
        Ok(Box::new(FakeMicStream))
    }
}

struct FakeMicStream;

impl AudioSource for FakeMicStream {
    fn read_frame(&mut self, max: usize) -> Result<Vec<f32>, CaptureError> {
        Ok(vec![0.25; max])
    }
}

struct DeniedMic;

impl AudioInput for DeniedMic {
    fn open(&self) -> Result<Box<dyn AudioSource>, CaptureError> {
        Err(CaptureError::PermissionDenied)
    }
}

#[derive(Default)]
struct RecordingSink {
    scheduled: Mutex<Vec<(u64, usize, Duration)>>,
    stopped: AtomicBool,
}

impl AudioSink for RecordingSink {
    fn schedule(&self, item_id: u64, samples: &[i16], start_at: Duration) {
        self.scheduled.lock().push((item_id, samples.len(), start_at));
    }

    fn stop_all(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

struct ManualClock(AtomicU64);

impl PlaybackClock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.0.load(Ordering::SeqCst))
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn test_config() -> ClientConfig {
    ClientConfig {
        relay_url: "wss://relay.test/v1/stream".to_string(),
        api_key: "test-key".to_string(),
        ..Default::default()
    }
}

fn client_with(
    connector: Arc<dyn Connector>,
    sink: Arc<RecordingSink>,
) -> VoiceClient {
    VoiceClient::with_clock(
        test_config(),
        connector,
        Arc::new(FakeMic),
        sink,
        Arc::new(ManualClock(AtomicU64::new(0))),
    )
}

/// Let spawned tasks (socket loop, dispatcher) run.
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

fn pcm_delta(samples: &[i16]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    BASE64.encode(bytes)
}

// ---------------------------------------------------------------------------
// Scenarios

/// Full happy path: connect, auth, record, server VAD turn, transcripts,
/// audio playback, and back to Ready once playback drains.
#[tokio::test]
async fn test_full_conversation_turn() {
    init_tracing();
    let (connector, relay) = FakeConnector::new(true);
    let sink = Arc::new(RecordingSink::default());
    let mut client = client_with(connector, sink.clone());

    let states: Arc<Mutex<Vec<ConversationState>>> = Arc::new(Mutex::new(Vec::new()));
    let states_sink = states.clone();
    client.on_state_change(Arc::new(move |s| states_sink.lock().push(s)));

    assert_ok!(client.start().await);
    assert!(client.is_connected());
    assert!(client.is_recording());
    assert_eq!(client.relay_session_id().as_deref(), Some("sess_42"));
    assert!(client.session_id().is_some());

    // the auth message went out first
    settle().await;
    assert_eq!(relay.sent_types()[0], "auth");

    // server VAD ends the user's turn
    relay.send_json(
        r#"{"type":"conversation.item.input_audio_buffer.speech_stopped","audio_end_ms":1800}"#,
    );
    relay.send_json(r#"{"type":"conversation.item.input_audio_buffer.committed","item_id":"it_1"}"#);
    settle().await;
    assert_eq!(client.conversation_state(), ConversationState::AwaitingResponse);

    // user transcript finalizes
    relay.send_json(
        r#"{"type":"conversation.item.input_audio_transcription.completed","transcript":"What time is it?"}"#,
    );
    settle().await;
    assert_eq!(client.transcript(Speaker::User), "What time is it?");

    // assistant responds with transcript deltas and audio
    relay.send_json(r#"{"type":"response.created","response_id":"resp_1"}"#);
    relay.send_json(r#"{"type":"response.audio_transcript.delta","delta":"It is "}"#);
    relay.send_json(r#"{"type":"response.audio_transcript.delta","delta":"noon."}"#);
    let delta = pcm_delta(&[100i16; 2400]);
    relay.send_json(&format!(r#"{{"type":"response.audio.delta","delta":"{delta}"}}"#));
    settle().await;

    assert!(client.is_speaking());
    assert_eq!(client.transcript(Speaker::Assistant), "It is noon.");
    assert_eq!(sink.scheduled.lock().len(), 1);

    // response.done alone does not end the turn while audio plays
    relay.send_json(r#"{"type":"response.audio_transcript.done","transcript":"It is noon."}"#);
    relay.send_json(r#"{"type":"response.done","response_id":"resp_1"}"#);
    settle().await;
    assert!(client.is_speaking());

    // device reports the last item finished
    let item_id = sink.scheduled.lock()[0].0;
    client.playback_finished(item_id);
    assert_eq!(client.conversation_state(), ConversationState::Ready);

    let seen = states.lock().clone();
    assert!(seen.contains(&ConversationState::Connecting));
    assert!(seen.contains(&ConversationState::Authenticating));
    assert!(seen.contains(&ConversationState::AwaitingResponse));
    assert!(seen.contains(&ConversationState::Speaking));
}

/// Consecutive audio deltas are scheduled back to back with no gap.
#[tokio::test]
async fn test_gapless_audio_scheduling() {
    let (connector, relay) = FakeConnector::new(true);
    let sink = Arc::new(RecordingSink::default());
    let mut client = client_with(connector, sink.clone());
    client.start().await.unwrap();

    relay.send_json(
        r#"{"type":"conversation.item.input_audio_buffer.speech_stopped","audio_end_ms":500}"#,
    );
    // two 100ms chunks with distinct payloads
    let a = pcm_delta(&[10i16; 2400]);
    let b = pcm_delta(&[20i16; 2400]);
    relay.send_json(&format!(r#"{{"type":"response.audio.delta","delta":"{a}"}}"#));
    relay.send_json(&format!(r#"{{"type":"response.audio.delta","delta":"{b}"}}"#));
    settle().await;

    let scheduled = sink.scheduled.lock();
    assert_eq!(scheduled.len(), 2);
    assert_eq!(scheduled[0].2, Duration::ZERO);
    assert_eq!(scheduled[1].2, Duration::from_millis(100));
}

/// A duplicate audio delta is dropped; a corrupt one is skipped without
/// killing the session.
#[tokio::test]
async fn test_duplicate_and_corrupt_deltas() {
    let (connector, relay) = FakeConnector::new(true);
    let sink = Arc::new(RecordingSink::default());
    let mut client = client_with(connector, sink.clone());
    client.start().await.unwrap();

    relay.send_json(
        r#"{"type":"conversation.item.input_audio_buffer.speech_stopped","audio_end_ms":500}"#,
    );
    let delta = pcm_delta(&[42i16; 2400]);
    let frame = format!(r#"{{"type":"response.audio.delta","delta":"{delta}"}}"#);
    relay.send_json(&frame);
    relay.send_json(&frame); // network-level duplicate
    relay.send_json(r#"{"type":"response.audio.delta","delta":"!!not-base64!!"}"#);
    let good = pcm_delta(&[43i16; 2400]);
    relay.send_json(&format!(r#"{{"type":"response.audio.delta","delta":"{good}"}}"#));
    settle().await;

    // duplicate and corrupt fragments dropped, the rest scheduled
    assert_eq!(sink.scheduled.lock().len(), 2);
    assert!(client.is_speaking());
}

/// A frame that is not valid JSON is absorbed without disturbing the
/// session.
#[tokio::test]
async fn test_malformed_frame_is_absorbed() {
    let (connector, relay) = FakeConnector::new(true);
    let sink = Arc::new(RecordingSink::default());
    let mut client = client_with(connector, sink);
    client.start().await.unwrap();

    relay.send_json("{this is not json");
    relay.send_json(r#"{"type":"some.unknown.event"}"#);
    settle().await;

    assert!(client.is_connected());
    assert!(client.is_recording());
}

/// The connect timeout fires when the socket never opens.
#[tokio::test(start_paused = true)]
async fn test_connect_timeout() {
    let sink = Arc::new(RecordingSink::default());
    let mut client = client_with(Arc::new(HangingConnector), sink);

    let err = client.start().await.unwrap_err();
    assert!(matches!(err, VoiceError::Connect(_)));
    assert_eq!(client.conversation_state(), ConversationState::Error);
}

/// The auth timeout fires independently: the socket opens fine but the
/// relay never confirms auth.
#[tokio::test(start_paused = true)]
async fn test_auth_timeout_is_independent() {
    let (connector, _relay) = FakeConnector::new(false);
    let sink = Arc::new(RecordingSink::default());
    let mut client = client_with(connector, sink);

    let err = client.start().await.unwrap_err();
    assert!(matches!(err, VoiceError::AuthTimeout(_)));
    assert_eq!(client.conversation_state(), ConversationState::Error);
}

/// An error event during the handshake is an auth rejection.
#[tokio::test]
async fn test_auth_rejection() {
    let (connector, relay) = FakeConnector::new(false);
    relay.send_json(
        r#"{"type":"error","error":{"type":"auth_error","code":"invalid_key","message":"bad key"}}"#,
    );
    let sink = Arc::new(RecordingSink::default());
    let mut client = client_with(connector, sink);

    let err = client.start().await.unwrap_err();
    match err {
        VoiceError::AuthRejected(msg) => assert_eq!(msg, "bad key"),
        other => panic!("expected AuthRejected, got {other:?}"),
    }
}

/// stop() releases the mic but keeps the session; start() resumes it
/// without reconnecting.
#[tokio::test]
async fn test_stop_keeps_session_open() {
    let (connector, relay) = FakeConnector::new(true);
    let sink = Arc::new(RecordingSink::default());
    let mut client = client_with(connector, sink);
    client.start().await.unwrap();

    client.stop();
    assert!(!client.is_recording());
    assert!(client.is_connected());
    assert_eq!(client.connection_state(), LinkPhase::Open);
    assert_eq!(client.audio_level(), 0.0);
    assert_eq!(client.conversation_state(), ConversationState::Ready);

    let handshakes = relay
        .sent_types()
        .iter()
        .filter(|t| *t == "auth")
        .count();
    client.start().await.unwrap();
    assert!(client.is_recording());
    // no second auth handshake
    assert_eq!(
        relay.sent_types().iter().filter(|t| *t == "auth").count(),
        handshakes
    );
}

/// Mid-session disconnect: playback stops, mic releases, state is Closed,
/// and a second disconnect is a no-op.
#[tokio::test]
async fn test_disconnect_mid_playback() {
    init_tracing();
    let (connector, relay) = FakeConnector::new(true);
    let sink = Arc::new(RecordingSink::default());
    let mut client = client_with(connector, sink.clone());
    assert_ok!(client.start().await);

    relay.send_json(
        r#"{"type":"conversation.item.input_audio_buffer.speech_stopped","audio_end_ms":500}"#,
    );
    let a = pcm_delta(&[7i16; 2400]);
    let b = pcm_delta(&[8i16; 2400]);
    relay.send_json(&format!(r#"{{"type":"response.audio.delta","delta":"{a}"}}"#));
    relay.send_json(&format!(r#"{{"type":"response.audio.delta","delta":"{b}"}}"#));
    settle().await;
    assert_eq!(sink.scheduled.lock().len(), 2);

    client.disconnect();
    assert!(sink.stopped.load(Ordering::SeqCst));
    assert!(!client.is_connected());
    assert_eq!(client.connection_state(), LinkPhase::Closed);
    assert_eq!(client.audio_level(), 0.0);
    assert_eq!(client.conversation_state(), ConversationState::Closed);
    assert!(client.session_id().is_none());

    client.disconnect();
    assert_eq!(client.conversation_state(), ConversationState::Closed);
}

/// A mic permission failure surfaces as an error and leaves the session
/// usable.
#[tokio::test]
async fn test_mic_permission_denied() {
    let (connector, _relay) = FakeConnector::new(true);
    let sink = Arc::new(RecordingSink::default());
    let mut client = VoiceClient::with_clock(
        test_config(),
        connector,
        Arc::new(DeniedMic),
        sink,
        Arc::new(ManualClock(AtomicU64::new(0))),
    );

    let err = client.start().await.unwrap_err();
    assert!(matches!(err, VoiceError::Capture(CaptureError::PermissionDenied)));
    // connection survived, session is Ready
    assert!(client.is_connected());
    assert_eq!(client.conversation_state(), ConversationState::Ready);
}

/// A relay error event mid-session is fatal: Error state plus one error
/// callback.
#[tokio::test]
async fn test_relay_error_is_fatal() {
    let (connector, relay) = FakeConnector::new(true);
    let sink = Arc::new(RecordingSink::default());
    let mut client = client_with(connector, sink);

    let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let errors_sink = errors.clone();
    client.on_error(Arc::new(move |e| errors_sink.lock().push(e.to_string())));

    client.start().await.unwrap();
    relay.send_json(
        r#"{"type":"error","error":{"type":"server_error","message":"session expired"}}"#,
    );
    settle().await;

    assert_eq!(client.conversation_state(), ConversationState::Error);
    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("session expired"));
}

/// After a fatal relay error the session is stale even though the socket
/// never closed: start() tears it down and reconnects instead of resuming
/// into the dead session.
#[tokio::test]
async fn test_restart_after_relay_error() {
    let (connector, relay) = FakeConnector::new(true);
    let sink = Arc::new(RecordingSink::default());
    let mut client = client_with(connector, sink);
    assert_ok!(client.start().await);

    relay.send_json(
        r#"{"type":"error","error":{"type":"server_error","message":"session expired"}}"#,
    );
    settle().await;
    assert_eq!(client.conversation_state(), ConversationState::Error);
    // the capture loop notices the dead session and zeroes the meter
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(client.audio_level(), 0.0);

    assert_ok!(client.start().await);
    assert!(client.is_recording());
    assert!(client.is_connected());
    assert_eq!(client.connection_state(), LinkPhase::Open);
    // a fresh handshake went out, not a resume over the dead link
    assert_eq!(
        relay.sent_types().iter().filter(|t| *t == "auth").count(),
        2
    );
}

/// update_session pushes the new configuration and, like connect, sends a
/// prompt reference as a separate follow-up update.
#[tokio::test]
async fn test_update_session_mid_session() {
    let (connector, relay) = FakeConnector::new(true);
    let sink = Arc::new(RecordingSink::default());
    let mut client = client_with(connector, sink);

    let mut updated = test_config();
    updated.session.voice = Some("verse".to_string());
    updated.session.prompt = Some(voicestream::PromptSource::Reference {
        id: "pr_7".to_string(),
        version: "3".to_string(),
    });

    // no open session yet
    assert!(client.update_session(updated.clone()).is_err());

    assert_ok!(client.start().await);
    assert_ok!(client.update_session(updated));
    settle().await;

    let updates: Vec<serde_json::Value> = relay
        .outbound
        .lock()
        .iter()
        .filter_map(|json| serde_json::from_str::<serde_json::Value>(json).ok())
        .filter(|v| v["type"] == "session.update")
        .collect();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0]["session"]["voice"], "verse");
    // the reference is withheld from the main payload and sent separately
    assert!(updates[0]["session"].get("prompt").is_none());
    assert_eq!(updates[1]["session"]["prompt"]["id"], "pr_7");
    assert_eq!(updates[1]["session"]["prompt"]["version"], "3");
}

/// While awaiting a response, new speech pulls the machine back to
/// Recording and the fallback nudge never fires.
#[tokio::test(start_paused = true)]
async fn test_speech_resumes_before_response() {
    let (connector, relay) = FakeConnector::new(true);
    let sink = Arc::new(RecordingSink::default());
    let mut client = client_with(connector, sink);
    client.start().await.unwrap();

    relay.send_json(r#"{"type":"conversation.item.input_audio_buffer.committed","item_id":"it_1"}"#);
    settle().await;
    assert_eq!(client.conversation_state(), ConversationState::AwaitingResponse);

    relay.send_json(
        r#"{"type":"conversation.item.input_audio_buffer.speech_started","audio_start_ms":2000}"#,
    );
    settle().await;
    assert!(client.is_recording());

    // wait out the grace window; no response.create goes out
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    settle().await;
    let nudges = relay
        .sent_types()
        .iter()
        .filter(|t| *t == "response.create")
        .count();
    assert_eq!(nudges, 0);
}

/// No response after commit within the grace window triggers exactly one
/// explicit response.create.
#[tokio::test(start_paused = true)]
async fn test_fallback_response_create_after_grace() {
    let (connector, relay) = FakeConnector::new(true);
    let sink = Arc::new(RecordingSink::default());
    let mut client = client_with(connector, sink);
    client.start().await.unwrap();

    relay.send_json(r#"{"type":"conversation.item.input_audio_buffer.committed","item_id":"it_1"}"#);
    settle().await;

    tokio::time::sleep(Duration::from_millis(2_000)).await;
    settle().await;
    let nudges = relay
        .sent_types()
        .iter()
        .filter(|t| *t == "response.create")
        .count();
    assert_eq!(nudges, 1);
}

/// response.cancelled flushes playback and returns to Ready.
#[tokio::test]
async fn test_response_cancelled_flushes_playback() {
    let (connector, relay) = FakeConnector::new(true);
    let sink = Arc::new(RecordingSink::default());
    let mut client = client_with(connector, sink.clone());
    client.start().await.unwrap();

    relay.send_json(
        r#"{"type":"conversation.item.input_audio_buffer.speech_stopped","audio_end_ms":500}"#,
    );
    let delta = pcm_delta(&[9i16; 2400]);
    relay.send_json(&format!(r#"{{"type":"response.audio.delta","delta":"{delta}"}}"#));
    settle().await;
    assert!(client.is_speaking());

    relay.send_json(r#"{"type":"response.cancelled"}"#);
    settle().await;

    assert!(sink.stopped.load(Ordering::SeqCst));
    assert_eq!(client.conversation_state(), ConversationState::Ready);
}

/// An abnormal close surfaces as an error and fails the session; a clean
/// close just closes it.
#[tokio::test]
async fn test_close_frame_handling() {
    let (connector, relay) = FakeConnector::new(true);
    let sink = Arc::new(RecordingSink::default());
    let mut client = client_with(connector, sink);

    let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let errors_sink = errors.clone();
    client.on_error(Arc::new(move |e| errors_sink.lock().push(e.to_string())));

    client.start().await.unwrap();
    relay.send(TransportEvent::Closed {
        code: Some(1011),
        reason: Some("internal error".to_string()),
    });
    settle().await;

    assert_eq!(client.conversation_state(), ConversationState::Error);
    assert!(errors.lock()[0].contains("1011"));
}

/// Captured frames reach the relay as sequenced input_audio_buffer.append
/// events while recording.
#[tokio::test(start_paused = true)]
async fn test_capture_frames_are_streamed() {
    let (connector, relay) = FakeConnector::new(true);
    let sink = Arc::new(RecordingSink::default());
    let mut client = client_with(connector, sink);
    client.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;

    let appends: Vec<serde_json::Value> = relay
        .outbound
        .lock()
        .iter()
        .filter_map(|json| serde_json::from_str::<serde_json::Value>(json).ok())
        .filter(|v| v["type"] == "input_audio_buffer.append")
        .collect();
    assert!(appends.len() >= 2);
    assert_eq!(appends[0]["seq"], 0);
    assert_eq!(appends[1]["seq"], 1);
    assert!(appends[0]["audio"].as_str().is_some_and(|a| !a.is_empty()));

    // level meter tracks the live frames
    assert!(client.audio_level() > 0.0);
}
