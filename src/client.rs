//! The client facade.
//!
//! `VoiceClient` wires the connection manager, capture engine, playback
//! scheduler and event dispatcher together behind the four public
//! commands: `start`, `stop`, `disconnect` and `playback_finished`.
//! Commands are serialized by the caller holding `&mut self`; spawned
//! tasks only touch the shared session state.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::capture::{AudioInput, CaptureEngine};
use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, LinkPhase};
use crate::dispatch::EventDispatcher;
use crate::error::{VoiceError, VoiceResult};
use crate::playback::{AudioSink, MonotonicClock, PlaybackClock, PlaybackScheduler};
use crate::protocol::{ClientEvent, ServerEvent};
use crate::session::{
    ErrorCallback, SessionShared, Speaker, StateChangeCallback, TranscriptCallback,
};
use crate::state::ConversationState;
use crate::transport::Connector;

/// Bounded depth of the server-event channel between the socket task and
/// the dispatcher.
const EVENT_CHANNEL_CAPACITY: usize = 256;

pub struct VoiceClient {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    input: Arc<dyn AudioInput>,
    shared: Arc<SessionShared>,
    playback: Arc<PlaybackScheduler>,
    connection: ConnectionManager,
    capture: CaptureEngine,
    dispatcher_task: Option<JoinHandle<()>>,
    /// Locally generated id for the current session, if any.
    session_id: Option<Uuid>,
    /// Monotonic per-session sequence for outbound audio frames.
    seq: Arc<AtomicU64>,
}

impl VoiceClient {
    pub fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        input: Arc<dyn AudioInput>,
        sink: Arc<dyn AudioSink>,
    ) -> Self {
        Self::with_clock(config, connector, input, sink, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        input: Arc<dyn AudioInput>,
        sink: Arc<dyn AudioSink>,
        clock: Arc<dyn PlaybackClock>,
    ) -> Self {
        Self {
            config,
            connector,
            input,
            shared: Arc::new(SessionShared::new()),
            playback: Arc::new(PlaybackScheduler::new(sink, clock)),
            connection: ConnectionManager::new(),
            capture: CaptureEngine::new(),
            dispatcher_task: None,
            session_id: None,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Begin (or resume) recording. Connects and authenticates first when
    /// no session is live; on an already-open session this goes straight
    /// to the microphone.
    pub async fn start(&mut self) -> VoiceResult<()> {
        // A session in Error is stale even when the link still reports
        // open (e.g. a fatal relay error event): restarting requires a
        // full teardown, not a resume.
        if self.connection.is_open() && self.shared.state() != ConversationState::Error {
            return self.begin_recording();
        }

        // Stale session leftovers from a failed or closed link
        self.teardown_session();

        self.shared.transition(|m| m.begin_connect());

        let transport = match self.connection.establish(self.connector.as_ref(), &self.config).await
        {
            Ok(t) => t,
            Err(e) => {
                self.shared.transition(|m| m.fail());
                self.shared.emit_error(&e);
                return Err(e);
            }
        };
        self.shared.transition(|m| m.socket_opened());

        let (events_tx, events_rx) = mpsc::channel::<ServerEvent>(EVENT_CHANNEL_CAPACITY);
        let ack = match self
            .connection
            .authenticate(transport, &self.config, events_tx)
            .await
        {
            Ok(ack) => ack,
            Err(e) => {
                self.shared.transition(|m| m.fail());
                self.shared.emit_error(&e);
                return Err(e);
            }
        };
        self.shared.transition(|m| m.auth_confirmed());

        self.session_id = Some(Uuid::new_v4());
        self.seq.store(0, std::sync::atomic::Ordering::Relaxed);
        self.shared.set_relay_session_id(ack.session_id);

        let outbound = self
            .connection
            .handle()
            .ok_or_else(|| VoiceError::Session("no outbound handle after auth".into()))?;

        let dispatcher = EventDispatcher::new(
            self.shared.clone(),
            self.playback.clone(),
            outbound.clone(),
            Duration::from_millis(self.config.response_grace_ms),
        );
        self.dispatcher_task = Some(dispatcher.spawn(events_rx));

        // Prompt references are withheld from the handshake and applied
        // with a follow-up update once the session exists.
        if let Some(session) = self.config.session.prompt_update_payload() {
            if let Some(prompt) = &session.prompt {
                self.shared
                    .set_pending_prompt(Some((prompt.id.clone(), prompt.version.clone())));
            }
            outbound.send(ClientEvent::SessionUpdate { session });
        }

        self.begin_recording()
    }

    /// Release the microphone, keeping the session open. Synchronous: the
    /// mic is off when this returns.
    pub fn stop(&mut self) {
        self.capture.stop(&self.shared);
        self.shared.transition(|m| m.record_stop());
    }

    /// Tear the whole session down. Idempotent.
    pub fn disconnect(&mut self) {
        self.teardown_session();
        self.shared.transition(|m| m.close());
    }

    /// Push a revised session configuration to the relay mid-session.
    /// A prompt reference in the new config goes out the same way it does
    /// on connect: withheld from the main payload, sent as a follow-up
    /// update and tracked until the relay acknowledges it.
    pub fn update_session(&mut self, config: ClientConfig) -> VoiceResult<()> {
        if !self.connection.is_open() {
            return Err(VoiceError::Session("no open session to update".into()));
        }
        let outbound = self
            .connection
            .handle()
            .ok_or_else(|| VoiceError::Session("no outbound handle".into()))?;

        outbound.send(ClientEvent::SessionUpdate {
            session: config.session.handshake_payload(),
        });
        if let Some(session) = config.session.prompt_update_payload() {
            if let Some(prompt) = &session.prompt {
                self.shared
                    .set_pending_prompt(Some((prompt.id.clone(), prompt.version.clone())));
            }
            outbound.send(ClientEvent::SessionUpdate { session });
        }
        self.config = config;
        Ok(())
    }

    /// The output device finished playing a scheduled item.
    pub fn playback_finished(&self, item_id: u64) {
        if self.playback.finish(item_id) {
            self.shared.transition(|m| m.playback_drained());
        }
    }

    pub fn conversation_state(&self) -> ConversationState {
        self.shared.state()
    }

    /// Low-level link phase, distinct from the conversation state.
    pub fn connection_state(&self) -> LinkPhase {
        self.connection.phase()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_open()
    }

    pub fn is_recording(&self) -> bool {
        self.shared.state() == ConversationState::Recording
    }

    pub fn is_speaking(&self) -> bool {
        self.shared.state() == ConversationState::Speaking
    }

    /// Input level in 0..=100, updated per captured frame.
    pub fn audio_level(&self) -> f32 {
        self.shared.audio_level()
    }

    pub fn transcript(&self, speaker: Speaker) -> String {
        self.shared.transcript(speaker)
    }

    /// Locally generated session id, present while a session is live.
    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    /// Session id assigned by the relay, when it reported one.
    pub fn relay_session_id(&self) -> Option<String> {
        self.shared.relay_session_id()
    }

    pub fn on_transcript(&self, cb: TranscriptCallback) {
        self.shared.set_transcript_callback(cb);
    }

    pub fn on_state_change(&self, cb: StateChangeCallback) {
        self.shared.set_state_change_callback(cb);
    }

    pub fn on_error(&self, cb: ErrorCallback) {
        self.shared.set_error_callback(cb);
    }

    fn begin_recording(&mut self) -> VoiceResult<()> {
        match self.shared.state() {
            ConversationState::Recording => Ok(()),
            ConversationState::Ready => {
                if self.capture.is_running() {
                    // Mic was never released (a turn just completed);
                    // flipping the state re-enables frame submission.
                    self.shared.transition(|m| m.record_start());
                    return Ok(());
                }
                // Acquire the device before committing to the transition,
                // so a permission failure leaves the session Ready.
                let source = self.input.open()?;
                self.shared.transition(|m| m.record_start());
                let outbound = self
                    .connection
                    .handle()
                    .ok_or_else(|| VoiceError::Session("no outbound handle".into()))?;
                self.capture.start(
                    source,
                    self.shared.clone(),
                    outbound,
                    self.config.frame_samples,
                    crate::config::SAMPLE_RATE,
                    self.seq.clone(),
                );
                Ok(())
            }
            state => Err(VoiceError::Session(format!(
                "cannot record while {state}"
            ))),
        }
    }

    fn teardown_session(&mut self) {
        self.capture.stop(&self.shared);
        self.playback.flush();
        if let Some(task) = self.dispatcher_task.take() {
            task.abort();
        }
        self.connection.disconnect();
        self.session_id = None;
        self.shared.set_relay_session_id(None);
        self.shared.set_pending_prompt(None);
    }
}
