//! Routes parsed server events to playback, transcripts and the state
//! machine.
//!
//! The dispatcher runs on its own task, draining the event channel the
//! socket loop feeds. Handling is synchronous per event; the only thing
//! it spawns is the fallback-response timer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::codec;
use crate::config::SAMPLE_RATE;
use crate::connection::OutboundHandle;
use crate::dedup::DeltaDeduplicator;
use crate::error::VoiceError;
use crate::playback::PlaybackScheduler;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::session::{SessionShared, Speaker};

pub struct EventDispatcher {
    shared: Arc<SessionShared>,
    playback: Arc<PlaybackScheduler>,
    dedup: DeltaDeduplicator,
    outbound: OutboundHandle,
    /// How long to wait after a committed turn before nudging the relay
    /// with an explicit `response.create`.
    grace: Duration,
}

impl EventDispatcher {
    pub fn new(
        shared: Arc<SessionShared>,
        playback: Arc<PlaybackScheduler>,
        outbound: OutboundHandle,
        grace: Duration,
    ) -> Self {
        Self {
            shared,
            playback,
            dedup: DeltaDeduplicator::new(),
            outbound,
            grace,
        }
    }

    /// Consume the event channel until it closes.
    pub fn spawn(mut self, mut events_rx: mpsc::Receiver<ServerEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                self.handle(event);
            }
            tracing::debug!("event channel closed, dispatcher exiting");
        })
    }

    fn handle(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::AuthSuccess { session_id } => {
                // Normally consumed during the handshake; harmless if it
                // reaches us again.
                if let Some(id) = session_id {
                    self.shared.set_relay_session_id(Some(id));
                }
                self.shared.transition(|m| m.auth_confirmed());
            }

            ServerEvent::SessionUpdated => {
                if let Some((id, version)) = self.shared.take_pending_prompt() {
                    tracing::info!(prompt_id = %id, %version, "prompt reference acknowledged");
                }
            }

            ServerEvent::SpeechStarted { audio_start_ms } => {
                tracing::debug!(audio_start_ms, "server vad: speech started");
                self.shared.reset_transcript(Speaker::User);
                self.shared.transition(|m| m.speech_started());
            }

            ServerEvent::SpeechStopped { audio_end_ms } => {
                tracing::debug!(audio_end_ms, "server vad: speech stopped");
                self.shared.transition(|m| m.turn_ended());
            }

            ServerEvent::BufferCommitted { item_id } => {
                tracing::debug!(?item_id, "input buffer committed");
                self.shared.transition(|m| m.turn_ended());
                self.arm_fallback_response();
            }

            ServerEvent::ResponseCreated { response_id } => {
                tracing::debug!(?response_id, "response created");
                self.shared.transition(|m| m.response_created());
            }

            ServerEvent::InputTranscriptionDelta { delta } => {
                self.shared.append_transcript(Speaker::User, &delta);
            }

            ServerEvent::InputTranscriptionCompleted { transcript } => {
                self.shared.finalize_transcript(Speaker::User, &transcript);
            }

            ServerEvent::AudioTranscriptDelta { delta } => {
                if self.begin_assistant_turn() {
                    self.shared.reset_transcript(Speaker::Assistant);
                }
                self.shared.append_transcript(Speaker::Assistant, &delta);
            }

            ServerEvent::AudioTranscriptDone { transcript } => {
                self.shared
                    .finalize_transcript(Speaker::Assistant, &transcript);
            }

            ServerEvent::AudioDelta { delta } => {
                if !self.dedup.insert(&delta) {
                    tracing::debug!("dropping duplicate audio delta");
                    return;
                }
                match codec::decode_chunk(&delta) {
                    Ok(samples) => {
                        if self.begin_assistant_turn() {
                            self.shared.reset_transcript(Speaker::Assistant);
                        }
                        self.playback.enqueue(samples, SAMPLE_RATE);
                        self.shared.transition(|m| {
                            m.audio_enqueued();
                            None
                        });
                    }
                    Err(e) => {
                        // Corrupt fragment: skip it, the stream continues
                        tracing::warn!("discarding undecodable audio delta: {}", e);
                    }
                }
            }

            ServerEvent::AudioDone => {
                tracing::debug!("audio stream complete");
            }

            ServerEvent::ResponseDone { response_id } => {
                tracing::debug!(?response_id, "response done");
                self.dedup.clear();
                self.shared.transition(|m| m.response_done());
            }

            ServerEvent::ResponseCancelled => {
                tracing::info!("response cancelled by relay");
                self.playback.flush();
                self.dedup.clear();
                self.shared.transition(|m| m.response_cancelled());
            }

            ServerEvent::Error { error } => {
                tracing::error!(code = ?error.code, "relay error: {}", error.message);
                let err = VoiceError::Session(error.message);
                self.shared.transition(|m| m.fail());
                self.shared.emit_error(&err);
            }

            ServerEvent::ConnectionClosed { code, reason } => {
                let reason = reason.unwrap_or_default();
                match code {
                    None | Some(1000) => {
                        tracing::info!("connection closed cleanly");
                        self.shared.transition(|m| m.close());
                    }
                    Some(code) => {
                        tracing::error!(code, %reason, "connection closed abnormally");
                        let err = VoiceError::Closed {
                            code: Some(code),
                            reason,
                        };
                        self.shared.transition(|m| m.fail());
                        self.shared.emit_error(&err);
                    }
                }
            }
        }
    }

    /// First delta of the assistant turn moves the machine to Speaking.
    /// Returns true when this event actually began the turn, so callers
    /// can reset the assistant transcript accumulator once.
    fn begin_assistant_turn(&self) -> bool {
        self.shared.transition(|m| m.response_began()).is_some()
    }

    /// Some relays only respond to an explicit `response.create` after a
    /// commit. Wait out the grace period; if no response appeared and the
    /// turn generation is unchanged, send the nudge.
    fn arm_fallback_response(&self) {
        let shared = self.shared.clone();
        let outbound = self.outbound.clone();
        let grace = self.grace;
        let armed_turn = shared.turn();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let still_waiting = shared.state() == crate::state::ConversationState::AwaitingResponse
                && shared.turn() == armed_turn;
            if still_waiting {
                tracing::debug!("no response after commit, sending response.create");
                outbound.send(ClientEvent::ResponseCreate);
            }
        });
    }
}
