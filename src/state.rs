//! Conversational turn-taking state machine.
//!
//! This is the single source of truth for externally observable status.
//! Every other component either reports an event here or reads a snapshot;
//! nothing else mutates the state. Transition methods return `Some(new)`
//! when the state changed so callers can notify observers, and `None` for
//! no-ops, which keeps repeated events (double record-start, a committed
//! event after speech_stopped already transitioned) harmless.

use std::fmt;

/// Externally observable conversation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    /// No session
    #[default]
    Idle,
    /// Socket opening
    Connecting,
    /// Socket open, waiting for auth confirmation
    Authenticating,
    /// Authenticated, not recording
    Ready,
    /// Microphone live, frames streaming to the relay
    Recording,
    /// Server VAD ended the turn; waiting for the response to begin
    AwaitingResponse,
    /// Assistant response playing back
    Speaking,
    /// Session-fatal error; caller must restart
    Error,
    /// Explicitly disconnected
    Closed,
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConversationState::Idle => "idle",
            ConversationState::Connecting => "connecting",
            ConversationState::Authenticating => "authenticating",
            ConversationState::Ready => "ready",
            ConversationState::Recording => "recording",
            ConversationState::AwaitingResponse => "awaiting_response",
            ConversationState::Speaking => "speaking",
            ConversationState::Error => "error",
            ConversationState::Closed => "closed",
        };
        write!(f, "{name}")
    }
}

/// The turn-taking state machine.
///
/// `Speaking -> Ready` requires two independent conditions: the relay's
/// `response.done` event *and* the playback queue draining. Audio routinely
/// outlives `response.done` by several hundred milliseconds, so neither
/// condition alone may flip the state.
#[derive(Debug)]
pub struct StateMachine {
    state: ConversationState,
    response_done: bool,
    playback_empty: bool,
    /// Turn generation counter; guards the fallback response timer so a
    /// late timer firing after the response began is a no-op.
    turn: u64,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: ConversationState::Idle,
            response_done: false,
            playback_empty: true,
            turn: 0,
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> ConversationState {
        self.state
    }

    /// Current turn generation, captured by the fallback response timer.
    pub fn turn(&self) -> u64 {
        self.turn
    }

    /// Frames may only be sent to the relay while recording.
    pub fn is_recording_eligible(&self) -> bool {
        self.state == ConversationState::Recording
    }

    /// `start()` begins connecting; permitted from scratch or after a
    /// disconnect or error.
    pub fn begin_connect(&mut self) -> Option<ConversationState> {
        match self.state {
            ConversationState::Idle | ConversationState::Closed | ConversationState::Error => {
                self.response_done = false;
                self.playback_empty = true;
                self.set(ConversationState::Connecting)
            }
            _ => None,
        }
    }

    /// Socket opened; auth message sent.
    pub fn socket_opened(&mut self) -> Option<ConversationState> {
        match self.state {
            ConversationState::Connecting => self.set(ConversationState::Authenticating),
            _ => None,
        }
    }

    /// Auth confirmation received.
    pub fn auth_confirmed(&mut self) -> Option<ConversationState> {
        match self.state {
            ConversationState::Authenticating => self.set(ConversationState::Ready),
            _ => None,
        }
    }

    /// Record-start command. Requires `Ready`; calling it again while
    /// already `Recording` is a no-op, not an error.
    pub fn record_start(&mut self) -> Option<ConversationState> {
        match self.state {
            ConversationState::Ready => self.set(ConversationState::Recording),
            _ => None,
        }
    }

    /// `stop()` released the microphone; back to `Ready` with the socket
    /// still open.
    pub fn record_stop(&mut self) -> Option<ConversationState> {
        match self.state {
            ConversationState::Recording => self.set(ConversationState::Ready),
            _ => None,
        }
    }

    /// Server VAD detected new speech. While awaiting a response this is
    /// the back-edge to `Recording` (the user resumed talking before the
    /// assistant answered).
    pub fn speech_started(&mut self) -> Option<ConversationState> {
        match self.state {
            ConversationState::AwaitingResponse => {
                self.turn += 1;
                self.set(ConversationState::Recording)
            }
            _ => None,
        }
    }

    /// Server VAD ended the turn (`speech_stopped` or `committed`,
    /// whichever arrives first; the second is a no-op).
    pub fn turn_ended(&mut self) -> Option<ConversationState> {
        match self.state {
            ConversationState::Recording => {
                self.turn += 1;
                self.response_done = false;
                self.set(ConversationState::AwaitingResponse)
            }
            _ => None,
        }
    }

    /// `response.created` arrived. No state change, but the generation
    /// bump disarms a pending fallback timer.
    pub fn response_created(&mut self) -> Option<ConversationState> {
        if self.state == ConversationState::AwaitingResponse {
            self.turn += 1;
        }
        None
    }

    /// First audio or transcript delta of the assistant turn.
    pub fn response_began(&mut self) -> Option<ConversationState> {
        match self.state {
            ConversationState::AwaitingResponse => {
                self.turn += 1;
                self.set(ConversationState::Speaking)
            }
            _ => None,
        }
    }

    /// A playback item was enqueued; the queue is no longer drained.
    pub fn audio_enqueued(&mut self) {
        self.playback_empty = false;
    }

    /// The playback queue drained.
    pub fn playback_drained(&mut self) -> Option<ConversationState> {
        self.playback_empty = true;
        self.maybe_finish_turn()
    }

    /// `response.done` arrived; playback may still be draining.
    pub fn response_done(&mut self) -> Option<ConversationState> {
        self.response_done = true;
        self.maybe_finish_turn()
    }

    /// `response.cancelled`; playback is flushed by the caller.
    pub fn response_cancelled(&mut self) -> Option<ConversationState> {
        match self.state {
            ConversationState::AwaitingResponse | ConversationState::Speaking => {
                self.playback_empty = true;
                self.set(ConversationState::Ready)
            }
            _ => None,
        }
    }

    /// Session-fatal failure.
    pub fn fail(&mut self) -> Option<ConversationState> {
        match self.state {
            ConversationState::Error | ConversationState::Closed => None,
            _ => self.set(ConversationState::Error),
        }
    }

    /// Explicit disconnect.
    pub fn close(&mut self) -> Option<ConversationState> {
        match self.state {
            ConversationState::Closed => None,
            _ => self.set(ConversationState::Closed),
        }
    }

    fn maybe_finish_turn(&mut self) -> Option<ConversationState> {
        if self.state == ConversationState::Speaking && self.response_done && self.playback_empty {
            self.set(ConversationState::Ready)
        } else {
            None
        }
    }

    fn set(&mut self, next: ConversationState) -> Option<ConversationState> {
        tracing::debug!(from = %self.state, to = %next, "conversation state transition");
        self.state = next;
        Some(next)
    }
}
