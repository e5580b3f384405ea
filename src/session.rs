//! Shared observable session state and callback registry.
//!
//! One `Arc<SessionShared>` is threaded through the capture task, the
//! event dispatcher and the client facade. Locks are parking_lot and are
//! never held across an await point; callbacks are invoked after the
//! relevant lock is released.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::error::VoiceError;
use crate::state::{ConversationState, StateMachine};

/// Who produced a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "user"),
            Speaker::Assistant => write!(f, "assistant"),
        }
    }
}

/// A transcript notification. `text` is the full accumulated text so
/// far, not the delta; `is_final` marks the completed utterance.
#[derive(Debug, Clone)]
pub struct TranscriptUpdate {
    pub speaker: Speaker,
    pub text: String,
    pub is_final: bool,
}

pub type TranscriptCallback = Arc<dyn Fn(TranscriptUpdate) + Send + Sync>;
pub type StateChangeCallback = Arc<dyn Fn(ConversationState) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&VoiceError) + Send + Sync>;

#[derive(Default)]
struct Transcripts {
    user: String,
    assistant: String,
}

#[derive(Default)]
struct Callbacks {
    transcript: Option<TranscriptCallback>,
    state_change: Option<StateChangeCallback>,
    error: Option<ErrorCallback>,
}

/// State observable while a session runs.
pub struct SessionShared {
    machine: Mutex<StateMachine>,
    transcripts: Mutex<Transcripts>,
    /// f32 level in 0..=100, stored as bits for lock-free reads.
    audio_level_bits: AtomicU32,
    relay_session_id: Mutex<Option<String>>,
    /// Prompt reference sent in a session.update and not yet acknowledged.
    pending_prompt: Mutex<Option<(String, String)>>,
    callbacks: Mutex<Callbacks>,
}

impl SessionShared {
    pub fn new() -> Self {
        Self {
            machine: Mutex::new(StateMachine::new()),
            transcripts: Mutex::new(Transcripts::default()),
            audio_level_bits: AtomicU32::new(0f32.to_bits()),
            relay_session_id: Mutex::new(None),
            pending_prompt: Mutex::new(None),
            callbacks: Mutex::new(Callbacks::default()),
        }
    }

    /// Apply a transition to the state machine; if the state changed,
    /// invoke the state-change callback outside the lock.
    pub fn transition<F>(&self, f: F) -> Option<ConversationState>
    where
        F: FnOnce(&mut StateMachine) -> Option<ConversationState>,
    {
        let changed = f(&mut self.machine.lock());
        if let Some(state) = changed {
            let cb = self.callbacks.lock().state_change.clone();
            if let Some(cb) = cb {
                cb(state);
            }
        }
        changed
    }

    pub fn state(&self) -> ConversationState {
        self.machine.lock().state()
    }

    pub fn turn(&self) -> u64 {
        self.machine.lock().turn()
    }

    pub fn is_recording_eligible(&self) -> bool {
        self.machine.lock().is_recording_eligible()
    }

    pub fn audio_level(&self) -> f32 {
        f32::from_bits(self.audio_level_bits.load(Ordering::Relaxed))
    }

    pub fn set_audio_level(&self, level: f32) {
        self.audio_level_bits
            .store(level.to_bits(), Ordering::Relaxed);
    }

    pub fn transcript(&self, speaker: Speaker) -> String {
        let t = self.transcripts.lock();
        match speaker {
            Speaker::User => t.user.clone(),
            Speaker::Assistant => t.assistant.clone(),
        }
    }

    /// Reset the accumulator for a new utterance.
    pub fn reset_transcript(&self, speaker: Speaker) {
        let mut t = self.transcripts.lock();
        match speaker {
            Speaker::User => t.user.clear(),
            Speaker::Assistant => t.assistant.clear(),
        }
    }

    /// Append a delta and notify with the accumulated text.
    pub fn append_transcript(&self, speaker: Speaker, delta: &str) {
        let text = {
            let mut t = self.transcripts.lock();
            let acc = match speaker {
                Speaker::User => &mut t.user,
                Speaker::Assistant => &mut t.assistant,
            };
            acc.push_str(delta);
            acc.clone()
        };
        self.emit_transcript(TranscriptUpdate {
            speaker,
            text,
            is_final: false,
        });
    }

    /// Replace the accumulator with the server's authoritative full text
    /// and notify with `is_final` set.
    pub fn finalize_transcript(&self, speaker: Speaker, full: &str) {
        {
            let mut t = self.transcripts.lock();
            match speaker {
                Speaker::User => t.user = full.to_string(),
                Speaker::Assistant => t.assistant = full.to_string(),
            }
        }
        self.emit_transcript(TranscriptUpdate {
            speaker,
            text: full.to_string(),
            is_final: true,
        });
    }

    pub fn emit_transcript(&self, update: TranscriptUpdate) {
        let cb = self.callbacks.lock().transcript.clone();
        if let Some(cb) = cb {
            cb(update);
        }
    }

    pub fn emit_error(&self, error: &VoiceError) {
        let cb = self.callbacks.lock().error.clone();
        if let Some(cb) = cb {
            cb(error);
        }
    }

    pub fn relay_session_id(&self) -> Option<String> {
        self.relay_session_id.lock().clone()
    }

    pub fn set_relay_session_id(&self, id: Option<String>) {
        *self.relay_session_id.lock() = id;
    }

    pub fn set_pending_prompt(&self, prompt: Option<(String, String)>) {
        *self.pending_prompt.lock() = prompt;
    }

    /// Clear and return the pending prompt reference, if any.
    pub fn take_pending_prompt(&self) -> Option<(String, String)> {
        self.pending_prompt.lock().take()
    }

    pub fn set_transcript_callback(&self, cb: TranscriptCallback) {
        self.callbacks.lock().transcript = Some(cb);
    }

    pub fn set_state_change_callback(&self, cb: StateChangeCallback) {
        self.callbacks.lock().state_change = Some(cb);
    }

    pub fn set_error_callback(&self, cb: ErrorCallback) {
        self.callbacks.lock().error = Some(cb);
    }
}

impl Default for SessionShared {
    fn default() -> Self {
        Self::new()
    }
}
