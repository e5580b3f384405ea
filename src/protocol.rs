//! Wire message types for the relay protocol.
//!
//! All messages are JSON text frames over a persistent WebSocket, tagged by
//! a dotted `type` string.
//!
//! Client events (sent to relay):
//! - auth - Authenticate and push initial session configuration
//! - session.update - Apply a mid-session configuration update
//! - input_audio_buffer.append - Append base64 PCM16 audio to the buffer
//! - response.create - Request a response (fallback only; server VAD
//!   normally triggers responses by itself)
//!
//! Server events (received from relay):
//! - auth.success - Credential accepted, session established
//! - session.updated - Configuration update acknowledged
//! - conversation.item.input_audio_buffer.speech_started / speech_stopped /
//!   committed - Server-side VAD turn events
//! - conversation.item.input_audio_transcription.delta / completed - User
//!   speech transcription
//! - response.audio_transcript.delta / done - Assistant transcript
//! - response.audio.delta / done - Synthesized audio chunks
//! - response.created / done / cancelled - Response lifecycle
//! - error - Relay-reported error
//! - connection.closed - Relay-initiated close (also synthesized locally
//!   from a transport close frame)

use base64::prelude::*;
use serde::{Deserialize, Serialize};

// =============================================================================
// Session payload
// =============================================================================

/// Session configuration as it appears on the wire, both in the `auth`
/// handshake and in `session.update` messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionPayload {
    /// Voice profile for synthesized output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    /// Free-text system instructions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Input audio format (always "pcm16" in this design)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<String>,

    /// Output audio format (always "pcm16" in this design)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,

    /// Input audio transcription configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<TranscriptionPayload>,

    /// Turn detection configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetectionPayload>,

    /// Prompt reference; only valid in a `session.update` sent after auth,
    /// never in the handshake payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PromptRefPayload>,
}

/// Input audio transcription configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionPayload {
    /// Transcription model id
    pub model: String,
}

/// Turn detection configuration on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetectionPayload {
    /// Server-side VAD
    #[serde(rename = "server_vad")]
    ServerVad {
        /// Activation threshold (0.0 to 1.0)
        #[serde(skip_serializing_if = "Option::is_none")]
        threshold: Option<f32>,
        /// Audio prefix padding in ms
        #[serde(skip_serializing_if = "Option::is_none")]
        prefix_padding_ms: Option<u32>,
        /// Silence duration before end of turn in ms
        #[serde(skip_serializing_if = "Option::is_none")]
        silence_duration_ms: Option<u32>,
    },
    /// No automatic turn detection
    #[serde(rename = "none")]
    None {},
}

/// Reference to a server-side stored prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRefPayload {
    /// Prompt id
    pub id: String,
    /// Prompt version
    pub version: String,
}

// =============================================================================
// Client events (sent to relay)
// =============================================================================

/// Client events sent to the relay.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Authenticate, carrying the initial session configuration
    #[serde(rename = "auth")]
    Auth {
        /// API key for the relay
        api_key: String,
        /// Initial session configuration
        session: SessionPayload,
    },

    /// Apply a mid-session configuration update
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// Updated session configuration
        session: SessionPayload,
    },

    /// Append audio to the input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded PCM16 audio
        audio: String,
        /// Monotonic sequence counter, diagnostic only; ordering is implicit
        /// in send order over the single socket
        #[serde(skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },

    /// Request a response; fallback when server VAD committed the buffer
    /// but no response began within the grace window
    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl ClientEvent {
    /// Create an audio append event from pre-encoded base64 PCM16.
    pub fn audio_append(audio: String, seq: u64) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio,
            seq: Some(seq),
        }
    }

    /// Create an audio append event from raw PCM16 bytes.
    pub fn audio_append_bytes(data: &[u8], seq: u64) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(data),
            seq: Some(seq),
        }
    }
}

// =============================================================================
// Server events (received from relay)
// =============================================================================

/// Server events received from the relay.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Credential accepted
    #[serde(rename = "auth.success")]
    AuthSuccess {
        /// Relay-assigned session id
        #[serde(default)]
        session_id: Option<String>,
    },

    /// Configuration update acknowledged
    #[serde(rename = "session.updated")]
    SessionUpdated,

    /// Server VAD detected speech start
    #[serde(rename = "conversation.item.input_audio_buffer.speech_started")]
    SpeechStarted {
        /// Audio timestamp in ms
        #[serde(default)]
        audio_start_ms: Option<u64>,
    },

    /// Server VAD detected speech stop
    #[serde(rename = "conversation.item.input_audio_buffer.speech_stopped")]
    SpeechStopped {
        /// Audio timestamp in ms
        #[serde(default)]
        audio_end_ms: Option<u64>,
    },

    /// Audio buffer committed; a response should follow
    #[serde(rename = "conversation.item.input_audio_buffer.committed")]
    BufferCommitted {
        /// Item id of the committed buffer
        #[serde(default)]
        item_id: Option<String>,
    },

    /// Incremental user speech transcription
    #[serde(rename = "conversation.item.input_audio_transcription.delta")]
    InputTranscriptionDelta {
        /// Transcript fragment
        delta: String,
    },

    /// Final user speech transcription
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted {
        /// Full transcript
        transcript: String,
    },

    /// Incremental assistant transcript
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta {
        /// Transcript fragment
        delta: String,
    },

    /// Final assistant transcript
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone {
        /// Full transcript
        transcript: String,
    },

    /// Synthesized audio chunk
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        /// Base64-encoded PCM16 audio
        delta: String,
    },

    /// Audio generation complete (playback may still be draining)
    #[serde(rename = "response.audio.done")]
    AudioDone,

    /// Response generation started
    #[serde(rename = "response.created")]
    ResponseCreated {
        /// Response id
        #[serde(default)]
        response_id: Option<String>,
    },

    /// Response complete
    #[serde(rename = "response.done")]
    ResponseDone {
        /// Response id
        #[serde(default)]
        response_id: Option<String>,
    },

    /// Response cancelled; in-flight playback must be flushed
    #[serde(rename = "response.cancelled")]
    ResponseCancelled,

    /// Relay-reported error
    #[serde(rename = "error")]
    Error {
        /// Error details
        error: ApiError,
    },

    /// Connection closed by the relay
    #[serde(rename = "connection.closed")]
    ConnectionClosed {
        /// Close code
        #[serde(default)]
        code: Option<u16>,
        /// Close reason
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Error details carried by a relay `error` event.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    /// Error type
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Error code
    #[serde(default)]
    pub code: Option<String>,
    /// Error message
    pub message: String,
}

// =============================================================================
// Tests
// =============================================================================
