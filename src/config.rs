//! Client and session configuration.
//!
//! Audio format is fixed at 24 kHz mono PCM16; the relay protocol does not
//! negotiate it.

use serde::{Deserialize, Serialize};

use crate::protocol::{
    PromptRefPayload, SessionPayload, TranscriptionPayload, TurnDetectionPayload,
};

/// Fixed sample rate for both capture and playback.
pub const SAMPLE_RATE: u32 = 24_000;

/// Samples per capture frame (~170 ms at 24 kHz).
pub const FRAME_SAMPLES: usize = 4096;

/// Default connection-establishment timeout.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Default auth-response timeout. Deliberately longer than the connect
/// timeout: a slow relay can open a socket yet take a while to authenticate,
/// and the two failures must be distinguishable.
pub const DEFAULT_AUTH_TIMEOUT_MS: u64 = 10_000;

/// Grace window after `input_audio_buffer.committed` before the client sends
/// a fallback `response.create`. Server VAD normally triggers the response
/// by itself; this is a tunable constant, not inferred relay behavior.
pub const RESPONSE_GRACE_MS: u64 = 1_000;

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// WebSocket URL of the relay endpoint
    pub relay_url: String,

    /// API key sent in the auth handshake
    pub api_key: String,

    /// Session configuration pushed on connect
    #[serde(default)]
    pub session: SessionConfig,

    /// Connection-establishment timeout in ms
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Auth-response timeout in ms, tracked independently of the connect
    /// timeout
    #[serde(default = "default_auth_timeout_ms")]
    pub auth_timeout_ms: u64,

    /// Fallback response grace window in ms
    #[serde(default = "default_response_grace_ms")]
    pub response_grace_ms: u64,

    /// Samples per capture frame
    #[serde(default = "default_frame_samples")]
    pub frame_samples: usize,
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_auth_timeout_ms() -> u64 {
    DEFAULT_AUTH_TIMEOUT_MS
}

fn default_response_grace_ms() -> u64 {
    RESPONSE_GRACE_MS
}

fn default_frame_samples() -> usize {
    FRAME_SAMPLES
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: String::new(),
            api_key: String::new(),
            session: SessionConfig::default(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            auth_timeout_ms: DEFAULT_AUTH_TIMEOUT_MS,
            response_grace_ms: RESPONSE_GRACE_MS,
            frame_samples: FRAME_SAMPLES,
        }
    }
}

/// Session configuration: turn detection, transcription model, voice
/// profile, and the prompt source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Voice profile id for synthesized output
    #[serde(default)]
    pub voice: Option<String>,

    /// Transcription model id for user speech
    #[serde(default)]
    pub transcription_model: Option<String>,

    /// Turn detection mode and thresholds
    #[serde(default)]
    pub turn_detection: TurnDetection,

    /// Prompt source; the enum makes reference-vs-instructions mutually
    /// exclusive by construction
    #[serde(default)]
    pub prompt: Option<PromptSource>,
}

/// Turn detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    /// Server-side VAD
    #[serde(rename = "server_vad")]
    ServerVad {
        /// Activation threshold (0.0 to 1.0)
        #[serde(default)]
        threshold: Option<f32>,
        /// Audio prefix padding in ms
        #[serde(default)]
        prefix_padding_ms: Option<u32>,
        /// Silence duration before end of turn in ms
        #[serde(default)]
        silence_duration_ms: Option<u32>,
    },
    /// No automatic turn detection
    #[serde(rename = "none")]
    None,
}

impl Default for TurnDetection {
    fn default() -> Self {
        TurnDetection::ServerVad {
            threshold: Some(0.5),
            prefix_padding_ms: Some(300),
            silence_duration_ms: Some(500),
        }
    }
}

/// Where the assistant's system prompt comes from.
///
/// A server-side prompt reference supersedes free-text instructions. By
/// protocol contract the reference is not valid in the auth handshake; it is
/// sent via a follow-up `session.update` once auth succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptSource {
    /// Reference to a server-side stored prompt
    Reference {
        /// Prompt id
        id: String,
        /// Prompt version
        version: String,
    },
    /// Free-text system instructions
    Instructions(String),
}

impl SessionConfig {
    /// Build the session payload for the auth handshake.
    ///
    /// Instructions are inlined here; a prompt reference is withheld and
    /// sent via [`SessionConfig::prompt_update_payload`] instead.
    pub fn handshake_payload(&self) -> SessionPayload {
        let instructions = match &self.prompt {
            Some(PromptSource::Instructions(text)) => Some(text.clone()),
            _ => None,
        };

        SessionPayload {
            voice: self.voice.clone(),
            instructions,
            input_audio_format: Some("pcm16".to_string()),
            output_audio_format: Some("pcm16".to_string()),
            input_audio_transcription: self
                .transcription_model
                .as_ref()
                .map(|model| TranscriptionPayload {
                    model: model.clone(),
                }),
            turn_detection: Some(self.turn_detection.to_payload()),
            prompt: None,
        }
    }

    /// Build the follow-up `session.update` payload carrying the prompt
    /// reference, if one is configured.
    pub fn prompt_update_payload(&self) -> Option<SessionPayload> {
        match &self.prompt {
            Some(PromptSource::Reference { id, version }) => Some(SessionPayload {
                prompt: Some(PromptRefPayload {
                    id: id.clone(),
                    version: version.clone(),
                }),
                ..Default::default()
            }),
            _ => None,
        }
    }
}

impl TurnDetection {
    fn to_payload(&self) -> TurnDetectionPayload {
        match self {
            TurnDetection::ServerVad {
                threshold,
                prefix_padding_ms,
                silence_duration_ms,
            } => TurnDetectionPayload::ServerVad {
                threshold: *threshold,
                prefix_padding_ms: *prefix_padding_ms,
                silence_duration_ms: *silence_duration_ms,
            },
            TurnDetection::None => TurnDetectionPayload::None {},
        }
    }
}
