//! Error taxonomy for the voice client.
//!
//! Two propagation tiers:
//!
//! - Session-fatal errors (`Connect`, `AuthTimeout`, `AuthRejected`,
//!   `Closed`) end the session, move the state machine to `Error`, and are
//!   surfaced to the caller exactly once. The caller must call `start()`
//!   again to recover.
//! - Per-message errors (`Decode`, malformed inbound frames) are absorbed
//!   where they occur: the offending fragment is dropped, a warning is
//!   logged, and the session continues.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during a voice session.
#[derive(Debug, Error)]
pub enum VoiceError {
    /// The socket never opened (DNS/TCP/TLS failure or establishment timeout)
    #[error("connection failed: {0}")]
    Connect(String),

    /// The socket opened but no auth confirmation arrived in time
    #[error("authentication timed out after {0:?}")]
    AuthTimeout(Duration),

    /// The relay explicitly rejected the credential
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// The relay reported a session-level protocol error
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Microphone acquisition or input stream failure
    #[error("audio capture failed: {0}")]
    Capture(#[from] CaptureError),

    /// A synthesized-audio fragment could not be decoded
    #[error("audio decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// The relay closed the connection abnormally
    #[error("connection closed (code {code:?}): {reason}")]
    Closed {
        /// Close code from the transport, if any
        code: Option<u16>,
        /// Human-readable close reason
        reason: String,
    },

    /// A command was issued in a state that does not allow it
    #[error("session error: {0}")]
    Session(String),
}

/// Result type for voice session operations.
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Failure modes when acquiring or reading the audio input device.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The host denied microphone permission
    #[error("microphone permission denied")]
    PermissionDenied,

    /// No usable input device was found
    #[error("audio input device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The input stream failed after it was opened
    #[error("audio input stream failed: {0}")]
    Stream(String),
}

/// Failure modes when decoding a wire audio payload.
///
/// Returned instead of panicking so one corrupt fragment never aborts the
/// playback path.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload was not valid base64
    #[error("invalid base64 payload: {0}")]
    Base64(String),

    /// The decoded byte sequence cannot be PCM16 (odd length)
    #[error("PCM16 payload has odd byte count ({0})")]
    OddByteCount(usize),
}
