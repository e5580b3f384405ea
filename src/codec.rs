//! Sample format conversions between float audio, PCM16, and the wire
//! transport encoding.
//!
//! The wire format is JSON, so binary audio is carried as base64 text.
//! Samples are 16-bit signed little-endian. All functions here are pure;
//! decode failures are explicit [`DecodeError`]s so a corrupt fragment can
//! be dropped without aborting the session.

use base64::prelude::*;

use crate::error::DecodeError;

/// Scale factor between [-1, 1] float samples and i16.
const PCM16_SCALE: f32 = 32767.0;

/// Encode float samples as base64 PCM16 LE.
///
/// Samples are clamped to [-1, 1] first; values beyond the boundary map to
/// the extreme i16, never wrap around.
pub fn encode_frame(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * PCM16_SCALE).round() as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    BASE64_STANDARD.encode(&bytes)
}

/// Decode a base64 PCM16 LE payload into samples.
pub fn decode_chunk(text: &str) -> Result<Vec<i16>, DecodeError> {
    let bytes = BASE64_STANDARD
        .decode(text)
        .map_err(|e| DecodeError::Base64(e.to_string()))?;

    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddByteCount(bytes.len()));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Convert PCM16 samples back to floats in [-1, 1].
pub fn pcm16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / PCM16_SCALE).collect()
}
