//! Microphone capture loop.
//!
//! A spawned task reads fixed-size float frames from an [`AudioSource`],
//! updates the input level meter on every frame, and forwards encoded
//! audio to the relay only while the conversation state permits it.
//! Frames captured while ineligible are measured for the meter and then
//! discarded; audio is never buffered for later.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::codec;
use crate::connection::OutboundHandle;
use crate::error::CaptureError;
use crate::level;
use crate::protocol::ClientEvent;
use crate::session::SessionShared;
use crate::state::ConversationState;

/// Input device seam.
pub trait AudioInput: Send + Sync {
    /// Acquire the microphone. Fails with [`CaptureError::PermissionDenied`]
    /// or [`CaptureError::DeviceUnavailable`] before any task is spawned.
    fn open(&self) -> Result<Box<dyn AudioSource>, CaptureError>;
}

/// An open input stream yielding f32 samples in -1.0..=1.0.
pub trait AudioSource: Send {
    /// Read up to `max` samples. May return fewer when the device buffer
    /// is short; an empty frame means no data this tick.
    fn read_frame(&mut self, max: usize) -> Result<Vec<f32>, CaptureError>;
}

/// Owns the capture task.
pub struct CaptureEngine {
    task: Option<JoinHandle<()>>,
}

/// Zeroes the level meter when the capture task's future is dropped, so
/// an aborted task cannot leave a stale reading behind.
struct MeterReset(Arc<SessionShared>);

impl Drop for MeterReset {
    fn drop(&mut self) {
        self.0.set_audio_level(0.0);
    }
}

impl CaptureEngine {
    pub fn new() -> Self {
        Self { task: None }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Spawn the capture loop. A second call while running is a no-op.
    pub fn start(
        &mut self,
        mut source: Box<dyn AudioSource>,
        shared: Arc<SessionShared>,
        outbound: OutboundHandle,
        frame_samples: usize,
        sample_rate: u32,
        seq: Arc<AtomicU64>,
    ) {
        if self.task.is_some() {
            return;
        }

        let tick_ms = (frame_samples as u64 * 1000) / u64::from(sample_rate);

        self.task = Some(tokio::spawn(async move {
            // Zeroes the meter however the task ends, abort included
            let _reset = MeterReset(shared.clone());
            let mut interval =
                tokio::time::interval(std::time::Duration::from_millis(tick_ms.max(1)));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::debug!(frame_samples, tick_ms, "capture loop started");
            loop {
                interval.tick().await;

                // A dead session never comes back to Recording; release
                // the device instead of holding it open.
                match shared.state() {
                    ConversationState::Error | ConversationState::Closed => {
                        tracing::debug!("session over, releasing capture source");
                        break;
                    }
                    _ => {}
                }

                let frame = match source.read_frame(frame_samples) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!("audio source failed: {}", e);
                        break;
                    }
                };
                if frame.is_empty() {
                    continue;
                }

                shared.set_audio_level(level::measure(&frame));

                if shared.is_recording_eligible() && outbound.is_open() {
                    let audio = codec::encode_frame(&frame);
                    outbound.send(ClientEvent::audio_append(
                        audio,
                        seq.fetch_add(1, Ordering::Relaxed),
                    ));
                }
            }
        }));
    }

    /// Release the microphone synchronously. The task is aborted and the
    /// level meter zeroed before returning.
    pub fn stop(&mut self, shared: &SessionShared) {
        if let Some(task) = self.task.take() {
            task.abort();
            shared.set_audio_level(0.0);
            tracing::debug!("capture loop stopped");
        }
    }
}

impl Default for CaptureEngine {
    fn default() -> Self {
        Self::new()
    }
}
