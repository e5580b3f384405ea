//! Gapless playback scheduling.
//!
//! Audio arrives in many small deltas. Each decoded chunk becomes one
//! scheduled item whose start time is exactly the previous item's end
//! time, so consecutive chunks splice into continuous speech with no
//! gaps and no overlap. Actual sample output goes through an
//! [`AudioSink`] so the scheduler itself stays device-free and testable.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use std::sync::Arc;

/// Monotonic time source for scheduling.
pub trait PlaybackClock: Send + Sync {
    fn now(&self) -> Duration;
}

/// Wall-free clock anchored at construction.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackClock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Output device seam. `schedule` must not block; `stop_all` halts
/// everything previously scheduled.
pub trait AudioSink: Send + Sync {
    fn schedule(&self, item_id: u64, samples: &[i16], start_at: Duration);
    fn stop_all(&self);
}

#[derive(Debug, Clone)]
struct InFlight {
    id: u64,
    end: Duration,
}

struct Inner {
    in_flight: Vec<InFlight>,
    next_id: u64,
}

/// Tracks scheduled items and assigns each new chunk its start time.
pub struct PlaybackScheduler {
    inner: Mutex<Inner>,
    sink: Arc<dyn AudioSink>,
    clock: Arc<dyn PlaybackClock>,
}

impl PlaybackScheduler {
    pub fn new(sink: Arc<dyn AudioSink>, clock: Arc<dyn PlaybackClock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                in_flight: Vec::new(),
                next_id: 0,
            }),
            sink,
            clock,
        }
    }

    /// Schedule a decoded chunk. Starts at the previous item's end when
    /// the queue is non-empty, otherwise immediately. Returns the item id
    /// the device reports back through `finish`.
    pub fn enqueue(&self, samples: Vec<i16>, sample_rate: u32) -> u64 {
        let duration =
            Duration::from_secs_f64(samples.len() as f64 / f64::from(sample_rate));

        let mut inner = self.inner.lock();
        let start = match inner.in_flight.last() {
            Some(prev) => prev.end,
            None => self.clock.now(),
        };
        let id = inner.next_id;
        inner.next_id += 1;
        inner.in_flight.push(InFlight {
            id,
            end: start + duration,
        });
        drop(inner);

        self.sink.schedule(id, &samples, start);
        id
    }

    /// The device finished an item. Returns true when this drained the
    /// queue, the signal the state machine needs to end the turn.
    pub fn finish(&self, item_id: u64) -> bool {
        let mut inner = self.inner.lock();
        inner.in_flight.retain(|item| item.id != item_id);
        inner.in_flight.is_empty()
    }

    /// Drop everything scheduled and silence the device. Infallible and
    /// idempotent.
    pub fn flush(&self) {
        self.inner.lock().in_flight.clear();
        self.sink.stop_all();
    }

    pub fn is_idle(&self) -> bool {
        self.inner.lock().in_flight.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight.len()
    }
}
