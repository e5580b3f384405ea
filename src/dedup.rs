//! Suppression of retransmitted synthesized-audio fragments.
//!
//! The relay may redeliver an audio delta it already sent (retransmission
//! after a hiccup on its upstream). Playing it twice is audible, so each
//! fragment is fingerprinted and repeats are dropped before they reach the
//! playback scheduler.

use std::collections::HashSet;
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// How many leading characters of the encoded payload go into the
/// fingerprint; combined with the payload length this is collision-safe
/// enough for retransmission detection.
const FINGERPRINT_PREFIX_LEN: usize = 32;

/// Tracks fingerprints of audio fragments already handed to playback.
#[derive(Debug, Default)]
pub struct DeltaDeduplicator {
    seen: HashSet<u64>,
}

impl DeltaDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fragment; returns `true` if it is new, `false` if this
    /// fingerprint was already processed.
    pub fn insert(&mut self, payload: &str) -> bool {
        self.seen.insert(Self::fingerprint(payload))
    }

    /// Forget all fingerprints. Called at each assistant-turn boundary so
    /// the set stays bounded.
    pub fn clear(&mut self) {
        self.seen.clear();
    }

    fn fingerprint(payload: &str) -> u64 {
        let prefix = &payload.as_bytes()[..payload.len().min(FINGERPRINT_PREFIX_LEN)];
        xxh3_64_with_seed(prefix, payload.len() as u64)
    }
}
