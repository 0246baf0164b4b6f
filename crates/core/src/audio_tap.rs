//! Frame windows over the remote audio as it would be played back.
//!
//! Remote audio arrives in bursts, usually faster than real time. The tap
//! queues it and, on each frame tick, releases only as many samples as a
//! player would have consumed since the previous tick. An empty queue reads
//! as silence.

use std::collections::VecDeque;
use tokio::time::Instant;

/// 24 kHz mono PCM, the realtime API's output format.
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

const NANOS_PER_SEC: u128 = 1_000_000_000;

#[derive(Debug)]
pub struct PlaybackTap {
    sample_rate: u32,
    queue: VecDeque<f32>,
    frame: Vec<f32>,
    cursor: Option<Instant>,
    /// Fractional samples carried between ticks, in sample-nanoseconds.
    carry: u128,
}

impl PlaybackTap {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            queue: VecDeque::new(),
            frame: Vec::new(),
            cursor: None,
            carry: 0,
        }
    }

    pub fn push(&mut self, samples: &[f32]) {
        self.queue.extend(samples.iter().copied());
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Advances the playback cursor to `now` and returns the samples played since.
    pub fn next_frame(&mut self, now: Instant) -> &[f32] {
        self.frame.clear();
        let Some(prev) = self.cursor.replace(now) else {
            return &self.frame;
        };
        let due = now.saturating_duration_since(prev).as_nanos() * u128::from(self.sample_rate)
            + self.carry;
        self.carry = due % NANOS_PER_SEC;

        let whole = usize::try_from(due / NANOS_PER_SEC).unwrap_or(usize::MAX);
        let n = whole.min(self.queue.len());
        self.frame.extend(self.queue.drain(..n));
        if self.queue.is_empty() {
            self.carry = 0;
        }
        &self.frame
    }

    pub fn reset(&mut self) {
        self.queue.clear();
        self.frame.clear();
        self.cursor = None;
        self.carry = 0;
    }
}

impl Default for PlaybackTap {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}
