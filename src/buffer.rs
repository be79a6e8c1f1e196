//! Rolling per-channel sample history.

use crate::protocol::SAMPLE_RATE;
use serde::{Deserialize, Serialize};

/// Value held by slots that have never been written.
pub const SENTINEL: f64 = -1.0;

/// Default history depth in seconds.
pub const BUFFER_SECONDS_DEFAULT: u32 = 10;

/// Sizing for the sample history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Seconds of history to retain per channel.
    pub buffer_seconds: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            buffer_seconds: BUFFER_SECONDS_DEFAULT,
        }
    }
}

/// Fixed-capacity circular buffer holding the most recent
/// `sample_rate × buffer_seconds` samples per channel.
///
/// The write pointer wraps; the sample counter never does, so callers can
/// track how many samples arrived since they last looked.
pub struct SampleRingBuffer {
    data: Vec<Vec<f64>>,
    capacity: usize,
    cursor: usize,
    count: u64,
    sample_rate: u32,
}

impl SampleRingBuffer {
    pub fn new(channels: usize, config: HistoryConfig) -> Self {
        let capacity = (config.sample_rate * config.buffer_seconds).max(1) as usize;
        Self {
            data: vec![vec![SENTINEL; capacity]; channels],
            capacity,
            cursor: 0,
            count: 0,
            sample_rate: config.sample_rate,
        }
    }

    pub fn channels(&self) -> usize {
        self.data.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total samples written since creation or the last reset. Monotonic,
    /// never wraps.
    pub fn sample_count(&self) -> u64 {
        self.count
    }

    /// Store one value per channel, advance the write pointer and counter.
    pub fn write(&mut self, sample_set: &[f64]) {
        debug_assert_eq!(sample_set.len(), self.data.len());
        for (channel, &value) in self.data.iter_mut().zip(sample_set) {
            channel[self.cursor] = value;
        }
        self.cursor = (self.cursor + 1) % self.capacity;
        self.count += 1;
    }

    /// Read a value `offset_back` samples behind the most recent one
    /// (0 = newest). Offsets beyond the capacity resolve circularly.
    pub fn read(&self, channel: usize, offset_back: usize) -> f64 {
        let offset = offset_back % self.capacity;
        let newest = (self.cursor + self.capacity - 1) % self.capacity;
        let index = (newest + self.capacity - offset) % self.capacity;
        self.data[channel][index]
    }

    /// Refill every slot with the sentinel and clear pointer and counter.
    pub fn reset(&mut self) {
        for channel in &mut self.data {
            channel.fill(SENTINEL);
        }
        self.cursor = 0;
        self.count = 0;
    }
}
