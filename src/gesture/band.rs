//! Frequency-band energy detection.
//!
//! Recomputes a forward FFT over a sliding, overlapping window and averages
//! the magnitude of the bins inside the configured band. A boolean latch
//! turns the level comparison into start/complete edge events: sustained
//! muscle tension ("bite") and the look-suppression gesture are both
//! instances of this detector with different thresholds.

use super::{GestureDetector, GestureEvent};
use crate::buffer::SampleRingBuffer;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencyBandConfig {
    /// Band of interest in Hz, inclusive on both ends.
    pub freq_low: f64,
    pub freq_high: f64,

    /// Analysis window duration in seconds.
    pub window_seconds: f64,

    /// Fraction of the window shared between consecutive computations,
    /// 0 (disjoint) ..= 1 (every sample).
    pub overlap: f64,

    /// Per-channel average-magnitude thresholds, compared with AND semantics.
    pub threshold_ch1: f64,
    pub threshold_ch2: f64,
}

impl FrequencyBandConfig {
    /// Sustained-bite preset.
    pub fn bite() -> Self {
        Self {
            freq_low: 4.0,
            freq_high: 30.0,
            window_seconds: 1.0,
            overlap: 0.5,
            threshold_ch1: 0.6,
            threshold_ch2: 2.1,
        }
    }

    /// Look-suppression preset (lower thresholds, same band).
    pub fn prevent_look() -> Self {
        Self {
            threshold_ch1: 0.5,
            threshold_ch2: 0.37,
            ..Self::bite()
        }
    }

    /// Smile preset (lowest thresholds, same band).
    pub fn smile() -> Self {
        Self {
            threshold_ch1: 0.07,
            threshold_ch2: 0.37,
            ..Self::bite()
        }
    }
}

impl Default for FrequencyBandConfig {
    fn default() -> Self {
        Self::bite()
    }
}

pub struct FrequencyBandDetector {
    config: FrequencyBandConfig,
    planner: FftPlanner<f64>,
    last_computed: Option<u64>,
    active: bool,
}

impl FrequencyBandDetector {
    pub fn new(mut config: FrequencyBandConfig) -> Self {
        config.freq_low = config.freq_low.max(0.0);
        config.freq_high = config.freq_high.max(0.0);
        if config.freq_high < config.freq_low {
            log::warn!(
                "frequency band inverted ({}..{} Hz), swapping",
                config.freq_low,
                config.freq_high
            );
            std::mem::swap(&mut config.freq_low, &mut config.freq_high);
        }
        config.window_seconds = config.window_seconds.max(0.0);
        if !(0.0..=1.0).contains(&config.overlap) {
            log::warn!("overlap {} outside 0..=1, clamping", config.overlap);
            config.overlap = config.overlap.clamp(0.0, 1.0);
        }

        Self {
            config,
            planner: FftPlanner::new(),
            last_computed: None,
            active: false,
        }
    }

    /// Average FFT magnitude over the band bins of one channel, taken from
    /// the `duration` samples preceding the newest one. Only the first half
    /// of the spectrum carries distinct frequencies.
    fn band_average(&mut self, history: &SampleRingBuffer, channel: usize, duration: usize) -> Option<f64> {
        let rate = history.sample_rate() as f64;
        let mut buffer: Vec<Complex<f64>> = (0..duration)
            .map(|k| Complex::new(history.read(channel, duration - k), 0.0))
            .collect();

        let fft = self.planner.plan_fft_forward(duration);
        fft.process(&mut buffer);

        let mut sum = 0.0;
        let mut bins = 0usize;
        for (k, value) in buffer.iter().enumerate().take(duration / 2) {
            let freq = k as f64 * rate / duration as f64;
            if freq >= self.config.freq_low && freq <= self.config.freq_high {
                sum += value.norm();
                bins += 1;
            }
        }
        // An empty bin range reads as silence rather than dividing by zero.
        (bins > 0).then(|| sum / bins as f64)
    }
}

impl GestureDetector for FrequencyBandDetector {
    fn handle_next_sample(&mut self, history: &SampleRingBuffer, out: &mut Vec<GestureEvent>) {
        if history.channels() < 2 {
            return;
        }

        let rate = history.sample_rate() as f64;
        let duration = (self.config.window_seconds * rate) as usize;
        if duration == 0 {
            return;
        }
        let step = (duration as f64 * (1.0 - self.config.overlap)) as u64;

        let count = history.sample_count();
        if count <= duration as u64 {
            return;
        }
        if let Some(last) = self.last_computed {
            if count - last < step {
                return;
            }
        }
        self.last_computed = Some(count);

        let above = match (
            self.band_average(history, 0, duration),
            self.band_average(history, 1, duration),
        ) {
            (Some(avg1), Some(avg2)) => {
                log::debug!("band averages {:.3} / {:.3}", avg1, avg2);
                avg1 >= self.config.threshold_ch1 && avg2 >= self.config.threshold_ch2
            }
            _ => false,
        };

        if above && !self.active {
            self.active = true;
            out.push(GestureEvent::FreqStart);
        } else if !above && self.active {
            self.active = false;
            out.push(GestureEvent::FreqComplete);
        }
    }
}
