//! Threshold/slope edge detection.
//!
//! Classifies each incoming sample against per-channel high/low thresholds
//! and confirms candidate edges with a linear-regression slope fit over the
//! preceding window. The directional preset recognizes eye movements (a
//! falling edge is a look to the right, a rising edge a look to the left);
//! the undirected preset emits plain slope events.

use super::{GestureDetector, GestureEvent, LookDirection};
use crate::buffer::SampleRingBuffer;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSlopeConfig {
    /// Low/high classification thresholds for channel 0.
    pub ch1_low: f64,
    pub ch1_high: f64,

    /// Low/high classification thresholds for channel 1.
    pub ch2_low: f64,
    pub ch2_high: f64,

    /// Duration of the regression window.
    pub slope_seconds: f64,

    /// Minimum spacing between detections.
    pub safe_offset_seconds: f64,

    /// Optional bounds on the slope magnitude.
    pub slope_min: Option<f64>,
    pub slope_max: Option<f64>,

    /// Window during which a repeat of the last emitted direction is
    /// suppressed (glancing back to center). Zero disables the suppression.
    pub return_to_center_seconds: f64,

    /// Channel whose raw values feed the regression.
    pub slope_channel: usize,

    /// Directional detectors emit look events; undirected ones emit slope
    /// events.
    pub directional: bool,
}

impl EdgeSlopeConfig {
    /// Eye-movement ("look") preset.
    pub fn look() -> Self {
        Self {
            ch1_low: 0.44,
            ch1_high: 0.57,
            ch2_low: 0.1,
            ch2_high: 0.9,
            slope_seconds: 0.08,
            safe_offset_seconds: 0.25,
            slope_min: None,
            slope_max: Some(4.0),
            return_to_center_seconds: 1.0,
            slope_channel: 1,
            directional: true,
        }
    }

    /// Generic steep-edge preset.
    pub fn slope() -> Self {
        Self {
            ch1_low: 0.43,
            ch1_high: 0.61,
            ch2_low: 0.18,
            ch2_high: 0.75,
            slope_seconds: 0.015,
            safe_offset_seconds: 0.25,
            slope_min: Some(15.0),
            slope_max: None,
            return_to_center_seconds: 0.0,
            slope_channel: 1,
            directional: false,
        }
    }
}

impl Default for EdgeSlopeConfig {
    fn default() -> Self {
        Self::look()
    }
}

pub struct EdgeSlopeDetector {
    config: EdgeSlopeConfig,
    last_detection: Option<u64>,
    last_seen: Option<u64>,
    last_direction: Option<LookDirection>,
}

impl EdgeSlopeDetector {
    pub fn new(mut config: EdgeSlopeConfig) -> Self {
        if config.ch1_low > config.ch1_high {
            log::warn!(
                "channel 0 thresholds inverted ({} > {}), swapping",
                config.ch1_low,
                config.ch1_high
            );
            std::mem::swap(&mut config.ch1_low, &mut config.ch1_high);
        }
        if config.ch2_low > config.ch2_high {
            log::warn!(
                "channel 1 thresholds inverted ({} > {}), swapping",
                config.ch2_low,
                config.ch2_high
            );
            std::mem::swap(&mut config.ch2_low, &mut config.ch2_high);
        }
        config.slope_seconds = config.slope_seconds.abs();
        config.safe_offset_seconds = config.safe_offset_seconds.abs();
        config.return_to_center_seconds = config.return_to_center_seconds.abs();

        Self {
            config,
            last_detection: None,
            last_seen: None,
            last_direction: None,
        }
    }

    /// Slope of the window of `samples` values ending just before the newest
    /// sample, fitted against elapsed seconds. Ordinary least squares; the
    /// two-term closed form needs no matrix machinery.
    fn fit_slope(&self, history: &SampleRingBuffer, samples: usize) -> f64 {
        let rate = history.sample_rate() as f64;
        let n = samples as f64;
        let (mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0);
        for k in 0..samples {
            let x = k as f64 / rate;
            let y = history.read(self.config.slope_channel, samples - k);
            sx += x;
            sy += y;
            sxx += x * x;
            sxy += x * y;
        }
        let denominator = n * sxx - sx * sx;
        if denominator == 0.0 {
            0.0
        } else {
            (n * sxy - sx * sy) / denominator
        }
    }
}

impl GestureDetector for EdgeSlopeDetector {
    fn handle_next_sample(&mut self, history: &SampleRingBuffer, out: &mut Vec<GestureEvent>) {
        // Classification needs two channels, the regression its own channel.
        if history.channels() < 2 || self.config.slope_channel >= history.channels() {
            return;
        }

        let rate = history.sample_rate() as f64;
        let safe_offset = (self.config.safe_offset_seconds * rate) as u64;
        let slope_samples = (self.config.slope_seconds * rate) as usize;
        let back_to_center = (self.config.return_to_center_seconds * rate) as u64;

        let count = history.sample_count();
        if count <= slope_samples as u64 {
            return;
        }

        // Catch up on everything written since the previous invocation,
        // oldest first. The first invocation only records the position.
        let pending = match self.last_seen {
            Some(seen) => (count - seen) as usize,
            None => 0,
        };
        self.last_seen = Some(count);
        if pending == 0 {
            return;
        }

        // All candidates of one batch share the same fit: the window ends
        // just before the newest sample either way.
        let slope = self.fit_slope(history, slope_samples);

        for offset in (0..pending).rev() {
            let ch1 = history.read(0, offset);
            let ch2 = history.read(1, offset);

            let falling = ch1 <= self.config.ch1_low && ch2 <= self.config.ch2_low;
            let rising = ch1 >= self.config.ch1_high && ch2 >= self.config.ch2_high;
            if falling == rising {
                continue;
            }

            if let Some(last) = self.last_detection {
                if count - offset as u64 - last < safe_offset {
                    continue;
                }
            }

            if (falling && slope >= 0.0) || (rising && slope <= 0.0) {
                continue;
            }
            if let Some(min) = self.config.slope_min {
                if slope.abs() < min {
                    continue;
                }
            }
            if let Some(max) = self.config.slope_max {
                if slope.abs() > max {
                    continue;
                }
            }

            if self.config.directional {
                let direction = if falling {
                    LookDirection::Right
                } else {
                    LookDirection::Left
                };

                let repeat_within_window = self.last_direction == Some(direction)
                    && self
                        .last_detection
                        .is_some_and(|last| count - last <= back_to_center);
                if repeat_within_window {
                    continue;
                }

                log::debug!("look {} detected (slope {:.3})", direction.as_str(), slope);
                out.push(GestureEvent::Look { direction });
                self.last_detection = Some(count - offset as u64);
                self.last_direction = Some(direction);
            } else {
                log::debug!("slope edge detected (slope {:.3})", slope);
                out.push(GestureEvent::Slope);
                self.last_detection = Some(count - offset as u64);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::HistoryConfig;

    const RATE: u32 = 100;

    fn detector(config: EdgeSlopeConfig) -> EdgeSlopeDetector {
        EdgeSlopeDetector::new(config)
    }

    fn history() -> SampleRingBuffer {
        SampleRingBuffer::new(
            2,
            HistoryConfig {
                sample_rate: RATE,
                buffer_seconds: 2,
            },
        )
    }

    fn test_config() -> EdgeSlopeConfig {
        EdgeSlopeConfig {
            ch1_low: 0.2,
            ch1_high: 0.8,
            ch2_low: 0.2,
            ch2_high: 0.8,
            slope_seconds: 0.05,
            safe_offset_seconds: 0.25,
            slope_min: None,
            slope_max: None,
            return_to_center_seconds: 0.0,
            slope_channel: 1,
            directional: true,
        }
    }

    /// Feed one sample set and collect whatever the detector emits.
    fn step(
        det: &mut EdgeSlopeDetector,
        history: &mut SampleRingBuffer,
        value: f64,
    ) -> Vec<GestureEvent> {
        let mut out = Vec::new();
        history.write(&[value, value]);
        det.handle_next_sample(history, &mut out);
        out
    }

    #[test]
    fn test_rising_edge_fires_once() {
        let mut det = detector(test_config());
        let mut buf = history();

        let mut events = Vec::new();
        for _ in 0..20 {
            events.extend(step(&mut det, &mut buf, 0.5));
        }
        // Ramp up through the high thresholds.
        for i in 0..10 {
            events.extend(step(&mut det, &mut buf, 0.5 + 0.06 * i as f64));
        }
        assert_eq!(
            events,
            vec![GestureEvent::Look {
                direction: LookDirection::Left
            }]
        );
    }

    #[test]
    fn test_safe_offset_suppresses_retrigger() {
        let mut det = detector(test_config());
        let mut buf = history();

        let mut events = Vec::new();
        for _ in 0..20 {
            events.extend(step(&mut det, &mut buf, 0.5));
        }
        for i in 0..10 {
            events.extend(step(&mut det, &mut buf, 0.5 + 0.06 * i as f64));
        }
        assert_eq!(events.len(), 1);

        // Still above threshold and still rising inside the safe window.
        for i in 0..10 {
            events.extend(step(&mut det, &mut buf, 0.9 + 0.005 * i as f64));
        }
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_falling_edge_is_right() {
        let mut det = detector(test_config());
        let mut buf = history();

        let mut events = Vec::new();
        for _ in 0..20 {
            events.extend(step(&mut det, &mut buf, 0.5));
        }
        for i in 0..10 {
            events.extend(step(&mut det, &mut buf, 0.5 - 0.06 * i as f64));
        }
        assert_eq!(
            events,
            vec![GestureEvent::Look {
                direction: LookDirection::Right
            }]
        );
    }

    #[test]
    fn test_sign_mismatch_rejected() {
        // Values above the high thresholds while the recent slope is falling.
        let mut det = detector(test_config());
        let mut buf = history();

        let mut events = Vec::new();
        for _ in 0..20 {
            events.extend(step(&mut det, &mut buf, 0.95));
        }
        // Falling but still above threshold: rising classification, negative
        // slope, must not fire.
        for i in 0..6 {
            events.extend(step(&mut det, &mut buf, 0.95 - 0.02 * i as f64));
        }
        assert!(events.is_empty());
    }

    #[test]
    fn test_slope_magnitude_bounds() {
        let mut config = test_config();
        config.slope_min = Some(100.0); // steeper than the ramp can be
        let mut det = detector(config);
        let mut buf = history();

        let mut events = Vec::new();
        for _ in 0..20 {
            events.extend(step(&mut det, &mut buf, 0.5));
        }
        for i in 0..10 {
            events.extend(step(&mut det, &mut buf, 0.5 + 0.06 * i as f64));
        }
        assert!(events.is_empty());
    }

    #[test]
    fn test_undirected_variant_emits_slope() {
        let mut config = test_config();
        config.directional = false;
        let mut det = detector(config);
        let mut buf = history();

        let mut events = Vec::new();
        for _ in 0..20 {
            events.extend(step(&mut det, &mut buf, 0.5));
        }
        for i in 0..10 {
            events.extend(step(&mut det, &mut buf, 0.5 + 0.06 * i as f64));
        }
        assert_eq!(events, vec![GestureEvent::Slope]);
    }

    #[test]
    fn test_same_direction_suppressed_within_return_window() {
        let mut config = test_config();
        config.return_to_center_seconds = 10.0; // longer than the test runs
        let mut det = detector(config);
        let mut buf = history();

        let mut events = Vec::new();
        for _ in 0..20 {
            events.extend(step(&mut det, &mut buf, 0.5));
        }
        for i in 0..10 {
            events.extend(step(&mut det, &mut buf, 0.5 + 0.06 * i as f64));
        }
        assert_eq!(events.len(), 1);

        // Drop to center, wait out the safe offset, rise again: same
        // direction inside the return-to-center window stays silent.
        for _ in 0..40 {
            events.extend(step(&mut det, &mut buf, 0.5));
        }
        for i in 0..10 {
            events.extend(step(&mut det, &mut buf, 0.5 + 0.06 * i as f64));
        }
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_too_few_channels_stays_silent() {
        let mut det = detector(test_config());
        let mut buf = SampleRingBuffer::new(
            1,
            HistoryConfig {
                sample_rate: RATE,
                buffer_seconds: 2,
            },
        );

        let mut out = Vec::new();
        for i in 0..30 {
            buf.write(&[0.5 + 0.06 * i as f64]);
            det.handle_next_sample(&buf, &mut out);
        }
        assert!(out.is_empty());
    }

    #[test]
    fn test_slope_channel_out_of_range_stays_silent() {
        let mut config = test_config();
        config.slope_channel = 5;
        let mut det = detector(config);
        let mut buf = history();

        let mut events = Vec::new();
        for _ in 0..20 {
            events.extend(step(&mut det, &mut buf, 0.5));
        }
        for i in 0..10 {
            events.extend(step(&mut det, &mut buf, 0.5 + 0.06 * i as f64));
        }
        assert!(events.is_empty());
    }

    #[test]
    fn test_inverted_thresholds_swapped() {
        let mut config = test_config();
        config.ch1_low = 0.9;
        config.ch1_high = 0.1;
        let det = detector(config);
        assert!(det.config.ch1_low <= det.config.ch1_high);
    }
}
