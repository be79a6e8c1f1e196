//! Device reader: decoder, history, and detector fan-out.
//!
//! The byte source collaborator pushes arbitrary-length chunks into
//! [`DeviceReader::feed`]; each fully decoded frame lands in the sample
//! history and is then offered to every registered detector synchronously,
//! in registration order. Nothing on this path blocks.

use crate::buffer::{HistoryConfig, SampleRingBuffer};
use crate::gesture::{GestureDetector, GestureEvent, GestureEventBus, GestureKind, GestureListener};
use crate::protocol::{PacketDecoder, CHANNELS_DEFAULT, CHANNELS_MAX, CHANNELS_MIN};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Channel count carried by the device, 1..=6.
    pub channels: usize,

    #[serde(flatten)]
    pub history: HistoryConfig,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            channels: CHANNELS_DEFAULT,
            history: HistoryConfig::default(),
        }
    }
}

/// Identifies a registered detector slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorId(usize);

struct DetectorSlot {
    detector: Box<dyn GestureDetector>,
    bus: GestureEventBus,
}

pub struct DeviceReader {
    decoder: PacketDecoder,
    history: SampleRingBuffer,
    slots: Vec<DetectorSlot>,
    scratch: Vec<GestureEvent>,
}

impl DeviceReader {
    pub fn new(config: ReaderConfig) -> Self {
        let channels = if config.channels < CHANNELS_MIN {
            log::warn!(
                "at least {} channel(s) necessary, clamping channel count",
                CHANNELS_MIN
            );
            CHANNELS_MIN
        } else if config.channels > CHANNELS_MAX {
            log::warn!(
                "at most {} channels possible, clamping channel count",
                CHANNELS_MAX
            );
            CHANNELS_MAX
        } else {
            config.channels
        };

        Self {
            decoder: PacketDecoder::new(channels),
            history: SampleRingBuffer::new(channels, config.history),
            slots: Vec::new(),
            scratch: Vec::new(),
        }
    }

    pub fn channels(&self) -> usize {
        self.decoder.channels()
    }

    pub fn history(&self) -> &SampleRingBuffer {
        &self.history
    }

    /// Register a detector. Each slot owns its own event bus, so two
    /// detectors of the same kind keep distinct audiences.
    pub fn add_detector(&mut self, detector: Box<dyn GestureDetector>) -> DetectorId {
        self.slots.push(DetectorSlot {
            detector,
            bus: GestureEventBus::new(),
        });
        DetectorId(self.slots.len() - 1)
    }

    /// Subscribe a listener to one gesture kind of one detector slot.
    pub fn subscribe(
        &mut self,
        id: DetectorId,
        kind: GestureKind,
        listener: Arc<dyn GestureListener>,
    ) -> bool {
        match self.slots.get_mut(id.0) {
            Some(slot) => slot.bus.subscribe(kind, listener),
            None => {
                log::warn!("subscribe on unknown detector slot {}", id.0);
                false
            }
        }
    }

    pub fn unsubscribe(
        &mut self,
        id: DetectorId,
        kind: GestureKind,
        listener: &Arc<dyn GestureListener>,
    ) -> bool {
        self.slots
            .get_mut(id.0)
            .is_some_and(|slot| slot.bus.unsubscribe(kind, listener))
    }

    /// Push-callback entry point for the byte source. Decodes as far as the
    /// chunk allows; partial frames persist until the next call.
    pub fn feed(&mut self, bytes: &[u8]) {
        let Self {
            decoder,
            history,
            slots,
            scratch,
        } = self;

        for &byte in bytes {
            if let Some(sample_set) = decoder.push(byte) {
                history.write(&sample_set);
                for slot in slots.iter_mut() {
                    scratch.clear();
                    slot.detector.handle_next_sample(history, scratch);
                    for event in scratch.iter() {
                        slot.bus.publish(event);
                    }
                }
            }
        }
    }

    /// Drop history and any partial frame, forcing a fresh sync. Done on
    /// every connect of the byte source.
    pub fn reset(&mut self) {
        self.decoder.reset();
        self.history.reset();
    }
}
