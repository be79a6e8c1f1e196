//! Gesture events, the detector contract, and the typed fan-out bus.
//!
//! The gesture vocabulary is a closed set of variants rather than an open
//! class hierarchy; detector pluggability lives in the single
//! [`GestureDetector`] capability trait.

mod band;
mod edge;

pub use band::{FrequencyBandConfig, FrequencyBandDetector};
pub use edge::{EdgeSlopeConfig, EdgeSlopeDetector};

use crate::buffer::SampleRingBuffer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Direction of an eye-movement gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookDirection {
    Left,
    Right,
}

impl LookDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// A detected control gesture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GestureEvent {
    /// Directional eye movement.
    Look { direction: LookDirection },
    /// Band energy rose above its thresholds (level-triggered latch).
    FreqStart,
    /// Band energy fell back below its thresholds.
    FreqComplete,
    /// Undirected threshold/slope edge.
    Slope,
}

impl GestureEvent {
    pub fn kind(&self) -> GestureKind {
        match self {
            Self::Look { .. } => GestureKind::Look,
            Self::FreqStart => GestureKind::FreqStart,
            Self::FreqComplete => GestureKind::FreqComplete,
            Self::Slope => GestureKind::Slope,
        }
    }
}

/// Discriminant used to key listener registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    Look,
    FreqStart,
    FreqComplete,
    Slope,
}

/// Online detector consuming the sample history.
///
/// Invoked synchronously once per decoded sample set, in registration order.
/// Implementations append zero or more events to `out`; they must not block.
pub trait GestureDetector: Send {
    fn handle_next_sample(&mut self, history: &SampleRingBuffer, out: &mut Vec<GestureEvent>);
}

/// Receiver side of the gesture fan-out.
pub trait GestureListener: Send + Sync {
    fn on_gesture(&self, event: &GestureEvent);
}

/// Ordered, duplicate-free fan-out of gesture events, keyed by kind.
///
/// Delivery is synchronous, inside the decode call, in registration order.
/// A listener counts as a duplicate when the same allocation is subscribed
/// to the same kind twice (`Arc::ptr_eq`).
#[derive(Default)]
pub struct GestureEventBus {
    listeners: Vec<(GestureKind, Arc<dyn GestureListener>)>,
}

impl GestureEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one gesture kind. Returns false if that exact
    /// listener is already registered for the kind.
    pub fn subscribe(&mut self, kind: GestureKind, listener: Arc<dyn GestureListener>) -> bool {
        let duplicate = self
            .listeners
            .iter()
            .any(|(k, l)| *k == kind && Arc::ptr_eq(l, &listener));
        if duplicate {
            return false;
        }
        self.listeners.push((kind, listener));
        true
    }

    /// Remove a previously registered listener. Returns whether it was found.
    pub fn unsubscribe(&mut self, kind: GestureKind, listener: &Arc<dyn GestureListener>) -> bool {
        let before = self.listeners.len();
        self.listeners
            .retain(|(k, l)| *k != kind || !Arc::ptr_eq(l, listener));
        self.listeners.len() != before
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    /// Deliver an event to every listener of its kind, in registration order.
    pub fn publish(&self, event: &GestureEvent) {
        let kind = event.kind();
        for (k, listener) in &self.listeners {
            if *k == kind {
                listener.on_gesture(event);
            }
        }
    }
}
