//! Pure Rust engine for OpenEEG-based gesture control: firmware-2 frame
//! decoding, rolling sample history, online gesture detection, and debounced
//! single-flight actuator orchestration.

pub mod actuator;
pub mod buffer;
pub mod error;
pub mod gesture;
pub mod orchestrator;
pub mod protocol;
pub mod reader;
pub mod source;

pub use actuator::{Actuator, ActuatorTask, DriveDirection, Motor, TaskStep};
pub use buffer::{HistoryConfig, SampleRingBuffer};
pub use error::{OpenEegError, Result};
pub use gesture::{
    EdgeSlopeConfig, EdgeSlopeDetector, FrequencyBandConfig, FrequencyBandDetector,
    GestureDetector, GestureEvent, GestureEventBus, GestureKind, GestureListener, LookDirection,
};
pub use orchestrator::{ActuatorOrchestrator, OrchestratorConfig};
pub use reader::{DetectorId, DeviceReader, ReaderConfig};
pub use source::ByteSource;
