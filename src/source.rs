//! Byte source collaborator seam.
//!
//! The physical transport (serial/USB link) lives with the caller; this
//! module only fixes the contract it must satisfy and the line settings the
//! device expects.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Line rate the device firmware uses.
pub const BAUD_RATE: u32 = 57_600;

pub const DATA_BITS: u8 = 8;
pub const STOP_BITS: u8 = 1;

/// Default transport read-buffer size in bytes.
pub const READ_BUFFER_SIZE: usize = 256;

/// Serial line settings, 57600 8N1 by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub read_buffer_size: usize,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: BAUD_RATE,
            data_bits: DATA_BITS,
            stop_bits: STOP_BITS,
            read_buffer_size: READ_BUFFER_SIZE,
        }
    }
}

/// A transport that delivers raw device bytes via a push callback.
///
/// `start` runs the delivery loop, handing every received chunk to `sink`
/// (typically `DeviceReader::feed`), and returns when stopped or on a
/// transport failure. Failures never terminate the decode loop itself; the
/// caller decides whether to reconnect.
pub trait ByteSource: Send {
    fn connect(&mut self) -> Result<()>;

    fn start(&mut self, sink: &mut dyn FnMut(&[u8])) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;
}
