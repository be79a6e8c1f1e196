//! OpenEEG firmware-2 packet protocol.
//!
//! Frames are fixed at 17 bytes: two sync markers, a version byte, one
//! reserved byte (the device's packet counter, ignored here), then a
//! (high, low) byte pair per channel. Samples are normalized to [0, 1].

/// First sync marker byte.
pub const SYNC0: u8 = 0xA5;

/// Second sync marker byte.
pub const SYNC1: u8 = 0x5A;

/// Protocol version byte, doubles as the third sync marker.
pub const VERSION: u8 = 0x02;

/// Fixed frame length in bytes.
pub const PACKET_SIZE: usize = 17;

/// Device sample rate in Hz.
pub const SAMPLE_RATE: u32 = 256;

/// Offset of the first (high, low) channel pair inside a frame.
pub const CHANNEL_DATA_OFFSET: usize = 4;

pub const CHANNELS_MIN: usize = 1;
pub const CHANNELS_MAX: usize = 6;
pub const CHANNELS_DEFAULT: usize = 2;

/// Decode one (high, low) byte pair into a normalized sample.
///
/// The high byte is clamped to 0..=3 with sign-aware semantics: a byte with
/// the top bit set reads as negative and clamps to 0. The low byte is plain
/// unsigned. The 10-bit result is scaled by 1/1023.
pub fn decode_channel_pair(high: u8, low: u8) -> f64 {
    let high = (high as i8).clamp(0, 3) as i32;
    (high * 256 + low as i32) as f64 / 1023.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    Syncing,
    Locked,
}

/// Incremental frame decoder.
///
/// While syncing, a rolling window of the last 17 bytes is kept; whenever a
/// VERSION byte arrives the window is searched circularly for the
/// {SYNC0, SYNC1, VERSION} triple, and on a hit the match is rotated to the
/// front and decoding locks. Once locked, sync markers are never re-validated:
/// a byte dropped by the transport misaligns channel decoding until a
/// coincidental resync. Call [`PacketDecoder::reset`] to force a resync.
pub struct PacketDecoder {
    channels: usize,
    state: SyncState,
    frame: [u8; PACKET_SIZE],
    cursor: usize,
}

impl PacketDecoder {
    /// Create a decoder for the given channel count (validated by the caller).
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            state: SyncState::Syncing,
            frame: [0; PACKET_SIZE],
            cursor: 0,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Whether the decoder has locked onto the frame boundary.
    pub fn is_locked(&self) -> bool {
        self.state == SyncState::Locked
    }

    /// Drop any partial frame and re-enter the syncing state.
    pub fn reset(&mut self) {
        self.state = SyncState::Syncing;
        self.frame = [0; PACKET_SIZE];
        self.cursor = 0;
    }

    /// Feed one byte; returns a decoded per-channel sample set when the byte
    /// completes a frame. Partial frames persist across calls, so arbitrary
    /// chunking of the input loses no data.
    pub fn push(&mut self, byte: u8) -> Option<Vec<f64>> {
        match self.state {
            SyncState::Syncing => {
                self.frame[self.cursor] = byte;
                self.cursor = (self.cursor + 1) % PACKET_SIZE;

                if byte == VERSION {
                    if let Some(start) = self.find_sync() {
                        // Rotate the sync triple to the front of the frame;
                        // everything after it is the start of the payload.
                        for j in 0..3 {
                            self.frame[j] = self.frame[(j + start) % PACKET_SIZE];
                        }
                        self.state = SyncState::Locked;
                        self.cursor = 3;
                        log::info!("byte stream sync acquired");
                    }
                }
                None
            }
            SyncState::Locked => {
                self.frame[self.cursor] = byte;
                self.cursor += 1;
                if self.cursor >= PACKET_SIZE {
                    self.cursor = 0;
                    Some(self.decode_frame())
                } else {
                    None
                }
            }
        }
    }

    fn find_sync(&self) -> Option<usize> {
        (0..PACKET_SIZE).find(|&j| {
            self.frame[j] == SYNC0
                && self.frame[(j + 1) % PACKET_SIZE] == SYNC1
                && self.frame[(j + 2) % PACKET_SIZE] == VERSION
        })
    }

    fn decode_frame(&self) -> Vec<f64> {
        (0..self.channels)
            .map(|ch| {
                let at = CHANNEL_DATA_OFFSET + ch * 2;
                decode_channel_pair(self.frame[at], self.frame[at + 1])
            })
            .collect()
    }
}
