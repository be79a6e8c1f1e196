//! End-to-end tests: raw byte stream in, gesture events out.

use openeeg_rs::{
    DeviceReader, EdgeSlopeConfig, EdgeSlopeDetector, GestureEvent, GestureKind, GestureListener,
    HistoryConfig, LookDirection, ReaderConfig,
};
use parking_lot::Mutex;
use std::sync::Arc;

const SYNC0: u8 = 0xA5;
const SYNC1: u8 = 0x5A;
const VERSION: u8 = 0x02;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Encode one two-channel frame carrying the same normalized value on both
/// channels.
fn frame_for(value: f64) -> Vec<u8> {
    let raw = (value.clamp(0.0, 1.0) * 1023.0).round() as u16;
    let high = (raw >> 8) as u8;
    let low = (raw & 0xFF) as u8;
    let mut bytes = vec![SYNC0, SYNC1, VERSION, 0x00, high, low, high, low];
    bytes.resize(17, 0x00);
    bytes
}

struct Collector {
    events: Arc<Mutex<Vec<GestureEvent>>>,
}

impl GestureListener for Collector {
    fn on_gesture(&self, event: &GestureEvent) {
        self.events.lock().push(*event);
    }
}

fn look_test_config() -> EdgeSlopeConfig {
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

#[test]
fn wire_format_decodes_bit_exactly() {
    init_logging();
    let mut reader = DeviceReader::new(ReaderConfig::default());

    let (h0, l0, h1, l1) = (0x01u8, 0x40u8, 0x02u8, 0x10u8);
    let mut bytes = vec![SYNC0, SYNC1, VERSION, 0x00, h0, l0, h1, l1];
    bytes.resize(17, 0x00);
    reader.feed(&bytes);

    assert_eq!(reader.history().sample_count(), 1);
    assert_eq!(reader.history().read(0, 0), (256.0 + 64.0) / 1023.0);
    assert_eq!(reader.history().read(1, 0), (512.0 + 16.0) / 1023.0);
}

#[test]
fn wire_format_clamps_header_fields() {
    init_logging();
    let mut reader = DeviceReader::new(ReaderConfig::default());

    // High bytes with the top bit set clamp to 0; above 3 clamps to 3.
    let mut bytes = vec![SYNC0, SYNC1, VERSION, 0x00, 0xF0, 0x05, 0x09, 0x00];
    bytes.resize(17, 0x00);
    reader.feed(&bytes);

    assert_eq!(reader.history().read(0, 0), 5.0 / 1023.0);
    assert_eq!(reader.history().read(1, 0), 768.0 / 1023.0);
}

#[test]
fn decoder_locks_after_noise_prefix() {
    init_logging();
    let mut reader = DeviceReader::new(ReaderConfig::default());

    // Noise that includes stray sync-ish bytes, then a clean frame.
    let mut stream = vec![0x00, 0xA5, 0x13, 0x5A, 0x02];
    stream.extend(frame_for(0.5));
    reader.feed(&stream);

    // The noise consumes the first frame's payload positions after locking
    // mid-noise; only complete frames after lock count.
    assert!(reader.history().sample_count() >= 1);
    let newest = reader.history().read(0, 0);
    assert!((0.0..=1.0).contains(&newest));
}

#[test]
fn look_gesture_detected_from_byte_stream() {
    init_logging();
    let mut reader = DeviceReader::new(ReaderConfig {
        channels: 2,
        history: HistoryConfig {
            sample_rate: 256,
            buffer_seconds: 10,
        },
    });
    let id = reader.add_detector(Box::new(EdgeSlopeDetector::new(look_test_config())));

    let events = Arc::new(Mutex::new(Vec::new()));
    reader.subscribe(
        id,
        GestureKind::Look,
        Arc::new(Collector {
            events: Arc::clone(&events),
        }),
    );

    // A stretch at center, then a rising ramp through the high thresholds.
    let mut stream = Vec::new();
    for _ in 0..40 {
        stream.extend(frame_for(0.5));
    }
    for i in 0..15 {
        stream.extend(frame_for(0.5 + 0.04 * i as f64));
    }
    reader.feed(&stream);

    assert_eq!(
        *events.lock(),
        vec![GestureEvent::Look {
            direction: LookDirection::Left
        }]
    );
}

#[test]
fn look_gesture_survives_chunked_delivery() {
    init_logging();
    let mut reader = DeviceReader::new(ReaderConfig::default());
    let id = reader.add_detector(Box::new(EdgeSlopeDetector::new(look_test_config())));

    let events = Arc::new(Mutex::new(Vec::new()));
    reader.subscribe(
        id,
        GestureKind::Look,
        Arc::new(Collector {
            events: Arc::clone(&events),
        }),
    );

    let mut stream = Vec::new();
    for _ in 0..40 {
        stream.extend(frame_for(0.5));
    }
    for i in 0..15 {
        stream.extend(frame_for(0.5 - 0.04 * i as f64));
    }

    // Deliver in awkward chunk sizes that split frames.
    for chunk in stream.chunks(7) {
        reader.feed(chunk);
    }

    assert_eq!(
        *events.lock(),
        vec![GestureEvent::Look {
            direction: LookDirection::Right
        }]
    );
}

#[test]
fn two_detectors_keep_distinct_audiences() {
    init_logging();
    let mut reader = DeviceReader::new(ReaderConfig::default());
    let first = reader.add_detector(Box::new(EdgeSlopeDetector::new(look_test_config())));
    let second = reader.add_detector(Box::new(EdgeSlopeDetector::new(look_test_config())));

    let first_events = Arc::new(Mutex::new(Vec::new()));
    let second_events = Arc::new(Mutex::new(Vec::new()));
    reader.subscribe(
        first,
        GestureKind::Look,
        Arc::new(Collector {
            events: Arc::clone(&first_events),
        }),
    );
    reader.subscribe(
        second,
        GestureKind::Look,
        Arc::new(Collector {
            events: Arc::clone(&second_events),
        }),
    );

    let mut stream = Vec::new();
    for _ in 0..40 {
        stream.extend(frame_for(0.5));
    }
    for i in 0..15 {
        stream.extend(frame_for(0.5 + 0.04 * i as f64));
    }
    reader.feed(&stream);

    // Identical detectors, identical input: both audiences hear their own
    // slot exactly once.
    assert_eq!(first_events.lock().len(), 1);
    assert_eq!(second_events.lock().len(), 1);
}
