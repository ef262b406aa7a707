//! Integration tests for the periodic frame dump.
//!
//! Dumps are emitted from the acquisition thread, so they are collected by a
//! process-wide subscriber layer that keeps every `l2mps_bsa::dump` event.
//! Each test uses its own stream name and only looks at its own events.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use l2mps_bsa::archive::MemoryArchive;
use l2mps_bsa::frame::StreamFrame;
use l2mps_bsa::{BsaStream, ChannelFrameSource, FrameFeeder, StreamConfig};

const DUMP_TARGET: &str = "l2mps_bsa::dump";

/// One captured dump event.
#[derive(Debug, Clone, Default)]
struct DumpEntry {
    stream: String,
    message: String,
}

impl Visit for DumpEntry {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "stream" => self.stream = format!("{:?}", value),
            "message" => self.message = format!("{:?}", value),
            _ => {}
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "stream" {
            self.stream = value.to_string();
        }
    }
}

/// Layer appending dump events to a shared buffer.
struct DumpCollector {
    buffer: Arc<Mutex<Vec<DumpEntry>>>,
}

impl<S: Subscriber> Layer<S> for DumpCollector {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() != DUMP_TARGET {
            return;
        }
        let mut entry = DumpEntry::default();
        event.record(&mut entry);
        self.buffer.lock().push(entry);
    }
}

fn dump_buffer() -> Arc<Mutex<Vec<DumpEntry>>> {
    static BUFFER: OnceLock<Arc<Mutex<Vec<DumpEntry>>>> = OnceLock::new();
    BUFFER
        .get_or_init(|| {
            let buffer = Arc::new(Mutex::new(Vec::new()));
            let _ = tracing_subscriber::registry()
                .with(DumpCollector {
                    buffer: Arc::clone(&buffer),
                })
                .try_init();
            buffer
        })
        .clone()
}

fn dumps_for(stream: &str) -> Vec<DumpEntry> {
    dump_buffer()
        .lock()
        .iter()
        .filter(|e| e.stream == stream)
        .cloned()
        .collect()
}

fn start(stream: &str, debug: bool, interval: u64) -> (FrameFeeder, BsaStream) {
    dump_buffer();
    let config = StreamConfig::builder()
        .stream_name(stream)
        .record_prefix(format!("DUMP:{stream}"))
        .read_timeout(Duration::from_millis(50))
        .debug(debug)
        .debug_interval(interval)
        .build()
        .expect("valid config");
    let (feeder, source) = ChannelFrameSource::unbounded();
    let archive = Arc::new(MemoryArchive::new());
    let bsa = BsaStream::start(config, Box::new(source), archive.as_ref(), archive.clone())
        .expect("stream starts");
    (feeder, bsa)
}

fn wait_for_counter(stream: &BsaStream, n: u64) {
    let start = Instant::now();
    while stream.control().frame_counter() < n && start.elapsed() < Duration::from_secs(5) {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(stream.control().frame_counter(), n);
}

fn frame() -> Vec<u8> {
    StreamFrame::default().encode().to_vec()
}

#[test]
fn test_dump_every_interval_when_debug_on() {
    let (feeder, bsa) = start("test://dump-interval", true, 2);
    for _ in 0..3 {
        feeder.send(frame());
    }
    wait_for_counter(&bsa, 3);
    bsa.stop();

    let dumps = dumps_for("test://dump-interval");
    assert_eq!(dumps.len(), 1);
    assert!(dumps[0].message.contains("Stream data:"));
    assert!(dumps[0].message.ends_with("Stream received counter = 2"));
}

#[test]
fn test_no_dump_when_debug_off() {
    let (feeder, bsa) = start("test://dump-off", false, 1);
    for _ in 0..3 {
        feeder.send(frame());
    }
    wait_for_counter(&bsa, 3);
    bsa.stop();

    assert!(dumps_for("test://dump-off").is_empty());
}

#[test]
fn test_debug_flag_is_read_per_frame() {
    let (feeder, bsa) = start("test://dump-toggle", false, 1);
    feeder.send(frame());
    wait_for_counter(&bsa, 1);

    bsa.control().set_debug(true);
    feeder.send(frame());
    wait_for_counter(&bsa, 2);
    bsa.stop();

    let dumps = dumps_for("test://dump-toggle");
    assert_eq!(dumps.len(), 1);
    assert!(dumps[0].message.ends_with("Stream received counter = 2"));
}
