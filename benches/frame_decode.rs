//! Criterion benchmarks for the per-frame hot path.
//!
//! At 360 Hz the budget per frame is generous, but decode and timestamp
//! correction run on every frame, so regressions here are worth catching.
//!
//! Run with: cargo bench --bench frame_decode

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use l2mps_bsa::frame::{self, FrameDump, StreamFrame, FRAME_SIZE};
use l2mps_bsa::TimestampPolicy;

fn sample_frame() -> StreamFrame {
    let mut frame = StreamFrame {
        header: 0x1234,
        timestamp_high: 0x5f5e_1000,
        timestamp_low: 0x3b9a_c9ff,
        ..Default::default()
    };
    for (i, d) in frame.data.iter_mut().enumerate() {
        *d = (i as u32) * 1000;
    }
    frame
}

fn decode_frame(c: &mut Criterion) {
    let bytes = sample_frame().encode();

    let mut group = c.benchmark_group("frame");
    group.throughput(Throughput::Bytes(FRAME_SIZE as u64));
    group.bench_function("decode", |b| {
        b.iter(|| frame::decode(black_box(&bytes)).ok());
    });
    group.bench_function("decode_and_correct", |b| {
        b.iter(|| {
            frame::decode(black_box(&bytes)).ok().map(|f| {
                TimestampPolicy::SwappedWords.correct(f.timestamp_high, f.timestamp_low)
            })
        });
    });
    group.finish();
}

fn format_dump(c: &mut Criterion) {
    let frame = sample_frame();
    let timestamp = TimestampPolicy::SwappedWords.correct(frame.timestamp_high, frame.timestamp_low);

    c.bench_function("frame_dump", |b| {
        b.iter(|| {
            FrameDump {
                frame: black_box(&frame),
                timestamp,
                counter: 360,
            }
            .to_string()
        });
    });
}

criterion_group!(benches, decode_frame, format_dump);
criterion_main!(benches);
