//! Criterion benchmarks for the DESP frame codec.
//!
//! The receive loop decodes every datagram that reaches the shared port, so
//! decode cost bounds how much foreign traffic a session can shrug off.
//!
//! Run with:
//! ```bash
//! cargo bench --package desp-core --bench frame_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use desp_core::protocol::{decode_frame, encode_frame, Control};

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_frame");
    for size in [0usize, 64, 280, 8188] {
        let payload = vec![b'x'; size];
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, p| {
            b.iter(|| encode_frame(black_box(p)))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_frame");

    let ping = Control::Ping.to_frame();
    group.bench_function("control", |b| b.iter(|| decode_frame(black_box(&ping))));

    let message = encode_frame(&[b'x'; 280]);
    group.bench_function("message_280", |b| {
        b.iter(|| decode_frame(black_box(&message)))
    });

    let foreign = vec![0xffu8; 512];
    group.bench_function("foreign", |b| b.iter(|| decode_frame(black_box(&foreign))));

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
