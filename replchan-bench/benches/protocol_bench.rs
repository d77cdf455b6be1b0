//! Protocol encoding/decoding benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use replchan_protocol::{Decoder, Encoder, Exec, Frame, OpenChannel, State};

fn output_frame(size: usize) -> Frame {
    Frame::on_channel(7)
        .with_output("x".repeat(size))
        .with_state(State::Running)
}

fn bench_frame_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode");

    for size in [100, 1000, 10000] {
        let frame = output_frame(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| black_box(Encoder::encode(frame).unwrap()));
        });
    }

    group.finish();
}

fn bench_frame_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");

    for size in [100, 1000, 10000] {
        let encoded = Encoder::encode(&output_frame(size)).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| black_box(Decoder::decode(encoded).unwrap()));
        });
    }

    group.finish();
}

fn bench_control_roundtrip(c: &mut Criterion) {
    let frame = Frame::control(OpenChannel::create("exec", "execer")).with_ref("k3x9a");

    c.bench_function("control_roundtrip", |b| {
        b.iter(|| {
            let encoded = Encoder::encode(black_box(&frame)).unwrap();
            black_box(Decoder::decode(&encoded).unwrap())
        });
    });
}

fn bench_document_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_encode");

    for args in [1, 10, 100] {
        let document = serde_json::json!({
            "channel": 3,
            "exec": {
                "args": (0..args).map(|i| format!("arg-{}", i)).collect::<Vec<_>>(),
                "env": {"TERM": "xterm"},
            }
        });

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(args), &document, |b, doc| {
            b.iter(|| black_box(Encoder::encode_document(doc).unwrap()));
        });
    }

    group.finish();
}

fn bench_document_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_decode");

    for args in [1, 10, 100] {
        let frame = Frame::new(3, Exec::new((0..args).map(|i| format!("arg-{}", i))));
        let encoded = Encoder::encode(&frame).unwrap();

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(args), &encoded, |b, encoded| {
            b.iter(|| black_box(Decoder::decode_document(encoded).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_encode,
    bench_frame_decode,
    bench_control_roundtrip,
    bench_document_encode,
    bench_document_decode,
);

criterion_main!(benches);
