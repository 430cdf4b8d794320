//! # Tether Codec Benchmarks
//!
//! Frame encode/decode cost across content sizes. The SHA-256 digest over
//! the content dominates for anything beyond a few hundred bytes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::RngCore;
use tether_types::{CorrelationId, MessageType, MessageTypeRegistry};
use tether_wire::{decode, encode, Request, Response};

const SIZES: [usize; 5] = [0, 64, 1024, 64 * 1024, 1024 * 1024];

const BLOB: MessageType = MessageType::from_static(300, "blob", "Benchmark payload");

fn payload(size: usize) -> Vec<u8> {
    let mut content = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut content);
    content
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame-encode");
    let id = CorrelationId::new();

    for size in SIZES {
        let content = payload(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &content, |b, content| {
            b.iter(|| black_box(encode(BLOB.code(), content, id).unwrap()))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame-decode");

    for size in SIZES {
        let bytes = encode(BLOB.code(), &payload(size), CorrelationId::new()).unwrap();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &bytes, |b, bytes| {
            b.iter(|| black_box(decode(bytes).unwrap()))
        });
    }
    group.finish();
}

fn bench_response_parse(c: &mut Criterion) {
    let registry = MessageTypeRegistry::new();
    registry.register(BLOB).unwrap();
    let bytes = Request::new(BLOB, payload(1024)).encode().unwrap();

    c.bench_function("response-parse-1k", |b| {
        b.iter(|| black_box(Response::parse(&bytes, &registry).unwrap()))
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_response_parse);
criterion_main!(benches);
