//! Codec Benchmark for Shardis
//!
//! Measures RESP parse and serialize throughput on the frame shapes the
//! proxy actually moves: commands from clients and replies from backends.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use shardis::command::{decode_command, Command};
use shardis::protocol::{parse_frame, RespValue};

/// Benchmark parsing backend replies
fn bench_parse(c: &mut Criterion) {
    let bulk = b"$11\r\nhello world\r\n".to_vec();
    let nested: Vec<u8> = RespValue::array(vec![
        RespValue::integer(1),
        RespValue::array(vec![
            RespValue::bulk_string(Bytes::from("alpha")),
            RespValue::bulk_string(Bytes::from("beta")),
        ]),
        RespValue::simple_string("OK"),
    ])
    .serialize();
    let large_bulk = {
        let payload = "x".repeat(16 * 1024);
        let mut buf = format!("${}\r\n", payload.len()).into_bytes();
        buf.extend_from_slice(payload.as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf
    };

    let mut group = c.benchmark_group("parse");

    group.throughput(Throughput::Bytes(bulk.len() as u64));
    group.bench_function("bulk_string", |b| {
        b.iter(|| black_box(parse_frame(black_box(&bulk)).unwrap()));
    });

    group.throughput(Throughput::Bytes(nested.len() as u64));
    group.bench_function("nested_array", |b| {
        b.iter(|| black_box(parse_frame(black_box(&nested)).unwrap()));
    });

    group.throughput(Throughput::Bytes(large_bulk.len() as u64));
    group.bench_function("bulk_16k", |b| {
        b.iter(|| black_box(parse_frame(black_box(&large_bulk)).unwrap()));
    });

    group.finish();
}

/// Benchmark decoding client commands
fn bench_decode_command(c: &mut Criterion) {
    let get = Command::get("user:1000").to_resp();
    let set = Command::set("user:1000", "some medium sized value here").to_resp();

    let mut group = c.benchmark_group("decode_command");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get", |b| {
        b.iter(|| black_box(decode_command(black_box(&get)).unwrap()));
    });

    group.bench_function("set", |b| {
        b.iter(|| black_box(decode_command(black_box(&set)).unwrap()));
    });

    group.finish();
}

/// Benchmark serializing replies back to clients
fn bench_serialize(c: &mut Criterion) {
    let bulk = RespValue::bulk_string(Bytes::from("hello world"));
    let array = RespValue::array(
        (0..16)
            .map(|i| RespValue::bulk_string(Bytes::from(format!("element:{}", i))))
            .collect(),
    );

    let mut group = c.benchmark_group("serialize");
    group.throughput(Throughput::Elements(1));

    group.bench_function("bulk_string", |b| {
        b.iter(|| black_box(black_box(&bulk).serialize()));
    });

    group.bench_function("array_16", |b| {
        b.iter(|| black_box(black_box(&array).serialize()));
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_decode_command, bench_serialize);
criterion_main!(benches);
