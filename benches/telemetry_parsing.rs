//! Benchmarks for telemetry datagram parsing
//!
//! The drone broadcasts state at ~10Hz, so parsing is never the bottleneck; these
//! numbers guard against accidental quadratic behavior in the splitter.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use flightdeck::TelemetrySnapshot;
use std::hint::black_box;

const STATE_DATAGRAM: &str = "mid:-1;x:0;y:0;z:0;mpry:0,0,0;pitch:0;roll:-1;yaw:15;vgx:0;vgy:0;\
vgz:0;templ:70;temph:73;tof:10;h:0;bat:87;baro:152.63;time:0;agx:-2.00;agy:13.00;agz:-999.00;\r\n";

fn bench_parse_state_datagram(c: &mut Criterion) {
    let mut group = c.benchmark_group("telemetry_parse");
    group.throughput(Throughput::Bytes(STATE_DATAGRAM.len() as u64));

    group.bench_function("full_state_datagram", |b| {
        b.iter(|| black_box(TelemetrySnapshot::parse(black_box(STATE_DATAGRAM))))
    });

    group.finish();
}

fn bench_parse_field_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("telemetry_parse_fields");

    for fields in [4usize, 32, 256] {
        let datagram: String = (0..fields).map(|i| format!("field{i}:{i}.5;")).collect();
        group.throughput(Throughput::Elements(fields as u64));
        group.bench_with_input(BenchmarkId::from_parameter(fields), &datagram, |b, datagram| {
            b.iter(|| black_box(TelemetrySnapshot::parse(black_box(datagram))))
        });
    }

    group.finish();
}

fn bench_accessors(c: &mut Criterion) {
    let snapshot = TelemetrySnapshot::parse(STATE_DATAGRAM);

    c.bench_function("telemetry_accessors", |b| {
        b.iter(|| {
            let snapshot = black_box(&snapshot);
            black_box((snapshot.battery(), snapshot.height(), snapshot.velocity()))
        })
    });
}

criterion_group!(benches, bench_parse_state_datagram, bench_parse_field_count, bench_accessors);
criterion_main!(benches);
