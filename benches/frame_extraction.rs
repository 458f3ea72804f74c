//! Benchmarks for the video frame path
//!
//! - Cutting full-resolution frames out of arbitrarily chunked transcoder output
//! - JPEG encoding of a full-resolution frame
//!
//! At 30fps the whole path has a ~33ms budget per frame.

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use flightdeck::test_utils::{ChunkedReader, frame_pattern};
use flightdeck::types::{FrameGeometry, RawFrame};
use flightdeck::video::{FrameExtractor, encode_jpeg};
use std::hint::black_box;

const GEOMETRY: FrameGeometry = FrameGeometry::new(960, 720);

/// Pipe reads rarely line up with frame boundaries; 64 KiB mirrors a typical pipe buffer.
const PIPE_CHUNK: usize = 64 * 1024;

fn bench_extraction(c: &mut Criterion) {
    let runtime =
        tokio::runtime::Builder::new_current_thread().build().expect("Failed to build runtime");
    let data = frame_pattern(GEOMETRY, 4);
    let sizes = vec![PIPE_CHUNK; data.len() / PIPE_CHUNK + 1];

    let mut group = c.benchmark_group("frame_extraction");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("four_frames_64k_chunks", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let reader = ChunkedReader::split(black_box(&data), &sizes);
                let mut extractor = FrameExtractor::new(reader, GEOMETRY);
                let mut frames = 0;
                while let Some(frame) = extractor.next_frame().await.expect("in-memory read") {
                    black_box(&frame);
                    frames += 1;
                }
                frames
            })
        })
    });

    group.finish();
}

fn bench_jpeg_encoding(c: &mut Criterion) {
    let data = (0..GEOMETRY.frame_len()).map(|i| (i % 253) as u8).collect();
    let frame = RawFrame::new(data, 0, GEOMETRY).expect("full window");

    let mut group = c.benchmark_group("jpeg_encoding");
    group.throughput(Throughput::Bytes(GEOMETRY.frame_len() as u64));
    group.sample_size(20);

    for quality in [50u8, 80, 95] {
        group.bench_function(format!("960x720_q{quality}"), |b| {
            b.iter(|| black_box(encode_jpeg(black_box(&frame), quality).expect("encode")))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_extraction, bench_jpeg_encoding);
criterion_main!(benches);
