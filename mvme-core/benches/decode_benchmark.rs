//! Benchmarks for listfile decoder performance.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use mvme_core::output::{CsvSink, HistogramSink};
use mvme_core::parser::{FormatProfile, EVENT_END_MARKER, FILL_WORD};
use mvme_core::{ListfileDecoder, MemorySink};
use std::io::Write;

const EVENTS: u32 = 100_000;

/// Builds a V1 listfile with one MDPP-16 subevent per event.
fn synthetic_listfile(events: u32) -> Vec<u8> {
    let p = &FormatProfile::V1;
    let mut words = Vec::new();

    for i in 0..events {
        let payload = [
            0x4000_0000,
            0x1000_0000 | ((i % 16) << 16) | (i & 0xFFFF),
            0x1010_0000 | ((i % 16) << 16) | ((i * 7) & 0xFFFF),
            FILL_WORD,
            0xC000_0000 | ((i * 1000) & 0x3FFF_FFFF),
        ];
        words.push(p.encode_section_header(1, payload.len() as u32 + 2, 0));
        words.push(p.encode_subevent_header(4, payload.len() as u32));
        words.extend_from_slice(&payload);
        words.push(EVENT_END_MARKER);

        if i % 1000 == 999 {
            words.push(p.encode_section_header(3, 0, 0));
        }
    }
    words.push(p.encode_section_header(2, 0, 0));

    let mut bytes = b"MVME".to_vec();
    bytes.extend_from_slice(&1u32.to_le_bytes());
    bytes.extend(words.iter().flat_map(|w| w.to_le_bytes()));
    bytes
}

fn decode_buffer_benchmark(c: &mut Criterion) {
    let data = synthetic_listfile(EVENTS);

    let mut group = c.benchmark_group("decode_buffer");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("memory_sink_100k_events", |b| {
        b.iter(|| {
            let mut decoder = ListfileDecoder::new();
            let mut sink = MemorySink::new();
            decoder.decode_buffer(black_box(&data), &mut sink).unwrap();
            black_box(sink.events.len())
        })
    });

    group.bench_function("csv_and_histograms_100k_events", |b| {
        b.iter(|| {
            let mut decoder = ListfileDecoder::new();
            let mut sinks = (CsvSink::new(std::io::sink()), HistogramSink::default());
            let summary = decoder.decode_buffer(black_box(&data), &mut sinks).unwrap();
            black_box(summary.events)
        })
    });

    group.finish();
}

fn decode_file_benchmark(c: &mut Criterion) {
    let data = synthetic_listfile(EVENTS);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&data).unwrap();
    file.flush().unwrap();

    let mut group = c.benchmark_group("decode_file");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("full_file", |b| {
        b.iter(|| {
            let mut decoder = ListfileDecoder::new();
            let mut sink = HistogramSink::default();
            let summary = decoder.decode_file(black_box(file.path()), &mut sink).unwrap();
            black_box(summary.events)
        })
    });

    group.finish();
}

criterion_group!(benches, decode_buffer_benchmark, decode_file_benchmark);
criterion_main!(benches);
