/// Shared audio ring performance benchmarks using Criterion
///
/// Run with: cargo bench --bench ring_benchmark
///
/// Benchmarks cover:
/// - Writer throughput at typical frame sizes
/// - Reader drain throughput
/// - Writer with concurrent readers attached
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use timbre_core::{calculate_buffer_size, AudioRing, WriterPolicy};

const WORD_SIZE: usize = 2;

fn make_ring(duration_words: usize, max_readers: usize) -> Arc<AudioRing> {
    let size = calculate_buffer_size(duration_words, WORD_SIZE, max_readers);
    AudioRing::new(size, WORD_SIZE, max_readers).unwrap()
}

fn make_frame(words: usize) -> Vec<u8> {
    let mut frame = Vec::with_capacity(words * WORD_SIZE);
    for i in 0..words {
        frame.extend_from_slice(&(i as i16).to_le_bytes());
    }
    frame
}

/// Benchmark: writer throughput for 10/20/100 ms frames at 16 kHz
fn bench_writer_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_writer");

    for frame_words in [160usize, 320, 1600].iter() {
        group.throughput(Throughput::Bytes((*frame_words * WORD_SIZE) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(frame_words),
            frame_words,
            |b, &words| {
                let ring = make_ring(16_000 * 15, 10);
                let writer = ring.create_writer(WriterPolicy::NonBlocking).unwrap();
                let frame = make_frame(words);
                b.iter(|| {
                    black_box(writer.write(&frame).unwrap());
                });
            },
        );
    }
    group.finish();
}

/// Benchmark: reader draining what a writer just produced
fn bench_reader_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_reader");

    for frame_words in [160usize, 320, 1600].iter() {
        group.throughput(Throughput::Bytes((*frame_words * WORD_SIZE) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(frame_words),
            frame_words,
            |b, &words| {
                let ring = make_ring(16_000 * 15, 10);
                let writer = ring.create_writer(WriterPolicy::NonBlocking).unwrap();
                let mut reader = ring.create_reader().unwrap();
                let frame = make_frame(words);
                let mut buf = vec![0u8; words * WORD_SIZE];
                b.iter(|| {
                    writer.write(&frame).unwrap();
                    black_box(reader.read(&mut buf).unwrap());
                });
            },
        );
    }
    group.finish();
}

/// Benchmark: writer throughput while idle readers hold cursors
fn bench_writer_with_readers(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_writer_with_readers");

    for reader_count in [1usize, 4, 10].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(reader_count),
            reader_count,
            |b, &count| {
                let ring = make_ring(16_000 * 15, 10);
                let writer = ring.create_writer(WriterPolicy::NonBlocking).unwrap();
                let _readers: Vec<_> = (0..count)
                    .map(|_| ring.create_reader().unwrap())
                    .collect();
                let frame = make_frame(320);
                b.iter(|| {
                    black_box(writer.write(&frame).unwrap());
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_writer_throughput,
    bench_reader_drain,
    bench_writer_with_readers
);
criterion_main!(benches);
