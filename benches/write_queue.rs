/// Benchmarks for the write-queue ring: the producer path that runs on every
/// enqueue, including the eviction path taken during outages.
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use resilient_ws::ws::{Frame, WriteQueue};

fn bench_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_queue/push");
    let frame = Frame::text(r#"{"op":"order","side":"buy","price":"0.55","size":"100"}"#);

    for capacity in [16_usize, 1024] {
        group.throughput(Throughput::Elements(capacity as u64));
        group.bench_with_input(
            BenchmarkId::new("with_room", capacity),
            &capacity,
            |b, &capacity| {
                b.iter_batched(
                    || WriteQueue::bounded(capacity),
                    |queue| {
                        for _ in 0..capacity {
                            std::hint::black_box(queue.push(frame.clone()));
                        }
                        queue
                    },
                    BatchSize::SmallInput,
                );
            },
        );

        group.bench_with_input(
            BenchmarkId::new("evicting", capacity),
            &capacity,
            |b, &capacity| {
                let queue = WriteQueue::bounded(capacity);
                for _ in 0..capacity {
                    queue.push(frame.clone());
                }
                b.iter(|| {
                    for _ in 0..capacity {
                        std::hint::black_box(queue.push(frame.clone()));
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_queue/snapshot");

    for capacity in [16_usize, 1024] {
        let queue = WriteQueue::bounded(capacity);
        for n in 0..capacity {
            queue.push(Frame::binary(n.to_le_bytes().to_vec()));
        }
        group.throughput(Throughput::Elements(capacity as u64));
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &queue, |b, queue| {
            b.iter(|| std::hint::black_box(queue.snapshot()));
        });
    }

    group.finish();
}

criterion_group!(write_queue, bench_push, bench_snapshot);
criterion_main!(write_queue);
