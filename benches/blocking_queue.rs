//! Benchmarks for the bounded blocking queue.
//!
//! The queue carries one command per device per round plus bounded
//! single-grain traffic, so absolute throughput matters less than keeping
//! the uncontended path cheap and the blocking path honest.

use std::sync::Arc;
use std::thread;

use balancer_rs::BlockingQueue;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

const OPS_PER_ITER: u64 = 10_000;

/// Alternating push/pop on one thread: the uncontended fast path.
fn bench_push_pop_alternating(c: &mut Criterion) {
    let mut group = c.benchmark_group("blocking_queue");
    group.throughput(Throughput::Elements(OPS_PER_ITER));

    group.bench_function("push_pop_alternating", |b| {
        let queue = BlockingQueue::new(64);
        b.iter(|| {
            for i in 0..OPS_PER_ITER {
                queue.push(black_box(i));
                black_box(queue.pop());
            }
        });
    });

    group.bench_function("fill_then_drain", |b| {
        let queue = BlockingQueue::new(1024);
        b.iter(|| {
            for i in 0..1024u64 {
                queue.push(black_box(i));
            }
            for _ in 0..1024u64 {
                black_box(queue.pop());
            }
        });
    });

    group.finish();
}

/// Producer and consumer on separate threads through a small queue, so
/// both blocking directions get exercised.
fn bench_cross_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("blocking_queue");
    group.throughput(Throughput::Elements(OPS_PER_ITER));

    group.bench_function("cross_thread_small_capacity", |b| {
        b.iter(|| {
            let queue = BlockingQueue::new(16);
            let tx = Arc::clone(&queue);
            let producer = thread::spawn(move || {
                for i in 0..OPS_PER_ITER {
                    tx.push(i);
                }
            });
            let mut sum = 0u64;
            for _ in 0..OPS_PER_ITER {
                sum = sum.wrapping_add(queue.pop());
            }
            producer.join().unwrap();
            black_box(sum)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_push_pop_alternating, bench_cross_thread);
criterion_main!(benches);
