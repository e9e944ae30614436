use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use muster::{IdGenStatus, LockSnowflakeGenerator, SystemClock, TimeSource};
use std::{
    sync::{Arc, Barrier},
    thread::scope,
    time::Instant,
};

struct FixedMockTime {
    millis: u64,
}

impl TimeSource for FixedMockTime {
    fn current_millis(&self) -> u64 {
        self.millis
    }
}

// Number of IDs generated per benchmark iteration (per-thread for
// multi-threaded).
const TOTAL_IDS: usize = 4096;

/// Benchmarks the hot path where IDs are always `Ready`.
fn bench_fixed_clock(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock/fixed");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                let generator =
                    LockSnowflakeGenerator::new(0, FixedMockTime { millis: 1 }).unwrap();
                for _ in 0..TOTAL_IDS {
                    match generator.poll_id().unwrap() {
                        IdGenStatus::Ready { id } => {
                            black_box(id);
                        }
                        IdGenStatus::Pending { .. } => unreachable!(),
                    }
                }
            }

            start.elapsed()
        });
    });

    group.finish();
}

/// Benchmarks against the wall clock, including waits on exhausted ticks.
fn bench_system_clock(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock/system");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        let generator = LockSnowflakeGenerator::new(0, SystemClock::default()).unwrap();
        b.iter(|| {
            for _ in 0..TOTAL_IDS {
                black_box(generator.next_id().unwrap());
            }
        });
    });

    group.finish();
}

/// Benchmarks contention on the shared lock.
fn bench_threaded(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock/threaded");

    for threads in [2, 4, 8] {
        group.throughput(Throughput::Elements((TOTAL_IDS * threads) as u64));
        group.bench_function(format!("threads/{threads}/elems/{TOTAL_IDS}"), |b| {
            b.iter_custom(|iters| {
                let generator = LockSnowflakeGenerator::new(0, SystemClock::default()).unwrap();
                let barrier = Arc::new(Barrier::new(threads + 1));
                let start = scope(|s| {
                    for _ in 0..threads {
                        let generator = generator.clone();
                        let barrier = Arc::clone(&barrier);
                        s.spawn(move || {
                            barrier.wait();
                            for _ in 0..iters {
                                for _ in 0..TOTAL_IDS {
                                    black_box(generator.next_id().unwrap());
                                }
                            }
                        });
                    }
                    barrier.wait();
                    Instant::now()
                });
                start.elapsed()
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_fixed_clock,
    bench_system_clock,
    bench_threaded
);
criterion_main!(benches);
