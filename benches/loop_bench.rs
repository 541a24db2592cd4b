//! Benchmarks for the event loop.
//!
//! Benchmarks cover:
//! - Schedule-to-run throughput on a started loop
//! - Scheduling from several producer threads
//! - Promise settlement and continuation delivery
//! - Resource track/untrack

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nloop::core::{
    CancellationSource, DisposeAction, EventLoop, ResourceTrackingScheduler, SchedulerExt,
};

// ============================================================================
// Helpers
// ============================================================================

fn running_loop() -> EventLoop {
    let event_loop = EventLoop::new();
    if let Err(e) = event_loop.start(|| {}) {
        panic!("failed to start event loop: {e}");
    }
    event_loop
}

/// Block until every callback scheduled so far has run.
fn drain(event_loop: &EventLoop) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    event_loop.schedule(move || {
        let _ = tx.send(());
    });
    let _ = rx.recv_timeout(Duration::from_secs(10));
}

// ============================================================================
// Scheduling
// ============================================================================

fn bench_schedule_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule_throughput");
    let event_loop = running_loop();

    for size in [100u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                for i in 0..size {
                    event_loop.schedule(move || {
                        black_box(i);
                    });
                }
                drain(&event_loop);
            });
        });
    }
    group.finish();
}

fn bench_schedule_multi_producer(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule_multi_producer");
    let event_loop = running_loop();
    let per_producer = 1_000u64;

    for producers in [2u64, 4, 8] {
        group.throughput(Throughput::Elements(producers * per_producer));
        group.bench_with_input(
            BenchmarkId::from_parameter(producers),
            &producers,
            |b, &producers| {
                b.iter(|| {
                    let threads: Vec<_> = (0..producers)
                        .map(|_| {
                            let handle = event_loop.handle();
                            thread::spawn(move || {
                                for i in 0..per_producer {
                                    handle.schedule(move || {
                                        black_box(i);
                                    });
                                }
                            })
                        })
                        .collect();
                    for t in threads {
                        let _ = t.join();
                    }
                    drain(&event_loop);
                });
            },
        );
    }
    group.finish();
}

// ============================================================================
// Promises
// ============================================================================

fn bench_promise_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("promise_resolve");
    let event_loop = running_loop();

    for continuations in [1usize, 8, 64] {
        group.bench_with_input(
            BenchmarkId::from_parameter(continuations),
            &continuations,
            |b, &continuations| {
                b.iter(|| {
                    let deferred = event_loop.defer::<u64>();
                    let promise = deferred.promise();
                    for _ in 0..continuations {
                        promise.then(|value| {
                            black_box(value);
                        });
                    }
                    deferred.resolve(42);
                    drain(&event_loop);
                });
            },
        );
    }
    group.finish();
}

// ============================================================================
// Resource tracking
// ============================================================================

fn bench_track_untrack(c: &mut Criterion) {
    let event_loop = running_loop();
    let resource = DisposeAction::shared(|| {});

    c.bench_function("track_untrack", |b| {
        b.iter(|| {
            let source = CancellationSource::new();
            if let Ok(handle) = event_loop.track_resource(&source.token(), Arc::clone(&resource)) {
                black_box(handle.untrack());
            }
        });
    });
}

criterion_group!(
    benches,
    bench_schedule_throughput,
    bench_schedule_multi_producer,
    bench_promise_resolve,
    bench_track_untrack,
);
criterion_main!(benches);
