//! Event-loop performance benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use looplab::prelude::*;

fn virtual_loop() -> EventLoop {
    EventLoop::with_config(LoopConfig {
        clock: ClockMode::Virtual,
        io_threads: 1,
    })
    .unwrap()
}

fn bench_microtask_drain(c: &mut Criterion) {
    c.bench_function("microtask_drain_1000", |b| {
        b.iter(|| {
            let mut event_loop = virtual_loop();
            let handle = event_loop.handle();
            for i in 0..1000 {
                handle
                    .enqueue_microtask(move || {
                        black_box(i);
                    })
                    .unwrap();
            }
            event_loop.run();
            black_box(event_loop.stats().microtasks_run);
        })
    });
}

fn bench_deferred_drain(c: &mut Criterion) {
    c.bench_function("deferred_drain_1000", |b| {
        b.iter(|| {
            let mut event_loop = virtual_loop();
            let handle = event_loop.handle();
            for i in 0..1000 {
                handle
                    .defer(move || {
                        black_box(i);
                    })
                    .unwrap();
            }
            event_loop.run();
            black_box(event_loop.stats().deferred_run);
        })
    });
}

fn bench_timer_scheduling(c: &mut Criterion) {
    c.bench_function("timer_schedule_and_fire_1000", |b| {
        b.iter(|| {
            let mut event_loop = virtual_loop();
            let handle = event_loop.handle();
            for i in 0..1000u64 {
                handle
                    .set_timeout(i % 10, move || {
                        black_box(i);
                    })
                    .unwrap();
            }
            event_loop.run();
            black_box(event_loop.stats().timers_run);
        })
    });
}

fn bench_promise_chain(c: &mut Criterion) {
    c.bench_function("promise_chain_100", |b| {
        b.iter(|| {
            let mut event_loop = virtual_loop();
            let handle = event_loop.handle();
            let mut promise = Promise::fulfilled(&handle, 0u64);
            for _ in 0..100 {
                promise = promise.then(|v| black_box(v + 1));
            }
            event_loop.run();
        })
    });
}

criterion_group!(
    benches,
    bench_microtask_drain,
    bench_deferred_drain,
    bench_timer_scheduling,
    bench_promise_chain
);
criterion_main!(benches);
