//! Deferred callback benchmarks
//!
//! Measures registration cost from native code and drain cost per env.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use emacs_bridge::{BridgeConfig, Channel, Env, GlobalRef, Lifecycle, MockHost, MockValue};
use std::sync::Arc;

fn setup(capacity: usize) -> (MockHost, Arc<Lifecycle>) {
    let host = MockHost::new();
    host.defun("sink", |_| Ok(MockValue::nil()));
    let config = BridgeConfig::default()
        .with_capacity(capacity)
        .with_drain_on_entry(false);
    (host, Lifecycle::new(config))
}

fn preserve_sink(host: &MockHost, lifecycle: &Arc<Lifecycle>) -> Arc<GlobalRef> {
    Env::scope(host, Arc::clone(lifecycle), |env| env.preserve(env.intern("sink")?)).unwrap()
}

fn bench_registration(c: &mut Criterion) {
    let mut group = c.benchmark_group("register");
    let (host, lifecycle) = setup(1 << 20);

    let on_event = Channel::new(Arc::clone(&lifecycle)).callback2::<i64, f64>(preserve_sink(&host, &lifecycle));

    group.bench_function("arity2", |b| {
        b.iter(|| on_event(black_box(1), black_box(0.5)));
        // Keep the queue from saturating between samples.
        Env::scope(&host, Arc::clone(&lifecycle), |env| env.drain_callbacks());
    });

    group.finish();
}

fn bench_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("drain");

    for size in [16, 256, 4096].iter() {
        group.bench_with_input(BenchmarkId::new("arity1", size), size, |b, &size| {
            let (host, lifecycle) = setup(size);
            let on_event = Channel::new(Arc::clone(&lifecycle)).callback1::<i64>(preserve_sink(&host, &lifecycle));

            b.iter(|| {
                for i in 0..size as i64 {
                    on_event(i);
                }
                Env::scope(&host, Arc::clone(&lifecycle), |env| black_box(env.drain_callbacks().delivered))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_registration, bench_drain);
criterion_main!(benches);
