//! Benchmarks for event publication.

extern crate hostpatch;

use criterion::{criterion_group, criterion_main, Criterion};
use hostpatch::prelude::*;
use std::hint::black_box;

/// Benchmark publishing to a bus with no subscribers for the event type.
fn bench_publish_unsubscribed(c: &mut Criterion) {
    let bus = EventBus::new();

    c.bench_function("publish_unsubscribed", |b| {
        b.iter(|| {
            let mut ev = GainingLevel::new(PlayerId(1), black_box(2));
            black_box(bus.publish(&mut ev))
        });
    });
}

/// Benchmark publishing to sixteen handlers, half of them tombstoned.
fn bench_publish_sixteen(c: &mut Criterion) {
    let bus = EventBus::new();
    let subscriptions: Vec<Subscription> = (0..16)
        .map(|i| {
            bus.subscribe(move |ev: &mut GainingLevel| {
                if ev.new_level() == i {
                    ev.deny();
                }
            })
        })
        .collect();
    for sub in subscriptions.iter().step_by(2) {
        bus.unsubscribe(sub);
    }

    c.bench_function("publish_sixteen_half_removed", |b| {
        b.iter(|| {
            let mut ev = GainingLevel::new(PlayerId(1), black_box(99));
            black_box(bus.publish(&mut ev))
        });
    });
}

criterion_group!(benches, bench_publish_unsubscribed, bench_publish_sixteen);
criterion_main!(benches);
