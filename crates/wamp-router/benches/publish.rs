//! Publish fan-out benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use wamp_router::{PublishFilter, TopicRegistry};

const TOPIC: &str = "http://example.com/bench";

fn registry_with(subscribers: usize) -> TopicRegistry {
    let registry = TopicRegistry::new();
    for i in 0..subscribers {
        registry.subscribe(TOPIC, &format!("session-{}", i));
    }
    registry
}

fn resolve_recipients_benchmark(c: &mut Criterion) {
    let registry = registry_with(1000);
    let filter = PublishFilter::all();

    c.bench_function("publish_1000_subscribers", |b| {
        b.iter(|| black_box(registry.publish(TOPIC, &filter)))
    });
}

fn filtered_benchmark(c: &mut Criterion) {
    let registry = registry_with(1000);
    let filter = PublishFilter::new(
        (0..100).map(|i| format!("session-{}", i)),
        (0..500).map(|i| format!("session-{}", i)),
    );

    c.bench_function("publish_1000_subscribers_filtered", |b| {
        b.iter(|| black_box(registry.publish(TOPIC, &filter)))
    });
}

fn churn_benchmark(c: &mut Criterion) {
    let registry = registry_with(1000);
    let session = "session-churn".to_string();

    c.bench_function("subscribe_unsubscribe", |b| {
        b.iter(|| {
            registry.subscribe(TOPIC, &session);
            registry.unsubscribe(TOPIC, &session);
        })
    });
}

criterion_group!(
    benches,
    resolve_recipients_benchmark,
    filtered_benchmark,
    churn_benchmark
);
criterion_main!(benches);
