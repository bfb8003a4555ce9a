use criterion::{black_box, criterion_group, criterion_main, Criterion};
use livemetrics::{HistogramQuery, LiveMetrics, MetricsConfig};

fn registry() -> LiveMetrics {
    let config = MetricsConfig {
        process_gauges: false,
        ..MetricsConfig::default()
    };
    LiveMetrics::new(config, || true).unwrap()
}

fn bench_writes(c: &mut Criterion) {
    let metrics = registry();
    let mut group = c.benchmark_group("Writes");

    group.bench_function("mark", |b| {
        b.iter(|| metrics.mark(black_box("request"), black_box("ok")));
    });

    group.bench_function("gauge", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            metrics.gauge(black_box("queue"), i);
        });
    });

    group.bench_function("histogram (full reservoir)", |b| {
        for i in 0..2048 {
            metrics.histogram("latency", i as f64);
        }
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            metrics.histogram(black_box("latency"), (i % 1000) as f64);
        });
    });

    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let metrics = registry();
    for i in 0..10_000 {
        metrics.mark("request", if i % 10 == 0 { "error" } else { "ok" });
        metrics.histogram("latency", (i % 500) as f64);
    }
    let query = HistogramQuery::default();

    let mut group = c.benchmark_group("Queries");

    group.bench_function("meters", |b| {
        b.iter(|| black_box(metrics.get_meters(None, None, None).unwrap()));
    });

    group.bench_function("histogram report", |b| {
        b.iter(|| black_box(metrics.get_histograms(Some("latency"), None, &query).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_writes, bench_queries);
criterion_main!(benches);
