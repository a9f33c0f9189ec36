use criterion::{black_box, criterion_group, criterion_main, Criterion};
use page_snapshot::inspector::PageGeometry;
use page_snapshot::{format_timestamp, sanitize_component, ArtifactName, Config, RawLayoutMetrics};
use std::time::Duration;

// Fast settings for all benchmarks
fn configure_fast_group(group: &mut criterion::BenchmarkGroup<criterion::measurement::WallTime>) {
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_millis(500));
    group.sample_size(20);
}

fn benchmark_config_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("config");
    configure_fast_group(&mut group);

    group.bench_function("creation", |b| {
        b.iter(|| {
            let config = Config::default();
            black_box(config);
        });
    });

    group.finish();
}

fn benchmark_scroll_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("scroll_planning");
    configure_fast_group(&mut group);

    let pages = vec![(800, 1000), (2500, 1000), (48_000, 1080)];

    group.bench_function("plan_offsets", |b| {
        b.iter(|| {
            for (scroll_height, client_height) in &pages {
                let geometry = PageGeometry::from_raw(&RawLayoutMetrics {
                    doc_scroll_height: *scroll_height,
                    doc_client_height: *client_height,
                    ..Default::default()
                });
                black_box(geometry.plan_offsets());
            }
        });
    });

    group.finish();
}

fn benchmark_artifact_naming(c: &mut Criterion) {
    let mut group = c.benchmark_group("artifact_naming");
    configure_fast_group(&mut group);

    let titles = vec![
        "Example Page",
        "Breaking: Markets rally / Stocks up 3% (live)",
        "Café – Menü & Öffnungszeiten",
    ];

    group.bench_function("sanitize", |b| {
        b.iter(|| {
            for title in &titles {
                black_box(sanitize_component(title));
            }
        });
    });

    group.bench_function("segment_filenames", |b| {
        let name = ArtifactName::new(format_timestamp(chrono::Utc::now()), titles[1]);
        b.iter(|| {
            for index in 0..10 {
                black_box(name.segment_filename("png", index, 10));
            }
        });
    });

    group.bench_function("timestamp", |b| {
        let now = chrono::Utc::now();
        b.iter(|| black_box(format_timestamp(now)));
    });

    group.finish();
}

criterion_group!(
    unit_benches,
    benchmark_config_creation,
    benchmark_scroll_planning,
    benchmark_artifact_naming
);
criterion_main!(unit_benches);
