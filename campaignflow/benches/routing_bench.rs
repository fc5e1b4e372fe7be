//! Benchmarks for status routing and branch update merging.

use campaignflow::context::ContextUpdate;
use campaignflow::core::RunStatus;
use campaignflow::stages::route_status;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn routing_benchmark(c: &mut Criterion) {
    let statuses = [
        None,
        Some(RunStatus::NotStarted),
        Some(RunStatus::Generated),
        Some(RunStatus::Edit),
        Some(RunStatus::Automate),
        Some(RunStatus::from("Archived")),
    ];

    c.bench_function("route_status", |b| {
        b.iter(|| {
            for status in &statuses {
                black_box(route_status(black_box(status.as_ref())));
            }
        })
    });
}

fn merge_benchmark(c: &mut Criterion) {
    c.bench_function("merge_disjoint_three_branches", |b| {
        b.iter(|| {
            let updates = [
                ("text", ContextUpdate::new().with_text_output(Some("copy".to_string()))),
                ("image", ContextUpdate::new().with_image_output(Some("img-9".to_string()))),
                (
                    "video",
                    ContextUpdate::new()
                        .with_video_output(Some("https://cdn.example.com/v.mp4".to_string())),
                ),
            ];
            black_box(ContextUpdate::merge_disjoint(updates))
        })
    });
}

criterion_group!(benches, routing_benchmark, merge_benchmark);
criterion_main!(benches);
