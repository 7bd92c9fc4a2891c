use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sectionlist_core::{diff, Snapshot};

fn sectioned(sections: usize, per_section: u32, shift: u32) -> Snapshot<usize> {
    let mut builder = Snapshot::builder();
    for section in 0..sections {
        builder = builder.section(section, shift..shift + per_section);
    }
    builder.build().expect("unique ids")
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");
    for &per_section in &[100u32, 1_000, 10_000] {
        let old = sectioned(8, per_section, 0);
        let unchanged = old.clone();
        let scrolled = sectioned(8, per_section, per_section / 10);

        group.bench_with_input(
            BenchmarkId::new("unchanged", per_section),
            &per_section,
            |b, _| b.iter(|| diff(black_box(&old), black_box(&unchanged))),
        );
        group.bench_with_input(
            BenchmarkId::new("head_trim_tail_append", per_section),
            &per_section,
            |b, _| b.iter(|| diff(black_box(&old), black_box(&scrolled))),
        );
    }
    group.finish();
}

fn bench_snapshot_build(c: &mut Criterion) {
    c.bench_function("snapshot_build_80k", |b| {
        b.iter(|| sectioned(black_box(8), black_box(10_000), 0))
    });
}

criterion_group!(benches, bench_diff, bench_snapshot_build);
criterion_main!(benches);
