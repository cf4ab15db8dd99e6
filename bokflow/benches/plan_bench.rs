//! Benchmarks for stage planning.

use bokflow::registry::{StageRegistry, GROUP_ALL, STAGE_PROC2, STAGE_SKYFLAT};
use bokflow::pipeline::StageScheduler;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn plan_benchmark(c: &mut Criterion) {
    let registry = StageRegistry::standard();
    let scheduler = StageScheduler::new(&registry);

    c.bench_function("plan_all", |b| {
        b.iter(|| scheduler.plan(black_box(&[GROUP_ALL][..])))
    });
    c.bench_function("plan_skyflat_proc2", |b| {
        b.iter(|| scheduler.plan(black_box(&[STAGE_SKYFLAT, STAGE_PROC2][..])))
    });
}

criterion_group!(benches, plan_benchmark);
criterion_main!(benches);
