use criterion::{black_box, criterion_group, criterion_main, Criterion};

use cv_sgm_disparity::prelude::*;

#[path = "../tests/common/mod.rs"]
mod common;

fn sgm_bench(c: &mut Criterion) {

    // Synthetic pair with a constant shift of 4 pixels
    let frame = common::shifted_pair(64, 48, 4);

    // Build matchers
    let mut plain = StereoMatcher::new(
        MatcherConfig::default()
            .with_aggregation(AggregationConfig::Plain)
            .with_window(SearchWindow::horizontal(0, 8))
    ).unwrap();

    let mut sgm = StereoMatcher::new(
        MatcherConfig::default()
            .with_window(SearchWindow::horizontal(0, 8))
            .with_compute_right(false)
    ).unwrap();

    // Benchmark compute function
    c.bench_function("census plain 64x48", |b| b.iter(|| plain.compute_pair(black_box(&frame))));
    c.bench_function("census sgm 64x48", |b| b.iter(|| sgm.compute(black_box(&frame))));
}

criterion_group!(benches, sgm_bench);
criterion_main!(benches);
