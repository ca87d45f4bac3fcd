// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::DMatrix;
use place_recognition_rs::core::spatial_index::SpatialIndex;

/// Positions along a noisy loop, one meter apart.
fn trajectory(n: usize) -> DMatrix<f64> {
    DMatrix::from_fn(n, 2, |i, c| {
        let angle = i as f64 / n as f64 * std::f64::consts::PI * 2.0;
        let radius = n as f64 / (2.0 * std::f64::consts::PI);
        let wobble = ((i * 7919) % 13) as f64 * 0.05;
        if c == 0 {
            radius * angle.cos() + wobble
        } else {
            radius * angle.sin() - wobble
        }
    })
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Spatial index");
    for &n in &[500, 1000, 2000] {
        let positions = trajectory(n);
        group.bench_with_input(BenchmarkId::new("build", n), &positions, |b, p| {
            b.iter(|| SpatialIndex::build(p, 10.0, 50.0))
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
