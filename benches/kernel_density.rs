use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::Point2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use perch::home_range::{estimate_area, Bandwidth, KernelDensity, KernelParams};

/// Uniform disc of radius `r` meters around a UTM-like origin.
fn random_relocations(rng: &mut StdRng, n: usize, r: f64) -> Vec<Point2<f64>> {
    (0..n)
        .map(|_| {
            let rho = r * rng.random::<f64>().sqrt();
            let theta = rng.random_range(0.0..std::f64::consts::TAU);
            Point2::new(540_000.0 + rho * theta.cos(), 4_806_000.0 + rho * theta.sin())
        })
        .collect()
}

fn bench_fit(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xB1BD);
    let pts = random_relocations(&mut rng, 90, 250.0);
    let mut group = c.benchmark_group("kernel_density/fit");

    for grid in [40usize, 60, 120] {
        let params = KernelParams::builder().grid(grid).build().unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(grid), &params, |b, params| {
            b.iter(|| KernelDensity::fit(black_box(&pts), Bandwidth::Reference, params).unwrap())
        });
    }
    group.finish();
}

/// One validator trial: subsample area with a fixed bandwidth.
fn bench_trial(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let pts = random_relocations(&mut rng, 90, 250.0);
    let params = KernelParams::default();
    let mut group = c.benchmark_group("kernel_density/trial");

    for n in [10usize, 50, 90] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                estimate_area(black_box(&pts[..n]), Bandwidth::Fixed(35.0), 95.0, &params)
                    .unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fit, bench_trial);
criterion_main!(benches);
