use cf_inference::bootstrap::{BootstrapConfig, bootstrap_ate, estimate_ate};
use cf_inference::propensity::PropensityConfig;
use cf_inference::synthetic::{SimulationConfig, simulate_confounded};
use cf_inference::weights::WeightConfig;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn bench_single_estimate(c: &mut Criterion) {
    let mut group = c.benchmark_group("ipw/estimate_ate");
    for n in [200usize, 2_000, 20_000] {
        let table =
            simulate_confounded(&SimulationConfig { n_rows: n, ..Default::default() }).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &table, |b, t| {
            let (p, w) = (PropensityConfig::default(), WeightConfig::default());
            b.iter(|| estimate_ate(black_box(t), &p, &w, 0.95).unwrap())
        });
    }
    group.finish();
}

fn bench_bootstrap(c: &mut Criterion) {
    let table =
        simulate_confounded(&SimulationConfig { n_rows: 1_000, ..Default::default() }).unwrap();
    let mut group = c.benchmark_group("ipw/bootstrap_n=1000");
    group.sample_size(10);
    for parallel in [false, true] {
        let cfg = BootstrapConfig { n_resamples: 200, parallel, ..Default::default() };
        group.bench_with_input(
            BenchmarkId::new("resamples=200", if parallel { "parallel" } else { "sequential" }),
            &cfg,
            |b, cfg| {
                b.iter(|| {
                    bootstrap_ate(
                        black_box(&table),
                        &PropensityConfig::default(),
                        &WeightConfig::default(),
                        cfg,
                    )
                    .unwrap()
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_single_estimate, bench_bootstrap);
criterion_main!(benches);
