//! End-to-end recovery of a known treatment effect.

use approx::assert_relative_eq;
use cf_inference::{
    BootstrapConfig, PipelineConfig, PropensityConfig, SimulationConfig, WeightConfig,
    build_weights, fit_weighted_effect, naive_difference, propensity::propensity_scores,
    run_pipeline, simulate_confounded, stratified_design,
};

const TRUE_ATE: f64 = 5.0;

#[test]
fn stratified_design_recovers_exact_effect() {
    let table = stratified_design(200, TRUE_ATE).unwrap();
    let (_, scores) = propensity_scores(&table, &PropensityConfig::default()).unwrap();
    let w = build_weights(&table, &scores, &WeightConfig::default()).unwrap();
    let est = fit_weighted_effect(&table, &w.weights, 0.95).unwrap();
    let naive = naive_difference(&table);

    assert!((est.ate - TRUE_ATE).abs() < 1.0);
    assert_relative_eq!(est.ate, TRUE_ATE, epsilon = 1e-6);
    assert!((naive - TRUE_ATE).abs() > (est.ate - TRUE_ATE).abs());
    assert!(w.weights.iter().all(|&x| x >= 1.0));
}

#[test]
fn simulated_confounding_is_corrected() {
    let table = simulate_confounded(&SimulationConfig {
        n_rows: 2000,
        true_ate: TRUE_ATE,
        noise_sd: 2.0,
        seed: 2024,
        ..Default::default()
    })
    .unwrap();
    let (_, scores) = propensity_scores(&table, &PropensityConfig::default()).unwrap();
    let w = build_weights(&table, &scores, &WeightConfig::default()).unwrap();
    let est = fit_weighted_effect(&table, &w.weights, 0.95).unwrap();
    let naive = naive_difference(&table);

    assert!((est.ate - TRUE_ATE).abs() < 1.0, "IPW estimate {}", est.ate);
    assert!(
        (naive - TRUE_ATE).abs() > (est.ate - TRUE_ATE).abs(),
        "naive {naive} vs weighted {}",
        est.ate
    );
    assert!(w.weights.iter().all(|&x| x >= 1.0));
}

#[test]
fn non_resampling_path_is_bit_identical() {
    let table =
        simulate_confounded(&SimulationConfig { n_rows: 500, ..Default::default() }).unwrap();
    let run = || {
        let (model, scores) = propensity_scores(&table, &PropensityConfig::default()).unwrap();
        let w = build_weights(&table, &scores, &WeightConfig::default()).unwrap();
        let est = fit_weighted_effect(&table, &w.weights, 0.95).unwrap();
        (model.coefficients, scores, w.weights, est.ate, est.se)
    };
    let a = run();
    let b = run();
    assert_eq!(a.0, b.0);
    assert_eq!(a.1, b.1);
    assert_eq!(a.2, b.2);
    assert_eq!(a.3.to_bits(), b.3.to_bits());
    assert_eq!(a.4.to_bits(), b.4.to_bits());
}

#[test]
fn pipeline_report_serializes() {
    let table = stratified_design(200, TRUE_ATE).unwrap();
    let cfg = PipelineConfig {
        bootstrap: BootstrapConfig { n_resamples: 100, ..Default::default() },
        compare_fixed_weights: true,
        ..Default::default()
    };
    let report = run_pipeline(&table, &cfg).unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["n_rows"], 200);
    assert_eq!(json["bootstrap"]["variant"], "refit_per_resample");
    assert_eq!(json["fixed_weights_bootstrap"]["variant"], "fixed_weights");
    assert!(json["balance"]["rows"].as_array().is_some_and(|r| r.len() == 1));
    let (lo, hi) = (report.bootstrap.ci_lower, report.bootstrap.ci_upper);
    assert!(lo < TRUE_ATE && TRUE_ATE < hi, "[{lo}, {hi}]");
}
