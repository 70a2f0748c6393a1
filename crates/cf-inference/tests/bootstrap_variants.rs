//! Bootstrap engine behaviour: refit vs fixed weights, seeding, dropped resamples.

use cf_core::ObservationTable;
use cf_inference::{
    BootstrapConfig, BootstrapVariant, BoundaryPolicy, PropensityConfig, SeparationPolicy,
    WeightConfig, bootstrap_ate, bootstrap_ate_fixed_weights, build_weights,
    propensity::propensity_scores, stratified_design,
};

fn weights_for(table: &ObservationTable) -> Vec<f64> {
    let (_, scores) = propensity_scores(table, &PropensityConfig::default()).unwrap();
    build_weights(table, &scores, &WeightConfig::default()).unwrap().weights
}

#[test]
fn refit_and_fixed_weight_widths_differ() {
    let table = stratified_design(200, 5.0).unwrap();
    let cfg = BootstrapConfig { n_resamples: 300, seed: 7, ..Default::default() };

    let (p, w) = (PropensityConfig::default(), WeightConfig::default());
    let refit = bootstrap_ate(&table, &p, &w, &cfg).unwrap();
    let fixed = bootstrap_ate_fixed_weights(&table, &weights_for(&table), &cfg).unwrap();

    assert_eq!(refit.variant, BootstrapVariant::RefitPerResample);
    assert_eq!(fixed.variant, BootstrapVariant::FixedWeights);
    assert!(refit.width() > 0.0 && fixed.width() > 0.0);
    // Both centre on the same apparent estimate.
    assert!((refit.apparent.ate - fixed.apparent.ate).abs() < 1e-9);

    // Reusing weights lets stratum imbalance in a draw leak into the estimate;
    // refitting rebalances every draw. The spreads must be clearly different.
    let ratio = refit.sd.max(fixed.sd) / refit.sd.min(fixed.sd);
    assert!(ratio > 1.2, "refit sd {} vs fixed sd {}", refit.sd, fixed.sd);
    let wratio = refit.width().max(fixed.width()) / refit.width().min(fixed.width());
    assert!(wratio > 1.05, "refit width {} vs fixed width {}", refit.width(), fixed.width());
}

#[test]
fn same_seed_same_distribution() {
    let table = stratified_design(80, 2.0).unwrap();
    let cfg = BootstrapConfig { n_resamples: 60, seed: 99, ..Default::default() };
    let p = PropensityConfig::default();
    let w = WeightConfig::default();
    let a = bootstrap_ate(&table, &p, &w, &cfg).unwrap();
    let b = bootstrap_ate(&table, &p, &w, &cfg).unwrap();
    assert_eq!(a.estimates, b.estimates);
    assert_eq!(a.ci_lower.to_bits(), b.ci_lower.to_bits());

    let c = bootstrap_ate(&table, &p, &w, &BootstrapConfig { seed: 100, ..cfg }).unwrap();
    assert_ne!(a.estimates, c.estimates);
}

/// Controls at 6 and 8 overlap the treated range; draws missing them separate.
fn overlap_table() -> ObservationTable {
    let x = [0.0, 1.0, 2.0, 3.0, 6.0, 8.0, 4.0, 5.0, 7.0, 9.0, 10.0, 11.0];
    let treatment: Vec<u8> = (0..12).map(|i| u8::from(i >= 6)).collect();
    let outcome: Vec<f64> = x
        .iter()
        .zip(&treatment)
        .enumerate()
        .map(|(i, (x, &t))| {
            let noise = if i % 2 == 0 { 0.3 } else { -0.3 };
            1.0 + 0.5 * x + 2.0 * f64::from(t) + noise
        })
        .collect();
    let covariates = x.iter().map(|&v| vec![v]).collect();
    ObservationTable::new(treatment, outcome, covariates, vec!["x".into()]).unwrap()
}

#[test]
fn separated_resamples_are_dropped_and_counted() {
    let table = overlap_table();
    let p = PropensityConfig { separation: SeparationPolicy::Fail, ..Default::default() };
    let cfg = BootstrapConfig { n_resamples: 200, seed: 1, ..Default::default() };
    let r = bootstrap_ate(&table, &p, &WeightConfig::default(), &cfg).unwrap();

    assert!(r.n_failed > 0, "expected some separated draws");
    assert!(r.n_succeeded >= 2);
    assert_eq!(r.n_succeeded + r.n_failed, 200);
    assert_eq!(r.estimates.len(), r.n_succeeded);
    assert_eq!(r.failure_counts.values().sum::<usize>(), r.n_failed);
    assert!(r.failure_counts.contains_key("convergence"));
    assert_eq!(r.summary(), format!("{}/200 resamples succeeded", r.n_succeeded));
}

#[test]
fn boundary_scores_under_strict_policy_are_counted_as_domain_failures() {
    // Separated draws are tolerated by the propensity fit, but their far rows
    // get scores of exactly 0 or 1, which strict weighting rejects.
    let table = overlap_table();
    let w = WeightConfig { boundary: BoundaryPolicy::Strict, ..Default::default() };
    let cfg = BootstrapConfig { n_resamples: 200, seed: 1, ..Default::default() };
    let r = bootstrap_ate(&table, &PropensityConfig::default(), &w, &cfg).unwrap();

    let domain = r.failure_counts.get("domain").copied().unwrap_or(0);
    assert!(domain > 0, "expected domain failures, got {:?}", r.failure_counts);
    assert_eq!(r.n_succeeded + r.n_failed, 200);
    assert_eq!(r.failure_counts.values().sum::<usize>(), r.n_failed);
    assert!(r.n_succeeded >= 2 && r.ci_lower < r.ci_upper);
}
