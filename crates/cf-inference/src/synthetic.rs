//! Synthetic observational datasets with a known treatment effect.
//!
//! [`simulate_confounded`] draws a bed-net style dataset in which richer and
//! healthier units are more likely to be treated and also have lower outcome
//! risk, so the naive difference in means is biased. [`stratified_design`] is
//! a deterministic two-stratum layout whose IPW estimate is exact, for tests.

use cf_core::{Error, ObservationTable, Result};
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::math::sigmoid;

/// Options for [`simulate_confounded`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of rows.
    pub n_rows: usize,
    /// True average treatment effect.
    pub true_ate: f64,
    /// Standard deviation of the outcome noise.
    pub noise_sd: f64,
    /// Multiplier on the covariate effects in the assignment model
    /// (0 gives a randomized experiment).
    pub confounding: f64,
    /// RNG seed.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { n_rows: 1752, true_ate: -10.0, noise_sd: 5.0, confounding: 1.0, seed: 42 }
    }
}

/// Covariate names produced by [`simulate_confounded`].
pub const SIMULATED_COVARIATES: [&str; 3] = ["income", "health", "temperature"];

// (mean, sd) of income, health, temperature.
const COVARIATE_MOMENTS: [(f64, f64); 3] = [(900.0, 150.0), (50.0, 15.0), (24.0, 3.0)];
// Assignment log-odds per standardized covariate.
const ASSIGNMENT_EFFECTS: [f64; 3] = [1.0, 0.6, -0.4];
// Outcome shift per standardized covariate.
const OUTCOME_EFFECTS: [f64; 3] = [-3.0, -2.0, 1.5];
const ASSIGNMENT_INTERCEPT: f64 = -0.3;
const OUTCOME_BASELINE: f64 = 40.0;

/// Draw a confounded dataset.
///
/// `logit P(T=1) = -0.3 + c·(1.0·z_income + 0.6·z_health − 0.4·z_temperature)`
/// and `y = 40 + ate·T − 3·z_income − 2·z_health + 1.5·z_temperature + ε`,
/// where `z` are the standardized covariates and `ε ~ N(0, noise_sd²)`.
pub fn simulate_confounded(config: &SimulationConfig) -> Result<ObservationTable> {
    if config.n_rows < 2 {
        return Err(Error::Validation(format!("n_rows must be >= 2, got {}", config.n_rows)));
    }
    if !(config.true_ate.is_finite() && config.confounding.is_finite()) {
        return Err(Error::Validation("true_ate and confounding must be finite".into()));
    }
    if !(config.noise_sd.is_finite() && config.noise_sd >= 0.0) {
        return Err(Error::Validation(format!(
            "noise_sd must be finite and >= 0, got {}",
            config.noise_sd
        )));
    }
    let noise = Normal::new(0.0, config.noise_sd)
        .map_err(|e| Error::Validation(format!("invalid noise_sd {}: {e}", config.noise_sd)))?;
    let unit = Normal::new(0.0, 1.0).map_err(|e| Error::Computation(e.to_string()))?;
    let mut rng = rand::rngs::StdRng::seed_from_u64(config.seed);

    let n = config.n_rows;
    let mut treatment = Vec::with_capacity(n);
    let mut outcome = Vec::with_capacity(n);
    let mut covariates = Vec::with_capacity(n);
    for _ in 0..n {
        let z: [f64; 3] = std::array::from_fn(|_| unit.sample(&mut rng));
        let eta = ASSIGNMENT_INTERCEPT
            + config.confounding
                * z.iter().zip(ASSIGNMENT_EFFECTS).map(|(zi, b)| zi * b).sum::<f64>();
        let t = u8::from(rng.random::<f64>() < sigmoid(eta));
        let y = OUTCOME_BASELINE
            + config.true_ate * f64::from(t)
            + z.iter().zip(OUTCOME_EFFECTS).map(|(zi, b)| zi * b).sum::<f64>()
            + noise.sample(&mut rng);
        treatment.push(t);
        outcome.push(y);
        covariates.push(z.iter().zip(COVARIATE_MOMENTS).map(|(zi, (m, s))| m + s * zi).collect());
    }
    ObservationTable::new(
        treatment,
        outcome,
        covariates,
        SIMULATED_COVARIATES.iter().map(|s| s.to_string()).collect(),
    )
}

/// Deterministic two-stratum design with a single binary covariate `x`.
///
/// Half the rows have `x = 1` and 70% of them are treated; the other half has
/// `x = 0` with 30% treated. The outcome is `10 + true_ate·T + 4·x ± 0.5`, the
/// noise alternating within each (stratum, arm) cell so it cancels. A logistic
/// model on `x` is saturated, so the IPW estimate equals `true_ate` while the
/// naive difference is `true_ate + 1.6`. `n_rows` must be a positive multiple of 40.
pub fn stratified_design(n_rows: usize, true_ate: f64) -> Result<ObservationTable> {
    if n_rows == 0 || n_rows % 40 != 0 {
        return Err(Error::Validation(format!(
            "n_rows must be a positive multiple of 40, got {n_rows}"
        )));
    }
    let big = n_rows * 7 / 20;
    let small = n_rows * 3 / 20;
    // (x, treated, rows)
    let cells = [(1.0, 1u8, big), (1.0, 0u8, small), (0.0, 1u8, small), (0.0, 0u8, big)];

    let mut treatment = Vec::with_capacity(n_rows);
    let mut outcome = Vec::with_capacity(n_rows);
    let mut covariates = Vec::with_capacity(n_rows);
    for (x, t, rows) in cells {
        for k in 0..rows {
            let noise = if k % 2 == 0 { 0.5 } else { -0.5 };
            treatment.push(t);
            outcome.push(10.0 + true_ate * f64::from(t) + 4.0 * x + noise);
            covariates.push(vec![x]);
        }
    }
    ObservationTable::new(treatment, outcome, covariates, vec!["x".to_string()])
}
