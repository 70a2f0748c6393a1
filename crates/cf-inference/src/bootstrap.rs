//! Bootstrap engine for the IPW treatment effect.
//!
//! The correct procedure ([`bootstrap_ate`]) treats the whole estimator
//! (propensity fit → weights → weighted regression) as a pure function of a
//! table and reruns it on every resample. [`bootstrap_ate_fixed_weights`]
//! computes weights once on the original data and only resamples rows; it
//! ignores propensity-model uncertainty and is kept solely for comparison.
//!
//! Resample `b` (1-based; 0 is the apparent sample) draws its row indices from
//! `StdRng::seed_from_u64(seed + b)`, so results do not depend on how Rayon
//! schedules the work. Each task builds, fits and drops its own resample.

use crate::bootstrap_ci::{
    BootstrapCiMethod, percentile_interval, student_t_interval, studentized_interval,
};
use crate::effect::{EffectEstimate, fit_weighted_effect};
use crate::math::{mean, sample_sd};
use crate::propensity::{PropensityConfig, propensity_scores};
use crate::weights::{WeightConfig, build_weights};
use cf_core::{Error, ObservationTable, Result};
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bootstrap options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Number of resamples drawn with replacement (excluding the apparent sample).
    pub n_resamples: usize,
    /// Base RNG seed.
    pub seed: u64,
    /// Whether the apparent-sample estimate joins the aggregated distribution.
    pub include_apparent: bool,
    /// Confidence level of the interval.
    pub conf_level: f64,
    /// Interval construction.
    pub ci_method: BootstrapCiMethod,
    /// Fit resamples on the Rayon thread pool.
    pub parallel: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            n_resamples: 1000,
            seed: 42,
            include_apparent: false,
            conf_level: 0.95,
            ci_method: BootstrapCiMethod::default(),
            parallel: true,
        }
    }
}

impl BootstrapConfig {
    fn validate(&self) -> Result<()> {
        if self.n_resamples < 2 {
            return Err(Error::Validation(format!(
                "n_resamples must be >= 2, got {}",
                self.n_resamples
            )));
        }
        if !(self.conf_level.is_finite() && self.conf_level > 0.0 && self.conf_level < 1.0) {
            return Err(Error::Validation(format!(
                "conf_level must be in (0,1), got {}",
                self.conf_level
            )));
        }
        Ok(())
    }
}

/// Which bootstrap procedure produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapVariant {
    /// Propensity model and weights refitted inside every resample.
    RefitPerResample,
    /// Weights computed once on the original sample and reused.
    /// Understates uncertainty; comparison only.
    FixedWeights,
}

impl std::fmt::Display for BootstrapVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootstrapVariant::RefitPerResample => write!(f, "refit-per-resample"),
            BootstrapVariant::FixedWeights => write!(f, "fixed-weights (not quite right)"),
        }
    }
}

/// A resample whose estimate was dropped.
#[derive(Debug, Clone, Serialize)]
pub struct ResampleFailure {
    /// Resample index (1-based).
    pub index: usize,
    /// Error kind label (`"data"`, `"domain"`, `"convergence"`, ...).
    pub kind: String,
    /// Error message.
    pub message: String,
}

/// Aggregated bootstrap output.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapResult {
    /// Procedure used.
    pub variant: BootstrapVariant,
    /// Estimate on the original (apparent) sample.
    pub apparent: EffectEstimate,
    /// Treatment coefficients of successful resamples (plus the apparent one
    /// when `include_apparent`).
    pub estimates: Vec<f64>,
    /// WLS standard errors matching `estimates`.
    pub std_errors: Vec<f64>,
    /// Interval method.
    pub ci_method: BootstrapCiMethod,
    /// Confidence level.
    pub conf_level: f64,
    /// Interval lower bound.
    pub ci_lower: f64,
    /// Interval upper bound.
    pub ci_upper: f64,
    /// Mean of `estimates`.
    pub mean: f64,
    /// Standard deviation of `estimates` (bootstrap standard error).
    pub sd: f64,
    /// Resamples requested.
    pub n_requested: usize,
    /// Resamples that produced an estimate.
    pub n_succeeded: usize,
    /// Resamples dropped.
    pub n_failed: usize,
    /// Whether the apparent estimate is part of `estimates`.
    pub include_apparent: bool,
    /// Dropped resamples.
    pub failures: Vec<ResampleFailure>,
    /// Dropped resamples per error kind.
    pub failure_counts: BTreeMap<String, usize>,
}

impl BootstrapResult {
    /// Interval width.
    pub fn width(&self) -> f64 {
        self.ci_upper - self.ci_lower
    }

    /// One-line outcome, e.g. `"950/1000 resamples succeeded"`.
    pub fn summary(&self) -> String {
        format!("{}/{} resamples succeeded", self.n_succeeded, self.n_requested)
    }
}

/// Row indices of bootstrap resample `b` (`b >= 1`) for a table of `n_rows`.
pub fn resample_indices(n_rows: usize, seed: u64, b: usize) -> Vec<usize> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed.wrapping_add(b as u64));
    (0..n_rows).map(|_| rng.random_range(0..n_rows)).collect()
}

/// Index sets for `n` resamples; with `include_original` the identity
/// (apparent) sample is prepended as resample 0.
///
/// The bootstrap engine fits exactly these draws (without the original), so
/// the sets can be inspected or reused to reproduce a run.
pub fn generate_bootstrap_samples(
    n_rows: usize,
    n: usize,
    include_original: bool,
    seed: u64,
) -> Vec<Vec<usize>> {
    let mut out = Vec::with_capacity(n + usize::from(include_original));
    if include_original {
        out.push((0..n_rows).collect());
    }
    out.extend((1..=n).map(|b| resample_indices(n_rows, seed, b)));
    out
}

/// The full estimator on one table: fit propensity, build weights, fit WLS.
pub fn estimate_ate(
    table: &ObservationTable,
    propensity: &PropensityConfig,
    weights: &WeightConfig,
    conf_level: f64,
) -> Result<EffectEstimate> {
    let (_, scores) = propensity_scores(table, propensity)?;
    let w = build_weights(table, &scores, weights)?;
    fit_weighted_effect(table, &w.weights, conf_level)
}

/// Correct bootstrap: refit the propensity model and weights on every resample.
pub fn bootstrap_ate(
    table: &ObservationTable,
    propensity: &PropensityConfig,
    weights: &WeightConfig,
    config: &BootstrapConfig,
) -> Result<BootstrapResult> {
    config.validate()?;
    let apparent = estimate_ate(table, propensity, weights, config.conf_level)?;
    run_bootstrap(table, config, BootstrapVariant::RefitPerResample, apparent, |idx| {
        let sample = table.resample(idx)?;
        estimate_ate(&sample, propensity, weights, config.conf_level)
    })
}

/// "Not quite right" bootstrap: reuse `weights` computed on the original table.
///
/// Each draw carries its rows' original weights into the weighted regression;
/// the propensity model is never refitted, so its estimation uncertainty is
/// missing from the interval.
pub fn bootstrap_ate_fixed_weights(
    table: &ObservationTable,
    weights: &[f64],
    config: &BootstrapConfig,
) -> Result<BootstrapResult> {
    config.validate()?;
    if weights.len() != table.n_rows() {
        return Err(Error::Data(format!(
            "weights have length {}, table has {} rows",
            weights.len(),
            table.n_rows()
        )));
    }
    log::info!("running fixed-weights bootstrap (propensity uncertainty ignored)");
    let apparent = fit_weighted_effect(table, weights, config.conf_level)?;
    run_bootstrap(table, config, BootstrapVariant::FixedWeights, apparent, |idx| {
        let sample = table.resample(idx)?;
        let w: Vec<f64> = idx.iter().map(|&i| weights[i]).collect();
        fit_weighted_effect(&sample, &w, config.conf_level)
    })
}

fn run_bootstrap<F>(
    table: &ObservationTable,
    config: &BootstrapConfig,
    variant: BootstrapVariant,
    apparent: EffectEstimate,
    fit_one: F,
) -> Result<BootstrapResult>
where
    F: Fn(&[usize]) -> Result<EffectEstimate> + Sync,
{
    use rayon::prelude::*;

    let samples =
        generate_bootstrap_samples(table.n_rows(), config.n_resamples, false, config.seed);
    let t0 = std::time::Instant::now();
    let outcomes: Vec<Result<EffectEstimate>> = if config.parallel {
        samples.par_iter().map(|idx| fit_one(idx)).collect()
    } else {
        samples.iter().map(|idx| fit_one(idx)).collect()
    };
    log::debug!("bootstrap ({variant}) loop took {:.3}s", t0.elapsed().as_secs_f64());

    let mut estimates = Vec::with_capacity(config.n_resamples + 1);
    let mut std_errors = Vec::with_capacity(config.n_resamples + 1);
    let mut failures = Vec::new();
    let mut failure_counts: BTreeMap<String, usize> = BTreeMap::new();
    for (k, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(e) => {
                estimates.push(e.ate);
                std_errors.push(e.se);
            }
            Err(err) => {
                *failure_counts.entry(err.kind().to_string()).or_insert(0) += 1;
                failures.push(ResampleFailure {
                    index: k + 1,
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                });
            }
        }
    }
    let n_succeeded = estimates.len();
    let n_failed = failures.len();
    if n_failed > 0 {
        log::warn!(
            "bootstrap ({variant}): dropped {n_failed}/{} resamples {:?}",
            config.n_resamples,
            failure_counts
        );
    }
    if n_succeeded < 2 {
        return Err(Error::Computation(format!(
            "fewer than 2 bootstrap resamples succeeded ({n_succeeded}/{})",
            config.n_resamples
        )));
    }
    if config.include_apparent {
        estimates.insert(0, apparent.ate);
        std_errors.insert(0, apparent.se);
    }

    let (ci_lower, ci_upper) = match config.ci_method {
        BootstrapCiMethod::Studentized => {
            studentized_interval(apparent.ate, &estimates, &std_errors, config.conf_level)?
        }
        BootstrapCiMethod::StudentT => student_t_interval(&estimates, config.conf_level)?,
        BootstrapCiMethod::Percentile => percentile_interval(&estimates, config.conf_level)?,
    };

    log::info!(
        "bootstrap ({variant}): {n_succeeded}/{} resamples succeeded, ATE {:.4} [{ci_lower:.4}, {ci_upper:.4}]",
        config.n_resamples,
        apparent.ate
    );

    Ok(BootstrapResult {
        variant,
        mean: mean(&estimates),
        sd: sample_sd(&estimates),
        apparent,
        estimates,
        std_errors,
        ci_method: config.ci_method,
        conf_level: config.conf_level,
        ci_lower,
        ci_upper,
        n_requested: config.n_resamples,
        n_succeeded,
        n_failed,
        include_apparent: config.include_apparent,
        failures,
        failure_counts,
    })
}
