//! # cf-inference
//!
//! Inverse-probability-weighted treatment effect estimation for causalfit.
//!
//! This crate provides:
//! - Propensity scores by maximum-likelihood logistic regression
//! - IPW weights and balance/overlap diagnostics
//! - Weighted least squares effect estimation
//! - Bootstrap intervals that refit the whole estimator per resample
//! - Closed-form sensitivity analysis for unmeasured confounding
//!
//! ## Architecture
//!
//! Every stage is a pure function of its input table. The bootstrap engine
//! reruns [`bootstrap::estimate_ate`] on independently resampled tables, so
//! resamples can be fitted on the Rayon pool without shared state.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Bootstrap engine (refit-per-resample and fixed-weights variants).
pub mod bootstrap;
/// Bootstrap interval construction (studentized, t, percentile).
pub mod bootstrap_ci;
/// Covariate balance (SMD) and propensity overlap.
pub mod diagnostics;
/// Weighted effect estimator.
pub mod effect;
/// Numerically stable scalar helpers.
pub mod math;
/// End-to-end workflow and its configuration.
pub mod pipeline;
/// Propensity estimator.
pub mod propensity;
/// Logistic IRLS and weighted least squares kernels.
pub mod regression;
/// Unmeasured-confounder sensitivity analysis.
pub mod sensitivity;
/// Synthetic datasets with a known effect.
pub mod synthetic;
/// IPW weight builder.
pub mod weights;

pub use bootstrap::{
    BootstrapConfig, BootstrapResult, BootstrapVariant, ResampleFailure, bootstrap_ate,
    bootstrap_ate_fixed_weights, estimate_ate, generate_bootstrap_samples,
};
pub use bootstrap_ci::BootstrapCiMethod;
pub use diagnostics::{BalanceTable, DiagnosticWarning, OverlapSummary, Severity};
pub use effect::{EffectEstimate, fit_weighted_effect, naive_difference};
pub use pipeline::{BalanceReport, PipelineConfig, PipelineReport, assess_balance, run_pipeline};
pub use propensity::{PropensityConfig, PropensityModel, SeparationPolicy};
pub use sensitivity::{BinaryConfounder, SensitivityBound, SensitivityConfig, SensitivityReport};
pub use synthetic::{SimulationConfig, simulate_confounded, stratified_design};
pub use weights::{BoundaryPolicy, Estimand, IpwWeights, WeightConfig, build_weights};
