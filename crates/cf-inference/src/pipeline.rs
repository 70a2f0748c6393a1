//! End-to-end IPW workflow: propensity → weights → diagnostics → weighted
//! effect → bootstrap → sensitivity.

use std::path::Path;

use cf_core::{Error, ObservationTable, Result};
use serde::{Deserialize, Serialize};

use crate::bootstrap::{
    BootstrapConfig, BootstrapResult, bootstrap_ate, bootstrap_ate_fixed_weights,
};
use crate::diagnostics::{
    BalanceTable, DEFAULT_BALANCE_THRESHOLD, DiagnosticWarning, OverlapSummary, Severity,
    balance_table, overlap_summary,
};
use crate::effect::{EffectEstimate, fit_weighted_effect, naive_difference};
use crate::propensity::{PropensityConfig, PropensityModel, propensity_scores};
use crate::sensitivity::{SensitivityConfig, SensitivityReport, analyze};
use crate::weights::{Estimand, IpwWeights, WeightConfig, build_weights};

/// Top-level configuration; every field may be omitted in JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Covariates used by the propensity model (all table covariates if `None`).
    pub covariates: Option<Vec<String>>,
    /// Propensity estimator options.
    pub propensity: PropensityConfig,
    /// Weight builder options.
    pub weights: WeightConfig,
    /// Bootstrap options.
    pub bootstrap: BootstrapConfig,
    /// Sensitivity analysis options.
    pub sensitivity: SensitivityConfig,
    /// |SMD| threshold for the balance table.
    pub balance_threshold: f64,
    /// Bins of the propensity histogram.
    pub histogram_bins: usize,
    /// Also run the fixed-weights bootstrap for comparison.
    pub compare_fixed_weights: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            covariates: None,
            propensity: PropensityConfig::default(),
            weights: WeightConfig::default(),
            bootstrap: BootstrapConfig::default(),
            sensitivity: SensitivityConfig::default(),
            balance_threshold: DEFAULT_BALANCE_THRESHOLD,
            histogram_bins: 20,
            compare_fixed_weights: false,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that the individual stages do not check themselves.
    pub fn validate(&self) -> Result<()> {
        if !(self.balance_threshold.is_finite() && self.balance_threshold > 0.0) {
            return Err(Error::Validation(format!(
                "balance_threshold must be > 0, got {}",
                self.balance_threshold
            )));
        }
        if self.histogram_bins == 0 {
            return Err(Error::Validation("histogram_bins must be > 0".into()));
        }
        Ok(())
    }
}

/// Weight summary without the per-row vector.
#[derive(Debug, Clone, Serialize)]
pub struct WeightSummary {
    /// Estimand targeted.
    pub estimand: Estimand,
    /// Rows clipped away from the boundary.
    pub n_clipped: usize,
    /// Smallest weight.
    pub min_weight: f64,
    /// Largest weight.
    pub max_weight: f64,
    /// Kish ESS of the treated arm.
    pub ess_treated: f64,
    /// Kish ESS of the control arm.
    pub ess_control: f64,
}

impl From<&IpwWeights> for WeightSummary {
    fn from(w: &IpwWeights) -> Self {
        Self {
            estimand: w.estimand,
            n_clipped: w.n_clipped,
            min_weight: w.weights.iter().copied().fold(f64::INFINITY, f64::min),
            max_weight: w.max_weight,
            ess_treated: w.ess_treated,
            ess_control: w.ess_control,
        }
    }
}

/// Propensity, weights and diagnostics (steps 2–4).
#[derive(Debug, Clone, Serialize)]
pub struct BalanceReport {
    /// Rows in the analysed table.
    pub n_rows: usize,
    /// Treated rows.
    pub n_treated: usize,
    /// Control rows.
    pub n_control: usize,
    /// Fitted propensity model.
    pub propensity: PropensityModel,
    /// Weight summary.
    pub weights: WeightSummary,
    /// Covariate balance before and after weighting.
    pub balance: BalanceTable,
    /// Propensity overlap.
    pub overlap: OverlapSummary,
    /// Every diagnostic flag raised so far.
    pub warnings: Vec<DiagnosticWarning>,
}

/// Full workflow output.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Steps 2–4.
    #[serde(flatten)]
    pub diagnostics: BalanceReport,
    /// Unweighted difference in arm means.
    pub naive_difference: f64,
    /// Single weighted fit on the full table (model-based SE).
    pub weighted_effect: EffectEstimate,
    /// Refit-per-resample bootstrap.
    pub bootstrap: BootstrapResult,
    /// `"k/n resamples succeeded"`.
    pub bootstrap_summary: String,
    /// Fixed-weights bootstrap, when requested.
    pub fixed_weights_bootstrap: Option<BootstrapResult>,
    /// Sensitivity of the bootstrap interval.
    pub sensitivity: SensitivityReport,
}

fn analysis_table(table: &ObservationTable, config: &PipelineConfig) -> Result<ObservationTable> {
    match &config.covariates {
        Some(names) => table.select_covariates(names),
        None => Ok(table.clone()),
    }
}

fn weighting(
    table: &ObservationTable,
    config: &PipelineConfig,
) -> Result<(BalanceReport, IpwWeights)> {
    config.validate()?;
    log::info!(
        "fitting propensity model on {} rows ({} treated, {} control), {} covariates",
        table.n_rows(),
        table.n_treated(),
        table.n_control(),
        table.n_covariates()
    );
    let (model, scores) = propensity_scores(table, &config.propensity)?;
    log::debug!("propensity IRLS: {} iterations, nll {:.6}", model.iterations, model.nll);

    log::info!("building {:?} weights", config.weights.estimand);
    let w = build_weights(table, &scores, &config.weights)?;

    log::info!("computing balance and overlap diagnostics");
    let balance = balance_table(table, Some(&w.weights), config.balance_threshold)?;
    let overlap = overlap_summary(table, &scores, Some(&w.weights), config.histogram_bins)?;

    let mut warnings = Vec::new();
    if model.separated {
        warnings.push(DiagnosticWarning::new(
            "propensity",
            Severity::Warning,
            "fitted probabilities numerically 0 or 1 (separation)".into(),
        ));
    }
    if w.n_clipped > 0 {
        warnings.push(DiagnosticWarning::new(
            "weights",
            Severity::Warning,
            format!("{} propensity score(s) clipped before weighting", w.n_clipped),
        ));
    }
    warnings.extend(balance.warnings.iter().cloned());
    warnings.extend(overlap.warnings.iter().cloned());

    let report = BalanceReport {
        n_rows: table.n_rows(),
        n_treated: table.n_treated(),
        n_control: table.n_control(),
        propensity: model,
        weights: WeightSummary::from(&w),
        balance,
        overlap,
        warnings,
    };
    Ok((report, w))
}

/// Steps 2–4 only: propensity, weights, balance and overlap.
pub fn assess_balance(table: &ObservationTable, config: &PipelineConfig) -> Result<BalanceReport> {
    let table = analysis_table(table, config)?;
    weighting(&table, config).map(|(report, _)| report)
}

/// Run the whole workflow on `table`.
pub fn run_pipeline(table: &ObservationTable, config: &PipelineConfig) -> Result<PipelineReport> {
    let table = analysis_table(table, config)?;
    let (mut diagnostics, w) = weighting(&table, config)?;

    log::info!("fitting weighted effect model");
    let naive = naive_difference(&table);
    let weighted_effect = fit_weighted_effect(&table, &w.weights, config.bootstrap.conf_level)?;
    log::info!("naive difference {naive:.4}, weighted estimate {:.4}", weighted_effect.ate);

    log::info!("bootstrapping ({} resamples, refit per resample)", config.bootstrap.n_resamples);
    let bootstrap = bootstrap_ate(&table, &config.propensity, &config.weights, &config.bootstrap)?;
    if bootstrap.n_failed > 0 {
        diagnostics.warnings.push(DiagnosticWarning::new(
            "bootstrap",
            Severity::Warning,
            format!("{}; failures by kind: {:?}", bootstrap.summary(), bootstrap.failure_counts),
        ));
    }

    let fixed_weights_bootstrap = if config.compare_fixed_weights {
        let fixed = bootstrap_ate_fixed_weights(&table, &w.weights, &config.bootstrap)?;
        log::info!(
            "interval width: refit {:.4}, fixed weights {:.4}",
            bootstrap.width(),
            fixed.width()
        );
        Some(fixed)
    } else {
        None
    };

    log::info!("running sensitivity analysis");
    let sensitivity = analyze(
        bootstrap.apparent.ate,
        bootstrap.ci_lower,
        bootstrap.ci_upper,
        &config.sensitivity,
    )?;

    Ok(PipelineReport {
        diagnostics,
        naive_difference: naive,
        weighted_effect,
        bootstrap_summary: bootstrap.summary(),
        bootstrap,
        fixed_weights_bootstrap,
        sensitivity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::stratified_design;
    use approx::assert_relative_eq;

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            bootstrap: BootstrapConfig { n_resamples: 50, ..Default::default() },
            ..Default::default()
        }
    }

    #[test]
    fn test_config_from_partial_json() {
        let json = r#"{
            "bootstrap": {"n_resamples": 200},
            "weights": {"boundary": {"policy": "strict"}}
        }"#;
        let cfg: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.bootstrap.n_resamples, 200);
        assert_eq!(cfg.bootstrap.seed, 42);
        assert_eq!(cfg.weights.boundary, crate::weights::BoundaryPolicy::Strict);
        assert_eq!(cfg.balance_threshold, 0.1);
    }

    #[test]
    fn test_config_validation() {
        let cfg = PipelineConfig { balance_threshold: 0.0, ..Default::default() };
        assert!(cfg.validate().is_err());
        let missing = PipelineConfig::from_json_file("/nonexistent/cfg.json");
        assert!(matches!(missing, Err(Error::Io(_))));
    }

    #[test]
    fn test_pipeline_on_stratified_design() {
        let t = stratified_design(200, 5.0).unwrap();
        let r = run_pipeline(&t, &fast_config()).unwrap();
        assert_relative_eq!(r.weighted_effect.ate, 5.0, epsilon = 1e-6);
        assert_relative_eq!(r.naive_difference, 6.6, epsilon = 1e-9);
        assert!(r.diagnostics.balance.max_abs_smd_weighted < 1e-6);
        assert!(r.diagnostics.balance.max_abs_smd_unweighted > 0.5);
        assert_eq!(
            r.bootstrap_summary,
            format!("{}/50 resamples succeeded", r.bootstrap.n_succeeded)
        );
        assert!(r.fixed_weights_bootstrap.is_none());
        assert_eq!(r.sensitivity.tipping_points.len(), 9);
    }

    #[test]
    fn test_assess_balance_with_unknown_covariate() {
        let t = stratified_design(40, 1.0).unwrap();
        let cfg = PipelineConfig { covariates: Some(vec!["nope".into()]), ..Default::default() };
        assert!(matches!(assess_balance(&t, &cfg), Err(Error::Data(_))));
    }
}
