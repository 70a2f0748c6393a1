//! Balance and overlap diagnostics.
//!
//! Everything here produces tables for human review (or an external plotter);
//! nothing is a pass/fail gate. Imbalance and poor overlap surface as
//! [`DiagnosticWarning`]s.

use crate::bootstrap_ci::quantile_linear_sorted;
use crate::math::{effective_sample_size, weighted_mean_var};
use cf_core::{Error, ObservationTable, Result};
use serde::Serialize;

/// Conventional |SMD| threshold for "balanced".
pub const DEFAULT_BALANCE_THRESHOLD: f64 = 0.1;

/// Warning severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    Info,
    /// Worth a look.
    Warning,
    /// Estimates are likely unreliable.
    Critical,
}

/// A diagnostic flag.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticWarning {
    /// Category, e.g. `"balance"`, `"overlap"`, `"weights"`.
    pub category: String,
    /// Severity.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
}

impl DiagnosticWarning {
    pub(crate) fn new(category: &str, severity: Severity, message: String) -> Self {
        Self { category: category.to_string(), severity, message }
    }
}

/// Balance row (one per covariate).
#[derive(Debug, Clone, Serialize)]
pub struct CovariateBalance {
    /// Covariate name.
    pub name: String,
    /// Unweighted treated mean.
    pub mean_treated: f64,
    /// Unweighted control mean.
    pub mean_control: f64,
    /// Standardized mean difference before weighting.
    pub smd_unweighted: f64,
    /// Weighted treated mean (equals the unweighted one without weights).
    pub weighted_mean_treated: f64,
    /// Weighted control mean.
    pub weighted_mean_control: f64,
    /// Standardized mean difference after weighting.
    pub smd_weighted: f64,
    /// `|smd_weighted| <= threshold`.
    pub balanced: bool,
}

/// Balance table for all covariates.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceTable {
    /// One row per covariate.
    pub rows: Vec<CovariateBalance>,
    /// Threshold used for `balanced`.
    pub threshold: f64,
    /// Largest |SMD| before weighting.
    pub max_abs_smd_unweighted: f64,
    /// Largest |SMD| after weighting.
    pub max_abs_smd_weighted: f64,
    /// Covariates over the threshold after weighting.
    pub warnings: Vec<DiagnosticWarning>,
}

/// Means and standardized mean difference of one covariate.
///
/// `(mean_t - mean_c) / sqrt((var_t + var_c) / 2)`, with weighted moments when
/// `weights` is given. Returns `(mean_t, mean_c, smd)`; the SMD is 0 when both
/// arms have zero spread.
pub fn standardized_mean_difference(
    values: &[f64],
    treatment: &[u8],
    weights: Option<&[f64]>,
) -> Result<(f64, f64, f64)> {
    let n = values.len();
    if treatment.len() != n || weights.is_some_and(|w| w.len() != n) {
        return Err(Error::Data("SMD inputs must have the same length".into()));
    }
    let mut xt = Vec::new();
    let mut xc = Vec::new();
    let mut wt = Vec::new();
    let mut wc = Vec::new();
    for i in 0..n {
        let w = weights.map_or(1.0, |w| w[i]);
        if treatment[i] == 1 {
            xt.push(values[i]);
            wt.push(w);
        } else {
            xc.push(values[i]);
            wc.push(w);
        }
    }
    if xt.is_empty() || xc.is_empty() {
        return Err(Error::Data("SMD requires both treated and control rows".into()));
    }
    let (mt, vt) = weighted_mean_var(&xt, &wt);
    let (mc, vc) = weighted_mean_var(&xc, &wc);
    let pooled_sd = ((vt + vc) / 2.0).sqrt();
    let smd = if pooled_sd > 1e-15 { (mt - mc) / pooled_sd } else { 0.0 };
    Ok((mt, mc, smd))
}

/// SMD table before and (optionally) after weighting.
pub fn balance_table(
    table: &ObservationTable,
    weights: Option<&[f64]>,
    threshold: f64,
) -> Result<BalanceTable> {
    if !(threshold.is_finite() && threshold > 0.0) {
        return Err(Error::Validation(format!("balance threshold must be > 0, got {threshold}")));
    }
    let treatment = table.treatment();
    let mut rows = Vec::with_capacity(table.n_covariates());
    let mut warnings = Vec::new();
    for (j, name) in table.covariate_names().iter().enumerate() {
        let col = table.column(j);
        let (mean_treated, mean_control, smd_unweighted) =
            standardized_mean_difference(&col, treatment, None)?;
        let (weighted_mean_treated, weighted_mean_control, smd_weighted) = match weights {
            Some(w) => standardized_mean_difference(&col, treatment, Some(w))?,
            None => (mean_treated, mean_control, smd_unweighted),
        };
        let balanced = smd_weighted.abs() <= threshold;
        if !balanced {
            warnings.push(DiagnosticWarning::new(
                "balance",
                Severity::Warning,
                format!("{name}: |SMD| = {:.3} exceeds {threshold}", smd_weighted.abs()),
            ));
        }
        rows.push(CovariateBalance {
            name: name.clone(),
            mean_treated,
            mean_control,
            smd_unweighted,
            weighted_mean_treated,
            weighted_mean_control,
            smd_weighted,
            balanced,
        });
    }
    let max_abs =
        |f: fn(&CovariateBalance) -> f64| rows.iter().map(|r| f(r).abs()).fold(0.0, f64::max);
    Ok(BalanceTable {
        max_abs_smd_unweighted: max_abs(|r| r.smd_unweighted),
        max_abs_smd_weighted: max_abs(|r| r.smd_weighted),
        rows,
        threshold,
        warnings,
    })
}

/// Propensity distribution summary of one arm.
#[derive(Debug, Clone, Serialize)]
pub struct ArmPropensity {
    /// Rows in the arm.
    pub n: usize,
    /// Mean score.
    pub mean: f64,
    /// Quantiles: [min, p5, p25, median, p75, p95, max].
    pub quantiles: [f64; 7],
}

impl ArmPropensity {
    fn from_scores(mut scores: Vec<f64>) -> Self {
        scores.sort_by(f64::total_cmp);
        let q = |p: f64| quantile_linear_sorted(&scores, p);
        Self {
            n: scores.len(),
            mean: scores.iter().sum::<f64>() / scores.len() as f64,
            quantiles: [q(0.0), q(0.05), q(0.25), q(0.5), q(0.75), q(0.95), q(1.0)],
        }
    }
}

/// One bin of the mirrored propensity histogram.
#[derive(Debug, Clone, Serialize)]
pub struct HistogramBin {
    /// Lower edge.
    pub lower: f64,
    /// Upper edge.
    pub upper: f64,
    /// Treated rows in the bin.
    pub treated: usize,
    /// Control rows in the bin.
    pub control: usize,
    /// Sum of treated weights in the bin.
    pub treated_weighted: f64,
    /// Sum of control weights in the bin.
    pub control_weighted: f64,
}

/// Overlap of the treated and control propensity distributions.
#[derive(Debug, Clone, Serialize)]
pub struct OverlapSummary {
    /// Treated-arm scores.
    pub treated: ArmPropensity,
    /// Control-arm scores.
    pub control: ArmPropensity,
    /// Common support `[max(min_t, min_c), min(max_t, max_c)]`.
    pub common_support: (f64, f64),
    /// Rows whose score falls outside the common support.
    pub n_outside_support: usize,
    /// Kish ESS of the treated arm under `weights` (arm size without weights).
    pub ess_treated: f64,
    /// Kish ESS of the control arm.
    pub ess_control: f64,
    /// Equal-width histogram over [0,1].
    pub histogram: Vec<HistogramBin>,
    /// Overlap flags.
    pub warnings: Vec<DiagnosticWarning>,
}

/// Summarise propensity overlap; `weights` fill the weighted histogram columns.
pub fn overlap_summary(
    table: &ObservationTable,
    scores: &[f64],
    weights: Option<&[f64]>,
    bins: usize,
) -> Result<OverlapSummary> {
    let n = table.n_rows();
    if scores.len() != n || weights.is_some_and(|w| w.len() != n) {
        return Err(Error::Data("scores/weights must have one entry per row".into()));
    }
    if bins == 0 {
        return Err(Error::Validation("bins must be > 0".into()));
    }

    let mut st = Vec::with_capacity(table.n_treated());
    let mut sc = Vec::with_capacity(table.n_control());
    let mut wt = Vec::with_capacity(table.n_treated());
    let mut wc = Vec::with_capacity(table.n_control());
    let mut histogram: Vec<HistogramBin> = (0..bins)
        .map(|b| HistogramBin {
            lower: b as f64 / bins as f64,
            upper: (b + 1) as f64 / bins as f64,
            treated: 0,
            control: 0,
            treated_weighted: 0.0,
            control_weighted: 0.0,
        })
        .collect();

    for i in 0..n {
        let p = scores[i];
        let w = weights.map_or(1.0, |w| w[i]);
        let b = ((p * bins as f64).floor() as usize).min(bins - 1);
        if table.is_treated(i) {
            st.push(p);
            wt.push(w);
            histogram[b].treated += 1;
            histogram[b].treated_weighted += w;
        } else {
            sc.push(p);
            wc.push(w);
            histogram[b].control += 1;
            histogram[b].control_weighted += w;
        }
    }

    let treated = ArmPropensity::from_scores(st);
    let control = ArmPropensity::from_scores(sc);
    let lo = treated.quantiles[0].max(control.quantiles[0]);
    let hi = treated.quantiles[6].min(control.quantiles[6]);
    let n_outside_support = scores.iter().filter(|&&p| p < lo || p > hi).count();

    let mut warnings = Vec::new();
    if lo > hi {
        warnings.push(DiagnosticWarning::new(
            "overlap",
            Severity::Critical,
            "treated and control propensity ranges do not overlap".to_string(),
        ));
    } else if n_outside_support as f64 > 0.1 * n as f64 {
        warnings.push(DiagnosticWarning::new(
            "overlap",
            Severity::Warning,
            format!("{n_outside_support}/{n} rows lie outside the common support [{lo:.3}, {hi:.3}]"),
        ));
    }

    let ess_treated = effective_sample_size(&wt);
    let ess_control = effective_sample_size(&wc);
    let arms = [("treated", ess_treated, treated.n), ("control", ess_control, control.n)];
    for (arm, ess, size) in arms {
        if ess < 0.2 * size as f64 {
            warnings.push(DiagnosticWarning::new(
                "weights",
                Severity::Warning,
                format!("{arm} effective sample size {ess:.1} is under 20% of {size} rows"),
            ));
        }
    }

    Ok(OverlapSummary {
        treated,
        control,
        common_support: (lo, hi),
        n_outside_support,
        ess_treated,
        ess_control,
        histogram,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn confounded() -> ObservationTable {
        // Treated rows have larger x.
        ObservationTable::new(
            vec![1, 1, 1, 0, 0, 0],
            vec![0.0; 6],
            vec![vec![3.0], vec![4.0], vec![5.0], vec![1.0], vec![2.0], vec![3.0]],
            vec!["x".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_smd_unweighted() {
        let t = confounded();
        let (mt, mc, smd) =
            standardized_mean_difference(&t.column(0), t.treatment(), None).unwrap();
        assert_relative_eq!(mt, 4.0);
        assert_relative_eq!(mc, 2.0);
        // var_t = var_c = 1 => pooled sd 1.
        assert_relative_eq!(smd, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_weighting_can_remove_imbalance() {
        let t = confounded();
        // Put all treated weight on x=3 and all control weight on x=3.
        let w = [1.0, 1e-9, 1e-9, 1e-9, 1e-9, 1.0];
        let bt = balance_table(&t, Some(&w), DEFAULT_BALANCE_THRESHOLD).unwrap();
        assert!(bt.rows[0].smd_weighted.abs() < bt.rows[0].smd_unweighted.abs());
        assert_relative_eq!(bt.rows[0].weighted_mean_treated, 3.0, epsilon = 1e-6);
        assert!(bt.max_abs_smd_unweighted > 1.0);
    }

    #[test]
    fn test_unweighted_table_flags_imbalance() {
        let bt = balance_table(&confounded(), None, 0.1).unwrap();
        assert_eq!(bt.rows.len(), 1);
        assert!(!bt.rows[0].balanced);
        assert_eq!(bt.warnings.len(), 1);
    }

    #[test]
    fn test_overlap_histogram_counts() {
        let t = confounded();
        let scores = [0.7, 0.8, 0.9, 0.1, 0.2, 0.75];
        let o = overlap_summary(&t, &scores, None, 10).unwrap();
        let total: usize = o.histogram.iter().map(|b| b.treated + b.control).sum();
        assert_eq!(total, 6);
        assert_relative_eq!(o.common_support.0, 0.7);
        assert_relative_eq!(o.common_support.1, 0.75);
        assert_eq!(o.n_outside_support, 4);
        assert_relative_eq!(o.ess_treated, 3.0, epsilon = 1e-12);
        assert_eq!(o.histogram[9].treated, 1);
    }

    #[test]
    fn test_disjoint_support_is_critical() {
        let t = confounded();
        let scores = [0.7, 0.8, 0.9, 0.1, 0.2, 0.3];
        let o = overlap_summary(&t, &scores, None, 5).unwrap();
        assert!(o.warnings.iter().any(|w| w.severity == Severity::Critical));
    }
}
