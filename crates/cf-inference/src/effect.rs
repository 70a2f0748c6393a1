//! Weighted effect estimator: WLS of outcome on `[1, T]`.
//!
//! The model-based standard error ignores that the weights were estimated, so
//! it is reported for completeness only; interval estimates for IPW come from
//! the bootstrap engine.

use crate::regression::wls_fit;
use cf_core::{Error, ObservationTable, Result};
use serde::Serialize;

/// Treatment-coefficient estimate from one weighted fit.
#[derive(Debug, Clone, Serialize)]
pub struct EffectEstimate {
    /// Coefficient on the treatment flag.
    pub ate: f64,
    /// WLS standard error of `ate`.
    pub se: f64,
    /// Lower bound of the WLS t interval.
    pub ci_lower: f64,
    /// Upper bound of the WLS t interval.
    pub ci_upper: f64,
    /// Residual degrees of freedom.
    pub df: usize,
    /// Rows with positive weight.
    pub n: usize,
}

/// Fit `outcome ~ 1 + T` with per-row `weights`.
pub fn fit_weighted_effect(
    table: &ObservationTable,
    weights: &[f64],
    conf_level: f64,
) -> Result<EffectEstimate> {
    if weights.len() != table.n_rows() {
        return Err(Error::Data(format!(
            "weights have length {}, table has {} rows",
            weights.len(),
            table.n_rows()
        )));
    }
    let design: Vec<[f64; 1]> = table.treatment().iter().map(|&t| [t as f64]).collect();
    let fit = wls_fit(design.iter().map(|r| r.as_slice()), table.outcome(), weights, true)?;
    let (ci_lower, ci_upper) = fit.conf_int(1, conf_level)?;
    Ok(EffectEstimate {
        ate: fit.coefficients[1],
        se: fit.std_errors[1],
        ci_lower,
        ci_upper,
        df: fit.df,
        n: fit.n_used,
    })
}

/// Unweighted difference in arm means (`mean_treated − mean_control`).
pub fn naive_difference(table: &ObservationTable) -> f64 {
    let (mut st, mut sc) = (0.0, 0.0);
    for (i, &y) in table.outcome().iter().enumerate() {
        if table.is_treated(i) { st += y } else { sc += y }
    }
    st / table.n_treated() as f64 - sc / table.n_control() as f64
}
