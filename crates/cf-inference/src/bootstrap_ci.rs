//! Bootstrap confidence interval utilities.
//!
//! - percentile intervals,
//! - studentized (bootstrap-t) intervals built from per-resample standard
//!   errors around the apparent-sample estimate,
//! - normal-theory t intervals from the spread of the bootstrap estimates.

use crate::math::{mean, sample_sd};
use crate::regression::t_quantile;
use cf_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Bootstrap CI method selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapCiMethod {
    /// Bootstrap-t: quantiles of `(θ_b − θ̂) / se_b`, scaled by `sd(θ_b)`.
    #[default]
    Studentized,
    /// `mean(θ_b) ± t_{B−1} · sd(θ_b)`.
    StudentT,
    /// Percentile interval from bootstrap quantiles.
    Percentile,
}

fn check_conf_level(conf_level: f64) -> Result<()> {
    if !(conf_level.is_finite() && conf_level > 0.0 && conf_level < 1.0) {
        return Err(Error::Validation(format!("conf_level must be in (0,1), got {conf_level}")));
    }
    Ok(())
}

/// Quantile for sorted data via linear interpolation.
///
/// - `q=0` returns min
/// - `q=1` returns max
/// - empty input returns `NaN`
pub fn quantile_linear_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        len => {
            let pos = q.clamp(0.0, 1.0) * (len - 1) as f64;
            let i = pos.floor() as usize;
            let j = pos.ceil() as usize;
            let t = pos - i as f64;
            if i == j { sorted[i] } else { (1.0 - t) * sorted[i] + t * sorted[j] }
        }
    }
}

/// Quantile via sorting + linear interpolation.
pub fn quantile_linear(data: &[f64], q: f64) -> f64 {
    let mut v = data.to_vec();
    v.sort_by(f64::total_cmp);
    quantile_linear_sorted(&v, q)
}

/// Percentile bootstrap interval.
pub fn percentile_interval(samples: &[f64], conf_level: f64) -> Result<(f64, f64)> {
    if samples.len() < 2 {
        return Err(Error::Computation("percentile interval requires at least 2 samples".into()));
    }
    check_conf_level(conf_level)?;
    let alpha = (1.0 - conf_level) / 2.0;
    let lo = quantile_linear(samples, alpha);
    let hi = quantile_linear(samples, 1.0 - alpha);
    Ok((lo.min(hi), lo.max(hi)))
}

/// Normal-theory t interval from the bootstrap distribution.
pub fn student_t_interval(samples: &[f64], conf_level: f64) -> Result<(f64, f64)> {
    if samples.len() < 2 {
        return Err(Error::Computation("t interval requires at least 2 samples".into()));
    }
    check_conf_level(conf_level)?;
    let q = t_quantile(1.0 - (1.0 - conf_level) / 2.0, (samples.len() - 1) as f64)?;
    let m = mean(samples);
    let half = q * sample_sd(samples);
    Ok((m - half, m + half))
}

/// Studentized (bootstrap-t) interval.
///
/// `theta_hat` is the apparent-sample estimate; `estimates[b]` and
/// `std_errors[b]` come from resample `b`. With `z_b = (θ_b − θ̂)/se_b` the
/// interval is `[θ̂ − q(1−α/2)·sd(θ), θ̂ − q(α/2)·sd(θ)]`. Resamples with a
/// non-positive or non-finite standard error are skipped.
pub fn studentized_interval(
    theta_hat: f64,
    estimates: &[f64],
    std_errors: &[f64],
    conf_level: f64,
) -> Result<(f64, f64)> {
    check_conf_level(conf_level)?;
    if estimates.len() != std_errors.len() {
        return Err(Error::Validation("estimates and std_errors must have the same length".into()));
    }
    if !theta_hat.is_finite() {
        return Err(Error::Computation("apparent estimate must be finite".into()));
    }
    let z: Vec<f64> = estimates
        .iter()
        .zip(std_errors)
        .filter(|(_, se)| se.is_finite() && **se > 0.0)
        .map(|(&est, &se)| (est - theta_hat) / se)
        .collect();
    if z.len() < 2 {
        return Err(Error::Computation(
            "studentized interval requires at least 2 resamples with positive standard errors".into(),
        ));
    }
    let alpha = (1.0 - conf_level) / 2.0;
    let z_lo = quantile_linear(&z, alpha);
    let z_hi = quantile_linear(&z, 1.0 - alpha);
    let spread = sample_sd(estimates);
    let lo = theta_hat - z_hi * spread;
    let hi = theta_hat - z_lo * spread;
    Ok((lo.min(hi), lo.max(hi)))
}
