//! Sensitivity of an effect (or one of its interval bounds) to an
//! unmeasured confounder, in closed form.
//!
//! Conventions: `a` is the exposure–confounder effect (mean difference of the
//! confounder between arms, or the prevalence difference `p₁ − p₀` for a
//! binary confounder) and `γ` the confounder–outcome effect. Under a linear
//! outcome model the bias is `a·γ`, so the adjusted effect is `effect − a·γ`
//! and the tipping point (adjusted effect = 0) is `γ = effect / a`.

use cf_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Which interval bound a sweep is computed for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityBound {
    /// Lower bound.
    Lower,
    /// Upper bound.
    Upper,
    /// The bound closest to zero (upper for a negative effect, lower otherwise).
    #[default]
    NearestNull,
}

impl SensitivityBound {
    /// Pick the bound from an interval `(lower, upper)`.
    pub fn select(self, lower: f64, upper: f64) -> f64 {
        match self {
            SensitivityBound::Lower => lower,
            SensitivityBound::Upper => upper,
            SensitivityBound::NearestNull => {
                if lower.abs() <= upper.abs() { lower } else { upper }
            }
        }
    }
}

/// An assumed binary confounder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinaryConfounder {
    /// Prevalence among the treated, in [0,1].
    pub prevalence_treated: f64,
    /// Prevalence among the controls, in [0,1].
    pub prevalence_control: f64,
    /// Effect of the confounder on the outcome.
    pub confounder_outcome_effect: f64,
}

/// Sensitivity analysis options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensitivityConfig {
    /// Bound the tipping sweep is computed for.
    pub bound: SensitivityBound,
    /// Exposure–confounder strengths to sweep.
    pub strengths: Vec<f64>,
    /// Optional binary-confounder scenario applied to the whole interval.
    pub binary: Option<BinaryConfounder>,
}

impl Default for SensitivityConfig {
    fn default() -> Self {
        Self {
            bound: SensitivityBound::default(),
            strengths: (1..=9).map(|k| k as f64 / 10.0).collect(),
            binary: None,
        }
    }
}

/// One row of a tipping-point sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TippingPoint {
    /// Assumed exposure–confounder effect `a`.
    pub exposure_confounder_effect: f64,
    /// Confounder–outcome effect `γ` that moves the bound to zero.
    pub confounder_outcome_effect: f64,
}

/// An estimate and interval after removing an assumed confounder's bias.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AdjustedInterval {
    /// Adjusted point estimate.
    pub estimate: f64,
    /// Adjusted lower bound.
    pub lower: f64,
    /// Adjusted upper bound.
    pub upper: f64,
    /// Bias removed (`a·γ`).
    pub bias: f64,
}

fn check_finite(name: &str, v: f64) -> Result<()> {
    if !v.is_finite() {
        return Err(Error::Validation(format!("{name} must be finite, got {v}")));
    }
    Ok(())
}

fn check_prevalence(name: &str, p: f64) -> Result<()> {
    if !(p.is_finite() && (0.0..=1.0).contains(&p)) {
        return Err(Error::Validation(format!("{name} must be in [0,1], got {p}")));
    }
    Ok(())
}

/// Confounder–outcome effect needed to tip `effect` to zero given an
/// exposure–confounder effect.
pub fn tip_coefficient(effect: f64, exposure_confounder_effect: f64) -> Result<f64> {
    check_finite("effect", effect)?;
    check_finite("exposure_confounder_effect", exposure_confounder_effect)?;
    if exposure_confounder_effect == 0.0 {
        return Err(Error::Validation("exposure_confounder_effect must be non-zero".into()));
    }
    Ok(effect / exposure_confounder_effect)
}

/// Tipping points of `bound` for each strength in `strengths`.
///
/// For strengths of one sign the result is monotone: `|γ|` shrinks as `|a|`
/// grows.
pub fn tipping_sweep(bound: f64, strengths: &[f64]) -> Result<Vec<TippingPoint>> {
    if strengths.is_empty() {
        return Err(Error::Validation("strengths must be non-empty".into()));
    }
    strengths
        .iter()
        .map(|&a| {
            Ok(TippingPoint {
                exposure_confounder_effect: a,
                confounder_outcome_effect: tip_coefficient(bound, a)?,
            })
        })
        .collect()
}

/// Confounder–outcome effect needed to tip `effect` to zero for a binary
/// confounder with the given prevalences.
pub fn tip_with_binary_confounder(
    effect: f64,
    prevalence_treated: f64,
    prevalence_control: f64,
) -> Result<f64> {
    check_prevalence("prevalence_treated", prevalence_treated)?;
    check_prevalence("prevalence_control", prevalence_control)?;
    let diff = prevalence_treated - prevalence_control;
    if diff == 0.0 {
        return Err(Error::Validation(
            "equal prevalences cannot move the effect; no tipping point".into(),
        ));
    }
    tip_coefficient(effect, diff)
}

/// `effect − (p₁ − p₀)·γ`.
pub fn adjust_with_binary_confounder(
    effect: f64,
    prevalence_treated: f64,
    prevalence_control: f64,
    confounder_outcome_effect: f64,
) -> Result<f64> {
    check_finite("effect", effect)?;
    check_prevalence("prevalence_treated", prevalence_treated)?;
    check_prevalence("prevalence_control", prevalence_control)?;
    check_finite("confounder_outcome_effect", confounder_outcome_effect)?;
    Ok(effect - (prevalence_treated - prevalence_control) * confounder_outcome_effect)
}

/// `effect − a·γ`.
pub fn adjust_with_continuous_confounder(
    effect: f64,
    exposure_confounder_effect: f64,
    confounder_outcome_effect: f64,
) -> Result<f64> {
    check_finite("effect", effect)?;
    check_finite("exposure_confounder_effect", exposure_confounder_effect)?;
    check_finite("confounder_outcome_effect", confounder_outcome_effect)?;
    Ok(effect - exposure_confounder_effect * confounder_outcome_effect)
}

/// Shift an estimate and both interval bounds by a binary confounder's bias.
pub fn adjust_interval(
    estimate: f64,
    lower: f64,
    upper: f64,
    confounder: &BinaryConfounder,
) -> Result<AdjustedInterval> {
    let adj = |v| {
        adjust_with_binary_confounder(
            v,
            confounder.prevalence_treated,
            confounder.prevalence_control,
            confounder.confounder_outcome_effect,
        )
    };
    let adjusted = adj(estimate)?;
    Ok(AdjustedInterval {
        estimate: adjusted,
        lower: adj(lower)?,
        upper: adj(upper)?,
        bias: estimate - adjusted,
    })
}

/// Output of a sensitivity analysis on a bootstrap interval.
#[derive(Debug, Clone, Serialize)]
pub struct SensitivityReport {
    /// Bound the sweep was computed for.
    pub bound: f64,
    /// Tipping points, one per strength.
    pub tipping_points: Vec<TippingPoint>,
    /// Binary-confounder adjustment, when configured.
    pub adjusted: Option<AdjustedInterval>,
}

/// Run the configured sweep (and optional binary adjustment) on an interval.
pub fn analyze(
    estimate: f64,
    lower: f64,
    upper: f64,
    config: &SensitivityConfig,
) -> Result<SensitivityReport> {
    let bound = config.bound.select(lower, upper);
    let tipping_points = tipping_sweep(bound, &config.strengths)?;
    let adjusted =
        config.binary.as_ref().map(|c| adjust_interval(estimate, lower, upper, c)).transpose()?;
    Ok(SensitivityReport { bound, tipping_points, adjusted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tip_coefficient() {
        assert_relative_eq!(tip_coefficient(-0.8, 0.4).unwrap(), -2.0);
        assert!(tip_coefficient(1.0, 0.0).is_err());
        assert!(tip_coefficient(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_sweep_is_monotone() {
        let strengths: Vec<f64> = (1..=20).map(|k| k as f64 * 0.25).collect();
        for bound in [-3.2, 1.7] {
            let rows = tipping_sweep(bound, &strengths).unwrap();
            for pair in rows.windows(2) {
                let (prev, next) =
                    (pair[0].confounder_outcome_effect, pair[1].confounder_outcome_effect);
                assert!(next.abs() < prev.abs());
                assert_eq!(prev.signum(), next.signum());
            }
            // Every tipping point moves the bound exactly to zero.
            for r in &rows {
                let adj = adjust_with_continuous_confounder(
                    bound,
                    r.exposure_confounder_effect,
                    r.confounder_outcome_effect,
                )
                .unwrap();
                assert!(adj.abs() < 1e-12);
            }
        }
        assert!(tipping_sweep(1.0, &[]).is_err());
    }

    #[test]
    fn test_binary_adjustment() {
        assert_relative_eq!(
            adjust_with_binary_confounder(-10.0, 0.26, 0.05, -12.0).unwrap(),
            -7.48,
            epsilon = 1e-12
        );
        assert!(adjust_with_binary_confounder(1.0, 1.2, 0.1, 1.0).is_err());
        assert!(adjust_with_binary_confounder(1.0, 0.2, -0.1, 1.0).is_err());
        let g = tip_with_binary_confounder(-10.0, 0.3, 0.1).unwrap();
        assert_relative_eq!(
            adjust_with_binary_confounder(-10.0, 0.3, 0.1, g).unwrap(),
            0.0,
            epsilon = 1e-12
        );
        assert!(tip_with_binary_confounder(1.0, 0.2, 0.2).is_err());
    }

    #[test]
    fn test_adjust_interval_shifts_all_bounds() {
        let c = BinaryConfounder {
            prevalence_treated: 0.5,
            prevalence_control: 0.25,
            confounder_outcome_effect: 4.0,
        };
        let a = adjust_interval(5.0, 4.0, 6.0, &c).unwrap();
        assert_relative_eq!(a.bias, 1.0);
        assert_relative_eq!(a.estimate, 4.0);
        assert_relative_eq!(a.lower, 3.0);
        assert_relative_eq!(a.upper, 5.0);
    }

    #[test]
    fn test_analyze_uses_nearest_bound() {
        let r = analyze(-12.5, -14.0, -11.0, &SensitivityConfig::default()).unwrap();
        assert_eq!(r.bound, -11.0);
        assert_eq!(r.tipping_points.len(), 9);
        assert!(r.adjusted.is_none());
        assert_eq!(SensitivityBound::Lower.select(-14.0, -11.0), -14.0);
        assert_eq!(SensitivityBound::NearestNull.select(2.0, 5.0), 2.0);
    }
}
