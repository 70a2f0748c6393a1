//! Inverse-probability-of-treatment weights.
//!
//! For the ATE a treated row gets `1/p` and a control row `1/(1-p)`. Scores
//! exactly on the boundary make those undefined; [`BoundaryPolicy`] decides
//! whether such rows are clipped to `[eps, 1-eps]` or rejected.

use crate::math::effective_sample_size;
use cf_core::{Error, ObservationTable, Result};
use serde::{Deserialize, Serialize};

/// Target population of the weighting scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Estimand {
    /// Average treatment effect: `1/p`, `1/(1-p)`.
    #[default]
    Ate,
    /// Effect on the treated: `1`, `p/(1-p)`.
    Att,
    /// Effect on the controls: `(1-p)/p`, `1`.
    Atc,
    /// Overlap population: `1-p`, `p`.
    Ato,
}

impl Estimand {
    /// Weight for one row with treatment flag `treated` and score `p` in (0,1).
    #[inline]
    pub fn weight(self, treated: bool, p: f64) -> f64 {
        match (self, treated) {
            (Estimand::Ate, true) => 1.0 / p,
            (Estimand::Ate, false) => 1.0 / (1.0 - p),
            (Estimand::Att, true) => 1.0,
            (Estimand::Att, false) => p / (1.0 - p),
            (Estimand::Atc, true) => (1.0 - p) / p,
            (Estimand::Atc, false) => 1.0,
            (Estimand::Ato, true) => 1.0 - p,
            (Estimand::Ato, false) => p,
        }
    }
}

/// Handling of propensity scores at exactly 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum BoundaryPolicy {
    /// Clip scores into `[epsilon, 1 - epsilon]` and count the clipped rows.
    Clip {
        /// Distance from the boundary, in (0, 0.5).
        epsilon: f64,
    },
    /// Any score outside the open interval is a domain error.
    Strict,
}

impl Default for BoundaryPolicy {
    fn default() -> Self {
        BoundaryPolicy::Clip { epsilon: 1e-6 }
    }
}

/// Weight builder options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    /// Weighting scheme.
    pub estimand: Estimand,
    /// Boundary handling.
    pub boundary: BoundaryPolicy,
}

/// Per-row weights plus bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct IpwWeights {
    /// One weight per table row.
    pub weights: Vec<f64>,
    /// Estimand the weights target.
    pub estimand: Estimand,
    /// Rows whose score was clipped away from the boundary.
    pub n_clipped: usize,
    /// Kish effective sample size of the treated arm.
    pub ess_treated: f64,
    /// Kish effective sample size of the control arm.
    pub ess_control: f64,
    /// Largest weight.
    pub max_weight: f64,
}

/// Build weights for `table` from its own propensity `scores`.
///
/// Scores must come from a model fitted on this same table; the bootstrap
/// engine relies on that to refit per resample.
pub fn build_weights(
    table: &ObservationTable,
    scores: &[f64],
    config: &WeightConfig,
) -> Result<IpwWeights> {
    let n = table.n_rows();
    if scores.len() != n {
        return Err(Error::Data(format!(
            "propensity scores have length {}, table has {} rows",
            scores.len(),
            n
        )));
    }
    if let BoundaryPolicy::Clip { epsilon } = config.boundary {
        if !(epsilon.is_finite() && epsilon > 0.0 && epsilon < 0.5) {
            return Err(Error::Validation(format!(
                "clip epsilon must be in (0, 0.5), got {epsilon}"
            )));
        }
    }

    let mut weights = Vec::with_capacity(n);
    let mut n_clipped = 0usize;
    for (i, &raw) in scores.iter().enumerate() {
        if !(raw.is_finite() && (0.0..=1.0).contains(&raw)) {
            return Err(Error::Domain(format!(
                "propensity score {raw} at row {i} is not a probability"
            )));
        }
        let p = match config.boundary {
            BoundaryPolicy::Strict => {
                if raw <= 0.0 || raw >= 1.0 {
                    return Err(Error::Domain(format!(
                        "propensity score {raw} at row {i} makes the weight undefined"
                    )));
                }
                raw
            }
            BoundaryPolicy::Clip { epsilon } => {
                let p = raw.clamp(epsilon, 1.0 - epsilon);
                if p != raw {
                    n_clipped += 1;
                }
                p
            }
        };
        weights.push(config.estimand.weight(table.is_treated(i), p));
    }
    if n_clipped > 0 {
        log::warn!("clipped {n_clipped} propensity score(s) away from the (0,1) boundary");
    }

    let (wt, wc): (Vec<f64>, Vec<f64>) = {
        let mut wt = Vec::with_capacity(table.n_treated());
        let mut wc = Vec::with_capacity(table.n_control());
        for (i, &w) in weights.iter().enumerate() {
            if table.is_treated(i) { wt.push(w) } else { wc.push(w) }
        }
        (wt, wc)
    };
    let max_weight = weights.iter().copied().fold(0.0, f64::max);

    Ok(IpwWeights {
        ess_treated: effective_sample_size(&wt),
        ess_control: effective_sample_size(&wc),
        weights,
        estimand: config.estimand,
        n_clipped,
        max_weight,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn table() -> ObservationTable {
        ObservationTable::new(
            vec![1, 0, 1, 0],
            vec![1.0, 2.0, 3.0, 4.0],
            vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0]],
            vec!["x".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_ate_formula_and_lower_bound() {
        let t = table();
        let w = build_weights(&t, &[0.25, 0.25, 0.8, 0.6], &WeightConfig::default()).unwrap();
        assert_relative_eq!(w.weights[0], 4.0, epsilon = 1e-12);
        assert_relative_eq!(w.weights[1], 1.0 / 0.75, epsilon = 1e-12);
        assert_relative_eq!(w.weights[2], 1.25, epsilon = 1e-12);
        assert_relative_eq!(w.weights[3], 2.5, epsilon = 1e-12);
        assert!(w.weights.iter().all(|&x| x >= 1.0));
        assert_eq!(w.n_clipped, 0);
    }

    #[test]
    fn test_other_estimands() {
        let t = table();
        let scores = [0.5, 0.2, 0.5, 0.2];
        let att_cfg = WeightConfig { estimand: Estimand::Att, ..Default::default() };
        let att = build_weights(&t, &scores, &att_cfg).unwrap();
        assert_eq!(att.weights[0], 1.0);
        assert_relative_eq!(att.weights[1], 0.25, epsilon = 1e-12);
        let ato_cfg = WeightConfig { estimand: Estimand::Ato, ..Default::default() };
        let ato = build_weights(&t, &scores, &ato_cfg).unwrap();
        assert_relative_eq!(ato.weights[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(ato.weights[1], 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_boundary_strict_rejects() {
        let t = table();
        let cfg = WeightConfig { boundary: BoundaryPolicy::Strict, ..Default::default() };
        let err = build_weights(&t, &[1.0, 0.5, 0.5, 0.5], &cfg).unwrap_err();
        assert!(matches!(err, Error::Domain(_)));
    }

    #[test]
    fn test_boundary_clip_counts() {
        let t = table();
        let w = build_weights(&t, &[0.0, 1.0, 0.5, 0.5], &WeightConfig::default()).unwrap();
        assert_eq!(w.n_clipped, 2);
        assert!(w.weights.iter().all(|x| x.is_finite()));
        assert_relative_eq!(w.weights[0], 1e6, max_relative = 1e-9);
    }

    #[test]
    fn test_invalid_score_always_rejected() {
        let t = table();
        assert!(build_weights(&t, &[1.5, 0.5, 0.5, 0.5], &WeightConfig::default()).is_err());
        assert!(build_weights(&t, &[f64::NAN, 0.5, 0.5, 0.5], &WeightConfig::default()).is_err());
        assert!(build_weights(&t, &[0.5, 0.5], &WeightConfig::default()).is_err());
    }
}
