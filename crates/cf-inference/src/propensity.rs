//! Propensity estimator: `P(treated = 1 | covariates)` by maximum-likelihood
//! logistic regression on an intercept plus every covariate of the table.

use crate::math::sigmoid;
use crate::regression::{IrlsConfig, LogisticRegressionModel};
use cf_core::{Error, ObservationTable, Result};
use serde::{Deserialize, Serialize};

/// What to do when the fitted model separates the arms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeparationPolicy {
    /// Keep the fit; scores at the boundary are handled by the weight builder.
    #[default]
    Tolerate,
    /// Fail with a convergence error.
    Fail,
}

/// Propensity model fitting options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PropensityConfig {
    /// Maximum IRLS iterations.
    pub max_iter: usize,
    /// Relative deviance convergence tolerance.
    pub tol: f64,
    /// Separation handling.
    pub separation: SeparationPolicy,
}

impl Default for PropensityConfig {
    fn default() -> Self {
        let irls = IrlsConfig::default();
        Self { max_iter: irls.max_iter, tol: irls.tol, separation: SeparationPolicy::default() }
    }
}

/// Fitted propensity model.
#[derive(Debug, Clone, Serialize)]
pub struct PropensityModel {
    /// Covariates used, in coefficient order (after the intercept).
    pub covariate_names: Vec<String>,
    /// `[intercept, beta_1, ..., beta_p]`.
    pub coefficients: Vec<f64>,
    /// Standard errors of `coefficients`.
    pub std_errors: Vec<f64>,
    /// Negative log-likelihood at the optimum.
    pub nll: f64,
    /// IRLS iterations.
    pub iterations: usize,
    /// Deviance criterion met.
    pub converged: bool,
    /// Some training rows have scores numerically at 0 or 1.
    pub separated: bool,
}

impl PropensityModel {
    /// Fit on `table` (treatment ~ 1 + all covariates).
    pub fn fit(table: &ObservationTable, config: &PropensityConfig) -> Result<Self> {
        let rows = (0..table.n_rows()).map(|i| table.row(i));
        let model = LogisticRegressionModel::new(rows, table.treatment().to_vec(), true)
            .map_err(|e| Error::Data(format!("propensity design: {e}")))?;
        let fit = model.fit(&IrlsConfig { max_iter: config.max_iter, tol: config.tol })?;

        if fit.separated {
            match config.separation {
                SeparationPolicy::Fail => {
                    return Err(Error::Convergence(
                        "propensity model separates treated and control rows".into(),
                    ));
                }
                SeparationPolicy::Tolerate => {
                    log::warn!(
                        "propensity model: fitted probabilities numerically 0 or 1 (separation); weights will be extreme"
                    );
                }
            }
        }

        Ok(Self {
            covariate_names: table.covariate_names().to_vec(),
            coefficients: fit.coefficients,
            std_errors: fit.std_errors,
            nll: fit.nll,
            iterations: fit.iterations,
            converged: fit.converged,
            separated: fit.separated,
        })
    }

    /// Linear predictor for one covariate row in model column order.
    #[inline]
    pub fn linear_predictor(&self, row: &[f64]) -> f64 {
        let (b0, beta) = self.coefficients.split_first().map_or((0.0, &[][..]), |(b, r)| (*b, r));
        b0 + row.iter().zip(beta).map(|(x, b)| x * b).sum::<f64>()
    }

    /// Predicted scores for every row of `table`.
    ///
    /// Columns are matched by name, so `table` may carry extra covariates;
    /// a missing one fails with [`Error::Data`].
    pub fn predict(&self, table: &ObservationTable) -> Result<Vec<f64>> {
        if table.covariate_names() == self.covariate_names.as_slice() {
            return Ok((0..table.n_rows())
                .map(|i| sigmoid(self.linear_predictor(table.row(i))))
                .collect());
        }
        let idx = self
            .covariate_names
            .iter()
            .map(|name| table.covariate_index(name))
            .collect::<Result<Vec<_>>>()?;
        let mut buf = vec![0.0; idx.len()];
        Ok((0..table.n_rows())
            .map(|i| {
                let row = table.row(i);
                for (slot, &j) in buf.iter_mut().zip(&idx) {
                    *slot = row[j];
                }
                sigmoid(self.linear_predictor(&buf))
            })
            .collect())
    }
}

/// Fit the propensity model and score the same table.
pub fn propensity_scores(
    table: &ObservationTable,
    config: &PropensityConfig,
) -> Result<(PropensityModel, Vec<f64>)> {
    let model = PropensityModel::fit(table, config)?;
    let scores = model.predict(table)?;
    Ok((model, scores))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(treat: Vec<u8>, x: Vec<f64>) -> ObservationTable {
        let n = treat.len();
        ObservationTable::new(
            treat,
            vec![0.0; n],
            x.into_iter().map(|v| vec![v]).collect(),
            vec!["x".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_scores_in_open_unit_interval() {
        let t = table(vec![1, 0, 1, 1, 0, 0, 1, 0], vec![0.5, 0.1, 0.9, 0.2, 0.4, 0.8, 0.7, 0.3]);
        let (model, scores) = propensity_scores(&t, &PropensityConfig::default()).unwrap();
        assert!(model.converged);
        assert_eq!(scores.len(), 8);
        assert!(scores.iter().all(|&p| p > 0.0 && p < 1.0));
    }

    #[test]
    fn test_predict_matches_by_name() {
        let t = table(vec![1, 0, 1, 1, 0, 0], vec![0.5, 0.1, 0.9, 0.2, 0.4, 0.8]);
        let model = PropensityModel::fit(&t, &PropensityConfig::default()).unwrap();
        let wide = ObservationTable::new(
            vec![1, 0],
            vec![0.0, 0.0],
            vec![vec![7.0, 0.5], vec![7.0, 0.1]],
            vec!["extra".to_string(), "x".to_string()],
        )
        .unwrap();
        let p = model.predict(&wide).unwrap();
        let direct = model.predict(&t).unwrap();
        assert_eq!(p[0], direct[0]);
        assert_eq!(p[1], direct[1]);

        let other = ObservationTable::new(
            vec![1, 0],
            vec![0.0, 0.0],
            vec![vec![1.0], vec![2.0]],
            vec!["z".to_string()],
        )
        .unwrap();
        assert!(matches!(model.predict(&other), Err(Error::Data(_))));
    }

    #[test]
    fn test_separation_policy() {
        let t = table(vec![0, 0, 0, 0, 1, 1, 1, 1], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let tolerated = PropensityModel::fit(&t, &PropensityConfig::default()).unwrap();
        assert!(tolerated.separated);

        let strict = PropensityConfig { separation: SeparationPolicy::Fail, ..Default::default() };
        assert!(matches!(PropensityModel::fit(&t, &strict), Err(Error::Convergence(_))));
    }
}
