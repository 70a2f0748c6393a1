//! Regression kernels used by the propensity and effect estimators.
//!
//! - [`LogisticRegressionModel`]: Bernoulli GLM with logit link, fitted by
//!   iteratively reweighted least squares (Newton steps with step halving).
//! - [`wls_fit`]: weighted least squares with the model-based covariance
//!   `σ² (XᵀWX)⁻¹`, `σ² = Σ wᵢ rᵢ² / (n − k)`.

use crate::math::{log1pexp, sigmoid};
use cf_core::{Error, Result};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Probability distance from {0,1} below which a fitted value counts as separated.
const SEPARATION_EPS: f64 = 1e-10;

#[inline]
fn row_dot(x_row: &[f64], beta: &[f64]) -> f64 {
    debug_assert_eq!(x_row.len(), beta.len());
    x_row.iter().zip(beta).map(|(&x, &b)| x * b).sum()
}

/// Dense row-major design matrix. The intercept column, when requested, is
/// materialised as column 0.
#[derive(Debug, Clone)]
pub(crate) struct DenseX {
    n: usize,
    k: usize,
    data: Vec<f64>,
}

impl DenseX {
    pub(crate) fn from_rows<'a, I>(rows: I, include_intercept: bool) -> Result<Self>
    where
        I: IntoIterator<Item = &'a [f64]>,
    {
        let mut data = Vec::new();
        let mut n = 0usize;
        let mut width: Option<usize> = None;
        for (i, row) in rows.into_iter().enumerate() {
            match width {
                None => width = Some(row.len()),
                Some(p) if p != row.len() => {
                    return Err(Error::Validation(format!(
                        "X must be rectangular: row {} has len {}, expected {}",
                        i,
                        row.len(),
                        p
                    )));
                }
                _ => {}
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(Error::Validation("X must contain only finite values".to_string()));
            }
            if include_intercept {
                data.push(1.0);
            }
            data.extend_from_slice(row);
            n += 1;
        }
        let k = width.unwrap_or(0) + usize::from(include_intercept);
        if n == 0 || k == 0 {
            return Err(Error::Validation("X must be non-empty (n>0, k>0)".to_string()));
        }
        Ok(Self { n, k, data })
    }

    #[inline]
    pub(crate) fn row(&self, i: usize) -> &[f64] {
        let start = i * self.k;
        &self.data[start..start + self.k]
    }

    /// `Xᵀv`.
    fn transpose_mul(&self, v: &[f64]) -> DVector<f64> {
        let mut out = DVector::zeros(self.k);
        for i in 0..self.n {
            for (a, &xa) in self.row(i).iter().enumerate() {
                out[a] += xa * v[i];
            }
        }
        out
    }

    /// Accumulate `XᵀWX` (row-major `k×k`) and `XᵀWz`.
    fn weighted_normal_equations(&self, w: &[f64], z: &[f64]) -> (DMatrix<f64>, DVector<f64>) {
        let k = self.k;
        let mut xtx = vec![0.0; k * k];
        let mut xtz = vec![0.0; k];
        for i in 0..self.n {
            let wi = w[i];
            if wi == 0.0 {
                continue;
            }
            let row = self.row(i);
            for a in 0..k {
                let wa = wi * row[a];
                xtz[a] += wa * z[i];
                for b in a..k {
                    xtx[a * k + b] += wa * row[b];
                }
            }
        }
        for a in 0..k {
            for b in 0..a {
                xtx[a * k + b] = xtx[b * k + a];
            }
        }
        (DMatrix::from_row_slice(k, k, &xtx), DVector::from_vec(xtz))
    }
}

/// Solve a symmetric positive (semi-)definite system, Cholesky first, LU fallback.
fn solve_spd(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    if let Some(ch) = a.clone().cholesky() {
        return Some(ch.solve(b));
    }
    a.clone().lu().solve(b)
}

fn invert_spd(a: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if let Some(ch) = a.clone().cholesky() {
        return Some(ch.inverse());
    }
    a.clone().try_inverse()
}

/// IRLS controls.
#[derive(Debug, Clone, Copy)]
pub struct IrlsConfig {
    /// Maximum Newton iterations.
    pub max_iter: usize,
    /// Relative deviance change `|Δdev| / (|dev| + 0.1)` treated as converged.
    pub tol: f64,
}

impl Default for IrlsConfig {
    fn default() -> Self {
        Self { max_iter: 50, tol: 1e-10 }
    }
}

/// Result of a logistic regression fit.
#[derive(Debug, Clone, Serialize)]
pub struct LogisticFit {
    /// Coefficients (intercept first when included).
    pub coefficients: Vec<f64>,
    /// Standard errors from the inverse Fisher information (`NaN` if singular).
    pub std_errors: Vec<f64>,
    /// Negative log-likelihood at the returned coefficients.
    pub nll: f64,
    /// Newton iterations performed.
    pub iterations: usize,
    /// Whether the deviance criterion was met.
    pub converged: bool,
    /// Whether some fitted probabilities are numerically 0 or 1.
    pub separated: bool,
}

/// Logistic regression (Bernoulli) with logit link.
///
/// NLL: `sum_i log(1 + exp(eta_i)) - y_i * eta_i`
#[derive(Debug, Clone)]
pub struct LogisticRegressionModel {
    x: DenseX,
    y: Vec<u8>,
}

impl LogisticRegressionModel {
    /// Create a model from row-wise covariates and a 0/1 response.
    pub fn new<'a, I>(rows: I, y: Vec<u8>, include_intercept: bool) -> Result<Self>
    where
        I: IntoIterator<Item = &'a [f64]>,
    {
        let x = DenseX::from_rows(rows, include_intercept)?;
        if y.len() != x.n {
            return Err(Error::Validation(format!(
                "y has wrong length: expected n={}, got {}",
                x.n,
                y.len()
            )));
        }
        if y.iter().any(|&v| v > 1) {
            return Err(Error::Validation("y must contain only 0/1 values".to_string()));
        }
        Ok(Self { x, y })
    }

    /// Number of coefficients.
    pub fn dim(&self) -> usize {
        self.x.k
    }

    /// Negative log-likelihood at `params`.
    pub fn nll(&self, params: &[f64]) -> Result<f64> {
        if params.len() != self.x.k {
            return Err(Error::Validation(format!(
                "expected {} parameters, got {}",
                self.x.k,
                params.len()
            )));
        }
        let mut nll = 0.0;
        for i in 0..self.x.n {
            let eta = row_dot(self.x.row(i), params);
            nll += log1pexp(eta) - (self.y[i] as f64) * eta;
        }
        Ok(nll)
    }

    /// Fitted probabilities at `params` for the training rows.
    pub fn fitted(&self, params: &[f64]) -> Vec<f64> {
        (0..self.x.n).map(|i| sigmoid(row_dot(self.x.row(i), params))).collect()
    }

    /// Maximum-likelihood fit by IRLS.
    ///
    /// Separation does not fail the fit: iterations stop once the information
    /// matrix degenerates or `max_iter` is reached, and the result carries
    /// `separated = true`. Non-finite iterates or a singular information matrix
    /// without separation fail with [`Error::Convergence`].
    pub fn fit(&self, config: &IrlsConfig) -> Result<LogisticFit> {
        if config.max_iter == 0 {
            return Err(Error::Validation("max_iter must be > 0".to_string()));
        }
        let k = self.x.k;
        let n = self.x.n;
        let mut beta = vec![0.0; k];
        let mut nll = self.nll(&beta)?;
        let mut converged = false;
        let mut iterations = 0usize;

        let mut w = vec![0.0; n];
        let mut resid = vec![0.0; n];

        for iter in 1..=config.max_iter {
            iterations = iter;
            for i in 0..n {
                let mu = sigmoid(row_dot(self.x.row(i), &beta));
                w[i] = mu * (1.0 - mu);
                resid[i] = self.y[i] as f64 - mu;
            }
            // Newton step: (XᵀWX) δ = Xᵀ(y − μ).
            let (info, _) = self.x.weighted_normal_equations(&w, &resid);
            let score = self.x.transpose_mul(&resid);

            let Some(delta) = solve_spd(&info, &score) else {
                if self.is_separated(&beta) {
                    log::debug!(
                        "IRLS: information matrix singular under separation at iter {iter}"
                    );
                    break;
                }
                return Err(Error::Convergence(format!(
                    "logistic IRLS: singular information matrix at iteration {iter}"
                )));
            };

            // Step halving until the objective does not increase.
            let mut step = 1.0;
            let mut candidate = beta.clone();
            let mut cand_nll = f64::INFINITY;
            for _ in 0..30 {
                for j in 0..k {
                    candidate[j] = beta[j] + step * delta[j];
                }
                cand_nll = self.nll(&candidate)?;
                if cand_nll.is_finite() && cand_nll <= nll + 1e-12 {
                    break;
                }
                step *= 0.5;
            }
            if !cand_nll.is_finite() || candidate.iter().any(|b| !b.is_finite()) {
                return Err(Error::Convergence(format!(
                    "logistic IRLS produced non-finite iterate at iteration {iter}"
                )));
            }

            let rel_change = (nll - cand_nll).abs() / (cand_nll.abs() + 0.1);
            beta = candidate;
            nll = cand_nll;
            if rel_change < config.tol {
                converged = true;
                break;
            }
        }

        let separated = self.is_separated(&beta);
        if !converged && !separated {
            return Err(Error::Convergence(format!(
                "logistic IRLS did not converge in {} iterations",
                config.max_iter
            )));
        }
        log::debug!(
            "IRLS finished: iterations={iterations}, converged={converged}, separated={separated}, nll={nll:.6}"
        );

        let std_errors = {
            for i in 0..n {
                let mu = sigmoid(row_dot(self.x.row(i), &beta));
                w[i] = mu * (1.0 - mu);
            }
            let (info, _) = self.x.weighted_normal_equations(&w, &resid);
            match invert_spd(&info) {
                Some(cov) => (0..k).map(|j| cov[(j, j)].max(0.0).sqrt()).collect(),
                None => {
                    log::warn!("Fisher information inversion failed; standard errors unavailable");
                    vec![f64::NAN; k]
                }
            }
        };

        Ok(LogisticFit { coefficients: beta, std_errors, nll, iterations, converged, separated })
    }

    fn is_separated(&self, beta: &[f64]) -> bool {
        self.fitted(beta).iter().any(|&p| p < SEPARATION_EPS || p > 1.0 - SEPARATION_EPS)
    }
}

/// Weighted least squares fit.
#[derive(Debug, Clone, Serialize)]
pub struct WlsFit {
    /// Coefficients (intercept first when included).
    pub coefficients: Vec<f64>,
    /// Model-based standard errors.
    pub std_errors: Vec<f64>,
    /// Residual variance `Σ wᵢ rᵢ² / df`.
    pub sigma2: f64,
    /// Residual degrees of freedom (`n_used − k`).
    pub df: usize,
    /// Rows with strictly positive weight.
    pub n_used: usize,
}

impl WlsFit {
    /// Two-sided t interval for coefficient `j` at `conf_level`.
    pub fn conf_int(&self, j: usize, conf_level: f64) -> Result<(f64, f64)> {
        if !(conf_level.is_finite() && conf_level > 0.0 && conf_level < 1.0) {
            return Err(Error::Validation(format!("conf_level must be in (0,1), got {conf_level}")));
        }
        let b = *self
            .coefficients
            .get(j)
            .ok_or_else(|| Error::Validation(format!("no coefficient at index {j}")))?;
        let q = t_quantile(1.0 - (1.0 - conf_level) / 2.0, self.df as f64)?;
        let half = q * self.std_errors[j];
        Ok((b - half, b + half))
    }
}

/// Quantile of Student's t with `df` degrees of freedom.
pub fn t_quantile(p: f64, df: f64) -> Result<f64> {
    let dist = StudentsT::new(0.0, 1.0, df)
        .map_err(|e| Error::Computation(format!("invalid t distribution (df={df}): {e}")))?;
    Ok(dist.inverse_cdf(p))
}

/// Weighted least squares of `y` on row-wise `rows`.
///
/// Weights must be finite and non-negative; zero-weight rows are ignored
/// (they do not count towards the degrees of freedom).
pub fn wls_fit<'a, I>(
    rows: I,
    y: &[f64],
    weights: &[f64],
    include_intercept: bool,
) -> Result<WlsFit>
where
    I: IntoIterator<Item = &'a [f64]>,
{
    let x = DenseX::from_rows(rows, include_intercept)?;
    if y.len() != x.n || weights.len() != x.n {
        return Err(Error::Validation(format!(
            "y/weights have wrong length: expected n={}, got y={}, w={}",
            x.n,
            y.len(),
            weights.len()
        )));
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(Error::Validation("y must contain only finite values".to_string()));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(Error::Validation("weights must be finite and non-negative".to_string()));
    }

    let n_used = weights.iter().filter(|&&w| w > 0.0).count();
    if n_used <= x.k {
        return Err(Error::Computation(format!(
            "WLS needs more than {} positively weighted rows, got {}",
            x.k, n_used
        )));
    }

    let (xtwx, xtwy) = x.weighted_normal_equations(weights, y);
    let inv = invert_spd(&xtwx)
        .ok_or_else(|| Error::Computation("WLS solve failed (singular XᵀWX)".to_string()))?;
    let beta = &inv * &xtwy;
    let coefficients: Vec<f64> = beta.iter().copied().collect();

    let mut wrss = 0.0;
    for i in 0..x.n {
        if weights[i] > 0.0 {
            let r = y[i] - row_dot(x.row(i), &coefficients);
            wrss += weights[i] * r * r;
        }
    }
    let df = n_used - x.k;
    let sigma2 = wrss / df as f64;
    let std_errors = (0..x.k).map(|j| (sigma2 * inv[(j, j)]).max(0.0).sqrt()).collect();

    Ok(WlsFit { coefficients, std_errors, sigma2, df, n_used })
}
