//! Small numerically-stable helpers shared by the regression kernels and the
//! weighting code.

/// Stable `log(1 + exp(x))`.
///
/// `log(1+exp(x)) = max(x,0) + log(1+exp(-|x|))`, so `exp` never overflows.
#[inline]
pub fn log1pexp(x: f64) -> f64 {
    let e = (-x.abs()).exp();
    x.max(0.0) + e.ln_1p()
}

/// Stable logistic function `1 / (1 + exp(-x))`.
#[inline]
pub fn sigmoid(x: f64) -> f64 {
    let e = (-x.abs()).exp();
    let recip = 1.0 / (1.0 + e);
    if x >= 0.0 { recip } else { e * recip }
}

/// Arithmetic mean; `NaN` for empty input.
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Unbiased sample standard deviation (`n - 1` denominator); `0` for `n < 2`.
pub fn sample_sd(xs: &[f64]) -> f64 {
    let n = xs.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let ss: f64 = xs.iter().map(|&x| (x - m) * (x - m)).sum();
    (ss / (n - 1) as f64).sqrt()
}

/// Weighted mean and reliability-weighted unbiased variance.
///
/// Variance uses `V1 / (V1^2 - V2)` with `V1 = Σw`, `V2 = Σw²`, which reduces to
/// the usual `n - 1` estimator for unit weights. Returns `(NaN, 0)` when the
/// weights sum to zero.
pub fn weighted_mean_var(xs: &[f64], ws: &[f64]) -> (f64, f64) {
    debug_assert_eq!(xs.len(), ws.len());
    let v1: f64 = ws.iter().sum();
    if !(v1.is_finite() && v1 > 0.0) {
        return (f64::NAN, 0.0);
    }
    let v2: f64 = ws.iter().map(|w| w * w).sum();
    let m = xs.iter().zip(ws).map(|(x, w)| x * w).sum::<f64>() / v1;
    let denom = v1 * v1 - v2;
    if denom <= 0.0 {
        return (m, 0.0);
    }
    let ss: f64 = xs.iter().zip(ws).map(|(x, w)| w * (x - m) * (x - m)).sum();
    (m, ss * v1 / denom)
}

/// Kish effective sample size `(Σw)² / Σw²`.
pub fn effective_sample_size(ws: &[f64]) -> f64 {
    let s: f64 = ws.iter().sum();
    let s2: f64 = ws.iter().map(|w| w * w).sum();
    if s2 > 0.0 { s * s / s2 } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_log1pexp_matches_naive_moderate_values() {
        for x in [-10.0_f64, -2.0, -0.1, 0.0, 0.1, 2.0, 10.0] {
            let naive = (1.0 + x.exp()).ln();
            assert!((naive - log1pexp(x)).abs() < 1e-12, "x={x}");
        }
        assert!(log1pexp(1e6).is_finite());
    }

    #[test]
    fn test_sigmoid_symmetry() {
        for x in [-50.0, -10.0, -1.0, 0.0, 1.0, 10.0, 50.0] {
            let s = sigmoid(x);
            assert!((0.0..=1.0).contains(&s));
            assert!((s + sigmoid(-x) - 1.0).abs() < 1e-15);
        }
    }

    #[test]
    fn test_weighted_moments_reduce_to_unweighted() {
        let xs = [1.0, 2.0, 4.0, 7.0];
        let (m, v) = weighted_mean_var(&xs, &[1.0; 4]);
        assert_relative_eq!(m, mean(&xs), epsilon = 1e-12);
        assert_relative_eq!(v.sqrt(), sample_sd(&xs), epsilon = 1e-12);
    }

    #[test]
    fn test_ess() {
        assert_relative_eq!(effective_sample_size(&[2.0; 10]), 10.0, epsilon = 1e-12);
        assert!(effective_sample_size(&[10.0, 0.1, 0.1]) < 1.1);
        assert_eq!(effective_sample_size(&[]), 0.0);
    }
}
