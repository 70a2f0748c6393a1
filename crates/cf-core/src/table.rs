//! Observation table: one row per unit with a binary treatment flag, a numeric
//! outcome and a fixed set of numeric covariates.
//!
//! Tables are validated on construction and immutable afterwards. Bootstrap
//! draws are built with [`ObservationTable::resample`], which copies rows into
//! a fresh table so no state is shared between draws.

use crate::{Error, Result};
use serde::Serialize;

/// Validated observational dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationTable {
    treatment: Vec<u8>,
    outcome: Vec<f64>,
    /// Row-major covariate matrix, length `n * p`.
    covariates: Vec<f64>,
    covariate_names: Vec<String>,
}

impl ObservationTable {
    /// Build a table from column vectors and row-wise covariates.
    ///
    /// Fails with [`Error::Data`] when lengths disagree, the covariate matrix is
    /// ragged, treatment is not 0/1, any value is non-finite, or one of the
    /// treatment arms is empty.
    pub fn new(
        treatment: Vec<u8>,
        outcome: Vec<f64>,
        covariates: Vec<Vec<f64>>,
        covariate_names: Vec<String>,
    ) -> Result<Self> {
        let n = treatment.len();
        if n == 0 {
            return Err(Error::Data("table must contain at least one row".into()));
        }
        if outcome.len() != n || covariates.len() != n {
            return Err(Error::Data(format!(
                "column lengths differ: treatment={}, outcome={}, covariates={}",
                n,
                outcome.len(),
                covariates.len()
            )));
        }
        let p = covariate_names.len();
        let mut flat = Vec::with_capacity(n * p);
        for (i, row) in covariates.into_iter().enumerate() {
            if row.len() != p {
                return Err(Error::Data(format!(
                    "covariate row {} has {} values, expected {} ({:?})",
                    i,
                    row.len(),
                    p,
                    covariate_names
                )));
            }
            for (j, v) in row.into_iter().enumerate() {
                if !v.is_finite() {
                    return Err(Error::Data(format!(
                        "covariate '{}' is missing or non-finite at row {}",
                        covariate_names[j], i
                    )));
                }
                flat.push(v);
            }
        }
        Self::from_flat(treatment, outcome, flat, covariate_names)
    }

    fn from_flat(
        treatment: Vec<u8>,
        outcome: Vec<f64>,
        covariates: Vec<f64>,
        covariate_names: Vec<String>,
    ) -> Result<Self> {
        if let Some(i) = treatment.iter().position(|&t| t > 1) {
            return Err(Error::Data(format!(
                "treatment must be 0 or 1, got {} at row {}",
                treatment[i], i
            )));
        }
        if let Some(i) = outcome.iter().position(|v| !v.is_finite()) {
            return Err(Error::Data(format!("outcome is missing or non-finite at row {i}")));
        }
        {
            let mut seen = std::collections::HashSet::new();
            for name in &covariate_names {
                if !seen.insert(name.as_str()) {
                    return Err(Error::Data(format!("duplicate covariate name '{name}'")));
                }
            }
        }
        let n_treated = treatment.iter().filter(|&&t| t == 1).count();
        if n_treated == 0 || n_treated == treatment.len() {
            return Err(Error::Data(format!(
                "both treatment arms must be present (treated={}, control={})",
                n_treated,
                treatment.len() - n_treated
            )));
        }
        Ok(Self { treatment, outcome, covariates, covariate_names })
    }

    /// Number of rows.
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.treatment.len()
    }

    /// Number of covariate columns.
    #[inline]
    pub fn n_covariates(&self) -> usize {
        self.covariate_names.len()
    }

    /// Treatment flags (0 = control, 1 = treated).
    pub fn treatment(&self) -> &[u8] {
        &self.treatment
    }

    /// Outcome column.
    pub fn outcome(&self) -> &[f64] {
        &self.outcome
    }

    /// Covariate names in column order.
    pub fn covariate_names(&self) -> &[String] {
        &self.covariate_names
    }

    /// Covariate values for row `i`.
    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        let p = self.n_covariates();
        &self.covariates[i * p..(i + 1) * p]
    }

    /// Copy of covariate column `j`.
    pub fn column(&self, j: usize) -> Vec<f64> {
        (0..self.n_rows()).map(|i| self.row(i)[j]).collect()
    }

    /// Whether row `i` is treated.
    #[inline]
    pub fn is_treated(&self, i: usize) -> bool {
        self.treatment[i] == 1
    }

    /// Number of treated rows.
    pub fn n_treated(&self) -> usize {
        self.treatment.iter().filter(|&&t| t == 1).count()
    }

    /// Number of control rows.
    pub fn n_control(&self) -> usize {
        self.n_rows() - self.n_treated()
    }

    /// Column index of a named covariate.
    pub fn covariate_index(&self, name: &str) -> Result<usize> {
        self.covariate_names
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| Error::Data(format!("unknown covariate column '{name}'")))
    }

    /// New table restricted to the named covariates, in the given order.
    pub fn select_covariates(&self, names: &[String]) -> Result<Self> {
        if names.is_empty() {
            return Err(Error::Data("at least one covariate must be selected".into()));
        }
        let idx = names.iter().map(|n| self.covariate_index(n)).collect::<Result<Vec<_>>>()?;
        let mut flat = Vec::with_capacity(self.n_rows() * idx.len());
        for i in 0..self.n_rows() {
            let row = self.row(i);
            flat.extend(idx.iter().map(|&j| row[j]));
        }
        Self::from_flat(self.treatment.clone(), self.outcome.clone(), flat, names.to_vec())
    }

    /// Build a fresh table from the given row indices (rows may repeat).
    ///
    /// Fails with [`Error::Data`] if an index is out of range or the draw
    /// contains only one treatment arm.
    pub fn resample(&self, indices: &[usize]) -> Result<Self> {
        let n = self.n_rows();
        if indices.is_empty() {
            return Err(Error::Data("resample must contain at least one row".into()));
        }
        let p = self.n_covariates();
        let mut treatment = Vec::with_capacity(indices.len());
        let mut outcome = Vec::with_capacity(indices.len());
        let mut flat = Vec::with_capacity(indices.len() * p);
        for &i in indices {
            if i >= n {
                return Err(Error::Data(format!("resample index {i} out of range (n={n})")));
            }
            treatment.push(self.treatment[i]);
            outcome.push(self.outcome[i]);
            flat.extend_from_slice(self.row(i));
        }
        Self::from_flat(treatment, outcome, flat, self.covariate_names.clone())
    }
}
