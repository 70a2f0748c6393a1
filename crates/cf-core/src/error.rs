//! Error types for causalfit

use thiserror::Error;

/// causalfit error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Input table violates the expected schema (missing columns, non-binary
    /// treatment, non-finite covariates, ragged rows).
    #[error("Data error: {0}")]
    Data(String),

    /// A propensity score lies on or outside the (0,1) boundary where the
    /// requested weight is undefined.
    #[error("Domain error: {0}")]
    Domain(String),

    /// An iterative fit failed to converge (divergence, separation,
    /// singular information matrix).
    #[error("Convergence error: {0}")]
    Convergence(String),

    /// Invalid configuration or argument
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),
}

impl Error {
    /// Short machine-readable label for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Data(_) => "data",
            Error::Domain(_) => "domain",
            Error::Convergence(_) => "convergence",
            Error::Validation(_) => "validation",
            Error::Computation(_) => "computation",
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(Error::Data("x".into()).kind(), "data");
        assert_eq!(Error::Domain("x".into()).kind(), "domain");
        assert_eq!(Error::Convergence("x".into()).kind(), "convergence");
    }

    #[test]
    fn test_display_prefix() {
        let e = Error::Domain("propensity 1.0 at row 3".into());
        assert_eq!(e.to_string(), "Domain error: propensity 1.0 at row 3");
    }
}
