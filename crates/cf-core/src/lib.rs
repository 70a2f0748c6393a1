//! # cf-core
//!
//! Core types and error handling for causalfit.
//!
//! This crate provides:
//! - The common error type and `Result` alias
//! - The observation table (treatment flag, outcome, covariates)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod table;

pub use error::{Error, Result};
pub use table::ObservationTable;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
