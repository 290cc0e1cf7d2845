//! Shared building blocks for the payroll event services: configuration,
//! the common error type, and caller identity.

pub mod config;
pub mod error;
pub mod types;

pub use error::{PayrollError, Result};
