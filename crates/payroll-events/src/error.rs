use payroll_core::PayrollError;
use thiserror::Error;

/// Errors surfaced by the event hub.
///
/// Only capacity is reported to callers; delivery failures are handled
/// inside the hub by dropping the affected connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    /// The connection ceiling is reached; nothing was registered.
    #[error("connection limit reached: max {max} concurrent connections")]
    TooManyConnections { max: usize },
}

impl From<HubError> for PayrollError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::TooManyConnections { max } => PayrollError::TooManyConnections { max },
        }
    }
}

pub type Result<T> = std::result::Result<T, HubError>;
