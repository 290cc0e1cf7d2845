use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayrollError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("Too many connections (max {max})")]
    TooManyConnections { max: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PayrollError {
    /// Short error code string sent to clients in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            PayrollError::Config(_) => "CONFIG_ERROR",
            PayrollError::AuthFailed(_) => "AUTH_FAILED",
            PayrollError::PermissionDenied { .. } => "PERMISSION_DENIED",
            PayrollError::TooManyConnections { .. } => "TOO_MANY_CONNECTIONS",
            PayrollError::Serialization(_) => "SERIALIZATION_ERROR",
            PayrollError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, PayrollError>;
