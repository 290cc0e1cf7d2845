use axum::{http::StatusCode, Json};
use payroll_core::PayrollError;
use serde::Serialize;
use tracing::error;

/// JSON body of every non-2xx response produced by the gateway.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub code: &'static str,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);

/// Map a domain error onto its HTTP status and body.
pub fn api_error(err: &PayrollError) -> ApiError {
    let (status, error) = match err {
        PayrollError::AuthFailed(_) => (StatusCode::UNAUTHORIZED, "Unauthorized"),
        PayrollError::PermissionDenied { .. } => (StatusCode::FORBIDDEN, "Forbidden"),
        PayrollError::TooManyConnections { .. } => {
            (StatusCode::TOO_MANY_REQUESTS, "Too Many Connections")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
    };

    let message = match err {
        PayrollError::TooManyConnections { max } => {
            format!("Maximum {max} concurrent SSE connections allowed")
        }
        PayrollError::AuthFailed(reason) => reason.clone(),
        PayrollError::PermissionDenied { reason } => reason.clone(),
        other => {
            error!(error = %other, "request failed");
            "internal error".to_string()
        }
    };

    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
            message,
            code: err.code(),
        }),
    )
}
