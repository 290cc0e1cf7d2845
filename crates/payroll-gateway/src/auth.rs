//! Bearer-token authentication for the admin routes.
//!
//! Tokens come from `Authorization: Bearer <token>` or, for `EventSource`
//! clients that cannot set headers, from a `?token=` query parameter.

use axum::{
    extract::{FromRequestParts, Query},
    http::{request::Parts, HeaderMap},
};
use payroll_core::{
    config::{AuthConfig, AuthMode},
    types::Principal,
    PayrollError,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use crate::app::AppState;
use crate::http::error::{api_error, ApiError};

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// An authenticated caller holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminPrincipal(pub Principal);

impl FromRequestParts<Arc<AppState>> for AdminPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).or_else(|| {
            Query::<TokenQuery>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|Query(q)| q.token)
        });

        authorize_admin(&state.config.gateway.auth, token.as_deref())
            .map(AdminPrincipal)
            .map_err(|e| {
                warn!(path = %parts.uri.path(), error = %e, "admin request rejected");
                api_error(&e)
            })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Resolve `token` to a principal and require the admin role.
pub fn authorize_admin(
    auth: &AuthConfig,
    token: Option<&str>,
) -> Result<Principal, PayrollError> {
    if auth.mode == AuthMode::None {
        return Ok(Principal::anonymous_admin());
    }

    let token = token.ok_or_else(|| PayrollError::AuthFailed("missing bearer token".into()))?;
    let entry = auth
        .tokens
        .iter()
        .find(|e| e.token == token)
        .ok_or_else(|| PayrollError::AuthFailed("invalid token".into()))?;

    let principal = Principal::new(entry.subject.clone(), entry.role);
    if !principal.is_admin() {
        return Err(PayrollError::PermissionDenied {
            reason: "admin role required".into(),
        });
    }
    Ok(principal)
}
