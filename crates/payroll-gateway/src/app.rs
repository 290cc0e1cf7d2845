use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use payroll_core::config::PayrollConfig;
use payroll_events::EventHub;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::http;

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: PayrollConfig,
    /// The single process-wide hub. Constructed once in `main`.
    pub hub: Arc<EventHub>,
}

impl AppState {
    pub fn new(config: PayrollConfig, hub: Arc<EventHub>) -> Self {
        Self { config, hub }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let sse = Router::new()
        .route("/connect", get(http::sse::connect))
        .route("/connect-public", get(http::sse::connect_public))
        .route("/stats", get(http::sse::stats))
        .route("/test", post(http::sse::send_test))
        .route("/test-public", post(http::sse::send_test_public))
        .route("/history", get(http::sse::history))
        .route("/health", get(http::sse::health));

    let router = Router::new()
        .route("/health", get(http::health::health_handler))
        .nest("/api/sse", sse)
        .route(
            "/webhooks/payroll-signed",
            post(http::webhooks::payroll_signed_handler),
        );

    let router = match cors_layer(&state.config.gateway.frontend_url) {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Allow the admin dashboard's origin to open streams and call the API.
fn cors_layer(frontend_url: &str) -> Option<CorsLayer> {
    let origin = match frontend_url.parse::<HeaderValue>() {
        Ok(v) => v,
        Err(e) => {
            warn!(%frontend_url, error = %e, "invalid frontend_url, CORS disabled");
            return None;
        }
    };
    Some(
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                header::CACHE_CONTROL,
            ])
            .allow_credentials(true),
    )
}
