//! Webhook ingress: POST /webhooks/payroll-signed.
//!
//! The payroll backend calls this after an employee signs. The request is
//! authenticated according to `PayrollConfig::webhooks`, then republished
//! to every open dashboard stream.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use hmac::{Hmac, Mac};
use payroll_core::config::WebhookAuthMode;
use payroll_protocol::{DomainEvent, PayrollSigned};
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::AppState;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "x-signature-256";

// ── Public handler ────────────────────────────────────────────────────────────

/// POST /webhooks/payroll-signed
///
/// Returns 200 + receipt ID on success (also when the event was throttled),
/// 401 on auth failure, 400 on a body that is not JSON, 404 when disabled.
pub async fn payroll_signed_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let cfg = &state.config.webhooks;

    if !cfg.enabled {
        warn!("webhook received but subsystem is disabled");
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "webhook subsystem is disabled"})),
        ));
    }

    info!(bytes = body.len(), "payroll-signed webhook arrived");

    match &cfg.auth_mode {
        WebhookAuthMode::HmacSha256 => {
            verify_hmac_sha256(&headers, &body, cfg.secret.as_deref())
                .map_err(|e| auth_error(&e))?;
        }
        WebhookAuthMode::BearerToken => {
            verify_bearer_token(&headers, cfg.secret.as_deref()).map_err(|e| auth_error(&e))?;
        }
        WebhookAuthMode::None => {}
    }

    let body: Value = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "invalid JSON in webhook body");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid JSON body"})),
        )
    })?;

    // wrong-typed or missing fields only degrade the summary
    let payload = PayrollSigned::from_value(&body);

    let receipt_id = uuid::Uuid::new_v4().to_string();
    let event_id = state
        .hub
        .broadcast_domain_event(DomainEvent::PayrollSigned(payload));

    info!(receipt_id = %receipt_id, ?event_id, "webhook accepted");
    Ok(Json(json!({
        "ok": true,
        "receipt_id": receipt_id,
        "event_id": event_id,
        "throttled": event_id.is_none(),
    })))
}

// ── Auth helpers ──────────────────────────────────────────────────────────────

/// HMAC-SHA256 over the raw body: `sha256=<hex>` in X-Signature-256.
fn verify_hmac_sha256(
    headers: &HeaderMap,
    body: &Bytes,
    secret: Option<&str>,
) -> Result<(), String> {
    let secret = secret.ok_or_else(|| "no HMAC secret configured".to_string())?;

    let sig_header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing X-Signature-256 header".to_string())?;

    let sig_hex = sig_header
        .strip_prefix("sha256=")
        .ok_or_else(|| "malformed X-Signature-256 header".to_string())?;

    let expected =
        hex::decode(sig_hex).map_err(|_| "X-Signature-256 is not valid hex".to_string())?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| "invalid HMAC key length".to_string())?;
    mac.update(body);

    mac.verify_slice(&expected)
        .map_err(|_| "HMAC signature mismatch".to_string())
}

fn verify_bearer_token(headers: &HeaderMap, secret: Option<&str>) -> Result<(), String> {
    let expected = secret.ok_or_else(|| "no bearer token configured".to_string())?;

    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing Authorization header".to_string())?
        .strip_prefix("Bearer ")
        .ok_or_else(|| "Authorization header must use Bearer scheme".to_string())?;

    if token == expected {
        Ok(())
    } else {
        Err("bearer token mismatch".to_string())
    }
}

fn auth_error(reason: &str) -> (StatusCode, Json<Value>) {
    warn!(reason = %reason, "webhook authentication failed");
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "authentication failed", "reason": reason})),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::{json_body, send, test_app, test_config};
    use axum::{body::Body, http::Request};
    use payroll_protocol::EventKind;

    const BODY: &str = r#"{"ma_nv":"NV001","ho_ten":"Alice","ngay_ky":"2026-01-31"}"#;

    fn hook(headers: &[(&str, &str)], body: &str) -> Request<Body> {
        let mut req = Request::post("/webhooks/payroll-signed");
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        req.body(Body::from(body.to_string())).unwrap()
    }

    fn sign(secret: &str, body: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body.as_bytes());
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[tokio::test]
    async fn bearer_webhook_publishes_payroll_signed() {
        let (router, hub) = test_app(test_config());
        let resp = send(
            &router,
            hook(&[("authorization", "Bearer hook-secret")], BODY),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["event_id"], 1);
        assert_eq!(body["throttled"], false);

        let ev = &hub.history(1)[0];
        assert_eq!(ev.kind, EventKind::PayrollSigned);
        assert_eq!(ev.message.as_deref(), Some("Alice (NV001) signed their payroll"));
        assert_eq!(ev.data["subjectId"], "NV001");
    }

    #[tokio::test]
    async fn burst_is_reported_as_throttled() {
        let (router, _hub) = test_app(test_config());
        let auth = [("authorization", "Bearer hook-secret")];
        send(&router, hook(&auth, BODY)).await;
        let body = json_body(send(&router, hook(&auth, BODY)).await).await;
        assert_eq!(body["throttled"], true);
        assert!(body["event_id"].is_null());
    }

    #[tokio::test]
    async fn hmac_signature_is_verified() {
        let mut config = test_config();
        config.webhooks.auth_mode = WebhookAuthMode::HmacSha256;
        let (router, hub) = test_app(config);

        let bad = send(&router, hook(&[(SIGNATURE_HEADER, "sha256=00")], BODY)).await;
        assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);
        assert!(hub.history(1).is_empty());

        let sig = sign("hook-secret", BODY);
        let ok = send(&router, hook(&[(SIGNATURE_HEADER, sig.as_str())], BODY)).await;
        assert_eq!(ok.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_bearer_is_401() {
        let (router, _hub) = test_app(test_config());
        let resp = send(&router, hook(&[("authorization", "Bearer nope")], BODY)).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_typed_fields_still_publish() {
        let mut config = test_config();
        config.webhooks.auth_mode = WebhookAuthMode::None;
        config.events.throttle_interval_ms = 0;
        let (router, hub) = test_app(config);

        let bodies = [
            r#"{"ma_nv":1042,"ho_ten":"Carol"}"#,
            r#"{"ma_nv":"NV003","ngay_ky":1769846400000}"#,
            r#"{"subjectId":"NV004","ma_nv":"NV004","ho_ten":"Dan"}"#,
            r#"[]"#,
        ];
        for body in bodies {
            let resp = send(&router, hook(&[], body)).await;
            assert_eq!(resp.status(), StatusCode::OK, "body {body}");
        }

        let published = hub.history(10);
        assert_eq!(published.len(), 4);
        assert_eq!(
            published[3].message.as_deref(),
            Some("Carol (1042) signed their payroll")
        );
        assert_eq!(published[1].data["subjectId"], "NV004");
        assert_eq!(
            published[0].message.as_deref(),
            Some("Unknown employee (unknown) signed their payroll")
        );
    }

    #[tokio::test]
    async fn invalid_json_is_400() {
        let mut config = test_config();
        config.webhooks.auth_mode = WebhookAuthMode::None;
        let (router, _hub) = test_app(config);
        let resp = send(&router, hook(&[], "{not json")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn disabled_webhooks_are_404() {
        let mut config = test_config();
        config.webhooks.enabled = false;
        let (router, _hub) = test_app(config);
        let resp = send(&router, hook(&[], BODY)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
