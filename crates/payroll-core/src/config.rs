use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::types::UserRole;

pub const DEFAULT_PORT: u16 = 4002;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";

// Event hub limits
pub const DEFAULT_MAX_CONNECTIONS: usize = 5;
pub const DEFAULT_MAX_HISTORY_SIZE: usize = 50;
pub const DEFAULT_HISTORY_SNAPSHOT_SIZE: usize = 10; // backlog replayed to new joiners
pub const DEFAULT_THROTTLE_INTERVAL_MS: u64 = 1_000; // one event per type per second
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000; // also the liveness sweep cadence
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64; // queued frames before a consumer counts as dead

/// Top-level config (payroll.toml + PAYROLL_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayrollConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Origin allowed by CORS (the admin dashboard).
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            auth: AuthConfig::default(),
        }
    }
}

/// With no tokens configured every admin request is rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    /// Pre-shared bearer tokens. Token issuance lives in the main backend.
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    #[default]
    Token,
    /// Every caller is treated as an anonymous admin. Local development only.
    None,
}

/// One accepted bearer token and the principal it authenticates as.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    pub subject: String,
    #[serde(default)]
    pub role: UserRole,
}

/// Tunables for the real-time event hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_history_size")]
    pub max_history_size: usize,
    #[serde(default = "default_history_snapshot_size")]
    pub history_snapshot_size: usize,
    #[serde(default = "default_throttle_interval_ms")]
    pub throttle_interval_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_history_size: DEFAULT_MAX_HISTORY_SIZE,
            history_snapshot_size: DEFAULT_HISTORY_SNAPSHOT_SIZE,
            throttle_interval_ms: DEFAULT_THROTTLE_INTERVAL_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Authentication mode for the payroll-signed webhook.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WebhookAuthMode {
    /// HMAC-SHA256 over the raw request body in `X-Signature-256: sha256=<hex>`.
    HmacSha256,
    /// Static bearer token in the Authorization header.
    BearerToken,
    /// No authentication. Use only for internal/trusted networks.
    None,
}

/// Ingress used by the payroll backend to publish signing events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhooksConfig {
    /// When false the webhook route returns 404.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_webhook_auth_mode")]
    pub auth_mode: WebhookAuthMode,
    /// HMAC signing secret or bearer token value.
    pub secret: Option<String>,
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            auth_mode: default_webhook_auth_mode(),
            secret: None,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_frontend_url() -> String {
    DEFAULT_FRONTEND_URL.to_string()
}
fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}
fn default_max_history_size() -> usize {
    DEFAULT_MAX_HISTORY_SIZE
}
fn default_history_snapshot_size() -> usize {
    DEFAULT_HISTORY_SNAPSHOT_SIZE
}
fn default_throttle_interval_ms() -> u64 {
    DEFAULT_THROTTLE_INTERVAL_MS
}
fn default_heartbeat_interval_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}
fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}
fn default_webhook_auth_mode() -> WebhookAuthMode {
    WebhookAuthMode::HmacSha256
}

impl PayrollConfig {
    /// Load config from a TOML file with PAYROLL_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `PAYROLL_EVENTS__MAX_CONNECTIONS=10`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        tracing::debug!(path = %path, "loading config");

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::PayrollError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("PAYROLL_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.payroll/payroll.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_jail| {
            let config = PayrollConfig::load(Some("does-not-exist.toml")).expect("load");
            assert_eq!(config.gateway.port, DEFAULT_PORT);
            assert_eq!(config.events.max_connections, 5);
            assert_eq!(config.events.max_history_size, 50);
            assert_eq!(config.events.throttle_interval_ms, 1_000);
            assert_eq!(config.events.heartbeat_interval_ms, 30_000);
            assert!(!config.webhooks.enabled);
            assert_eq!(config.gateway.auth.mode, AuthMode::Token);
            assert!(config.gateway.auth.tokens.is_empty());
            Ok(())
        });
    }

    #[test]
    fn auth_section_without_mode_defaults_to_token() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "payroll.toml",
                r#"
                [gateway]
                port = 9000

                [[gateway.auth.tokens]]
                token = "t-1"
                subject = "hr-lead"
                role = "admin"
                "#,
            )?;

            let config = PayrollConfig::load(Some("payroll.toml")).expect("load");
            assert_eq!(config.gateway.port, 9000);
            assert_eq!(config.gateway.auth.mode, AuthMode::Token);
            assert_eq!(config.gateway.auth.tokens.len(), 1);
            assert_eq!(config.gateway.auth.tokens[0].token, "t-1");
            Ok(())
        });
    }

    #[test]
    fn toml_and_env_are_merged() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "payroll.toml",
                r#"
                [gateway]
                port = 9000

                [gateway.auth]
                mode = "token"
                [[gateway.auth.tokens]]
                token = "t-1"
                subject = "hr-lead"
                role = "admin"

                [events]
                max_connections = 8
                "#,
            )?;
            jail.set_env("PAYROLL_EVENTS__THROTTLE_INTERVAL_MS", "250");

            let config = PayrollConfig::load(Some("payroll.toml")).expect("load");
            assert_eq!(config.gateway.port, 9000);
            assert_eq!(config.gateway.bind, DEFAULT_BIND);
            assert_eq!(config.gateway.auth.tokens.len(), 1);
            assert_eq!(config.gateway.auth.tokens[0].subject, "hr-lead");
            assert!(config.gateway.auth.tokens[0].role.is_admin());
            assert_eq!(config.events.max_connections, 8);
            assert_eq!(config.events.throttle_interval_ms, 250);
            assert_eq!(config.events.max_history_size, DEFAULT_MAX_HISTORY_SIZE);
            Ok(())
        });
    }

    #[test]
    fn webhook_auth_mode_is_kebab_case() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "payroll.toml",
                r#"
                [webhooks]
                enabled = true
                auth_mode = "bearer-token"
                secret = "s3cret"
                "#,
            )?;
            let config = PayrollConfig::load(Some("payroll.toml")).expect("load");
            assert!(config.webhooks.enabled);
            assert_eq!(config.webhooks.auth_mode, WebhookAuthMode::BearerToken);
            assert_eq!(config.webhooks.secret.as_deref(), Some("s3cret"));
            Ok(())
        });
    }
}
