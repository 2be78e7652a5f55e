//! Application configuration loaded from environment variables.

use std::time::Duration;

use checkout::GatewayMode;
use thiserror::Error;

pub const DEFAULT_CASHFREE_BASE_URL: &str = checkout::payment::cashfree::DEFAULT_BASE_URL;
pub const DEFAULT_CASHFREE_API_VERSION: &str = checkout::payment::cashfree::DEFAULT_API_VERSION;

/// Errors raised while reading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("live payment mode requires CASHFREE_APP_ID and CASHFREE_SECRET_KEY")]
    MissingCredentials,
}

/// Payment gateway settings.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub mode: GatewayMode,
    pub app_id: Option<String>,
    pub secret_key: Option<String>,
    pub api_version: String,
    pub base_url: String,
    pub return_url: Option<String>,
    pub notify_url: Option<String>,
    pub webhook_secret: String,
    pub currency: String,
    pub timeout: Duration,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            mode: GatewayMode::Sandbox,
            app_id: None,
            secret_key: None,
            api_version: DEFAULT_CASHFREE_API_VERSION.to_string(),
            base_url: DEFAULT_CASHFREE_BASE_URL.to_string(),
            return_url: None,
            notify_url: None,
            webhook_secret: String::new(),
            currency: "INR".to_string(),
            timeout: Duration::from_millis(10_000),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` (default `"0.0.0.0"`), `PORT` (default `3000`)
/// - `RUST_LOG`, tracing filter directive (default `"info"`)
/// - `DATABASE_URL`, PostgreSQL when set, in-memory otherwise
/// - `SEED_DEMO_DATA`, load a demo user and catalog at startup
/// - `PAYMENT_GATEWAY_MODE` (`sandbox` or `live`, default `sandbox`)
/// - `CASHFREE_APP_ID`, `CASHFREE_SECRET_KEY`, `CASHFREE_API_VERSION`,
///   `CASHFREE_BASE_URL`
/// - `PAYMENT_RETURN_URL`, `PAYMENT_NOTIFY_URL`, `PAYMENT_WEBHOOK_SECRET`,
///   `PAYMENT_CURRENCY`, `PAYMENT_GATEWAY_TIMEOUT_MS`
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub seed_demo_data: bool,
    pub payment: PaymentConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`, which returns a variable's value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = PaymentConfig::default();

        let port = match var("PORT") {
            Some(p) => p.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                name: "PORT",
                value: p,
            })?,
            None => 3000,
        };

        let mode = match var("PAYMENT_GATEWAY_MODE") {
            Some(m) => m.parse::<GatewayMode>().map_err(|_| ConfigError::InvalidValue {
                name: "PAYMENT_GATEWAY_MODE",
                value: m,
            })?,
            None => defaults.mode,
        };

        let timeout = match var("PAYMENT_GATEWAY_TIMEOUT_MS") {
            Some(t) => Duration::from_millis(t.parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue {
                    name: "PAYMENT_GATEWAY_TIMEOUT_MS",
                    value: t,
                }
            })?),
            None => defaults.timeout,
        };

        let payment = PaymentConfig {
            mode,
            app_id: var("CASHFREE_APP_ID"),
            secret_key: var("CASHFREE_SECRET_KEY"),
            api_version: var("CASHFREE_API_VERSION").unwrap_or(defaults.api_version),
            base_url: var("CASHFREE_BASE_URL").unwrap_or(defaults.base_url),
            return_url: var("PAYMENT_RETURN_URL"),
            notify_url: var("PAYMENT_NOTIFY_URL"),
            webhook_secret: var("PAYMENT_WEBHOOK_SECRET").unwrap_or_default(),
            currency: var("PAYMENT_CURRENCY").unwrap_or(defaults.currency),
            timeout,
        };

        if payment.mode == GatewayMode::Live
            && (payment.app_id.is_none() || payment.secret_key.is_none())
        {
            return Err(ConfigError::MissingCredentials);
        }

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            log_level: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            database_url: var("DATABASE_URL"),
            seed_demo_data: var("SEED_DEMO_DATA")
                .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes")),
            payment,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            seed_demo_data: false,
            payment: PaymentConfig::default(),
        }
    }
}
