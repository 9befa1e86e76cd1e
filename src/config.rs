use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::Validate;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::services::checkout::PricingConfig;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";

/// Application configuration with validation.
///
/// Loaded from `config/default` and `config/<env>` files, then overridden
/// by `APP__`-prefixed environment variables.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT signing secret (minimum 32 characters)
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// Access token lifetime in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration: u64,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Create missing tables from entity definitions at startup. Meant for
    /// sqlite/dev environments.
    #[serde(default)]
    pub auto_migrate: bool,

    /// Percent commission applied when a vendor has no configured rate
    #[serde(default = "default_commission_rate")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub default_commission_rate: f64,

    /// Tax as a fraction of the subtotal, e.g. 0.08 for 8%
    #[serde(default = "default_tax_rate")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub default_tax_rate: f64,

    /// Flat shipping charge per order
    #[serde(default = "default_shipping_fee")]
    #[validate(range(min = 0.0))]
    pub shipping_fee: f64,

    /// Secret for verifying inbound payment webhooks; unsigned webhooks are
    /// accepted when unset (dev only)
    #[serde(default)]
    pub payment_webhook_secret: Option<String>,

    /// Webhook timestamp tolerance (seconds)
    #[serde(default)]
    pub payment_webhook_tolerance_secs: Option<u64>,

    /// Timeout on calls to the payment processor (seconds)
    #[serde(default = "default_gateway_timeout_secs")]
    pub payment_gateway_timeout_secs: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_jwt_expiration() -> u64 {
    3600
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_commission_rate() -> f64 {
    10.0
}
fn default_tax_rate() -> f64 {
    0.08
}
fn default_shipping_fee() -> f64 {
    10.0
}
fn default_gateway_timeout_secs() -> u64 {
    10
}
fn default_event_channel_capacity() -> usize {
    1024
}

impl AppConfig {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checkout pricing knobs with the f64 config values pinned to Decimal.
    pub fn pricing(&self) -> PricingConfig {
        PricingConfig {
            default_commission_rate: Decimal::from_f64_retain(self.default_commission_rate)
                .unwrap_or(dec!(10))
                .round_dp(2),
            tax_rate: Decimal::from_f64_retain(self.default_tax_rate)
                .unwrap_or(dec!(0.08))
                .round_dp(4),
            shipping_fee: Decimal::from_f64_retain(self.shipping_fee)
                .unwrap_or(dec!(10))
                .round_dp(2),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("configuration loading error: {0}")]
    Load(#[from] ConfigError),
    #[error("configuration validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // jwt_secret has no default on purpose: it must come from a config file
    // or the environment so an insecure default never reaches production.
    let config = Config::builder()
        .set_default("database_url", "sqlite://marketplace.db?mode=rwc")?
        .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
        .add_source(File::with_name(&format!("{CONFIG_DIR}/{run_env}")).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET to a secure random string (minimum 32 characters).");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured".into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;
    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    Ok(app_config)
}

/// Install the global tracing subscriber with an env-filter pipeline.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("marketplace_api={level},tower_http=info");
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
            jwt_expiration: 3600,
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            default_commission_rate: 10.0,
            default_tax_rate: 0.08,
            shipping_fee: 10.0,
            payment_webhook_secret: None,
            payment_webhook_tolerance_secs: None,
            payment_gateway_timeout_secs: 10,
            event_channel_capacity: 64,
        }
    }

    #[test]
    fn pricing_converts_to_decimal() {
        let pricing = base_config().pricing();
        assert_eq!(pricing.default_commission_rate, dec!(10));
        assert_eq!(pricing.tax_rate, dec!(0.08));
        assert_eq!(pricing.shipping_fee, dec!(10));
    }

    #[test]
    fn short_jwt_secret_fails_validation() {
        let mut cfg = base_config();
        cfg.jwt_secret = "short".to_string();
        assert!(cfg.validate().is_err());
    }
}
