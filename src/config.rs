use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Pricing constants used by the cart preview and the checkout path alike.
/// Keeping them in one place guarantees the two paths cannot drift.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PricingConfig {
    /// Flat tax rate applied to the pre-discount subtotal
    #[serde(default = "default_tax_rate")]
    pub tax_rate: Decimal,

    /// Orders with a subtotal strictly above this ship for free
    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold: Decimal,

    /// Flat shipping fee charged below the free-shipping threshold
    #[serde(default = "default_flat_shipping_fee")]
    pub flat_shipping_fee: Decimal,

    /// Maximum share of the coupon-adjusted subtotal payable in coins
    #[serde(default = "default_coin_redemption_cap")]
    pub coin_redemption_cap: Decimal,

    /// Currency units of final total per coin earned
    #[serde(default = "default_coin_earn_unit")]
    pub coin_earn_unit: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate: default_tax_rate(),
            free_shipping_threshold: default_free_shipping_threshold(),
            flat_shipping_fee: default_flat_shipping_fee(),
            coin_redemption_cap: default_coin_redemption_cap(),
            coin_earn_unit: default_coin_earn_unit(),
        }
    }
}

fn default_tax_rate() -> Decimal {
    dec!(0.05)
}

fn default_free_shipping_threshold() -> Decimal {
    dec!(200)
}

fn default_flat_shipping_fee() -> Decimal {
    dec!(25)
}

fn default_coin_redemption_cap() -> Decimal {
    dec!(0.5)
}

fn default_coin_earn_unit() -> Decimal {
    dec!(10)
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment environment: "development", "test", or "production"
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default)]
    pub log_level: Option<String>,

    /// Emit logs as JSON instead of human-readable lines
    #[serde(default)]
    pub log_json: bool,

    /// Run embedded migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Maximum number of database connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// Minimum number of database connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Pricing constants (tax, shipping, coin redemption/earn rules)
    #[serde(default)]
    #[validate]
    pub pricing: PricingConfig,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

impl AppConfig {
    /// Construct a configuration programmatically (used by tests).
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: None,
            log_json: false,
            auto_migrate: false,
            db_max_connections: 10,
            db_min_connections: 1,
            pricing: PricingConfig::default(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Loads configuration from layered sources, in this order:
/// 1. Built-in defaults
/// 2. `config/default.toml`
/// 3. `config/{env}.toml` (selected by RUN_ENV or APP_ENV)
/// 4. `APP__*` environment variable overrides
pub fn load_config() -> Result<AppConfig, ConfigError> {
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

    let settings = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
        .add_source(File::with_name(&format!("{CONFIG_DIR}/{run_env}")).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: AppConfig = settings.try_deserialize()?;

    config
        .validate()
        .map_err(|e| ConfigError::Message(format!("Invalid configuration: {e}")))?;

    Ok(config)
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_api={level},tower_http=debug");
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

    #[test]
    fn pricing_defaults_match_documented_rules() {
        let pricing = PricingConfig::default();
        assert_eq!(pricing.tax_rate, dec!(0.05));
        assert_eq!(pricing.free_shipping_threshold, dec!(200));
        assert_eq!(pricing.flat_shipping_fee, dec!(25));
        assert_eq!(pricing.coin_redemption_cap, dec!(0.5));
        assert_eq!(pricing.coin_earn_unit, dec!(10));
    }

    #[test]
    fn server_addr_joins_host_and_port() {
        let cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            9000,
            "test".into(),
        );
        assert_eq!(cfg.server_addr(), "127.0.0.1:9000");
        assert!(!cfg.is_production());
    }
}
