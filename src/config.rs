use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{0} is invalid: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Token gate operators present on verify calls.
    pub gate_token: String,
    pub currency: String,
    pub payment_base_url: String,
    pub payment_secret_key: String,
    /// Provider minimum chargeable amount, in minor units.
    pub min_charge_minor: i64,
    /// Pending orders older than this are reclaimed by the sweep.
    pub pending_order_ttl: Duration,
    pub sweep_interval: Duration,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn optional(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed<T>(name: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional(name, default)
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid(name, e.to_string()))
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(AppConfig {
            database_url: required("DATABASE_URL")?,
            host: optional("HOST", "0.0.0.0"),
            port: parsed("PORT", "8080")?,
            gate_token: required("GATE_TOKEN")?,
            currency: optional("CURRENCY", "NGN"),
            payment_base_url: required("PAYMENT_BASE_URL")?,
            payment_secret_key: required("PAYMENT_SECRET_KEY")?,
            min_charge_minor: parsed("MIN_CHARGE_MINOR", "10000")?,
            pending_order_ttl: Duration::from_secs(parsed("PENDING_ORDER_TTL_SECS", "900")?),
            sweep_interval: Duration::from_secs(parsed("SWEEP_INTERVAL_SECS", "300")?),
        })
    }
}
