//! services/bot/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where uploaded documents are kept.
#[derive(Clone, Debug, PartialEq)]
pub enum StorageConfig {
    /// Supabase-style HTTP object storage.
    Http { base_url: String, api_key: String },
    /// Plain files under a local directory.
    Local { root: PathBuf },
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub cors_origin: Option<String>,

    // --- Scoring ---
    pub originality_api_key: Option<String>,
    pub originality_api_url: String,
    pub originality_model_version: String,
    pub scoring_timeout: Duration,
    pub refund_on_scoring_failure: bool,

    // --- Storage ---
    pub storage: StorageConfig,
    pub storage_bucket: String,
    pub http_timeout: Duration,

    // --- Payments ---
    pub stripe_secret_key: String,
    pub stripe_api_url: String,
    pub payment_currency: String,
    pub bot_username: String,

    // --- Background work ---
    pub maintenance_status_url: Option<String>,
    pub maintenance_interval: Duration,
    pub maintenance_timeout: Duration,
    pub busy_lease: Duration,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn seconds_var(name: &str, default: u64) -> Result<Duration, ConfigError> {
    let secs = parse_var::<u64>(name, default)?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(Duration::from_secs(secs))
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Scoring (the key is optional; without it the service is "not configured") ---
        let originality_api_key = optional_var("ORIGINALITY_API_KEY");
        let originality_api_url =
            var_or("ORIGINALITY_API_URL", "https://api.originality.ai/api/v3/scan");
        let originality_model_version = var_or("ORIGINALITY_MODEL_VERSION", "lite-102");
        let scoring_timeout = seconds_var("SCORING_TIMEOUT_SECS", 30)?;
        let refund_on_scoring_failure = parse_var("REFUND_ON_SCORING_FAILURE", false)?;

        // --- Storage ---
        let storage = match (optional_var("STORAGE_URL"), optional_var("STORAGE_KEY")) {
            (Some(base_url), Some(api_key)) => StorageConfig::Http {
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key,
            },
            (Some(_), None) => return Err(ConfigError::MissingVar("STORAGE_KEY".to_string())),
            (None, _) => StorageConfig::Local {
                root: PathBuf::from(var_or("STORAGE_DIR", "./files")),
            },
        };
        let storage_bucket = var_or("STORAGE_BUCKET", "essays");
        let http_timeout = seconds_var("HTTP_TIMEOUT_SECS", 30)?;

        // --- Payments ---
        let stripe_secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| ConfigError::MissingVar("STRIPE_SECRET_KEY".to_string()))?;
        let stripe_api_url = var_or("STRIPE_API_URL", "https://api.stripe.com");
        let payment_currency = var_or("PAYMENT_CURRENCY", "hkd").to_lowercase();
        let bot_username = var_or("BOT_USERNAME", "your_bot");

        // --- Background work ---
        let maintenance_status_url = optional_var("MAINTENANCE_STATUS_URL");
        let maintenance_interval = seconds_var("MAINTENANCE_INTERVAL_SECS", 600)?;
        let maintenance_timeout = seconds_var("MAINTENANCE_TIMEOUT_SECS", 10)?;
        let busy_lease = seconds_var("BUSY_LEASE_SECS", 900)?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cors_origin: optional_var("CORS_ORIGIN"),
            originality_api_key,
            originality_api_url,
            originality_model_version,
            scoring_timeout,
            refund_on_scoring_failure,
            storage,
            storage_bucket,
            http_timeout,
            stripe_secret_key,
            stripe_api_url: stripe_api_url.trim_end_matches('/').to_string(),
            payment_currency,
            bot_username,
            maintenance_status_url,
            maintenance_interval,
            maintenance_timeout,
            busy_lease,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "BIND_ADDRESS",
        "DATABASE_URL",
        "RUST_LOG",
        "ORIGINALITY_API_KEY",
        "STORAGE_URL",
        "STORAGE_KEY",
        "STORAGE_DIR",
        "STRIPE_SECRET_KEY",
        "BUSY_LEASE_SECS",
        "REFUND_ON_SCORING_FAILURE",
        "PAYMENT_CURRENCY",
    ];

    fn reset() {
        for var in VARS {
            std::env::remove_var(var);
        }
        std::env::set_var("DATABASE_URL", "postgres://localhost/originality");
        std::env::set_var("STRIPE_SECRET_KEY", "sk_test_123");
    }

    #[test]
    fn defaults_apply() {
        let _guard = ENV_LOCK.lock().unwrap();
        reset();
        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.originality_api_key, None);
        assert_eq!(config.busy_lease, Duration::from_secs(900));
        assert_eq!(config.maintenance_interval, Duration::from_secs(600));
        assert_eq!(config.payment_currency, "hkd");
        assert!(!config.refund_on_scoring_failure);
        assert_eq!(
            config.storage,
            StorageConfig::Local {
                root: PathBuf::from("./files")
            }
        );
    }

    #[test]
    fn missing_database_url_is_reported() {
        let _guard = ENV_LOCK.lock().unwrap();
        reset();
        std::env::remove_var("DATABASE_URL");
        match Config::from_env() {
            Err(ConfigError::MissingVar(name)) => assert_eq!(name, "DATABASE_URL"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn http_storage_needs_a_key() {
        let _guard = ENV_LOCK.lock().unwrap();
        reset();
        std::env::set_var("STORAGE_URL", "https://project.supabase.co/");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::MissingVar(_))
        ));
        std::env::set_var("STORAGE_KEY", "service-role");
        let config = Config::from_env().unwrap();
        assert_eq!(
            config.storage,
            StorageConfig::Http {
                base_url: "https://project.supabase.co".to_string(),
                api_key: "service-role".to_string()
            }
        );
        reset();
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        reset();
        std::env::set_var("BUSY_LEASE_SECS", "soon");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidValue(name, _)) if name == "BUSY_LEASE_SECS"
        ));
        std::env::set_var("BUSY_LEASE_SECS", "0");
        assert!(Config::from_env().is_err());
        reset();
    }
}
