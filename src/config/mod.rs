//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `BILLING` prefix and nested values use double underscores as separators.
//! The conventional bare names (`BASE_URL`, `STRIPE_SECRET_KEY`, ...) are
//! accepted as overrides.
//!
//! # Example
//!
//! ```no_run
//! use billing_bridge::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod database;
mod error;
mod payment;
mod server;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::{CardProviderConfig, PaymentConfig, WalletProviderConfig};
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Bare environment names and the configuration keys they override.
pub const ENV_ALIASES: [(&str, &str); 9] = [
    ("DEFAULT_PAYMENT_PROVIDER", "payment.default_provider"),
    ("BASE_URL", "payment.base_url"),
    ("STRIPE_SECRET_KEY", "payment.card.api_key"),
    ("STRIPE_WEBHOOK_SECRET", "payment.card.webhook_secret"),
    ("PAYPAL_CLIENT_ID", "payment.wallet.client_id"),
    ("PAYPAL_CLIENT_SECRET", "payment.wallet.client_secret"),
    ("PAYPAL_WEBHOOK_ID", "payment.wallet.webhook_id"),
    ("PAYPAL_MODE", "payment.wallet.mode"),
    ("POSTGRES_URL", "database.url"),
];

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (PostgreSQL connection)
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Payment provider configuration
    #[serde(default)]
    pub payment: PaymentConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `BILLING` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Applies the bare [`ENV_ALIASES`], which take precedence
    ///
    /// # Environment Variable Format
    ///
    /// - `BILLING__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `BILLING__PAYMENT__CARD__API_KEY=...` -> `payment.card.api_key = ...`
    /// - `STRIPE_SECRET_KEY=...` -> `payment.card.api_key = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder().add_source(
            config::Environment::default()
                .prefix("BILLING")
                .separator("__"),
        );
        for (name, key) in ENV_ALIASES {
            let value = std::env::var(name).ok().filter(|v| !v.is_empty());
            builder = builder.set_override_option(key, value)?;
        }

        let config = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// A database URL is required in production. Elsewhere it may be empty,
    /// in which case accounts live in memory.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        if self.database.is_configured() || self.is_production() {
            self.database.validate()?;
        }
        self.payment.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
