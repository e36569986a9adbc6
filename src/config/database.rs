//! Account store database settings.

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// PostgreSQL settings for the account store.
///
/// An empty URL selects the in-memory store, which is only allowed outside
/// production.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `postgres://` connection URL (`POSTGRES_URL`).
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    /// Apply `migrations/` before serving or migrating payment data.
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            min_connections: 1,
            max_connections: 10,
            acquire_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            run_migrations: false,
        }
    }
}

impl DatabaseConfig {
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
    }

    /// Which account store the URL selects.
    pub fn backend(&self) -> &'static str {
        if self.is_configured() {
            "postgres"
        } else {
            "in-memory"
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    /// Checks the URL scheme and pool bounds before a pool is opened.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(ValidationError::MissingRequired("POSTGRES_URL"));
        }
        if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
            return Err(ValidationError::InvalidDatabaseUrl);
        }
        if self.max_connections == 0 || self.min_connections > self.max_connections {
            return Err(ValidationError::InvalidPoolSize);
        }
        Ok(())
    }
}
