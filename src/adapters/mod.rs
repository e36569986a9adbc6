//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `stripe` - Card-processor provider (form-encoded REST, HMAC webhooks)
//! - `paypal` - Wallet-processor provider (JSON REST, OAuth2, RSA webhooks)
//! - `provider_factory` - Builds provider adapters from configuration
//! - `postgres` - Account store on PostgreSQL
//! - `memory` - In-memory account store for tests and development
//! - `http` - Axum REST API

pub mod http;
pub mod memory;
pub mod paypal;
pub mod postgres;
pub mod provider_factory;
pub mod stripe;

pub use memory::InMemoryAccountStore;
pub use paypal::{PayPalConfig, PayPalMode, PayPalPaymentAdapter};
pub use postgres::PostgresAccountStore;
pub use provider_factory::{build_registry, ConfiguredProviderFactory};
pub use stripe::{StripeConfig, StripePaymentAdapter};
