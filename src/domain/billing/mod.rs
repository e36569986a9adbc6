//! Billing domain: providers, catalog, canonical subscription state and the
//! legacy/generic field duality on accounts.

mod account;
mod catalog;
mod migration;
mod provider;
mod signature;
mod status;
mod subscription_change;
mod webhook;
mod webhook_errors;

pub use account::{Account, GenericFields, LegacyCardFields};
pub use catalog::{Catalog, Price, Product};
pub use migration::{
    card_field_mismatches, Inconsistency, MigrationOperation, MigrationReport, UnknownOperation,
    ValidationReport,
};
pub use provider::{ProviderKind, UnknownProvider};
pub use signature::{
    constant_time_compare, timestamp_within_window, MAX_FUTURE_TOLERANCE_SECS,
    MAX_TIMESTAMP_AGE_SECS,
};
pub use status::SubscriptionStatus;
pub use subscription_change::{AccountReference, SubscriptionChange, SubscriptionWrite};
pub use webhook::{ReconcileOutcome, WebhookEvent, WebhookHeaders};
pub use webhook_errors::WebhookError;
