//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! The webhook path is the single writer of subscription state; checkout
//! only starts remote flows.

pub mod handlers;
mod provider_registry;

#[cfg(test)]
pub(crate) mod test_support;

pub use handlers::{
    CheckoutCompleted, CheckoutError, CheckoutOrchestrator, MigrationError, MigrationOutcome,
    PaymentDataMigrator, ReconcileWebhookCommand, StartCheckoutCommand, SubscriptionApplier,
    WebhookReconciler,
};
pub use provider_registry::ProviderRegistry;
