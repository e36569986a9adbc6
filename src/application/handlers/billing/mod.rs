//! Billing handlers.
//!
//! ## Commands
//! - Reconciling provider webhook deliveries
//! - Applying normalized subscription changes
//! - Starting checkout, opening the portal, completing checkout
//! - Migrating payment data between the legacy and generic fields
//!
//! ## Queries
//! - Listing a provider's catalog
//! - Validating payment data consistency

mod apply_subscription_change;
mod checkout_orchestrator;
mod migrate_payment_data;
mod reconcile_webhook;

pub use apply_subscription_change::SubscriptionApplier;
pub use checkout_orchestrator::{
    CheckoutCompleted, CheckoutError, CheckoutOrchestrator, StartCheckoutCommand,
};
pub use migrate_payment_data::{MigrationError, MigrationOutcome, PaymentDataMigrator};
pub use reconcile_webhook::{ReconcileWebhookCommand, WebhookReconciler};
