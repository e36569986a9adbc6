//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod billing;

pub use billing::{
    // Webhook path
    ReconcileWebhookCommand,
    SubscriptionApplier,
    WebhookReconciler,
    // Checkout and portal
    CheckoutCompleted,
    CheckoutError,
    CheckoutOrchestrator,
    StartCheckoutCommand,
    // Schema migration
    MigrationError,
    MigrationOutcome,
    PaymentDataMigrator,
};
