//! Ports - Interfaces for external dependencies.
//!
//! - `PaymentProvider` - one external subscription-billing service
//! - `ProviderFactory` - builds one adapter per provider
//! - `SubscriptionSink` - where adapters deliver normalized subscription changes
//! - `AccountStore` - persistence of account subscription fields

mod account_store;
mod payment_provider;

pub use account_store::{AccountStore, UpdateOutcome};
pub use payment_provider::{
    require_checkout_identity, CheckoutCompletion, PaymentError, PaymentErrorCode,
    PaymentProvider, ProviderFactory, SubscriptionSink,
};
