//! Stripe adapter for the card-processor provider.
//!
//! # Security
//!
//! - Webhook signatures use HMAC-SHA256 with constant-time comparison
//! - Timestamps are validated to prevent replay attacks (5-minute window)
//! - All secrets are handled via `secrecy::SecretString`

mod stripe_adapter;
mod webhook_types;

pub use stripe_adapter::{StripeConfig, StripePaymentAdapter, SIGNATURE_HEADER};
pub use webhook_types::{SignatureHeader, SignatureParseError, StripeWebhookEvent};

#[cfg(test)]
pub(crate) use stripe_adapter::sign_payload;
