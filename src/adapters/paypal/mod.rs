//! PayPal adapter for the wallet-processor provider.
//!
//! # Security
//!
//! - Webhook transmissions are verified with SHA256withRSA against the
//!   certificate PayPal names in `paypal-cert-url`
//! - Certificate URLs outside `paypal.com` are never fetched

mod api_types;
mod paypal_adapter;
mod signature;

pub use api_types::{PayPalPlan, PayPalSubscription, PayPalWebhookEvent};
pub use paypal_adapter::{PayPalConfig, PayPalMode, PayPalPaymentAdapter};
pub use signature::{crc32, is_trusted_cert_url, signed_message, CertificateCache};

#[cfg(test)]
pub(crate) use signature::fixtures;
