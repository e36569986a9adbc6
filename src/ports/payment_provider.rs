//! Payment provider port.
//!
//! Defines the contract every subscription-billing integration satisfies.
//! Checkout, portal, catalog and webhook semantics of each external service
//! are normalized into the types below so callers never branch on provider.
//!
//! # Design
//!
//! - **Closed set**: implementations correspond to [`ProviderKind`] variants
//! - **Pure verification**: `verify_webhook_signature` never errors, it returns `false`
//! - **Single writer**: subscription state changes only flow through
//!   [`SubscriptionSink`], never from checkout initiation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::domain::billing::{
    Account, AccountReference, Price, Product, ProviderKind, ReconcileOutcome,
    SubscriptionChange, SubscriptionStatus, WebhookError, WebhookEvent, WebhookHeaders,
};
use crate::domain::foundation::{AccountId, DomainError};

/// Port for payment provider integrations.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Which provider this adapter talks to.
    fn provider_name(&self) -> ProviderKind;

    /// Starts a hosted checkout for `price_id` and returns the redirect URL.
    ///
    /// Fails with `InvalidAccount` when the account or actor is missing, and
    /// with `RemoteRejected` if the provider declines to start a session.
    /// Mutates nothing locally.
    async fn create_checkout_session(
        &self,
        account: Option<&Account>,
        price_id: &str,
        actor_id: Option<&str>,
    ) -> Result<String, PaymentError>;

    /// Returns a self-service billing URL for the account.
    ///
    /// Fails with `NoBillingIdentity` when the account has no customer id at
    /// this provider.
    async fn create_customer_portal_session(&self, account: &Account)
        -> Result<String, PaymentError>;

    /// Lists active products. An empty catalog is `Ok(vec![])`.
    async fn get_products(&self) -> Result<Vec<Product>, PaymentError>;

    /// Lists active recurring prices. An empty catalog is `Ok(vec![])`.
    async fn get_prices(&self) -> Result<Vec<Price>, PaymentError>;

    /// Resolves the subscription behind a checkout return identifier.
    async fn retrieve_checkout(&self, reference: &str)
        -> Result<CheckoutCompletion, PaymentError>;

    /// Loads whatever remote material verification needs (signing
    /// certificates) so that `verify_webhook_signature` can stay synchronous.
    async fn prepare_webhook_verification(
        &self,
        _headers: &WebhookHeaders,
    ) -> Result<(), PaymentError> {
        Ok(())
    }

    /// Checks the delivery's signature over the raw body bytes.
    ///
    /// Any internal failure collapses to `false`.
    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        headers: &WebhookHeaders,
        shared_secret: &str,
    ) -> bool;

    /// Parses a verified raw body into the provider's event envelope.
    fn parse_webhook_event(&self, payload: &[u8]) -> Result<WebhookEvent, PaymentError>;

    /// Dispatches on `event.event_type`. Unrecognized types are ignored.
    async fn handle_webhook(&self, event: &WebhookEvent)
        -> Result<ReconcileOutcome, WebhookError>;

    /// Normalizes a provider-native subscription object and applies it.
    async fn handle_subscription_change(
        &self,
        raw: &Value,
        occurred_at: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, WebhookError>;
}

/// Builds the adapter for one provider.
///
/// Construction may resolve credentials, so callers cache the result.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, provider: ProviderKind) -> Result<Arc<dyn PaymentProvider>, PaymentError>;
}

/// Where provider adapters hand normalized subscription changes.
#[async_trait]
pub trait SubscriptionSink: Send + Sync {
    /// Applies one change to the account it references.
    ///
    /// A missing account is `Ok(Dropped)`, not an error.
    async fn apply(&self, change: SubscriptionChange) -> Result<ReconcileOutcome, DomainError>;
}

/// Subscription details resolved on the checkout return path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutCompletion {
    /// The account that initiated checkout (correlation id).
    pub account_id: AccountId,
    pub customer_id: Option<String>,
    pub subscription_id: String,
    pub product_id: Option<String>,
    pub plan_name: Option<String>,
    pub status: SubscriptionStatus,
}

impl CheckoutCompletion {
    /// Converts into a change correlated by account id.
    pub fn into_change(
        self,
        provider: ProviderKind,
        occurred_at: DateTime<Utc>,
    ) -> SubscriptionChange {
        SubscriptionChange {
            provider,
            account: AccountReference::AccountId(self.account_id),
            customer_id: self.customer_id,
            subscription_id: self.subscription_id,
            product_id: self.product_id,
            plan_name: self.plan_name,
            status: self.status,
            occurred_at,
        }
    }
}

/// Validates the checkout caller, returning the account and actor.
pub fn require_checkout_identity<'a>(
    account: Option<&'a Account>,
    actor_id: Option<&'a str>,
) -> Result<(&'a Account, &'a str), PaymentError> {
    match (account, actor_id.filter(|a| !a.trim().is_empty())) {
        (Some(account), Some(actor)) => Ok((account, actor)),
        (None, _) => Err(PaymentError::invalid_account("No account for checkout")),
        (_, None) => Err(PaymentError::invalid_account("No actor for checkout")),
    }
}

/// Payment operation error.
#[derive(Debug, Clone)]
pub struct PaymentError {
    /// Error code for categorization.
    pub code: PaymentErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Provider's error code (if available).
    pub provider_code: Option<String>,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl PaymentError {
    /// Create a new payment error.
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    /// Create with provider code.
    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn unsupported_provider(name: &str) -> Self {
        Self::new(
            PaymentErrorCode::UnsupportedProvider,
            format!("Unsupported payment provider: {}", name),
        )
    }

    pub fn invalid_account(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::InvalidAccount, message)
    }

    pub fn no_billing_identity(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::NoBillingIdentity, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::RemoteRejected, message)
    }

    /// Transport failure or timeout talking to the provider.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::RemoteUnavailable, message)
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::InvalidPayload, message)
    }

    pub fn not_configured(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::NotConfigured, message)
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PaymentError {}

impl From<PaymentError> for WebhookError {
    fn from(err: PaymentError) -> Self {
        match err.code {
            PaymentErrorCode::SignatureInvalid => WebhookError::InvalidSignature,
            PaymentErrorCode::InvalidPayload => WebhookError::ParseError(err.message),
            PaymentErrorCode::UnsupportedProvider => WebhookError::UnsupportedProvider(err.message),
            PaymentErrorCode::NotConfigured => WebhookError::SecretNotConfigured(err.message),
            _ => WebhookError::ProviderUnavailable(err.to_string()),
        }
    }
}

impl From<DomainError> for WebhookError {
    fn from(err: DomainError) -> Self {
        WebhookError::Storage(err.to_string())
    }
}

/// Payment error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorCode {
    /// Provider name outside the supported set.
    UnsupportedProvider,

    /// Checkout attempted without an account or actor.
    InvalidAccount,

    /// Account has no customer id at the provider yet.
    NoBillingIdentity,

    /// Provider answered but refused the request.
    RemoteRejected,

    /// Provider unreachable, timed out, or failed server-side.
    RemoteUnavailable,

    /// Webhook signature did not verify.
    SignatureInvalid,

    /// Provider payload could not be parsed.
    InvalidPayload,

    /// Required credentials are missing.
    NotConfigured,
}

impl PaymentErrorCode {
    /// Check if this error type is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentErrorCode::RemoteUnavailable)
    }
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentErrorCode::UnsupportedProvider => "unsupported_provider",
            PaymentErrorCode::InvalidAccount => "invalid_account",
            PaymentErrorCode::NoBillingIdentity => "no_billing_identity",
            PaymentErrorCode::RemoteRejected => "remote_rejected",
            PaymentErrorCode::RemoteUnavailable => "remote_unavailable",
            PaymentErrorCode::SignatureInvalid => "signature_invalid",
            PaymentErrorCode::InvalidPayload => "invalid_payload",
            PaymentErrorCode::NotConfigured => "not_configured",
        };
        write!(f, "{}", s)
    }
}
