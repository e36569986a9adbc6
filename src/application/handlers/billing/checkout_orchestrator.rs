//! CheckoutOrchestrator - binds registry output to redirect URLs.
//!
//! Starting a checkout never writes account state; the webhook path (and
//! the checkout return, through the same applier) owns every write.

use chrono::{SubsecRound, Utc};
use reqwest::Url;
use std::sync::Arc;
use thiserror::Error;

use crate::application::ProviderRegistry;
use crate::domain::billing::{Account, Catalog, ReconcileOutcome};
use crate::domain::foundation::{AccountId, DomainError};
use crate::ports::{AccountStore, PaymentError, PaymentErrorCode, PaymentProvider, SubscriptionSink};

/// Errors surfaced to checkout, portal and catalog callers.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Store(#[from] DomainError),

    #[error("Account {0} not found")]
    AccountNotFound(AccountId),

    #[error("Cannot build redirect URL: {0}")]
    InvalidUrl(String),
}

/// Command to start a hosted checkout.
#[derive(Debug, Clone)]
pub struct StartCheckoutCommand {
    pub account_id: Option<AccountId>,
    pub actor_id: Option<String>,
    pub price_id: String,
    /// Explicit provider; the registry default otherwise.
    pub provider: Option<String>,
}

/// Result of the checkout return path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutCompleted {
    pub account_id: AccountId,
    pub outcome: ReconcileOutcome,
}

pub struct CheckoutOrchestrator {
    registry: Arc<ProviderRegistry>,
    store: Arc<dyn AccountStore>,
    sink: Arc<dyn SubscriptionSink>,
    base_url: String,
}

impl CheckoutOrchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        store: Arc<dyn AccountStore>,
        sink: Arc<dyn SubscriptionSink>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            store,
            sink,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Returns the URL the caller should follow.
    ///
    /// A caller without an account (or actor) is sent to sign-up with the
    /// chosen price preserved, which is a valid result, not an error.
    pub async fn start_checkout(&self, cmd: StartCheckoutCommand) -> Result<String, CheckoutError> {
        let provider = self.resolve(cmd.provider.as_deref())?;
        let account = match &cmd.account_id {
            Some(id) => self.store.find_by_id(id).await?,
            None => None,
        };

        match provider
            .create_checkout_session(account.as_ref(), &cmd.price_id, cmd.actor_id.as_deref())
            .await
        {
            Ok(url) => {
                tracing::info!(
                    provider = %provider.provider_name(),
                    price_id = %cmd.price_id,
                    "Checkout session created"
                );
                Ok(url)
            }
            Err(e) if e.code == PaymentErrorCode::InvalidAccount => {
                tracing::debug!(price_id = %cmd.price_id, "Checkout without account; redirecting to sign-up");
                self.sign_up_url(&cmd.price_id)
            }
            Err(e) => {
                tracing::warn!(provider = %provider.provider_name(), error = %e, "Checkout failed");
                Err(e.into())
            }
        }
    }

    /// Returns the self-service portal URL for an account.
    ///
    /// Accounts with no customer at the provider get the pricing page.
    pub async fn open_portal(
        &self,
        account_id: &AccountId,
        provider: Option<&str>,
    ) -> Result<String, CheckoutError> {
        let account = self
            .store
            .find_by_id(account_id)
            .await?
            .ok_or(CheckoutError::AccountNotFound(*account_id))?;
        let provider = self.portal_provider(&account, provider)?;

        match provider.create_customer_portal_session(&account).await {
            Ok(url) => Ok(url),
            Err(e) if e.code == PaymentErrorCode::NoBillingIdentity => {
                tracing::debug!(account_id = %account.id, "No billing identity; redirecting to pricing");
                self.pricing_url()
            }
            Err(e) => {
                tracing::warn!(provider = %provider.provider_name(), error = %e, "Portal session failed");
                Err(e.into())
            }
        }
    }

    /// Lists one provider's catalog, dropping prices of unlisted products.
    pub async fn catalog(&self, provider: Option<&str>) -> Result<Catalog, CheckoutError> {
        let provider = self.resolve(provider)?;
        let (products, prices) = tokio::try_join!(provider.get_products(), provider.get_prices())?;
        let (catalog, dropped) = Catalog::assemble(products, prices);
        if !dropped.is_empty() {
            tracing::warn!(
                provider = %provider.provider_name(),
                dropped = ?dropped,
                "Dropped prices referencing unlisted products"
            );
        }
        Ok(catalog)
    }

    /// Resolves a checkout reference and applies it like a webhook change.
    pub async fn complete_checkout(
        &self,
        provider: &str,
        reference: &str,
    ) -> Result<CheckoutCompleted, CheckoutError> {
        let provider = self.registry.get_provider(provider)?;
        let kind = provider.provider_name();
        let completion = provider.retrieve_checkout(reference).await?;
        let account_id = completion.account_id;

        // Processor event times have whole-second precision.
        let occurred_at = Utc::now().trunc_subsecs(0);
        let outcome = self
            .sink
            .apply(completion.into_change(kind, occurred_at))
            .await?;
        tracing::info!(
            provider = %kind,
            account_id = %account_id,
            outcome = outcome.label(),
            "Checkout completed"
        );
        Ok(CheckoutCompleted {
            account_id,
            outcome,
        })
    }

    pub fn sign_up_url(&self, price_id: &str) -> Result<String, CheckoutError> {
        self.url(
            "/sign-up",
            &[("redirect", "checkout"), ("priceId", price_id)],
        )
    }

    pub fn pricing_url(&self) -> Result<String, CheckoutError> {
        self.url("/pricing", &[])
    }

    pub fn dashboard_url(&self) -> Result<String, CheckoutError> {
        self.url("/dashboard", &[])
    }

    pub fn error_url(&self) -> Result<String, CheckoutError> {
        self.url("/error", &[])
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<String, CheckoutError> {
        Url::parse_with_params(&format!("{}{}", self.base_url, path), params)
            .map(|mut url| {
                if params.is_empty() {
                    url.set_query(None);
                }
                url.to_string()
            })
            .map_err(|e| CheckoutError::InvalidUrl(e.to_string()))
    }

    fn resolve(&self, provider: Option<&str>) -> Result<Arc<dyn PaymentProvider>, PaymentError> {
        match provider.filter(|p| !p.trim().is_empty()) {
            Some(name) => self.registry.get_provider(name),
            None => self.registry.get_default_provider(),
        }
    }

    fn portal_provider(
        &self,
        account: &Account,
        explicit: Option<&str>,
    ) -> Result<Arc<dyn PaymentProvider>, PaymentError> {
        match (explicit.filter(|p| !p.trim().is_empty()), account.billing_provider()) {
            (Some(name), _) => self.registry.get_provider(name),
            (None, Some(kind)) => self.registry.get(kind),
            (None, None) => self.registry.get_default_provider(),
        }
    }
}
