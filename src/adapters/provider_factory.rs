//! Builds the real provider adapters from application configuration.

use std::sync::Arc;

use secrecy::ExposeSecret;

use crate::adapters::paypal::{PayPalConfig, PayPalMode, PayPalPaymentAdapter};
use crate::adapters::stripe::{StripeConfig, StripePaymentAdapter};
use crate::application::ProviderRegistry;
use crate::config::PaymentConfig;
use crate::domain::billing::ProviderKind;
use crate::ports::{PaymentError, PaymentProvider, ProviderFactory, SubscriptionSink};

/// Factory for the Stripe and PayPal adapters.
///
/// Missing credentials surface as `NotConfigured` when the provider is
/// first requested, not at startup.
pub struct ConfiguredProviderFactory {
    config: PaymentConfig,
    sink: Arc<dyn SubscriptionSink>,
}

impl ConfiguredProviderFactory {
    pub fn new(config: PaymentConfig, sink: Arc<dyn SubscriptionSink>) -> Self {
        Self { config, sink }
    }

    fn stripe(&self) -> Result<StripePaymentAdapter, PaymentError> {
        let card = &self.config.card;
        let api_key = card
            .api_key
            .as_ref()
            .map(|k| k.expose_secret().clone())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PaymentError::not_configured("STRIPE_SECRET_KEY is not set"))?;

        let mut config = StripeConfig::new(api_key, &self.config.base_url)
            .with_trial_period_days(self.config.trial_period_days)
            .with_timeout(self.config.provider_timeout())
            .with_require_livemode(card.require_livemode);
        if let Some(url) = &card.api_base_url {
            config = config.with_base_url(url);
        }
        StripePaymentAdapter::new(config, self.sink.clone())
    }

    fn paypal(&self) -> Result<PayPalPaymentAdapter, PaymentError> {
        let wallet = &self.config.wallet;
        let client_id = wallet
            .client_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PaymentError::not_configured("PAYPAL_CLIENT_ID is not set"))?;
        let client_secret = wallet
            .client_secret
            .as_ref()
            .map(|s| s.expose_secret().clone())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PaymentError::not_configured("PAYPAL_CLIENT_SECRET is not set"))?;
        let mode = PayPalMode::parse(&wallet.mode).ok_or_else(|| {
            PaymentError::not_configured(format!("Invalid PAYPAL_MODE: {}", wallet.mode))
        })?;

        let mut config = PayPalConfig::new(client_id, client_secret, mode, &self.config.base_url)
            .with_brand_name(&self.config.brand_name)
            .with_timeout(self.config.provider_timeout());
        if let Some(url) = &wallet.api_base_url {
            config = config.with_base_url(url);
        }
        PayPalPaymentAdapter::new(config, self.sink.clone())
    }
}

impl ProviderFactory for ConfiguredProviderFactory {
    fn create(&self, provider: ProviderKind) -> Result<Arc<dyn PaymentProvider>, PaymentError> {
        let adapter: Arc<dyn PaymentProvider> = match provider {
            ProviderKind::Card => Arc::new(self.stripe()?),
            ProviderKind::Wallet => Arc::new(self.paypal()?),
        };
        tracing::info!(provider = %provider, "Constructed payment provider");
        Ok(adapter)
    }
}

/// Registry over the real adapters. An unset or unknown default provider
/// falls back to the card provider.
pub fn build_registry(config: &PaymentConfig, sink: Arc<dyn SubscriptionSink>) -> ProviderRegistry {
    let default_provider = config.default_provider_kind().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Falling back to card as default provider");
        ProviderKind::Card
    });
    ProviderRegistry::new(
        Arc::new(ConfiguredProviderFactory::new(config.clone(), sink)),
        default_provider,
    )
}
