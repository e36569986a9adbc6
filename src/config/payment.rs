//! Payment configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::domain::billing::ProviderKind;

/// Payment configuration shared by all providers
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Provider used when a request does not name one (`card` or `wallet`)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Public base URL used for provider return and cancel URLs
    #[serde(default)]
    pub base_url: String,

    /// Timeout for each provider API call in seconds
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,

    /// Brand shown on hosted approval pages
    #[serde(default = "default_brand_name")]
    pub brand_name: String,

    /// Trial granted on new card subscriptions
    #[serde(default = "default_trial_period_days")]
    pub trial_period_days: Option<u32>,

    #[serde(default)]
    pub card: CardProviderConfig,

    #[serde(default)]
    pub wallet: WalletProviderConfig,
}

/// Card processor (Stripe) credentials
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardProviderConfig {
    /// Secret API key (`sk_...`)
    pub api_key: Option<SecretString>,

    /// Webhook signing secret (`whsec_...`)
    pub webhook_secret: Option<SecretString>,

    /// API base URL override
    pub api_base_url: Option<String>,

    /// Reject test-mode events
    #[serde(default)]
    pub require_livemode: bool,
}

/// Wallet processor (PayPal) credentials
#[derive(Debug, Clone, Deserialize)]
pub struct WalletProviderConfig {
    pub client_id: Option<String>,

    pub client_secret: Option<SecretString>,

    /// Webhook id, part of every signed transmission
    pub webhook_id: Option<String>,

    /// `sandbox` or `live`
    #[serde(default = "default_wallet_mode")]
    pub mode: String,

    /// API base URL override
    pub api_base_url: Option<String>,
}

impl Default for WalletProviderConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            webhook_id: None,
            mode: default_wallet_mode(),
            api_base_url: None,
        }
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn present_secret(value: &Option<SecretString>) -> bool {
    value
        .as_ref()
        .is_some_and(|v| !v.expose_secret().trim().is_empty())
}

impl CardProviderConfig {
    /// Whether the API key and webhook secret are both set
    pub fn is_configured(&self) -> bool {
        present_secret(&self.api_key) && present_secret(&self.webhook_secret)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let api_key = self
            .api_key
            .as_ref()
            .map(|k| k.expose_secret().trim())
            .filter(|k| !k.is_empty())
            .ok_or(ValidationError::MissingRequired("STRIPE_SECRET_KEY"))?;
        let webhook_secret = self
            .webhook_secret
            .as_ref()
            .map(|k| k.expose_secret().trim())
            .filter(|k| !k.is_empty())
            .ok_or(ValidationError::MissingRequired("STRIPE_WEBHOOK_SECRET"))?;

        // Verify key prefixes for safety
        if !api_key.starts_with("sk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        if !webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }
        Ok(())
    }
}

impl WalletProviderConfig {
    /// Whether client id, client secret and webhook id are all set
    pub fn is_configured(&self) -> bool {
        present(&self.client_id) && present_secret(&self.client_secret) && present(&self.webhook_id)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !present(&self.client_id) {
            return Err(ValidationError::MissingRequired("PAYPAL_CLIENT_ID"));
        }
        if !present_secret(&self.client_secret) {
            return Err(ValidationError::MissingRequired("PAYPAL_CLIENT_SECRET"));
        }
        if !present(&self.webhook_id) {
            return Err(ValidationError::MissingRequired("PAYPAL_WEBHOOK_ID"));
        }
        self.validate_mode()
    }

    fn validate_mode(&self) -> Result<(), ValidationError> {
        match self.mode.trim().to_ascii_lowercase().as_str() {
            "sandbox" | "live" => Ok(()),
            _ => Err(ValidationError::InvalidPayPalMode(self.mode.clone())),
        }
    }
}

impl PaymentConfig {
    /// The configured default provider
    pub fn default_provider_kind(&self) -> Result<ProviderKind, ValidationError> {
        self.default_provider
            .parse()
            .map_err(|_| ValidationError::UnsupportedProvider(self.default_provider.clone()))
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// Whether credentials for `provider` are present
    pub fn is_configured(&self, provider: ProviderKind) -> bool {
        match provider {
            ProviderKind::Card => self.card.is_configured(),
            ProviderKind::Wallet => self.wallet.is_configured(),
        }
    }

    /// The shared secret webhook verification needs for `provider`
    pub fn webhook_secret(&self, provider: ProviderKind) -> Option<SecretString> {
        match provider {
            ProviderKind::Card => self.card.webhook_secret.clone(),
            ProviderKind::Wallet => self.wallet.webhook_id.clone().map(SecretString::new),
        }
        .filter(|s| !s.expose_secret().trim().is_empty())
    }

    /// Validate payment configuration
    ///
    /// The default provider must be fully configured. Other providers are
    /// checked only when some of their credentials are present.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.base_url.trim().is_empty() {
            return Err(ValidationError::MissingRequired("BASE_URL"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ValidationError::InvalidBaseUrl);
        }

        match self.default_provider_kind()? {
            ProviderKind::Card => self.card.validate()?,
            ProviderKind::Wallet => self.wallet.validate()?,
        }

        if self.card.api_key.is_some() || self.card.webhook_secret.is_some() {
            self.card.validate()?;
        }
        if self.wallet.client_id.is_some() || self.wallet.client_secret.is_some() {
            self.wallet.validate()?;
        }
        self.wallet.validate_mode()
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            base_url: String::new(),
            provider_timeout_secs: default_provider_timeout(),
            brand_name: default_brand_name(),
            trial_period_days: default_trial_period_days(),
            card: CardProviderConfig::default(),
            wallet: WalletProviderConfig::default(),
        }
    }
}

fn default_provider() -> String {
    "card".to_string()
}

fn default_provider_timeout() -> u64 {
    30
}

fn default_brand_name() -> String {
    "Billing Bridge".to_string()
}

fn default_trial_period_days() -> Option<u32> {
    Some(14)
}

fn default_wallet_mode() -> String {
    "sandbox".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(value: &str) -> Option<SecretString> {
        Some(SecretString::new(value.to_string()))
    }

    fn card_config() -> PaymentConfig {
        PaymentConfig {
            base_url: "https://billing.example.com".to_string(),
            card: CardProviderConfig {
                api_key: secret("sk_test_abcd1234"),
                webhook_secret: secret("whsec_xyz789"),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn wallet() -> WalletProviderConfig {
        WalletProviderConfig {
            client_id: Some("client".to_string()),
            client_secret: secret("secret"),
            webhook_id: Some("WH-1".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = PaymentConfig::default();
        assert_eq!(config.default_provider_kind().unwrap(), ProviderKind::Card);
        assert_eq!(config.trial_period_days, Some(14));
        assert_eq!(config.wallet.mode, "sandbox");
    }

    #[test]
    fn test_validation_valid_card_config() {
        assert!(card_config().validate().is_ok());
    }

    #[test]
    fn test_validation_missing_base_url() {
        let config = PaymentConfig {
            base_url: String::new(),
            ..card_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingRequired("BASE_URL"))
        ));
    }

    #[test]
    fn test_validation_base_url_scheme() {
        let config = PaymentConfig {
            base_url: "billing.example.com".to_string(),
            ..card_config()
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidBaseUrl)));
    }

    #[test]
    fn test_validation_unknown_default_provider() {
        let config = PaymentConfig {
            default_provider: "crypto".to_string(),
            ..card_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::UnsupportedProvider(_))
        ));
    }

    #[test]
    fn test_validation_missing_webhook_secret() {
        let mut config = card_config();
        config.card.webhook_secret = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_api_key_prefix() {
        let mut config = card_config();
        config.card.api_key = secret("pk_test_xxx");
        assert!(matches!(config.validate(), Err(ValidationError::InvalidStripeKey)));
    }

    #[test]
    fn test_validation_invalid_webhook_secret_prefix() {
        let mut config = card_config();
        config.card.webhook_secret = secret("secret_xxx");
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidStripeWebhookSecret)
        ));
    }

    #[test]
    fn test_wallet_default_requires_wallet_credentials() {
        let config = PaymentConfig {
            default_provider: "wallet".to_string(),
            ..card_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingRequired("PAYPAL_CLIENT_ID"))
        ));

        let config = PaymentConfig {
            default_provider: "paypal".to_string(),
            wallet: wallet(),
            ..card_config()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_wallet_mode() {
        let config = PaymentConfig {
            wallet: WalletProviderConfig {
                mode: "production".to_string(),
                ..wallet()
            },
            ..card_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidPayPalMode(_))
        ));
    }

    #[test]
    fn test_webhook_secret_per_provider() {
        let config = PaymentConfig {
            wallet: wallet(),
            ..card_config()
        };
        assert_eq!(
            config
                .webhook_secret(ProviderKind::Card)
                .map(|s| s.expose_secret().clone()),
            Some("whsec_xyz789".to_string())
        );
        assert_eq!(
            config
                .webhook_secret(ProviderKind::Wallet)
                .map(|s| s.expose_secret().clone()),
            Some("WH-1".to_string())
        );
        assert!(PaymentConfig::default()
            .webhook_secret(ProviderKind::Wallet)
            .is_none());
    }

    #[test]
    fn test_is_configured() {
        let config = card_config();
        assert!(config.is_configured(ProviderKind::Card));
        assert!(!config.is_configured(ProviderKind::Wallet));
    }
}
