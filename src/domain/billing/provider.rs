//! The closed set of supported payment providers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A supported external subscription-billing service.
///
/// New providers are added as variants here; call sites match exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Card-based processor (Stripe-compatible API).
    Card,
    /// Wallet-based processor (PayPal-compatible API).
    Wallet,
}

/// Returned when a provider name is not in the supported set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported payment provider: {0}")]
pub struct UnknownProvider(pub String);

impl ProviderKind {
    /// Every supported provider, in registry order.
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Card, ProviderKind::Wallet];

    /// Canonical name stored in `payment_provider` columns and used in routes.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Card => "card",
            ProviderKind::Wallet => "wallet",
        }
    }

    /// Pure membership check against the supported names.
    pub fn is_supported(name: &str) -> bool {
        name.parse::<ProviderKind>().is_ok()
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    /// Accepts the canonical names plus the vendor aliases older
    /// deployments used in `DEFAULT_PAYMENT_PROVIDER`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "card" | "stripe" => Ok(ProviderKind::Card),
            "wallet" | "paypal" => Ok(ProviderKind::Wallet),
            _ => Err(UnknownProvider(s.to_string())),
        }
    }
}
