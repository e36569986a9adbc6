//! Canonical subscription status and the native-status normalization.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Provider-agnostic subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    Canceled,
    Suspended,
    Unpaid,
    Unknown,
}

impl SubscriptionStatus {
    /// Maps a provider-native status string onto the canonical set.
    ///
    /// Never fails: anything unmapped becomes `Unknown`.
    pub fn from_native(native: &str) -> Self {
        match native.trim().to_ascii_lowercase().as_str() {
            "active" => SubscriptionStatus::Active,
            "trialing" => SubscriptionStatus::Trialing,
            "canceled" | "cancelled" | "expired" | "incomplete_expired" => {
                SubscriptionStatus::Canceled
            }
            "suspended" | "paused" => SubscriptionStatus::Suspended,
            "unpaid" | "past_due" => SubscriptionStatus::Unpaid,
            _ => SubscriptionStatus::Unknown,
        }
    }

    /// Canonical lowercase name, as persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Suspended => "suspended",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Unknown => "unknown",
        }
    }

    /// Canceled, suspended and unpaid subscriptions lose their identifiers
    /// but keep the status value.
    pub fn clears_identifiers(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Canceled | SubscriptionStatus::Suspended | SubscriptionStatus::Unpaid
        )
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_native(s))
    }
}
