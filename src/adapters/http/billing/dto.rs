//! HTTP DTOs (Data Transfer Objects) for billing endpoints.
//!
//! These types define the JSON request/response structure for the billing API.
//! They serve as the boundary between HTTP and the application layer.

use serde::{Deserialize, Serialize};

use crate::application::MigrationOutcome;
use crate::domain::billing::MigrationOperation;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to start a hosted checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    /// Provider price to subscribe to.
    pub price_id: String,
    /// Provider to use; the configured default otherwise.
    #[serde(default)]
    pub provider: Option<String>,
}

/// Request to open the self-service portal.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PortalRequest {
    #[serde(default)]
    pub provider: Option<String>,
}

/// Query string of the checkout return redirect.
///
/// The card processor appends `session_id`. The wallet processor appends
/// `subscription_id`, `ba_token` and `token`; older approval flows send only
/// `token`, which then carries the subscription id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutReturnQuery {
    pub session_id: Option<String>,
    pub subscription_id: Option<String>,
    pub token: Option<String>,
}

impl CheckoutReturnQuery {
    /// Collects the known parameters from raw query pairs.
    ///
    /// Keeps the first usable value per key, so repeated parameters and
    /// unexpanded `{placeholder}` templates never shadow a real reference.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut query = Self::default();
        for (key, value) in pairs {
            let value = value.as_ref().trim();
            if value.is_empty() || (value.starts_with('{') && value.ends_with('}')) {
                continue;
            }
            let slot = match key.as_ref() {
                "session_id" => &mut query.session_id,
                "subscription_id" => &mut query.subscription_id,
                "token" => &mut query.token,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.to_string());
            }
        }
        query
    }

    /// The provider-issued reference, whichever parameter carried it.
    pub fn reference(&self) -> Option<&str> {
        [&self.session_id, &self.subscription_id, &self.token]
            .into_iter()
            .filter_map(|r| r.as_deref())
            .map(str::trim)
            .find(|r| !r.is_empty())
    }
}

/// Query string of the catalog listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogQuery {
    #[serde(default)]
    pub provider: Option<String>,
}

/// Request to run one payment-data migration pass.
#[derive(Debug, Clone, Deserialize)]
pub struct MigrationRequest {
    pub operation: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// A URL the client should navigate to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlResponse {
    pub url: String,
}

/// Result of a migration pass.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResponse {
    pub operation: MigrationOperation,
    /// False when validation found inconsistent accounts.
    pub passed: bool,
    pub report: MigrationOutcome,
}

/// Standard error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}
