//! PayPal REST wire types.
//!
//! Only fields the adapter reads are declared; unknown fields are ignored.

use serde::{Deserialize, Serialize};

/// OAuth2 client-credentials token response.
#[derive(Debug, Clone, Deserialize)]
pub struct PayPalTokenResponse {
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

/// HATEOAS link on PayPal resources.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PayPalLink {
    pub href: String,
    pub rel: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PayPalSubscriber {
    pub email_address: Option<String>,
}

/// Billing subscription resource (also the `resource` of subscription webhooks).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PayPalSubscription {
    pub id: String,
    #[serde(default)]
    pub status: String,
    pub plan_id: Option<String>,
    /// Correlation id we set at checkout (our account id).
    pub custom_id: Option<String>,
    pub subscriber: Option<PayPalSubscriber>,
    #[serde(default)]
    pub links: Vec<PayPalLink>,
}

impl PayPalSubscription {
    /// The buyer approval URL returned on creation.
    pub fn approve_link(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|link| link.rel == "approve")
            .map(|link| link.href.as_str())
    }

    /// Customer identity: subscriber email, else the subscription id.
    pub fn customer_id(&self) -> String {
        self.subscriber
            .as_ref()
            .and_then(|s| s.email_address.clone())
            .filter(|email| !email.is_empty())
            .unwrap_or_else(|| self.id.clone())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PayPalProduct {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PayPalProductList {
    #[serde(default)]
    pub products: Vec<PayPalProduct>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PayPalMoney {
    pub value: String,
    pub currency_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PayPalFrequency {
    pub interval_unit: String,
    #[serde(default = "default_interval_count")]
    pub interval_count: u32,
}

fn default_interval_count() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PayPalPricingScheme {
    pub fixed_price: Option<PayPalMoney>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PayPalBillingCycle {
    /// REGULAR or TRIAL.
    pub tenure_type: String,
    pub frequency: PayPalFrequency,
    pub total_cycles: Option<u32>,
    pub pricing_scheme: Option<PayPalPricingScheme>,
}

impl PayPalFrequency {
    /// Length of one interval in days, for trial computation.
    pub fn days(&self) -> Option<u32> {
        let unit_days = match self.interval_unit.to_ascii_uppercase().as_str() {
            "DAY" => 1,
            "WEEK" => 7,
            "MONTH" => 30,
            "YEAR" => 365,
            _ => return None,
        };
        Some(unit_days * self.interval_count.max(1))
    }
}

/// Billing plan (a recurring price).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PayPalPlan {
    pub id: String,
    pub product_id: String,
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub billing_cycles: Vec<PayPalBillingCycle>,
}

impl PayPalPlan {
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("ACTIVE")
    }

    pub fn cycle(&self, tenure: &str) -> Option<&PayPalBillingCycle> {
        self.billing_cycles
            .iter()
            .find(|c| c.tenure_type.eq_ignore_ascii_case(tenure))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PayPalPlanList {
    #[serde(default)]
    pub plans: Vec<PayPalPlan>,
}

/// Webhook event envelope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PayPalWebhookEvent {
    pub id: String,
    pub event_type: String,
    pub create_time: Option<String>,
    pub resource: serde_json::Value,
}

/// Error body returned by the PayPal API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PayPalErrorBody {
    pub name: Option<String>,
    pub message: Option<String>,
    pub debug_id: Option<String>,
    /// OAuth endpoint errors use this shape instead.
    pub error_description: Option<String>,
}
