//! Stripe wire types: the signature header, the event envelope and the
//! API objects the adapter reads.
//!
//! Only the fields the adapter uses are declared; everything else in the
//! JSON is ignored so new Stripe fields never break parsing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ════════════════════════════════════════════════════════════════════════════════
// Signature Parsing
// ════════════════════════════════════════════════════════════════════════════════

/// Error parsing the Stripe-Signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureParseError {
    /// Header is empty or missing.
    MissingHeader,
    /// Missing timestamp component (t=...).
    MissingTimestamp,
    /// Missing v1 signature component.
    MissingV1Signature,
    /// Invalid timestamp format.
    InvalidTimestamp,
    /// Invalid signature format (not valid hex).
    InvalidSignatureFormat,
}

impl std::fmt::Display for SignatureParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingHeader => write!(f, "Missing Stripe-Signature header"),
            Self::MissingTimestamp => write!(f, "Missing timestamp (t=) in signature"),
            Self::MissingV1Signature => write!(f, "Missing v1 signature in header"),
            Self::InvalidTimestamp => write!(f, "Invalid timestamp format"),
            Self::InvalidSignatureFormat => write!(f, "Invalid signature format (not valid hex)"),
        }
    }
}

impl std::error::Error for SignatureParseError {}

/// Parsed Stripe-Signature header components.
///
/// The header format is `t=timestamp,v1=signature[,v1=signature...]`.
/// Stripe sends several `v1` entries while a signing secret is being rolled.
#[derive(Debug, Clone)]
pub struct SignatureHeader {
    /// Unix timestamp when Stripe signed the delivery.
    pub timestamp: i64,

    /// Every v1 signature (HMAC-SHA256, hex-decoded).
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parse a Stripe-Signature header into components.
    pub fn parse(header: &str) -> Result<Self, SignatureParseError> {
        if header.trim().is_empty() {
            return Err(SignatureParseError::MissingHeader);
        }

        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or(SignatureParseError::MissingTimestamp)?;

            match key.trim() {
                "t" => {
                    timestamp = Some(
                        value
                            .trim()
                            .parse()
                            .map_err(|_| SignatureParseError::InvalidTimestamp)?,
                    );
                }
                "v1" => {
                    let bytes = hex::decode(value.trim())
                        .map_err(|_| SignatureParseError::InvalidSignatureFormat)?;
                    v1_signatures.push(bytes);
                }
                // v0 and unknown schemes are ignored
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureParseError::MissingTimestamp)?;
        if v1_signatures.is_empty() {
            return Err(SignatureParseError::MissingV1Signature);
        }

        Ok(Self {
            timestamp,
            v1_signatures,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Event Envelope
// ════════════════════════════════════════════════════════════════════════════════

/// Stripe webhook event as received.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeWebhookEvent {
    /// Unique event identifier (evt_...).
    pub id: String,

    /// Event type (e.g., "customer.subscription.updated").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix timestamp when the event was created.
    pub created: i64,

    pub data: StripeEventData,

    #[serde(default)]
    pub livemode: bool,
}

/// Event data container.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    /// The object affected by this event.
    pub object: serde_json::Value,
}

// ════════════════════════════════════════════════════════════════════════════════
// API Objects
// ════════════════════════════════════════════════════════════════════════════════

/// A field Stripe returns either as an id or, when expanded, as an object.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Id(String),
    Object(Box<T>),
}

impl<T: HasId> Expandable<T> {
    pub fn id(&self) -> &str {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object(obj) => obj.id(),
        }
    }

    pub fn object(&self) -> Option<&T> {
        match self {
            Expandable::Id(_) => None,
            Expandable::Object(obj) => Some(obj),
        }
    }
}

/// Objects with a Stripe id.
pub trait HasId {
    fn id(&self) -> &str;
}

/// A paginated Stripe list.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeList<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,

    #[serde(default)]
    pub has_more: bool,
}

/// Stripe Product object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeProduct {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub active: bool,
    pub default_price: Option<Expandable<StripePrice>>,
}

/// Stripe Price object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripePrice {
    pub id: String,

    /// Product this price belongs to.
    pub product: Expandable<StripeProduct>,

    /// Unit amount in minor units.
    pub unit_amount: Option<i64>,

    pub currency: String,

    pub recurring: Option<StripePriceRecurring>,
}

/// Price recurring configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripePriceRecurring {
    /// Billing interval (day, week, month, year).
    pub interval: String,

    pub trial_period_days: Option<u32>,
}

/// Stripe Customer object (as expanded on checkout sessions).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCustomer {
    pub id: String,
    pub email: Option<String>,
}

/// Stripe Subscription object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeSubscription {
    /// Unique subscription identifier (sub_...).
    pub id: String,

    /// Customer id owning this subscription.
    pub customer: Option<String>,

    pub status: String,

    #[serde(default)]
    pub items: StripeSubscriptionItems,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Subscription items container.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripeSubscriptionItems {
    #[serde(default)]
    pub data: Vec<StripeSubscriptionItem>,
}

/// Single subscription item.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeSubscriptionItem {
    pub price: StripePrice,
}

impl StripeSubscription {
    /// The first item's product, which is the plan for single-item
    /// subscriptions created by checkout.
    pub fn plan_product(&self) -> Option<&Expandable<StripeProduct>> {
        self.items.data.first().map(|item| &item.price.product)
    }
}

/// Stripe Checkout Session object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCheckoutSession {
    /// Unique session identifier (cs_...).
    pub id: String,

    /// Hosted checkout URL (present while the session is open).
    pub url: Option<String>,

    /// Our account id, set when the session was created.
    pub client_reference_id: Option<String>,

    pub customer: Option<Expandable<StripeCustomer>>,

    pub subscription: Option<Expandable<StripeSubscription>>,
}

/// Stripe billing portal configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripePortalConfiguration {
    pub id: String,
}

/// Stripe billing portal session.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripePortalSession {
    pub id: String,
    pub url: String,
}

/// Error body returned by the Stripe API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeErrorBody {
    pub error: StripeApiError,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeApiError {
    pub message: Option<String>,
    pub code: Option<String>,
    #[serde(rename = "type")]
    pub error_type: Option<String>,
}

impl HasId for StripeProduct {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for StripePrice {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for StripeCustomer {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for StripeSubscription {
    fn id(&self) -> &str {
        &self.id
    }
}
