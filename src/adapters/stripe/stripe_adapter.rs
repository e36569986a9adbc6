//! Stripe payment provider adapter.
//!
//! Implements `PaymentProvider` for the card processor: hosted checkout,
//! the billing portal (with lazily created portal configuration), catalog
//! reads and HMAC-verified webhooks.
//!
//! # Security
//!
//! - HMAC-SHA256 signature verification with constant-time comparison
//! - Timestamp validation (5-minute window) for replay attack prevention
//! - Secrets handled via `secrecy::SecretString`

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::billing::{
    constant_time_compare, timestamp_within_window, Account, AccountReference, Price, Product,
    ProviderKind, ReconcileOutcome, SubscriptionChange, SubscriptionStatus, WebhookError,
    WebhookEvent, WebhookHeaders,
};
use crate::domain::foundation::AccountId;
use crate::ports::{
    require_checkout_identity, CheckoutCompletion, PaymentError, PaymentProvider,
    SubscriptionSink,
};

use super::webhook_types::{
    SignatureHeader, StripeCheckoutSession, StripeErrorBody, StripeList,
    StripePortalConfiguration, StripePortalSession, StripePrice, StripeProduct,
    StripeSubscription, StripeWebhookEvent,
};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

const SUBSCRIPTION_EVENTS: [&str; 3] = [
    "customer.subscription.created",
    "customer.subscription.updated",
    "customer.subscription.deleted",
];

const CANCELLATION_REASONS: [&str; 5] = [
    "too_expensive",
    "missing_features",
    "switched_service",
    "unused",
    "other",
];

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Base URL for Stripe API (default: https://api.stripe.com).
    api_base_url: String,

    /// Public base URL of this application, used for return URLs.
    app_base_url: String,

    /// Trial granted on new subscriptions.
    trial_period_days: Option<u32>,

    /// Per-request timeout.
    timeout: Duration,

    /// Whether to reject test-mode events.
    require_livemode: bool,
}

impl StripeConfig {
    /// Create a new Stripe configuration.
    pub fn new(api_key: impl Into<String>, app_base_url: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            api_base_url: "https://api.stripe.com".to_string(),
            app_base_url: app_base_url.into().trim_end_matches('/').to_string(),
            trial_period_days: Some(14),
            timeout: Duration::from_secs(30),
            require_livemode: false,
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_trial_period_days(mut self, days: Option<u32>) -> Self {
        self.trial_period_days = days.filter(|d| *d > 0);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Require livemode events in production.
    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }
}

/// Stripe payment provider adapter.
pub struct StripePaymentAdapter {
    config: StripeConfig,
    http_client: reqwest::Client,
    sink: Arc<dyn SubscriptionSink>,
}

impl StripePaymentAdapter {
    /// Create a new Stripe adapter delivering changes to `sink`.
    pub fn new(config: StripeConfig, sink: Arc<dyn SubscriptionSink>) -> Result<Self, PaymentError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::not_configured(format!("HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            sink,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    /// Sends an authenticated request and decodes the JSON response.
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<T, PaymentError> {
        let response = request
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(operation, error = %e, "Stripe request failed");
                PaymentError::unavailable(format!("Stripe {} failed: {}", operation, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(operation, status, &body));
        }

        response.json::<T>().await.map_err(|e| {
            PaymentError::invalid_payload(format!(
                "Failed to parse Stripe {} response: {}",
                operation, e
            ))
        })
    }

    async fn fetch_product(&self, product_id: &str) -> Result<StripeProduct, PaymentError> {
        let request = self
            .http_client
            .get(self.url(&format!("/v1/products/{}", product_id)));
        self.send(request, "retrieve_product").await
    }

    async fn fetch_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<StripeSubscription, PaymentError> {
        let request = self
            .http_client
            .get(self.url(&format!("/v1/subscriptions/{}", subscription_id)))
            .query(&[("expand[]", "items.data.price.product")]);
        self.send(request, "retrieve_subscription").await
    }

    /// Plan name from an expanded product, or from a product lookup.
    async fn plan_name(&self, subscription: &StripeSubscription) -> Result<Option<String>, PaymentError> {
        let Some(product) = subscription.plan_product() else {
            return Ok(None);
        };
        if let Some(expanded) = product.object() {
            return Ok(Some(expanded.name.clone()));
        }
        Ok(Some(self.fetch_product(product.id()).await?.name))
    }

    /// Returns the portal configuration to use, creating one if the Stripe
    /// account has none yet.
    async fn portal_configuration(&self, account: &Account) -> Result<String, PaymentError> {
        let request = self
            .http_client
            .get(self.url("/v1/billing_portal/configurations"))
            .query(&[("limit", "1")]);
        let existing: StripeList<StripePortalConfiguration> =
            self.send(request, "list_portal_configurations").await?;
        if let Some(config) = existing.data.into_iter().next() {
            return Ok(config.id);
        }

        let product_id = card_product_id(account).ok_or_else(|| {
            PaymentError::no_billing_identity("Account has no product to configure a portal for")
        })?;

        let product = self.fetch_product(&product_id).await?;
        if !product.active {
            return Err(PaymentError::rejected(format!(
                "Product {} is not active",
                product_id
            )));
        }

        let request = self.http_client.get(self.url("/v1/prices")).query(&[
            ("product", product_id.as_str()),
            ("active", "true"),
            ("type", "recurring"),
        ]);
        let prices: StripeList<StripePrice> = self.send(request, "list_prices").await?;
        if prices.data.is_empty() {
            return Err(PaymentError::rejected(format!(
                "No active prices for product {}",
                product_id
            )));
        }

        let mut params: Vec<(String, String)> = vec![
            (
                "business_profile[headline]".into(),
                "Manage your subscription".into(),
            ),
            ("features[subscription_update][enabled]".into(), "true".into()),
            (
                "features[subscription_update][default_allowed_updates][0]".into(),
                "price".into(),
            ),
            (
                "features[subscription_update][default_allowed_updates][1]".into(),
                "promotion_code".into(),
            ),
            (
                "features[subscription_update][proration_behavior]".into(),
                "create_prorations".into(),
            ),
            (
                "features[subscription_update][products][0][product]".into(),
                product.id.clone(),
            ),
        ];
        for (i, price) in prices.data.iter().enumerate() {
            params.push((
                format!("features[subscription_update][products][0][prices][{}]", i),
                price.id.clone(),
            ));
        }
        params.extend([
            ("features[subscription_cancel][enabled]".into(), "true".into()),
            ("features[subscription_cancel][mode]".into(), "at_period_end".into()),
            (
                "features[subscription_cancel][cancellation_reason][enabled]".into(),
                "true".into(),
            ),
        ]);
        for (i, reason) in CANCELLATION_REASONS.iter().enumerate() {
            params.push((
                format!(
                    "features[subscription_cancel][cancellation_reason][options][{}]",
                    i
                ),
                (*reason).to_string(),
            ));
        }
        params.push(("features[payment_method_update][enabled]".into(), "true".into()));

        let request = self
            .http_client
            .post(self.url("/v1/billing_portal/configurations"))
            .form(&params);
        let created: StripePortalConfiguration =
            self.send(request, "create_portal_configuration").await?;

        tracing::info!(configuration_id = %created.id, "Created Stripe portal configuration");
        Ok(created.id)
    }

    /// Computes the v1 signature for a delivery.
    fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> Option<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Some(mac.finalize().into_bytes().to_vec())
    }
}

/// Maps a non-2xx Stripe response onto the error taxonomy.
fn api_error(operation: &str, status: reqwest::StatusCode, body: &str) -> PaymentError {
    let parsed = serde_json::from_str::<StripeErrorBody>(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|b| b.error.message.clone())
        .unwrap_or_else(|| body.to_string());

    tracing::error!(operation, status = %status, error = %message, "Stripe API error");

    let err = if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        PaymentError::unavailable(format!("Stripe {} failed: {}", operation, message))
    } else {
        PaymentError::rejected(format!("Stripe {} rejected: {}", operation, message))
    };

    match parsed.and_then(|b| b.error.code) {
        Some(code) => err.with_provider_code(code),
        None => err,
    }
}

/// The card product id on the account, generic view first.
fn card_product_id(account: &Account) -> Option<String> {
    let generic = (account.generic.provider == Some(ProviderKind::Card))
        .then(|| account.generic.product_id.clone())
        .flatten();
    generic
        .or_else(|| account.legacy_card.product_id.clone())
        .filter(|id| !id.is_empty())
}

fn timestamp_to_utc(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

#[async_trait]
impl PaymentProvider for StripePaymentAdapter {
    fn provider_name(&self) -> ProviderKind {
        ProviderKind::Card
    }

    async fn create_checkout_session(
        &self,
        account: Option<&Account>,
        price_id: &str,
        actor_id: Option<&str>,
    ) -> Result<String, PaymentError> {
        let (account, actor_id) = require_checkout_identity(account, actor_id)?;
        let base = &self.config.app_base_url;

        let mut params: Vec<(&str, String)> = vec![
            ("mode", "subscription".to_string()),
            ("line_items[0][price]", price_id.to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            (
                "success_url",
                format!(
                    "{}/api/checkout/card/return?session_id={{CHECKOUT_SESSION_ID}}",
                    base
                ),
            ),
            ("cancel_url", format!("{}/pricing", base)),
            ("client_reference_id", account.id.to_string()),
            ("metadata[account_id]", account.id.to_string()),
            ("metadata[actor_id]", actor_id.to_string()),
            ("subscription_data[metadata][account_id]", account.id.to_string()),
            ("allow_promotion_codes", "true".to_string()),
        ];
        if let Some(days) = self.config.trial_period_days {
            params.push(("subscription_data[trial_period_days]", days.to_string()));
        }
        match (account.customer_id_for(ProviderKind::Card), &account.billing_email) {
            (Some(customer), _) => params.push(("customer", customer.to_string())),
            (None, Some(email)) => params.push(("customer_email", email.clone())),
            (None, None) => {}
        }

        let request = self
            .http_client
            .post(self.url("/v1/checkout/sessions"))
            .form(&params);
        let session: StripeCheckoutSession = self.send(request, "create_checkout_session").await?;

        tracing::info!(
            account_id = %account.id,
            session_id = %session.id,
            "Created Stripe checkout session"
        );

        session
            .url
            .ok_or_else(|| PaymentError::rejected("Stripe returned a checkout session without a URL"))
    }

    async fn create_customer_portal_session(
        &self,
        account: &Account,
    ) -> Result<String, PaymentError> {
        let customer_id = account
            .customer_id_for(ProviderKind::Card)
            .ok_or_else(|| PaymentError::no_billing_identity("Account has no Stripe customer"))?
            .to_string();

        let configuration = self.portal_configuration(account).await?;

        let params = [
            ("customer", customer_id),
            ("return_url", format!("{}/dashboard", self.config.app_base_url)),
            ("configuration", configuration),
        ];
        let request = self
            .http_client
            .post(self.url("/v1/billing_portal/sessions"))
            .form(&params);
        let session: StripePortalSession = self.send(request, "create_portal_session").await?;

        Ok(session.url)
    }

    async fn get_products(&self) -> Result<Vec<Product>, PaymentError> {
        let request = self.http_client.get(self.url("/v1/products")).query(&[
            ("active", "true"),
            ("limit", "100"),
            ("expand[]", "data.default_price"),
        ]);
        let products: StripeList<StripeProduct> = self.send(request, "list_products").await?;

        Ok(products
            .data
            .into_iter()
            .map(|p| Product {
                default_price_id: p.default_price.as_ref().map(|d| d.id().to_string()),
                id: p.id,
                name: p.name,
                description: p.description,
            })
            .collect())
    }

    async fn get_prices(&self) -> Result<Vec<Price>, PaymentError> {
        let request = self.http_client.get(self.url("/v1/prices")).query(&[
            ("active", "true"),
            ("type", "recurring"),
            ("limit", "100"),
            ("expand[]", "data.product"),
        ]);
        let prices: StripeList<StripePrice> = self.send(request, "list_prices").await?;

        Ok(prices
            .data
            .into_iter()
            .map(|p| Price {
                product_id: p.product.id().to_string(),
                unit_amount: p.unit_amount.unwrap_or(0).max(0),
                currency: p.currency,
                interval: p.recurring.as_ref().map(|r| r.interval.clone()),
                trial_period_days: p.recurring.as_ref().and_then(|r| r.trial_period_days),
                id: p.id,
            })
            .collect())
    }

    async fn retrieve_checkout(&self, session_id: &str) -> Result<CheckoutCompletion, PaymentError> {
        let request = self
            .http_client
            .get(self.url(&format!("/v1/checkout/sessions/{}", session_id)))
            .query(&[("expand[]", "customer"), ("expand[]", "subscription")]);
        let session: StripeCheckoutSession = self.send(request, "retrieve_checkout_session").await?;

        let account_id: AccountId = session
            .client_reference_id
            .as_deref()
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| {
                PaymentError::invalid_account("Checkout session has no valid client_reference_id")
            })?;

        let subscription = match session.subscription {
            Some(sub) => match sub.object() {
                Some(expanded) if !expanded.items.data.is_empty() => expanded.clone(),
                _ => self.fetch_subscription(sub.id()).await?,
            },
            None => {
                return Err(PaymentError::rejected(
                    "Checkout session has no subscription",
                ))
            }
        };

        let plan_name = self.plan_name(&subscription).await?;
        let customer_id = session
            .customer
            .as_ref()
            .map(|c| c.id().to_string())
            .or_else(|| subscription.customer.clone());

        Ok(CheckoutCompletion {
            account_id,
            customer_id,
            product_id: subscription.plan_product().map(|p| p.id().to_string()),
            plan_name,
            status: SubscriptionStatus::from_native(&subscription.status),
            subscription_id: subscription.id,
        })
    }

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        headers: &WebhookHeaders,
        shared_secret: &str,
    ) -> bool {
        let Some(raw) = headers.get(SIGNATURE_HEADER) else {
            tracing::warn!("Missing Stripe-Signature header");
            return false;
        };
        let header = match SignatureHeader::parse(raw) {
            Ok(header) => header,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed Stripe-Signature header");
                return false;
            }
        };
        if !timestamp_within_window(header.timestamp, Utc::now().timestamp()) {
            return false;
        }
        let Some(expected) = Self::compute_signature(shared_secret, header.timestamp, payload) else {
            return false;
        };

        let valid = header
            .v1_signatures
            .iter()
            .any(|candidate| constant_time_compare(&expected, candidate));
        if !valid {
            tracing::warn!("Invalid Stripe webhook signature");
        }
        valid
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> Result<WebhookEvent, PaymentError> {
        let event: StripeWebhookEvent = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse Stripe webhook payload");
            PaymentError::invalid_payload(format!("Invalid JSON: {}", e))
        })?;

        if self.config.require_livemode && !event.livemode {
            tracing::warn!(event_id = %event.id, "Rejected test mode event");
            return Err(PaymentError::invalid_payload(
                "Test mode events not allowed",
            ));
        }

        Ok(WebhookEvent {
            occurred_at: timestamp_to_utc(event.created),
            id: event.id,
            event_type: event.event_type,
            data: event.data.object,
        })
    }

    async fn handle_webhook(&self, event: &WebhookEvent) -> Result<ReconcileOutcome, WebhookError> {
        if SUBSCRIPTION_EVENTS.contains(&event.event_type.as_str()) {
            return self
                .handle_subscription_change(&event.data, event.occurred_at)
                .await;
        }

        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Ignoring unhandled Stripe event type"
        );
        Ok(ReconcileOutcome::ignored(&event.event_type))
    }

    async fn handle_subscription_change(
        &self,
        raw: &Value,
        occurred_at: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, WebhookError> {
        let subscription: StripeSubscription = serde_json::from_value(raw.clone())
            .map_err(|e| WebhookError::ParseError(format!("Invalid subscription: {}", e)))?;

        let Some(customer_id) = subscription.customer.clone().filter(|c| !c.is_empty()) else {
            tracing::error!(
                subscription_id = %subscription.id,
                "Stripe subscription has no customer; dropping"
            );
            return Ok(ReconcileOutcome::dropped("subscription has no customer"));
        };

        let status = SubscriptionStatus::from_native(&subscription.status);
        let plan_name = if status.clears_identifiers() {
            None
        } else {
            match self.plan_name(&subscription).await {
                Ok(name) => name,
                Err(e) if e.retryable => {
                    return Err(WebhookError::ProviderUnavailable(e.to_string()));
                }
                Err(e) => {
                    tracing::warn!(
                        subscription_id = %subscription.id,
                        error = %e,
                        "Plan name lookup rejected; applying without it"
                    );
                    None
                }
            }
        };

        let change = SubscriptionChange {
            provider: ProviderKind::Card,
            account: AccountReference::CustomerId(customer_id.clone()),
            customer_id: Some(customer_id),
            product_id: subscription.plan_product().map(|p| p.id().to_string()),
            subscription_id: subscription.id,
            plan_name,
            status,
            occurred_at,
        };

        Ok(self.sink.apply(change).await?)
    }
}

/// Builds a valid `Stripe-Signature` header value (test fixtures).
#[cfg(test)]
pub(crate) fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let signature = StripePaymentAdapter::compute_signature(secret, timestamp, payload)
        .expect("HMAC accepts any key");
    format!("t={},v1={}", timestamp, hex::encode(signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::DomainError;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Mutex;

    const SECRET: &str = "whsec_test_secret";

    struct RecordingSink {
        changes: Mutex<Vec<SubscriptionChange>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                changes: Mutex::new(Vec::new()),
            })
        }

        fn changes(&self) -> Vec<SubscriptionChange> {
            self.changes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SubscriptionSink for RecordingSink {
        async fn apply(&self, change: SubscriptionChange) -> Result<ReconcileOutcome, DomainError> {
            self.changes.lock().unwrap().push(change);
            Ok(ReconcileOutcome::Applied {
                account_id: AccountId::new(),
            })
        }
    }

    fn adapter_with(sink: Arc<RecordingSink>) -> StripePaymentAdapter {
        // Unroutable base URL: any accidental HTTP call fails fast.
        let config = StripeConfig::new("sk_test_123", "https://app.example.com")
            .with_base_url("http://127.0.0.1:9")
            .with_timeout(Duration::from_millis(200));
        StripePaymentAdapter::new(config, sink).unwrap()
    }

    fn adapter() -> StripePaymentAdapter {
        adapter_with(RecordingSink::new())
    }

    fn signed_headers(payload: &[u8], timestamp: i64) -> WebhookHeaders {
        WebhookHeaders::new().with("Stripe-Signature", sign_payload(SECRET, timestamp, payload))
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Signature Verification
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn verify_accepts_valid_signature() {
        let payload = br#"{"id":"evt_1","type":"customer.subscription.updated"}"#;
        let headers = signed_headers(payload, Utc::now().timestamp());
        assert!(adapter().verify_webhook_signature(payload, &headers, SECRET));
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let payload = b"{}";
        let headers = signed_headers(payload, Utc::now().timestamp());
        assert!(!adapter().verify_webhook_signature(payload, &headers, "whsec_other"));
    }

    #[test]
    fn verify_rejects_missing_header() {
        assert!(!adapter().verify_webhook_signature(b"{}", &WebhookHeaders::new(), SECRET));
    }

    #[test]
    fn verify_rejects_malformed_header() {
        let headers = WebhookHeaders::new().with("stripe-signature", "garbage");
        assert!(!adapter().verify_webhook_signature(b"{}", &headers, SECRET));
    }

    #[test]
    fn verify_rejects_stale_timestamp() {
        let payload = b"{}";
        let headers = signed_headers(payload, Utc::now().timestamp() - 301);
        assert!(!adapter().verify_webhook_signature(payload, &headers, SECRET));
    }

    #[test]
    fn verify_rejects_future_timestamp() {
        let payload = b"{}";
        let headers = signed_headers(payload, Utc::now().timestamp() + 120);
        assert!(!adapter().verify_webhook_signature(payload, &headers, SECRET));
    }

    #[test]
    fn verify_accepts_any_matching_v1_during_secret_rotation() {
        let payload = b"{}";
        let now = Utc::now().timestamp();
        let valid = sign_payload(SECRET, now, payload);
        let valid_sig = valid.split_once("v1=").unwrap().1;
        let header = format!("t={},v1={},v1={}", now, "00".repeat(32), valid_sig);
        let headers = WebhookHeaders::new().with("stripe-signature", header);
        assert!(adapter().verify_webhook_signature(payload, &headers, SECRET));
    }

    proptest! {
        #[test]
        fn verify_rejects_any_single_byte_payload_mutation(
            index in 0usize..64,
            flip in 1u8..=255,
        ) {
            let payload = br#"{"id":"evt_123","type":"customer.subscription.deleted","x":1}"#.to_vec();
            let headers = signed_headers(&payload, Utc::now().timestamp());
            let mut mutated = payload.clone();
            let i = index % mutated.len();
            mutated[i] ^= flip;
            prop_assert!(!adapter().verify_webhook_signature(&mutated, &headers, SECRET));
        }

        #[test]
        fn verify_rejects_any_single_byte_signature_mutation(
            index in 0usize..32,
            flip in 1u8..=255,
        ) {
            let payload = b"{\"id\":\"evt_1\"}";
            let now = Utc::now().timestamp();
            let mut signature =
                StripePaymentAdapter::compute_signature(SECRET, now, payload).unwrap();
            signature[index] ^= flip;
            let header = format!("t={},v1={}", now, hex::encode(signature));
            let headers = WebhookHeaders::new().with("stripe-signature", header);
            prop_assert!(!adapter().verify_webhook_signature(payload, &headers, SECRET));
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Event Parsing and Dispatch
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn parse_event_extracts_object_and_time() {
        let payload = json!({
            "id": "evt_1",
            "type": "customer.subscription.updated",
            "created": 1704067200,
            "livemode": false,
            "data": {"object": {"id": "sub_1"}}
        })
        .to_string();

        let event = adapter().parse_webhook_event(payload.as_bytes()).unwrap();
        assert_eq!(event.id, "evt_1");
        assert_eq!(event.event_type, "customer.subscription.updated");
        assert_eq!(event.occurred_at.timestamp(), 1704067200);
        assert_eq!(event.data["id"], "sub_1");
    }

    #[test]
    fn parse_event_rejects_invalid_json() {
        let err = adapter().parse_webhook_event(b"not json").unwrap_err();
        assert_eq!(err.code, crate::ports::PaymentErrorCode::InvalidPayload);
    }

    #[tokio::test]
    async fn unhandled_event_type_is_ignored_without_applying() {
        let sink = RecordingSink::new();
        let adapter = adapter_with(sink.clone());
        let event = WebhookEvent {
            id: "evt_1".into(),
            event_type: "unhandled.event".into(),
            occurred_at: Utc::now(),
            data: json!({}),
        };

        let outcome = adapter.handle_webhook(&event).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::ignored("unhandled.event"));
        assert!(sink.changes().is_empty());
    }

    #[tokio::test]
    async fn deleted_subscription_normalizes_to_canceled_change() {
        let sink = RecordingSink::new();
        let adapter = adapter_with(sink.clone());
        let event = WebhookEvent {
            id: "evt_2".into(),
            event_type: "customer.subscription.deleted".into(),
            occurred_at: Utc::now(),
            data: json!({
                "id": "sub_1",
                "customer": "cus_1",
                "status": "canceled",
                "items": {"data": [{"price": {"id": "price_1", "product": "prod_1", "currency": "usd"}}]}
            }),
        };

        adapter.handle_webhook(&event).await.unwrap();
        let changes = sink.changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].account, AccountReference::CustomerId("cus_1".into()));
        assert_eq!(changes[0].status, SubscriptionStatus::Canceled);
        assert_eq!(changes[0].plan_name, None);
    }

    #[tokio::test]
    async fn active_subscription_uses_expanded_product_name() {
        let sink = RecordingSink::new();
        let adapter = adapter_with(sink.clone());
        let raw = json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "active",
            "items": {"data": [{"price": {
                "id": "price_1",
                "product": {"id": "prod_1", "name": "Pro", "active": true},
                "currency": "usd"
            }}]}
        });

        adapter.handle_subscription_change(&raw, Utc::now()).await.unwrap();
        let change = &sink.changes()[0];
        assert_eq!(change.product_id.as_deref(), Some("prod_1"));
        assert_eq!(change.plan_name.as_deref(), Some("Pro"));
        assert_eq!(change.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn unreachable_plan_name_lookup_is_retryable() {
        let sink = RecordingSink::new();
        let adapter = adapter_with(sink.clone());
        let raw = json!({
            "id": "sub_1", "customer": "cus_1", "status": "active",
            "items": {"data": [{"price": {"id": "price_1", "product": "prod_1", "currency": "usd"}}]}
        });

        let err = adapter
            .handle_subscription_change(&raw, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::ProviderUnavailable(_)));
        assert!(err.is_retryable());
        assert!(sink.changes().is_empty());
    }

    #[tokio::test]
    async fn rejected_plan_name_lookup_still_applies_change() {
        use axum::http::StatusCode;
        use axum::routing::get;

        let app = axum::Router::new().route(
            "/v1/products/:id",
            get(|| async {
                (
                    StatusCode::NOT_FOUND,
                    axum::Json(json!({"error": {"message": "No such product", "code": "resource_missing"}})),
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let sink = RecordingSink::new();
        let config = StripeConfig::new("sk_test_123", "https://app.example.com")
            .with_base_url(&base_url)
            .with_timeout(Duration::from_secs(5));
        let adapter = StripePaymentAdapter::new(config, sink.clone()).unwrap();
        let raw = json!({
            "id": "sub_1", "customer": "cus_1", "status": "active",
            "items": {"data": [{"price": {"id": "price_1", "product": "prod_gone", "currency": "usd"}}]}
        });

        adapter.handle_subscription_change(&raw, Utc::now()).await.unwrap();
        let change = &sink.changes()[0];
        assert_eq!(change.product_id.as_deref(), Some("prod_gone"));
        assert_eq!(change.plan_name, None);
    }

    #[tokio::test]
    async fn subscription_without_customer_is_dropped() {
        let sink = RecordingSink::new();
        let adapter = adapter_with(sink.clone());
        let raw = json!({"id": "sub_1", "status": "active"});

        let outcome = adapter.handle_subscription_change(&raw, Utc::now()).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Dropped { .. }));
        assert!(sink.changes().is_empty());
    }

    #[tokio::test]
    async fn malformed_subscription_is_a_parse_error() {
        let raw = json!({"customer": "cus_1"});
        let err = adapter()
            .handle_subscription_change(&raw, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::ParseError(_)));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Checkout and Portal Preconditions
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn checkout_without_account_is_invalid_account() {
        let err = adapter()
            .create_checkout_session(None, "price_1", Some("user-1"))
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::ports::PaymentErrorCode::InvalidAccount);
    }

    #[tokio::test]
    async fn portal_without_customer_is_no_billing_identity() {
        let err = adapter()
            .create_customer_portal_session(&Account::new("Acme"))
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::ports::PaymentErrorCode::NoBillingIdentity);
    }

    #[tokio::test]
    async fn unreachable_api_is_remote_unavailable() {
        let err = adapter().get_products().await.unwrap_err();
        assert_eq!(err.code, crate::ports::PaymentErrorCode::RemoteUnavailable);
    }

    #[test]
    fn api_error_maps_status_classes() {
        let body = r#"{"error":{"message":"No such price","code":"resource_missing"}}"#;
        let rejected = api_error("create", reqwest::StatusCode::BAD_REQUEST, body);
        assert_eq!(rejected.code, crate::ports::PaymentErrorCode::RemoteRejected);
        assert_eq!(rejected.provider_code.as_deref(), Some("resource_missing"));

        let unavailable = api_error("create", reqwest::StatusCode::BAD_GATEWAY, "");
        assert_eq!(unavailable.code, crate::ports::PaymentErrorCode::RemoteUnavailable);
    }

    #[test]
    fn card_product_prefers_generic_then_legacy() {
        let mut account = Account::new("Acme");
        assert_eq!(card_product_id(&account), None);
        account.legacy_card.product_id = Some("prod_legacy".into());
        assert_eq!(card_product_id(&account).as_deref(), Some("prod_legacy"));
        account.generic.provider = Some(ProviderKind::Card);
        account.generic.product_id = Some("prod_generic".into());
        assert_eq!(card_product_id(&account).as_deref(), Some("prod_generic"));
    }
}
