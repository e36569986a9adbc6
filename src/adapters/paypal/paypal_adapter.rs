//! PayPal payment provider adapter.
//!
//! Implements `PaymentProvider` for the wallet processor: subscription
//! checkout through the approval link, a local billing page in place of a
//! hosted portal, plan/product catalog reads and certificate-verified
//! webhooks.
//!
//! # Security
//!
//! - SHA256withRSA transmission signatures checked against cached certificates
//! - Certificates only fetched from https `paypal.com` hosts
//! - Client credentials and access tokens held as `secrecy::SecretString`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::domain::billing::{
    Account, AccountReference, Price, Product, ProviderKind, ReconcileOutcome,
    SubscriptionChange, SubscriptionStatus, WebhookError, WebhookEvent, WebhookHeaders,
};
use crate::domain::foundation::AccountId;
use crate::ports::{
    require_checkout_identity, CheckoutCompletion, PaymentError, PaymentProvider,
    SubscriptionSink,
};

use super::api_types::{
    PayPalErrorBody, PayPalPlan, PayPalPlanList, PayPalProductList, PayPalSubscription,
    PayPalTokenResponse, PayPalWebhookEvent,
};
use super::signature::{is_trusted_cert_url, CertificateCache, TransmissionHeaders};

const LIVE_BASE_URL: &str = "https://api-m.paypal.com";
const SANDBOX_BASE_URL: &str = "https://api-m.sandbox.paypal.com";

/// Tokens are refreshed this long before PayPal expires them.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

const SUBSCRIPTION_EVENTS: [&str; 7] = [
    "BILLING.SUBSCRIPTION.ACTIVATED",
    "BILLING.SUBSCRIPTION.UPDATED",
    "BILLING.SUBSCRIPTION.RE-ACTIVATED",
    "BILLING.SUBSCRIPTION.CANCELLED",
    "BILLING.SUBSCRIPTION.SUSPENDED",
    "BILLING.SUBSCRIPTION.EXPIRED",
    "BILLING.SUBSCRIPTION.PAYMENT.FAILED",
];

/// Which PayPal environment to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayPalMode {
    Sandbox,
    Live,
}

impl PayPalMode {
    /// Parses `sandbox` / `live`. Anything else is `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Some(Self::Sandbox),
            "live" => Some(Self::Live),
            _ => None,
        }
    }

    pub fn base_url(self) -> &'static str {
        match self {
            Self::Sandbox => SANDBOX_BASE_URL,
            Self::Live => LIVE_BASE_URL,
        }
    }
}

/// PayPal API configuration.
#[derive(Clone)]
pub struct PayPalConfig {
    client_id: String,
    client_secret: SecretString,
    api_base_url: String,
    /// Public base URL of this application.
    app_base_url: String,
    /// Shown on the PayPal approval page.
    brand_name: String,
    timeout: Duration,
}

impl PayPalConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        mode: PayPalMode,
        app_base_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
            api_base_url: mode.base_url().to_string(),
            app_base_url: app_base_url.into().trim_end_matches('/').to_string(),
            brand_name: "Billing".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_brand_name(mut self, brand_name: impl Into<String>) -> Self {
        self.brand_name = brand_name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

struct CachedToken {
    value: SecretString,
    refresh_at: Instant,
}

/// PayPal payment provider adapter.
pub struct PayPalPaymentAdapter {
    config: PayPalConfig,
    http_client: reqwest::Client,
    sink: Arc<dyn SubscriptionSink>,
    token: Mutex<Option<CachedToken>>,
    certificates: CertificateCache,
}

impl PayPalPaymentAdapter {
    /// Create a new PayPal adapter delivering changes to `sink`.
    pub fn new(config: PayPalConfig, sink: Arc<dyn SubscriptionSink>) -> Result<Self, PaymentError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::not_configured(format!("HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            sink,
            token: Mutex::new(None),
            certificates: CertificateCache::new(),
        })
    }

    /// Seeds the certificate cache without a network fetch.
    pub fn preload_certificate(&self, cert_url: &str, pem: &[u8]) -> Result<(), PaymentError> {
        self.certificates
            .insert_pem(cert_url, pem)
            .map_err(|e| PaymentError::invalid_payload(format!("Invalid certificate: {}", e)))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    /// Returns a cached access token, fetching a new one when close to expiry.
    async fn access_token(&self) -> Result<SecretString, PaymentError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .http_client
            .post(self.url("/v1/oauth2/token"))
            .basic_auth(&self.config.client_id, Some(self.config.client_secret.expose_secret()))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "PayPal token request failed");
                PaymentError::unavailable(format!("PayPal token request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error("oauth_token", status, &body));
        }

        let token: PayPalTokenResponse = response.json().await.map_err(|e| {
            PaymentError::invalid_payload(format!("Failed to parse PayPal token response: {}", e))
        })?;

        let lifetime = Duration::from_secs(token.expires_in.max(0) as u64);
        let value = SecretString::new(token.access_token);
        *cached = Some(CachedToken {
            value: value.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN),
        });

        tracing::debug!(expires_in = token.expires_in, "Fetched PayPal access token");
        Ok(value)
    }

    /// Sends a bearer-authenticated request and decodes the JSON response.
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<T, PaymentError> {
        let token = self.access_token().await?;
        let response = request
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(operation, error = %e, "PayPal request failed");
                PaymentError::unavailable(format!("PayPal {} failed: {}", operation, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(operation, status, &body));
        }

        response.json::<T>().await.map_err(|e| {
            PaymentError::invalid_payload(format!(
                "Failed to parse PayPal {} response: {}",
                operation, e
            ))
        })
    }

    async fn fetch_plan(&self, plan_id: &str) -> Result<PayPalPlan, PaymentError> {
        let request = self
            .http_client
            .get(self.url(&format!("/v1/billing/plans/{}", plan_id)));
        self.send(request, "retrieve_plan").await
    }

    async fn fetch_subscription(&self, subscription_id: &str) -> Result<PayPalSubscription, PaymentError> {
        let request = self
            .http_client
            .get(self.url(&format!("/v1/billing/subscriptions/{}", subscription_id)));
        self.send(request, "retrieve_subscription").await
    }

    /// Downloads and caches the signing certificate for a delivery.
    async fn fetch_certificate(&self, cert_url: &str) -> Result<(), PaymentError> {
        let response = self.http_client.get(cert_url).send().await.map_err(|e| {
            tracing::error!(cert_url, error = %e, "PayPal certificate fetch failed");
            PaymentError::unavailable(format!("Certificate fetch failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error("fetch_certificate", status, &body));
        }

        let pem = response
            .bytes()
            .await
            .map_err(|e| PaymentError::unavailable(format!("Certificate read failed: {}", e)))?;
        self.preload_certificate(cert_url, &pem)?;

        tracing::info!(cert_url, "Cached PayPal signing certificate");
        Ok(())
    }
}

/// Maps a non-2xx PayPal response onto the error taxonomy.
fn api_error(operation: &str, status: reqwest::StatusCode, body: &str) -> PaymentError {
    let parsed = serde_json::from_str::<PayPalErrorBody>(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|b| b.message.clone().or_else(|| b.error_description.clone()))
        .unwrap_or_else(|| body.to_string());

    tracing::error!(operation, status = %status, error = %message, "PayPal API error");

    let err = if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        PaymentError::unavailable(format!("PayPal {} failed: {}", operation, message))
    } else {
        PaymentError::rejected(format!("PayPal {} rejected: {}", operation, message))
    };

    match parsed.and_then(|b| b.name) {
        Some(name) => err.with_provider_code(name),
        None => err,
    }
}

/// Normalizes a plan into a price. Plans without a priced REGULAR cycle
/// are skipped.
fn plan_to_price(plan: &PayPalPlan) -> Option<Price> {
    let regular = plan.cycle("REGULAR")?;
    let fixed = regular.pricing_scheme.as_ref()?.fixed_price.as_ref()?;
    let unit_amount = Price::minor_units_from_decimal(&fixed.value)?;

    let trial_period_days = plan.cycle("TRIAL").and_then(|trial| {
        let per_cycle = trial.frequency.days()?;
        let cycles = trial.total_cycles.unwrap_or(1).max(1);
        Some(per_cycle * cycles)
    });

    Some(Price {
        id: plan.id.clone(),
        product_id: plan.product_id.clone(),
        unit_amount,
        currency: fixed
            .currency_code
            .clone()
            .unwrap_or_else(|| "USD".to_string()),
        interval: Some(regular.frequency.interval_unit.to_ascii_lowercase()),
        trial_period_days,
    })
}

fn parse_account_id(custom_id: Option<&str>) -> Option<AccountId> {
    custom_id.and_then(|id| id.parse().ok())
}

#[async_trait]
impl PaymentProvider for PayPalPaymentAdapter {
    fn provider_name(&self) -> ProviderKind {
        ProviderKind::Wallet
    }

    async fn create_checkout_session(
        &self,
        account: Option<&Account>,
        price_id: &str,
        actor_id: Option<&str>,
    ) -> Result<String, PaymentError> {
        let (account, _actor_id) = require_checkout_identity(account, actor_id)?;
        let base = &self.config.app_base_url;

        let mut body = json!({
            "plan_id": price_id,
            "custom_id": account.id.to_string(),
            "application_context": {
                "brand_name": self.config.brand_name,
                "locale": "en-US",
                "shipping_preference": "NO_SHIPPING",
                "user_action": "SUBSCRIBE_NOW",
                "return_url": format!("{}/api/checkout/wallet/return", base),
                "cancel_url": format!("{}/pricing", base),
            }
        });
        if let Some(email) = &account.billing_email {
            body["subscriber"] = json!({ "email_address": email });
        }

        let request = self
            .http_client
            .post(self.url("/v1/billing/subscriptions"))
            .header("PayPal-Request-Id", uuid::Uuid::new_v4().to_string())
            .json(&body);
        let subscription: PayPalSubscription = self.send(request, "create_subscription").await?;

        tracing::info!(
            account_id = %account.id,
            subscription_id = %subscription.id,
            "Created PayPal subscription"
        );

        subscription
            .approve_link()
            .map(str::to_string)
            .ok_or_else(|| PaymentError::rejected("PayPal returned no approval link"))
    }

    async fn create_customer_portal_session(
        &self,
        account: &Account,
    ) -> Result<String, PaymentError> {
        let customer_id = account
            .customer_id_for(ProviderKind::Wallet)
            .ok_or_else(|| PaymentError::no_billing_identity("Account has no PayPal customer"))?;

        let url = reqwest::Url::parse_with_params(
            &format!("{}/dashboard/billing", self.config.app_base_url),
            &[("provider", "wallet"), ("customerId", customer_id)],
        )
        .map_err(|e| PaymentError::not_configured(format!("Invalid base URL: {}", e)))?;

        Ok(url.to_string())
    }

    async fn get_products(&self) -> Result<Vec<Product>, PaymentError> {
        let request = self
            .http_client
            .get(self.url("/v1/catalogs/products"))
            .query(&[("page_size", "20"), ("total_required", "false")]);
        let list: PayPalProductList = self.send(request, "list_products").await?;

        Ok(list
            .products
            .into_iter()
            .map(|p| Product {
                id: p.id,
                name: p.name,
                description: p.description,
                default_price_id: None,
            })
            .collect())
    }

    async fn get_prices(&self) -> Result<Vec<Price>, PaymentError> {
        let request = self
            .http_client
            .get(self.url("/v1/billing/plans"))
            .query(&[("page_size", "20"), ("total_required", "false")]);
        let list: PayPalPlanList = self.send(request, "list_plans").await?;

        let mut prices = Vec::new();
        for plan in list.plans.into_iter().filter(|p| p.is_active()) {
            // The list endpoint omits billing cycles.
            let plan = if plan.billing_cycles.is_empty() {
                self.fetch_plan(&plan.id).await?
            } else {
                plan
            };
            match plan_to_price(&plan) {
                Some(price) => prices.push(price),
                None => tracing::warn!(plan_id = %plan.id, "PayPal plan has no regular price"),
            }
        }
        Ok(prices)
    }

    async fn retrieve_checkout(
        &self,
        subscription_id: &str,
    ) -> Result<CheckoutCompletion, PaymentError> {
        let subscription = self.fetch_subscription(subscription_id).await?;

        let account_id = parse_account_id(subscription.custom_id.as_deref()).ok_or_else(|| {
            PaymentError::invalid_account("PayPal subscription has no valid custom_id")
        })?;

        let status = SubscriptionStatus::from_native(&subscription.status);
        let plan = match (&subscription.plan_id, status.clears_identifiers()) {
            (Some(plan_id), false) => Some(self.fetch_plan(plan_id).await?),
            _ => None,
        };

        Ok(CheckoutCompletion {
            account_id,
            customer_id: Some(subscription.customer_id()),
            product_id: plan.as_ref().map(|p| p.product_id.clone()),
            plan_name: plan.map(|p| p.name),
            status,
            subscription_id: subscription.id,
        })
    }

    async fn prepare_webhook_verification(
        &self,
        headers: &WebhookHeaders,
    ) -> Result<(), PaymentError> {
        // Incomplete or untrusted headers fail later in verification.
        let Some(transmission) = TransmissionHeaders::from_headers(headers) else {
            return Ok(());
        };
        if !is_trusted_cert_url(transmission.cert_url)
            || self.certificates.contains(transmission.cert_url)
        {
            return Ok(());
        }
        self.fetch_certificate(transmission.cert_url).await
    }

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        headers: &WebhookHeaders,
        webhook_id: &str,
    ) -> bool {
        let valid = self
            .certificates
            .verify(payload, headers, webhook_id, Utc::now());
        if !valid {
            tracing::warn!("Invalid PayPal webhook signature");
        }
        valid
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> Result<WebhookEvent, PaymentError> {
        let event: PayPalWebhookEvent = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse PayPal webhook payload");
            PaymentError::invalid_payload(format!("Invalid JSON: {}", e))
        })?;

        let occurred_at = event
            .create_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(WebhookEvent {
            id: event.id,
            event_type: event.event_type,
            occurred_at,
            data: event.resource,
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
            "Ignoring unhandled PayPal event type"
        );
        Ok(ReconcileOutcome::ignored(&event.event_type))
    }

    async fn handle_subscription_change(
        &self,
        raw: &Value,
        occurred_at: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, WebhookError> {
        let subscription: PayPalSubscription = serde_json::from_value(raw.clone())
            .map_err(|e| WebhookError::ParseError(format!("Invalid subscription: {}", e)))?;

        let Some(account_id) = parse_account_id(subscription.custom_id.as_deref()) else {
            tracing::error!(
                subscription_id = %subscription.id,
                "PayPal subscription has no account correlation id; dropping"
            );
            return Ok(ReconcileOutcome::dropped("subscription has no custom_id"));
        };

        let status = SubscriptionStatus::from_native(&subscription.status);
        let plan = match (&subscription.plan_id, status.clears_identifiers()) {
            (Some(plan_id), false) => match self.fetch_plan(plan_id).await {
                Ok(plan) => Some(plan),
                Err(e) if e.retryable => return Err(e.into()),
                Err(e) => {
                    tracing::error!(
                        subscription_id = %subscription.id,
                        plan_id = %plan_id,
                        error = %e,
                        "PayPal plan lookup rejected; dropping"
                    );
                    return Ok(ReconcileOutcome::dropped(format!("plan {} not found", plan_id)));
                }
            },
            _ => None,
        };

        let change = SubscriptionChange {
            provider: ProviderKind::Wallet,
            account: AccountReference::AccountId(account_id),
            customer_id: Some(subscription.customer_id()),
            product_id: plan.as_ref().map(|p| p.product_id.clone()),
            plan_name: plan.map(|p| p.name),
            subscription_id: subscription.id,
            status,
            occurred_at,
        };

        Ok(self.sink.apply(change).await?)
    }
}
