//! Scriptable provider doubles shared by application tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::domain::billing::{
    Account, AccountReference, Price, Product, ProviderKind, ReconcileOutcome,
    SubscriptionChange, SubscriptionStatus, WebhookError, WebhookEvent, WebhookHeaders,
};
use crate::domain::foundation::AccountId;
use crate::ports::{
    require_checkout_identity, CheckoutCompletion, PaymentError, PaymentProvider, ProviderFactory,
    SubscriptionSink,
};

/// Signature header the fake checks: it must equal the shared secret.
pub const FAKE_SIGNATURE_HEADER: &str = "x-fake-signature";

#[derive(Deserialize)]
struct FakeEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    data: Value,
}

#[derive(Deserialize)]
struct FakeSubscription {
    id: String,
    status: String,
    customer: Option<String>,
    account_id: Option<AccountId>,
    product: Option<String>,
}

/// In-process provider whose behavior tests can script.
pub struct FakeProvider {
    kind: ProviderKind,
    sink: Arc<dyn SubscriptionSink>,
    pub products: Mutex<Vec<Product>>,
    pub prices: Mutex<Vec<Price>>,
    pub completion: Mutex<Option<CheckoutCompletion>>,
    pub unavailable: AtomicBool,
    pub prepared: AtomicUsize,
    pub checkouts: AtomicUsize,
}

impl FakeProvider {
    pub fn new(kind: ProviderKind, sink: Arc<dyn SubscriptionSink>) -> Self {
        Self {
            kind,
            sink,
            products: Mutex::new(Vec::new()),
            prices: Mutex::new(Vec::new()),
            completion: Mutex::new(None),
            unavailable: AtomicBool::new(false),
            prepared: AtomicUsize::new(0),
            checkouts: AtomicUsize::new(0),
        }
    }

    fn check_available(&self) -> Result<(), PaymentError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PaymentError::unavailable("fake provider down"));
        }
        Ok(())
    }

    /// Raw body for a `subscription.changed` event.
    pub fn subscription_event(created: DateTime<Utc>, data: Value) -> Vec<u8> {
        serde_json::json!({
            "id": format!("evt_{}", created.timestamp()),
            "type": "subscription.changed",
            "created": created.timestamp(),
            "data": data,
        })
        .to_string()
        .into_bytes()
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    fn provider_name(&self) -> ProviderKind {
        self.kind
    }

    async fn create_checkout_session(
        &self,
        account: Option<&Account>,
        price_id: &str,
        actor_id: Option<&str>,
    ) -> Result<String, PaymentError> {
        let (account, _) = require_checkout_identity(account, actor_id)?;
        self.check_available()?;
        self.checkouts.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "https://{}.test/checkout/{}?account={}",
            self.kind, price_id, account.id
        ))
    }

    async fn create_customer_portal_session(
        &self,
        account: &Account,
    ) -> Result<String, PaymentError> {
        let customer = account
            .customer_id_for(self.kind)
            .ok_or_else(|| PaymentError::no_billing_identity("no customer"))?;
        self.check_available()?;
        Ok(format!("https://{}.test/portal/{}", self.kind, customer))
    }

    async fn get_products(&self) -> Result<Vec<Product>, PaymentError> {
        self.check_available()?;
        Ok(self.products.lock().unwrap().clone())
    }

    async fn get_prices(&self) -> Result<Vec<Price>, PaymentError> {
        self.check_available()?;
        Ok(self.prices.lock().unwrap().clone())
    }

    async fn retrieve_checkout(&self, _reference: &str) -> Result<CheckoutCompletion, PaymentError> {
        self.check_available()?;
        self.completion
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PaymentError::rejected("no such checkout"))
    }

    async fn prepare_webhook_verification(
        &self,
        _headers: &WebhookHeaders,
    ) -> Result<(), PaymentError> {
        self.prepared.fetch_add(1, Ordering::SeqCst);
        self.check_available()
    }

    fn verify_webhook_signature(
        &self,
        _payload: &[u8],
        headers: &WebhookHeaders,
        shared_secret: &str,
    ) -> bool {
        headers.get(FAKE_SIGNATURE_HEADER) == Some(shared_secret)
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> Result<WebhookEvent, PaymentError> {
        let envelope: FakeEnvelope = serde_json::from_slice(payload)
            .map_err(|e| PaymentError::invalid_payload(e.to_string()))?;
        Ok(WebhookEvent {
            id: envelope.id,
            event_type: envelope.event_type,
            occurred_at: Utc
                .timestamp_opt(envelope.created, 0)
                .single()
                .unwrap_or_else(Utc::now),
            data: envelope.data,
        })
    }

    async fn handle_webhook(&self, event: &WebhookEvent) -> Result<ReconcileOutcome, WebhookError> {
        if event.event_type == "subscription.changed" {
            return self
                .handle_subscription_change(&event.data, event.occurred_at)
                .await;
        }
        Ok(ReconcileOutcome::ignored(&event.event_type))
    }

    async fn handle_subscription_change(
        &self,
        raw: &Value,
        occurred_at: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, WebhookError> {
        let sub: FakeSubscription = serde_json::from_value(raw.clone())
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;
        let account = match (sub.account_id, sub.customer.clone()) {
            (Some(id), _) => AccountReference::AccountId(id),
            (None, Some(customer)) => AccountReference::CustomerId(customer),
            (None, None) => return Ok(ReconcileOutcome::dropped("no correlation id")),
        };
        let change = SubscriptionChange {
            provider: self.kind,
            account,
            customer_id: sub.customer,
            subscription_id: sub.id,
            plan_name: sub.product.as_ref().map(|p| format!("Plan {}", p)),
            product_id: sub.product,
            status: SubscriptionStatus::from_native(&sub.status),
            occurred_at,
        };
        Ok(self.sink.apply(change).await?)
    }
}

/// Factory handing out fakes and counting constructions.
pub struct FakeFactory {
    sink: Arc<dyn SubscriptionSink>,
    pub built: AtomicUsize,
    pub last_built: Mutex<Vec<Arc<FakeProvider>>>,
}

impl FakeFactory {
    pub fn new(sink: Arc<dyn SubscriptionSink>) -> Self {
        Self {
            sink,
            built: AtomicUsize::new(0),
            last_built: Mutex::new(Vec::new()),
        }
    }

    /// The most recent fake built for `kind`.
    pub fn fake(&self, kind: ProviderKind) -> Option<Arc<FakeProvider>> {
        self.last_built
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|p| p.kind == kind)
            .cloned()
    }
}

impl ProviderFactory for FakeFactory {
    fn create(&self, provider: ProviderKind) -> Result<Arc<dyn PaymentProvider>, PaymentError> {
        self.built.fetch_add(1, Ordering::SeqCst);
        let fake = Arc::new(FakeProvider::new(provider, self.sink.clone()));
        self.last_built.lock().unwrap().push(fake.clone());
        Ok(fake)
    }
}
