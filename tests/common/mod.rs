//! Shared harness for the HTTP integration tests.
//!
//! Wires the real router, reconciler and provider adapters against an
//! in-memory account store. Both adapters talk to local stand-ins for the
//! processor APIs; the wallet adapter gets its signing certificate
//! preloaded so no certificate download happens.

#![allow(dead_code)]

use axum::body::Body;
use axum::extract::Path;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, EncodingKey};
use secrecy::SecretString;
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use billing_bridge::adapters::http::app_router;
use billing_bridge::adapters::http::billing::BillingAppState;
use billing_bridge::adapters::paypal::signed_message;
use billing_bridge::adapters::{
    InMemoryAccountStore, PayPalConfig, PayPalMode, PayPalPaymentAdapter, StripeConfig,
    StripePaymentAdapter,
};
use billing_bridge::application::{ProviderRegistry, SubscriptionApplier, WebhookReconciler};
use billing_bridge::domain::billing::ProviderKind;
use billing_bridge::ports::{PaymentError, PaymentProvider, ProviderFactory, SubscriptionSink};

pub const APP_BASE_URL: &str = "https://app.example.com";
pub const CARD_WEBHOOK_SECRET: &str = "whsec_integration";
pub const WALLET_WEBHOOK_ID: &str = "WH-INTEGRATION-1";
pub const WALLET_CERT_URL: &str =
    "https://api.paypal.com/v1/notifications/certs/CERT-integration";

const WALLET_CERT_PEM: &str = include_str!("../fixtures/wallet_signing_cert.pem");
const WALLET_KEY_PEM: &str = include_str!("../fixtures/wallet_signing_key.pem");

// =============================================================================
// Stripe API stand-in
// =============================================================================

/// Starts a local server answering the Stripe endpoints the adapter calls.
///
/// Checkout session ids are `cs_<account id>`; retrieving one reports that
/// account as the client reference.
pub async fn spawn_fake_stripe() -> String {
    let app = Router::new()
        .route(
            "/v1/products",
            get(|| async {
                Json(json!({
                    "data": [{"id": "prod_pro", "name": "Pro", "active": true, "default_price": "price_pro_monthly"}],
                    "has_more": false
                }))
            }),
        )
        .route(
            "/v1/products/:id",
            get(|Path(id): Path<String>| async move {
                Json(json!({"id": id, "name": "Pro", "active": true}))
            }),
        )
        .route(
            "/v1/prices",
            get(|| async {
                Json(json!({
                    "data": [
                        {"id": "price_pro_monthly", "product": "prod_pro", "unit_amount": 1900,
                         "currency": "usd", "recurring": {"interval": "month"}},
                        {"id": "price_orphan", "product": "prod_retired", "unit_amount": 500,
                         "currency": "usd", "recurring": {"interval": "month"}}
                    ],
                    "has_more": false
                }))
            }),
        )
        .route(
            "/v1/checkout/sessions",
            post(|| async {
                Json(json!({"id": "cs_new", "url": "https://checkout.stripe.test/pay/cs_new"}))
            }),
        )
        .route(
            "/v1/checkout/sessions/:id",
            get(|Path(id): Path<String>| async move {
                let account_id = id.trim_start_matches("cs_").to_string();
                Json(json!({
                    "id": id,
                    "client_reference_id": account_id,
                    "customer": {"id": "cus_checkout", "email": "payer@example.com"},
                    "subscription": subscription_object("sub_checkout", "cus_checkout", "active")
                }))
            }),
        )
        .route(
            "/v1/billing_portal/configurations",
            get(|| async { Json(json!({"data": [{"id": "bpc_default"}], "has_more": false})) }),
        )
        .route(
            "/v1/billing_portal/sessions",
            post(|| async {
                Json(json!({"id": "bps_1", "url": "https://billing.stripe.test/session/bps_1"}))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A Stripe subscription object with one item whose product is not expanded.
pub fn subscription_object(id: &str, customer: &str, status: &str) -> Value {
    json!({
        "id": id,
        "customer": customer,
        "status": status,
        "items": {"data": [{"price": {
            "id": "price_pro_monthly",
            "product": "prod_pro",
            "unit_amount": 1900,
            "currency": "usd",
            "recurring": {"interval": "month"}
        }}]}
    })
}

// =============================================================================
// PayPal API stand-in
// =============================================================================

/// Starts a local server answering the PayPal endpoints the adapter calls.
///
/// Subscription ids are `I-<account id>`; retrieving one reports that
/// account as the `custom_id`, on the `P-PRO` plan. Creating one echoes the
/// requested `return_url` back as the approval link.
pub async fn spawn_fake_paypal() -> String {
    let app = Router::new()
        .route(
            "/v1/oauth2/token",
            post(|| async { Json(json!({"access_token": "A21-integration", "expires_in": 3600})) }),
        )
        .route(
            "/v1/billing/subscriptions",
            post(|Json(body): Json<Value>| async move {
                let return_url = body["application_context"]["return_url"].clone();
                Json(json!({
                    "id": "I-NEW",
                    "status": "APPROVAL_PENDING",
                    "links": [{"href": return_url, "rel": "approve"}]
                }))
            }),
        )
        .route(
            "/v1/billing/subscriptions/:id",
            get(|Path(id): Path<String>| async move {
                let account_id = id.trim_start_matches("I-").to_string();
                Json(json!({
                    "id": id,
                    "status": "ACTIVE",
                    "plan_id": "P-PRO",
                    "custom_id": account_id,
                    "subscriber": {"email_address": "wallet-payer@example.com"}
                }))
            }),
        )
        .route(
            "/v1/billing/plans/:id",
            get(|Path(id): Path<String>| async move {
                Json(json!({
                    "id": id,
                    "product_id": "PROD-PRO",
                    "name": "Pro Wallet",
                    "status": "ACTIVE",
                    "billing_cycles": [{
                        "tenure_type": "REGULAR",
                        "frequency": {"interval_unit": "MONTH", "interval_count": 1},
                        "total_cycles": 0,
                        "pricing_scheme": {"fixed_price": {"value": "19.00", "currency_code": "USD"}}
                    }]
                }))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

// =============================================================================
// Application wiring
// =============================================================================

/// Builds the real adapters, preloading the wallet signing certificate.
struct IntegrationFactory {
    stripe_base_url: String,
    paypal_base_url: String,
    sink: Arc<dyn SubscriptionSink>,
}

impl ProviderFactory for IntegrationFactory {
    fn create(&self, provider: ProviderKind) -> Result<Arc<dyn PaymentProvider>, PaymentError> {
        match provider {
            ProviderKind::Card => {
                let config = StripeConfig::new("sk_test_integration", APP_BASE_URL)
                    .with_base_url(&self.stripe_base_url)
                    .with_timeout(Duration::from_secs(5));
                Ok(Arc::new(StripePaymentAdapter::new(config, self.sink.clone())?))
            }
            ProviderKind::Wallet => {
                let config = PayPalConfig::new("client", "secret", PayPalMode::Sandbox, APP_BASE_URL)
                    .with_base_url(&self.paypal_base_url)
                    .with_timeout(Duration::from_secs(5));
                let adapter = PayPalPaymentAdapter::new(config, self.sink.clone())?;
                adapter.preload_certificate(WALLET_CERT_URL, WALLET_CERT_PEM.as_bytes())?;
                Ok(Arc::new(adapter))
            }
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryAccountStore>,
}

impl TestApp {
    pub async fn start() -> Self {
        let stripe_base_url = spawn_fake_stripe().await;
        let paypal_base_url = spawn_fake_paypal().await;
        let store = Arc::new(InMemoryAccountStore::new());
        let sink: Arc<dyn SubscriptionSink> = Arc::new(SubscriptionApplier::new(store.clone()));

        let registry = Arc::new(ProviderRegistry::new(
            Arc::new(IntegrationFactory {
                stripe_base_url,
                paypal_base_url,
                sink: sink.clone(),
            }),
            ProviderKind::Card,
        ));
        let reconciler = WebhookReconciler::new(registry.clone())
            .with_secret(
                ProviderKind::Card,
                SecretString::new(CARD_WEBHOOK_SECRET.to_string()),
            )
            .with_secret(
                ProviderKind::Wallet,
                SecretString::new(WALLET_WEBHOOK_ID.to_string()),
            );

        let state = BillingAppState {
            registry,
            store: store.clone(),
            sink,
            reconciler: Arc::new(reconciler),
            base_url: APP_BASE_URL.to_string(),
        };

        Self {
            router: app_router(state, Duration::from_secs(10)),
            store,
        }
    }

    /// Sends one request and returns the status and (possibly empty) body.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Option<Value>, Option<String>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let location = response
            .headers()
            .get(axum::http::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).ok();
        (status, body, location)
    }
}

// =============================================================================
// Signed deliveries
// =============================================================================

/// A card event envelope wrapping `object`.
pub fn card_event(event_type: &str, created: DateTime<Utc>, object: Value) -> Vec<u8> {
    json!({
        "id": format!("evt_{}", created.timestamp_nanos_opt().unwrap_or_default()),
        "type": event_type,
        "created": created.timestamp(),
        "livemode": false,
        "data": {"object": object}
    })
    .to_string()
    .into_bytes()
}

/// `Stripe-Signature` value for `payload` signed now with `secret`.
pub fn card_signature(secret: &str, payload: &[u8]) -> String {
    let timestamp = Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

pub fn card_webhook_request(payload: Vec<u8>, signature: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/webhooks/card")
        .header("content-type", "application/json")
        .header("stripe-signature", signature)
        .body(Body::from(payload))
        .unwrap()
}

/// A wallet event envelope wrapping `resource`.
pub fn wallet_event(event_type: &str, created: DateTime<Utc>, resource: Value) -> Vec<u8> {
    json!({
        "id": "WH-EVT-1",
        "event_type": event_type,
        "create_time": created.to_rfc3339(),
        "resource": resource
    })
    .to_string()
    .into_bytes()
}

/// A wallet delivery signed with the fixture key, sent to `path`.
pub fn wallet_webhook_request(path: &str, payload: Vec<u8>) -> Request<Body> {
    let transmission_id = "5f9a3b10-1c2d-11ee-be56-0242ac120002";
    let transmission_time = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let message = signed_message(transmission_id, &transmission_time, WALLET_WEBHOOK_ID, &payload);
    let key = EncodingKey::from_rsa_pem(WALLET_KEY_PEM.as_bytes()).unwrap();
    let signature = jsonwebtoken::crypto::sign(message.as_bytes(), &key, Algorithm::RS256).unwrap();
    let signature = STANDARD.encode(URL_SAFE_NO_PAD.decode(signature).unwrap());

    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .header("paypal-transmission-id", transmission_id)
        .header("paypal-transmission-time", transmission_time)
        .header("paypal-transmission-sig", signature)
        .header("paypal-cert-url", WALLET_CERT_URL)
        .header("paypal-auth-algo", "SHA256withRSA")
        .body(Body::from(payload))
        .unwrap()
}
