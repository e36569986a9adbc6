//! Integration tests for the checkout, portal and catalog endpoints.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;

use billing_bridge::domain::billing::{
    Account, GenericFields, LegacyCardFields, ProviderKind, SubscriptionStatus,
};

use common::TestApp;

fn post_json(uri: &str, account: Option<&Account>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(account) = account {
        builder = builder
            .header("x-account-id", account.id.to_string())
            .header("x-user-id", "user_1");
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn checkout_returns_hosted_page_for_known_account() {
    let app = TestApp::start().await;
    let account = Account::new("Acme").with_billing_email("owner@acme.test");
    app.store.insert(account.clone()).unwrap();

    let (status, body, _) = app
        .send(post_json(
            "/api/checkout",
            Some(&account),
            json!({"price_id": "price_pro_monthly"}),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["url"], "https://checkout.stripe.test/pay/cs_new");
}

#[tokio::test]
async fn anonymous_checkout_is_sent_to_sign_up_with_price() {
    let app = TestApp::start().await;

    let (status, body, _) = app
        .send(post_json(
            "/api/checkout",
            None,
            json!({"price_id": "price_pro_monthly"}),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body.unwrap()["url"],
        "https://app.example.com/sign-up?redirect=checkout&priceId=price_pro_monthly"
    );
}

#[tokio::test]
async fn checkout_requires_price_id() {
    let app = TestApp::start().await;
    let (status, body, _) = app
        .send(post_json("/api/checkout", None, json!({"price_id": "  "})))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["code"], "bad_request");
}

#[tokio::test]
async fn checkout_with_unknown_provider_is_not_found() {
    let app = TestApp::start().await;
    let (status, body, _) = app
        .send(post_json(
            "/api/checkout",
            None,
            json!({"price_id": "price_1", "provider": "crypto"}),
        ))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body.unwrap()["code"], "unsupported_provider");
}

#[tokio::test]
async fn portal_for_card_customer_returns_session_url() {
    let app = TestApp::start().await;
    let account = Account::new("Acme").with_legacy_card(LegacyCardFields {
        customer_id: Some("cus_A".to_string()),
        subscription_id: Some("sub_1".to_string()),
        product_id: Some("prod_pro".to_string()),
    });
    app.store.insert(account.clone()).unwrap();

    let (status, body, _) = app
        .send(post_json("/api/billing/portal", Some(&account), json!({})))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["url"], "https://billing.stripe.test/session/bps_1");
}

#[tokio::test]
async fn portal_without_billing_identity_points_to_pricing() {
    let app = TestApp::start().await;
    let account = Account::new("New Co");
    app.store.insert(account.clone()).unwrap();

    let (status, body, _) = app
        .send(post_json("/api/billing/portal", Some(&account), json!({})))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["url"], "https://app.example.com/pricing");
}

#[tokio::test]
async fn wallet_portal_links_to_the_billing_dashboard() {
    let app = TestApp::start().await;
    let account = Account::new("Wallet Co").with_generic(GenericFields {
        provider: Some(ProviderKind::Wallet),
        customer_id: Some("payer@example.com".to_string()),
        subscription_id: Some("I-SUB1".to_string()),
        product_id: None,
    });
    app.store.insert(account.clone()).unwrap();

    let (status, body, _) = app
        .send(post_json("/api/billing/portal", Some(&account), json!({})))
        .await;

    assert_eq!(status, StatusCode::OK);
    let url = body.unwrap()["url"].as_str().unwrap().to_string();
    assert!(url.starts_with("https://app.example.com/dashboard/billing?"));
    assert!(url.contains("provider=wallet"));
    assert!(url.contains("customerId=payer%40example.com"));
}

#[tokio::test]
async fn portal_requires_caller_account() {
    let app = TestApp::start().await;
    let (status, body, _) = app
        .send(post_json("/api/billing/portal", None, json!({})))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body.unwrap()["code"], "authentication_required");
}

#[tokio::test]
async fn portal_for_missing_account_is_not_found() {
    let app = TestApp::start().await;
    let ghost = Account::new("Ghost");

    let (status, _, _) = app
        .send(post_json("/api/billing/portal", Some(&ghost), json!({})))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_account_header_is_bad_request() {
    let app = TestApp::start().await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/billing/portal")
        .header("x-account-id", "not-a-uuid")
        .body(Body::empty())
        .unwrap();

    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn catalog_drops_prices_of_unlisted_products() {
    let app = TestApp::start().await;
    let (status, body, _) = app.send(get("/api/billing/catalog?provider=card")).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["products"].as_array().unwrap().len(), 1);
    assert_eq!(body["products"][0]["id"], "prod_pro");
    let prices = body["prices"].as_array().unwrap();
    assert_eq!(prices.len(), 1);
    assert_eq!(prices[0]["id"], "price_pro_monthly");
    assert_eq!(prices[0]["unit_amount"], 1900);
    assert_eq!(prices[0]["interval"], "month");
}

#[tokio::test]
async fn checkout_return_applies_subscription_and_redirects_to_dashboard() {
    let app = TestApp::start().await;
    let account = Account::new("Acme");
    app.store.insert(account.clone()).unwrap();

    let (status, _, location) = app
        .send(get(&format!(
            "/api/checkout/card/return?session_id=cs_{}",
            account.id
        )))
        .await;

    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("https://app.example.com/dashboard"));
    let stored = app.store.get(&account.id).unwrap();
    assert_eq!(stored.subscription_status, Some(SubscriptionStatus::Active));
    assert_eq!(stored.generic.customer_id.as_deref(), Some("cus_checkout"));
    assert_eq!(stored.generic.subscription_id.as_deref(), Some("sub_checkout"));
    assert_eq!(stored.legacy_card.customer_id.as_deref(), Some("cus_checkout"));
    assert_eq!(stored.plan_name.as_deref(), Some("Pro"));
}

#[tokio::test]
async fn checkout_return_without_reference_goes_to_pricing() {
    let app = TestApp::start().await;
    let (status, _, location) = app.send(get("/api/checkout/card/return")).await;

    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("https://app.example.com/pricing"));
}

#[tokio::test]
async fn checkout_return_with_bad_reference_goes_to_error_page() {
    let app = TestApp::start().await;
    let (status, _, location) = app
        .send(get("/api/checkout/card/return?session_id=cs_not-an-account"))
        .await;

    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("https://app.example.com/error"));
}

#[tokio::test]
async fn wallet_checkout_return_url_carries_no_query() {
    let app = TestApp::start().await;
    let account = Account::new("Wallet Co");
    app.store.insert(account.clone()).unwrap();

    let (status, body, _) = app
        .send(post_json(
            "/api/checkout",
            Some(&account),
            json!({"price_id": "P-PRO", "provider": "wallet"}),
        ))
        .await;

    // The stand-in echoes the requested return URL as the approval link.
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body.unwrap()["url"],
        "https://app.example.com/api/checkout/wallet/return"
    );
}

#[tokio::test]
async fn wallet_return_with_approval_parameters_applies_subscription() {
    let app = TestApp::start().await;
    let account = Account::new("Wallet Co");
    app.store.insert(account.clone()).unwrap();

    // PayPal appends all three parameters to the bare return URL.
    let (status, _, location) = app
        .send(get(&format!(
            "/api/checkout/wallet/return?subscription_id=I-{}&ba_token=BA-1&token=EC-1",
            account.id
        )))
        .await;

    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("https://app.example.com/dashboard"));
    let stored = app.store.get(&account.id).unwrap();
    assert_eq!(stored.subscription_status, Some(SubscriptionStatus::Active));
    assert_eq!(stored.generic.provider, Some(ProviderKind::Wallet));
    assert_eq!(
        stored.generic.subscription_id.as_deref(),
        Some(format!("I-{}", account.id).as_str())
    );
    assert_eq!(stored.generic.customer_id.as_deref(), Some("wallet-payer@example.com"));
    assert_eq!(stored.generic.product_id.as_deref(), Some("PROD-PRO"));
    assert_eq!(stored.plan_name.as_deref(), Some("Pro Wallet"));
    assert_eq!(stored.legacy_card, LegacyCardFields::default());
}

#[tokio::test]
async fn wallet_return_with_only_token_uses_it_as_subscription() {
    let app = TestApp::start().await;
    let account = Account::new("Token Co");
    app.store.insert(account.clone()).unwrap();

    let (status, _, location) = app
        .send(get(&format!("/api/checkout/wallet/return?token=I-{}", account.id)))
        .await;

    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("https://app.example.com/dashboard"));
    let stored = app.store.get(&account.id).unwrap();
    assert_eq!(stored.subscription_status, Some(SubscriptionStatus::Active));
}

#[tokio::test]
async fn wallet_return_ignores_repeated_and_templated_parameters() {
    let app = TestApp::start().await;
    let account = Account::new("Repeat Co");
    app.store.insert(account.clone()).unwrap();

    let (status, _, location) = app
        .send(get(&format!(
            "/api/checkout/wallet/return?subscription_id=%7Bid%7D&subscription_id=I-{}&ba_token=BA-1",
            account.id
        )))
        .await;

    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("https://app.example.com/dashboard"));
    assert_eq!(
        app.store.get(&account.id).unwrap().subscription_status,
        Some(SubscriptionStatus::Active)
    );
}

#[tokio::test]
async fn malformed_return_query_still_redirects() {
    let app = TestApp::start().await;
    let (status, _, location) = app
        .send(get("/api/checkout/wallet/return?token=%ZZ&&=&session_id"))
        .await;

    assert_eq!(status, StatusCode::SEE_OTHER);
    assert!(location.is_some());
}

#[tokio::test]
async fn health_is_ok() {
    let app = TestApp::start().await;
    let response_status = app.send(get("/health")).await.0;
    assert_eq!(response_status, StatusCode::OK);
}
