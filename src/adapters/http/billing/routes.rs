//! Axum router configuration for billing endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    checkout_return, create_checkout, create_portal, get_catalog, handle_webhook, health,
    run_migration, BillingAppState,
};

/// Caller-facing checkout, portal and catalog routes.
///
/// # Routes
/// - `POST /checkout` - Start a hosted checkout
/// - `GET /checkout/:provider/return` - Provider redirect target after checkout
/// - `POST /billing/portal` - Open the billing portal
/// - `GET /billing/catalog` - List products and prices
pub fn billing_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/checkout", post(create_checkout))
        .route("/checkout/:provider/return", get(checkout_return))
        .route("/billing/portal", post(create_portal))
        .route("/billing/catalog", get(get_catalog))
}

/// Provider webhook routes.
///
/// Separate from the caller routes because deliveries carry no caller
/// context; they are authenticated by signature.
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/:provider", post(handle_webhook))
}

/// Administrative routes. Access control is an upstream concern.
pub fn admin_routes() -> Router<BillingAppState> {
    Router::new().route("/migrate", post(run_migration))
}

/// The complete billing API, mounted under `/api`, plus `/health`.
pub fn billing_router() -> Router<BillingAppState> {
    let api = Router::new()
        .merge(billing_routes())
        .nest("/webhooks", webhook_routes())
        .nest("/admin", admin_routes());

    Router::new()
        .nest("/api", api)
        .route("/health", get(health))
}
