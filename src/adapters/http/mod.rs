//! HTTP adapters - REST API implementations.

pub mod billing;

use std::time::Duration;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

pub use billing::{billing_router, BillingAppState};

/// Builds the full application router with tracing and a request timeout.
pub fn app_router(state: BillingAppState, request_timeout: Duration) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(TimeoutLayer::new(request_timeout));

    billing_router().layer(middleware).with_state(state)
}
