//! HTTP adapter for billing endpoints.
//!
//! - `POST /api/webhooks/:provider` - Reconcile a provider webhook delivery
//! - `GET /api/checkout/:provider/return` - Complete checkout and redirect
//! - `POST /api/checkout` - Start a hosted checkout
//! - `POST /api/billing/portal` - Open the billing portal
//! - `GET /api/billing/catalog` - List a provider's catalog
//! - `POST /api/admin/migrate` - Run a payment-data migration pass

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::{ApiError, BillingAppState, CallerContext};
pub use routes::billing_router;
