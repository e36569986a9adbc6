//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to application layer command/query handlers.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequestParts, Json, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};

use crate::application::{
    CheckoutError, CheckoutOrchestrator, MigrationError, PaymentDataMigrator,
    ProviderRegistry, ReconcileWebhookCommand, StartCheckoutCommand, WebhookReconciler,
};
use crate::domain::billing::{MigrationOperation, WebhookError, WebhookHeaders};
use crate::domain::foundation::{AccountId, ErrorCode};
use crate::ports::{AccountStore, PaymentErrorCode, SubscriptionSink};

use super::dto::{
    CatalogQuery, CheckoutRequest, CheckoutReturnQuery, ErrorResponse, MigrationRequest,
    MigrationResponse, PortalRequest, UrlResponse,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state containing all dependencies.
///
/// Cloned for each request; every dependency is Arc-wrapped.
#[derive(Clone)]
pub struct BillingAppState {
    pub registry: Arc<ProviderRegistry>,
    pub store: Arc<dyn AccountStore>,
    pub sink: Arc<dyn SubscriptionSink>,
    pub reconciler: Arc<WebhookReconciler>,
    pub base_url: String,
}

impl BillingAppState {
    /// Create handlers on demand from the shared state.
    pub fn checkout_orchestrator(&self) -> CheckoutOrchestrator {
        CheckoutOrchestrator::new(
            self.registry.clone(),
            self.store.clone(),
            self.sink.clone(),
            self.base_url.clone(),
        )
    }

    pub fn migrator(&self) -> PaymentDataMigrator {
        PaymentDataMigrator::new(self.store.clone())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Caller Context (authentication is handled upstream)
// ════════════════════════════════════════════════════════════════════════════════

/// Account and actor forwarded by the authenticating proxy.
///
/// Both are optional: a checkout from a visitor without an account is a
/// normal flow that ends on the sign-up page.
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    pub account_id: Option<AccountId>,
    pub user_id: Option<String>,
}

impl CallerContext {
    fn require_account(&self) -> Result<AccountId, ApiError> {
        self.account_id.ok_or(ApiError::AuthenticationRequired)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let account_id = match header("X-Account-Id") {
            Some(raw) => Some(
                raw.parse()
                    .map_err(|_| ApiError::BadRequest(format!("Invalid account id: {}", raw)))?,
            ),
            None => None,
        };

        Ok(CallerContext {
            account_id,
            user_id: header("X-User-Id"),
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook and Return Endpoints (no caller context)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/webhooks/:provider - Reconcile a provider webhook delivery
///
/// The body is taken as raw bytes; it is verified before it is parsed.
pub async fn handle_webhook(
    State(state): State<BillingAppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let cmd = ReconcileWebhookCommand {
        provider,
        payload: body.to_vec(),
        headers: webhook_headers(&headers),
    };

    let outcome = state.reconciler.handle(cmd).await?;
    Ok(Json(outcome))
}

/// GET /api/checkout/:provider/return - Finish checkout and redirect
///
/// Always answers with a redirect: the dashboard on success, the pricing
/// page when no reference came back, the error page otherwise. An
/// unparseable query string counts as no reference.
pub async fn checkout_return(
    State(state): State<BillingAppState>,
    Path(provider): Path<String>,
    pairs: Option<Query<Vec<(String, String)>>>,
) -> Redirect {
    let orchestrator = state.checkout_orchestrator();
    let query = pairs
        .map(|Query(pairs)| CheckoutReturnQuery::from_pairs(pairs))
        .unwrap_or_default();

    let target = match query.reference() {
        None => orchestrator.pricing_url(),
        Some(reference) => match orchestrator.complete_checkout(&provider, reference).await {
            Ok(_) => orchestrator.dashboard_url(),
            Err(e) => {
                tracing::error!(provider = %provider, reference, error = %e, "Checkout return failed");
                orchestrator.error_url()
            }
        },
    };

    Redirect::to(&target.unwrap_or_else(|_| "/error".to_string()))
}

// ════════════════════════════════════════════════════════════════════════════════
// Caller Endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/checkout - Start a hosted checkout
pub async fn create_checkout(
    State(state): State<BillingAppState>,
    caller: CallerContext,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.price_id.trim().is_empty() {
        return Err(ApiError::BadRequest("price_id is required".to_string()));
    }

    let cmd = StartCheckoutCommand {
        account_id: caller.account_id,
        actor_id: caller.user_id,
        price_id: request.price_id,
        provider: request.provider,
    };
    let url = state.checkout_orchestrator().start_checkout(cmd).await?;
    Ok(Json(UrlResponse { url }))
}

/// POST /api/billing/portal - Open the self-service billing portal
pub async fn create_portal(
    State(state): State<BillingAppState>,
    caller: CallerContext,
    request: Option<Json<PortalRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let account_id = caller.require_account()?;
    let request = request.map(|Json(r)| r).unwrap_or_default();

    let url = state
        .checkout_orchestrator()
        .open_portal(&account_id, request.provider.as_deref())
        .await?;
    Ok(Json(UrlResponse { url }))
}

/// GET /api/billing/catalog - List products and prices of one provider
pub async fn get_catalog(
    State(state): State<BillingAppState>,
    Query(query): Query<CatalogQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let catalog = state
        .checkout_orchestrator()
        .catalog(query.provider.as_deref())
        .await?;
    Ok(Json(catalog))
}

/// POST /api/admin/migrate - Run one payment-data migration pass
pub async fn run_migration(
    State(state): State<BillingAppState>,
    Json(request): Json<MigrationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let operation = request
        .operation
        .parse::<MigrationOperation>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let report = state.migrator().run(operation).await?;
    Ok(Json(MigrationResponse {
        operation,
        passed: report.succeeded(),
        report,
    }))
}

/// GET /health - Liveness check
pub async fn health() -> &'static str {
    "ok"
}

fn webhook_headers(headers: &HeaderMap) -> WebhookHeaders {
    WebhookHeaders::from_pairs(
        headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v))),
    )
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts application errors to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    Webhook(WebhookError),
    Checkout(CheckoutError),
    Migration(MigrationError),
    BadRequest(String),
    AuthenticationRequired,
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        Self::Webhook(err)
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        Self::Checkout(err)
    }
}

impl From<MigrationError> for ApiError {
    fn from(err: MigrationError) -> Self {
        Self::Migration(err)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Webhook(e) => (e.status_code(), e.code()),
            ApiError::Checkout(CheckoutError::Payment(e)) => {
                let status = match e.code {
                    PaymentErrorCode::UnsupportedProvider => StatusCode::NOT_FOUND,
                    PaymentErrorCode::InvalidAccount => StatusCode::BAD_REQUEST,
                    PaymentErrorCode::NoBillingIdentity => StatusCode::CONFLICT,
                    PaymentErrorCode::RemoteRejected | PaymentErrorCode::InvalidPayload => {
                        StatusCode::BAD_GATEWAY
                    }
                    PaymentErrorCode::RemoteUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                    PaymentErrorCode::SignatureInvalid => StatusCode::BAD_REQUEST,
                    PaymentErrorCode::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, payment_code(e.code))
            }
            ApiError::Checkout(CheckoutError::AccountNotFound(_)) => {
                (StatusCode::NOT_FOUND, "account_not_found")
            }
            ApiError::Checkout(CheckoutError::Store(e)) if e.code == ErrorCode::AccountNotFound => {
                (StatusCode::NOT_FOUND, "account_not_found")
            }
            ApiError::Checkout(CheckoutError::Store(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
            }
            ApiError::Checkout(CheckoutError::InvalidUrl(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
            ApiError::Migration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "migration_failed"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::AuthenticationRequired => {
                (StatusCode::UNAUTHORIZED, "authentication_required")
            }
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Webhook(e) => e.to_string(),
            ApiError::Checkout(CheckoutError::Payment(e)) => e.message.clone(),
            ApiError::Checkout(e) => e.to_string(),
            ApiError::Migration(e) => e.to_string(),
            ApiError::BadRequest(message) => message.clone(),
            ApiError::AuthenticationRequired => "An account is required".to_string(),
        }
    }
}

fn payment_code(code: PaymentErrorCode) -> &'static str {
    match code {
        PaymentErrorCode::UnsupportedProvider => "unsupported_provider",
        PaymentErrorCode::InvalidAccount => "invalid_account",
        PaymentErrorCode::NoBillingIdentity => "no_billing_identity",
        PaymentErrorCode::RemoteRejected => "remote_rejected",
        PaymentErrorCode::RemoteUnavailable => "remote_unavailable",
        PaymentErrorCode::SignatureInvalid => "signature_invalid",
        PaymentErrorCode::InvalidPayload => "invalid_payload",
        PaymentErrorCode::NotConfigured => "not_configured",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), code, error = %self.message(), "Request failed");
        }
        (status, Json(ErrorResponse::new(code, self.message()))).into_response()
    }
}
