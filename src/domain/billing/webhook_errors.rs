//! Webhook error types.
//!
//! Every error here means the delivery is NOT acknowledged: the sender gets
//! a non-2xx status and will redeliver. Account-linkage problems are not
//! errors; they surface as `ReconcileOutcome::Dropped`.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that reject a webhook delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The provider tag in the request path is not a supported provider.
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Failed to parse the verified payload.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// No webhook secret is configured for the provider.
    #[error("Webhook secret not configured for {0}")]
    SecretNotConfigured(String),

    /// The provider API could not be reached while normalizing the event.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The account store failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl WebhookError {
    /// Returns true for transient failures a redelivery may fix.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::SecretNotConfigured(_)
                | WebhookError::ProviderUnavailable(_)
                | WebhookError::Storage(_)
        )
    }

    /// Short machine-readable code for error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            WebhookError::UnsupportedProvider(_) => "unsupported_provider",
            WebhookError::InvalidSignature => "signature_invalid",
            WebhookError::ParseError(_) => "invalid_payload",
            WebhookError::SecretNotConfigured(_) => "not_configured",
            WebhookError::ProviderUnavailable(_) => "remote_unavailable",
            WebhookError::Storage(_) => "storage_error",
        }
    }

    /// Maps the error to an HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::UnsupportedProvider(_) => StatusCode::NOT_FOUND,
            WebhookError::InvalidSignature | WebhookError::ParseError(_) => {
                StatusCode::BAD_REQUEST
            }
            WebhookError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            WebhookError::SecretNotConfigured(_) | WebhookError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
