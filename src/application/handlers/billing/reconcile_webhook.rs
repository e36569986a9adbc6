//! ReconcileWebhook - turns one inbound provider delivery into at most one
//! account update.
//!
//! The provider is resolved from the delivery's own provider tag, never from
//! the payload shape. Verification runs against the raw bytes before any
//! parsing happens.

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::Arc;

use crate::application::ProviderRegistry;
use crate::domain::billing::{ProviderKind, ReconcileOutcome, WebhookError, WebhookHeaders};

/// Command carrying one unprocessed webhook delivery.
#[derive(Debug, Clone)]
pub struct ReconcileWebhookCommand {
    /// Provider tag from the request path.
    pub provider: String,
    /// Raw request body, exactly as received.
    pub payload: Vec<u8>,
    pub headers: WebhookHeaders,
}

/// Handler for provider webhook deliveries.
pub struct WebhookReconciler {
    registry: Arc<ProviderRegistry>,
    secrets: HashMap<ProviderKind, SecretString>,
}

impl WebhookReconciler {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            secrets: HashMap::new(),
        }
    }

    /// Registers the shared secret used to verify `provider` deliveries.
    pub fn with_secret(mut self, provider: ProviderKind, secret: SecretString) -> Self {
        self.secrets.insert(provider, secret);
        self
    }

    pub async fn handle(
        &self,
        cmd: ReconcileWebhookCommand,
    ) -> Result<ReconcileOutcome, WebhookError> {
        let kind: ProviderKind = cmd
            .provider
            .parse()
            .map_err(|_| WebhookError::UnsupportedProvider(cmd.provider.clone()))?;
        let secret = self
            .secrets
            .get(&kind)
            .ok_or_else(|| WebhookError::SecretNotConfigured(kind.to_string()))?;
        let provider = self.registry.get(kind)?;

        // 1. Unverified -> Verified
        if let Err(e) = provider.prepare_webhook_verification(&cmd.headers).await {
            if e.retryable {
                tracing::warn!(provider = %kind, error = %e, "Could not prepare webhook verification");
                return Err(WebhookError::ProviderUnavailable(e.to_string()));
            }
            tracing::warn!(provider = %kind, error = %e, "Rejected webhook before verification");
            return Err(WebhookError::InvalidSignature);
        }
        if !provider.verify_webhook_signature(&cmd.payload, &cmd.headers, secret.expose_secret()) {
            tracing::warn!(provider = %kind, "Webhook signature verification failed");
            return Err(WebhookError::InvalidSignature);
        }

        // 2. Verified -> parsed event
        let event = provider.parse_webhook_event(&cmd.payload).map_err(|e| {
            tracing::warn!(provider = %kind, error = %e, "Failed to parse verified webhook");
            WebhookError::from(e)
        })?;

        // 3-5. Dispatch, normalize and apply
        let outcome = provider.handle_webhook(&event).await.map_err(|e| {
            tracing::error!(
                provider = %kind,
                event_id = %event.id,
                event_type = %event.event_type,
                error = %e,
                "Webhook processing failed"
            );
            e
        })?;

        match &outcome {
            ReconcileOutcome::Dropped { reason } => tracing::error!(
                provider = %kind,
                event_id = %event.id,
                event_type = %event.event_type,
                reason = %reason,
                "Webhook dropped"
            ),
            other => tracing::info!(
                provider = %kind,
                event_id = %event.id,
                event_type = %event.event_type,
                outcome = other.label(),
                "Webhook reconciled"
            ),
        }
        Ok(outcome)
    }
}
