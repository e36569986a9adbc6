//! Inbound webhook delivery types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::domain::foundation::AccountId;

/// Request headers of one delivery, with names lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookHeaders(HashMap<String, String>);

impl WebhookHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds headers from name/value pairs. Later duplicates win.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
                .collect(),
        )
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.0.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// A verified, parsed provider event.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub id: String,
    /// Provider-native event type, e.g. `customer.subscription.updated`.
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    /// The event's subject object (card `data.object`, wallet `resource`).
    pub data: Value,
}

/// Terminal state of one successfully handled delivery.
///
/// Every variant is acknowledged to the sender with a 2xx.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Applied { account_id: AccountId },
    /// The account already holds a newer change.
    Stale { account_id: AccountId },
    Ignored { event_type: String },
    Dropped { reason: String },
}

impl ReconcileOutcome {
    pub fn dropped(reason: impl Into<String>) -> Self {
        ReconcileOutcome::Dropped {
            reason: reason.into(),
        }
    }

    pub fn ignored(event_type: impl Into<String>) -> Self {
        ReconcileOutcome::Ignored {
            event_type: event_type.into(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied { .. } => "applied",
            ReconcileOutcome::Stale { .. } => "stale",
            ReconcileOutcome::Ignored { .. } => "ignored",
            ReconcileOutcome::Dropped { .. } => "dropped",
        }
    }
}
