//! The canonical Subscription Change Record and the row write derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Account, GenericFields, LegacyCardFields, ProviderKind, SubscriptionStatus};
use crate::domain::foundation::AccountId;

/// How a change identifies the account it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AccountReference {
    /// The provider's customer id (card processor events).
    CustomerId(String),
    /// The account id passed to the provider at checkout (wallet `custom_id`).
    AccountId(AccountId),
}

impl fmt::Display for AccountReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountReference::CustomerId(id) => write!(f, "customer:{}", id),
            AccountReference::AccountId(id) => write!(f, "account:{}", id),
        }
    }
}

/// Provider-agnostic description of one subscription state change.
///
/// Built from a single webhook delivery (or checkout return), consumed once,
/// never persisted itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionChange {
    pub provider: ProviderKind,
    pub account: AccountReference,
    pub customer_id: Option<String>,
    pub subscription_id: String,
    pub product_id: Option<String>,
    pub plan_name: Option<String>,
    pub status: SubscriptionStatus,
    pub occurred_at: DateTime<Utc>,
}

/// The exact field values a change writes into one account row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionWrite {
    pub generic: GenericFields,
    pub plan_name: Option<String>,
    pub status: SubscriptionStatus,
    pub occurred_at: DateTime<Utc>,
    /// Card accounts also get the legacy triple while both views exist.
    pub legacy_card: Option<LegacyCardFields>,
}

impl SubscriptionChange {
    /// Resolves this change against the current row into the fields to write.
    ///
    /// Terminal statuses clear subscription, product and plan but keep the
    /// status value. Everything else (including `unknown`) writes the
    /// identifiers it carries.
    pub fn to_write(&self, account: &Account) -> SubscriptionWrite {
        let customer_id = self
            .customer_id
            .clone()
            .or_else(|| account.customer_id_for(self.provider).map(str::to_string));

        let (subscription_id, product_id, plan_name) = if self.status.clears_identifiers() {
            (None, None, None)
        } else {
            (
                Some(self.subscription_id.clone()),
                self.product_id.clone(),
                self.plan_name.clone(),
            )
        };

        let generic = GenericFields {
            provider: Some(self.provider),
            customer_id,
            subscription_id,
            product_id,
        };
        let legacy_card = (self.provider == ProviderKind::Card)
            .then(|| LegacyCardFields::from_generic(&generic));

        SubscriptionWrite {
            generic,
            plan_name,
            status: self.status,
            occurred_at: self.occurred_at,
            legacy_card,
        }
    }
}

impl SubscriptionWrite {
    /// Applies the write to an in-memory row, honouring last-write-wins.
    ///
    /// Returns false (and leaves the row untouched) when the row already
    /// holds a strictly newer change.
    pub fn apply_to(&self, account: &mut Account) -> bool {
        if !account.accepts_change_at(self.occurred_at) {
            return false;
        }
        account.generic = self.generic.clone();
        account.plan_name = self.plan_name.clone();
        account.subscription_status = Some(self.status);
        account.subscription_event_at = Some(self.occurred_at);
        if let Some(legacy) = &self.legacy_card {
            account.legacy_card = legacy.clone();
        }
        true
    }
}
