//! Account subscription state as held by the account store.
//!
//! An account carries two views of its card-processor billing identity:
//! the generic triple (`payment_*`) and the legacy card triple. While the
//! payment schema migration is in flight both are written, and for any
//! account whose provider is `card` they must agree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ProviderKind, SubscriptionStatus};
use crate::domain::foundation::AccountId;

/// Provider-agnostic billing identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericFields {
    pub provider: Option<ProviderKind>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub product_id: Option<String>,
}

/// Card-processor identifiers from before providers were pluggable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyCardFields {
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub product_id: Option<String>,
}

impl GenericFields {
    /// The generic view of a legacy card triple.
    pub fn from_legacy_card(legacy: &LegacyCardFields) -> Self {
        Self {
            provider: Some(ProviderKind::Card),
            customer_id: legacy.customer_id.clone(),
            subscription_id: legacy.subscription_id.clone(),
            product_id: legacy.product_id.clone(),
        }
    }
}

impl LegacyCardFields {
    /// The legacy view of a generic triple.
    pub fn from_generic(generic: &GenericFields) -> Self {
        Self {
            customer_id: generic.customer_id.clone(),
            subscription_id: generic.subscription_id.clone(),
            product_id: generic.product_id.clone(),
        }
    }

    /// True when a non-empty legacy customer id is present.
    pub fn has_customer(&self) -> bool {
        self.customer_id.as_deref().is_some_and(|id| !id.is_empty())
    }
}

/// A paying account and its subscription fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub billing_email: Option<String>,
    pub generic: GenericFields,
    pub plan_name: Option<String>,
    pub subscription_status: Option<SubscriptionStatus>,
    /// `occurred_at` of the last subscription change written to this row.
    pub subscription_event_at: Option<DateTime<Utc>>,
    pub legacy_card: LegacyCardFields,
}

impl Account {
    /// Creates an account with no billing identity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: AccountId::new(),
            name: name.into(),
            billing_email: None,
            generic: GenericFields::default(),
            plan_name: None,
            subscription_status: None,
            subscription_event_at: None,
            legacy_card: LegacyCardFields::default(),
        }
    }

    pub fn with_billing_email(mut self, email: impl Into<String>) -> Self {
        self.billing_email = Some(email.into());
        self
    }

    pub fn with_generic(mut self, generic: GenericFields) -> Self {
        self.generic = generic;
        self
    }

    pub fn with_legacy_card(mut self, legacy: LegacyCardFields) -> Self {
        self.legacy_card = legacy;
        self
    }

    /// The customer id this account holds at `provider`, if any.
    ///
    /// Card accounts that predate the generic fields only have the legacy
    /// customer id, so it is consulted as a fallback.
    pub fn customer_id_for(&self, provider: ProviderKind) -> Option<&str> {
        let generic = match self.generic.provider {
            Some(p) if p == provider => self
                .generic
                .customer_id
                .as_deref()
                .filter(|id| !id.is_empty()),
            _ => None,
        };
        match (generic, provider) {
            (Some(id), _) => Some(id),
            (None, ProviderKind::Card) if self.legacy_card.has_customer() => {
                self.legacy_card.customer_id.as_deref()
            }
            _ => None,
        }
    }

    /// Provider this account is billed through, falling back to `card`
    /// for accounts that only carry legacy fields.
    pub fn billing_provider(&self) -> Option<ProviderKind> {
        self.generic.provider.or_else(|| {
            self.legacy_card
                .has_customer()
                .then_some(ProviderKind::Card)
        })
    }

    /// Last-write-wins guard: a change is accepted unless a strictly newer
    /// one has already been written. Ties go to the newer delivery.
    pub fn accepts_change_at(&self, occurred_at: DateTime<Utc>) -> bool {
        self.subscription_event_at
            .map_or(true, |stored| stored <= occurred_at)
    }
}
