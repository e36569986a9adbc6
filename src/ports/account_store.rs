//! Account store port.
//!
//! Persistence of account subscription fields. Every operation is atomic
//! per account row; implementations must not rely on in-process locks,
//! since webhook deliveries can be handled by independent instances.

use async_trait::async_trait;

use crate::domain::billing::{
    Account, GenericFields, LegacyCardFields, ProviderKind, SubscriptionWrite,
};
use crate::domain::foundation::{AccountId, DomainError};

/// Result of a conditional subscription write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// The row holds a newer change; nothing was written.
    Stale,
    NotFound,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, DomainError>;

    /// Finds the account holding `customer_id` at `provider`.
    ///
    /// For `card` the legacy customer id also matches.
    async fn find_by_provider_customer_id(
        &self,
        provider: ProviderKind,
        customer_id: &str,
    ) -> Result<Option<Account>, DomainError>;

    async fn find_by_provider_subscription_id(
        &self,
        provider: ProviderKind,
        subscription_id: &str,
    ) -> Result<Option<Account>, DomainError>;

    /// Writes subscription fields unless the row already holds a change
    /// newer than `write.occurred_at`. Single atomic row update.
    async fn apply_subscription_change(
        &self,
        id: &AccountId,
        write: &SubscriptionWrite,
    ) -> Result<UpdateOutcome, DomainError>;

    /// Unconditionally overwrites the generic triple and provider.
    async fn update_generic_fields(
        &self,
        id: &AccountId,
        generic: &GenericFields,
    ) -> Result<(), DomainError>;

    async fn list_accounts_by_provider(
        &self,
        provider: ProviderKind,
    ) -> Result<Vec<Account>, DomainError>;

    /// Accounts with a non-empty legacy card customer id.
    async fn list_accounts_with_legacy_card_customer(&self) -> Result<Vec<Account>, DomainError>;

    async fn set_legacy_fields(
        &self,
        id: &AccountId,
        legacy: &LegacyCardFields,
    ) -> Result<(), DomainError>;
}
