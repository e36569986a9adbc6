//! In-memory account store.
//!
//! Holds accounts in a `RwLock<HashMap>`. Each operation takes the lock
//! once, which gives the same per-row atomicity the Postgres store gets
//! from single-statement updates.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::billing::{
    Account, GenericFields, LegacyCardFields, ProviderKind, SubscriptionWrite,
};
use crate::domain::foundation::{AccountId, DomainError, ErrorCode};
use crate::ports::{AccountStore, UpdateOutcome};

fn poisoned() -> DomainError {
    DomainError::new(ErrorCode::InternalError, "Account store lock poisoned")
}

/// Account store backed by process memory.
#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<AccountId, Account>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with `accounts`.
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        Self {
            accounts: RwLock::new(accounts.into_iter().map(|a| (a.id, a)).collect()),
        }
    }

    /// Inserts or replaces an account.
    pub fn insert(&self, account: Account) -> Result<(), DomainError> {
        self.accounts
            .write()
            .map_err(|_| poisoned())?
            .insert(account.id, account);
        Ok(())
    }

    /// Snapshot of one account.
    pub fn get(&self, id: &AccountId) -> Option<Account> {
        self.accounts.read().ok()?.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.accounts.read().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find(&self, predicate: impl Fn(&Account) -> bool) -> Result<Option<Account>, DomainError> {
        let accounts = self.accounts.read().map_err(|_| poisoned())?;
        Ok(accounts.values().find(|a| predicate(a)).cloned())
    }

    fn filter(&self, predicate: impl Fn(&Account) -> bool) -> Result<Vec<Account>, DomainError> {
        let accounts = self.accounts.read().map_err(|_| poisoned())?;
        let mut matching: Vec<Account> = accounts.values().filter(|a| predicate(a)).cloned().collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.to_string().cmp(&b.id.to_string())));
        Ok(matching)
    }

    fn modify(
        &self,
        id: &AccountId,
        change: impl FnOnce(&mut Account),
    ) -> Result<(), DomainError> {
        let mut accounts = self.accounts.write().map_err(|_| poisoned())?;
        let account = accounts
            .get_mut(id)
            .ok_or_else(|| DomainError::account_not_found(id))?;
        change(account);
        Ok(())
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, DomainError> {
        let accounts = self.accounts.read().map_err(|_| poisoned())?;
        Ok(accounts.get(id).cloned())
    }

    async fn find_by_provider_customer_id(
        &self,
        provider: ProviderKind,
        customer_id: &str,
    ) -> Result<Option<Account>, DomainError> {
        if customer_id.is_empty() {
            return Ok(None);
        }
        self.find(|a| {
            let generic = a.generic.provider == Some(provider)
                && a.generic.customer_id.as_deref() == Some(customer_id);
            let legacy = provider == ProviderKind::Card
                && a.legacy_card.customer_id.as_deref() == Some(customer_id);
            generic || legacy
        })
    }

    async fn find_by_provider_subscription_id(
        &self,
        provider: ProviderKind,
        subscription_id: &str,
    ) -> Result<Option<Account>, DomainError> {
        if subscription_id.is_empty() {
            return Ok(None);
        }
        self.find(|a| {
            a.generic.provider == Some(provider)
                && a.generic.subscription_id.as_deref() == Some(subscription_id)
        })
    }

    async fn apply_subscription_change(
        &self,
        id: &AccountId,
        write: &SubscriptionWrite,
    ) -> Result<UpdateOutcome, DomainError> {
        let mut accounts = self.accounts.write().map_err(|_| poisoned())?;
        let Some(account) = accounts.get_mut(id) else {
            return Ok(UpdateOutcome::NotFound);
        };
        if write.apply_to(account) {
            Ok(UpdateOutcome::Applied)
        } else {
            Ok(UpdateOutcome::Stale)
        }
    }

    async fn update_generic_fields(
        &self,
        id: &AccountId,
        generic: &GenericFields,
    ) -> Result<(), DomainError> {
        self.modify(id, |a| a.generic = generic.clone())
    }

    async fn list_accounts_by_provider(
        &self,
        provider: ProviderKind,
    ) -> Result<Vec<Account>, DomainError> {
        self.filter(|a| a.generic.provider == Some(provider))
    }

    async fn list_accounts_with_legacy_card_customer(&self) -> Result<Vec<Account>, DomainError> {
        self.filter(|a| a.legacy_card.has_customer())
    }

    async fn set_legacy_fields(
        &self,
        id: &AccountId,
        legacy: &LegacyCardFields,
    ) -> Result<(), DomainError> {
        self.modify(id, |a| a.legacy_card = legacy.clone())
    }
}
