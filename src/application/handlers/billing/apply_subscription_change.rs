//! SubscriptionApplier - the single writer of subscription state.
//!
//! Adapters normalize provider payloads into `SubscriptionChange`s and hand
//! them here (through the `SubscriptionSink` port). The applier resolves the
//! account, derives the row write and performs the conditional update.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::billing::{Account, AccountReference, ReconcileOutcome, SubscriptionChange};
use crate::domain::foundation::DomainError;
use crate::ports::{AccountStore, SubscriptionSink, UpdateOutcome};

/// Applies subscription changes to the account store.
pub struct SubscriptionApplier {
    store: Arc<dyn AccountStore>,
}

impl SubscriptionApplier {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    async fn resolve_account(
        &self,
        change: &SubscriptionChange,
    ) -> Result<Option<Account>, DomainError> {
        match &change.account {
            AccountReference::AccountId(id) => self.store.find_by_id(id).await,
            AccountReference::CustomerId(customer_id) => {
                let by_customer = self
                    .store
                    .find_by_provider_customer_id(change.provider, customer_id)
                    .await?;
                if by_customer.is_some() {
                    return Ok(by_customer);
                }
                self.store
                    .find_by_provider_subscription_id(change.provider, &change.subscription_id)
                    .await
            }
        }
    }
}

#[async_trait]
impl SubscriptionSink for SubscriptionApplier {
    async fn apply(&self, change: SubscriptionChange) -> Result<ReconcileOutcome, DomainError> {
        let Some(account) = self.resolve_account(&change).await? else {
            tracing::error!(
                provider = %change.provider,
                account = %change.account,
                subscription_id = %change.subscription_id,
                "No account linked to subscription change; dropping"
            );
            return Ok(ReconcileOutcome::dropped(format!(
                "no account for {}",
                change.account
            )));
        };

        let write = change.to_write(&account);
        match self.store.apply_subscription_change(&account.id, &write).await? {
            UpdateOutcome::Applied => {
                tracing::info!(
                    provider = %change.provider,
                    account_id = %account.id,
                    status = change.status.as_str(),
                    "Applied subscription change"
                );
                Ok(ReconcileOutcome::Applied {
                    account_id: account.id,
                })
            }
            UpdateOutcome::Stale => {
                tracing::info!(
                    provider = %change.provider,
                    account_id = %account.id,
                    occurred_at = %change.occurred_at,
                    "Skipped subscription change older than stored state"
                );
                Ok(ReconcileOutcome::Stale {
                    account_id: account.id,
                })
            }
            UpdateOutcome::NotFound => {
                tracing::error!(account_id = %account.id, "Account vanished before update; dropping");
                Ok(ReconcileOutcome::dropped(format!(
                    "account {} not found",
                    account.id
                )))
            }
        }
    }
}
