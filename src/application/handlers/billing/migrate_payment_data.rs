//! Payment schema migration between the legacy card triple and the generic
//! billing fields.
//!
//! Every operation is a single re-runnable pass. A store failure aborts the
//! pass and reports how many accounts were already handled; re-running
//! resumes safely because each step writes absolute values.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::billing::{
    card_field_mismatches, GenericFields, Inconsistency, LegacyCardFields, MigrationOperation,
    MigrationReport, ProviderKind, ValidationReport,
};
use crate::domain::foundation::DomainError;
use crate::ports::AccountStore;

/// A migration pass stopped early.
#[derive(Debug, Error)]
#[error("{operation} aborted after {processed} accounts: {source}")]
pub struct MigrationError {
    pub operation: MigrationOperation,
    pub processed: usize,
    #[source]
    pub source: DomainError,
}

impl MigrationError {
    fn new(operation: MigrationOperation, processed: usize, source: DomainError) -> Self {
        Self {
            operation,
            processed,
            source,
        }
    }
}

/// Result of [`PaymentDataMigrator::run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MigrationOutcome {
    Completed(MigrationReport),
    Validated(ValidationReport),
}

impl MigrationOutcome {
    /// False only for a validation pass that found inconsistencies.
    pub fn succeeded(&self) -> bool {
        match self {
            MigrationOutcome::Completed(_) => true,
            MigrationOutcome::Validated(report) => report.passed(),
        }
    }
}

pub struct PaymentDataMigrator {
    store: Arc<dyn AccountStore>,
}

impl PaymentDataMigrator {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    pub async fn run(&self, operation: MigrationOperation) -> Result<MigrationOutcome, MigrationError> {
        match operation {
            MigrationOperation::Migrate => self.migrate().await.map(MigrationOutcome::Completed),
            MigrationOperation::Rollback => self.rollback().await.map(MigrationOutcome::Completed),
            MigrationOperation::Validate => self.validate().await.map(MigrationOutcome::Validated),
        }
    }

    /// Copies each legacy card triple into the generic fields.
    pub async fn migrate(&self) -> Result<MigrationReport, MigrationError> {
        let op = MigrationOperation::Migrate;
        let accounts = self
            .store
            .list_accounts_with_legacy_card_customer()
            .await
            .map_err(|e| MigrationError::new(op, 0, e))?;
        tracing::info!(accounts = accounts.len(), "Migrating legacy card fields");

        let mut processed = 0;
        for account in &accounts {
            let generic = GenericFields::from_legacy_card(&account.legacy_card);
            self.store
                .update_generic_fields(&account.id, &generic)
                .await
                .map_err(|e| {
                    tracing::error!(account_id = %account.id, processed, error = %e, "Migration aborted");
                    MigrationError::new(op, processed, e)
                })?;
            processed += 1;
            tracing::debug!(account_id = %account.id, "Migrated account");
        }

        tracing::info!(processed, "Migration complete");
        Ok(MigrationReport {
            operation: op,
            processed,
        })
    }

    /// Copies each card account's generic triple back into the legacy fields.
    pub async fn rollback(&self) -> Result<MigrationReport, MigrationError> {
        let op = MigrationOperation::Rollback;
        let accounts = self
            .store
            .list_accounts_by_provider(ProviderKind::Card)
            .await
            .map_err(|e| MigrationError::new(op, 0, e))?;
        tracing::info!(accounts = accounts.len(), "Rolling back generic card fields");

        let mut processed = 0;
        for account in &accounts {
            let legacy = LegacyCardFields::from_generic(&account.generic);
            self.store
                .set_legacy_fields(&account.id, &legacy)
                .await
                .map_err(|e| {
                    tracing::error!(account_id = %account.id, processed, error = %e, "Rollback aborted");
                    MigrationError::new(op, processed, e)
                })?;
            processed += 1;
        }

        tracing::info!(processed, "Rollback complete");
        Ok(MigrationReport {
            operation: op,
            processed,
        })
    }

    /// Compares both views of every card account. Never writes.
    pub async fn validate(&self) -> Result<ValidationReport, MigrationError> {
        let accounts = self
            .store
            .list_accounts_by_provider(ProviderKind::Card)
            .await
            .map_err(|e| MigrationError::new(MigrationOperation::Validate, 0, e))?;

        let inconsistent: Vec<Inconsistency> = accounts
            .iter()
            .filter_map(|account| {
                let fields = card_field_mismatches(&account.legacy_card, &account.generic);
                (!fields.is_empty()).then(|| Inconsistency {
                    account_id: account.id,
                    fields,
                })
            })
            .collect();

        for item in &inconsistent {
            tracing::warn!(account_id = %item.account_id, fields = ?item.fields, "Inconsistent payment fields");
        }
        let report = ValidationReport {
            checked: accounts.len(),
            inconsistent,
        };
        if report.passed() {
            tracing::info!(checked = report.checked, "Payment data consistent");
        }
        Ok(report)
    }
}
