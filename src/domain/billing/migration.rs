//! Payment schema migration reports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::{GenericFields, LegacyCardFields, ProviderKind};
use crate::domain::foundation::AccountId;

/// One of the three migration passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationOperation {
    Migrate,
    Rollback,
    Validate,
}

impl MigrationOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationOperation::Migrate => "migrate",
            MigrationOperation::Rollback => "rollback",
            MigrationOperation::Validate => "validate",
        }
    }
}

impl fmt::Display for MigrationOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationOperation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "migrate" => Ok(MigrationOperation::Migrate),
            "rollback" => Ok(MigrationOperation::Rollback),
            "validate" => Ok(MigrationOperation::Validate),
            _ => Err(UnknownOperation(s.to_string())),
        }
    }
}

/// Returned for an operation name outside migrate/rollback/validate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown migration operation: {0}")]
pub struct UnknownOperation(pub String);

/// Result of a completed migrate or rollback pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub operation: MigrationOperation,
    pub processed: usize,
}

/// One account whose legacy and generic card triples disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inconsistency {
    pub account_id: AccountId,
    pub fields: Vec<&'static str>,
}

/// Result of a validate pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub checked: usize,
    pub inconsistent: Vec<Inconsistency>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.inconsistent.is_empty()
    }
}

/// Names of the card-triple fields where the two views differ.
///
/// Empty when the generic view is not a card-provider view.
pub fn card_field_mismatches(
    legacy: &LegacyCardFields,
    generic: &GenericFields,
) -> Vec<&'static str> {
    if generic.provider != Some(ProviderKind::Card) {
        return Vec::new();
    }
    let mut fields = Vec::new();
    if legacy.customer_id != generic.customer_id {
        fields.push("customer_id");
    }
    if legacy.subscription_id != generic.subscription_id {
        fields.push("subscription_id");
    }
    if legacy.product_id != generic.product_id {
        fields.push("product_id");
    }
    fields
}
