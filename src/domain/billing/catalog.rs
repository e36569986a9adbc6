//! Normalized product catalog types.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A sellable product as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub default_price_id: Option<String>,
}

/// A recurring price attached to a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub id: String,
    pub product_id: String,
    /// Amount in the minor currency unit (cents).
    pub unit_amount: i64,
    pub currency: String,
    pub interval: Option<String>,
    pub trial_period_days: Option<u32>,
}

impl Price {
    /// Converts a decimal major-unit amount ("9.99") to minor units,
    /// rounding to the nearest cent and never going negative.
    pub fn minor_units_from_decimal(value: &str) -> Option<i64> {
        let parsed: f64 = value.trim().parse().ok()?;
        if !parsed.is_finite() {
            return None;
        }
        Some(((parsed * 100.0).round() as i64).max(0))
    }
}

/// Products and prices fetched from one provider in one listing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub products: Vec<Product>,
    pub prices: Vec<Price>,
}

impl Catalog {
    /// Builds a catalog, dropping prices whose product was not listed.
    ///
    /// Returns the catalog and the ids of the dropped prices.
    pub fn assemble(products: Vec<Product>, prices: Vec<Price>) -> (Self, Vec<String>) {
        let known: HashSet<&str> = products.iter().map(|p| p.id.as_str()).collect();
        let (kept, orphaned): (Vec<Price>, Vec<Price>) = prices
            .into_iter()
            .partition(|price| known.contains(price.product_id.as_str()));
        let orphaned_ids = orphaned.into_iter().map(|p| p.id).collect();
        (
            Self {
                products,
                prices: kept,
            },
            orphaned_ids,
        )
    }
}
