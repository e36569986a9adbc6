//! Provider registry.
//!
//! Resolves provider names to one lazily built adapter per provider.
//! Construction goes through a [`ProviderFactory`] and is never repeated
//! on the request path; only [`ProviderRegistry::clear`] discards adapters.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::domain::billing::ProviderKind;
use crate::ports::{PaymentError, PaymentProvider, ProviderFactory};

/// Cache of provider adapters keyed by provider.
pub struct ProviderRegistry {
    factory: Arc<dyn ProviderFactory>,
    default_provider: ProviderKind,
    providers: RwLock<HashMap<ProviderKind, Arc<dyn PaymentProvider>>>,
}

impl ProviderRegistry {
    pub fn new(factory: Arc<dyn ProviderFactory>, default_provider: ProviderKind) -> Self {
        Self {
            factory,
            default_provider,
            providers: RwLock::new(HashMap::new()),
        }
    }

    /// Pure membership check against the supported provider names.
    pub fn is_supported(name: &str) -> bool {
        ProviderKind::is_supported(name)
    }

    pub fn default_provider_kind(&self) -> ProviderKind {
        self.default_provider
    }

    /// Returns the cached adapter for `name`, building it on first use.
    pub fn get_provider(&self, name: &str) -> Result<Arc<dyn PaymentProvider>, PaymentError> {
        let kind: ProviderKind = name
            .parse()
            .map_err(|_| PaymentError::unsupported_provider(name))?;
        self.get(kind)
    }

    /// Returns the cached adapter for the configured default provider.
    pub fn get_default_provider(&self) -> Result<Arc<dyn PaymentProvider>, PaymentError> {
        self.get(self.default_provider)
    }

    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn PaymentProvider>, PaymentError> {
        if let Some(existing) = self.read_cached(kind) {
            return Ok(existing);
        }

        let mut providers = self
            .providers
            .write()
            .map_err(|_| PaymentError::not_configured("Provider registry lock poisoned"))?;
        // Another caller may have built it while we waited for the lock.
        if let Some(existing) = providers.get(&kind) {
            return Ok(existing.clone());
        }
        let provider = self.factory.create(kind)?;
        providers.insert(kind, provider.clone());
        Ok(provider)
    }

    /// Drops every cached adapter. Used for credential rotation and tests.
    pub fn clear(&self) {
        if let Ok(mut providers) = self.providers.write() {
            providers.clear();
        }
    }

    fn read_cached(&self, kind: ProviderKind) -> Option<Arc<dyn PaymentProvider>> {
        self.providers.read().ok()?.get(&kind).cloned()
    }
}
