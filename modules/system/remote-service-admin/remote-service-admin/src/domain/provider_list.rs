//! Ordered, thread-safe view of the providers bound to an admin.
//!
//! The composition layer owns discovery of providers and calls `bind`/`unbind`;
//! the admin only ever reads a snapshot.

use std::sync::Arc;

use parking_lot::RwLock;
use remote_service_admin_sdk::{Exporter, Importer};

/// Provider surface needed by the list: identity plus the bind hooks.
pub trait Bindable: Send + Sync {
    fn provider_id(&self) -> &str;
    fn notify_bound(&self);
    fn notify_unbound(&self);
}

impl Bindable for dyn Exporter {
    fn provider_id(&self) -> &str {
        self.id()
    }

    fn notify_bound(&self) {
        self.bound();
    }

    fn notify_unbound(&self) {
        self.unbound();
    }
}

impl Bindable for dyn Importer {
    fn provider_id(&self) -> &str {
        self.id()
    }

    fn notify_bound(&self) {
        self.bound();
    }

    fn notify_unbound(&self) {
        self.unbound();
    }
}

/// Providers in bind order.
pub struct ProviderList<T: ?Sized> {
    providers: RwLock<Vec<Arc<T>>>,
}

impl<T: ?Sized> Default for ProviderList<T> {
    fn default() -> Self {
        Self {
            providers: RwLock::new(Vec::new()),
        }
    }
}

impl<T: ?Sized + Bindable> ProviderList<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `provider` and notifies it with `bound()`.
    pub fn bind(&self, provider: Arc<T>) {
        tracing::debug!(provider_id = provider.provider_id(), "binding provider");
        self.providers.write().push(Arc::clone(&provider));
        provider.notify_bound();
    }

    /// Removes the provider with `id` and notifies it with `unbound()`.
    pub fn unbind(&self, id: &str) -> Option<Arc<T>> {
        let removed = {
            let mut providers = self.providers.write();
            let pos = providers.iter().position(|p| p.provider_id() == id)?;
            providers.remove(pos)
        };
        tracing::debug!(provider_id = id, "unbinding provider");
        removed.notify_unbound();
        Some(removed)
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.providers.read().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }
}
