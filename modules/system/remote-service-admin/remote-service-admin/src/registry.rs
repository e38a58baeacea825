//! In-process service registry.
//!
//! Assigns service ids, keeps the live property maps and delivers service
//! events synchronously, in listener registration order:
//! `REGISTERED` after registration, `MODIFIED` after a property change and
//! `UNREGISTERING` before removal.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::RwLock;
use remote_service_admin_sdk::{
    ListenerId, Properties, RegistryError, ServiceEvent, ServiceEventKind, ServiceListener,
    ServiceObject, ServiceReference, ServiceRegistration, ServiceRegistry,
};
use uuid::Uuid;

struct ServiceEntry {
    reference: ServiceReference,
    service: ServiceObject,
}

pub struct LocalServiceRegistry {
    me: Weak<Self>,
    framework_uuid: String,
    next_service_id: AtomicI64,
    next_listener_id: AtomicU64,
    services: DashMap<i64, ServiceEntry>,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ServiceListener>)>>,
}

impl LocalServiceRegistry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_framework_uuid(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn with_framework_uuid(framework_uuid: impl Into<String>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            framework_uuid: framework_uuid.into(),
            next_service_id: AtomicI64::new(1),
            next_listener_id: AtomicU64::new(1),
            services: DashMap::new(),
            listeners: RwLock::new(Vec::new()),
        })
    }

    /// References of every registered service, ordered by service id.
    #[must_use]
    pub fn references(&self) -> Vec<ServiceReference> {
        let mut refs: Vec<_> = self
            .services
            .iter()
            .map(|e| e.value().reference.clone())
            .collect();
        refs.sort_by_key(ServiceReference::service_id);
        refs
    }

    /// References of the services registered under `interface`.
    #[must_use]
    pub fn references_for(&self, interface: &str) -> Vec<ServiceReference> {
        self.references()
            .into_iter()
            .filter(|r| r.interfaces().iter().any(|i| i == interface))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    fn fire(&self, kind: ServiceEventKind, reference: &ServiceReference) {
        let listeners = self.listeners.read().clone();
        let event = ServiceEvent::new(kind, reference.clone());
        for (_, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener.service_changed(&event))).is_err() {
                tracing::error!(
                    service_id = reference.service_id(),
                    kind = ?kind,
                    "service listener panicked"
                );
            }
        }
    }
}

impl ServiceRegistry for LocalServiceRegistry {
    fn register_service(
        &self,
        interfaces: &[String],
        service: ServiceObject,
        properties: Properties,
    ) -> Result<Arc<dyn ServiceRegistration>, RegistryError> {
        if interfaces.is_empty() {
            return Err(RegistryError::NoInterfaces);
        }
        let service_id = self.next_service_id.fetch_add(1, Ordering::Relaxed);
        let reference = ServiceReference::new(service_id, interfaces, properties);
        self.services.insert(
            service_id,
            ServiceEntry {
                reference: reference.clone(),
                service,
            },
        );
        tracing::debug!(service_id, interfaces = ?interfaces, "service registered");

        self.fire(ServiceEventKind::Registered, &reference);
        Ok(Arc::new(LocalRegistration {
            registry: self.me.clone(),
            reference,
            unregistered: AtomicBool::new(false),
        }))
    }

    fn get_service(&self, reference: &ServiceReference) -> Option<ServiceObject> {
        self.services
            .get(&reference.service_id())
            .map(|e| Arc::clone(&e.value().service))
    }

    fn add_service_listener(&self, listener: Arc<dyn ServiceListener>) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    fn remove_service_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    fn framework_uuid(&self) -> String {
        self.framework_uuid.clone()
    }
}

struct LocalRegistration {
    registry: Weak<LocalServiceRegistry>,
    reference: ServiceReference,
    unregistered: AtomicBool,
}

impl ServiceRegistration for LocalRegistration {
    fn reference(&self) -> ServiceReference {
        self.reference.clone()
    }

    fn set_properties(&self, properties: Properties) -> Result<(), RegistryError> {
        let service_id = self.reference.service_id();
        if self.unregistered.load(Ordering::Acquire) {
            return Err(RegistryError::AlreadyUnregistered { service_id });
        }
        let registry = self
            .registry
            .upgrade()
            .ok_or(RegistryError::NotFound { service_id })?;
        self.reference.replace_properties(properties);
        registry.fire(ServiceEventKind::Modified, &self.reference);
        Ok(())
    }

    fn unregister(&self) -> Result<(), RegistryError> {
        let service_id = self.reference.service_id();
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return Err(RegistryError::AlreadyUnregistered { service_id });
        }
        let registry = self
            .registry
            .upgrade()
            .ok_or(RegistryError::NotFound { service_id })?;
        registry.fire(ServiceEventKind::Unregistering, &self.reference);
        registry.services.remove(&service_id);
        tracing::debug!(service_id, "service unregistered");
        Ok(())
    }
}
