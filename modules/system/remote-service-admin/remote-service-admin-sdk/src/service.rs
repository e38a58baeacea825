//! Host service registry model: references, registrations, events and listeners.
//!
//! The registry itself is a collaborator; the admin only needs the shapes below.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::constants::{OBJECTCLASS, SERVICE_ID};
use crate::error::RegistryError;
use crate::properties::{string_plus_property, Properties};

/// A registered service object, type-erased.
pub type ServiceObject = Arc<dyn Any + Send + Sync>;

/// Handle to a registered local service and its live property map.
///
/// Clones share the same property map, so `set_properties` on the owning
/// registration is visible through every clone. Equality is by service id.
#[derive(Clone)]
pub struct ServiceReference {
    inner: Arc<ReferenceInner>,
}

struct ReferenceInner {
    service_id: i64,
    properties: RwLock<Properties>,
}

impl ServiceReference {
    /// Creates a reference; `objectClass` and `service.id` are stamped into the map.
    #[must_use]
    pub fn new(service_id: i64, interfaces: &[String], properties: Properties) -> Self {
        let mut properties = properties;
        properties.insert(
            OBJECTCLASS.to_owned(),
            crate::properties::string_list(interfaces),
        );
        properties.insert(SERVICE_ID.to_owned(), Value::from(service_id));
        Self {
            inner: Arc::new(ReferenceInner {
                service_id,
                properties: RwLock::new(properties),
            }),
        }
    }

    #[must_use]
    pub fn service_id(&self) -> i64 {
        self.inner.service_id
    }

    /// Snapshot of the current properties.
    #[must_use]
    pub fn properties(&self) -> Properties {
        self.inner.properties.read().clone()
    }

    #[must_use]
    pub fn property(&self, key: &str) -> Option<Value> {
        self.inner.properties.read().get(key).cloned()
    }

    /// Interfaces the service is registered under (`objectClass`).
    #[must_use]
    pub fn interfaces(&self) -> Vec<String> {
        string_plus_property(&self.inner.properties.read(), OBJECTCLASS)
    }

    /// Replaces the properties, preserving `objectClass` and `service.id`.
    ///
    /// Intended for registry implementations; consumers go through
    /// [`ServiceRegistration::set_properties`].
    pub fn replace_properties(&self, properties: Properties) {
        let mut guard = self.inner.properties.write();
        let mut properties = properties;
        for key in [OBJECTCLASS, SERVICE_ID] {
            if let Some(v) = guard.get(key) {
                properties.insert(key.to_owned(), v.clone());
            }
        }
        *guard = properties;
    }
}

impl PartialEq for ServiceReference {
    fn eq(&self, other: &Self) -> bool {
        self.inner.service_id == other.inner.service_id
    }
}

impl Eq for ServiceReference {}

impl Hash for ServiceReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.service_id.hash(state);
    }
}

impl fmt::Debug for ServiceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceReference")
            .field("service_id", &self.inner.service_id)
            .field("interfaces", &self.interfaces())
            .finish()
    }
}

/// Owner-side handle of a registered service.
pub trait ServiceRegistration: Send + Sync {
    fn reference(&self) -> ServiceReference;

    /// Replaces the service properties and emits `MODIFIED`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::AlreadyUnregistered` after `unregister`.
    fn set_properties(&self, properties: Properties) -> Result<(), RegistryError>;

    /// Emits `UNREGISTERING` and removes the service.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::AlreadyUnregistered` on the second call.
    fn unregister(&self) -> Result<(), RegistryError>;
}

/// Kind of a local service lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceEventKind {
    Registered,
    Modified,
    Unregistering,
}

/// Local service lifecycle event.
#[derive(Debug, Clone)]
pub struct ServiceEvent {
    pub kind: ServiceEventKind,
    pub reference: ServiceReference,
}

impl ServiceEvent {
    #[must_use]
    pub fn new(kind: ServiceEventKind, reference: ServiceReference) -> Self {
        Self { kind, reference }
    }
}

/// Receives local service lifecycle events.
pub trait ServiceListener: Send + Sync {
    fn service_changed(&self, event: &ServiceEvent);
}

/// Token returned when a service listener is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// The subset of a host service registry the admin and its providers use.
pub trait ServiceRegistry: Send + Sync {
    /// Registers `service` under `interfaces`; emits `REGISTERED`.
    ///
    /// # Errors
    ///
    /// Implementations may refuse a registration (e.g. empty `interfaces`).
    fn register_service(
        &self,
        interfaces: &[String],
        service: ServiceObject,
        properties: Properties,
    ) -> Result<Arc<dyn ServiceRegistration>, RegistryError>;

    /// Returns the service object behind `reference`, if still registered.
    fn get_service(&self, reference: &ServiceReference) -> Option<ServiceObject>;

    fn add_service_listener(&self, listener: Arc<dyn ServiceListener>) -> ListenerId;

    fn remove_service_listener(&self, id: ListenerId) -> bool;

    /// Process-unique id of the hosting framework.
    fn framework_uuid(&self) -> String;
}
