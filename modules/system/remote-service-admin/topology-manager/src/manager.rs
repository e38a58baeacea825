//! Topology manager: turns local service events into exports and export
//! events into advertisements.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use remote_service_admin::{
    RemoteServiceAdmin, RemoteServiceAdminEvent, RemoteServiceAdminEventKind,
    RemoteServiceAdminListener,
};
use remote_service_admin_sdk::constants::{SERVICE_EXPORTED_INTERFACES, SERVICE_IMPORTED};
use remote_service_admin_sdk::properties::{exported_interfaces, string_list};
use remote_service_admin_sdk::{
    EndpointAdvertiser, EndpointEvent, EndpointEventListener, ListenerId, Properties,
    ServiceEvent, ServiceEventKind, ServiceListener, ServiceReference, ServiceRegistry,
};
use serde_json::Value;

use crate::config::TopologyManagerConfig;
use crate::policy::{ImportPolicy, LoggingImportPolicy};

struct Binding {
    registry: Arc<dyn ServiceRegistry>,
    service_listener: ListenerId,
    admin_listener: ListenerId,
}

/// Reacts to three event sources:
/// - local service events: export on `REGISTERED`, update on `MODIFIED`,
///   close every export of the service on `UNREGISTERING`
/// - admin events: advertise on `EXPORT_REGISTRATION`, unadvertise on
///   `EXPORT_UNREGISTRATION`
/// - discovered endpoints: delegated to the [`ImportPolicy`]
///
/// While active, the registry and the admin hold the manager as a listener;
/// [`TopologyManager::deactivate`] releases both.
pub struct TopologyManager {
    me: Weak<Self>,
    admin: Arc<RemoteServiceAdmin>,
    config: TopologyManagerConfig,
    advertisers: RwLock<Vec<Arc<dyn EndpointAdvertiser>>>,
    endpoint_filters: RwLock<Vec<String>>,
    import_policy: Arc<dyn ImportPolicy>,
    binding: Mutex<Option<Binding>>,
}

impl TopologyManager {
    #[must_use]
    pub fn new(admin: Arc<RemoteServiceAdmin>, config: TopologyManagerConfig) -> Arc<Self> {
        Self::with_import_policy(admin, config, Arc::new(LoggingImportPolicy))
    }

    #[must_use]
    pub fn with_import_policy(
        admin: Arc<RemoteServiceAdmin>,
        config: TopologyManagerConfig,
        import_policy: Arc<dyn ImportPolicy>,
    ) -> Arc<Self> {
        let endpoint_filters = config.endpoint_filters.clone();
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            admin,
            config,
            advertisers: RwLock::new(Vec::new()),
            endpoint_filters: RwLock::new(endpoint_filters),
            import_policy,
            binding: Mutex::new(None),
        })
    }

    /// Starts listening to `registry` and to the admin.
    ///
    /// Services registered before activation are not exported.
    pub fn activate(&self, registry: Arc<dyn ServiceRegistry>) {
        let Some(me) = self.me.upgrade() else {
            return;
        };
        let mut binding = self.binding.lock();
        if binding.is_some() {
            tracing::warn!("topology manager already active");
            return;
        }
        let admin_listener = self.admin.add_listener(me.clone());
        let service_listener = registry.add_service_listener(me);
        *binding = Some(Binding {
            registry,
            service_listener,
            admin_listener,
        });
        tracing::info!(
            auto_export = self.config.auto_export,
            filters = self.endpoint_filters.read().len(),
            "topology manager activated"
        );
    }

    /// Stops listening, closes what the import policy holds and clears the
    /// endpoint filters.
    pub fn deactivate(&self) {
        let Some(binding) = self.binding.lock().take() else {
            return;
        };
        binding
            .registry
            .remove_service_listener(binding.service_listener);
        self.admin.remove_listener(binding.admin_listener);
        self.import_policy.close();
        self.endpoint_filters.write().clear();
        tracing::info!("topology manager deactivated");
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.binding.lock().is_some()
    }

    #[must_use]
    pub fn admin(&self) -> &Arc<RemoteServiceAdmin> {
        &self.admin
    }

    #[must_use]
    pub fn config(&self) -> &TopologyManagerConfig {
        &self.config
    }

    pub fn add_advertiser(&self, advertiser: Arc<dyn EndpointAdvertiser>) {
        self.advertisers.write().push(advertiser);
    }

    pub fn remove_advertiser(&self, advertiser: &Arc<dyn EndpointAdvertiser>) -> bool {
        let mut advertisers = self.advertisers.write();
        let before = advertisers.len();
        advertisers.retain(|a| !Arc::ptr_eq(a, advertiser));
        advertisers.len() != before
    }

    #[must_use]
    pub fn advertiser_count(&self) -> usize {
        self.advertisers.read().len()
    }

    #[must_use]
    pub fn endpoint_filters(&self) -> Vec<String> {
        self.endpoint_filters.read().clone()
    }

    pub fn set_endpoint_filters(&self, filters: Vec<String>) {
        *self.endpoint_filters.write() = filters;
    }

    fn service_registered(&self, reference: &ServiceReference) {
        if !self.config.auto_export {
            return;
        }
        let props = reference.properties();
        if props.get(SERVICE_IMPORTED).is_some_and(|v| v != &Value::Bool(false)) {
            return;
        }
        let interfaces = exported_interfaces(&props, None);
        if interfaces.is_empty() {
            return;
        }

        let mut overrides = Properties::new();
        overrides.insert(
            SERVICE_EXPORTED_INTERFACES.to_owned(),
            string_list(&interfaces),
        );
        match self.admin.export_service(reference, Some(&overrides)) {
            Ok(registrations) => {
                let failed = registrations
                    .iter()
                    .filter(|r| r.exception().is_some())
                    .count();
                tracing::debug!(
                    service_id = reference.service_id(),
                    exports = registrations.len(),
                    failed,
                    "exported registered service"
                );
            }
            Err(e) => {
                tracing::warn!(
                    service_id = reference.service_id(),
                    error = %e,
                    "cannot export registered service"
                );
            }
        }
    }

    fn service_modified(&self, reference: &ServiceReference) {
        for registration in self.admin.export_registrations_for(reference) {
            if registration.update(None).is_none() {
                tracing::debug!(
                    service_id = reference.service_id(),
                    registration_id = registration.id(),
                    "export not updated"
                );
            }
        }
    }

    fn service_unregistering(&self, reference: &ServiceReference) {
        for registration in self.admin.export_registrations_for(reference) {
            tracing::debug!(
                service_id = reference.service_id(),
                registration_id = registration.id(),
                "closing export of unregistering service"
            );
            registration.close();
        }
    }

    fn notify_advertisers(
        &self,
        endpoint_id: &str,
        action: &str,
        call: impl Fn(&dyn EndpointAdvertiser) -> anyhow::Result<()>,
    ) {
        let advertisers = self.advertisers.read().clone();
        for advertiser in advertisers {
            match catch_unwind(AssertUnwindSafe(|| call(advertiser.as_ref()))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(endpoint_id, action, error = %e, "advertiser failed");
                }
                Err(_) => {
                    tracing::warn!(endpoint_id, action, "advertiser panicked");
                }
            }
        }
    }
}

impl ServiceListener for TopologyManager {
    fn service_changed(&self, event: &ServiceEvent) {
        match event.kind {
            ServiceEventKind::Registered => self.service_registered(&event.reference),
            ServiceEventKind::Modified => self.service_modified(&event.reference),
            ServiceEventKind::Unregistering => self.service_unregistering(&event.reference),
        }
    }
}

impl RemoteServiceAdminListener for TopologyManager {
    fn remote_admin_event(&self, event: &RemoteServiceAdminEvent) -> anyhow::Result<()> {
        let Some(description) = event.description() else {
            return Ok(());
        };
        match event.kind() {
            RemoteServiceAdminEventKind::ExportRegistration => {
                self.notify_advertisers(description.id(), "advertise", |a| {
                    a.advertise_endpoint(description)
                });
            }
            RemoteServiceAdminEventKind::ExportUnregistration => {
                self.notify_advertisers(description.id(), "unadvertise", |a| {
                    a.unadvertise_endpoint(description.id())
                });
            }
            _ => {}
        }
        Ok(())
    }
}

impl EndpointEventListener for TopologyManager {
    fn endpoint_changed(&self, event: &EndpointEvent, matched_filter: Option<&str>) {
        let filters = self.endpoint_filters();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.import_policy
                .endpoint_changed(&self.admin, event, matched_filter, &filters)
        }));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(
                    endpoint_id = event.description.id(),
                    kind = ?event.kind,
                    error = %e,
                    "import policy failed"
                );
            }
            Err(_) => {
                tracing::error!(
                    endpoint_id = event.description.id(),
                    kind = ?event.kind,
                    "import policy panicked"
                );
            }
        }
    }
}
