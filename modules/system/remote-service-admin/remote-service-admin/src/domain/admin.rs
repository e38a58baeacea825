//! The admin coordinator: provider selection, export/import registries, events.

use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, ReentrantMutex};
use remote_service_admin_sdk::constants::{
    ENDPOINT_FRAMEWORK_UUID, SERVICE_EXPORTED_CONFIGS, SERVICE_EXPORTED_INTERFACES,
};
use remote_service_admin_sdk::properties::{exported_interfaces, merge, string_plus_property};
use remote_service_admin_sdk::{
    AdminError, EndpointDescription, Exporter, Importer, ListenerId, Properties,
    RemoteServiceFailure, ServiceReference,
};
use serde_json::Value;

use super::event::{
    EventBus, LoggingEventListener, RemoteServiceAdminEvent, RemoteServiceAdminEventKind,
    RemoteServiceAdminListener,
};
use super::export::ExportRegistration;
use super::import::ImportRegistration;
use super::provider_list::ProviderList;
use crate::config::RemoteServiceAdminConfig;

/// Source reported in events published while the admin is not activated.
pub const DEFAULT_SOURCE: &str = "remote-service-admin";

/// Identity of the hosting component, supplied on activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminContext {
    pub source: String,
    pub framework_uuid: Option<String>,
}

impl AdminContext {
    #[must_use]
    pub fn new(source: impl Into<String>, framework_uuid: Option<String>) -> Self {
        Self {
            source: source.into(),
            framework_uuid,
        }
    }
}

/// Coordinates exporters and importers and owns every registration they produce.
///
/// Built with [`RemoteServiceAdmin::new`], which returns an `Arc`: registrations
/// keep a weak back-reference to the admin that created them.
pub struct RemoteServiceAdmin {
    me: Weak<Self>,
    config: RemoteServiceAdminConfig,
    exporters: Arc<ProviderList<dyn Exporter>>,
    importers: Arc<ProviderList<dyn Importer>>,
    events: EventBus,
    exported: Mutex<Vec<Arc<ExportRegistration>>>,
    imported: Mutex<Vec<Arc<ImportRegistration>>>,
    // Serialize find-or-create per side. Events go out after release.
    // Re-entrant so a provider may call back into the admin.
    export_lock: ReentrantMutex<()>,
    import_lock: ReentrantMutex<()>,
    context: ArcSwapOption<AdminContext>,
}

impl RemoteServiceAdmin {
    #[must_use]
    pub fn new(
        config: RemoteServiceAdminConfig,
        exporters: Arc<ProviderList<dyn Exporter>>,
        importers: Arc<ProviderList<dyn Importer>>,
    ) -> Arc<Self> {
        let log_events = config.log_events;
        let admin = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            config,
            exporters,
            importers,
            events: EventBus::new(),
            exported: Mutex::new(Vec::new()),
            imported: Mutex::new(Vec::new()),
            export_lock: ReentrantMutex::new(()),
            import_lock: ReentrantMutex::new(()),
            context: ArcSwapOption::empty(),
        });
        if log_events {
            admin.events.add(Arc::new(LoggingEventListener));
        }
        admin
    }

    pub fn activate(&self, context: AdminContext) {
        tracing::info!(
            source = %context.source,
            framework_uuid = ?context.framework_uuid,
            "remote service admin activated"
        );
        self.context.store(Some(Arc::new(context)));
    }

    /// Closes every registration, exports first, and clears both registries.
    /// Registrations already closed get their failed teardown retried.
    pub fn deactivate(&self) {
        let exported = {
            let _guard = self.export_lock.lock();
            std::mem::take(&mut *self.exported.lock())
        };
        for registration in &exported {
            if !registration.close() {
                registration.retry_teardown();
            }
        }

        let imported = {
            let _guard = self.import_lock.lock();
            std::mem::take(&mut *self.imported.lock())
        };
        for registration in &imported {
            if !registration.close() {
                registration.retry_teardown();
            }
        }

        self.context.store(None);
        tracing::info!(
            exports = exported.len(),
            imports = imported.len(),
            "remote service admin deactivated"
        );
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.context.load().is_some()
    }

    #[must_use]
    pub fn exporters(&self) -> &Arc<ProviderList<dyn Exporter>> {
        &self.exporters
    }

    #[must_use]
    pub fn importers(&self) -> &Arc<ProviderList<dyn Importer>> {
        &self.importers
    }

    pub fn add_listener(&self, listener: Arc<dyn RemoteServiceAdminListener>) -> ListenerId {
        self.events.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.events.remove(id)
    }

    /// Snapshot of the export registry.
    #[must_use]
    pub fn exported_services(&self) -> Vec<Arc<ExportRegistration>> {
        self.exported.lock().clone()
    }

    /// Snapshot of the import registry.
    #[must_use]
    pub fn imported_services(&self) -> Vec<Arc<ImportRegistration>> {
        self.imported.lock().clone()
    }

    /// Open export registrations created for `reference`, across all
    /// exporters, failed ones included.
    #[must_use]
    pub fn export_registrations_for(
        &self,
        reference: &ServiceReference,
    ) -> Vec<Arc<ExportRegistration>> {
        self.exported_services()
            .into_iter()
            .filter(|r| r.matches(reference, None))
            .collect()
    }

    /// Exports `reference` through every exporter handling its configuration types.
    ///
    /// Provider failures come back as registrations carrying an exception; an
    /// exporter that already exports the service gets a new registration on the
    /// same endpoint.
    ///
    /// # Errors
    ///
    /// Returns `AdminError` when the service has no interfaces, when no exported
    /// interfaces or configuration types resolve, or when an exported interface is
    /// not provided by the service.
    pub fn export_service(
        &self,
        reference: &ServiceReference,
        overrides: Option<&Properties>,
    ) -> Result<Vec<Arc<ExportRegistration>>, AdminError> {
        let service_props = reference.properties();
        let object_class = reference.interfaces();
        if object_class.is_empty() {
            return Err(AdminError::invalid_argument(
                "service reference declares no interfaces",
            ));
        }

        let interfaces = exported_interfaces(&service_props, overrides);
        if interfaces.is_empty() {
            return Err(AdminError::missing_property(SERVICE_EXPORTED_INTERFACES));
        }
        if let Some(missing) = interfaces.iter().find(|i| !object_class.contains(i)) {
            return Err(AdminError::InterfaceNotProvided {
                interface: missing.clone(),
            });
        }

        let export_props = match overrides {
            Some(overrides) => merge(&[&service_props, overrides]),
            None => service_props,
        };
        let configs = string_plus_property(&export_props, SERVICE_EXPORTED_CONFIGS);
        if configs.is_empty() {
            return Err(AdminError::missing_property(SERVICE_EXPORTED_CONFIGS));
        }

        let exporters: Vec<_> = self
            .exporters
            .snapshot()
            .into_iter()
            .filter(|e| e.handles(&configs))
            .collect();
        let errored = EndpointDescription::for_error(&object_class);

        let mut announcements = Vec::new();
        let result = {
            let _guard = self.export_lock.lock();

            if exporters.is_empty() {
                tracing::warn!(
                    service_id = reference.service_id(),
                    configs = ?configs,
                    "no exporter for configs"
                );
                let registration = ExportRegistration::failed(
                    self.me.clone(),
                    reference.clone(),
                    RemoteServiceFailure::NoExporter { configs },
                    errored,
                );
                self.exported.lock().push(Arc::clone(&registration));
                return Ok(vec![registration]);
            }

            let mut result = Vec::with_capacity(exporters.len());
            for exporter in exporters {
                if let Some(shared) = self.share_export(reference, exporter.id()) {
                    tracing::debug!(
                        exporter_id = exporter.id(),
                        service_id = reference.service_id(),
                        registration_id = shared.id(),
                        "reusing exported endpoint"
                    );
                    self.exported.lock().push(Arc::clone(&shared));
                    result.push(shared);
                    continue;
                }

                let (registration, event) =
                    self.export_with(&exporter, reference, &interfaces, &export_props, &errored);
                announcements.push((event, registration.endpoint()));
                self.exported.lock().push(Arc::clone(&registration));
                result.push(registration);
            }
            result
        };

        for (event, endpoint) in announcements {
            self.publish(&event);
            if let Some(held) = endpoint.and_then(|e| e.mark_announced()) {
                self.publish(&held);
            }
        }
        Ok(result)
    }

    fn share_export(
        &self,
        reference: &ServiceReference,
        exporter_id: &str,
    ) -> Option<Arc<ExportRegistration>> {
        let snapshot = self.exported.lock().clone();
        snapshot
            .iter()
            .filter(|r| r.matches(reference, Some(exporter_id)))
            .find_map(|r| r.endpoint().and_then(|e| ExportRegistration::share(&e)))
    }

    fn export_with(
        &self,
        exporter: &Arc<dyn Exporter>,
        reference: &ServiceReference,
        interfaces: &[String],
        export_props: &Properties,
        errored: &EndpointDescription,
    ) -> (Arc<ExportRegistration>, RemoteServiceAdminEvent) {
        let exporter_id = exporter.id().to_owned();

        let outcome = exporter
            .make_endpoint_props(interfaces, reference, export_props)
            .map_err(|e| (RemoteServiceFailure::provider(&exporter_id, e), errored.clone()))
            .and_then(|mut props| {
                if !props.contains_key(ENDPOINT_FRAMEWORK_UUID)
                    && let Some(framework_uuid) = self.framework_uuid()
                {
                    props.insert(
                        ENDPOINT_FRAMEWORK_UUID.to_owned(),
                        Value::from(framework_uuid),
                    );
                }
                let computed = EndpointDescription::from_properties(props)
                    .map_err(|e| (RemoteServiceFailure::InvalidEndpoint(e), errored.clone()))?;
                exporter
                    .export_service(reference, computed.properties())
                    .map_err(|e| (RemoteServiceFailure::provider(&exporter_id, e), computed))
            });

        match outcome {
            Ok(description) => {
                tracing::info!(
                    exporter_id = %exporter_id,
                    endpoint_id = description.id(),
                    service_id = reference.service_id(),
                    "service exported"
                );
                let registration = ExportRegistration::exported(
                    self.me.clone(),
                    Arc::clone(exporter),
                    reference.clone(),
                    description.clone(),
                );
                let event = RemoteServiceAdminEvent::export(
                    RemoteServiceAdminEventKind::ExportRegistration,
                    self.source(),
                    Some(exporter_id),
                    registration.export_reference(),
                    None,
                    Some(description),
                );
                (registration, event)
            }
            Err((failure, errored)) => {
                tracing::warn!(
                    exporter_id = %exporter_id,
                    service_id = reference.service_id(),
                    error = %failure,
                    "export failed"
                );
                let registration = ExportRegistration::failed(
                    self.me.clone(),
                    reference.clone(),
                    failure,
                    errored.clone(),
                );
                let event = RemoteServiceAdminEvent::export(
                    RemoteServiceAdminEventKind::ExportError,
                    self.source(),
                    Some(exporter_id),
                    registration.export_reference(),
                    registration.exception(),
                    Some(errored),
                );
                (registration, event)
            }
        }
    }

    /// Imports `description` through the first importer handling its configuration types.
    ///
    /// Without a matching importer the returned registration carries the
    /// selection failure and is not kept in the registry. An endpoint that is
    /// already imported gets a new registration on the same local proxy.
    pub fn import_service(&self, description: &EndpointDescription) -> Arc<ImportRegistration> {
        let configs = description.configuration_types().to_vec();

        let Some(importer) = self
            .importers
            .snapshot()
            .into_iter()
            .find(|i| i.handles(&configs))
        else {
            tracing::warn!(
                endpoint_id = description.id(),
                configs = ?configs,
                "no importer for configs"
            );
            return ImportRegistration::failed(
                self.me.clone(),
                RemoteServiceFailure::NoImporter { configs },
                description.clone(),
            );
        };

        let guard = self.import_lock.lock();

        if let Some(shared) = self.share_import(description) {
            tracing::debug!(
                importer_id = importer.id(),
                endpoint_id = description.id(),
                registration_id = shared.id(),
                "reusing imported endpoint"
            );
            self.imported.lock().push(Arc::clone(&shared));
            return shared;
        }

        let importer_id = importer.id().to_owned();
        let outcome = importer
            .make_proxy_props(description)
            .and_then(|props| importer.import_service(description, &props));

        let (registration, event) = match outcome {
            Ok(proxy) => {
                tracing::info!(
                    importer_id = %importer_id,
                    endpoint_id = description.id(),
                    "endpoint imported"
                );
                let registration = ImportRegistration::imported(
                    self.me.clone(),
                    Arc::clone(&importer),
                    description.clone(),
                    proxy,
                );
                let event = RemoteServiceAdminEvent::import(
                    RemoteServiceAdminEventKind::ImportRegistration,
                    self.source(),
                    Some(importer_id),
                    registration.import_reference(),
                    None,
                    Some(description.clone()),
                );
                (registration, event)
            }
            Err(e) => {
                tracing::warn!(
                    importer_id = %importer_id,
                    endpoint_id = description.id(),
                    error = %e,
                    "import failed"
                );
                let registration = ImportRegistration::failed(
                    self.me.clone(),
                    RemoteServiceFailure::provider(&importer_id, e),
                    description.clone(),
                );
                let event = RemoteServiceAdminEvent::import(
                    RemoteServiceAdminEventKind::ImportError,
                    self.source(),
                    Some(importer_id),
                    registration.import_reference(),
                    registration.exception(),
                    Some(description.clone()),
                );
                (registration, event)
            }
        };

        let endpoint = registration.endpoint();
        self.imported.lock().push(Arc::clone(&registration));
        drop(guard);

        self.publish(&event);
        if let Some(held) = endpoint.and_then(|e| e.mark_announced()) {
            self.publish(&held);
        }
        registration
    }

    fn share_import(&self, description: &EndpointDescription) -> Option<Arc<ImportRegistration>> {
        let snapshot = self.imported.lock().clone();
        snapshot
            .iter()
            .find(|r| r.matches(description))
            .and_then(|r| r.endpoint())
            .and_then(|e| ImportRegistration::share(&e))
    }

    pub(crate) fn remove_exported(&self, registration_id: u64) {
        self.exported.lock().retain(|r| r.id() != registration_id);
    }

    pub(crate) fn remove_imported(&self, registration_id: u64) {
        self.imported.lock().retain(|r| r.id() != registration_id);
    }

    pub(crate) fn publish(&self, event: &RemoteServiceAdminEvent) {
        self.events.publish(event);
    }

    pub(crate) fn source(&self) -> String {
        self.context
            .load_full()
            .map_or_else(|| DEFAULT_SOURCE.to_owned(), |c| c.source.clone())
    }

    /// Framework id from the activation context, else from config.
    #[must_use]
    pub fn framework_uuid(&self) -> Option<String> {
        self.context
            .load_full()
            .and_then(|c| c.framework_uuid.clone())
            .or_else(|| self.config.framework_uuid.clone())
    }
}
