#![allow(clippy::unwrap_used, clippy::expect_used, clippy::must_use_candidate, dead_code)]

//! Shared fixtures: counting fake providers, recording listeners and
//! helpers to build services and endpoint descriptions.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use remote_service_admin::{
    AdminContext, EndpointDescription, Exporter, Importer, LocalServiceRegistry, Properties,
    ProviderError, ProviderList, RemoteServiceAdmin, RemoteServiceAdminConfig,
    RemoteServiceAdminEvent, RemoteServiceAdminEventKind, RemoteServiceAdminListener,
    ServiceReference, ServiceRegistry,
};
use remote_service_admin_sdk::constants::{
    ENDPOINT_ID, ENDPOINT_SERVICE_ID, OBJECTCLASS, SERVICE_EXPORTED_CONFIGS,
    SERVICE_EXPORTED_INTERFACES, SERVICE_IMPORTED_CONFIGS,
};
use remote_service_admin_sdk::properties::string_list;
use remote_service_admin_sdk::ServiceRegistration;
use serde_json::{json, Value};

pub const DEMO_CONFIG: &str = "demo.rpc";

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

// =============================================================================
// Fake exporter
// =============================================================================

pub struct FakeExporter {
    id: String,
    configs: Vec<String>,
    pub fail_export: AtomicBool,
    pub fail_unexport: AtomicBool,
    pub fail_update: AtomicBool,
    pub make_props_calls: AtomicUsize,
    pub export_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub unexport_calls: AtomicUsize,
    pub bound_calls: AtomicUsize,
    pub unbound_calls: AtomicUsize,
}

impl FakeExporter {
    pub fn new(id: &str, configs: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_owned(),
            configs: strings(configs),
            fail_export: AtomicBool::new(false),
            fail_unexport: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            make_props_calls: AtomicUsize::new(0),
            export_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            unexport_calls: AtomicUsize::new(0),
            bound_calls: AtomicUsize::new(0),
            unbound_calls: AtomicUsize::new(0),
        })
    }

    pub fn exports(&self) -> usize {
        self.export_calls.load(Ordering::SeqCst)
    }

    pub fn unexports(&self) -> usize {
        self.unexport_calls.load(Ordering::SeqCst)
    }
}

impl Exporter for FakeExporter {
    fn id(&self) -> &str {
        &self.id
    }

    fn handles(&self, configs: &[String]) -> bool {
        self.configs.iter().any(|c| configs.contains(c))
    }

    fn make_endpoint_props(
        &self,
        interfaces: &[String],
        reference: &ServiceReference,
        export_props: &Properties,
    ) -> Result<Properties, ProviderError> {
        let n = self.make_props_calls.fetch_add(1, Ordering::SeqCst);
        let mut props = remote_service_admin_sdk::properties::extra_properties(export_props);
        props.insert(
            ENDPOINT_ID.to_owned(),
            json!(format!("{}:{}:{}", self.id, reference.service_id(), n)),
        );
        props.insert(OBJECTCLASS.to_owned(), string_list(interfaces));
        props.insert(SERVICE_IMPORTED_CONFIGS.to_owned(), string_list(&self.configs));
        props.insert(ENDPOINT_SERVICE_ID.to_owned(), json!(reference.service_id()));
        Ok(props)
    }

    fn export_service(
        &self,
        _reference: &ServiceReference,
        endpoint_props: &Properties,
    ) -> Result<EndpointDescription, ProviderError> {
        self.export_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_export.load(Ordering::SeqCst) {
            return Err(ProviderError::transport("export refused"));
        }
        Ok(EndpointDescription::from_properties(endpoint_props.clone())?)
    }

    fn update_service(&self, _description: &EndpointDescription) -> Result<bool, ProviderError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(ProviderError::transport("update refused"));
        }
        Ok(true)
    }

    fn unexport_service(&self, _description: &EndpointDescription) -> Result<bool, ProviderError> {
        self.unexport_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_unexport.load(Ordering::SeqCst) {
            return Err(ProviderError::transport("unexport refused"));
        }
        Ok(true)
    }

    fn bound(&self) {
        self.bound_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn unbound(&self) {
        self.unbound_calls.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Fake importer
// =============================================================================

/// Registers a unit proxy in a local registry for every import.
pub struct FakeImporter {
    id: String,
    configs: Vec<String>,
    registry: Arc<LocalServiceRegistry>,
    proxies: Mutex<Vec<(String, Arc<dyn ServiceRegistration>)>>,
    pub fail_import: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_unimport: AtomicBool,
    pub import_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub unimport_calls: AtomicUsize,
}

impl FakeImporter {
    pub fn new(id: &str, configs: &[&str], registry: Arc<LocalServiceRegistry>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_owned(),
            configs: strings(configs),
            registry,
            proxies: Mutex::new(Vec::new()),
            fail_import: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            fail_unimport: AtomicBool::new(false),
            import_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            unimport_calls: AtomicUsize::new(0),
        })
    }

    pub fn imports(&self) -> usize {
        self.import_calls.load(Ordering::SeqCst)
    }

    pub fn unimports(&self) -> usize {
        self.unimport_calls.load(Ordering::SeqCst)
    }
}

impl Importer for FakeImporter {
    fn id(&self) -> &str {
        &self.id
    }

    fn handles(&self, configs: &[String]) -> bool {
        self.configs.iter().any(|c| configs.contains(c))
    }

    fn make_proxy_props(
        &self,
        description: &EndpointDescription,
    ) -> Result<Properties, ProviderError> {
        let mut props =
            remote_service_admin_sdk::properties::extra_properties(description.properties());
        props.insert(ENDPOINT_ID.to_owned(), json!(description.id()));
        props.insert("proxy.importer".to_owned(), json!(self.id));
        Ok(props)
    }

    fn import_service(
        &self,
        description: &EndpointDescription,
        proxy_props: &Properties,
    ) -> Result<Arc<dyn ServiceRegistration>, ProviderError> {
        self.import_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_import.load(Ordering::SeqCst) {
            return Err(ProviderError::transport("import refused"));
        }
        let registration = self.registry.register_service(
            description.interfaces(),
            Arc::new(()),
            proxy_props.clone(),
        )?;
        self.proxies
            .lock()
            .push((description.id().to_owned(), Arc::clone(&registration)));
        Ok(registration)
    }

    fn update_service(
        &self,
        description: &EndpointDescription,
        proxy_props: &Properties,
    ) -> Result<bool, ProviderError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(ProviderError::transport("update refused"));
        }
        let proxies = self.proxies.lock();
        let Some((_, registration)) = proxies.iter().find(|(id, _)| id == description.id()) else {
            return Ok(false);
        };
        registration.set_properties(proxy_props.clone())?;
        Ok(true)
    }

    fn unimport_service(&self, description: &EndpointDescription) -> Result<bool, ProviderError> {
        self.unimport_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_unimport.load(Ordering::SeqCst) {
            return Err(ProviderError::transport("unimport refused"));
        }
        let mut proxies = self.proxies.lock();
        let Some(pos) = proxies.iter().position(|(id, _)| id == description.id()) else {
            return Ok(false);
        };
        let (_, registration) = proxies.remove(pos);
        drop(proxies);
        registration.unregister()?;
        Ok(true)
    }
}

// =============================================================================
// Listeners
// =============================================================================

/// Records `(kind, endpoint id, provider id)` for every event.
#[derive(Default)]
pub struct RecordingListener {
    pub events: Mutex<Vec<(RemoteServiceAdminEventKind, Option<String>, Option<String>)>>,
}

impl RecordingListener {
    pub fn kinds(&self) -> Vec<RemoteServiceAdminEventKind> {
        self.events.lock().iter().map(|(k, _, _)| *k).collect()
    }

    pub fn count(&self, kind: RemoteServiceAdminEventKind) -> usize {
        self.events.lock().iter().filter(|(k, _, _)| *k == kind).count()
    }
}

impl RemoteServiceAdminListener for RecordingListener {
    fn remote_admin_event(&self, event: &RemoteServiceAdminEvent) -> anyhow::Result<()> {
        self.events.lock().push((
            event.kind(),
            event.description().map(|d| d.id().to_owned()),
            event.provider_id().map(str::to_owned),
        ));
        Ok(())
    }
}

/// Fails on every event, counting the attempts.
#[derive(Default)]
pub struct FailingListener {
    pub calls: AtomicUsize,
}

impl RemoteServiceAdminListener for FailingListener {
    fn remote_admin_event(&self, _event: &RemoteServiceAdminEvent) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("listener always fails")
    }
}

// =============================================================================
// Builders
// =============================================================================

pub fn admin_with(
    exporters: &[Arc<FakeExporter>],
    importers: &[Arc<FakeImporter>],
) -> Arc<RemoteServiceAdmin> {
    let exporter_list: Arc<ProviderList<dyn Exporter>> = Arc::new(ProviderList::new());
    for exporter in exporters {
        exporter_list.bind(exporter.clone());
    }
    let importer_list: Arc<ProviderList<dyn Importer>> = Arc::new(ProviderList::new());
    for importer in importers {
        importer_list.bind(importer.clone());
    }
    let admin = RemoteServiceAdmin::new(
        RemoteServiceAdminConfig::default(),
        exporter_list,
        importer_list,
    );
    admin.activate(AdminContext::new("test-bundle", Some("fw-test".to_owned())));
    admin
}

pub fn export_props(interfaces: &[&str], configs: &[&str]) -> Properties {
    let mut props = Properties::new();
    props.insert(SERVICE_EXPORTED_INTERFACES.to_owned(), string_list(interfaces));
    props.insert(SERVICE_EXPORTED_CONFIGS.to_owned(), string_list(configs));
    props
}

/// Registers a unit service under `interfaces` that asks to be exported with `configs`.
pub fn register_exported(
    registry: &LocalServiceRegistry,
    interfaces: &[&str],
    configs: &[&str],
) -> Arc<dyn ServiceRegistration> {
    registry
        .register_service(&strings(interfaces), Arc::new(()), export_props(interfaces, configs))
        .unwrap()
}

/// Description of a service `service_id` hosted by the `remote-fw` framework.
pub fn remote_endpoint(
    id: &str,
    service_id: i64,
    interfaces: &[&str],
    configs: &[&str],
) -> EndpointDescription {
    let mut props = Properties::new();
    props.insert(ENDPOINT_ID.to_owned(), json!(id));
    props.insert(OBJECTCLASS.to_owned(), string_list(interfaces));
    props.insert(SERVICE_IMPORTED_CONFIGS.to_owned(), string_list(configs));
    props.insert(ENDPOINT_SERVICE_ID.to_owned(), json!(service_id));
    props.insert(
        remote_service_admin_sdk::constants::ENDPOINT_FRAMEWORK_UUID.to_owned(),
        json!("remote-fw"),
    );
    props.insert("color".to_owned(), Value::from("blue"));
    EndpointDescription::from_properties(props).unwrap()
}
