#![allow(clippy::unwrap_used, clippy::expect_used, clippy::must_use_candidate, dead_code)]

//! Fixtures for topology tests: a counting exporter and importer, recording
//! advertisers and an admin wired to them.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use remote_service_admin::{
    AdminContext, EndpointDescription, Exporter, Importer, LocalServiceRegistry, Properties,
    ProviderError, ProviderList, RemoteServiceAdmin, RemoteServiceAdminConfig, ServiceReference,
    ServiceRegistry,
};
use remote_service_admin_sdk::constants::{
    ENDPOINT_FRAMEWORK_UUID, ENDPOINT_ID, ENDPOINT_SERVICE_ID, OBJECTCLASS,
    SERVICE_EXPORTED_CONFIGS, SERVICE_EXPORTED_INTERFACES, SERVICE_IMPORTED,
    SERVICE_IMPORTED_CONFIGS,
};
use remote_service_admin_sdk::properties::{extra_properties, string_list};
use remote_service_admin_sdk::{EndpointAdvertiser, ServiceRegistration};
use serde_json::json;

pub const CONFIG: &str = "demo.rpc";

// =============================================================================
// Providers
// =============================================================================

#[derive(Default)]
pub struct CountingExporter {
    pub exports: AtomicUsize,
    pub updates: AtomicUsize,
    pub unexports: AtomicUsize,
}

impl Exporter for CountingExporter {
    fn id(&self) -> &str {
        "counting.exporter"
    }

    fn handles(&self, configs: &[String]) -> bool {
        configs.iter().any(|c| c == CONFIG)
    }

    fn make_endpoint_props(
        &self,
        interfaces: &[String],
        reference: &ServiceReference,
        export_props: &Properties,
    ) -> Result<Properties, ProviderError> {
        let mut props = extra_properties(export_props);
        props.insert(
            ENDPOINT_ID.to_owned(),
            json!(format!("ep-{}", reference.service_id())),
        );
        props.insert(OBJECTCLASS.to_owned(), string_list(interfaces));
        props.insert(SERVICE_IMPORTED_CONFIGS.to_owned(), json!([CONFIG]));
        props.insert(ENDPOINT_SERVICE_ID.to_owned(), json!(reference.service_id()));
        Ok(props)
    }

    fn export_service(
        &self,
        _reference: &ServiceReference,
        endpoint_props: &Properties,
    ) -> Result<EndpointDescription, ProviderError> {
        self.exports.fetch_add(1, Ordering::SeqCst);
        Ok(EndpointDescription::from_properties(endpoint_props.clone())?)
    }

    fn update_service(&self, _description: &EndpointDescription) -> Result<bool, ProviderError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    fn unexport_service(&self, _description: &EndpointDescription) -> Result<bool, ProviderError> {
        self.unexports.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

/// Registers proxies in its own registry, tracked by endpoint id.
pub struct ProxyImporter {
    registry: Arc<LocalServiceRegistry>,
    proxies: Mutex<Vec<(String, Arc<dyn ServiceRegistration>)>>,
    pub fail_import: AtomicBool,
    pub imports: AtomicUsize,
    pub updates: AtomicUsize,
    pub unimports: AtomicUsize,
}

impl ProxyImporter {
    pub fn new(registry: Arc<LocalServiceRegistry>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            proxies: Mutex::new(Vec::new()),
            fail_import: AtomicBool::new(false),
            imports: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            unimports: AtomicUsize::new(0),
        })
    }
}

impl Importer for ProxyImporter {
    fn id(&self) -> &str {
        "proxy.importer"
    }

    fn handles(&self, configs: &[String]) -> bool {
        configs.iter().any(|c| c == CONFIG)
    }

    fn make_proxy_props(
        &self,
        description: &EndpointDescription,
    ) -> Result<Properties, ProviderError> {
        let mut props = extra_properties(description.properties());
        props.insert(SERVICE_IMPORTED.to_owned(), json!(true));
        props.insert(SERVICE_EXPORTED_CONFIGS.to_owned(), json!([CONFIG]));
        props.insert(ENDPOINT_ID.to_owned(), json!(description.id()));
        Ok(props)
    }

    fn import_service(
        &self,
        description: &EndpointDescription,
        proxy_props: &Properties,
    ) -> Result<Arc<dyn ServiceRegistration>, ProviderError> {
        self.imports.fetch_add(1, Ordering::SeqCst);
        if self.fail_import.load(Ordering::SeqCst) {
            return Err(ProviderError::transport("remote host unreachable"));
        }
        let registration =
            self.registry
                .register_service(description.interfaces(), Arc::new(()), proxy_props.clone())?;
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
        self.updates.fetch_add(1, Ordering::SeqCst);
        let proxy = self
            .proxies
            .lock()
            .iter()
            .find(|(id, _)| id == description.id())
            .map(|(_, r)| Arc::clone(r));
        let Some(proxy) = proxy else {
            return Ok(false);
        };
        proxy.set_properties(proxy_props.clone())?;
        Ok(true)
    }

    fn unimport_service(&self, description: &EndpointDescription) -> Result<bool, ProviderError> {
        self.unimports.fetch_add(1, Ordering::SeqCst);
        let mut proxies = self.proxies.lock();
        let Some(pos) = proxies.iter().position(|(id, _)| id == description.id()) else {
            return Ok(false);
        };
        let (_, proxy) = proxies.remove(pos);
        drop(proxies);
        proxy.unregister()?;
        Ok(true)
    }
}

// =============================================================================
// Advertisers
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advert {
    Advertised(String),
    Unadvertised(String),
}

#[derive(Default)]
pub struct RecordingAdvertiser {
    pub adverts: Mutex<Vec<Advert>>,
}

impl EndpointAdvertiser for RecordingAdvertiser {
    fn advertise_endpoint(&self, description: &EndpointDescription) -> anyhow::Result<()> {
        self.adverts
            .lock()
            .push(Advert::Advertised(description.id().to_owned()));
        Ok(())
    }

    fn unadvertise_endpoint(&self, endpoint_id: &str) -> anyhow::Result<()> {
        self.adverts
            .lock()
            .push(Advert::Unadvertised(endpoint_id.to_owned()));
        Ok(())
    }
}

/// Fails every call; panics instead when `panic` is set.
#[derive(Default)]
pub struct BrokenAdvertiser {
    pub panic: bool,
    pub calls: AtomicUsize,
}

impl EndpointAdvertiser for BrokenAdvertiser {
    fn advertise_endpoint(&self, _description: &EndpointDescription) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(!self.panic, "advertiser panics on purpose");
        anyhow::bail!("discovery backend is down")
    }

    fn unadvertise_endpoint(&self, _endpoint_id: &str) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(!self.panic, "advertiser panics on purpose");
        anyhow::bail!("discovery backend is down")
    }
}

// =============================================================================
// Builders
// =============================================================================

pub fn admin(
    exporter: &Arc<CountingExporter>,
    importer: &Arc<ProxyImporter>,
) -> Arc<RemoteServiceAdmin> {
    let exporters: Arc<ProviderList<dyn Exporter>> = Arc::new(ProviderList::new());
    exporters.bind(exporter.clone());
    let importers: Arc<ProviderList<dyn Importer>> = Arc::new(ProviderList::new());
    importers.bind(importer.clone());
    let admin = RemoteServiceAdmin::new(RemoteServiceAdminConfig::default(), exporters, importers);
    admin.activate(AdminContext::new("topology-test", Some("fw-local".to_owned())));
    admin
}

/// Registers a unit service that asks to be exported through [`CONFIG`].
pub fn register_exported(
    registry: &LocalServiceRegistry,
    interface: &str,
) -> Arc<dyn ServiceRegistration> {
    let mut props = Properties::new();
    props.insert(SERVICE_EXPORTED_INTERFACES.to_owned(), json!("*"));
    props.insert(SERVICE_EXPORTED_CONFIGS.to_owned(), json!([CONFIG]));
    props.insert("color".to_owned(), json!("blue"));
    registry
        .register_service(&[interface.to_owned()], Arc::new(()), props)
        .unwrap()
}

pub fn remote_endpoint(id: &str, service_id: i64, color: &str) -> EndpointDescription {
    let mut props = Properties::new();
    props.insert(ENDPOINT_ID.to_owned(), json!(id));
    props.insert(OBJECTCLASS.to_owned(), json!(["org.demo.Remote"]));
    props.insert(SERVICE_IMPORTED_CONFIGS.to_owned(), json!([CONFIG]));
    props.insert(ENDPOINT_SERVICE_ID.to_owned(), json!(service_id));
    props.insert(ENDPOINT_FRAMEWORK_UUID.to_owned(), json!("fw-remote"));
    props.insert("color".to_owned(), json!(color));
    EndpointDescription::from_properties(props).unwrap()
}
