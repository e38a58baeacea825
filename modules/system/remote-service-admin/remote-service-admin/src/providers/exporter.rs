//! Reusable exporter base: endpoint property assembly and lifecycle, with the
//! wire work delegated to an [`ExportTransport`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use remote_service_admin_sdk::constants::{
    ECF_ENDPOINT_CONTAINERID_NAMESPACE, ECF_ENDPOINT_ID, ECF_ENDPOINT_TIMESTAMP, ECF_RSVC_ID,
    ENDPOINT_FRAMEWORK_UUID, ENDPOINT_ID, ENDPOINT_SERVICE_ID, OBJECTCLASS,
    SERVICE_IMPORTED_CONFIGS, SERVICE_INTENTS,
};
use remote_service_admin_sdk::properties::{
    current_time_millis, extra_properties, merge, package_versions, string_list,
};
use remote_service_admin_sdk::{
    EndpointDescription, Exporter, ProviderError, Properties, ServiceObject, ServiceReference,
    ServiceRegistry,
};
use serde_json::Value;
use uuid::Uuid;

use crate::config::RpcExporterConfig;

static NEXT_REMOTE_SERVICE_ID: AtomicI64 = AtomicI64::new(1);

fn next_remote_service_id() -> i64 {
    NEXT_REMOTE_SERVICE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Transport-specific half of an exporter.
pub trait ExportTransport: Send + Sync {
    /// Makes `service` reachable under the endpoint described by `endpoint_props`.
    ///
    /// # Errors
    ///
    /// Transport-specific.
    fn export(&self, service: ServiceObject, endpoint_props: &Properties) -> anyhow::Result<()>;

    /// # Errors
    ///
    /// Transport-specific.
    fn update(&self, description: &EndpointDescription) -> anyhow::Result<bool>;

    /// # Errors
    ///
    /// Transport-specific.
    fn unexport(&self, description: &EndpointDescription) -> anyhow::Result<bool>;

    /// Provider-specific endpoint properties; they win over every generic one.
    fn extra_endpoint_props(&self, _export_props: &Properties) -> Properties {
        Properties::new()
    }
}

pub struct RpcServiceExporter<T> {
    config: RpcExporterConfig,
    registry: Arc<dyn ServiceRegistry>,
    transport: T,
    framework_uuid: RwLock<Option<String>>,
}

impl<T: ExportTransport> RpcServiceExporter<T> {
    #[must_use]
    pub fn new(
        config: RpcExporterConfig,
        registry: Arc<dyn ServiceRegistry>,
        transport: T,
    ) -> Self {
        Self {
            config,
            registry,
            transport,
            framework_uuid: RwLock::new(None),
        }
    }

    /// Starts accepting exports; stamps endpoints with the registry's framework id.
    pub fn activate(&self) {
        *self.framework_uuid.write() = Some(self.registry.framework_uuid());
        tracing::debug!(exporter_id = %self.config.id, "exporter activated");
    }

    pub fn deactivate(&self) {
        *self.framework_uuid.write() = None;
        tracing::debug!(exporter_id = %self.config.id, "exporter deactivated");
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.framework_uuid.read().is_some()
    }

    #[must_use]
    pub fn config(&self) -> &RpcExporterConfig {
        &self.config
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn rsa_props(&self, interfaces: &[String], reference: &ServiceReference) -> Properties {
        let mut props = Properties::new();
        props.insert(
            ENDPOINT_ID.to_owned(),
            Value::from(format!("urn:uuid:{}", Uuid::new_v4())),
        );
        props.insert(OBJECTCLASS.to_owned(), string_list(interfaces));
        props.insert(
            SERVICE_IMPORTED_CONFIGS.to_owned(),
            string_list(&self.config.exported_configs),
        );
        if !self.config.intents.is_empty() {
            props.insert(SERVICE_INTENTS.to_owned(), string_list(&self.config.intents));
        }
        props.insert(
            ENDPOINT_SERVICE_ID.to_owned(),
            Value::from(reference.service_id()),
        );
        if let Some(framework_uuid) = self.framework_uuid.read().clone() {
            props.insert(ENDPOINT_FRAMEWORK_UUID.to_owned(), Value::from(framework_uuid));
        }
        props
    }

    fn ecf_props(&self) -> Properties {
        let mut props = Properties::new();
        props.insert(ECF_ENDPOINT_ID.to_owned(), Value::from(self.config.id.clone()));
        props.insert(
            ECF_ENDPOINT_CONTAINERID_NAMESPACE.to_owned(),
            Value::from(self.config.namespace.clone()),
        );
        props.insert(ECF_RSVC_ID.to_owned(), Value::from(next_remote_service_id()));
        props.insert(
            ECF_ENDPOINT_TIMESTAMP.to_owned(),
            Value::from(current_time_millis()),
        );
        props
    }
}

impl<T: ExportTransport> Exporter for RpcServiceExporter<T> {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn handles(&self, configs: &[String]) -> bool {
        self.config
            .exported_configs
            .iter()
            .any(|c| configs.contains(c))
    }

    fn make_endpoint_props(
        &self,
        interfaces: &[String],
        reference: &ServiceReference,
        export_props: &Properties,
    ) -> Result<Properties, ProviderError> {
        let versions = package_versions(interfaces, export_props);
        let rsa = self.rsa_props(interfaces, reference);
        let ecf = self.ecf_props();
        let extra = extra_properties(export_props);
        let provider = self.transport.extra_endpoint_props(export_props);
        Ok(merge(&[&versions, &rsa, &ecf, &extra, &provider]))
    }

    fn export_service(
        &self,
        reference: &ServiceReference,
        endpoint_props: &Properties,
    ) -> Result<EndpointDescription, ProviderError> {
        if !self.is_active() {
            return Err(ProviderError::NotActive);
        }
        let service = self
            .registry
            .get_service(reference)
            .ok_or(ProviderError::ServiceUnavailable {
                service_id: reference.service_id(),
            })?;
        self.transport.export(service, endpoint_props)?;
        Ok(EndpointDescription::from_properties(endpoint_props.clone())?)
    }

    fn update_service(&self, description: &EndpointDescription) -> Result<bool, ProviderError> {
        Ok(self.transport.update(description)?)
    }

    fn unexport_service(&self, description: &EndpointDescription) -> Result<bool, ProviderError> {
        Ok(self.transport.unexport(description)?)
    }
}
