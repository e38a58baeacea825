//! Reusable importer base: proxy property assembly and local proxy tracking,
//! with proxy creation delegated to an [`ImportTransport`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use remote_service_admin_sdk::constants::{
    ENDPOINT_ID, SERVICE_EXPORTED_CONFIGS, SERVICE_IMPORTED, SERVICE_INTENTS,
};
use remote_service_admin_sdk::properties::{extra_properties, string_list};
use remote_service_admin_sdk::{
    EndpointDescription, Importer, ProviderError, Properties, ServiceObject,
    ServiceRegistration, ServiceRegistry,
};
use serde_json::Value;
use uuid::Uuid;

use crate::config::RpcImporterConfig;

/// Transport-specific half of an importer.
pub trait ImportTransport: Send + Sync {
    /// Creates the local proxy object for `description`.
    ///
    /// # Errors
    ///
    /// Transport-specific.
    fn get_service_proxy(&self, description: &EndpointDescription) -> anyhow::Result<ServiceObject>;

    /// Releases transport resources held for `description`.
    ///
    /// # Errors
    ///
    /// Transport-specific.
    fn unget_service_proxy(&self, _description: &EndpointDescription) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct RpcServiceImporter<T> {
    id: String,
    config: RpcImporterConfig,
    registry: Arc<dyn ServiceRegistry>,
    transport: T,
    registrations: Mutex<HashMap<String, Arc<dyn ServiceRegistration>>>,
}

impl<T: ImportTransport> RpcServiceImporter<T> {
    #[must_use]
    pub fn new(
        config: RpcImporterConfig,
        registry: Arc<dyn ServiceRegistry>,
        transport: T,
    ) -> Self {
        let id = config
            .id
            .clone()
            .unwrap_or_else(|| format!("urn:uuid:{}", Uuid::new_v4()));
        Self {
            id,
            config,
            registry,
            transport,
            registrations: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Local proxy registration for `endpoint_id`, if imported.
    #[must_use]
    pub fn registration(&self, endpoint_id: &str) -> Option<Arc<dyn ServiceRegistration>> {
        self.registrations.lock().get(endpoint_id).cloned()
    }

    #[must_use]
    pub fn imported_count(&self) -> usize {
        self.registrations.lock().len()
    }

    /// Unregisters every local proxy this importer created.
    pub fn deactivate(&self) {
        let registrations: Vec<_> = self.registrations.lock().drain().collect();
        for (endpoint_id, registration) in registrations {
            if let Err(e) = registration.unregister() {
                tracing::warn!(
                    importer_id = %self.id,
                    endpoint_id = %endpoint_id,
                    error = %e,
                    "failed to unregister proxy"
                );
            }
        }
        tracing::debug!(importer_id = %self.id, "importer deactivated");
    }
}

impl<T: ImportTransport> Importer for RpcServiceImporter<T> {
    fn id(&self) -> &str {
        &self.id
    }

    fn handles(&self, configs: &[String]) -> bool {
        self.config
            .supported_configs
            .iter()
            .any(|c| configs.contains(c))
    }

    fn make_proxy_props(
        &self,
        description: &EndpointDescription,
    ) -> Result<Properties, ProviderError> {
        let mut props = extra_properties(description.properties());
        if !description.intents().is_empty() {
            props.insert(SERVICE_INTENTS.to_owned(), string_list(description.intents()));
        }
        props.insert(SERVICE_IMPORTED.to_owned(), Value::Bool(true));
        props.insert(
            SERVICE_EXPORTED_CONFIGS.to_owned(),
            string_list(&self.config.supported_configs),
        );
        props.insert(ENDPOINT_ID.to_owned(), Value::from(description.id()));
        Ok(props)
    }

    fn import_service(
        &self,
        description: &EndpointDescription,
        proxy_props: &Properties,
    ) -> Result<Arc<dyn ServiceRegistration>, ProviderError> {
        let endpoint_id = description.id().to_owned();
        if self.registrations.lock().contains_key(&endpoint_id) {
            return Err(ProviderError::AlreadyImported { endpoint_id });
        }

        let proxy = self.transport.get_service_proxy(description)?;
        let registration =
            self.registry
                .register_service(description.interfaces(), proxy, proxy_props.clone())?;

        let mut registrations = self.registrations.lock();
        if registrations.contains_key(&endpoint_id) {
            drop(registrations);
            // Lost a race against a concurrent import of the same endpoint.
            registration.unregister()?;
            return Err(ProviderError::AlreadyImported { endpoint_id });
        }
        registrations.insert(endpoint_id, Arc::clone(&registration));
        Ok(registration)
    }

    fn update_service(
        &self,
        description: &EndpointDescription,
        proxy_props: &Properties,
    ) -> Result<bool, ProviderError> {
        let Some(registration) = self.registration(description.id()) else {
            return Ok(false);
        };
        registration.set_properties(proxy_props.clone())?;
        Ok(true)
    }

    fn unimport_service(&self, description: &EndpointDescription) -> Result<bool, ProviderError> {
        let Some(registration) = self.registrations.lock().remove(description.id()) else {
            return Ok(false);
        };
        if let Err(e) = self.transport.unget_service_proxy(description) {
            tracing::warn!(
                importer_id = %self.id,
                endpoint_id = description.id(),
                error = %e,
                "failed to release service proxy"
            );
        }
        registration.unregister()?;
        Ok(true)
    }
}
