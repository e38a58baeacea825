//! Configuration for the remote service admin and the RPC provider bases.
//!
//! Sections are read leniently from a [`Figment`]: a missing section yields
//! `T::default()`, a present but malformed one is an error.

use figment::Figment;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Configuration error for typed section loading.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid config for section '{section}': {source}")]
    InvalidConfig {
        section: String,
        #[source]
        source: Box<figment::Error>,
    },
}

/// Loads `section` from `figment`, falling back to defaults when it is absent.
///
/// # Errors
/// Returns `ConfigError::InvalidConfig` if the section exists but cannot be deserialized.
pub fn section_or_default<T: DeserializeOwned + Default>(
    figment: &Figment,
    section: &str,
) -> Result<T, ConfigError> {
    let Ok(value) = figment.find_value(section) else {
        return Ok(T::default());
    };

    value.deserialize().map_err(|e| ConfigError::InvalidConfig {
        section: section.to_owned(),
        source: Box::new(e),
    })
}

/// Configuration for [`crate::RemoteServiceAdmin`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RemoteServiceAdminConfig {
    /// Framework id used to stamp endpoint metadata when the activation
    /// context does not carry one.
    pub framework_uuid: Option<String>,

    /// Log every admin event at debug level.
    pub log_events: bool,
}

impl RemoteServiceAdminConfig {
    pub const SECTION: &'static str = "remote_service_admin";

    /// # Errors
    /// Returns `ConfigError` if the section is present but invalid.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        section_or_default(figment, Self::SECTION)
    }
}

/// Configuration for [`crate::providers::RpcServiceExporter`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RpcExporterConfig {
    /// Provider id; also published as `ecf.endpoint.id`.
    pub id: String,
    /// Configuration types this exporter handles.
    pub exported_configs: Vec<String>,
    pub intents: Vec<String>,
    /// Namespace of the provider id (`ecf.endpoint.id.ns`).
    pub namespace: String,
}

impl Default for RpcExporterConfig {
    fn default() -> Self {
        Self {
            id: "rpc.exporter".to_owned(),
            exported_configs: Vec::new(),
            intents: Vec::new(),
            namespace: "org.eclipse.ecf.core.identity.StringID".to_owned(),
        }
    }
}

/// Configuration for [`crate::providers::RpcServiceImporter`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RpcImporterConfig {
    /// Provider id; a `urn:uuid:` id is generated when absent.
    pub id: Option<String>,
    /// Configuration types this importer can import.
    pub supported_configs: Vec<String>,
    pub namespace: String,
}

impl Default for RpcImporterConfig {
    fn default() -> Self {
        Self {
            id: None,
            supported_configs: Vec::new(),
            namespace: "org.eclipse.ecf.core.identity.StringID".to_owned(),
        }
    }
}
