//! Error types for remote service administration.
//!
//! Four families, matching who is expected to handle them:
//! - [`AdminError`]: malformed call arguments, returned synchronously to the caller.
//! - [`RemoteServiceFailure`]: selection or provider failures, captured inside a
//!   registration instead of being returned.
//! - [`ProviderError`]: what exporter/importer plug-ins report.
//! - [`RegistryError`]: what the host service registry reports.

use thiserror::Error;

/// Argument errors raised to the direct caller of an admin operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdminError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("missing required property '{0}'")]
    MissingProperty(String),

    #[error("interface '{interface}' is not provided by the service")]
    InterfaceNotProvided { interface: String },
}

impl AdminError {
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    #[must_use]
    pub fn missing_property(name: impl Into<String>) -> Self {
        Self::MissingProperty(name.into())
    }

    #[must_use]
    pub fn is_missing_property(&self) -> bool {
        matches!(self, Self::MissingProperty(_))
    }
}

/// Errors reported by the host service registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("service {service_id} is already unregistered")]
    AlreadyUnregistered { service_id: i64 },

    #[error("service {service_id} not found")]
    NotFound { service_id: i64 },

    #[error("a service must be registered under at least one interface")]
    NoInterfaces,
}

/// Errors reported by exporter and importer plug-ins.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("endpoint '{endpoint_id}' is already imported")]
    AlreadyImported { endpoint_id: String },

    #[error("provider is not active")]
    NotActive,

    #[error("endpoint '{endpoint_id}' is not known to the provider")]
    UnknownEndpoint { endpoint_id: String },

    #[error("service {service_id} is not available")]
    ServiceUnavailable { service_id: i64 },

    #[error("invalid endpoint properties: {0}")]
    InvalidEndpoint(#[from] AdminError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

impl ProviderError {
    #[must_use]
    pub fn unknown_endpoint(endpoint_id: impl Into<String>) -> Self {
        Self::UnknownEndpoint {
            endpoint_id: endpoint_id.into(),
        }
    }

    #[must_use]
    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::Transport(anyhow::anyhow!("{message}"))
    }
}

/// Failure captured in a failed export/import registration.
#[derive(Debug, Error)]
pub enum RemoteServiceFailure {
    #[error("no exporter for configs {configs:?}")]
    NoExporter { configs: Vec<String> },

    #[error("no importer for configs {configs:?}")]
    NoImporter { configs: Vec<String> },

    #[error("invalid endpoint description: {0}")]
    InvalidEndpoint(#[source] AdminError),

    #[error("provider '{provider_id}' failed: {source}")]
    Provider {
        provider_id: String,
        #[source]
        source: ProviderError,
    },
}

impl RemoteServiceFailure {
    #[must_use]
    pub fn provider(provider_id: impl Into<String>, source: ProviderError) -> Self {
        Self::Provider {
            provider_id: provider_id.into(),
            source,
        }
    }

    /// True for "no matching provider" failures.
    #[must_use]
    pub fn is_selection_error(&self) -> bool {
        matches!(self, Self::NoExporter { .. } | Self::NoImporter { .. })
    }

    #[must_use]
    pub fn is_provider_error(&self) -> bool {
        matches!(self, Self::Provider { .. })
    }
}
