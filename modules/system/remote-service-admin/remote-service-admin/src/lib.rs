//! Remote Service Admin
//!
//! Turns local services into remote endpoints (export) and remote endpoint
//! descriptions into local proxies (import) through pluggable providers.
//! Contracts live in `remote-service-admin-sdk` and are re-exported here.
//!
//! ## Architecture
//!
//! - **Coordinator**: `RemoteServiceAdmin` selects providers by configuration
//!   type and owns the export/import registries
//! - **Triads**: endpoint (one remote binding), reference (endpoint or captured
//!   failure), registration (caller handle, one refcount slot)
//! - **Events**: `RemoteServiceAdminEvent` delivered synchronously with
//!   per-listener isolation
//! - **Providers**: `RpcServiceExporter` / `RpcServiceImporter` bases over a
//!   transport trait

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

// === PUBLIC API (from SDK) ===
pub use remote_service_admin_sdk::{
    AdminError, EndpointDescription, Exporter, Importer, Properties, ProviderError,
    RegistryError, RemoteServiceFailure, ServiceReference, ServiceRegistry,
};

// === CONFIGURATION ===
pub mod config;
pub use config::{ConfigError, RemoteServiceAdminConfig, RpcExporterConfig, RpcImporterConfig};

// === DOMAIN ===
pub mod domain;
pub use domain::admin::{AdminContext, DEFAULT_SOURCE};
pub use domain::{
    ExportReference, ExportRegistration, ImportReference, ImportRegistration,
    LoggingEventListener, ProviderList, RemoteServiceAdmin, RemoteServiceAdminEvent,
    RemoteServiceAdminEventKind, RemoteServiceAdminListener,
};

// === PROVIDERS ===
pub mod providers;

// === IN-PROCESS REGISTRY ===
pub mod registry;
pub use registry::LocalServiceRegistry;
