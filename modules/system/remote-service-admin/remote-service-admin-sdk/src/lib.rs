//! Remote Service Admin SDK
//!
//! Contracts shared by the admin, its transport providers and discovery:
//! - `EndpointDescription` and the property vocabulary
//! - the host service registry model (`ServiceReference`, `ServiceRegistry`, events)
//! - `Exporter` / `Importer` provider traits
//! - `EndpointAdvertiser` and endpoint discovery events
//! - error types
//!
//! ## Usage
//!
//! A transport plug-in implements `Exporter` and/or `Importer`:
//! ```ignore
//! use remote_service_admin_sdk::{Exporter, EndpointDescription, ProviderError};
//!
//! impl Exporter for MyExporter {
//!     fn id(&self) -> &str { "my.exporter" }
//!     fn handles(&self, configs: &[String]) -> bool { configs.iter().any(|c| c == "my.rpc") }
//!     // ...
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

pub mod constants;
pub mod discovery;
pub mod endpoint;
pub mod error;
pub mod properties;
pub mod provider;
pub mod service;

pub use discovery::{EndpointAdvertiser, EndpointEvent, EndpointEventKind, EndpointEventListener};
pub use endpoint::EndpointDescription;
pub use error::{AdminError, ProviderError, RegistryError, RemoteServiceFailure};
pub use properties::Properties;
pub use provider::{Exporter, Importer};
pub use service::{
    ListenerId, ServiceEvent, ServiceEventKind, ServiceListener, ServiceObject, ServiceReference,
    ServiceRegistration, ServiceRegistry,
};
