//! Provider contracts implemented by transport plug-ins.
//!
//! The admin selects providers by configuration type through `handles`, then
//! drives them through the calls below. Providers may block on network I/O;
//! the admin imposes no timeout.

use std::sync::Arc;

use crate::endpoint::EndpointDescription;
use crate::error::ProviderError;
use crate::properties::Properties;
use crate::service::{ServiceReference, ServiceRegistration};

/// Makes local services remotely reachable.
pub trait Exporter: Send + Sync {
    /// Stable provider id.
    fn id(&self) -> &str;

    /// True iff the exporter's declared configuration types intersect `configs`.
    ///
    /// Must return `false` for empty input rather than fail.
    fn handles(&self, configs: &[String]) -> bool;

    /// Computes the endpoint properties for exporting `reference` as `interfaces`.
    ///
    /// Pure computation: no side effects on the transport.
    ///
    /// # Errors
    ///
    /// Provider-specific; the admin captures the error in a failed registration.
    fn make_endpoint_props(
        &self,
        interfaces: &[String],
        reference: &ServiceReference,
        export_props: &Properties,
    ) -> Result<Properties, ProviderError>;

    /// Makes the service reachable and returns the resulting description.
    ///
    /// # Errors
    ///
    /// Provider-specific; the admin captures the error in a failed registration.
    fn export_service(
        &self,
        reference: &ServiceReference,
        endpoint_props: &Properties,
    ) -> Result<EndpointDescription, ProviderError>;

    /// Pushes an updated description to the transport.
    ///
    /// # Errors
    ///
    /// Provider-specific.
    fn update_service(&self, description: &EndpointDescription) -> Result<bool, ProviderError>;

    /// Withdraws the endpoint; `Ok(false)` means nothing was exported under it.
    ///
    /// # Errors
    ///
    /// Provider-specific.
    fn unexport_service(&self, description: &EndpointDescription) -> Result<bool, ProviderError>;

    /// Called when the exporter becomes available to an admin.
    fn bound(&self) {}

    /// Called when the exporter is withdrawn from an admin.
    fn unbound(&self) {}
}

/// Turns remote endpoint descriptions into local proxies.
pub trait Importer: Send + Sync {
    fn id(&self) -> &str;

    /// True iff the importer's supported configuration types intersect `configs`.
    fn handles(&self, configs: &[String]) -> bool;

    /// Computes the properties of the local proxy for `description`.
    ///
    /// # Errors
    ///
    /// Provider-specific.
    fn make_proxy_props(
        &self,
        description: &EndpointDescription,
    ) -> Result<Properties, ProviderError>;

    /// Creates and registers a local proxy.
    ///
    /// # Errors
    ///
    /// `ProviderError::AlreadyImported` if the endpoint id already has a proxy.
    fn import_service(
        &self,
        description: &EndpointDescription,
        proxy_props: &Properties,
    ) -> Result<Arc<dyn ServiceRegistration>, ProviderError>;

    /// Applies new proxy properties; `Ok(false)` if the endpoint is not imported.
    ///
    /// # Errors
    ///
    /// Provider-specific.
    fn update_service(
        &self,
        description: &EndpointDescription,
        proxy_props: &Properties,
    ) -> Result<bool, ProviderError>;

    /// Unregisters the local proxy; `Ok(false)` if the endpoint is not imported.
    ///
    /// # Errors
    ///
    /// Provider-specific.
    fn unimport_service(&self, description: &EndpointDescription) -> Result<bool, ProviderError>;

    fn bound(&self) {}

    fn unbound(&self) {}
}
