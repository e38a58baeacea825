//! Import side of the endpoint / reference / registration triad.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use remote_service_admin_sdk::properties::merge;
use remote_service_admin_sdk::{
    AdminError, EndpointDescription, Importer, ProviderError, RemoteServiceFailure,
    ServiceReference, ServiceRegistration,
};

use super::admin::RemoteServiceAdmin;
use super::event::{RemoteServiceAdminEvent, RemoteServiceAdminEventKind};
use super::{next_registration_id, EndpointClose};

struct EndpointState {
    importer: Option<Arc<dyn Importer>>,
    description: Option<EndpointDescription>,
    proxy: Option<Arc<dyn ServiceRegistration>>,
    active: Vec<u64>,
    tearing_down: bool,
    announced: bool,
    held_unregistration: Option<RemoteServiceAdminEvent>,
}

/// Single source of truth for one imported endpoint and its local proxy.
pub struct ImportEndpoint {
    admin: Weak<RemoteServiceAdmin>,
    state: Mutex<EndpointState>,
}

impl ImportEndpoint {
    fn new(
        admin: Weak<RemoteServiceAdmin>,
        importer: Arc<dyn Importer>,
        description: EndpointDescription,
        proxy: Arc<dyn ServiceRegistration>,
        registration_id: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            admin,
            state: Mutex::new(EndpointState {
                importer: Some(importer),
                description: Some(description),
                proxy: Some(proxy),
                active: vec![registration_id],
                tearing_down: false,
                announced: false,
                held_unregistration: None,
            }),
        })
    }

    #[must_use]
    pub fn importer_id(&self) -> Option<String> {
        self.state.lock().importer.as_ref().map(|i| i.id().to_owned())
    }

    /// Reference of the local proxy service.
    #[must_use]
    pub fn reference(&self) -> Option<ServiceReference> {
        let proxy = self.state.lock().proxy.clone();
        proxy.map(|p| p.reference())
    }

    #[must_use]
    pub fn description(&self) -> Option<EndpointDescription> {
        self.state.lock().description.clone()
    }

    #[must_use]
    pub fn active_registrations(&self) -> usize {
        self.state.lock().active.len()
    }

    /// True while the endpoint is held and `description` names the same remote service.
    fn matches(&self, description: &EndpointDescription) -> bool {
        let state = self.state.lock();
        if state.active.is_empty() {
            return false;
        }
        state
            .description
            .as_ref()
            .is_some_and(|d| d.is_same_service(description))
    }

    fn add_registration(&self, registration_id: u64) -> bool {
        let mut state = self.state.lock();
        if state.active.is_empty() || state.importer.is_none() {
            return false;
        }
        state.active.push(registration_id);
        true
    }

    pub(crate) fn close(&self, registration_id: u64) -> EndpointClose {
        let (importer, description) = {
            let mut state = self.state.lock();
            let Some(pos) = state.active.iter().position(|id| *id == registration_id) else {
                return EndpointClose::AlreadyRemoved;
            };
            state.active.remove(pos);
            if !state.active.is_empty() {
                return EndpointClose::Released;
            }
            let Some(target) = begin_teardown(&mut state) else {
                return EndpointClose::AlreadyRemoved;
            };
            target
        };
        self.teardown(&importer, &description)
    }

    pub(crate) fn retry_teardown(&self) -> EndpointClose {
        let (importer, description) = {
            let mut state = self.state.lock();
            if !state.active.is_empty() {
                return EndpointClose::Released;
            }
            let Some(target) = begin_teardown(&mut state) else {
                return EndpointClose::AlreadyRemoved;
            };
            target
        };
        self.teardown(&importer, &description)
    }

    fn teardown(
        &self,
        importer: &Arc<dyn Importer>,
        description: &EndpointDescription,
    ) -> EndpointClose {
        let unimported = match importer.unimport_service(description) {
            Ok(true) => true,
            Ok(false) => {
                tracing::error!(
                    importer_id = importer.id(),
                    endpoint_id = description.id(),
                    "importer did not hold the endpoint on unimport"
                );
                false
            }
            Err(e) => {
                tracing::error!(
                    importer_id = importer.id(),
                    endpoint_id = description.id(),
                    error = %e,
                    "failed to unimport endpoint"
                );
                false
            }
        };

        let mut state = self.state.lock();
        state.tearing_down = false;
        if !unimported {
            return EndpointClose::TeardownFailed;
        }
        state.importer = None;
        state.description = None;
        state.proxy = None;
        tracing::debug!(
            importer_id = importer.id(),
            endpoint_id = description.id(),
            "endpoint unimported"
        );
        EndpointClose::TornDown
    }

    /// Records that `IMPORT_REGISTRATION` went out; returns the held
    /// unregistration, if any.
    pub(crate) fn mark_announced(&self) -> Option<RemoteServiceAdminEvent> {
        let mut state = self.state.lock();
        state.announced = true;
        state.held_unregistration.take()
    }

    fn release_unregistration(
        &self,
        event: RemoteServiceAdminEvent,
    ) -> Option<RemoteServiceAdminEvent> {
        let mut state = self.state.lock();
        if state.announced {
            return Some(event);
        }
        state.held_unregistration = Some(event);
        None
    }

    /// Applies a newer description of the remote endpoint.
    ///
    /// The stored properties are overlaid with `update`'s, the proxy properties
    /// are recomputed and handed to the importer.
    fn update(
        &self,
        update: &EndpointDescription,
    ) -> Result<EndpointDescription, RemoteServiceFailure> {
        let (importer, mut description) = {
            let state = self.state.lock();
            let (Some(i), Some(d)) = (&state.importer, &state.description) else {
                return Err(RemoteServiceFailure::InvalidEndpoint(
                    AdminError::invalid_argument("endpoint is closed"),
                ));
            };
            (Arc::clone(i), d.clone())
        };

        let merged = merge(&[description.properties(), update.properties()]);
        description
            .update(merged)
            .map_err(RemoteServiceFailure::InvalidEndpoint)?;

        let proxy_props = importer
            .make_proxy_props(&description)
            .map_err(|e| RemoteServiceFailure::provider(importer.id(), e))?;
        match importer.update_service(&description, &proxy_props) {
            Ok(true) => {}
            Ok(false) => {
                return Err(RemoteServiceFailure::provider(
                    importer.id(),
                    ProviderError::unknown_endpoint(description.id()),
                ));
            }
            Err(e) => return Err(RemoteServiceFailure::provider(importer.id(), e)),
        }

        let mut state = self.state.lock();
        if state.description.is_some() {
            state.description = Some(description.clone());
        }
        Ok(description)
    }
}

fn begin_teardown(state: &mut EndpointState) -> Option<(Arc<dyn Importer>, EndpointDescription)> {
    if state.tearing_down {
        return None;
    }
    let (Some(importer), Some(description)) = (&state.importer, &state.description) else {
        return None;
    };
    let target = (Arc::clone(importer), description.clone());
    state.tearing_down = true;
    Some(target)
}

impl fmt::Debug for ImportEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ImportEndpoint")
            .field("importer", &state.importer.as_ref().map(|i| i.id().to_owned()))
            .field("endpoint_id", &state.description.as_ref().map(EndpointDescription::id))
            .field("active", &state.active)
            .finish()
    }
}

#[derive(Debug, Clone)]
enum ImportTarget {
    Endpoint(Arc<ImportEndpoint>),
    Failure {
        exception: Arc<RemoteServiceFailure>,
        errored: EndpointDescription,
    },
}

/// Read-only view of an import: a live endpoint or a captured failure.
#[derive(Debug, Clone)]
pub struct ImportReference {
    target: ImportTarget,
}

impl ImportReference {
    fn from_endpoint(endpoint: Arc<ImportEndpoint>) -> Self {
        Self {
            target: ImportTarget::Endpoint(endpoint),
        }
    }

    fn from_failure(exception: Arc<RemoteServiceFailure>, errored: EndpointDescription) -> Self {
        Self {
            target: ImportTarget::Failure { exception, errored },
        }
    }

    #[must_use]
    pub fn importer_id(&self) -> Option<String> {
        match &self.target {
            ImportTarget::Endpoint(e) => e.importer_id(),
            ImportTarget::Failure { .. } => None,
        }
    }

    #[must_use]
    pub fn reference(&self) -> Option<ServiceReference> {
        match &self.target {
            ImportTarget::Endpoint(e) => e.reference(),
            ImportTarget::Failure { .. } => None,
        }
    }

    #[must_use]
    pub fn description(&self) -> Option<EndpointDescription> {
        match &self.target {
            ImportTarget::Endpoint(e) => e.description(),
            ImportTarget::Failure { errored, .. } => Some(errored.clone()),
        }
    }

    #[must_use]
    pub fn exception(&self) -> Option<Arc<RemoteServiceFailure>> {
        match &self.target {
            ImportTarget::Endpoint(_) => None,
            ImportTarget::Failure { exception, .. } => Some(Arc::clone(exception)),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> Option<&Arc<ImportEndpoint>> {
        match &self.target {
            ImportTarget::Endpoint(e) => Some(e),
            ImportTarget::Failure { .. } => None,
        }
    }
}

struct RegistrationState {
    reference: Option<ImportReference>,
    closed: bool,
    update_failure: Option<Arc<RemoteServiceFailure>>,
    failed_teardown: Option<ImportReference>,
}

/// Caller-held claim on an imported endpoint (or on a captured failure).
pub struct ImportRegistration {
    id: u64,
    admin: Weak<RemoteServiceAdmin>,
    state: Mutex<RegistrationState>,
}

impl ImportRegistration {
    fn with_reference(
        id: u64,
        admin: Weak<RemoteServiceAdmin>,
        reference: ImportReference,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            admin,
            state: Mutex::new(RegistrationState {
                reference: Some(reference),
                closed: false,
                update_failure: None,
                failed_teardown: None,
            }),
        })
    }

    pub(crate) fn imported(
        admin: Weak<RemoteServiceAdmin>,
        importer: Arc<dyn Importer>,
        description: EndpointDescription,
        proxy: Arc<dyn ServiceRegistration>,
    ) -> Arc<Self> {
        let id = next_registration_id();
        let endpoint = ImportEndpoint::new(admin.clone(), importer, description, proxy, id);
        Self::with_reference(id, admin, ImportReference::from_endpoint(endpoint))
    }

    pub(crate) fn failed(
        admin: Weak<RemoteServiceAdmin>,
        exception: RemoteServiceFailure,
        errored: EndpointDescription,
    ) -> Arc<Self> {
        Self::with_reference(
            next_registration_id(),
            admin,
            ImportReference::from_failure(Arc::new(exception), errored),
        )
    }

    pub(crate) fn share(endpoint: &Arc<ImportEndpoint>) -> Option<Arc<Self>> {
        let id = next_registration_id();
        if !endpoint.add_registration(id) {
            return None;
        }
        Some(Self::with_reference(
            id,
            endpoint.admin.clone(),
            ImportReference::from_endpoint(Arc::clone(endpoint)),
        ))
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    #[must_use]
    pub fn import_reference(&self) -> Option<ImportReference> {
        self.state.lock().reference.clone()
    }

    #[must_use]
    pub fn importer_id(&self) -> Option<String> {
        self.import_reference().and_then(|r| r.importer_id())
    }

    /// Reference of the local proxy service.
    #[must_use]
    pub fn reference(&self) -> Option<ServiceReference> {
        self.import_reference().and_then(|r| r.reference())
    }

    #[must_use]
    pub fn description(&self) -> Option<EndpointDescription> {
        self.import_reference().and_then(|r| r.description())
    }

    #[must_use]
    pub fn exception(&self) -> Option<Arc<RemoteServiceFailure>> {
        let state = self.state.lock();
        state
            .reference
            .as_ref()
            .and_then(ImportReference::exception)
            .or_else(|| state.update_failure.clone())
    }

    pub(crate) fn endpoint(&self) -> Option<Arc<ImportEndpoint>> {
        let state = self.state.lock();
        if state.closed {
            return None;
        }
        state.reference.as_ref().and_then(|r| r.endpoint().cloned())
    }

    /// True when this open registration holds an endpoint for the same remote service.
    pub(crate) fn matches(&self, description: &EndpointDescription) -> bool {
        self.endpoint().is_some_and(|e| e.matches(description))
    }

    /// Applies a newer description of the imported endpoint.
    ///
    /// Publishes `IMPORT_UPDATE`, or `IMPORT_WARNING` with the recorded failure.
    pub fn update(&self, description: &EndpointDescription) -> Option<EndpointDescription> {
        let endpoint = self.endpoint()?;
        let importer_id = endpoint.importer_id();

        let (kind, updated, exception) = match endpoint.update(description) {
            Ok(updated) => {
                self.state.lock().update_failure = None;
                (RemoteServiceAdminEventKind::ImportUpdate, Some(updated), None)
            }
            Err(failure) => {
                tracing::warn!(
                    registration_id = self.id,
                    endpoint_id = description.id(),
                    error = %failure,
                    "import update failed"
                );
                let failure = Arc::new(failure);
                self.state.lock().update_failure = Some(Arc::clone(&failure));
                (RemoteServiceAdminEventKind::ImportWarning, None, Some(failure))
            }
        };
        let event_description = updated.clone().or_else(|| endpoint.description());

        if let Some(admin) = self.admin.upgrade() {
            admin.publish(&RemoteServiceAdminEvent::import(
                kind,
                admin.source(),
                importer_id,
                self.import_reference(),
                exception,
                event_description,
            ));
        }
        updated
    }

    /// Releases this registration's claim on its endpoint.
    ///
    /// Returns `false` if already closed. Publishes `IMPORT_UNREGISTRATION`
    /// only when this close unimported the endpoint. A refused unimport
    /// leaves the registration listed for [`Self::retry_teardown`].
    pub fn close(&self) -> bool {
        let reference = {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
            let Some(reference) = state.reference.take() else {
                return true;
            };
            reference
        };
        let provider_id = reference.importer_id();
        let description = reference.description();

        let outcome = match reference.endpoint() {
            Some(endpoint) => endpoint.close(self.id),
            None => EndpointClose::AlreadyRemoved,
        };
        tracing::debug!(
            registration_id = self.id,
            outcome = ?outcome,
            "import registration closed"
        );

        if outcome == EndpointClose::TeardownFailed {
            self.state.lock().failed_teardown = Some(reference);
            return true;
        }
        self.finish_close(outcome, provider_id, description, reference);
        true
    }

    /// Retries the unimport after a close the importer refused.
    pub fn retry_teardown(&self) -> bool {
        let Some(reference) = self.state.lock().failed_teardown.clone() else {
            return false;
        };
        let Some(endpoint) = reference.endpoint() else {
            return false;
        };
        let provider_id = reference.importer_id();
        let description = reference.description();

        let outcome = endpoint.retry_teardown();
        tracing::debug!(registration_id = self.id, outcome = ?outcome, "import teardown retried");
        if outcome != EndpointClose::TornDown {
            return false;
        }
        self.state.lock().failed_teardown = None;
        self.finish_close(outcome, provider_id, description, reference);
        true
    }

    fn finish_close(
        &self,
        outcome: EndpointClose,
        provider_id: Option<String>,
        description: Option<EndpointDescription>,
        reference: ImportReference,
    ) {
        let Some(admin) = self.admin.upgrade() else {
            return;
        };
        admin.remove_imported(self.id);
        if outcome != EndpointClose::TornDown {
            return;
        }
        let endpoint = reference.endpoint().cloned();
        let event = RemoteServiceAdminEvent::import(
            RemoteServiceAdminEventKind::ImportUnregistration,
            admin.source(),
            provider_id,
            Some(reference),
            None,
            description,
        );
        let ready = match endpoint {
            Some(endpoint) => endpoint.release_unregistration(event),
            None => Some(event),
        };
        if let Some(event) = ready {
            admin.publish(&event);
        }
    }
}

impl fmt::Debug for ImportRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ImportRegistration")
            .field("id", &self.id)
            .field("closed", &state.closed)
            .field("reference", &state.reference)
            .finish_non_exhaustive()
    }
}
