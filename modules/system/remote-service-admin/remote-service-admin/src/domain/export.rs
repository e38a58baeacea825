//! Export side of the endpoint / reference / registration triad.
//!
//! One `ExportEndpoint` per concrete remote binding, shared by every
//! `ExportRegistration` that claims it. The endpoint is unexported at the
//! provider exactly when its last active registration closes.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use remote_service_admin_sdk::properties::{extra_properties, merge};
use remote_service_admin_sdk::{
    AdminError, EndpointDescription, Exporter, ProviderError, Properties, RemoteServiceFailure,
    ServiceReference,
};

use super::admin::RemoteServiceAdmin;
use super::event::{RemoteServiceAdminEvent, RemoteServiceAdminEventKind};
use super::{next_registration_id, EndpointClose};

struct EndpointState {
    exporter: Option<Arc<dyn Exporter>>,
    description: Option<EndpointDescription>,
    reference: Option<ServiceReference>,
    active: Vec<u64>,
    tearing_down: bool,
    announced: bool,
    held_unregistration: Option<RemoteServiceAdminEvent>,
}

/// Single source of truth for one exported binding.
pub struct ExportEndpoint {
    admin: Weak<RemoteServiceAdmin>,
    state: Mutex<EndpointState>,
}

impl ExportEndpoint {
    fn new(
        admin: Weak<RemoteServiceAdmin>,
        exporter: Arc<dyn Exporter>,
        reference: ServiceReference,
        description: EndpointDescription,
        registration_id: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            admin,
            state: Mutex::new(EndpointState {
                exporter: Some(exporter),
                description: Some(description),
                reference: Some(reference),
                active: vec![registration_id],
                tearing_down: false,
                announced: false,
                held_unregistration: None,
            }),
        })
    }

    #[must_use]
    pub fn exporter_id(&self) -> Option<String> {
        self.state.lock().exporter.as_ref().map(|e| e.id().to_owned())
    }

    #[must_use]
    pub fn reference(&self) -> Option<ServiceReference> {
        self.state.lock().reference.clone()
    }

    #[must_use]
    pub fn description(&self) -> Option<EndpointDescription> {
        self.state.lock().description.clone()
    }

    /// Number of registrations currently holding this endpoint.
    #[must_use]
    pub fn active_registrations(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Claims a slot for `registration_id`. Fails once the endpoint has started
    /// tearing down.
    fn add_registration(&self, registration_id: u64) -> bool {
        let mut state = self.state.lock();
        if state.active.is_empty() || state.exporter.is_none() {
            return false;
        }
        state.active.push(registration_id);
        true
    }

    pub(crate) fn close(&self, registration_id: u64) -> EndpointClose {
        let (exporter, description) = {
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
        self.teardown(&exporter, &description)
    }

    /// Asks the exporter again to unexport an endpoint whose last close failed.
    pub(crate) fn retry_teardown(&self) -> EndpointClose {
        let (exporter, description) = {
            let mut state = self.state.lock();
            if !state.active.is_empty() {
                return EndpointClose::Released;
            }
            let Some(target) = begin_teardown(&mut state) else {
                return EndpointClose::AlreadyRemoved;
            };
            target
        };
        self.teardown(&exporter, &description)
    }

    fn teardown(
        &self,
        exporter: &Arc<dyn Exporter>,
        description: &EndpointDescription,
    ) -> EndpointClose {
        let unexported = match exporter.unexport_service(description) {
            Ok(true) => true,
            Ok(false) => {
                tracing::error!(
                    exporter_id = exporter.id(),
                    endpoint_id = description.id(),
                    "exporter did not hold the endpoint on unexport"
                );
                false
            }
            Err(e) => {
                tracing::error!(
                    exporter_id = exporter.id(),
                    endpoint_id = description.id(),
                    error = %e,
                    "failed to unexport endpoint"
                );
                false
            }
        };

        let mut state = self.state.lock();
        state.tearing_down = false;
        if !unexported {
            return EndpointClose::TeardownFailed;
        }
        state.exporter = None;
        state.description = None;
        state.reference = None;
        tracing::debug!(
            exporter_id = exporter.id(),
            endpoint_id = description.id(),
            "endpoint unexported"
        );
        EndpointClose::TornDown
    }

    /// Records that `EXPORT_REGISTRATION` went out and returns the
    /// unregistration held back until then, if any.
    pub(crate) fn mark_announced(&self) -> Option<RemoteServiceAdminEvent> {
        let mut state = self.state.lock();
        state.announced = true;
        state.held_unregistration.take()
    }

    /// Hands `event` back when it may be published now, otherwise keeps it
    /// for [`Self::mark_announced`].
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

    /// Recomputes the description from the current service properties and
    /// `overrides`, then pushes it to the exporter.
    ///
    /// Precedence, lowest first: current endpoint properties, service
    /// properties, overrides.
    fn update(
        &self,
        overrides: Option<&Properties>,
    ) -> Result<EndpointDescription, RemoteServiceFailure> {
        let (exporter, mut description, reference) = {
            let state = self.state.lock();
            let (Some(e), Some(d), Some(r)) =
                (&state.exporter, &state.description, &state.reference)
            else {
                return Err(RemoteServiceFailure::InvalidEndpoint(
                    AdminError::invalid_argument("endpoint is closed"),
                ));
            };
            (Arc::clone(e), d.clone(), r.clone())
        };

        let empty = Properties::new();
        let service_props = extra_properties(&reference.properties());
        let merged = merge(&[
            description.properties(),
            &service_props,
            overrides.unwrap_or(&empty),
        ]);
        description
            .update(merged)
            .map_err(RemoteServiceFailure::InvalidEndpoint)?;

        match exporter.update_service(&description) {
            Ok(true) => {}
            Ok(false) => {
                return Err(RemoteServiceFailure::provider(
                    exporter.id(),
                    ProviderError::unknown_endpoint(description.id()),
                ));
            }
            Err(e) => return Err(RemoteServiceFailure::provider(exporter.id(), e)),
        }

        let mut state = self.state.lock();
        if state.description.is_some() {
            state.description = Some(description.clone());
        }
        Ok(description)
    }
}

/// Takes the teardown token. `None` while another teardown runs or once the
/// endpoint is gone.
fn begin_teardown(state: &mut EndpointState) -> Option<(Arc<dyn Exporter>, EndpointDescription)> {
    if state.tearing_down {
        return None;
    }
    let (Some(exporter), Some(description)) = (&state.exporter, &state.description) else {
        return None;
    };
    let target = (Arc::clone(exporter), description.clone());
    state.tearing_down = true;
    Some(target)
}

impl fmt::Debug for ExportEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ExportEndpoint")
            .field("exporter", &state.exporter.as_ref().map(|e| e.id().to_owned()))
            .field("endpoint_id", &state.description.as_ref().map(EndpointDescription::id))
            .field("active", &state.active)
            .finish()
    }
}

#[derive(Debug, Clone)]
enum ExportTarget {
    Endpoint(Arc<ExportEndpoint>),
    Failure {
        exception: Arc<RemoteServiceFailure>,
        errored: EndpointDescription,
        origin: ServiceReference,
    },
}

/// Read-only view of an export: a live endpoint or a captured failure.
#[derive(Debug, Clone)]
pub struct ExportReference {
    target: ExportTarget,
}

impl ExportReference {
    fn from_endpoint(endpoint: Arc<ExportEndpoint>) -> Self {
        Self {
            target: ExportTarget::Endpoint(endpoint),
        }
    }

    fn from_failure(
        exception: Arc<RemoteServiceFailure>,
        errored: EndpointDescription,
        origin: ServiceReference,
    ) -> Self {
        Self {
            target: ExportTarget::Failure {
                exception,
                errored,
                origin,
            },
        }
    }

    /// `None` for failures and for endpoints already torn down.
    #[must_use]
    pub fn exporter_id(&self) -> Option<String> {
        match &self.target {
            ExportTarget::Endpoint(e) => e.exporter_id(),
            ExportTarget::Failure { .. } => None,
        }
    }

    #[must_use]
    pub fn reference(&self) -> Option<ServiceReference> {
        match &self.target {
            ExportTarget::Endpoint(e) => e.reference(),
            ExportTarget::Failure { .. } => None,
        }
    }

    /// Current description, or the errored description of a failure.
    #[must_use]
    pub fn description(&self) -> Option<EndpointDescription> {
        match &self.target {
            ExportTarget::Endpoint(e) => e.description(),
            ExportTarget::Failure { errored, .. } => Some(errored.clone()),
        }
    }

    #[must_use]
    pub fn exception(&self) -> Option<Arc<RemoteServiceFailure>> {
        match &self.target {
            ExportTarget::Endpoint(_) => None,
            ExportTarget::Failure { exception, .. } => Some(Arc::clone(exception)),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> Option<&Arc<ExportEndpoint>> {
        match &self.target {
            ExportTarget::Endpoint(e) => Some(e),
            ExportTarget::Failure { .. } => None,
        }
    }

    /// The service this export was attempted for, failures included.
    fn origin(&self) -> Option<ServiceReference> {
        match &self.target {
            ExportTarget::Endpoint(e) => e.reference(),
            ExportTarget::Failure { origin, .. } => Some(origin.clone()),
        }
    }
}

struct RegistrationState {
    reference: Option<ExportReference>,
    closed: bool,
    update_failure: Option<Arc<RemoteServiceFailure>>,
    // Kept after a close whose endpoint teardown failed, for retry.
    failed_teardown: Option<ExportReference>,
}

/// Caller-held claim on an exported endpoint (or on a captured failure).
pub struct ExportRegistration {
    id: u64,
    admin: Weak<RemoteServiceAdmin>,
    state: Mutex<RegistrationState>,
}

impl ExportRegistration {
    fn with_reference(
        id: u64,
        admin: Weak<RemoteServiceAdmin>,
        reference: ExportReference,
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

    pub(crate) fn exported(
        admin: Weak<RemoteServiceAdmin>,
        exporter: Arc<dyn Exporter>,
        reference: ServiceReference,
        description: EndpointDescription,
    ) -> Arc<Self> {
        let id = next_registration_id();
        let endpoint = ExportEndpoint::new(admin.clone(), exporter, reference, description, id);
        Self::with_reference(id, admin, ExportReference::from_endpoint(endpoint))
    }

    pub(crate) fn failed(
        admin: Weak<RemoteServiceAdmin>,
        origin: ServiceReference,
        exception: RemoteServiceFailure,
        errored: EndpointDescription,
    ) -> Arc<Self> {
        Self::with_reference(
            next_registration_id(),
            admin,
            ExportReference::from_failure(Arc::new(exception), errored, origin),
        )
    }

    /// New registration sharing `endpoint`; `None` if it is already tearing down.
    pub(crate) fn share(endpoint: &Arc<ExportEndpoint>) -> Option<Arc<Self>> {
        let id = next_registration_id();
        if !endpoint.add_registration(id) {
            return None;
        }
        Some(Self::with_reference(
            id,
            endpoint.admin.clone(),
            ExportReference::from_endpoint(Arc::clone(endpoint)),
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

    /// `None` once closed.
    #[must_use]
    pub fn export_reference(&self) -> Option<ExportReference> {
        self.state.lock().reference.clone()
    }

    #[must_use]
    pub fn exporter_id(&self) -> Option<String> {
        self.export_reference().and_then(|r| r.exporter_id())
    }

    #[must_use]
    pub fn reference(&self) -> Option<ServiceReference> {
        self.export_reference().and_then(|r| r.reference())
    }

    #[must_use]
    pub fn description(&self) -> Option<EndpointDescription> {
        self.export_reference().and_then(|r| r.description())
    }

    /// The creation failure, or else the last update failure.
    #[must_use]
    pub fn exception(&self) -> Option<Arc<RemoteServiceFailure>> {
        let state = self.state.lock();
        state
            .reference
            .as_ref()
            .and_then(ExportReference::exception)
            .or_else(|| state.update_failure.clone())
    }

    pub(crate) fn endpoint(&self) -> Option<Arc<ExportEndpoint>> {
        let state = self.state.lock();
        if state.closed {
            return None;
        }
        state.reference.as_ref().and_then(|r| r.endpoint().cloned())
    }

    /// True when this open registration was created for `reference`, through
    /// `exporter_id` if given. Failures match only without an exporter id.
    pub(crate) fn matches(&self, reference: &ServiceReference, exporter_id: Option<&str>) -> bool {
        let Some(export_ref) = self.export_reference() else {
            return false;
        };
        let Some(ours) = export_ref.origin() else {
            return false;
        };
        ours == *reference
            && exporter_id.is_none_or(|id| export_ref.exporter_id().as_deref() == Some(id))
    }

    /// Pushes a recomputed description to the exporter.
    ///
    /// Publishes `EXPORT_UPDATE` on success. On failure the error is recorded
    /// (see [`Self::exception`]), `EXPORT_WARNING` is published and `None`
    /// is returned. Closed and failed registrations return `None` silently.
    pub fn update(&self, overrides: Option<&Properties>) -> Option<EndpointDescription> {
        let endpoint = self.endpoint()?;
        let exporter_id = endpoint.exporter_id();

        let (kind, updated, exception) = match endpoint.update(overrides) {
            Ok(description) => {
                self.state.lock().update_failure = None;
                (RemoteServiceAdminEventKind::ExportUpdate, Some(description), None)
            }
            Err(failure) => {
                tracing::warn!(
                    registration_id = self.id,
                    error = %failure,
                    "export update failed"
                );
                let failure = Arc::new(failure);
                self.state.lock().update_failure = Some(Arc::clone(&failure));
                (RemoteServiceAdminEventKind::ExportWarning, None, Some(failure))
            }
        };
        let description = updated.clone().or_else(|| endpoint.description());

        if let Some(admin) = self.admin.upgrade() {
            admin.publish(&RemoteServiceAdminEvent::export(
                kind,
                admin.source(),
                exporter_id,
                self.export_reference(),
                exception,
                description,
            ));
        }
        updated
    }

    /// Releases this registration's claim on its endpoint.
    ///
    /// Returns `false` if the registration was already closed. Publishes
    /// `EXPORT_UNREGISTRATION` only when this close tore the endpoint down.
    /// When the exporter refuses the teardown the registration stays listed;
    /// see [`Self::retry_teardown`].
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
        let provider_id = reference.exporter_id();
        let description = reference.description();

        let outcome = match reference.endpoint() {
            Some(endpoint) => endpoint.close(self.id),
            None => EndpointClose::AlreadyRemoved,
        };
        tracing::debug!(
            registration_id = self.id,
            outcome = ?outcome,
            "export registration closed"
        );

        if outcome == EndpointClose::TeardownFailed {
            self.state.lock().failed_teardown = Some(reference);
            return true;
        }
        self.finish_close(outcome, provider_id, description, reference);
        true
    }

    /// Retries the endpoint teardown after a close the exporter refused.
    ///
    /// Returns `true` when the endpoint is now unexported; the registration
    /// then leaves the registry and `EXPORT_UNREGISTRATION` is published.
    pub fn retry_teardown(&self) -> bool {
        let Some(reference) = self.state.lock().failed_teardown.clone() else {
            return false;
        };
        let Some(endpoint) = reference.endpoint() else {
            return false;
        };
        let provider_id = reference.exporter_id();
        let description = reference.description();

        let outcome = endpoint.retry_teardown();
        tracing::debug!(registration_id = self.id, outcome = ?outcome, "export teardown retried");
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
        reference: ExportReference,
    ) {
        let Some(admin) = self.admin.upgrade() else {
            return;
        };
        admin.remove_exported(self.id);
        if outcome != EndpointClose::TornDown {
            return;
        }
        let endpoint = reference.endpoint().cloned();
        let event = RemoteServiceAdminEvent::export(
            RemoteServiceAdminEventKind::ExportUnregistration,
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

impl fmt::Debug for ExportRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ExportRegistration")
            .field("id", &self.id)
            .field("closed", &state.closed)
            .field("reference", &state.reference)
            .finish_non_exhaustive()
    }
}
