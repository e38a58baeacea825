//! Admin events and the listener bus.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use remote_service_admin_sdk::{EndpointDescription, ListenerId, RemoteServiceFailure};

use super::export::ExportReference;
use super::import::ImportReference;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteServiceAdminEventKind {
    ImportRegistration,
    ExportRegistration,
    ExportUnregistration,
    ImportUnregistration,
    ImportError,
    ExportError,
    ExportWarning,
    ImportWarning,
    ImportUpdate,
    ExportUpdate,
}

impl RemoteServiceAdminEventKind {
    #[must_use]
    pub fn is_export(self) -> bool {
        matches!(
            self,
            Self::ExportRegistration
                | Self::ExportUnregistration
                | Self::ExportError
                | Self::ExportWarning
                | Self::ExportUpdate
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ImportRegistration => "IMPORT_REGISTRATION",
            Self::ExportRegistration => "EXPORT_REGISTRATION",
            Self::ExportUnregistration => "EXPORT_UNREGISTRATION",
            Self::ImportUnregistration => "IMPORT_UNREGISTRATION",
            Self::ImportError => "IMPORT_ERROR",
            Self::ExportError => "EXPORT_ERROR",
            Self::ExportWarning => "EXPORT_WARNING",
            Self::ImportWarning => "IMPORT_WARNING",
            Self::ImportUpdate => "IMPORT_UPDATE",
            Self::ExportUpdate => "EXPORT_UPDATE",
        }
    }
}

impl std::fmt::Display for RemoteServiceAdminEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one registration state transition.
#[derive(Debug, Clone)]
pub struct RemoteServiceAdminEvent {
    kind: RemoteServiceAdminEventKind,
    source: String,
    provider_id: Option<String>,
    export_reference: Option<ExportReference>,
    import_reference: Option<ImportReference>,
    exception: Option<Arc<RemoteServiceFailure>>,
    description: Option<EndpointDescription>,
}

impl RemoteServiceAdminEvent {
    pub(crate) fn export(
        kind: RemoteServiceAdminEventKind,
        source: String,
        provider_id: Option<String>,
        reference: Option<ExportReference>,
        exception: Option<Arc<RemoteServiceFailure>>,
        description: Option<EndpointDescription>,
    ) -> Self {
        Self {
            kind,
            source,
            provider_id,
            export_reference: reference,
            import_reference: None,
            exception,
            description,
        }
    }

    pub(crate) fn import(
        kind: RemoteServiceAdminEventKind,
        source: String,
        provider_id: Option<String>,
        reference: Option<ImportReference>,
        exception: Option<Arc<RemoteServiceFailure>>,
        description: Option<EndpointDescription>,
    ) -> Self {
        Self {
            kind,
            source,
            provider_id,
            export_reference: None,
            import_reference: reference,
            exception,
            description,
        }
    }

    #[must_use]
    pub fn kind(&self) -> RemoteServiceAdminEventKind {
        self.kind
    }

    /// Identity of the publishing admin (its activation source).
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn provider_id(&self) -> Option<&str> {
        self.provider_id.as_deref()
    }

    #[must_use]
    pub fn export_reference(&self) -> Option<&ExportReference> {
        self.export_reference.as_ref()
    }

    #[must_use]
    pub fn import_reference(&self) -> Option<&ImportReference> {
        self.import_reference.as_ref()
    }

    #[must_use]
    pub fn exception(&self) -> Option<&Arc<RemoteServiceFailure>> {
        self.exception.as_ref()
    }

    #[must_use]
    pub fn description(&self) -> Option<&EndpointDescription> {
        self.description.as_ref()
    }
}

/// Receives admin events.
///
/// Errors and panics are logged by the bus and never reach the publisher or
/// the other listeners.
pub trait RemoteServiceAdminListener: Send + Sync {
    /// # Errors
    ///
    /// Listener-specific; logged by the publisher.
    fn remote_admin_event(&self, event: &RemoteServiceAdminEvent) -> anyhow::Result<()>;
}

/// Ordered listener set owned by one admin instance.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn RemoteServiceAdminListener>)>>,
    next_id: AtomicU64,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn RemoteServiceAdminListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Delivers `event` to every listener in registration order.
    ///
    /// The listener set is snapshotted first, so listeners may add or remove
    /// listeners while being notified.
    pub fn publish(&self, event: &RemoteServiceAdminEvent) {
        let snapshot = self.listeners.read().clone();

        for (_, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener.remote_admin_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(
                        kind = %event.kind(),
                        error = %e,
                        "admin event listener failed"
                    );
                }
                Err(_) => {
                    tracing::error!(kind = %event.kind(), "admin event listener panicked");
                }
            }
        }
    }
}

/// Logs every admin event at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventListener;

impl RemoteServiceAdminListener for LoggingEventListener {
    fn remote_admin_event(&self, event: &RemoteServiceAdminEvent) -> anyhow::Result<()> {
        tracing::debug!(
            kind = %event.kind(),
            source = event.source(),
            provider_id = event.provider_id().unwrap_or("-"),
            endpoint_id = event.description().map_or("-", EndpointDescription::id),
            error = ?event.exception().map(ToString::to_string),
            "remote service admin event"
        );
        Ok(())
    }
}
