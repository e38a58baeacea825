//! Domain layer: the admin coordinator, the export/import triads and the event bus.

use std::sync::atomic::{AtomicU64, Ordering};

pub mod admin;
pub mod event;
pub mod export;
pub mod import;
pub mod provider_list;

pub use admin::RemoteServiceAdmin;
pub use event::{
    EventBus, LoggingEventListener, RemoteServiceAdminEvent, RemoteServiceAdminEventKind,
    RemoteServiceAdminListener,
};
pub use export::{ExportEndpoint, ExportReference, ExportRegistration};
pub use import::{ImportEndpoint, ImportReference, ImportRegistration};
pub use provider_list::{Bindable, ProviderList};

static NEXT_REGISTRATION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique registration id, shared by both sides.
pub(crate) fn next_registration_id() -> u64 {
    NEXT_REGISTRATION_ID.fetch_add(1, Ordering::Relaxed)
}

/// What releasing one registration did to its endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EndpointClose {
    /// The registration held no slot (double close, or a failure reference).
    AlreadyRemoved,
    /// Other registrations still hold the endpoint.
    Released,
    /// Last slot released and the provider tore the endpoint down.
    TornDown,
    /// Last slot released but the provider teardown failed; logged.
    TeardownFailed,
}
