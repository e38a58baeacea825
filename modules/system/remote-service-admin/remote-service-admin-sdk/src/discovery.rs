//! Discovery-side contracts: advertisers publish local endpoints, endpoint
//! listeners receive endpoints discovered elsewhere.

use crate::endpoint::EndpointDescription;

/// Publishes and retracts endpoint visibility to remote peers. Best effort.
pub trait EndpointAdvertiser: Send + Sync {
    /// # Errors
    ///
    /// Advertiser-specific; callers log and move on.
    fn advertise_endpoint(&self, description: &EndpointDescription) -> anyhow::Result<()>;

    /// # Errors
    ///
    /// Advertiser-specific; callers log and move on.
    fn unadvertise_endpoint(&self, endpoint_id: &str) -> anyhow::Result<()>;
}

/// What happened to a discovered endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointEventKind {
    Added,
    Removed,
    Modified,
    /// Modified so that it no longer matches the listener's filter.
    ModifiedEndmatch,
}

#[derive(Debug, Clone)]
pub struct EndpointEvent {
    pub kind: EndpointEventKind,
    pub description: EndpointDescription,
}

impl EndpointEvent {
    #[must_use]
    pub fn new(kind: EndpointEventKind, description: EndpointDescription) -> Self {
        Self { kind, description }
    }
}

/// Receives endpoints discovered on other processes.
pub trait EndpointEventListener: Send + Sync {
    fn endpoint_changed(&self, event: &EndpointEvent, matched_filter: Option<&str>);
}
