//! Reaction to endpoints discovered on other processes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use remote_service_admin::{ImportRegistration, RemoteServiceAdmin};
use remote_service_admin_sdk::{EndpointEvent, EndpointEventKind};

/// Decides what to import when discovery reports a remote endpoint.
pub trait ImportPolicy: Send + Sync {
    /// # Errors
    ///
    /// Policy-specific; the topology manager logs the error and carries on.
    fn endpoint_changed(
        &self,
        admin: &RemoteServiceAdmin,
        event: &EndpointEvent,
        matched_filter: Option<&str>,
        endpoint_filters: &[String],
    ) -> anyhow::Result<()>;

    /// Releases whatever the policy imported. Called on topology deactivation.
    fn close(&self) {}
}

/// Records discovered endpoints in the log and imports nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingImportPolicy;

impl ImportPolicy for LoggingImportPolicy {
    fn endpoint_changed(
        &self,
        _admin: &RemoteServiceAdmin,
        event: &EndpointEvent,
        matched_filter: Option<&str>,
        endpoint_filters: &[String],
    ) -> anyhow::Result<()> {
        tracing::debug!(
            kind = ?event.kind,
            endpoint_id = event.description.id(),
            matched_filter = matched_filter.unwrap_or("-"),
            filters = endpoint_filters.len(),
            "remote endpoint event ignored"
        );
        Ok(())
    }
}

/// Imports every discovered endpoint, keeps the proxy in step with
/// modifications and closes it when the endpoint goes away.
#[derive(Default)]
pub struct AutoImportPolicy {
    imports: Mutex<HashMap<String, Arc<ImportRegistration>>>,
}

impl AutoImportPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Endpoint ids currently imported by this policy, sorted.
    #[must_use]
    pub fn imported(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.imports.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn added(&self, admin: &RemoteServiceAdmin, event: &EndpointEvent) -> anyhow::Result<()> {
        let endpoint_id = event.description.id();
        if self.imports.lock().contains_key(endpoint_id) {
            return Ok(());
        }

        let registration = admin.import_service(&event.description);
        if let Some(failure) = registration.exception() {
            registration.close();
            anyhow::bail!("import of endpoint '{endpoint_id}' failed: {failure}");
        }

        let displaced = self
            .imports
            .lock()
            .insert(endpoint_id.to_owned(), registration);
        if let Some(displaced) = displaced {
            // Lost a race with a concurrent ADDED for the same endpoint.
            displaced.close();
        }
        Ok(())
    }

    fn modified(&self, event: &EndpointEvent) -> anyhow::Result<()> {
        let endpoint_id = event.description.id();
        let Some(registration) = self.imports.lock().get(endpoint_id).cloned() else {
            return Ok(());
        };
        if registration.update(&event.description).is_none() {
            anyhow::bail!("update of imported endpoint '{endpoint_id}' failed");
        }
        Ok(())
    }

    fn removed(&self, event: &EndpointEvent) {
        let removed = self.imports.lock().remove(event.description.id());
        if let Some(registration) = removed {
            registration.close();
        }
    }
}

impl ImportPolicy for AutoImportPolicy {
    fn endpoint_changed(
        &self,
        admin: &RemoteServiceAdmin,
        event: &EndpointEvent,
        _matched_filter: Option<&str>,
        _endpoint_filters: &[String],
    ) -> anyhow::Result<()> {
        match event.kind {
            EndpointEventKind::Added => self.added(admin, event),
            EndpointEventKind::Modified => self.modified(event),
            EndpointEventKind::Removed | EndpointEventKind::ModifiedEndmatch => {
                self.removed(event);
                Ok(())
            }
        }
    }

    fn close(&self) {
        let imports = std::mem::take(&mut *self.imports.lock());
        for registration in imports.into_values() {
            registration.close();
        }
    }
}
