use figment::Figment;
use remote_service_admin::config::{section_or_default, ConfigError};
use serde::Deserialize;

/// Configuration for [`crate::TopologyManager`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TopologyManagerConfig {
    /// Export local services that declare exported interfaces as soon as they register.
    pub auto_export: bool,

    /// Initial endpoint filters, handed to the import policy.
    pub endpoint_filters: Vec<String>,
}

impl Default for TopologyManagerConfig {
    fn default() -> Self {
        Self {
            auto_export: true,
            endpoint_filters: Vec::new(),
        }
    }
}

impl TopologyManagerConfig {
    pub const SECTION: &'static str = "topology_manager";

    /// # Errors
    /// Returns `ConfigError` if the section is present but invalid.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        section_or_default(figment, Self::SECTION)
    }
}
