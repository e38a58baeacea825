//! Endpoint description: the portable metadata of one remote endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{
    ECF_ENDPOINT_TIMESTAMP, ENDPOINT_FRAMEWORK_UUID, ENDPOINT_ID, ENDPOINT_SERVICE_ID,
    OBJECTCLASS, REMOTE_CONFIGS_SUPPORTED, SERVICE_IMPORTED_CONFIGS, SERVICE_INTENTS,
};
use crate::error::AdminError;
use crate::properties::{
    current_time_millis, error_description_properties, string_plus_property, Properties,
};

/// Description of a remote endpoint.
///
/// The typed accessors are derived from the property map, which stays the
/// single source of truth (and the serialized form). The endpoint id never
/// changes once the description exists; [`EndpointDescription::update`] swaps
/// the properties and bumps the timestamp but keeps the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Properties", into = "Properties")]
pub struct EndpointDescription {
    id: String,
    framework_uuid: Option<String>,
    service_id: i64,
    interfaces: Vec<String>,
    configuration_types: Vec<String>,
    intents: Vec<String>,
    timestamp: i64,
    properties: Properties,
}

impl EndpointDescription {
    /// Builds a description from its property map.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::MissingProperty` when `endpoint.id` or `objectClass`
    /// is absent or empty, or when neither `service.imported.configs` nor
    /// `remote.configs.supported` names a configuration type.
    pub fn from_properties(properties: Properties) -> Result<Self, AdminError> {
        let id = properties
            .get(ENDPOINT_ID)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AdminError::missing_property(ENDPOINT_ID))?
            .to_owned();

        let interfaces = string_plus_property(&properties, OBJECTCLASS);
        if interfaces.is_empty() {
            return Err(AdminError::missing_property(OBJECTCLASS));
        }

        let mut configuration_types = string_plus_property(&properties, SERVICE_IMPORTED_CONFIGS);
        if configuration_types.is_empty() {
            configuration_types = string_plus_property(&properties, REMOTE_CONFIGS_SUPPORTED);
        }
        if configuration_types.is_empty() {
            return Err(AdminError::missing_property(SERVICE_IMPORTED_CONFIGS));
        }

        let framework_uuid = properties
            .get(ENDPOINT_FRAMEWORK_UUID)
            .and_then(Value::as_str)
            .map(str::to_owned);
        let service_id = properties
            .get(ENDPOINT_SERVICE_ID)
            .and_then(Value::as_i64)
            .unwrap_or_default();
        let intents = string_plus_property(&properties, SERVICE_INTENTS);
        let timestamp = properties
            .get(ECF_ENDPOINT_TIMESTAMP)
            .and_then(Value::as_i64)
            .unwrap_or_default();

        Ok(Self {
            id,
            framework_uuid,
            service_id,
            interfaces,
            configuration_types,
            intents,
            timestamp,
            properties,
        })
    }

    /// Placeholder description attached to registrations whose export failed
    /// before a real description could be computed.
    #[must_use]
    pub fn for_error(interfaces: &[String]) -> Self {
        let properties = error_description_properties(interfaces);
        Self {
            id: crate::constants::ERROR_ENDPOINT_ID.to_owned(),
            framework_uuid: Some(crate::constants::ERROR_ENDPOINT_ID.to_owned()),
            service_id: 0,
            interfaces: interfaces.to_vec(),
            configuration_types: crate::constants::ERROR_IMPORTED_CONFIGS
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            intents: Vec::new(),
            timestamp: 0,
            properties,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Id of the framework (process) hosting the original service.
    #[must_use]
    pub fn framework_uuid(&self) -> Option<&str> {
        self.framework_uuid.as_deref()
    }

    #[must_use]
    pub fn service_id(&self) -> i64 {
        self.service_id
    }

    #[must_use]
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// Configuration types this endpoint can be imported with.
    #[must_use]
    pub fn configuration_types(&self) -> &[String] {
        &self.configuration_types
    }

    #[must_use]
    pub fn intents(&self) -> &[String] {
        &self.intents
    }

    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    #[must_use]
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// True when both descriptions point at the same remote service.
    ///
    /// Two descriptions from the same framework with the same service id are the
    /// same service even if their endpoint ids differ; otherwise the ids decide.
    #[must_use]
    pub fn is_same_service(&self, other: &Self) -> bool {
        match (&self.framework_uuid, &other.framework_uuid) {
            (Some(a), Some(b)) if a == b && self.service_id != 0 => {
                self.service_id == other.service_id
            }
            _ => self.id == other.id,
        }
    }

    /// Replaces the property map, keeping the endpoint id and bumping the timestamp.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::MissingProperty` when the new map lacks a required property;
    /// the description is left untouched in that case.
    pub fn update(&mut self, properties: Properties) -> Result<(), AdminError> {
        let mut properties = properties;
        properties.insert(ENDPOINT_ID.to_owned(), Value::from(self.id.clone()));
        let timestamp = current_time_millis().max(self.timestamp + 1);
        properties.insert(ECF_ENDPOINT_TIMESTAMP.to_owned(), Value::from(timestamp));
        *self = Self::from_properties(properties)?;
        Ok(())
    }
}

impl TryFrom<Properties> for EndpointDescription {
    type Error = AdminError;

    fn try_from(properties: Properties) -> Result<Self, Self::Error> {
        Self::from_properties(properties)
    }
}

impl From<EndpointDescription> for Properties {
    fn from(description: EndpointDescription) -> Self {
        description.properties
    }
}

impl std::fmt::Display for EndpointDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:?}", self.id, self.interfaces)
    }
}
