//! Well-known property keys shared by services, endpoint descriptions and providers.

/// Interfaces a local service is registered under.
pub const OBJECTCLASS: &str = "objectClass";
/// Registry-assigned numeric service id.
pub const SERVICE_ID: &str = "service.id";

/// Interfaces of a local service that should be made remotely reachable (`"*"` = all).
pub const SERVICE_EXPORTED_INTERFACES: &str = "service.exported.interfaces";
/// Configuration types a local service asks to be exported with.
pub const SERVICE_EXPORTED_CONFIGS: &str = "service.exported.configs";
pub const SERVICE_EXPORTED_INTENTS: &str = "service.exported.intents";
pub const SERVICE_EXPORTED_INTENTS_EXTRA: &str = "service.exported.intents.extra";
pub const SERVICE_INTENTS: &str = "service.intents";

/// Set on local proxies created by an importer.
pub const SERVICE_IMPORTED: &str = "service.imported";
/// Configuration types an endpoint can be imported with.
pub const SERVICE_IMPORTED_CONFIGS: &str = "service.imported.configs";

pub const REMOTE_CONFIGS_SUPPORTED: &str = "remote.configs.supported";
pub const REMOTE_INTENTS_SUPPORTED: &str = "remote.intents.supported";

pub const ENDPOINT_ID: &str = "endpoint.id";
pub const ENDPOINT_SERVICE_ID: &str = "endpoint.service.id";
pub const ENDPOINT_FRAMEWORK_UUID: &str = "endpoint.framework.uuid";
/// Prefix of per-package version properties (`endpoint.package.version.<package>`).
pub const ENDPOINT_PACKAGE_VERSION_PREFIX: &str = "endpoint.package.version.";

pub const ECF_ENDPOINT_ID: &str = "ecf.endpoint.id";
pub const ECF_ENDPOINT_CONTAINERID_NAMESPACE: &str = "ecf.endpoint.id.ns";
/// Epoch-millis timestamp, bumped on every description update.
pub const ECF_ENDPOINT_TIMESTAMP: &str = "ecf.endpoint.ts";
pub const ECF_RSVC_ID: &str = "ecf.rsvc.id";
pub const ECF_SERVICE_EXPORTED_CONTAINER_IDS: &str = "ecf.exported.containerids";

/// Endpoint id used by descriptions that stand in for a failed export/import.
pub const ERROR_ENDPOINT_ID: &str = "0";
pub const ERROR_NAMESPACE: &str = "org.eclipse.ecf.core.identity.StringID";
pub const ERROR_IMPORTED_CONFIGS: &[&str] = &["import.error.config"];

/// Keys never copied from service properties into endpoint or proxy properties.
pub const RESERVED_PROPERTY_KEYS: &[&str] = &[
    OBJECTCLASS,
    SERVICE_ID,
    SERVICE_EXPORTED_INTERFACES,
    SERVICE_EXPORTED_CONFIGS,
    SERVICE_EXPORTED_INTENTS,
    SERVICE_EXPORTED_INTENTS_EXTRA,
    SERVICE_IMPORTED,
    SERVICE_IMPORTED_CONFIGS,
    SERVICE_INTENTS,
    REMOTE_CONFIGS_SUPPORTED,
    REMOTE_INTENTS_SUPPORTED,
    ENDPOINT_ID,
    ENDPOINT_SERVICE_ID,
    ENDPOINT_FRAMEWORK_UUID,
    ECF_ENDPOINT_ID,
    ECF_ENDPOINT_CONTAINERID_NAMESPACE,
    ECF_ENDPOINT_TIMESTAMP,
    ECF_RSVC_ID,
];
