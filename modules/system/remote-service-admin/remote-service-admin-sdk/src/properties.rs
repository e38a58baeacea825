//! Property maps and the helpers used to read and assemble them.

use serde_json::Value;

use crate::constants::{
    ECF_ENDPOINT_CONTAINERID_NAMESPACE, ECF_ENDPOINT_ID, ECF_ENDPOINT_TIMESTAMP, ECF_RSVC_ID,
    ENDPOINT_FRAMEWORK_UUID, ENDPOINT_ID, ENDPOINT_PACKAGE_VERSION_PREFIX, ENDPOINT_SERVICE_ID,
    ERROR_ENDPOINT_ID, ERROR_IMPORTED_CONFIGS, ERROR_NAMESPACE, OBJECTCLASS,
    RESERVED_PROPERTY_KEYS, SERVICE_EXPORTED_INTERFACES, SERVICE_IMPORTED_CONFIGS,
};

/// Free-form property mapping (keys unique).
pub type Properties = serde_json::Map<String, Value>;

/// Reads a "string-plus" value: a single string or an array of strings.
///
/// Anything else (including non-string array items) is ignored.
#[must_use]
pub fn string_plus(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    }
}

/// Reads a string-plus property from a map.
#[must_use]
pub fn string_plus_property(props: &Properties, key: &str) -> Vec<String> {
    string_plus(props.get(key))
}

/// Converts a list of strings into a JSON array value.
#[must_use]
pub fn string_list<S: AsRef<str>>(items: &[S]) -> Value {
    Value::Array(
        items
            .iter()
            .map(|s| Value::String(s.as_ref().to_owned()))
            .collect(),
    )
}

/// Resolves the interfaces a service asks to export.
///
/// `overrides` wins over the service's own properties. `"*"` expands to the
/// service's full `objectClass`.
#[must_use]
pub fn exported_interfaces(
    service_props: &Properties,
    overrides: Option<&Properties>,
) -> Vec<String> {
    let raw = overrides
        .and_then(|o| o.get(SERVICE_EXPORTED_INTERFACES))
        .or_else(|| service_props.get(SERVICE_EXPORTED_INTERFACES));
    let requested = string_plus(raw);
    if requested.len() == 1 && requested[0] == "*" {
        return string_plus_property(service_props, OBJECTCLASS);
    }
    requested
}

/// True for keys owned by the remote-services machinery rather than by the service.
#[must_use]
pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_PROPERTY_KEYS.contains(&key)
        || key.starts_with("service.exported.")
        || key.starts_with("endpoint.")
        || key.starts_with("ecf.")
}

/// Copies every non-reserved property.
#[must_use]
pub fn extra_properties(props: &Properties) -> Properties {
    props
        .iter()
        .filter(|(k, _)| !is_reserved_key(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Collects `endpoint.package.version.<pkg>` entries for the packages of `interfaces`.
#[must_use]
pub fn package_versions(interfaces: &[String], props: &Properties) -> Properties {
    let mut result = Properties::new();
    for interface in interfaces {
        let Some((package, _)) = interface.rsplit_once('.') else {
            continue;
        };
        let key = format!("{ENDPOINT_PACKAGE_VERSION_PREFIX}{package}");
        if let Some(version) = props.get(&key) {
            result.insert(key, version.clone());
        }
    }
    result
}

/// Merges maps left to right; later maps win on key collisions.
#[must_use]
pub fn merge(layers: &[&Properties]) -> Properties {
    let mut result = Properties::new();
    for layer in layers {
        for (k, v) in *layer {
            result.insert(k.clone(), v.clone());
        }
    }
    result
}

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn current_time_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Properties of the placeholder description attached to failed exports.
#[must_use]
pub fn error_description_properties(interfaces: &[String]) -> Properties {
    let mut props = Properties::new();
    props.insert(OBJECTCLASS.to_owned(), string_list(interfaces));
    props.insert(ENDPOINT_ID.to_owned(), Value::from(ERROR_ENDPOINT_ID));
    props.insert(ENDPOINT_SERVICE_ID.to_owned(), Value::from(0));
    props.insert(ENDPOINT_FRAMEWORK_UUID.to_owned(), Value::from(ERROR_ENDPOINT_ID));
    props.insert(
        SERVICE_IMPORTED_CONFIGS.to_owned(),
        string_list(ERROR_IMPORTED_CONFIGS),
    );
    props.insert(ECF_ENDPOINT_ID.to_owned(), Value::from(ERROR_ENDPOINT_ID));
    props.insert(
        ECF_ENDPOINT_CONTAINERID_NAMESPACE.to_owned(),
        Value::from(ERROR_NAMESPACE),
    );
    props.insert(ECF_RSVC_ID.to_owned(), Value::from(0));
    props.insert(ECF_ENDPOINT_TIMESTAMP.to_owned(), Value::from(0));
    props
}
