//! Transcoding between target group attributes and wire types.
//!
//! Expanders drop zero-valued optional fields so the control plane applies
//! its own defaults. Flatteners emit only the fields the control plane
//! returned.

use serde_json::{Value, json};

use crate::schema::AttributeMap;
use crate::vendor::types::{HealthCheckConfig, Matcher, TargetGroupConfig};

/// Returns the single element of a max-items-1 block list.
#[must_use]
pub fn first_block(value: Option<&Value>) -> Option<&AttributeMap> {
    value
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(Value::as_object)
}

fn non_empty_str(map: &AttributeMap, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}

fn non_zero_i32(map: &AttributeMap, key: &str) -> Option<i32> {
    map.get(key)
        .and_then(Value::as_i64)
        .and_then(|number| i32::try_from(number).ok())
        .filter(|number| *number != 0)
}

/// Builds the routing configuration from a `config` block.
#[must_use]
pub fn expand_target_group_config(map: &AttributeMap) -> TargetGroupConfig {
    TargetGroupConfig {
        health_check: first_block(map.get("health_check")).map(expand_health_check_config),
        ip_address_type: non_empty_str(map, "ip_address_type"),
        port: non_zero_i32(map, "port"),
        protocol: non_empty_str(map, "protocol"),
        protocol_version: non_empty_str(map, "protocol_version"),
        vpc_identifier: non_empty_str(map, "vpc_identifier"),
    }
}

/// Builds health check settings from a `health_check` block.
#[must_use]
pub fn expand_health_check_config(map: &AttributeMap) -> HealthCheckConfig {
    HealthCheckConfig {
        enabled: map.get("enabled").and_then(Value::as_bool),
        health_check_interval_seconds: non_zero_i32(map, "health_check_interval_seconds"),
        health_check_timeout_seconds: non_zero_i32(map, "health_check_timeout_seconds"),
        healthy_threshold_count: non_zero_i32(map, "healthy_threshold_count"),
        matcher: first_block(map.get("matcher")).map(expand_matcher),
        path: non_empty_str(map, "path"),
        port: non_zero_i32(map, "port"),
        protocol: non_empty_str(map, "protocol"),
        protocol_version: non_empty_str(map, "protocol_version"),
        unhealthy_threshold_count: non_zero_i32(map, "unhealthy_threshold_count"),
    }
}

fn expand_matcher(map: &AttributeMap) -> Matcher {
    Matcher {
        http_code: non_empty_str(map, "value").unwrap_or_default(),
    }
}

fn insert_some(map: &mut AttributeMap, key: &str, value: Option<Value>) {
    if let Some(present) = value {
        map.insert(key.to_owned(), present);
    }
}

/// Renders routing configuration as a `config` block element.
#[must_use]
pub fn flatten_target_group_config(config: &TargetGroupConfig) -> AttributeMap {
    let mut map = AttributeMap::new();
    insert_some(
        &mut map,
        "health_check",
        config
            .health_check
            .as_ref()
            .map(|health| json!([flatten_health_check_config(health)])),
    );
    insert_some(&mut map, "ip_address_type", config.ip_address_type.clone().map(Value::from));
    insert_some(&mut map, "port", config.port.map(Value::from));
    insert_some(&mut map, "protocol", config.protocol.clone().map(Value::from));
    insert_some(&mut map, "protocol_version", config.protocol_version.clone().map(Value::from));
    insert_some(&mut map, "vpc_identifier", config.vpc_identifier.clone().map(Value::from));
    map
}

/// Renders health check settings as a `health_check` block element.
#[must_use]
pub fn flatten_health_check_config(health: &HealthCheckConfig) -> AttributeMap {
    let mut map = AttributeMap::new();
    insert_some(&mut map, "enabled", health.enabled.map(Value::from));
    insert_some(
        &mut map,
        "health_check_interval_seconds",
        health.health_check_interval_seconds.map(Value::from),
    );
    insert_some(
        &mut map,
        "health_check_timeout_seconds",
        health.health_check_timeout_seconds.map(Value::from),
    );
    insert_some(
        &mut map,
        "healthy_threshold_count",
        health.healthy_threshold_count.map(Value::from),
    );
    insert_some(
        &mut map,
        "matcher",
        health
            .matcher
            .as_ref()
            .map(|matcher| json!([{ "value": matcher.http_code }])),
    );
    insert_some(&mut map, "path", health.path.clone().map(Value::from));
    insert_some(&mut map, "port", health.port.map(Value::from));
    insert_some(&mut map, "protocol", health.protocol.clone().map(Value::from));
    insert_some(&mut map, "protocol_version", health.protocol_version.clone().map(Value::from));
    insert_some(
        &mut map,
        "unhealthy_threshold_count",
        health.unhealthy_threshold_count.map(Value::from),
    );
    map
}
