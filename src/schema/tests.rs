//! Tests for schema validation, planning and replacement detection.

use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::*;

fn map(value: Value) -> AttributeMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

#[fixture]
fn listener_schema() -> Schema {
    let health = Schema::new()
        .attribute("path", Attribute::string().optional().default("/"))
        .attribute(
            "interval",
            Attribute::int()
                .optional()
                .default(30)
                .validate(Validator::IntBetween(5, 300)),
        );
    let config = Schema::new()
        .attribute(
            "port",
            Attribute::int()
                .required()
                .force_new()
                .validate(Validator::IsPortNumber),
        )
        .attribute(
            "protocol_version",
            Attribute::string()
                .optional()
                .force_new()
                .default("HTTP1")
                .normalize(Normalize::Uppercase)
                .validate(Validator::OneOf(&["HTTP1", "HTTP2"])),
        )
        .attribute(
            "health_check",
            Attribute::block(health).optional().computed().max_items(1),
        );
    Schema::new()
        .attribute("arn", Attribute::string().computed())
        .attribute("name", Attribute::string().required().force_new())
        .attribute(
            "name_prefix",
            Attribute::string()
                .optional()
                .conflicts_with(&["name"]),
        )
        .attribute("config", Attribute::block(config).optional().max_items(1))
        .attribute("tags", Attribute::string_map().optional())
}

#[rstest]
fn valid_configuration_passes(listener_schema: Schema) {
    let config = map(json!({
        "name": "web",
        "config": [{ "port": 80, "protocol_version": "http2" }],
        "tags": { "env": "dev" },
    }));
    assert_eq!(listener_schema.validate(&config), Ok(()));
}

#[rstest]
fn every_violation_is_reported(listener_schema: Schema) {
    let config = map(json!({
        "arn": "arn:set-by-user",
        "name_prefix": "web-",
        "name": "web",
        "colour": "blue",
        "tags": { "env": 1 },
        "config": [
            { "port": 0, "health_check": [{ "interval": 1 }] },
            { "port": 81 },
        ],
    }));
    let Err(ProviderError::Validation(messages)) = listener_schema.validate(&config) else {
        panic!("configuration should be rejected");
    };

    let expected = [
        "arn: attribute is computed and cannot be set",
        "colour: unsupported attribute",
        "name_prefix: conflicts with name",
        "tags: expected a map of strings",
        "config: at most 1 block(s) allowed, got 2",
        "config.0.port: expected a valid port number, got 0",
        "config.0.health_check.0.interval: expected to be in the range (5 - 300), got 1",
    ];
    for message in expected {
        assert!(
            messages.iter().any(|candidate| candidate == message),
            "missing {message:?} in {messages:#?}"
        );
    }
}

#[rstest]
fn missing_required_attributes_are_reported(listener_schema: Schema) {
    let config = map(json!({ "config": [{}] }));
    let Err(ProviderError::Validation(messages)) = listener_schema.validate(&config) else {
        panic!("configuration should be rejected");
    };
    assert!(messages.contains(&String::from("name: required attribute is missing")));
    assert!(messages.contains(&String::from("config.0.port: required attribute is missing")));
}

#[rstest]
fn plan_fills_defaults_and_normalises(listener_schema: Schema) {
    let config = map(json!({
        "name": "web",
        "config": [{ "port": 80, "protocol_version": "http2", "health_check": [{}] }],
    }));
    let planned = listener_schema.plan(&AttributeMap::new(), &config);
    assert_eq!(
        planned.get("config"),
        Some(&json!([{
            "port": 80,
            "protocol_version": "HTTP2",
            "health_check": [{ "path": "/", "interval": 30 }],
        }]))
    );
}

#[rstest]
fn plan_carries_computed_values(listener_schema: Schema) {
    let prior = map(json!({
        "arn": "arn:tg/1",
        "name": "web",
        "config": [{
            "port": 80,
            "protocol_version": "HTTP1",
            "health_check": [{ "path": "/", "interval": 30 }],
        }],
    }));
    let config = map(json!({ "name": "web", "config": [{ "port": 80 }] }));
    let planned = listener_schema.plan(&prior, &config);
    assert_eq!(planned, prior);
    assert!(listener_schema.replacement_paths(&prior, &planned).is_empty());
}

#[rstest]
#[case(json!({ "name": "api", "config": [{ "port": 80 }] }), vec!["name"])]
#[case(json!({ "name": "web", "config": [{ "port": 443 }] }), vec!["config.0.port"])]
#[case(
    json!({ "name": "web", "config": [{ "port": 80, "protocol_version": "http2" }] }),
    vec!["config.0.protocol_version"]
)]
#[case(json!({ "name": "web", "config": [{ "port": 80 }], "tags": { "a": "b" } }), vec![])]
fn replacement_paths_name_force_new_changes(
    listener_schema: Schema,
    #[case] config: Value,
    #[case] expected: Vec<&str>,
) {
    let prior = map(json!({
        "name": "web",
        "config": [{ "port": 80, "protocol_version": "HTTP1", "health_check": [] }],
    }));
    let planned = listener_schema.plan(&prior, &map(config));
    assert_eq!(listener_schema.replacement_paths(&prior, &planned), expected);
}

#[rstest]
#[case(None, false)]
#[case(Some(json!(null)), false)]
#[case(Some(json!(0)), false)]
#[case(Some(json!(-1)), true)]
#[case(Some(json!(u64::MAX)), true)]
#[case(Some(json!("")), false)]
#[case(Some(json!([])), false)]
#[case(Some(json!(false)), false)]
#[case(Some(json!(7)), true)]
#[case(Some(json!([{}])), true)]
fn is_set_treats_zero_values_as_unset(#[case] value: Option<Value>, #[case] expected: bool) {
    assert_eq!(is_set(value.as_ref()), expected);
}

#[rstest]
fn describe_lists_flags_defaults_and_nested_blocks(listener_schema: Schema) {
    let description = listener_schema.describe();

    assert_eq!(
        description.get("arn"),
        Some(&json!({ "type": "string", "computed": true }))
    );
    assert_eq!(
        description.pointer("/config/block/health_check/block/interval"),
        Some(&json!({ "type": "int", "optional": true, "default": 30 }))
    );
    assert_eq!(
        description.pointer("/config/block/port"),
        Some(&json!({ "type": "int", "required": true, "force_new": true }))
    );
    assert_eq!(description.pointer("/config/max_items"), Some(&json!(1)));
}
