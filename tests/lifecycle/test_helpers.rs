//! Shared fixtures for lifecycle BDD scenarios.

use std::sync::Arc;
use std::time::Duration;

use rstest::fixture;
use serde_json::{Value, json};
use stratus::schema::AttributeMap;
use stratus::test_support::{InMemoryControlPlane, TEST_REGION};
use stratus::{Plan, Provider, ProviderClient, ResourceState};

#[derive(Clone, Debug)]
pub enum ApplyOutcome {
    Applied(Option<ResourceState>),
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct LifecycleContext {
    pub api: InMemoryControlPlane,
    pub type_name: String,
    pub state: Option<ResourceState>,
    pub plan: Option<Plan>,
    pub outcome: Option<ApplyOutcome>,
    pub calls_before: usize,
}

#[fixture]
pub fn lifecycle_context() -> LifecycleContext {
    LifecycleContext {
        api: InMemoryControlPlane::new(),
        type_name: String::new(),
        state: None,
        plan: None,
        outcome: None,
        calls_before: 0,
    }
}

impl LifecycleContext {
    pub fn provider(&self) -> Provider {
        Provider::new(
            ProviderClient::new(Arc::new(self.api.clone()), TEST_REGION)
                .with_poll_interval(Some(Duration::from_millis(1))),
        )
    }
}

fn object(value: Value) -> AttributeMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

pub fn target_group_config(name: &str) -> AttributeMap {
    object(json!({
        "name": name,
        "type": "IP",
        "config": [{ "port": 80, "protocol": "HTTP", "vpc_identifier": "vpc-1" }],
    }))
}

pub fn domain_config(name: &str, env: &str) -> AttributeMap {
    object(json!({
        "name": name,
        "workflow_execution_retention_period_in_days": "7",
        "tags": { "env": env },
    }))
}
