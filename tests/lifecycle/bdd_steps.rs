//! BDD step definitions for resource lifecycle behaviour.

use rstest_bdd_macros::{given, then, when};
use serde_json::json;
use stratus::ProviderError;
use stratus::schema::AttributeMap;
use stratus::services::{domain, target_group};
use stratus::test_support::InMemoryControlPlane;
use tokio::runtime::Runtime;

use super::test_helpers::{ApplyOutcome, LifecycleContext, domain_config, target_group_config};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn runtime() -> Result<Runtime, StepError> {
    Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))
}

/// Plans and applies `config` against the recorded state.
fn apply(
    mut lifecycle_context: LifecycleContext,
    type_name: &str,
    config: &AttributeMap,
) -> Result<LifecycleContext, StepError> {
    let provider = lifecycle_context.provider();
    let prior = lifecycle_context.state.clone();
    lifecycle_context.plan = Some(
        provider
            .plan(type_name, config, prior.as_ref())
            .map_err(|err| StepError::Assertion(format!("plan: {err}")))?,
    );
    lifecycle_context.calls_before = lifecycle_context.api.calls().len();
    type_name.clone_into(&mut lifecycle_context.type_name);

    let result = runtime()?.block_on(provider.apply(type_name, config, prior));
    lifecycle_context.outcome = Some(match result {
        Ok(state) => {
            lifecycle_context.state.clone_from(&state);
            ApplyOutcome::Applied(state)
        }
        Err(err) => {
            if let ProviderError::Incomplete { state, .. } = &err {
                lifecycle_context.state = state.as_deref().cloned();
            }
            ApplyOutcome::Failed(err.to_string())
        }
    });
    Ok(lifecycle_context)
}

fn applied(lifecycle_context: LifecycleContext) -> Result<LifecycleContext, StepError> {
    if matches!(
        lifecycle_context.outcome,
        Some(ApplyOutcome::Applied(Some(_)))
    ) {
        Ok(lifecycle_context)
    } else {
        Err(StepError::Assertion(format!(
            "expected an applied resource, got {:?}",
            lifecycle_context.outcome
        )))
    }
}

#[given("an empty control plane")]
fn empty_control_plane(lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context
}

#[given("a control plane whose target groups settle as \"{status}\"")]
fn control_plane_settling_as(
    mut lifecycle_context: LifecycleContext,
    status: String,
) -> LifecycleContext {
    lifecycle_context.api = InMemoryControlPlane::new().with_settle_status(status.trim());
    lifecycle_context
}

#[given("a target group named \"{name}\" has been applied")]
fn target_group_applied(
    lifecycle_context: LifecycleContext,
    name: String,
) -> Result<LifecycleContext, StepError> {
    let config = target_group_config(name.trim());
    applied(apply(lifecycle_context, target_group::TYPE_NAME, &config)?)
}

#[given("a domain named \"{name}\" tagged env \"{env}\" has been applied")]
fn domain_applied(
    lifecycle_context: LifecycleContext,
    name: String,
    env: String,
) -> Result<LifecycleContext, StepError> {
    let config = domain_config(name.trim(), env.trim());
    applied(apply(lifecycle_context, domain::TYPE_NAME, &config)?)
}

#[given("the domain is deprecated out of band")]
fn domain_deprecated(lifecycle_context: LifecycleContext) -> Result<LifecycleContext, StepError> {
    let Some(state) = lifecycle_context.state.as_ref() else {
        return Err(StepError::Assertion(String::from("no domain was applied")));
    };
    lifecycle_context.api.deprecate_domain_out_of_band(&state.id);
    Ok(lifecycle_context)
}

#[given("the target group is deleted out of band")]
fn target_group_deleted(lifecycle_context: LifecycleContext) -> Result<LifecycleContext, StepError> {
    let Some(state) = lifecycle_context.state.as_ref() else {
        return Err(StepError::Assertion(String::from("no target group was applied")));
    };
    lifecycle_context.api.remove_target_group(&state.id);
    Ok(lifecycle_context)
}

#[when("the target group is applied again after refreshing")]
fn refresh_and_reapply_target_group(
    mut lifecycle_context: LifecycleContext,
) -> Result<LifecycleContext, StepError> {
    let name = lifecycle_context
        .state
        .as_ref()
        .and_then(|state| state.attributes.get("name"))
        .and_then(|name| name.as_str())
        .map(str::to_owned)
        .ok_or_else(|| StepError::Assertion(String::from("no target group was applied")))?;
    let config = target_group_config(&name);
    let provider = lifecycle_context.provider();
    lifecycle_context.calls_before = lifecycle_context.api.calls().len();
    target_group::TYPE_NAME.clone_into(&mut lifecycle_context.type_name);

    let runtime = runtime()?;
    let (plan, prior) = runtime
        .block_on(provider.refresh_and_plan(
            target_group::TYPE_NAME,
            &config,
            lifecycle_context.state.take(),
        ))
        .map_err(|err| StepError::Assertion(format!("refresh and plan: {err}")))?;
    lifecycle_context.plan = Some(plan);

    let result = runtime.block_on(provider.apply(target_group::TYPE_NAME, &config, prior));
    lifecycle_context.outcome = Some(match result {
        Ok(state) => {
            lifecycle_context.state.clone_from(&state);
            ApplyOutcome::Applied(state)
        }
        Err(err) => ApplyOutcome::Failed(err.to_string()),
    });
    Ok(lifecycle_context)
}

#[when("the same target group configuration is applied again")]
fn reapply_target_group(lifecycle_context: LifecycleContext) -> Result<LifecycleContext, StepError> {
    let name = lifecycle_context
        .state
        .as_ref()
        .and_then(|state| state.attributes.get("name"))
        .and_then(|name| name.as_str())
        .map(str::to_owned)
        .ok_or_else(|| StepError::Assertion(String::from("no target group was applied")))?;
    apply(lifecycle_context, target_group::TYPE_NAME, &target_group_config(&name))
}

#[when("the domain is applied again tagged env \"{env}\"")]
fn reapply_domain(
    lifecycle_context: LifecycleContext,
    env: String,
) -> Result<LifecycleContext, StepError> {
    let name = lifecycle_context
        .state
        .as_ref()
        .map(|state| state.id.clone())
        .ok_or_else(|| StepError::Assertion(String::from("no domain was applied")))?;
    apply(lifecycle_context, domain::TYPE_NAME, &domain_config(&name, env.trim()))
}

#[when("a target group named \"{name}\" is applied")]
fn apply_target_group(
    lifecycle_context: LifecycleContext,
    name: String,
) -> Result<LifecycleContext, StepError> {
    let config = target_group_config(name.trim());
    apply(lifecycle_context, target_group::TYPE_NAME, &config)
}

#[when("the managed resource is refreshed")]
fn refresh(mut lifecycle_context: LifecycleContext) -> Result<LifecycleContext, StepError> {
    let Some(state) = lifecycle_context.state.take() else {
        return Err(StepError::Assertion(String::from("nothing is managed")));
    };
    let provider = lifecycle_context.provider();
    let refreshed = runtime()?
        .block_on(provider.refresh(state))
        .map_err(|err| StepError::Assertion(format!("refresh: {err}")))?;
    lifecycle_context.state = refreshed;
    Ok(lifecycle_context)
}

#[then("the plan is \"{action}\"")]
fn plan_is(lifecycle_context: &LifecycleContext, action: String) -> Result<(), StepError> {
    let Some(plan) = lifecycle_context.plan.as_ref() else {
        return Err(StepError::Assertion(String::from("missing plan")));
    };
    if plan.action.to_string() == action.trim() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected plan {action}, got {}",
            plan.action
        )))
    }
}

#[then("no further control plane calls were made")]
fn no_further_calls(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let calls = lifecycle_context.api.calls();
    if calls.len() == lifecycle_context.calls_before {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "unexpected calls: {:?}",
            calls.get(lifecycle_context.calls_before..)
        )))
    }
}

#[then("the control plane saw {count:u32} \"{operation}\" call")]
fn saw_calls(
    lifecycle_context: &LifecycleContext,
    count: u32,
    operation: String,
) -> Result<(), StepError> {
    let seen = lifecycle_context.api.call_count(operation.trim());
    if seen == count as usize {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} {operation} calls, saw {seen}"
        )))
    }
}

#[then("the recorded tags include env \"{env}\"")]
fn recorded_tags(lifecycle_context: &LifecycleContext, env: String) -> Result<(), StepError> {
    let tags = lifecycle_context
        .state
        .as_ref()
        .and_then(|state| state.attributes.get("tags_all"));
    if tags.and_then(|all| all.get("env")) == Some(&json!(env.trim())) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("unexpected tags: {tags:?}")))
    }
}

#[then("the managed resource is gone")]
fn resource_gone(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    match lifecycle_context.state.as_ref() {
        None => Ok(()),
        Some(state) => Err(StepError::Assertion(format!(
            "{} {} still present",
            lifecycle_context.type_name, state.id
        ))),
    }
}

#[then("the apply fails mentioning \"{text}\"")]
fn apply_fails(lifecycle_context: &LifecycleContext, text: String) -> Result<(), StepError> {
    match lifecycle_context.outcome.as_ref() {
        Some(ApplyOutcome::Failed(message)) if message.contains(text.trim()) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected a failure mentioning {text}, got {other:?}"
        ))),
    }
}

#[then("the last apply made {count:u32} \"{operation}\" call")]
fn last_apply_calls(
    lifecycle_context: &LifecycleContext,
    count: u32,
    operation: String,
) -> Result<(), StepError> {
    let calls = lifecycle_context.api.calls();
    let seen = calls
        .get(lifecycle_context.calls_before..)
        .unwrap_or_default()
        .iter()
        .filter(|call| call.as_str() == operation.trim())
        .count();
    if seen == count as usize {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} {operation} calls in the last apply, saw {seen}"
        )))
    }
}

#[then("the managed resource is tainted")]
fn resource_tainted(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    match lifecycle_context.state.as_ref() {
        Some(state) if state.tainted => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected tainted state, got {other:?}"
        ))),
    }
}
