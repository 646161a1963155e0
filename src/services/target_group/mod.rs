//! `lattice_target_group`: a service-network target group.
//!
//! Creation and health check updates are asynchronous; both wait for the
//! group to report `ACTIVE` twice in a row before reading it back. Deletion
//! waits until the group is gone.

pub mod expand;
pub mod find;

use std::time::Duration;

use serde_json::{Value, json};
use tracing::{info, warn};

use crate::error::{Action, ProviderError};
use crate::naming;
use crate::resource::{ProviderClient, Resource, ResourceFuture, Timeouts};
use crate::schema::{Attribute, AttributeMap, Normalize, Schema, Validator};
use crate::state::ResourceData;
use crate::tags::{self, ATTR_TAGS, ATTR_TAGS_ALL};
use crate::vendor::ERR_RESOURCE_NOT_FOUND;
use crate::vendor::types::{
    CreateTargetGroupRequest, HEALTH_CHECK_PROTOCOL_VERSIONS, IP_ADDRESS_TYPES,
    TARGET_GROUP_PROTOCOL_VERSIONS, TARGET_GROUP_PROTOCOLS, TARGET_GROUP_TYPE_LAMBDA,
    TARGET_GROUP_TYPES, UpdateTargetGroupRequest,
};
use crate::waiter::retry_when_transient;

use expand::{expand_target_group_config, first_block, flatten_target_group_config};
use find::{
    find_target_group_by_id, wait_target_group_created, wait_target_group_deleted,
    wait_target_group_updated,
};

/// Registered type name.
pub const TYPE_NAME: &str = "lattice_target_group";
/// Name used in diagnostics.
pub const RESOURCE_NAME: &str = "Target Group";

const ATTR_ARN: &str = "arn";
const ATTR_CONFIG: &str = "config";
const ATTR_NAME: &str = "name";
const ATTR_STATUS: &str = "status";
const ATTR_TYPE: &str = "type";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Target group resource handlers.
#[derive(Clone, Copy, Debug, Default)]
pub struct TargetGroupResource;

fn health_check_schema() -> Schema {
    let matcher = Schema::new().attribute("value", Attribute::string().optional().default("200"));
    Schema::new()
        .attribute("enabled", Attribute::bool().optional().default(true))
        .attribute(
            "health_check_interval_seconds",
            Attribute::int()
                .optional()
                .default(30)
                .validate(Validator::IntBetween(5, 300)),
        )
        .attribute(
            "health_check_timeout_seconds",
            Attribute::int()
                .optional()
                .default(5)
                .validate(Validator::IntBetween(1, 120)),
        )
        .attribute(
            "healthy_threshold_count",
            Attribute::int()
                .optional()
                .default(5)
                .validate(Validator::IntBetween(2, 10)),
        )
        .attribute(
            "matcher",
            Attribute::block(matcher).optional().computed().max_items(1),
        )
        .attribute("path", Attribute::string().optional().default("/"))
        .attribute(
            "port",
            Attribute::int()
                .optional()
                .computed()
                .validate(Validator::IsPortNumber),
        )
        .attribute(
            "protocol",
            Attribute::string()
                .optional()
                .computed()
                .validate(Validator::OneOf(TARGET_GROUP_PROTOCOLS)),
        )
        .attribute(
            "protocol_version",
            Attribute::string()
                .optional()
                .default("HTTP1")
                .normalize(Normalize::Uppercase)
                .validate(Validator::OneOf(HEALTH_CHECK_PROTOCOL_VERSIONS)),
        )
        .attribute(
            "unhealthy_threshold_count",
            Attribute::int()
                .optional()
                .default(2)
                .validate(Validator::IntBetween(2, 10)),
        )
}

fn config_schema() -> Schema {
    Schema::new()
        .attribute(
            "health_check",
            Attribute::block(health_check_schema())
                .optional()
                .computed()
                .max_items(1),
        )
        .attribute(
            "ip_address_type",
            Attribute::string()
                .optional()
                .computed()
                .force_new()
                .validate(Validator::OneOf(IP_ADDRESS_TYPES)),
        )
        .attribute(
            "port",
            Attribute::int()
                .required()
                .force_new()
                .validate(Validator::IsPortNumber),
        )
        .attribute(
            "protocol",
            Attribute::string()
                .required()
                .force_new()
                .validate(Validator::OneOf(TARGET_GROUP_PROTOCOLS)),
        )
        .attribute(
            "protocol_version",
            Attribute::string()
                .optional()
                .force_new()
                .default("HTTP1")
                .normalize(Normalize::Uppercase)
                .validate(Validator::OneOf(TARGET_GROUP_PROTOCOL_VERSIONS)),
        )
        .attribute("vpc_identifier", Attribute::string().required().force_new())
}

fn diagnostic(action: Action, id: &str, err: ProviderError) -> ProviderError {
    ProviderError::diagnostic(action, RESOURCE_NAME, id, err)
}

impl Resource for TargetGroupResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .attribute(ATTR_ARN, Attribute::string().computed())
            .attribute(
                ATTR_CONFIG,
                Attribute::block(config_schema()).optional().max_items(1),
            )
            .attribute(
                ATTR_NAME,
                Attribute::string()
                    .required()
                    .force_new()
                    .validate(Validator::StringLenBetween(3, 128)),
            )
            .attribute(ATTR_STATUS, Attribute::string().computed())
            .attribute(
                ATTR_TYPE,
                Attribute::string()
                    .required()
                    .force_new()
                    .validate(Validator::OneOf(TARGET_GROUP_TYPES)),
            )
            .attribute(ATTR_TAGS, tags::tags_schema())
            .attribute(ATTR_TAGS_ALL, tags::tags_all_schema())
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::uniform(DEFAULT_TIMEOUT)
    }

    fn customize_diff(&self, config: &AttributeMap) -> Result<(), ProviderError> {
        let target_group_type = config
            .get(ATTR_TYPE)
            .and_then(Value::as_str)
            .unwrap_or_default();
        let has_config = first_block(config.get(ATTR_CONFIG)).is_some();
        let is_lambda = target_group_type == TARGET_GROUP_TYPE_LAMBDA;
        if has_config && is_lambda {
            return Err(ProviderError::Validation(vec![format!(
                "config not supported for type = {target_group_type:?}"
            )]));
        }
        if !has_config && !is_lambda {
            return Err(ProviderError::Validation(vec![format!(
                "config required for type = {target_group_type:?}"
            )]));
        }
        Ok(())
    }

    fn create<'a>(
        &'a self,
        client: &'a ProviderClient,
        data: &'a mut ResourceData,
    ) -> ResourceFuture<'a> {
        Box::pin(async move {
            let name = data.get_str(ATTR_NAME).to_owned();
            let request = CreateTargetGroupRequest {
                client_token: naming::unique_suffix(),
                name: name.clone(),
                target_group_type: data.get_str(ATTR_TYPE).to_owned(),
                config: first_block(data.get_ok(ATTR_CONFIG)).map(expand_target_group_config),
                tags: tags::merge(&client.default_tags, &tags::from_value(data.get(ATTR_TAGS))),
            };
            let timeouts = *data.timeouts();

            let response = retry_when_transient(timeouts.create, || async {
                client
                    .api()
                    .create_target_group(&request)
                    .await
                    .map_err(ProviderError::from)
            })
            .await
            .map_err(|err| diagnostic(Action::Creating, &name, err))?;

            let id = response.id.ok_or_else(|| {
                diagnostic(
                    Action::Creating,
                    &name,
                    ProviderError::EmptyResult {
                        operation: String::from("CreateTargetGroup"),
                    },
                )
            })?;
            data.set_id(id.clone());
            info!(%id, %name, "target group creation accepted");

            wait_target_group_created(client, &id, timeouts.create)
                .await
                .map_err(|err| diagnostic(Action::WaitingForCreation, &id, err))?;

            read_target_group(client, data).await
        })
    }

    fn read<'a>(
        &'a self,
        client: &'a ProviderClient,
        data: &'a mut ResourceData,
    ) -> ResourceFuture<'a> {
        Box::pin(read_target_group(client, data))
    }

    fn update<'a>(
        &'a self,
        client: &'a ProviderClient,
        data: &'a mut ResourceData,
    ) -> ResourceFuture<'a> {
        Box::pin(async move {
            let id = data.id().to_owned();
            let timeouts = *data.timeouts();

            if data.has_changes_except(&[ATTR_TAGS, ATTR_TAGS_ALL]) && data.has_change(ATTR_CONFIG) {
                let health_check = first_block(data.get_ok(ATTR_CONFIG))
                    .map(expand_target_group_config)
                    .and_then(|config| config.health_check);
                if let Some(health_check) = health_check {
                    let request = UpdateTargetGroupRequest {
                        target_group_identifier: id.clone(),
                        health_check,
                    };
                    let response = client
                        .api()
                        .update_target_group(&request)
                        .await
                        .map_err(|err| diagnostic(Action::Updating, &id, err.into()))?;
                    let updated_id = response.id.unwrap_or_else(|| id.clone());
                    wait_target_group_updated(client, &updated_id, timeouts.update)
                        .await
                        .map_err(|err| diagnostic(Action::WaitingForUpdate, &id, err))?;
                }
            }

            if data.has_change(ATTR_TAGS_ALL) {
                let arn = data.get_str(ATTR_ARN).to_owned();
                let old = tags::from_value(data.prior(ATTR_TAGS_ALL));
                let new = tags::from_value(data.get(ATTR_TAGS_ALL));
                tags::update_tags(client.api(), &arn, &old, &new)
                    .await
                    .map_err(|err| diagnostic(Action::Tagging, &id, err))?;
            }

            read_target_group(client, data).await
        })
    }

    fn delete<'a>(
        &'a self,
        client: &'a ProviderClient,
        data: &'a mut ResourceData,
    ) -> ResourceFuture<'a> {
        Box::pin(async move {
            let id = data.id().to_owned();
            info!(%id, "deleting target group");
            match client.api().delete_target_group(&id).await {
                Ok(_) => {}
                Err(err) if err.code_equals(&[ERR_RESOURCE_NOT_FOUND]) => return Ok(()),
                Err(err) => return Err(diagnostic(Action::Deleting, &id, err.into())),
            }

            wait_target_group_deleted(client, &id, data.timeouts().delete)
                .await
                .map_err(|err| diagnostic(Action::WaitingForDeletion, &id, err))
        })
    }
}

async fn read_target_group(
    client: &ProviderClient,
    data: &mut ResourceData,
) -> Result<(), ProviderError> {
    let id = data.id().to_owned();
    let target_group = match find_target_group_by_id(client.api(), &id).await {
        Ok(target_group) => target_group,
        Err(err) if !data.is_new_resource() && err.is_not_found() => {
            warn!(%id, "target group not found, removing from state");
            data.clear_id();
            return Ok(());
        }
        Err(err) => return Err(diagnostic(Action::Reading, &id, err)),
    };

    let arn = target_group.arn.clone().unwrap_or_default();
    data.set(ATTR_ARN, arn.clone());
    match &target_group.config {
        Some(config) => data.set(
            ATTR_CONFIG,
            json!([Value::Object(flatten_target_group_config(config))]),
        ),
        None => data.set(ATTR_CONFIG, Value::Null),
    }
    data.set(ATTR_NAME, target_group.name.unwrap_or_default());
    data.set(ATTR_STATUS, target_group.status.unwrap_or_default());
    data.set(ATTR_TYPE, target_group.target_group_type.unwrap_or_default());

    if !arn.is_empty() {
        let all = client
            .api()
            .list_tags(&arn)
            .await
            .map_err(|err| diagnostic(Action::Reading, &id, err.into()))?;
        data.set(ATTR_TAGS, tags::to_value(&tags::without_defaults(&all, &client.default_tags)));
        data.set(ATTR_TAGS_ALL, tags::to_value(&all));
    }
    Ok(())
}
