//! `workflow_domain`: a workflow service domain.
//!
//! Registration is synchronous, so there is no waiter. The domain's name is
//! its identifier. Only tags can change in place; deleting a domain
//! deprecates it, and a deprecated domain reads as missing.

use serde_json::Value;
use tracing::{info, warn};

use crate::error::{Action, ProviderError};
use crate::naming;
use crate::resource::{ProviderClient, Resource, ResourceFuture};
use crate::schema::{Attribute, Schema, Validator};
use crate::state::ResourceData;
use crate::tags::{self, ATTR_TAGS, ATTR_TAGS_ALL};
use crate::vendor::types::{
    DomainConfiguration, DomainInfo, RegisterDomainRequest, registration_status,
};
use crate::vendor::{ControlPlane, ERR_DOMAIN_DEPRECATED_FAULT, ERR_UNKNOWN_RESOURCE_FAULT};

/// Registered type name.
pub const TYPE_NAME: &str = "workflow_domain";
/// Name used in diagnostics.
pub const RESOURCE_NAME: &str = "Domain";

const ATTR_ARN: &str = "arn";
const ATTR_DESCRIPTION: &str = "description";
const ATTR_NAME: &str = "name";
const ATTR_NAME_PREFIX: &str = "name_prefix";
const ATTR_RETENTION: &str = "workflow_execution_retention_period_in_days";

/// Workflow domain resource handlers.
#[derive(Clone, Copy, Debug, Default)]
pub struct DomainResource;

/// Identity and settings of a registered domain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FoundDomain {
    /// Identity and status.
    pub info: DomainInfo,
    /// Settings.
    pub configuration: DomainConfiguration,
}

/// Describes a domain, treating unknown and deprecated domains as missing.
///
/// # Errors
///
/// Returns [`ProviderError::NotFound`] for unknown or deprecated domains,
/// [`ProviderError::EmptyResult`] when the answer lacks its info or
/// configuration, and other vendor errors unchanged.
pub async fn find_domain_by_name(
    api: &dyn ControlPlane,
    name: &str,
) -> Result<FoundDomain, ProviderError> {
    let detail = match api.describe_domain(name).await {
        Ok(detail) => detail,
        Err(err) if err.code_equals(&[ERR_UNKNOWN_RESOURCE_FAULT]) => {
            return Err(ProviderError::NotFound {
                message: format!("domain {name} not found"),
                last_error: Some(err.to_string()),
            });
        }
        Err(err) => return Err(err.into()),
    };

    let (Some(info), Some(configuration)) = (detail.domain_info, detail.configuration) else {
        return Err(ProviderError::EmptyResult {
            operation: String::from("DescribeDomain"),
        });
    };
    if info.status == registration_status::DEPRECATED {
        return Err(ProviderError::not_found(info.status));
    }
    Ok(FoundDomain {
        info,
        configuration,
    })
}

impl Resource for DomainResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .attribute(ATTR_ARN, Attribute::string().computed())
            .attribute(ATTR_DESCRIPTION, Attribute::string().optional().force_new())
            .attribute(
                ATTR_NAME,
                Attribute::string()
                    .optional()
                    .computed()
                    .force_new()
                    .conflicts_with(&[ATTR_NAME_PREFIX]),
            )
            .attribute(
                ATTR_NAME_PREFIX,
                Attribute::string()
                    .optional()
                    .computed()
                    .force_new()
                    .conflicts_with(&[ATTR_NAME]),
            )
            .attribute(
                ATTR_RETENTION,
                Attribute::string()
                    .required()
                    .force_new()
                    .validate(Validator::IntStringBetween(0, 90)),
            )
            .attribute(ATTR_TAGS, tags::tags_schema())
            .attribute(ATTR_TAGS_ALL, tags::tags_all_schema())
    }

    fn create<'a>(
        &'a self,
        client: &'a ProviderClient,
        data: &'a mut ResourceData,
    ) -> ResourceFuture<'a> {
        Box::pin(async move {
            let name = naming::create_name(data.get_str(ATTR_NAME), data.get_str(ATTR_NAME_PREFIX));
            let request = RegisterDomainRequest {
                name: name.clone(),
                description: data
                    .get_ok(ATTR_DESCRIPTION)
                    .and_then(Value::as_str)
                    .map(str::to_owned),
                workflow_execution_retention_period_in_days: data.get_str(ATTR_RETENTION).to_owned(),
                tags: tags::merge(&client.default_tags, &tags::from_value(data.get(ATTR_TAGS))),
            };

            client
                .api()
                .register_domain(&request)
                .await
                .map_err(|err| {
                    ProviderError::diagnostic(Action::Creating, RESOURCE_NAME, &name, err.into())
                })?;
            info!(%name, "registered workflow domain");
            data.set_id(name);

            read_domain(client, data).await
        })
    }

    fn read<'a>(
        &'a self,
        client: &'a ProviderClient,
        data: &'a mut ResourceData,
    ) -> ResourceFuture<'a> {
        Box::pin(read_domain(client, data))
    }

    fn update<'a>(
        &'a self,
        client: &'a ProviderClient,
        data: &'a mut ResourceData,
    ) -> ResourceFuture<'a> {
        Box::pin(async move {
            if data.has_change(ATTR_TAGS_ALL) {
                let id = data.id().to_owned();
                let arn = data.get_str(ATTR_ARN).to_owned();
                let old = tags::from_value(data.prior(ATTR_TAGS_ALL));
                let new = tags::from_value(data.get(ATTR_TAGS_ALL));
                tags::update_tags(client.api(), &arn, &old, &new)
                    .await
                    .map_err(|err| {
                        ProviderError::diagnostic(Action::Tagging, RESOURCE_NAME, id, err)
                    })?;
            }
            read_domain(client, data).await
        })
    }

    fn delete<'a>(
        &'a self,
        client: &'a ProviderClient,
        data: &'a mut ResourceData,
    ) -> ResourceFuture<'a> {
        Box::pin(async move {
            let name = match data.get_str(ATTR_NAME) {
                "" => data.id().to_owned(),
                name => name.to_owned(),
            };
            info!(%name, "deprecating workflow domain");
            match client.api().deprecate_domain(&name).await {
                Ok(()) => Ok(()),
                Err(err)
                    if err.code_equals(&[ERR_DOMAIN_DEPRECATED_FAULT, ERR_UNKNOWN_RESOURCE_FAULT]) =>
                {
                    Ok(())
                }
                Err(err) => Err(ProviderError::diagnostic(
                    Action::Deleting,
                    RESOURCE_NAME,
                    data.id(),
                    err.into(),
                )),
            }
        })
    }
}

async fn read_domain(client: &ProviderClient, data: &mut ResourceData) -> Result<(), ProviderError> {
    let id = data.id().to_owned();
    let domain = match find_domain_by_name(client.api(), &id).await {
        Ok(domain) => domain,
        Err(err) if !data.is_new_resource() && err.is_not_found() => {
            warn!(%id, "workflow domain not found, removing from state");
            data.clear_id();
            return Ok(());
        }
        Err(err) => {
            return Err(ProviderError::diagnostic(
                Action::Reading,
                RESOURCE_NAME,
                id,
                err,
            ));
        }
    };

    let arn = domain.info.arn.clone().unwrap_or_default();
    data.set(ATTR_ARN, arn.clone());
    data.set(
        ATTR_DESCRIPTION,
        domain.info.description.map_or(Value::Null, Value::from),
    );
    data.set(
        ATTR_NAME_PREFIX,
        naming::name_prefix_from_name(&domain.info.name).map_or(Value::Null, Value::from),
    );
    data.set(ATTR_NAME, domain.info.name);
    data.set(
        ATTR_RETENTION,
        domain.configuration.workflow_execution_retention_period_in_days,
    );

    if !arn.is_empty() {
        let all = client.api().list_tags(&arn).await.map_err(|err| {
            ProviderError::diagnostic(Action::Reading, RESOURCE_NAME, &id, err.into())
        })?;
        data.set(ATTR_TAGS, tags::to_value(&tags::without_defaults(&all, &client.default_tags)));
        data.set(ATTR_TAGS_ALL, tags::to_value(&all));
    }
    Ok(())
}
