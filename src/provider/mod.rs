//! Provider driver: the registry of resource and data-source types and the
//! logic that turns configuration plus prior state into lifecycle calls.
//!
//! Configuration is validated before any control-plane call. Planning fills
//! defaults, carries computed values and merges provider default tags into
//! `tags_all`; the plan then decides between create, in-place update,
//! replacement, or nothing at all.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::{Action, ProviderError};
use crate::resource::{ATTR_TIMEOUTS, DataSource, ProviderClient, Resource, Timeouts};
use crate::schema::{AttributeMap, present};
use crate::services;
use crate::state::{ResourceData, ResourceState};
use crate::tags::{self, ATTR_TAGS, ATTR_TAGS_ALL};

/// What an apply will do to a resource instance.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlanAction {
    /// No prior state; the object is created.
    Create,
    /// Mutable attributes changed; the object is updated in place.
    Update,
    /// A force-new attribute changed; the object is destroyed and recreated.
    Replace,
    /// Planned state equals prior state.
    NoOp,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::NoOp => "no-op",
        })
    }
}

/// Result of planning one resource instance.
#[derive(Clone, Debug, PartialEq)]
pub struct Plan {
    /// Chosen lifecycle action.
    pub action: PlanAction,
    /// Attributes the handlers will see as configuration.
    pub planned: AttributeMap,
    /// Force-new attributes that changed, as dotted paths.
    pub replace_paths: Vec<String>,
    /// Bounds for the lifecycle waits.
    pub timeouts: Timeouts,
}

/// Registered resource and data-source types bound to one client.
pub struct Provider {
    client: ProviderClient,
    resources: BTreeMap<&'static str, Arc<dyn Resource>>,
    data_sources: BTreeMap<&'static str, Arc<dyn DataSource>>,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("client", &self.client)
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("data_sources", &self.data_sources.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Provider {
    /// Creates a provider with every shipped resource and data source.
    #[must_use]
    pub fn new(client: ProviderClient) -> Self {
        let resources = services::resources()
            .into_iter()
            .map(|resource| (resource.type_name(), resource))
            .collect();
        let data_sources = services::data_sources()
            .into_iter()
            .map(|source| (source.type_name(), source))
            .collect();
        Self {
            client,
            resources,
            data_sources,
        }
    }

    /// Returns the client handed to every handler.
    #[must_use]
    pub const fn client(&self) -> &ProviderClient {
        &self.client
    }

    fn resource(&self, type_name: &str) -> Result<&Arc<dyn Resource>, ProviderError> {
        self.resources
            .get(type_name)
            .ok_or_else(|| ProviderError::UnknownType(type_name.to_owned()))
    }

    fn data_source(&self, type_name: &str) -> Result<&Arc<dyn DataSource>, ProviderError> {
        self.data_sources
            .get(type_name)
            .ok_or_else(|| ProviderError::UnknownType(type_name.to_owned()))
    }

    /// Describes the schema of every shipped resource and data source.
    #[must_use]
    pub fn schemas() -> Value {
        let resources: AttributeMap = services::resources()
            .iter()
            .map(|resource| (resource.type_name().to_owned(), resource.schema().describe()))
            .collect();
        let data_sources: AttributeMap = services::data_sources()
            .iter()
            .map(|source| (source.type_name().to_owned(), source.schema().describe()))
            .collect();
        json!({ "resources": resources, "data_sources": data_sources })
    }

    /// Validates `config` and plans it against `prior`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::UnknownType`] for unregistered types and
    /// [`ProviderError::Validation`] when the configuration or its
    /// `timeouts` block is invalid.
    pub fn plan(
        &self,
        type_name: &str,
        config: &AttributeMap,
        prior: Option<&ResourceState>,
    ) -> Result<Plan, ProviderError> {
        let resource = self.resource(type_name)?;
        let mut config = config.clone();
        let timeouts = resource
            .default_timeouts()
            .with_overrides(config.remove(ATTR_TIMEOUTS).as_ref())?;
        let schema = resource.schema();
        schema.validate(&config)?;
        resource.customize_diff(&config)?;

        let Some(prior) = prior.filter(|state| !state.id.is_empty()) else {
            return Ok(Plan {
                action: PlanAction::Create,
                planned: self.planned(resource.as_ref(), &AttributeMap::new(), &config),
                replace_paths: Vec::new(),
                timeouts,
            });
        };

        let planned = self.planned(resource.as_ref(), &prior.attributes, &config);
        let replace_paths = schema.replacement_paths(&prior.attributes, &planned);
        let action = if prior.tainted || !replace_paths.is_empty() {
            PlanAction::Replace
        } else if differs(&prior.attributes, &planned) {
            PlanAction::Update
        } else {
            PlanAction::NoOp
        };
        Ok(Plan {
            action,
            planned,
            replace_paths,
            timeouts,
        })
    }

    fn planned(
        &self,
        resource: &dyn Resource,
        prior: &AttributeMap,
        config: &AttributeMap,
    ) -> AttributeMap {
        let schema = resource.schema();
        let mut planned = schema.plan(prior, config);
        if schema.get(ATTR_TAGS_ALL).is_some() {
            let all = tags::merge(
                &self.client.default_tags,
                &tags::from_value(planned.get(ATTR_TAGS)),
            );
            planned.insert(String::from(ATTR_TAGS_ALL), tags::to_value(&all));
        }
        planned
    }

    /// Converges one resource instance on `config`.
    ///
    /// Returns the new state, or `None` when the object disappeared while
    /// being updated.
    ///
    /// # Errors
    ///
    /// Returns validation errors before any control-plane call, and handler
    /// diagnostics otherwise. Failures after the remote object changed come
    /// back as [`ProviderError::Incomplete`] carrying what now exists.
    pub async fn apply(
        &self,
        type_name: &str,
        config: &AttributeMap,
        prior: Option<ResourceState>,
    ) -> Result<Option<ResourceState>, ProviderError> {
        let plan = self.plan(type_name, config, prior.as_ref())?;
        let resource = self.resource(type_name)?;
        info!(type_name, action = %plan.action, "applying resource");

        match (plan.action, prior) {
            (PlanAction::NoOp, prior) => Ok(prior),
            (PlanAction::Update, Some(prior)) => {
                let mut data =
                    ResourceData::for_update(prior.id, prior.attributes, plan.planned, plan.timeouts);
                resource.update(&self.client, &mut data).await?;
                Ok(data.into_state(type_name))
            }
            (PlanAction::Replace, Some(prior)) => {
                debug!(type_name, paths = ?plan.replace_paths, tainted = prior.tainted, "replacing resource");
                let mut doomed =
                    ResourceData::for_existing(prior.id, prior.attributes, plan.timeouts);
                resource.delete(&self.client, &mut doomed).await?;
                self.create(resource.as_ref(), config, plan.timeouts)
                    .await
                    .map_err(|err| match err {
                        ProviderError::Incomplete { .. } => err,
                        other => ProviderError::Incomplete {
                            state: None,
                            source: Box::new(other),
                        },
                    })
            }
            (_, _) => {
                let data = ResourceData::for_create(plan.planned, plan.timeouts);
                create_with(resource.as_ref(), &self.client, data).await
            }
        }
    }

    /// Refreshes `prior` from the control plane, then plans `config`
    /// against what still exists. Tainted state is planned as recorded.
    ///
    /// Returns the plan and the refreshed prior to hand to [`Self::apply`].
    ///
    /// # Errors
    ///
    /// Returns validation errors before any control-plane call, and the
    /// read diagnostic otherwise.
    pub async fn refresh_and_plan(
        &self,
        type_name: &str,
        config: &AttributeMap,
        prior: Option<ResourceState>,
    ) -> Result<(Plan, Option<ResourceState>), ProviderError> {
        self.plan(type_name, config, prior.as_ref())?;
        let refreshed = match prior {
            Some(entry) if !entry.tainted && !entry.id.is_empty() => {
                let id = entry.id.clone();
                let fresh = self.refresh(entry).await?;
                if fresh.is_none() {
                    warn!(type_name, %id, "resource no longer exists; planning a create");
                }
                fresh
            }
            other => other,
        };
        let plan = self.plan(type_name, config, refreshed.as_ref())?;
        Ok((plan, refreshed))
    }

    async fn create(
        &self,
        resource: &dyn Resource,
        config: &AttributeMap,
        timeouts: Timeouts,
    ) -> Result<Option<ResourceState>, ProviderError> {
        let mut config = config.clone();
        config.remove(ATTR_TIMEOUTS);
        let planned = self.planned(resource, &AttributeMap::new(), &config);
        let data = ResourceData::for_create(planned, timeouts);
        create_with(resource, &self.client, data).await
    }

    /// Re-reads an instance. Returns `None` when the object is gone.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::UnknownType`] or the read diagnostic.
    pub async fn refresh(
        &self,
        state: ResourceState,
    ) -> Result<Option<ResourceState>, ProviderError> {
        let resource = self.resource(&state.type_name)?;
        let mut data =
            ResourceData::for_existing(state.id, state.attributes, resource.default_timeouts());
        resource.read(&self.client, &mut data).await?;
        Ok(data.into_state(&state.type_name))
    }

    /// Deletes an instance. Objects that are already gone are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::UnknownType`] or the delete diagnostic.
    pub async fn destroy(&self, state: ResourceState) -> Result<(), ProviderError> {
        let resource = self.resource(&state.type_name)?;
        info!(type_name = %state.type_name, id = %state.id, "destroying resource");
        let mut data =
            ResourceData::for_existing(state.id, state.attributes, resource.default_timeouts());
        resource.delete(&self.client, &mut data).await
    }

    /// Adopts an existing remote object by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::ImportNotFound`] when the object does not
    /// exist, and the read diagnostic for other failures.
    pub async fn import(&self, type_name: &str, id: &str) -> Result<ResourceState, ProviderError> {
        let resource = self.resource(type_name)?;
        info!(type_name, id, "importing resource");
        let mut data =
            ResourceData::for_existing(id, AttributeMap::new(), resource.default_timeouts());
        resource
            .read(&self.client, &mut data)
            .await
            .map_err(|err| {
                ProviderError::diagnostic(Action::Importing, resource.type_name(), id, err)
            })?;
        data.into_state(type_name)
            .ok_or_else(|| ProviderError::ImportNotFound {
                type_name: type_name.to_owned(),
                id: id.to_owned(),
            })
    }

    /// Reads a data source with the given arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Validation`] for invalid arguments and the
    /// read diagnostic otherwise.
    pub async fn read_data_source(
        &self,
        type_name: &str,
        config: &AttributeMap,
    ) -> Result<ResourceState, ProviderError> {
        let source = self.data_source(type_name)?;
        let schema = source.schema();
        schema.validate(config)?;
        let mut data = ResourceData::for_create(
            schema.plan(&AttributeMap::new(), config),
            Timeouts::default(),
        );
        source.read(&self.client, &mut data).await?;
        data.into_state(type_name)
            .ok_or_else(|| ProviderError::EmptyResult {
                operation: type_name.to_owned(),
            })
    }
}

/// Runs a create. When the object was assigned an identifier before the
/// failure, the error carries it as tainted state.
async fn create_with(
    resource: &dyn Resource,
    client: &ProviderClient,
    mut data: ResourceData,
) -> Result<Option<ResourceState>, ProviderError> {
    match resource.create(client, &mut data).await {
        Ok(()) => Ok(data.into_state(resource.type_name())),
        Err(err) => match data.into_state(resource.type_name()) {
            Some(mut remnant) => {
                warn!(type_name = resource.type_name(), id = %remnant.id, "create failed; keeping tainted object");
                remnant.tainted = true;
                Err(ProviderError::Incomplete {
                    state: Some(Box::new(remnant)),
                    source: Box::new(err),
                })
            }
            None => Err(err),
        },
    }
}

fn differs(prior: &AttributeMap, planned: &AttributeMap) -> bool {
    prior
        .keys()
        .chain(planned.keys())
        .any(|key| present(prior.get(key)) != present(planned.get(key)))
}
