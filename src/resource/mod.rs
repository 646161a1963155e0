//! Resource and data-source abstractions shared by every service.
//!
//! Handlers return boxed `Send` futures so the traits stay object safe and
//! the provider can hold heterogeneous implementations in one registry.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::{AttributeMap, Schema};
use crate::state::ResourceData;
use crate::tags::Tags;
use crate::vendor::ControlPlane;

/// Name of the configuration block that overrides operation timeouts.
pub const ATTR_TIMEOUTS: &str = "timeouts";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Largest bound a `timeouts` block may request: seven days, in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Future returned by lifecycle handlers.
pub type ResourceFuture<'a, T = ()> =
    Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Bounds applied to the create, update and delete waits of one instance.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timeouts {
    /// Bound for create plus its convergence wait.
    pub create: Duration,
    /// Bound for update plus its convergence wait.
    pub update: Duration,
    /// Bound for delete plus its convergence wait.
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::uniform(DEFAULT_TIMEOUT)
    }
}

impl Timeouts {
    /// Uses the same bound for every operation.
    #[must_use]
    pub const fn uniform(timeout: Duration) -> Self {
        Self {
            create: timeout,
            update: timeout,
            delete: timeout,
        }
    }

    /// Applies a `timeouts` configuration block given in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Validation`] when the block is not a map of
    /// `create`, `update` and `delete` to integers between 1 and
    /// [`MAX_TIMEOUT_SECS`].
    pub fn with_overrides(self, block: Option<&Value>) -> Result<Self, ProviderError> {
        let Some(raw) = block.filter(|value| !value.is_null()) else {
            return Ok(self);
        };
        let map = raw.as_object().ok_or_else(|| {
            ProviderError::Validation(vec![format!("{ATTR_TIMEOUTS}: expected a map")])
        })?;

        let mut timeouts = self;
        let mut errors = Vec::new();
        for (key, value) in map {
            let Some(seconds) = value
                .as_u64()
                .filter(|secs| (1..=MAX_TIMEOUT_SECS).contains(secs))
            else {
                errors.push(format!(
                    "{ATTR_TIMEOUTS}.{key}: expected between 1 and {MAX_TIMEOUT_SECS} seconds"
                ));
                continue;
            };
            let bound = Duration::from_secs(seconds);
            match key.as_str() {
                "create" => timeouts.create = bound,
                "update" => timeouts.update = bound,
                "delete" => timeouts.delete = bound,
                _ => errors.push(format!("{ATTR_TIMEOUTS}.{key}: unsupported timeout")),
            }
        }
        if errors.is_empty() {
            Ok(timeouts)
        } else {
            Err(ProviderError::Validation(errors))
        }
    }
}

/// Immutable context shared by every handler invocation.
#[derive(Clone)]
pub struct ProviderClient {
    /// Vendor control plane.
    pub control_plane: Arc<dyn ControlPlane>,
    /// Tags applied to every taggable resource.
    pub default_tags: Tags,
    /// Region the control plane operates in.
    pub region: String,
    /// Fixed waiter interval overriding the backoff, mainly for tests.
    pub poll_interval: Option<Duration>,
}

impl ProviderClient {
    /// Creates a client with no default tags and backoff polling.
    #[must_use]
    pub fn new(control_plane: Arc<dyn ControlPlane>, region: impl Into<String>) -> Self {
        Self {
            control_plane,
            default_tags: Tags::new(),
            region: region.into(),
            poll_interval: None,
        }
    }

    /// Sets the provider default tags.
    #[must_use]
    pub fn with_default_tags(mut self, default_tags: Tags) -> Self {
        self.default_tags = default_tags;
        self
    }

    /// Sets a fixed waiter interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Option<Duration>) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Returns the control plane as a trait object reference.
    #[must_use]
    pub fn api(&self) -> &dyn ControlPlane {
        self.control_plane.as_ref()
    }
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("default_tags", &self.default_tags)
            .field("region", &self.region)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

/// A managed resource type.
pub trait Resource: Send + Sync {
    /// Registered type name.
    fn type_name(&self) -> &'static str;

    /// Attributes accepted by the resource.
    fn schema(&self) -> Schema;

    /// Timeouts used when configuration does not override them.
    fn default_timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    /// Cross-attribute validation run after schema validation.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Validation`] describing the violation.
    fn customize_diff(&self, _config: &AttributeMap) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Creates the object and populates `data` through a read.
    fn create<'a>(
        &'a self,
        client: &'a ProviderClient,
        data: &'a mut ResourceData,
    ) -> ResourceFuture<'a>;

    /// Refreshes `data` from the control plane, clearing the id on drift.
    fn read<'a>(&'a self, client: &'a ProviderClient, data: &'a mut ResourceData)
    -> ResourceFuture<'a>;

    /// Applies in-place changes and populates `data` through a read.
    fn update<'a>(
        &'a self,
        client: &'a ProviderClient,
        data: &'a mut ResourceData,
    ) -> ResourceFuture<'a>;

    /// Deletes the object; an object that is already gone is not an error.
    fn delete<'a>(
        &'a self,
        client: &'a ProviderClient,
        data: &'a mut ResourceData,
    ) -> ResourceFuture<'a>;
}

/// A read-only data source.
pub trait DataSource: Send + Sync {
    /// Registered type name.
    fn type_name(&self) -> &'static str;

    /// Attributes accepted and produced by the data source.
    fn schema(&self) -> Schema;

    /// Reads the data source into `data`.
    fn read<'a>(&'a self, client: &'a ProviderClient, data: &'a mut ResourceData)
    -> ResourceFuture<'a>;
}
