//! Provider configuration loading via `ortho-config`.

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::resource::ProviderClient;
use crate::tags::{self, Tags};
use crate::vendor::HttpControlPlane;

/// Control plane used when no endpoint is configured.
pub const DEFAULT_ENDPOINT: &str = "https://api.stratus.cloud";
/// Region used when no region is configured.
pub const DEFAULT_REGION: &str = "eu-west-1";

/// Provider settings derived from defaults, `stratus.toml`, environment
/// variables, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "STRATUS",
    discovery(
        app_name = "stratus",
        env_var = "STRATUS_CONFIG_PATH",
        config_file_name = "stratus.toml",
        dotfile_name = ".stratus.toml",
        project_file_name = "stratus.toml"
    )
)]
pub struct ProviderConfig {
    /// Token sent with every control-plane request. This value is required.
    pub api_token: String,
    /// Base URL of the control plane.
    #[ortho_config(default = DEFAULT_ENDPOINT.to_owned())]
    pub endpoint: String,
    /// Region every resource is managed in.
    #[ortho_config(default = DEFAULT_REGION.to_owned())]
    pub region: String,
    /// Tags applied to every taggable resource, as `key=value` pairs
    /// separated by commas.
    pub default_tags: Option<String>,
    /// Fixed interval between waiter polls, replacing the backoff.
    pub poll_interval_ms: Option<u64>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl ProviderConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to stratus.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("stratus")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and TOML key that supply the offending value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::Invalid`] when a value cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.api_token,
            &FieldMetadata::new("control plane API token", "STRATUS_API_TOKEN", "api_token"),
        )?;
        Self::require_field(
            &self.endpoint,
            &FieldMetadata::new("control plane endpoint", "STRATUS_ENDPOINT", "endpoint"),
        )?;
        Self::require_field(
            &self.region,
            &FieldMetadata::new("region", "STRATUS_REGION", "region"),
        )?;
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "endpoint must be an http(s) URL, got {}: fix STRATUS_ENDPOINT or endpoint in stratus.toml",
                self.endpoint
            )));
        }
        if self.poll_interval_ms == Some(0) {
            return Err(ConfigError::Invalid(String::from(
                "poll_interval_ms must be positive: fix STRATUS_POLL_INTERVAL_MS or poll_interval_ms in stratus.toml",
            )));
        }
        self.parsed_default_tags().map(drop)
    }

    /// Parses the configured default tags.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a pair is malformed.
    pub fn parsed_default_tags(&self) -> Result<Tags, ConfigError> {
        self.default_tags
            .as_deref()
            .map_or_else(|| Ok(Tags::new()), tags::parse_pairs)
            .map_err(|message| {
                ConfigError::Invalid(format!(
                    "default_tags: {message}: fix STRATUS_DEFAULT_TAGS or default_tags in stratus.toml"
                ))
            })
    }

    /// Fixed waiter interval, when configured.
    #[must_use]
    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }

    /// Builds the HTTP control plane described by this configuration.
    #[must_use]
    pub fn control_plane(&self) -> HttpControlPlane {
        HttpControlPlane::new(&self.endpoint, &self.api_token, &self.region)
    }

    /// Validates the configuration and builds the client shared by every
    /// resource handler.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails.
    pub fn client(&self) -> Result<ProviderClient, ConfigError> {
        self.validate()?;
        Ok(
            ProviderClient::new(Arc::new(self.control_plane()), &self.region)
                .with_default_tags(self.parsed_default_tags()?)
                .with_poll_interval(self.poll_interval()),
        )
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configured value cannot be used.
    #[error("invalid configuration value: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
