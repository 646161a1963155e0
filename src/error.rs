//! Error taxonomy shared by every resource handler.
//!
//! Errors fall into four groups: validation failures caught before any API
//! call, `NotFound` conditions, transient vendor failures that may be retried,
//! and fatal vendor failures surfaced verbatim.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::state::ResourceState;
use crate::vendor::VendorError;

/// Lifecycle step named in a diagnostic.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    /// Submitting a create request.
    Creating,
    /// Reading remote state.
    Reading,
    /// Submitting an update request.
    Updating,
    /// Submitting a delete request.
    Deleting,
    /// Waiting for a create to converge.
    WaitingForCreation,
    /// Waiting for an update to converge.
    WaitingForUpdate,
    /// Waiting for a delete to converge.
    WaitingForDeletion,
    /// Writing an attribute into declarative state.
    Setting,
    /// Updating resource tags.
    Tagging,
    /// Importing an existing remote object.
    Importing,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Creating => "creating",
            Self::Reading => "reading",
            Self::Updating => "updating",
            Self::Deleting => "deleting",
            Self::WaitingForCreation => "waiting for creation of",
            Self::WaitingForUpdate => "waiting for update of",
            Self::WaitingForDeletion => "waiting for deletion of",
            Self::Setting => "setting",
            Self::Tagging => "tagging",
            Self::Importing => "importing",
        };
        f.write_str(text)
    }
}

/// Errors raised by the provider, its handlers, and the waiter.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProviderError {
    /// Raised when configuration fails schema or cross-attribute validation.
    #[error("invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),
    /// Raised when the provider configuration is unusable.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when the remote object does not exist.
    #[error("{message}")]
    NotFound {
        /// Description of the missing object.
        message: String,
        /// Vendor error that triggered the condition, when any.
        last_error: Option<String>,
    },
    /// Raised when the vendor answered without the expected payload.
    #[error("empty result from {operation}")]
    EmptyResult {
        /// Operation whose response was empty.
        operation: String,
    },
    /// Raised when a waiter exceeds its bound.
    #[error(
        "timeout while waiting for state to become '{}' (last state: '{last_state}', timeout: {timeout:?}){}",
        .expected.join(", "),
        .last_error.as_ref().map(|err| format!(": {err}")).unwrap_or_default()
    )]
    Timeout {
        /// Target states the waiter expected.
        expected: Vec<String>,
        /// Last state observed before the deadline.
        last_state: String,
        /// Bound that was exceeded.
        timeout: Duration,
        /// Last transient error seen while polling.
        last_error: Option<String>,
    },
    /// Raised when a waiter observes a status that is neither pending nor target.
    #[error("unexpected state '{state}', wanted target '{}'", .expected.join(", "))]
    UnexpectedState {
        /// Status reported by the control plane.
        state: String,
        /// Target states the waiter expected.
        expected: Vec<String>,
    },
    /// Wrapper for control-plane failures.
    #[error(transparent)]
    Vendor(#[from] VendorError),
    /// Raised when a resource or data source type is not registered.
    #[error("unsupported type: {0}")]
    UnknownType(String),
    /// Raised when an import targets an object that does not exist.
    #[error("cannot import non-existent remote object {type_name} ({id})")]
    ImportNotFound {
        /// Resource type being imported.
        type_name: String,
        /// Identifier supplied by the operator.
        id: String,
    },
    /// Raised when a listing returns the same page token twice.
    #[error("{operation} returned page token '{token}' twice")]
    RepeatedPageToken {
        /// Listing operation.
        operation: String,
        /// Token that was repeated.
        token: String,
    },
    /// An apply that failed after changing the remote object. `state` is
    /// what exists now: `None` once the prior object was destroyed, or the
    /// tainted object left by a create that never converged.
    #[error("{source}")]
    Incomplete {
        /// Remote object left behind, if any.
        state: Option<Box<ResourceState>>,
        /// Failure that stopped the apply.
        source: Box<ProviderError>,
    },
    /// A handler failure annotated with the lifecycle step and resource.
    #[error("{action} {resource} ({id}): {source}")]
    Diagnostic {
        /// Lifecycle step that failed.
        action: Action,
        /// Human readable resource name (for example `Target Group`).
        resource: &'static str,
        /// Identifier or name of the object.
        id: String,
        /// Underlying failure.
        source: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Builds a `NotFound` error for the given object description.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            last_error: None,
        }
    }

    /// Wraps an error with the failing action and the resource it concerned.
    #[must_use]
    pub fn diagnostic(
        action: Action,
        resource: &'static str,
        id: impl Into<String>,
        source: Self,
    ) -> Self {
        Self::Diagnostic {
            action,
            resource,
            id: id.into(),
            source: Box::new(source),
        }
    }

    /// Returns `true` when the error means the remote object is absent.
    ///
    /// Empty results count as absent, and diagnostics are unwrapped.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::EmptyResult { .. } => true,
            Self::Diagnostic { source, .. } | Self::Incomplete { source, .. } => {
                source.is_not_found()
            }
            _ => false,
        }
    }

    /// Returns `true` when the error may clear up on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Vendor(err) => err.is_transient(),
            Self::Diagnostic { source, .. } | Self::Incomplete { source, .. } => {
                source.is_transient()
            }
            _ => false,
        }
    }
}

impl From<ConfigError> for ProviderError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_renders_action_resource_and_source() {
        let err = ProviderError::diagnostic(
            Action::WaitingForCreation,
            "Target Group",
            "tg-1",
            ProviderError::UnexpectedState {
                state: String::from("CREATE_FAILED"),
                expected: vec![String::from("ACTIVE")],
            },
        );

        assert_eq!(
            err.to_string(),
            "waiting for creation of Target Group (tg-1): unexpected state 'CREATE_FAILED', wanted target 'ACTIVE'"
        );
    }

    #[test]
    fn not_found_is_detected_through_diagnostics() {
        let err = ProviderError::diagnostic(
            Action::Reading,
            "Domain",
            "d",
            ProviderError::EmptyResult {
                operation: String::from("DescribeDomain"),
            },
        );
        assert!(err.is_not_found());
        assert!(!err.is_transient());
    }

    #[test]
    fn timeout_message_includes_last_error() {
        let err = ProviderError::Timeout {
            expected: vec![String::from("ACTIVE")],
            last_state: String::from("CREATE_IN_PROGRESS"),
            timeout: Duration::from_secs(1),
            last_error: Some(String::from("ThrottlingException: slow down")),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("last state: 'CREATE_IN_PROGRESS'"), "{rendered}");
        assert!(rendered.ends_with(": ThrottlingException: slow down"), "{rendered}");
    }
}
