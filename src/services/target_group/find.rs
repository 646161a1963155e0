//! Finder, status refresh and waiters for target groups.

use std::time::Duration;

use crate::error::ProviderError;
use crate::resource::ProviderClient;
use crate::vendor::types::{TargetGroup, target_group_status};
use crate::vendor::{ControlPlane, ERR_RESOURCE_NOT_FOUND};
use crate::waiter::{Observation, StateChangeConf};

const CREATE_PENDING: &[&str] = &[target_group_status::CREATE_IN_PROGRESS];
const ACTIVE_TARGET: &[&str] = &[target_group_status::ACTIVE];
const DELETE_PENDING: &[&str] = &[
    target_group_status::DELETE_IN_PROGRESS,
    target_group_status::ACTIVE,
];
const NOT_FOUND_CHECKS: u32 = 20;
const CONTINUOUS_TARGET_OCCURRENCE: u32 = 2;

/// Fetches a target group, translating a missing object into `NotFound`.
///
/// # Errors
///
/// Returns [`ProviderError::NotFound`] when the control plane reports the
/// group as missing, [`ProviderError::EmptyResult`] when the answer carries
/// no identifier, and other vendor errors unchanged.
pub async fn find_target_group_by_id(
    api: &dyn ControlPlane,
    id: &str,
) -> Result<TargetGroup, ProviderError> {
    match api.get_target_group(id).await {
        Ok(target_group) if target_group.id.is_some() => Ok(target_group),
        Ok(_) => Err(ProviderError::EmptyResult {
            operation: String::from("GetTargetGroup"),
        }),
        Err(err) if err.code_equals(&[ERR_RESOURCE_NOT_FOUND]) => Err(ProviderError::NotFound {
            message: format!("target group {id} not found"),
            last_error: Some(err.to_string()),
        }),
        Err(err) => Err(err.into()),
    }
}

/// Refresh used by the waiters: `None` when the group is missing.
///
/// # Errors
///
/// Propagates finder errors other than `NotFound`.
pub async fn status_target_group(
    api: &dyn ControlPlane,
    id: &str,
) -> Result<Option<Observation<TargetGroup>>, ProviderError> {
    match find_target_group_by_id(api, id).await {
        Ok(target_group) => {
            let status = target_group.status.clone().unwrap_or_default();
            Ok(Some(Observation::new(target_group, status)))
        }
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Waits for a new group to report `ACTIVE` twice in a row.
///
/// # Errors
///
/// Returns the waiter's error when the group fails, vanishes or times out.
pub async fn wait_target_group_created(
    client: &ProviderClient,
    id: &str,
    timeout: Duration,
) -> Result<Option<TargetGroup>, ProviderError> {
    StateChangeConf::new(CREATE_PENDING, ACTIVE_TARGET, timeout, move || {
        status_target_group(client.api(), id)
    })
    .not_found_checks(NOT_FOUND_CHECKS)
    .continuous_target_occurrence(CONTINUOUS_TARGET_OCCURRENCE)
    .poll_interval(client.poll_interval)
    .wait_for_state()
    .await
}

/// Waits for an updated group to settle back to `ACTIVE`.
///
/// # Errors
///
/// Returns the waiter's error when the group fails, vanishes or times out.
pub async fn wait_target_group_updated(
    client: &ProviderClient,
    id: &str,
    timeout: Duration,
) -> Result<Option<TargetGroup>, ProviderError> {
    StateChangeConf::new(CREATE_PENDING, ACTIVE_TARGET, timeout, move || {
        status_target_group(client.api(), id)
    })
    .not_found_checks(NOT_FOUND_CHECKS)
    .continuous_target_occurrence(CONTINUOUS_TARGET_OCCURRENCE)
    .poll_interval(client.poll_interval)
    .wait_for_state()
    .await
}

/// Waits until the group is gone.
///
/// # Errors
///
/// Returns the waiter's error when deletion fails or times out.
pub async fn wait_target_group_deleted(
    client: &ProviderClient,
    id: &str,
    timeout: Duration,
) -> Result<(), ProviderError> {
    StateChangeConf::new(DELETE_PENDING, &[], timeout, move || {
        status_target_group(client.api(), id)
    })
    .poll_interval(client.poll_interval)
    .wait_for_state()
    .await
    .map(|_| ())
}
