//! BDD scenarios for the resource lifecycle.

use rstest_bdd_macros::scenario;

use super::test_helpers::{LifecycleContext, lifecycle_context};

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Re-applying an unchanged target group makes no calls"
)]
fn scenario_reapply_is_a_no_op(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Changing only domain tags uses the tagging API"
)]
fn scenario_tag_only_update(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "A deprecated domain disappears on refresh"
)]
fn scenario_deprecated_domain_is_gone(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "A target group that fails to settle is reported"
)]
fn scenario_failed_creation_is_reported(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "A target group deleted out of band is recreated"
)]
fn scenario_deleted_target_group_is_recreated(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}
