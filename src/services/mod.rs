//! Resource and data-source implementations, one module per vendor service.

pub mod domain;
pub mod state_machines;
pub mod target_group;

use std::sync::Arc;

use crate::resource::{DataSource, Resource};

/// Every managed resource type shipped with the provider.
#[must_use]
pub fn resources() -> Vec<Arc<dyn Resource>> {
    vec![
        Arc::new(target_group::TargetGroupResource),
        Arc::new(domain::DomainResource),
    ]
}

/// Every data source shipped with the provider.
#[must_use]
pub fn data_sources() -> Vec<Arc<dyn DataSource>> {
    vec![Arc::new(state_machines::StateMachinesDataSource)]
}
