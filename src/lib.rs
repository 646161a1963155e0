//! Core library for the `stratus` resource provider.
//!
//! Resources and data sources map declarative attribute maps onto calls
//! against a vendor control plane. Every resource shares the same lifecycle:
//! submit a request, wait for the object to converge through the
//! [`waiter`], then read it back into declarative state. The [`provider`]
//! module validates configuration, plans changes, and drives the handlers.

pub mod config;
pub mod error;
pub mod logging;
pub mod naming;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod services;
pub mod state;
pub mod state_file;
pub mod tags;
pub mod test_support;
pub mod vendor;
pub mod waiter;

pub use config::{ConfigError, ProviderConfig};
pub use error::{Action, ProviderError};
pub use provider::{Plan, PlanAction, Provider};
pub use resource::{DataSource, ProviderClient, Resource, Timeouts};
pub use state::{ResourceData, ResourceState};
pub use state_file::{Address, ConfigDocument, StateFile, StateFileError};
pub use vendor::{ControlPlane, HttpControlPlane, VendorError};
