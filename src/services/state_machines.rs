//! `statemachine_state_machines`: every state machine in the region.

use serde_json::Value;
use tracing::debug;

use crate::error::{Action, ProviderError};
use crate::resource::{DataSource, ProviderClient, ResourceFuture};
use crate::schema::{Attribute, Schema};
use crate::state::ResourceData;

/// Registered type name.
pub const TYPE_NAME: &str = "statemachine_state_machines";

/// State machine listing data source.
#[derive(Clone, Copy, Debug, Default)]
pub struct StateMachinesDataSource;

impl DataSource for StateMachinesDataSource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .attribute("arns", Attribute::string_list().computed())
            .attribute("names", Attribute::string_list().computed())
    }

    fn read<'a>(
        &'a self,
        client: &'a ProviderClient,
        data: &'a mut ResourceData,
    ) -> ResourceFuture<'a> {
        Box::pin(async move {
            let mut arns = Vec::new();
            let mut names = Vec::new();
            let mut next_token: Option<String> = None;
            loop {
                let page = client
                    .api()
                    .list_state_machines(next_token.as_deref())
                    .await
                    .map_err(|err| {
                        ProviderError::diagnostic(
                            Action::Reading,
                            "State Machines",
                            &client.region,
                            err.into(),
                        )
                    })?;
                debug!(count = page.state_machines.len(), "listed state machines page");
                for item in page.state_machines {
                    arns.push(Value::from(item.state_machine_arn));
                    names.push(Value::from(item.name));
                }
                match page.next_token {
                    Some(token) if next_token.as_deref() == Some(token.as_str()) => {
                        return Err(ProviderError::diagnostic(
                            Action::Reading,
                            "State Machines",
                            &client.region,
                            ProviderError::RepeatedPageToken {
                                operation: String::from("ListStateMachines"),
                                token,
                            },
                        ));
                    }
                    Some(token) if !token.is_empty() => next_token = Some(token),
                    _ => break,
                }
            }

            data.set_id(client.region.clone());
            data.set("arns", arns);
            data.set("names", names);
            Ok(())
        })
    }
}
