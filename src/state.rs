//! Per-operation view of a resource's prior, planned and new state.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::resource::Timeouts;
use crate::schema::{AttributeMap, is_set, present};

/// Persisted declarative state of one resource instance.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ResourceState {
    /// Registered type name, for example `lattice_target_group`.
    pub type_name: String,
    /// Identifier assigned by the control plane or the operator.
    pub id: String,
    /// Attribute values as last read from the control plane.
    #[serde(default)]
    pub attributes: AttributeMap,
    /// Set when the object was created but never converged; the next apply
    /// replaces it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub tainted: bool,
}

/// State handed to a lifecycle handler.
///
/// Handlers read configuration through [`ResourceData::get`] and publish what
/// they observe through [`ResourceData::set`]. Values written during the
/// current operation shadow the planned values.
#[derive(Clone, Debug, Default)]
pub struct ResourceData {
    id: String,
    prior: AttributeMap,
    planned: AttributeMap,
    state: AttributeMap,
    new_resource: bool,
    timeouts: Timeouts,
}

impl ResourceData {
    /// Data for a create: no prior state, no identifier yet.
    #[must_use]
    pub fn for_create(planned: AttributeMap, timeouts: Timeouts) -> Self {
        Self {
            planned,
            new_resource: true,
            timeouts,
            ..Self::default()
        }
    }

    /// Data for an in-place update of an existing object.
    #[must_use]
    pub fn for_update(
        id: impl Into<String>,
        prior: AttributeMap,
        planned: AttributeMap,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            id: id.into(),
            prior,
            planned,
            timeouts,
            ..Self::default()
        }
    }

    /// Data for a read or delete of existing state; the plan equals the prior.
    #[must_use]
    pub fn for_existing(id: impl Into<String>, prior: AttributeMap, timeouts: Timeouts) -> Self {
        Self {
            id: id.into(),
            planned: prior.clone(),
            prior,
            timeouts,
            ..Self::default()
        }
    }

    /// Identifier of the object, empty when it does not exist.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Records the identifier assigned to the object.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Marks the object as gone so that it is dropped from state.
    pub fn clear_id(&mut self) {
        self.id.clear();
    }

    /// Returns `true` while the object is being created in this operation.
    #[must_use]
    pub const fn is_new_resource(&self) -> bool {
        self.new_resource
    }

    /// Operation timeouts for this instance.
    #[must_use]
    pub const fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Current value of an attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state
            .get(key)
            .or_else(|| self.planned.get(key))
            .filter(|value| !value.is_null())
    }

    /// Current value of an attribute when it is set to a non-zero value.
    #[must_use]
    pub fn get_ok(&self, key: &str) -> Option<&Value> {
        self.get(key).filter(|value| is_set(Some(value)))
    }

    /// String value of an attribute, empty when unset.
    #[must_use]
    pub fn get_str(&self, key: &str) -> &str {
        self.get(key).and_then(Value::as_str).unwrap_or_default()
    }

    /// Value recorded in the prior state.
    #[must_use]
    pub fn prior(&self, key: &str) -> Option<&Value> {
        self.prior.get(key).filter(|value| !value.is_null())
    }

    /// Returns `true` when the plan changes the attribute. Null and empty
    /// collections compare equal to an absent value.
    #[must_use]
    pub fn has_change(&self, key: &str) -> bool {
        present(self.prior.get(key)) != present(self.planned.get(key))
    }

    /// Returns `true` when any attribute other than `keys` changes.
    #[must_use]
    pub fn has_changes_except(&self, keys: &[&str]) -> bool {
        self.prior
            .keys()
            .chain(self.planned.keys())
            .filter(|key| !keys.contains(&key.as_str()))
            .any(|key| self.has_change(key))
    }

    /// Publishes an attribute value into the new state.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.state.insert(key.to_owned(), value.into());
    }

    /// Converts the data into persisted state, or `None` when the object is gone.
    #[must_use]
    pub fn into_state(self, type_name: &str) -> Option<ResourceState> {
        if self.id.is_empty() {
            return None;
        }
        Some(ResourceState {
            type_name: type_name.to_owned(),
            id: self.id,
            attributes: self.state,
            tainted: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> AttributeMap {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn set_values_shadow_the_plan() {
        let mut data = ResourceData::for_create(map(json!({ "name": "web" })), Timeouts::default());
        assert_eq!(data.get_str("name"), "web");
        data.set("name", "web-1");
        assert_eq!(data.get_str("name"), "web-1");
        assert!(data.is_new_resource());
    }

    #[test]
    fn get_ok_skips_zero_values() {
        let data = ResourceData::for_create(
            map(json!({ "description": "", "port": 0, "enabled": true })),
            Timeouts::default(),
        );
        assert!(data.get_ok("description").is_none());
        assert!(data.get_ok("port").is_none());
        assert!(data.get_ok("enabled").is_some());
    }

    #[test]
    fn changes_are_computed_against_prior_state() {
        let data = ResourceData::for_update(
            "tg-1",
            map(json!({ "name": "web", "tags": { "a": "1" }, "status": "ACTIVE" })),
            map(json!({ "name": "web", "tags": { "a": "2" }, "status": "ACTIVE" })),
            Timeouts::default(),
        );
        assert!(data.has_change("tags"));
        assert!(!data.has_change("name"));
        assert!(!data.has_changes_except(&["tags", "tags_all"]));
        assert!(data.has_changes_except(&["tags_all"]));
    }

    #[test]
    fn cleared_id_drops_state() {
        let mut data = ResourceData::for_existing("d", AttributeMap::new(), Timeouts::default());
        data.set("name", "d");
        data.clear_id();
        assert!(data.into_state("workflow_domain").is_none());
    }
}
