//! Resource tag handling.
//!
//! Resources expose a user-managed `tags` map and a computed `tags_all` map
//! holding provider default tags overlaid by the resource's own tags. Tag
//! changes are pushed through the control plane's tagging API, never through
//! the resource's update call.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::error::ProviderError;
use crate::schema::Attribute;
use crate::vendor::ControlPlane;

/// Tag keys and values.
pub type Tags = BTreeMap<String, String>;

/// Attribute name of the user-managed tag map.
pub const ATTR_TAGS: &str = "tags";
/// Attribute name of the computed tag map.
pub const ATTR_TAGS_ALL: &str = "tags_all";

/// Schema entry for `tags`.
#[must_use]
pub fn tags_schema() -> Attribute {
    Attribute::string_map().optional()
}

/// Schema entry for `tags_all`.
#[must_use]
pub fn tags_all_schema() -> Attribute {
    Attribute::string_map().computed()
}

/// Reads a tag map out of an attribute value, ignoring non-string entries.
#[must_use]
pub fn from_value(value: Option<&Value>) -> Tags {
    value
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(key, raw)| raw.as_str().map(|text| (key.clone(), text.to_owned())))
                .collect()
        })
        .unwrap_or_default()
}

/// Converts a tag map into an attribute value.
#[must_use]
pub fn to_value(tags: &Tags) -> Value {
    Value::Object(
        tags.iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect(),
    )
}

/// Overlays resource tags on the provider defaults.
#[must_use]
pub fn merge(defaults: &Tags, resource: &Tags) -> Tags {
    let mut merged = defaults.clone();
    merged.extend(resource.iter().map(|(key, value)| (key.clone(), value.clone())));
    merged
}

/// Removes entries that match a default tag exactly.
#[must_use]
pub fn without_defaults(all: &Tags, defaults: &Tags) -> Tags {
    all.iter()
        .filter(|(key, value)| defaults.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Difference between two tag maps.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TagsDiff {
    /// Tags to create or overwrite.
    pub upsert: Tags,
    /// Tag keys to remove.
    pub remove: Vec<String>,
}

impl TagsDiff {
    /// Computes the calls needed to turn `old` into `new`.
    #[must_use]
    pub fn between(old: &Tags, new: &Tags) -> Self {
        let upsert = new
            .iter()
            .filter(|(key, value)| old.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let remove = old
            .keys()
            .filter(|key| !new.contains_key(*key))
            .cloned()
            .collect();
        Self { upsert, remove }
    }

    /// Returns `true` when no call is required.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upsert.is_empty() && self.remove.is_empty()
    }
}

/// Applies the difference between `old` and `new` to the tagged resource.
///
/// # Errors
///
/// Returns [`ProviderError::Vendor`] when a tagging call fails.
pub async fn update_tags(
    control_plane: &dyn ControlPlane,
    arn: &str,
    old: &Tags,
    new: &Tags,
) -> Result<(), ProviderError> {
    let diff = TagsDiff::between(old, new);
    if !diff.remove.is_empty() {
        debug!(%arn, keys = ?diff.remove, "removing tags");
        control_plane.untag_resource(arn, &diff.remove).await?;
    }
    if !diff.upsert.is_empty() {
        debug!(%arn, count = diff.upsert.len(), "updating tags");
        control_plane.tag_resource(arn, &diff.upsert).await?;
    }
    Ok(())
}

/// Parses `key=value` pairs separated by commas.
///
/// # Errors
///
/// Returns the offending entry when it has no `=` or an empty key.
pub fn parse_pairs(raw: &str) -> Result<Tags, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| entry.to_owned())?;
            let trimmed_key = key.trim();
            if trimmed_key.is_empty() {
                return Err(entry.to_owned());
            }
            Ok((trimmed_key.to_owned(), value.trim().to_owned()))
        })
        .collect()
}
