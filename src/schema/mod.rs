//! Declarative attribute schemas.
//!
//! A [`Schema`] lists the attributes a resource accepts. It validates raw
//! configuration before any API call, builds the planned attribute map
//! (defaults, normalised values, carried computed values) and reports which
//! changes force the resource to be replaced.

mod validation;

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::ProviderError;

pub use validation::Validator;

/// Attribute values keyed by attribute name.
pub type AttributeMap = Map<String, Value>;

/// Type of an attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeType {
    /// UTF-8 string.
    String,
    /// Signed integer.
    Int,
    /// Boolean.
    Bool,
    /// List of strings.
    StringList,
    /// Map of string keys to string values.
    StringMap,
    /// List of nested blocks described by their own schema.
    Block(Schema),
}

impl AttributeType {
    const fn describe(&self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Int => "an integer",
            Self::Bool => "a boolean",
            Self::StringList => "a list of strings",
            Self::StringMap => "a map of strings",
            Self::Block(_) => "a list of blocks",
        }
    }
}

/// Normalisation applied to string values before they enter state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Normalize {
    /// Converts the value to upper case.
    Uppercase,
}

impl Normalize {
    fn apply(self, value: &Value) -> Value {
        match (self, value) {
            (Self::Uppercase, Value::String(text)) => Value::String(text.to_uppercase()),
            _ => value.clone(),
        }
    }
}

/// Description of a single attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    ty: AttributeType,
    required: bool,
    optional: bool,
    computed: bool,
    force_new: bool,
    default: Option<Value>,
    max_items: Option<usize>,
    conflicts_with: Vec<&'static str>,
    validator: Option<Validator>,
    normalize: Option<Normalize>,
}

impl Attribute {
    const fn of(ty: AttributeType) -> Self {
        Self {
            ty,
            required: false,
            optional: false,
            computed: false,
            force_new: false,
            default: None,
            max_items: None,
            conflicts_with: Vec::new(),
            validator: None,
            normalize: None,
        }
    }

    /// String attribute.
    #[must_use]
    pub const fn string() -> Self {
        Self::of(AttributeType::String)
    }

    /// Integer attribute.
    #[must_use]
    pub const fn int() -> Self {
        Self::of(AttributeType::Int)
    }

    /// Boolean attribute.
    #[must_use]
    pub const fn bool() -> Self {
        Self::of(AttributeType::Bool)
    }

    /// List-of-strings attribute.
    #[must_use]
    pub const fn string_list() -> Self {
        Self::of(AttributeType::StringList)
    }

    /// String map attribute.
    #[must_use]
    pub const fn string_map() -> Self {
        Self::of(AttributeType::StringMap)
    }

    /// Nested block list attribute.
    #[must_use]
    pub const fn block(schema: Schema) -> Self {
        Self::of(AttributeType::Block(schema))
    }

    /// Marks the attribute as required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the attribute as optional.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Marks the attribute as computed by the control plane.
    #[must_use]
    pub const fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    /// Marks the attribute as requiring replacement when it changes.
    #[must_use]
    pub const fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Sets the value used when configuration leaves the attribute unset.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Caps the number of nested blocks.
    #[must_use]
    pub const fn max_items(mut self, limit: usize) -> Self {
        self.max_items = Some(limit);
        self
    }

    /// Declares attributes that may not be set together with this one.
    #[must_use]
    pub fn conflicts_with(mut self, others: &[&'static str]) -> Self {
        self.conflicts_with = others.to_vec();
        self
    }

    /// Attaches a value validator.
    #[must_use]
    pub const fn validate(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Attaches a value normaliser.
    #[must_use]
    pub const fn normalize(mut self, normalize: Normalize) -> Self {
        self.normalize = Some(normalize);
        self
    }

    /// Returns the attribute type.
    #[must_use]
    pub const fn attribute_type(&self) -> &AttributeType {
        &self.ty
    }

    /// Returns `true` when configuration must set the attribute.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// Returns `true` when the attribute is only ever set by the control plane.
    #[must_use]
    pub const fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }

    /// Returns `true` when a change forces replacement.
    #[must_use]
    pub const fn is_force_new(&self) -> bool {
        self.force_new
    }

    fn normalized(&self, value: &Value) -> Value {
        self.normalize
            .map_or_else(|| value.clone(), |normalize| normalize.apply(value))
    }

    fn description(&self) -> Value {
        let type_name = match &self.ty {
            AttributeType::String => "string",
            AttributeType::Int => "int",
            AttributeType::Bool => "bool",
            AttributeType::StringList => "list(string)",
            AttributeType::StringMap => "map(string)",
            AttributeType::Block(_) => "block",
        };
        let mut out = AttributeMap::new();
        out.insert(String::from("type"), Value::from(type_name));
        for (flag, enabled) in [
            ("required", self.required),
            ("optional", self.optional),
            ("computed", self.computed),
            ("force_new", self.force_new),
        ] {
            if enabled {
                out.insert(flag.to_owned(), Value::Bool(true));
            }
        }
        if let Some(default) = &self.default {
            out.insert(String::from("default"), default.clone());
        }
        if let Some(limit) = self.max_items {
            out.insert(String::from("max_items"), Value::from(limit));
        }
        if let AttributeType::Block(nested) = &self.ty {
            out.insert(String::from("block"), nested.describe());
        }
        Value::Object(out)
    }

    fn type_matches(&self, value: &Value) -> bool {
        match &self.ty {
            AttributeType::String => value.is_string(),
            AttributeType::Int => value.is_i64() || value.is_u64(),
            AttributeType::Bool => value.is_boolean(),
            AttributeType::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            AttributeType::StringMap => value
                .as_object()
                .is_some_and(|map| map.values().all(Value::is_string)),
            AttributeType::Block(_) => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_object)),
        }
    }
}

/// Set of attributes accepted by a resource, data source or nested block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schema {
    attributes: BTreeMap<&'static str, Attribute>,
}

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute.
    #[must_use]
    pub fn attribute(mut self, name: &'static str, attribute: Attribute) -> Self {
        self.attributes.insert(name, attribute);
        self
    }

    /// Looks up an attribute by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Iterates over attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Attribute)> {
        self.attributes.iter().map(|(name, attribute)| (*name, attribute))
    }

    /// Describes every attribute as JSON, nested blocks included.
    #[must_use]
    pub fn describe(&self) -> Value {
        Value::Object(
            self.iter()
                .map(|(name, attribute)| (name.to_owned(), attribute.description()))
                .collect(),
        )
    }

    /// Validates raw configuration, reporting every violation at once.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Validation`] listing each violation.
    pub fn validate(&self, config: &AttributeMap) -> Result<(), ProviderError> {
        let mut errors = Vec::new();
        self.collect_violations("", config, &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::Validation(errors))
        }
    }

    fn collect_violations(&self, prefix: &str, config: &AttributeMap, errors: &mut Vec<String>) {
        for (key, value) in config {
            if value.is_null() {
                continue;
            }
            let path = format!("{prefix}{key}");
            let Some(attribute) = self.get(key) else {
                errors.push(format!("{path}: unsupported attribute"));
                continue;
            };
            if attribute.is_computed_only() {
                errors.push(format!("{path}: attribute is computed and cannot be set"));
                continue;
            }
            if !attribute.type_matches(value) {
                errors.push(format!("{path}: expected {}", attribute.ty.describe()));
                continue;
            }
            for other in &attribute.conflicts_with {
                if is_set(config.get(*other)) {
                    errors.push(format!("{path}: conflicts with {other}"));
                }
            }
            if let Some(validator) = attribute.validator
                && let Err(message) = validator.check(&attribute.normalized(value))
            {
                errors.push(format!("{path}: {message}"));
            }
            if let AttributeType::Block(nested) = &attribute.ty {
                let items = value.as_array().map(Vec::as_slice).unwrap_or_default();
                if let Some(limit) = attribute.max_items
                    && items.len() > limit
                {
                    errors.push(format!(
                        "{path}: at most {limit} block(s) allowed, got {}",
                        items.len()
                    ));
                }
                for (index, item) in items.iter().enumerate() {
                    if let Some(map) = item.as_object() {
                        nested.collect_violations(&format!("{path}.{index}."), map, errors);
                    }
                }
            }
        }

        for (name, attribute) in self.iter() {
            if attribute.required && config.get(name).is_none_or(Value::is_null) {
                errors.push(format!("{prefix}{name}: required attribute is missing"));
            }
        }
    }

    /// Builds the planned attribute map for `config` given the prior state.
    ///
    /// Configured values are normalised, unset attributes take their default,
    /// and unset computed attributes keep their prior value.
    #[must_use]
    pub fn plan(&self, prior: &AttributeMap, config: &AttributeMap) -> AttributeMap {
        let mut planned = AttributeMap::new();
        for (name, attribute) in self.iter() {
            let configured = config.get(name).filter(|value| !value.is_null());
            let value = match (configured, &attribute.ty) {
                (Some(Value::Array(items)), AttributeType::Block(nested)) => {
                    let prior_items = prior.get(name).and_then(Value::as_array);
                    Some(Value::Array(
                        items
                            .iter()
                            .enumerate()
                            .map(|(index, item)| {
                                let empty = AttributeMap::new();
                                let prior_item = prior_items
                                    .and_then(|list| list.get(index))
                                    .and_then(Value::as_object)
                                    .unwrap_or(&empty);
                                let item_map = item.as_object().unwrap_or(&empty);
                                Value::Object(nested.plan(prior_item, item_map))
                            })
                            .collect(),
                    ))
                }
                (Some(value), _) => Some(attribute.normalized(value)),
                (None, _) => attribute.default.clone().or_else(|| {
                    attribute
                        .computed
                        .then(|| prior.get(name).cloned())
                        .flatten()
                }),
            };
            if let Some(planned_value) = value {
                planned.insert(name.to_owned(), planned_value);
            }
        }
        planned
    }

    /// Lists force-new attributes whose planned value differs from the prior
    /// state. Nested attributes are reported as dotted paths.
    #[must_use]
    pub fn replacement_paths(&self, prior: &AttributeMap, planned: &AttributeMap) -> Vec<String> {
        let mut paths = Vec::new();
        self.collect_replacements("", prior, planned, &mut paths);
        paths
    }

    fn collect_replacements(
        &self,
        prefix: &str,
        prior: &AttributeMap,
        planned: &AttributeMap,
        paths: &mut Vec<String>,
    ) {
        for (name, attribute) in self.iter() {
            let before = present(prior.get(name));
            let after = present(planned.get(name));
            let path = format!("{prefix}{name}");
            if attribute.force_new {
                if before != after {
                    paths.push(path);
                }
                continue;
            }
            if let AttributeType::Block(nested) = &attribute.ty {
                let empty = Vec::new();
                let before_items = before.and_then(Value::as_array).unwrap_or(&empty);
                let after_items = after.and_then(Value::as_array).unwrap_or(&empty);
                let count = before_items.len().max(after_items.len());
                let blank = AttributeMap::new();
                for index in 0..count {
                    let before_item = before_items
                        .get(index)
                        .and_then(Value::as_object)
                        .unwrap_or(&blank);
                    let after_item = after_items
                        .get(index)
                        .and_then(Value::as_object)
                        .unwrap_or(&blank);
                    nested.collect_replacements(
                        &format!("{path}.{index}."),
                        before_item,
                        after_item,
                        paths,
                    );
                }
            }
        }
    }
}

/// Returns the value unless it is null or an empty collection.
#[must_use]
pub fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|inner| match inner {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    })
}

/// Returns `true` when a value is present and not the zero value of its type.
#[must_use]
pub fn is_set(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => {
            number.as_i64() != Some(0) && number.as_u64() != Some(0)
        }
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests;
