//! Declarative attribute schemas.
//!
//! A schema lists the attributes of a resource with their type and flags.
//! The provider uses it at plan time to fill defaults, reject invalid
//! configuration before any remote call, and detect changes to attributes
//! that require replacement.

use serde_json::{Map, Value};

use crate::locality::{Region, Zone, validate_regional_uuid, validate_zoned_uuid};

use super::data::lookup;
use super::error::ProviderError;

/// Value type of an attribute.
#[derive(Clone, Debug, PartialEq)]
pub enum Kind {
    /// String.
    String,
    /// Integer.
    Int,
    /// Boolean.
    Bool,
    /// Ordered list of strings.
    StringList,
    /// Unordered set of strings.
    StringSet,
    /// Map of strings.
    StringMap,
    /// List of nested blocks.
    Block(Vec<Attribute>),
}

/// Built-in value checks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Validation {
    /// `uuid` or `zone/uuid`.
    ZonedUuid,
    /// `uuid` or `region/uuid`.
    RegionalUuid,
    /// One of the supported zones.
    Zone,
    /// One of the supported regions.
    Region,
    /// One of the listed strings.
    OneOf(&'static [&'static str]),
    /// Strictly positive integer.
    Positive,
    /// Non-empty string.
    NonEmpty,
}

impl Validation {
    fn check(self, value: &Value) -> Result<(), String> {
        let text = value.as_str();
        match self {
            Self::ZonedUuid => validate_zoned_uuid(text.unwrap_or_default())
                .map_err(|err| err.to_string()),
            Self::RegionalUuid => validate_regional_uuid(text.unwrap_or_default())
                .map_err(|err| err.to_string()),
            Self::Zone => text
                .unwrap_or_default()
                .parse::<Zone>()
                .map(drop)
                .map_err(|err| err.to_string()),
            Self::Region => text
                .unwrap_or_default()
                .parse::<Region>()
                .map(drop)
                .map_err(|err| err.to_string()),
            Self::OneOf(allowed) => {
                let candidate = text.unwrap_or_default();
                if allowed.contains(&candidate) {
                    Ok(())
                } else {
                    Err(format!(
                        "expected one of [{}], got '{candidate}'",
                        allowed.join(", ")
                    ))
                }
            }
            Self::Positive => match value.as_i64() {
                Some(number) if number > 0 => Ok(()),
                _ => Err(String::from("must be a positive integer")),
            },
            Self::NonEmpty => match text {
                Some(candidate) if !candidate.is_empty() => Ok(()),
                _ => Err(String::from("must not be empty")),
            },
        }
    }
}

/// One attribute of a schema.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    /// Attribute name.
    pub name: &'static str,
    /// Value type.
    pub kind: Kind,
    /// Must be set in configuration.
    pub required: bool,
    /// May be set in configuration.
    pub optional: bool,
    /// May be filled by the provider.
    pub computed: bool,
    /// Changing the value replaces the resource.
    pub force_new: bool,
    /// Value used when configuration omits the attribute.
    pub default: Option<Value>,
    /// Attributes that may not be set together with this one.
    pub conflicts_with: &'static [&'static str],
    /// Deprecation message.
    pub deprecated: Option<&'static str>,
    /// Value check.
    pub validation: Option<Validation>,
    /// Maximum number of elements for lists and blocks.
    pub max_items: Option<usize>,
    /// Human readable description.
    pub description: &'static str,
}

impl Attribute {
    const fn new(name: &'static str, kind: Kind) -> Self {
        Self {
            name,
            kind,
            required: false,
            optional: true,
            computed: false,
            force_new: false,
            default: None,
            conflicts_with: &[],
            deprecated: None,
            validation: None,
            max_items: None,
            description: "",
        }
    }

    /// String attribute.
    #[must_use]
    pub const fn string(name: &'static str) -> Self {
        Self::new(name, Kind::String)
    }

    /// Integer attribute.
    #[must_use]
    pub const fn int(name: &'static str) -> Self {
        Self::new(name, Kind::Int)
    }

    /// Boolean attribute.
    #[must_use]
    pub const fn bool(name: &'static str) -> Self {
        Self::new(name, Kind::Bool)
    }

    /// List of strings.
    #[must_use]
    pub const fn list(name: &'static str) -> Self {
        Self::new(name, Kind::StringList)
    }

    /// Set of strings.
    #[must_use]
    pub const fn set(name: &'static str) -> Self {
        Self::new(name, Kind::StringSet)
    }

    /// Map of strings.
    #[must_use]
    pub const fn map(name: &'static str) -> Self {
        Self::new(name, Kind::StringMap)
    }

    /// List of nested blocks.
    #[must_use]
    pub const fn block(name: &'static str, attributes: Vec<Self>) -> Self {
        Self::new(name, Kind::Block(attributes))
    }

    /// Marks the attribute as required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self.optional = false;
        self
    }

    /// Marks the attribute as provider-filled only.
    #[must_use]
    pub const fn computed_only(mut self) -> Self {
        self.computed = true;
        self.optional = false;
        self
    }

    /// Marks the attribute as optional and provider-filled when unset.
    #[must_use]
    pub const fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    /// Changing the attribute replaces the resource.
    #[must_use]
    pub const fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Declares conflicting attributes.
    #[must_use]
    pub const fn conflicts_with(mut self, names: &'static [&'static str]) -> Self {
        self.conflicts_with = names;
        self
    }

    /// Marks the attribute as deprecated.
    #[must_use]
    pub const fn deprecated(mut self, message: &'static str) -> Self {
        self.deprecated = Some(message);
        self
    }

    /// Attaches a value check.
    #[must_use]
    pub const fn validate(mut self, validation: Validation) -> Self {
        self.validation = Some(validation);
        self
    }

    /// Caps the number of elements.
    #[must_use]
    pub const fn max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }

    /// Sets the description.
    #[must_use]
    pub const fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }
}

/// Attributes of a resource, data source or action.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schema {
    /// Top-level attributes.
    pub attributes: Vec<Attribute>,
}

impl Schema {
    /// Builds a schema from its attributes.
    #[must_use]
    pub const fn new(attributes: Vec<Attribute>) -> Self {
        Self { attributes }
    }

    /// Looks up a top-level attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attribute| attribute.name == name)
    }

    /// Fills defaults for unset attributes, recursing into blocks.
    pub fn apply_defaults(&self, config: &mut Value) {
        apply_defaults(&self.attributes, config);
    }

    /// Checks required attributes, conflicts, types and value checks.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Validation`] naming the first offending
    /// attribute path.
    pub fn validate(&self, config: &Value) -> Result<(), ProviderError> {
        validate_attributes(&self.attributes, config, "")
    }

    /// Lists force-new attributes whose value differs between `prior` and
    /// `planned`, including nested block attributes.
    #[must_use]
    pub fn force_new_changes(&self, prior: &Value, planned: &Value) -> Vec<String> {
        let mut changed = Vec::new();
        collect_force_new(&self.attributes, prior, planned, "", &mut changed);
        changed
    }

    /// Lists deprecated attributes present in the configuration.
    #[must_use]
    pub fn deprecations(&self, config: &Value) -> Vec<(String, &'static str)> {
        self.attributes
            .iter()
            .filter_map(|attribute| {
                let message = attribute.deprecated?;
                config
                    .get(attribute.name)
                    .filter(|value| !value.is_null())
                    .map(|_| (attribute.name.to_owned(), message))
            })
            .collect()
    }
}

fn apply_defaults(attributes: &[Attribute], config: &mut Value) {
    let Value::Object(object) = config else {
        return;
    };
    for attribute in attributes {
        let entry = object.entry(attribute.name).or_insert(Value::Null);
        if entry.is_null()
            && let Some(default) = &attribute.default
        {
            *entry = default.clone();
        }
        if let (Kind::Block(nested), Value::Array(blocks)) = (&attribute.kind, entry) {
            for block in blocks {
                apply_defaults(nested, block);
            }
        }
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}.{name}")
    }
}

fn check_kind(attribute: &Attribute, value: &Value, path: &str) -> Result<(), ProviderError> {
    let valid = match &attribute.kind {
        Kind::String => value.is_string(),
        Kind::Int => value.is_i64() || value.is_u64(),
        Kind::Bool => value.is_boolean(),
        Kind::StringList | Kind::StringSet => value
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_string)),
        Kind::StringMap => value
            .as_object()
            .is_some_and(|entries| entries.values().all(Value::is_string)),
        Kind::Block(_) => value
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_object)),
    };
    if valid {
        Ok(())
    } else {
        Err(ProviderError::validation(path, "unexpected value type"))
    }
}

fn validate_attributes(
    attributes: &[Attribute],
    config: &Value,
    prefix: &str,
) -> Result<(), ProviderError> {
    let empty = Map::new();
    let object = config.as_object().unwrap_or(&empty);
    for attribute in attributes {
        let path = join_path(prefix, attribute.name);
        let value = object.get(attribute.name).filter(|value| !value.is_null());
        let Some(present) = value else {
            if attribute.required {
                return Err(ProviderError::validation(&path, "attribute is required"));
            }
            continue;
        };
        if !attribute.optional && !attribute.required {
            return Err(ProviderError::validation(
                &path,
                "attribute is computed and cannot be set",
            ));
        }
        check_kind(attribute, present, &path)?;
        if let Some(conflict) = attribute.conflicts_with.iter().find(|other| {
            object
                .get(**other)
                .is_some_and(|candidate| !candidate.is_null())
        }) {
            return Err(ProviderError::validation(
                &path,
                format!("conflicts with {conflict}"),
            ));
        }
        if let (Some(max), Some(items)) = (attribute.max_items, present.as_array())
            && items.len() > max
        {
            return Err(ProviderError::validation(
                &path,
                format!("at most {max} element(s) allowed"),
            ));
        }
        if let Some(validation) = attribute.validation {
            let candidates: Vec<&Value> = match present {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            for candidate in candidates {
                validation
                    .check(candidate)
                    .map_err(|message| ProviderError::validation(&path, message))?;
            }
        }
        if let (Kind::Block(nested), Value::Array(blocks)) = (&attribute.kind, present) {
            for (index, block) in blocks.iter().enumerate() {
                validate_attributes(nested, block, &format!("{path}.{index}"))?;
            }
        }
    }
    Ok(())
}

fn collect_force_new(
    attributes: &[Attribute],
    prior: &Value,
    planned: &Value,
    prefix: &str,
    changed: &mut Vec<String>,
) {
    for attribute in attributes {
        let path = join_path(prefix, attribute.name);
        let before = lookup(prior, attribute.name).filter(|value| !value.is_null());
        let after = lookup(planned, attribute.name).filter(|value| !value.is_null());
        if attribute.force_new && before != after {
            if attribute.computed && after.is_none() {
                continue;
            }
            changed.push(path.clone());
            continue;
        }
        if let (Kind::Block(nested), Some(Value::Array(old)), Some(Value::Array(new))) =
            (&attribute.kind, before, after)
        {
            for (index, (old_block, new_block)) in old.iter().zip(new).enumerate() {
                collect_force_new(
                    nested,
                    old_block,
                    new_block,
                    &format!("{path}.{index}"),
                    changed,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![
            Attribute::string("name").computed(),
            Attribute::string("type").required().force_new(),
            Attribute::string("zone").computed().force_new().validate(Validation::Zone),
            Attribute::string("state")
                .default_value("started")
                .validate(Validation::OneOf(&["started", "stopped", "standby"])),
            Attribute::string("ip_id").conflicts_with(&["ip_ids"]),
            Attribute::set("ip_ids").computed(),
            Attribute::string("public_ip").computed_only(),
            Attribute::block(
                "root_volume",
                vec![
                    Attribute::int("size_in_gb").computed(),
                    Attribute::string("volume_type").computed().force_new(),
                ],
            )
            .max_items(1),
        ])
    }

    #[test]
    fn defaults_fill_missing_values() {
        let mut config = json!({"type": "DEV1-S"});
        schema().apply_defaults(&mut config);
        assert_eq!(config["state"], "started");
    }

    #[test]
    fn missing_required_attribute_is_rejected() {
        let err = schema().validate(&json!({})).expect_err("type is required");
        assert_eq!(err, ProviderError::validation("type", "attribute is required"));
    }

    #[test]
    fn conflicting_attributes_are_rejected() {
        let config = json!({"type": "DEV1-S", "ip_id": "x", "ip_ids": ["y"]});
        let err = schema().validate(&config).expect_err("conflict");
        assert!(matches!(err, ProviderError::Validation { field, .. } if field == "ip_id"));
    }

    #[test]
    fn computed_only_attributes_cannot_be_configured() {
        let config = json!({"type": "DEV1-S", "public_ip": "1.2.3.4"});
        assert!(schema().validate(&config).is_err());
    }

    #[test]
    fn nested_block_paths_are_reported() {
        let config = json!({"type": "DEV1-S", "root_volume": [{"size_in_gb": "big"}]});
        let err = schema().validate(&config).expect_err("wrong type");
        assert!(
            matches!(err, ProviderError::Validation { field, .. } if field == "root_volume.0.size_in_gb")
        );
    }

    #[test]
    fn value_checks_run_before_any_call() {
        let config = json!({"type": "DEV1-S", "state": "paused"});
        assert!(schema().validate(&config).is_err());
        let zone = json!({"type": "DEV1-S", "zone": "mars-1"});
        assert!(schema().validate(&zone).is_err());
    }

    #[test]
    fn force_new_changes_include_nested_attributes() {
        let prior = json!({"type": "DEV1-S", "root_volume": [{"volume_type": "l_ssd"}]});
        let planned = json!({"type": "DEV1-M", "root_volume": [{"volume_type": "sbs_volume"}]});
        assert_eq!(
            schema().force_new_changes(&prior, &planned),
            vec![
                String::from("type"),
                String::from("root_volume.0.volume_type")
            ]
        );
    }

    #[test]
    fn unset_computed_force_new_attributes_do_not_replace() {
        let prior = json!({"type": "DEV1-S", "zone": "fr-par-1"});
        let planned = json!({"type": "DEV1-S"});
        assert!(schema().force_new_changes(&prior, &planned).is_empty());
    }
}
