//! Attribute bag handed to every callback.
//!
//! Attributes are JSON values addressed by dotted paths in which numeric
//! segments index lists (`root_volume.0.size_in_gb`). A bag carries three
//! views: the prior state, the planned values, and the working state that
//! callbacks read and write. Change detection compares prior and planned.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::diagnostics::Diagnostics;
use super::error::ProviderError;
use super::timeouts::Timeouts;

/// Working data of a resource, data source or action invocation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceData {
    id: Option<String>,
    prior: Value,
    planned: Value,
    current: Value,
    is_new: bool,
    replace: BTreeSet<String>,
    diagnostics: Diagnostics,
    timeouts: Timeouts,
}

impl ResourceData {
    /// Bag for a resource that does not exist yet.
    #[must_use]
    pub fn new(desired: Value) -> Self {
        let planned = normalise(desired);
        Self {
            prior: Value::Object(Map::new()),
            current: planned.clone(),
            planned,
            is_new: true,
            ..Self::default()
        }
    }

    /// Bag reflecting existing state, used by `read`, `delete` and import.
    #[must_use]
    pub fn from_state(id: impl Into<String>, state: Value) -> Self {
        let state_value = normalise(state);
        Self {
            id: Some(id.into()),
            prior: state_value.clone(),
            planned: state_value.clone(),
            current: state_value,
            ..Self::default()
        }
    }

    /// Bag for an update from `prior` to `planned`.
    #[must_use]
    pub fn planned(id: impl Into<String>, prior: Value, planned: Value) -> Self {
        let planned_value = normalise(planned);
        Self {
            id: Some(id.into()),
            prior: normalise(prior),
            current: planned_value.clone(),
            planned: planned_value,
            ..Self::default()
        }
    }

    /// Bag for an update whose planned values are `prior` with `changes`
    /// merged in at the top level.
    #[must_use]
    pub fn with_changes(id: impl Into<String>, prior: Value, changes: Value) -> Self {
        let mut planned = normalise(prior.clone());
        if let (Value::Object(target), Value::Object(patch)) = (&mut planned, changes) {
            target.extend(patch);
        }
        Self::planned(id, prior, planned)
    }

    /// Replaces the timeouts.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Identifier, empty when unset.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    /// Sets the identifier.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// Clears the identifier, signalling that the object is gone.
    pub fn clear_id(&mut self) {
        self.id = None;
    }

    /// Returns `true` during `create` and create-time plans.
    #[must_use]
    pub const fn is_new_resource(&self) -> bool {
        self.is_new
    }

    /// Reads an attribute from the working state.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.current, path).filter(|value| !value.is_null())
    }

    /// Reads an attribute from the prior state.
    #[must_use]
    pub fn get_prior(&self, path: &str) -> Option<&Value> {
        lookup(&self.prior, path).filter(|value| !value.is_null())
    }

    /// Reads a string attribute.
    #[must_use]
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Reads a string attribute, returning `None` when empty.
    #[must_use]
    pub fn get_ok_str(&self, path: &str) -> Option<&str> {
        self.get_str(path).filter(|value| !value.is_empty())
    }

    /// Reads a string attribute, defaulting to the empty string.
    #[must_use]
    pub fn get_string(&self, path: &str) -> String {
        self.get_str(path).unwrap_or_default().to_owned()
    }

    /// Reads an integer attribute.
    #[must_use]
    pub fn get_i64(&self, path: &str) -> Option<i64> {
        self.get(path).and_then(Value::as_i64)
    }

    /// Reads a non-negative integer attribute, ignoring zero.
    #[must_use]
    pub fn get_ok_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(Value::as_u64).filter(|value| *value > 0)
    }

    /// Reads a boolean attribute, defaulting to `false`.
    #[must_use]
    pub fn get_bool(&self, path: &str) -> bool {
        self.get_bool_opt(path).unwrap_or_default()
    }

    /// Reads a boolean attribute.
    #[must_use]
    pub fn get_bool_opt(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(Value::as_bool)
    }

    /// Reads a list or set of strings, skipping non-string members.
    #[must_use]
    pub fn get_string_list(&self, path: &str) -> Vec<String> {
        string_list(self.get(path))
    }

    /// Reads a list of strings from the prior state.
    #[must_use]
    pub fn get_prior_string_list(&self, path: &str) -> Vec<String> {
        string_list(self.get_prior(path))
    }

    /// Reads a string map.
    #[must_use]
    pub fn get_string_map(&self, path: &str) -> BTreeMap<String, String> {
        self.get(path)
            .and_then(Value::as_object)
            .map(|object| {
                object
                    .iter()
                    .filter_map(|(key, value)| {
                        value.as_str().map(|text| (key.clone(), text.to_owned()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of elements of a list attribute.
    #[must_use]
    pub fn list_len(&self, path: &str) -> usize {
        self.get(path)
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    /// Writes an attribute in the working state.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) {
        let segments: Vec<&str> = path.split('.').collect();
        assign(&mut self.current, &segments, value.into());
    }

    /// Returns `true` when the planned value differs from the prior one.
    /// Null, absent and empty collections compare equal.
    #[must_use]
    pub fn has_change(&self, path: &str) -> bool {
        if self.is_new {
            return lookup(&self.planned, path).is_some_and(|value| !is_zero(value));
        }
        let before = lookup(&self.prior, path).filter(|value| !is_unset(value));
        let after = lookup(&self.planned, path).filter(|value| !is_unset(value));
        before != after
    }

    /// Returns `true` when any of the paths changed.
    #[must_use]
    pub fn has_changes(&self, paths: &[&str]) -> bool {
        paths.iter().any(|path| self.has_change(path))
    }

    /// Returns `(prior, planned)` for an attribute, `Null` when absent.
    #[must_use]
    pub fn get_change(&self, path: &str) -> (Value, Value) {
        (
            lookup(&self.prior, path).cloned().unwrap_or(Value::Null),
            lookup(&self.planned, path).cloned().unwrap_or(Value::Null),
        )
    }

    /// Marks an attribute as requiring replacement of the resource.
    pub fn force_new(&mut self, path: &str) {
        self.replace.insert(path.to_owned());
    }

    /// Attributes whose change requires replacement.
    #[must_use]
    pub const fn requires_replace(&self) -> &BTreeSet<String> {
        &self.replace
    }

    /// Records a warning.
    pub fn add_warning(&mut self, summary: impl Into<String>, detail: impl Into<String>) {
        self.diagnostics.warning(summary, detail);
    }

    /// Records a warning tied to an attribute.
    pub fn add_attribute_warning(&mut self, attribute: &str, summary: impl Into<String>) {
        self.diagnostics.attribute_warning(attribute, summary);
    }

    /// Diagnostics recorded so far.
    #[must_use]
    pub const fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Timeouts of the invocation.
    #[must_use]
    pub const fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Working state as a JSON object.
    #[must_use]
    pub const fn state(&self) -> &Value {
        &self.current
    }

    /// Planned values as a JSON object.
    #[must_use]
    pub const fn planned_state(&self) -> &Value {
        &self.planned
    }

    /// Final state, or `None` when the identifier was cleared.
    #[must_use]
    pub fn into_state(self) -> Option<(String, Value)> {
        let Self { id, current, .. } = self;
        id.map(|identifier| (identifier, current))
    }

    /// Deserialises the working state into a typed input.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Validation`] naming the offending input
    /// when decoding fails.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ProviderError> {
        serde_json::from_value(self.current.clone())
            .map_err(|err| ProviderError::validation("config", err.to_string()))
    }
}

fn normalise(value: Value) -> Value {
    if value.is_object() {
        value
    } else {
        Value::Object(Map::new())
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Looks up a dotted path.
#[must_use]
pub fn lookup<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(root, |node, segment| match node {
        Value::Object(object) => object.get(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(|index| items.get(index)),
        _ => None,
    })
}

fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(object) => object.is_empty(),
        _ => false,
    }
}

/// Returns `true` for null, empty and zero values.
#[must_use]
pub fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_i64() == Some(0) || number.as_u64() == Some(0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(object) => object.is_empty(),
    }
}

fn assign(node: &mut Value, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if let Ok(index) = head.parse::<usize>() {
        if !node.is_array() {
            *node = Value::Array(Vec::new());
        }
        if let Value::Array(items) = node {
            while items.len() <= index {
                items.push(Value::Null);
            }
            if let Some(slot) = items.get_mut(index) {
                assign(slot, rest, value);
            }
        }
        return;
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(object) = node {
        let slot = object.entry((*head).to_owned()).or_insert(Value::Null);
        assign(slot, rest, value);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn nested_paths_read_and_write_lists() {
        let mut data = ResourceData::new(json!({"root_volume": [{"size_in_gb": 20}]}));
        assert_eq!(data.get_i64("root_volume.0.size_in_gb"), Some(20));
        data.set("root_volume.0.volume_id", "fr-par-1/abc");
        data.set("private_network.1.pn_id", "pn");
        assert_eq!(data.get_str("root_volume.0.volume_id"), Some("fr-par-1/abc"));
        assert_eq!(data.list_len("private_network"), 2);
        assert_eq!(data.get("private_network.0"), None);
    }

    #[test]
    fn has_change_compares_prior_and_planned() {
        let data = ResourceData::with_changes(
            "fr-par-1/x",
            json!({"name": "a", "tags": ["x"], "gone": null}),
            json!({"name": "b"}),
        );
        assert!(data.has_change("name"));
        assert!(!data.has_change("tags"));
        assert!(!data.has_change("gone"));
        assert_eq!(data.get_change("name"), (json!("a"), json!("b")));
    }

    #[test]
    fn empty_collections_match_absent_values() {
        let data = ResourceData::planned(
            "fr-par-1/x",
            json!({"tags": [], "user_data": {}, "ip_ids": ["a"]}),
            json!({"tags": null, "ip_ids": []}),
        );
        assert!(!data.has_change("tags"));
        assert!(!data.has_change("user_data"));
        assert!(data.has_change("ip_ids"));
    }

    #[test]
    fn new_resources_report_non_zero_values_as_changes() {
        let data = ResourceData::new(json!({"name": "a", "tags": []}));
        assert!(data.has_change("name"));
        assert!(!data.has_change("tags"));
        assert!(data.is_new_resource());
    }

    #[test]
    fn cleared_id_yields_no_state() {
        let mut data = ResourceData::from_state("fr-par-1/x", json!({"name": "a"}));
        data.clear_id();
        assert_eq!(data.id(), "");
        assert!(data.into_state().is_none());
    }

    #[test]
    fn string_collections_are_extracted() {
        let data = ResourceData::new(json!({
            "tags": ["a", "b"],
            "user_data": {"foo": "bar"}
        }));
        assert_eq!(data.get_string_list("tags"), vec!["a", "b"]);
        assert_eq!(
            data.get_string_map("user_data").get("foo").map(String::as_str),
            Some("bar")
        );
    }
}
