use std::collections::BTreeMap;

use serde_json::Value;

use super::error::{invalid_argument, SubscriberResult};

/// A single `(field, operator, value)` constraint.
///
/// Operators are carried verbatim; the database decides which ones it accepts.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldFilter {
    field: String,
    op: String,
    value: Value,
}

impl FieldFilter {
    pub fn new(field: impl Into<String>, op: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: op.into(),
            value: value.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn op(&self) -> &str {
        &self.op
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub(crate) fn with_value(&self, value: Value) -> Self {
        Self {
            field: self.field.clone(),
            op: self.op.clone(),
            value,
        }
    }
}

/// Conjunction of filters making up one concrete query.
pub type FilterGroup = Vec<FieldFilter>;

/// Declarative description of which collections to follow and how to filter them.
///
/// Every collection maps to a list of filter groups. Each group becomes its own
/// query and the results are merged; an empty list means "the whole collection".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubscriptionSpec {
    collections: BTreeMap<String, Vec<FilterGroup>>,
}

impl SubscriptionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a collection with the given filter groups.
    pub fn collection(mut self, name: impl Into<String>, groups: Vec<FilterGroup>) -> Self {
        self.insert(name, groups);
        self
    }

    /// Adds a collection that is followed without filters.
    pub fn unfiltered(self, name: impl Into<String>) -> Self {
        self.collection(name, Vec::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, groups: Vec<FilterGroup>) {
        self.collections.insert(name.into(), groups);
    }

    pub fn get(&self, name: &str) -> Option<&[FilterGroup]> {
        self.collections.get(name).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[FilterGroup])> {
        self.collections
            .iter()
            .map(|(name, groups)| (name.as_str(), groups.as_slice()))
    }

    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Parses a spec of the form `{ "todos": [[["owner", "==", "{userId}"]]] }`.
    ///
    /// Collections whose entry is malformed are skipped with a warning rather than
    /// failing the whole spec. A `null` entry follows the collection unfiltered.
    pub fn from_json(value: &Value) -> SubscriberResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| invalid_argument("Subscription spec must be a JSON object"))?;

        let mut spec = Self::new();
        for (name, entry) in object {
            match parse_groups(entry) {
                Some(groups) => spec.insert(name.clone(), groups),
                None => log::warn!(
                    "skipping collection `{name}`: filter groups must be arrays of [field, op, value] triples"
                ),
            }
        }
        Ok(spec)
    }

    pub fn from_json_str(text: &str) -> SubscriberResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|err| invalid_argument(format!("Invalid subscription spec JSON: {err}")))?;
        Self::from_json(&value)
    }
}

fn parse_groups(entry: &Value) -> Option<Vec<FilterGroup>> {
    match entry {
        Value::Null => Some(Vec::new()),
        Value::Array(groups) => groups.iter().map(parse_group).collect(),
        _ => None,
    }
}

fn parse_group(group: &Value) -> Option<FilterGroup> {
    group.as_array()?.iter().map(parse_filter).collect()
}

fn parse_filter(triple: &Value) -> Option<FieldFilter> {
    match triple.as_array()?.as_slice() {
        [Value::String(field), Value::String(op), value] => {
            Some(FieldFilter::new(field.clone(), op.clone(), value.clone()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_nested_filter_groups() {
        let spec = SubscriptionSpec::from_json(&json!({
            "tasks": [
                [["owner", "==", "{userId}"]],
                [["shared_with", "array-contains", "{userId}"], ["archived", "==", false]]
            ],
            "settings": null
        }))
        .unwrap();

        assert_eq!(spec.len(), 2);
        let tasks = spec.get("tasks").unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1][1], FieldFilter::new("archived", "==", false));
        assert!(spec.get("settings").unwrap().is_empty());
    }

    #[test]
    fn malformed_collections_are_skipped() {
        let spec = SubscriptionSpec::from_json(&json!({
            "broken": "owner == me",
            "short_triple": [[["owner", "=="]]],
            "group_not_list": [{"owner": "me"}],
            "ok": []
        }))
        .unwrap();

        assert_eq!(spec.collection_names().collect::<Vec<_>>(), vec!["ok"]);
    }

    #[test]
    fn rejects_non_object_root() {
        let err = SubscriptionSpec::from_json(&json!([1, 2])).unwrap_err();
        assert_eq!(err.code_str(), "subscriber/invalid-argument");
        assert!(SubscriptionSpec::from_json_str("{not json").is_err());
    }

    #[test]
    fn builder_replaces_existing_collection() {
        let spec = SubscriptionSpec::new()
            .unfiltered("notes")
            .collection("notes", vec![vec![FieldFilter::new("pinned", "==", true)]]);
        assert_eq!(spec.get("notes").unwrap().len(), 1);
    }
}
