//! Dot-delimited access into the nested values tree.
//!
//! `"user.emails.0"` addresses `values["user"]["emails"][0]`. Numeric segments index
//! arrays positionally; callers that want array containers must create them first.

use std::borrow::Cow;
use std::fmt::{Display, Formatter};

use serde_json::{Map, Value};

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldPath(Cow<'static, str>);

impl FieldPath {
    pub const fn new(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }

    pub fn owned(value: impl Into<String>) -> Self {
        Self(Cow::Owned(value.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Appends one segment, e.g. `contacts` + `2` -> `contacts.2`.
    pub fn join(&self, segment: impl Display) -> Self {
        Self::owned(format!("{}.{segment}", self.0))
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FieldPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for FieldPath {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FieldPath {
    fn from(value: String) -> Self {
        Self::owned(value)
    }
}

/// Reads the value at `path`. Any missing or non-container intermediate yields `None`.
pub fn get<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = tree;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Writes `value` at `path` in place, replacing missing or scalar intermediates with
/// empty objects.
pub fn set(tree: &mut Value, path: &str, value: Value) {
    let (parents, last) = match path.rsplit_once('.') {
        Some((parents, last)) => (Some(parents), last),
        None => (None, path),
    };

    let mut current = tree;
    if let Some(parents) = parents {
        for segment in parents.split('.') {
            let slot = slot_mut(current, segment);
            if !is_container(slot) {
                *slot = Value::Object(Map::new());
            }
            current = slot;
        }
    }
    *slot_mut(current, last) = value;
}

fn is_container(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

fn slot_mut<'a>(container: &'a mut Value, segment: &str) -> &'a mut Value {
    match (container.is_array(), segment.parse::<usize>()) {
        (true, Ok(index)) => {
            if let Some(items) = container.as_array_mut() {
                if index >= items.len() {
                    items.resize(index + 1, Value::Null);
                }
            }
            &mut container[index]
        }
        _ => {
            // Named segment on a scalar or an array: the slot becomes an object.
            if !container.is_object() {
                *container = Value::Object(Map::new());
            }
            &mut container[segment]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_short_circuits_on_missing_or_null_intermediates() {
        let tree = json!({ "a": { "b": null }, "list": [1, 2] });
        assert_eq!(get(&tree, "a.b"), Some(&Value::Null));
        assert_eq!(get(&tree, "a.b.c"), None);
        assert_eq!(get(&tree, "missing.x"), None);
        assert_eq!(get(&tree, "list.1"), Some(&json!(2)));
        assert_eq!(get(&tree, "list.9"), None);
        assert_eq!(get(&tree, "list.first"), None);
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let mut tree = json!({});
        set(&mut tree, "profile.contact.email", json!("a@b.com"));
        assert_eq!(tree, json!({ "profile": { "contact": { "email": "a@b.com" } } }));
    }

    #[test]
    fn set_replaces_scalar_intermediates() {
        let mut tree = json!({ "profile": "legacy", "keep": 1 });
        set(&mut tree, "profile.name", json!("Ada"));
        assert_eq!(tree, json!({ "profile": { "name": "Ada" }, "keep": 1 }));
    }

    #[test]
    fn set_indexes_existing_arrays_positionally() {
        let mut tree = json!({ "phones": ["a", "b"] });
        set(&mut tree, "phones.1", json!("c"));
        set(&mut tree, "phones.3", json!("d"));
        assert_eq!(tree, json!({ "phones": ["a", "c", null, "d"] }));
    }

    #[test]
    fn numeric_segment_without_array_creates_object_key() {
        let mut tree = json!({});
        set(&mut tree, "slots.0", json!(true));
        assert_eq!(tree, json!({ "slots": { "0": true } }));
    }

    #[test]
    fn set_then_get_returns_written_value() {
        let mut tree = json!({ "a": [ { "b": 1 } ] });
        for (path, value) in [
            ("a.0.b", json!(2)),
            ("a.0.c.d", json!("deep")),
            ("x", json!([1, 2, 3])),
            ("a.2", json!({ "n": null })),
        ] {
            set(&mut tree, path, value.clone());
            assert_eq!(get(&tree, path), Some(&value), "path {path}");
        }
    }

    #[test]
    fn field_path_join_appends_segment() {
        let path = FieldPath::new("contacts").join(2).join("phone");
        assert_eq!(path.as_str(), "contacts.2.phone");
        assert_eq!(path.to_string(), "contacts.2.phone");
    }
}
