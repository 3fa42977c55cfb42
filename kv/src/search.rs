//! Linear prefix search over keys or string values.

use std::collections::{BTreeMap, HashMap};

use crate::value::Value;

/// Returns every entry whose key starts with `prefix`.
pub fn by_key_prefix(data: &HashMap<String, Value>, prefix: &str) -> BTreeMap<String, Value> {
    data.iter()
        .filter(|(k, _)| k.starts_with(prefix))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Returns every string-valued entry whose value starts with `prefix`.
/// Non-string values never match.
pub fn by_value_prefix(data: &HashMap<String, Value>, prefix: &str) -> BTreeMap<String, Value> {
    data.iter()
        .filter(|(_, v)| v.as_str().is_some_and(|s| s.starts_with(prefix)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
