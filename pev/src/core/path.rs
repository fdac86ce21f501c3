//! Helpers for resolving dot-separated field paths into JSON contexts.

use serde_json::Value;

/// Resolve `path` (e.g. `issue.labels.0`) against `root`.
///
/// Object segments are looked up by key and array segments by numeric index.
/// Any missing segment yields `None` ("undefined"); `Some(Value::Null)` means
/// the field exists and is `null`. An empty path resolves to the root itself.
pub fn resolve_field<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
