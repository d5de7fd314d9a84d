use serde_json::{Map, Value};
use std::fmt;

/// A parsed dot-separated field path into nested JSON.
///
/// Parsed once when a binding is constructed, never re-parsed per message.
/// The empty path is the whole-value sentinel: it reads back the value it is
/// given.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DotPath {
    raw: String,
    segments: Vec<String>,
}

impl DotPath {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let segments = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split('.').map(str::to_string).collect()
        };
        Self {
            raw: trimmed.to_string(),
            segments,
        }
    }

    /// Whole-value sentinel: projects the entire payload.
    pub fn whole() -> Self {
        Self::parse("")
    }

    pub fn is_whole(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Reads the field this path points at.
    ///
    /// Returns `None` when any segment is missing or when an intermediate
    /// step is not an object (array index mismatch, primitive in the way).
    pub fn read<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        let mut current = value;
        for segment in &self.segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Writes `value` at this path, creating intermediate objects as needed
    /// and overwriting the leaf. A whole-value path replaces `target` itself.
    pub fn write(&self, target: &mut Value, value: Value) {
        let Some((leaf, intermediate)) = self.segments.split_last() else {
            *target = value;
            return;
        };
        let mut current = target;
        for segment in intermediate {
            current = ensure_object(current)
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        ensure_object(current).insert(leaf.clone(), value);
    }
}

/// Forces `value` into an object, replacing whatever non-object was there.
fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

impl fmt::Display for DotPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_nested_field() {
        let value = json!({"fans": {"FAN1": {"speed": 42}}});
        let path = DotPath::parse("fans.FAN1.speed");
        assert_eq!(path.read(&value), Some(&json!(42)));
    }

    #[test]
    fn whole_path_reads_entire_value() {
        let value = json!({"a": 1});
        assert_eq!(DotPath::whole().read(&value), Some(&value));
    }

    #[test]
    fn missing_segment_is_a_miss_not_a_panic() {
        let value = json!({"fans": {"FAN1": {"speed": 42}}});
        assert_eq!(DotPath::parse("fans.FAN2.speed").read(&value), None);
    }

    #[test]
    fn traversal_through_non_object_is_a_miss() {
        let value = json!({"fans": [1, 2, 3]});
        assert_eq!(DotPath::parse("fans.0").read(&value), None);
        let value = json!({"fans": 7});
        assert_eq!(DotPath::parse("fans.speed").read(&value), None);
    }

    #[test]
    fn write_creates_intermediate_levels() {
        let mut target = json!({});
        DotPath::parse("fans.FAN1.speed").write(&mut target, json!(42));
        assert_eq!(target, json!({"fans": {"FAN1": {"speed": 42}}}));
    }

    #[test]
    fn write_overwrites_leaf_and_non_object_intermediates() {
        let mut target = json!({"fans": 3});
        DotPath::parse("fans.FAN1").write(&mut target, json!("on"));
        assert_eq!(target, json!({"fans": {"FAN1": "on"}}));
    }

    #[test]
    fn whole_path_write_replaces_target() {
        let mut target = json!({"old": true});
        DotPath::whole().write(&mut target, json!(1));
        assert_eq!(target, json!(1));
    }
}
