use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use super::buffer::{Snapshot, SnapshotBuffer};
use super::spec::{BindingMode, BindingSpec, StreamSource};
use crate::config::TopicTemplates;
use crate::payload::{DotPath, Payload};

/// The live state of one binding, published to its consumer over a watch
/// channel. Folding a payload into it is synchronous and infallible.
#[derive(Clone, Debug, PartialEq)]
pub enum BindingState {
    /// Incomplete spec: no listener registered, nothing accumulates
    Disabled,
    /// Latest projected subtree; `None` until the first hit
    Object {
        path: DotPath,
        value: Option<Value>,
    },
    /// Rolling window of per-message snapshots
    Series {
        paths: Vec<DotPath>,
        buffer: SnapshotBuffer,
    },
    /// Static descriptor, never updated by the broker
    Stream { source: StreamSource },
}

impl BindingState {
    /// Builds the initial state for a spec. Telemetry modes come up live only
    /// when the spec is complete; otherwise the binding rests in `Disabled`.
    pub fn initial(spec: &BindingSpec, templates: &TopicTemplates, default_capacity: usize) -> Self {
        if !spec.is_complete(templates) {
            return BindingState::Disabled;
        }
        match &spec.mode {
            BindingMode::Object { path } => BindingState::Object {
                path: path.clone(),
                value: None,
            },
            BindingMode::Series { paths, capacity } => BindingState::Series {
                paths: paths.clone(),
                buffer: SnapshotBuffer::new(capacity.unwrap_or(default_capacity)),
            },
            BindingMode::Stream { source } => BindingState::Stream {
                source: source.clone(),
            },
        }
    }

    /// Folds one decoded payload into the binding.
    ///
    /// Object mode replaces the value wholesale on a hit and keeps the
    /// previous value on a miss. Series mode always appends a snapshot,
    /// recording missing paths as absent fields.
    pub fn apply(&mut self, topic: &str, payload: &Payload) {
        match self {
            BindingState::Object { path, value } => match project(payload, path) {
                Some(projected) => *value = Some(projected),
                None => {
                    debug!(
                        "Projection miss on {}: path '{}' not in payload, keeping previous value",
                        topic, path
                    );
                }
            },
            BindingState::Series { paths, buffer } => {
                let mut fields = BTreeMap::new();
                for path in paths.iter() {
                    if let Some(projected) = project(payload, path) {
                        fields.insert(path.as_str().to_string(), projected);
                    } else {
                        debug!("Projection miss on {}: path '{}' absent in snapshot", topic, path);
                    }
                }
                buffer.push(Snapshot {
                    captured_at: Utc::now(),
                    fields,
                });
            }
            BindingState::Disabled | BindingState::Stream { .. } => {}
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, BindingState::Disabled)
    }

    pub fn object_value(&self) -> Option<&Value> {
        match self {
            BindingState::Object { value, .. } => value.as_ref(),
            _ => None,
        }
    }

    pub fn series(&self) -> Option<&SnapshotBuffer> {
        match self {
            BindingState::Series { buffer, .. } => Some(buffer),
            _ => None,
        }
    }

    pub fn stream_source(&self) -> Option<&StreamSource> {
        match self {
            BindingState::Stream { source } => Some(source),
            _ => None,
        }
    }
}

/// Projects one path out of a decoded payload. Raw text only matches the
/// whole-value sentinel; any dotted path into it is a miss.
fn project(payload: &Payload, path: &DotPath) -> Option<Value> {
    match payload {
        Payload::Json(value) => path.read(value).cloned(),
        Payload::Raw(text) => path.is_whole().then(|| Value::String(text.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::decode;
    use serde_json::json;

    fn series_state(paths: &[&str], capacity: usize) -> BindingState {
        BindingState::Series {
            paths: paths.iter().map(|p| DotPath::parse(p)).collect(),
            buffer: SnapshotBuffer::new(capacity),
        }
    }

    #[test]
    fn series_appends_projected_snapshot() {
        // fleet/dev-1/up/data carrying a nested fan reading
        let mut state = series_state(&["fans.FAN1.speed"], 20);
        state.apply("fleet/dev-1/up/data", &decode(br#"{"fans":{"FAN1":{"speed":42}}}"#));

        let buffer = state.series().unwrap();
        assert_eq!(buffer.len(), 1);
        assert_eq!(
            buffer.latest().unwrap().get("fans.FAN1.speed"),
            Some(&json!(42))
        );
    }

    #[test]
    fn series_keeps_partial_snapshots() {
        let mut state = series_state(&["temp", "humidity"], 20);
        state.apply("t", &decode(br#"{"temp": 21.5}"#));

        let snapshot = state.series().unwrap().latest().unwrap().clone();
        assert_eq!(snapshot.get("temp"), Some(&json!(21.5)));
        assert_eq!(snapshot.get("humidity"), None);
    }

    #[test]
    fn series_evicts_oldest_beyond_capacity() {
        let mut state = series_state(&["n"], 2);
        for n in 0..4 {
            state.apply("t", &Payload::Json(json!({ "n": n })));
        }
        let buffer = state.series().unwrap();
        assert_eq!(buffer.len(), 2);
        let kept: Vec<_> = buffer.iter().map(|s| s.get("n").cloned()).collect();
        assert_eq!(kept, vec![Some(json!(2)), Some(json!(3))]);
    }

    #[test]
    fn object_mode_replaces_value_wholesale() {
        let mut state = BindingState::Object {
            path: DotPath::parse("fans"),
            value: None,
        };
        state.apply("t", &Payload::Json(json!({"fans": {"FAN1": 1}})));
        state.apply("t", &Payload::Json(json!({"fans": {"FAN2": 2}})));
        assert_eq!(state.object_value(), Some(&json!({"FAN2": 2})));
    }

    #[test]
    fn object_mode_retains_previous_value_on_miss() {
        let mut state = BindingState::Object {
            path: DotPath::parse("fans"),
            value: None,
        };
        state.apply("t", &Payload::Json(json!({"fans": {"FAN1": 1}})));
        state.apply("t", &Payload::Json(json!({"other": true})));
        assert_eq!(state.object_value(), Some(&json!({"FAN1": 1})));
    }

    #[test]
    fn raw_payload_only_matches_whole_value() {
        let mut whole = BindingState::Object {
            path: DotPath::whole(),
            value: None,
        };
        whole.apply("t", &Payload::Raw("not-json".to_string()));
        assert_eq!(whole.object_value(), Some(&json!("not-json")));

        let mut dotted = BindingState::Object {
            path: DotPath::parse("a.b"),
            value: None,
        };
        dotted.apply("t", &Payload::Raw("not-json".to_string()));
        assert_eq!(dotted.object_value(), None);
    }

    #[test]
    fn incomplete_spec_starts_disabled() {
        let spec = BindingSpec::series("", Vec::<String>::new());
        let state = BindingState::initial(&spec, &TopicTemplates::default(), 20);
        assert!(state.is_disabled());
    }

    #[test]
    fn disabled_state_ignores_payloads() {
        let mut state = BindingState::Disabled;
        state.apply("t", &Payload::Json(json!({"n": 1})));
        assert!(state.is_disabled());
    }
}
