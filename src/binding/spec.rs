use serde::{Deserialize, Serialize};

use crate::config::TopicTemplates;
use crate::payload::DotPath;

/// Locator for a non-telemetry stream source (e.g. a camera feed URL).
/// Stream bindings never touch the broker; they just carry this descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSource {
    pub locator: String,
}

/// How a binding projects inbound payloads.
#[derive(Clone, Debug, PartialEq)]
pub enum BindingMode {
    /// Keep the latest subtree at `path` (whole payload when the path is
    /// the whole-value sentinel)
    Object { path: DotPath },
    /// Accumulate per-message snapshots of the listed paths into a ring
    /// buffer. `capacity` of `None` uses the link default.
    Series {
        paths: Vec<DotPath>,
        capacity: Option<usize>,
    },
    /// Static stream descriptor, no subscription lifecycle
    Stream { source: StreamSource },
}

/// What a consumer asks the hub for. Immutable once registered: changing any
/// of this means tearing the binding down and registering a new one.
#[derive(Clone, Debug, PartialEq)]
pub struct BindingSpec {
    /// Explicit topic override; wins over `device_id` when set
    pub topic: Option<String>,
    /// Device id the topic is synthesized from when there is no override
    pub device_id: Option<String>,
    pub mode: BindingMode,
}

impl BindingSpec {
    /// Object-mode binding on an explicit topic.
    pub fn object(topic: impl Into<String>, path: &str) -> Self {
        Self {
            topic: Some(topic.into()),
            device_id: None,
            mode: BindingMode::Object {
                path: DotPath::parse(path),
            },
        }
    }

    /// Time-series binding on an explicit topic.
    pub fn series<I, S>(topic: impl Into<String>, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            topic: Some(topic.into()),
            device_id: None,
            mode: BindingMode::Series {
                paths: paths.into_iter().map(|p| DotPath::parse(p.as_ref())).collect(),
                capacity: None,
            },
        }
    }

    /// Time-series binding whose topic is synthesized from a device id.
    pub fn series_for_device<I, S>(device_id: impl Into<String>, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut spec = Self::series(String::new(), paths);
        spec.topic = None;
        spec.device_id = Some(device_id.into());
        spec
    }

    /// Stream binding; bypasses the broker entirely.
    pub fn stream(locator: impl Into<String>) -> Self {
        Self {
            topic: None,
            device_id: None,
            mode: BindingMode::Stream {
                source: StreamSource {
                    locator: locator.into(),
                },
            },
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        if let BindingMode::Series {
            capacity: ref mut slot,
            ..
        } = self.mode
        {
            *slot = Some(capacity);
        }
        self
    }

    /// Resolves the topic this binding listens on: explicit override first,
    /// otherwise synthesized from the device id. `None` means the binding
    /// has nowhere to listen and stays disabled.
    pub fn resolve_topic(&self, templates: &TopicTemplates) -> Option<String> {
        match &self.topic {
            Some(t) if !t.is_empty() => Some(t.clone()),
            _ => self
                .device_id
                .as_deref()
                .and_then(|id| templates.telemetry_topic(id)),
        }
    }

    /// A spec is complete when it has somewhere to listen and something to
    /// project. Stream specs are always complete.
    pub fn is_complete(&self, templates: &TopicTemplates) -> bool {
        match &self.mode {
            BindingMode::Stream { .. } => true,
            BindingMode::Object { .. } => self.resolve_topic(templates).is_some(),
            BindingMode::Series { paths, .. } => {
                !paths.is_empty() && self.resolve_topic(templates).is_some()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_topic_wins_over_device_id() {
        let mut spec = BindingSpec::object("custom/topic", "a.b");
        spec.device_id = Some("dev-1".to_string());
        assert_eq!(
            spec.resolve_topic(&TopicTemplates::default()).as_deref(),
            Some("custom/topic")
        );
    }

    #[test]
    fn device_id_synthesizes_telemetry_topic() {
        let spec = BindingSpec::series_for_device("dev-1", ["fans.FAN1.speed"]);
        assert_eq!(
            spec.resolve_topic(&TopicTemplates::default()).as_deref(),
            Some("fleet/dev-1/up/data")
        );
    }

    #[test]
    fn empty_path_list_is_incomplete() {
        let spec = BindingSpec::series("fleet/dev-1/up/data", Vec::<String>::new());
        assert!(!spec.is_complete(&TopicTemplates::default()));
    }

    #[test]
    fn missing_topic_is_incomplete_but_stream_never_is() {
        let mut spec = BindingSpec::object("", "a");
        spec.topic = None;
        assert!(!spec.is_complete(&TopicTemplates::default()));
        assert!(BindingSpec::stream("rtsp://cam").is_complete(&TopicTemplates::default()));
    }
}
