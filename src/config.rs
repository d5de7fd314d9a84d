use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::LinkError;

/// Lowest allowed reconnect interval; anything below this would busy-loop
/// against an unreachable broker.
pub const MIN_RECONNECT_INTERVAL: Duration = Duration::from_millis(500);

/// Placeholder substituted with the device id when synthesizing topics.
pub const DEVICE_PLACEHOLDER: &str = "{device}";

/// Top-level configuration for a telemetry link.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct LinkConfig {
    pub broker: BrokerConfig,
    pub topics: TopicTemplates,
    /// Ring buffer capacity used by series bindings that do not set their own
    pub default_buffer_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            topics: TopicTemplates::default(),
            default_buffer_capacity: 20,
        }
    }
}

impl LinkConfig {
    /// Loads configuration from a TOML file. Missing keys fall back to
    /// defaults section by section.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LinkError> {
        let raw = fs::read_to_string(path.as_ref())?;
        let config: LinkConfig = toml::from_str(&raw)?;
        debug!("Loaded link config from {}", path.as_ref().display());
        Ok(config)
    }
}

/// Broker endpoint and session options.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    pub clean_session: bool,
    /// Delay between reconnect attempts, clamped to at least 500ms
    pub reconnect_interval_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "fleetlink".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 5,
            clean_session: true,
            reconnect_interval_ms: 1000,
        }
    }
}

impl BrokerConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms).max(MIN_RECONNECT_INTERVAL)
    }
}

/// Topic synthesis templates. Inbound telemetry and outbound control use
/// different channel suffixes under the same device prefix.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TopicTemplates {
    pub telemetry: String,
    pub command: String,
}

impl Default for TopicTemplates {
    fn default() -> Self {
        Self {
            telemetry: "fleet/{device}/up/data".to_string(),
            command: "fleet/{device}/down/cmd".to_string(),
        }
    }
}

impl TopicTemplates {
    /// Synthesizes the inbound telemetry topic for a device id.
    pub fn telemetry_topic(&self, device_id: &str) -> Option<String> {
        fill_template(&self.telemetry, device_id)
    }

    /// Synthesizes the outbound command topic for a device target.
    pub fn command_topic(&self, device_id: &str) -> Option<String> {
        fill_template(&self.command, device_id)
    }
}

fn fill_template(template: &str, device_id: &str) -> Option<String> {
    if device_id.is_empty() || template.is_empty() {
        return None;
    }
    Some(template.replace(DEVICE_PLACEHOLDER, device_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_templates_synthesize_device_topics() {
        let topics = TopicTemplates::default();
        assert_eq!(
            topics.telemetry_topic("dev-1").as_deref(),
            Some("fleet/dev-1/up/data")
        );
        assert_eq!(
            topics.command_topic("dev-1").as_deref(),
            Some("fleet/dev-1/down/cmd")
        );
    }

    #[test]
    fn empty_device_id_resolves_to_no_topic() {
        let topics = TopicTemplates::default();
        assert_eq!(topics.telemetry_topic(""), None);
        assert_eq!(topics.command_topic(""), None);
    }

    #[test]
    fn reconnect_interval_never_below_floor() {
        let broker = BrokerConfig {
            reconnect_interval_ms: 10,
            ..BrokerConfig::default()
        };
        assert_eq!(broker.reconnect_interval(), MIN_RECONNECT_INTERVAL);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: LinkConfig = toml::from_str(
            r#"
            [broker]
            host = "broker.local"
            "#,
        )
        .unwrap();
        assert_eq!(config.broker.host, "broker.local");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.default_buffer_capacity, 20);
    }
}
