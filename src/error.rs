//! Error definitions for the telemetry link

use thiserror::Error;

/// Failures surfaced to callers of the link.
///
/// Inbound anomalies (decode fallback, projection misses, messages on
/// unsubscribed topics) are handled locally and never appear here; this type
/// only covers operations a caller is actively awaiting.
#[derive(Debug, Error)]
pub enum LinkError {
    /// A publish or subscribe was attempted while the link is not connected
    #[error("not connected to broker")]
    NotConnected,

    /// No command topic could be resolved for the given device target
    #[error("no topic resolvable for device target '{0}'")]
    UnresolvedTarget(String),

    /// The transport rejected an operation
    #[error("transport failure: {0}")]
    Transport(String),

    /// The connection dropped before the broker confirmed delivery
    #[error("connection lost before delivery was acknowledged")]
    ConnectionLost,

    /// The hub task is no longer running
    #[error("link hub is shut down")]
    Closed,

    /// Configuration file could not be read
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),
}

impl From<rumqttc::ClientError> for LinkError {
    fn from(e: rumqttc::ClientError) -> Self {
        LinkError::Transport(e.to_string())
    }
}
