//! # fleetlink
//!
//! Live-telemetry and command link for IoT device dashboards. One shared
//! MQTT connection serves any number of independently appearing and
//! disappearing consumers, each watching a different slice of a possibly
//! deeply nested JSON payload, without leaking subscriptions or
//! cross-delivering stale data.
//!
//! ## Architecture
//!
//! ```text
//! src/
//! ├── config.rs  - broker options, topic templates, buffer defaults
//! ├── error.rs   - caller-facing failure taxonomy
//! ├── payload/   - JSON codec with raw-text fallback, dot-path projection
//! ├── binding/   - per-consumer specs, ring buffers, live state
//! └── link/      - transport boundary, topic multiplexer, hub actor
//! ```
//!
//! All shared state lives inside one hub task; handles talk to it over
//! channels, so the layer needs no locks and every operation observes a
//! single global order.
//!
//! ## Usage
//!
//! ```no_run
//! use fleetlink::{BindingSpec, LinkConfig, LinkHandle};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), fleetlink::LinkError> {
//! let link = LinkHandle::connect(LinkConfig::default());
//!
//! // a fan-speed chart: bounded time series projected from nested JSON
//! let fan = link
//!     .register_binding(BindingSpec::series_for_device("dev-1", ["fans.FAN1.speed"]))
//!     .await?;
//!
//! // resolves once the broker acknowledges delivery
//! link.send_command("dev-1", json!({"command": "fan_off"})).await?;
//!
//! // dropping the handle releases the subscription
//! drop(fan);
//! # Ok(())
//! # }
//! ```

pub mod binding;
pub mod config;
pub mod error;
pub mod link;
pub mod payload;

pub use binding::{BindingMode, BindingSpec, BindingState, Snapshot, SnapshotBuffer, StreamSource};
pub use config::{BrokerConfig, LinkConfig, TopicTemplates};
pub use error::LinkError;
pub use link::{
    BindingHandle, BindingId, ConnectionState, LinkHandle, LinkHub, MqttTransport, Transport,
    TransportEvent,
};
pub use payload::{DotPath, Payload};
