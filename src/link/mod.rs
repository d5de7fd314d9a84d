//! # Telemetry Link
//!
//! The single shared broker connection and everything that rides on it.
//!
//! ```text
//! link/
//! ├── transport.rs - wire boundary: rumqttc behind the Transport trait
//! ├── mux.rs       - refcounted topic -> listener fan-out
//! └── hub.rs       - the hub actor, connection state, command dispatch
//! ```
//!
//! One `LinkHub` task owns the transport, the multiplexer and all binding
//! state. Handles talk to it over an mpsc channel; binding data and
//! connection state flow back over watch channels. Every registration,
//! dispatch and state mutation is serialized on the hub's loop, so the whole
//! layer runs without a single lock.
//!
//! ```text
//! broker ──► MqttTransport ──► LinkHub ──► TopicMux ──► binding state ──► watch ──► consumer
//!                                  ▲
//! consumer ──► LinkHandle ─────────┘  (register / deactivate / send_command)
//! ```

pub mod hub;
pub mod mux;
pub mod transport;

pub use hub::{BindingHandle, BindingId, ConnectionState, LinkHandle, LinkHub};
pub use mux::{ListenerId, TopicMux};
pub use transport::{MqttTransport, Transport, TransportEvent};
