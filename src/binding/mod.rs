//! # Live-Data Bindings
//!
//! Per-consumer subscription state: what to watch, how to project it, and
//! where the projected data accumulates.
//!
//! ```text
//! binding/
//! ├── spec.rs   - what a consumer asks for (topic/device, mode, paths)
//! ├── buffer.rs - bounded FIFO ring of telemetry snapshots
//! └── state.rs  - the live state a payload is folded into
//! ```
//!
//! A binding with no topic or an empty path list is *disabled*, not broken:
//! it holds an empty buffer, registers no listener, and stays that way until
//! it is torn down and recreated with a complete spec. This is the normal
//! resting state of a widget that has not been configured yet.

pub mod buffer;
pub mod spec;
pub mod state;

pub use buffer::{Snapshot, SnapshotBuffer};
pub use spec::{BindingMode, BindingSpec, StreamSource};
pub use state::BindingState;
