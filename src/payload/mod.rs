//! # Payload Handling
//!
//! Stateless utilities shared by the subscription and command paths:
//!
//! ```text
//! payload/
//! ├── codec.rs - wire bytes <-> structured values, raw-text fallback
//! └── path.rs  - dot-path projection into nested JSON
//! ```
//!
//! Both halves are pure: the codec never fails (malformed bytes come back as
//! raw text) and the projector never panics (a path that runs through a
//! non-object is a miss, not an error).

pub mod codec;
pub mod path;

pub use codec::{decode, encode, Payload};
pub use path::DotPath;
