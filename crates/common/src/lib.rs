//! Shared types for the sensorview renderer.
//!
//! # Invariants
//! - Nothing in this crate touches the graphics context.
//! - Owner-thread-only collaborators (message sinks) are used through `Rc`,
//!   never shared across threads.

pub mod message;
pub mod owner;
pub mod paths;
pub mod types;

pub use message::{Message, MessageLevel, MessageLog, MessageSink, TracingSink};
pub use owner::OwnerThread;
pub use paths::{candidate_paths, resolve_path};
pub use types::ScreenSize;

pub fn crate_info() -> &'static str {
    "sensorview-common v0.1.0"
}
