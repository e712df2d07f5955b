//! Event bus: ordered, revocable callback lists keyed by draw category.
//!
//! # Invariants
//! - Dispatch order within a channel is connection order.
//! - Per frame, camera-changed runs first, then screen-resized, then every
//!   [`Category`] in declaration order.
//! - A disconnected callback is never invoked again. Disconnecting twice, or
//!   after the channel is gone, is a no-op.
//! - Channels hold weak references only. A callback lives as long as its
//!   [`Connection`] (or its channel, once detached).
//!
//! Everything here is single-threaded and runs on the owner thread.

pub mod bus;
pub mod category;
pub mod channel;

pub use bus::{DispatchCounts, EventBus, FrameEvents};
pub use category::Category;
pub use channel::{Channel, Connection};

pub fn crate_info() -> &'static str {
    "sensorview-bus v0.1.0"
}
