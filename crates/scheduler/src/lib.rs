//! Task scheduler: splits every resource load into a background phase and an
//! owner-thread finalize phase, polled once per render-loop iteration.
//!
//! # Invariants
//! - `finalize` runs on the thread that calls [`TaskScheduler::tick`], exactly
//!   once, and only after the task's `poll_ready` returned true.
//! - `tick` never blocks on a task that is not ready.
//! - A task is in the pending set at most once; finalized tasks are gone.
//! - There is no cancellation and no timeout. A background unit that never
//!   completes leaves its task pending forever.
//!
//! # Threads
//! Each registration spawns one detached, one-shot worker thread. An optional
//! cap ([`SchedulerConfig::max_running`]) holds extra registrations back in
//! registration order until a running task finalizes.

mod scheduler;
mod task;

pub use scheduler::{SchedulerConfig, SchedulerStats, TaskScheduler};
pub use task::{PendingTask, TaskId, TaskPhase};

pub fn crate_info() -> &'static str {
    "sensorview-scheduler v0.1.0"
}
