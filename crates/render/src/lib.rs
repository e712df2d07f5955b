//! Render-loop driver.
//!
//! Each iteration waits for window-system events (blocking when nothing is
//! loading, bounded by the poll interval otherwise), ticks the task
//! scheduler, and, if anything changed, dispatches the event bus and swaps.
//!
//! # Invariants
//! - The driver, the scheduler it ticks and the bus it dispatches all live on
//!   the thread that owns the graphics context.
//! - Per presented frame: camera changed, screen resized, then every draw
//!   category in declaration order, then swap.
//! - A failed resource never stops the loop. Only a close request does.

mod driver;
mod platform;
mod scene;
mod stats;

pub use driver::{FrameReport, LoopConfig, RenderLoop};
pub use platform::{
    EventSource, HeadlessEvents, HeadlessPresenter, PlatformEvent, Presenter, WaitMode,
};
pub use scene::{
    FontEntry, ManifestError, ModelEntry, ResourceReport, Scene, SceneManifest, SkyboxEntry,
    SkyboxFolder, TextureEntry,
};
pub use stats::FrameStats;

pub fn crate_info() -> &'static str {
    "sensorview-render v0.1.0"
}
