//! Loadable resources and their two-phase lifecycle.
//!
//! A resource decodes on a background worker ([`Resource::run`]) into a
//! mutex-guarded staging slot, reports readiness through a non-blocking
//! `try_lock` ([`Resource::is_ready`]), and uploads to the graphics context on
//! the owner thread ([`Resource::ready`]).
//!
//! # Invariants
//! - GPU objects are created only in `ready`, never while decoding.
//! - `Uploaded` and `Failed` are terminal. A second `ready` does nothing.
//! - Every failure is reported once, at error level, through the resource's
//!   message sink. Failures never panic across threads.
//! - The staging slot is the only data shared with the worker thread.

pub mod error;
pub mod gpu;
pub mod kinds;
pub mod resource;
pub mod staging;
pub mod state;

pub use error::ResourceError;
pub use gpu::{
    BufferId, FloatImage, GpuCall, GpuContext, GpuError, HeadlessContext, ImageData, TextureId,
    validate_cubemap,
};
pub use kinds::{
    EnvironmentKind, EnvironmentResource, EnvironmentSource, FontDescriptor, FontKind, FontResource,
    FontSource, Glyph, GpuEnvironment, GpuFont, GpuModel, GpuSkybox, GpuTexture, ModelData,
    ModelKind, ModelResource, ModelSource, ModelVertex, SkyboxKind, SkyboxPaths, SkyboxResource,
    TextureKind, TextureResource,
};
pub use resource::{Loadable, Resource, ResourceKind};
pub use staging::Staging;
pub use state::ResourceState;

pub fn crate_info() -> &'static str {
    "sensorview-resource v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("resource"));
    }
}
