//! Resource kinds the renderer loads: 2D textures, skybox cubemaps, HDR
//! environments, OBJ models and distance-field fonts.

mod environment;
mod font;
mod model;
mod skybox;
mod texture;

pub use environment::{
    EnvironmentKind, EnvironmentResource, EnvironmentSource, EnvironmentStaged, GpuEnvironment,
    decode_float_image, read_brdf_lut,
};
pub use font::{FontDescriptor, FontKind, FontResource, FontSource, FontStaged, Glyph, GpuFont};
pub use model::{GpuModel, ModelData, ModelKind, ModelResource, ModelSource, ModelVertex};
pub use skybox::{GpuSkybox, SkyboxKind, SkyboxPaths, SkyboxResource};
pub use texture::{GpuTexture, TextureKind, TextureResource, decode_image, upload_image};
