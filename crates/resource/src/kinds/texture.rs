use std::path::{Path, PathBuf};

use crate::error::{ResourceError, locate};
use crate::gpu::{GpuContext, ImageData, TextureId};
use crate::resource::{Resource, ResourceKind};

/// An uploaded 2D texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuTexture {
    pub id: TextureId,
    pub width: u32,
    pub height: u32,
}

/// Locate and decode an image file to RGBA8.
pub fn decode_image(path: &Path) -> Result<ImageData, ResourceError> {
    let found = locate(path)?;
    let image = image::open(&found)
        .map_err(|e| ResourceError::decode(found.display().to_string(), e))?;
    Ok(ImageData::from_rgba(image.into_rgba8()))
}

/// Upload a decoded image as a 2D texture.
pub fn upload_image(
    image: &ImageData,
    gpu: &dyn GpuContext,
    label: &str,
) -> Result<GpuTexture, ResourceError> {
    let id = gpu
        .create_texture(label, image)
        .map_err(|e| ResourceError::upload(label, e))?;
    Ok(GpuTexture {
        id,
        width: image.width,
        height: image.height,
    })
}

/// Single image file uploaded as a 2D texture.
#[derive(Debug)]
pub struct TextureKind;

impl ResourceKind for TextureKind {
    const KIND: &'static str = "texture";
    type Source = PathBuf;
    type Staged = ImageData;
    type Uploaded = GpuTexture;

    fn decode(source: PathBuf) -> Result<ImageData, ResourceError> {
        decode_image(&source)
    }

    fn upload(staged: ImageData, gpu: &dyn GpuContext, label: &str) -> Result<GpuTexture, ResourceError> {
        upload_image(&staged, gpu, label)
    }

    fn release(uploaded: &GpuTexture, gpu: &dyn GpuContext) {
        gpu.release_texture(uploaded.id);
    }
}

pub type TextureResource = Resource<TextureKind>;
