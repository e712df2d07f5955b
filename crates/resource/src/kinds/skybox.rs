use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ResourceError;
use crate::gpu::{GpuContext, ImageData, TextureId, validate_cubemap};
use crate::kinds::texture::decode_image;
use crate::resource::{Resource, ResourceKind};

/// Paths of the six skybox faces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkyboxPaths {
    pub right: PathBuf,
    pub left: PathBuf,
    pub up: PathBuf,
    pub down: PathBuf,
    pub back: PathBuf,
    pub front: PathBuf,
}

impl SkyboxPaths {
    /// Faces named `rt`, `lf`, `up`, `dn`, `bk`, `ft` plus `extension` inside
    /// `folder`.
    pub fn from_folder(folder: &Path, extension: &str) -> Self {
        let face = |name: &str| folder.join(format!("{name}.{}", extension.trim_start_matches('.')));
        Self {
            right: face("rt"),
            left: face("lf"),
            up: face("up"),
            down: face("dn"),
            back: face("bk"),
            front: face("ft"),
        }
    }

    /// Faces in upload order: right, left, up, down, back, front.
    pub fn in_upload_order(&self) -> [&Path; 6] {
        [
            &self.right,
            &self.left,
            &self.up,
            &self.down,
            &self.back,
            &self.front,
        ]
    }
}

/// An uploaded cubemap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuSkybox {
    pub id: TextureId,
    pub size: u32,
}

/// Six face images uploaded as one cubemap.
#[derive(Debug)]
pub struct SkyboxKind;

impl ResourceKind for SkyboxKind {
    const KIND: &'static str = "skybox";
    type Source = SkyboxPaths;
    type Staged = [ImageData; 6];
    type Uploaded = GpuSkybox;

    fn decode(source: SkyboxPaths) -> Result<[ImageData; 6], ResourceError> {
        let [right, left, up, down, back, front] = source.in_upload_order();
        let faces = [
            decode_image(right)?,
            decode_image(left)?,
            decode_image(up)?,
            decode_image(down)?,
            decode_image(back)?,
            decode_image(front)?,
        ];
        validate_cubemap(&faces).map_err(|e| ResourceError::decode("skybox", e))?;
        Ok(faces)
    }

    fn upload(
        staged: [ImageData; 6],
        gpu: &dyn GpuContext,
        label: &str,
    ) -> Result<GpuSkybox, ResourceError> {
        let id = gpu
            .create_cubemap(label, &staged)
            .map_err(|e| ResourceError::upload(label, e))?;
        Ok(GpuSkybox {
            id,
            size: staged[0].width,
        })
    }

    fn release(uploaded: &GpuSkybox, gpu: &dyn GpuContext) {
        gpu.release_texture(uploaded.id);
    }
}

pub type SkyboxResource = Resource<SkyboxKind>;
