use std::path::PathBuf;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::error::{ResourceError, locate};
use crate::gpu::{BufferId, GpuContext, ImageData};
use crate::kinds::texture::{GpuTexture, decode_image, upload_image};
use crate::resource::{Resource, ResourceKind};

/// Interleaved vertex uploaded for every model: position, normal, uv.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// Where a model is loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSource {
    pub obj: PathBuf,
    pub albedo: Option<PathBuf>,
}

impl ModelSource {
    pub fn new(obj: impl Into<PathBuf>) -> Self {
        Self {
            obj: obj.into(),
            albedo: None,
        }
    }

    pub fn with_albedo(mut self, albedo: impl Into<PathBuf>) -> Self {
        self.albedo = Some(albedo.into());
        self
    }
}

/// Decoded model: a flat triangle list plus optional albedo image.
#[derive(Debug, Clone)]
pub struct ModelData {
    pub vertices: Vec<ModelVertex>,
    pub albedo: Option<ImageData>,
    pub bounds_min: Vec3,
    pub bounds_max: Vec3,
}

/// An uploaded model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpuModel {
    pub buffer: BufferId,
    pub vertex_count: u32,
    pub albedo: Option<GpuTexture>,
    pub bounds_min: Vec3,
    pub bounds_max: Vec3,
}

/// Read an OBJ file and flatten all of its meshes into one triangle list.
fn decode_obj(path: &std::path::Path) -> Result<Vec<ModelVertex>, ResourceError> {
    let found = locate(path)?;
    let what = found.display().to_string();
    let (models, _materials) =
        tobj::load_obj(&found, &tobj::GPU_LOAD_OPTIONS).map_err(|e| ResourceError::decode(&what, e))?;

    let mut vertices = Vec::new();
    for model in &models {
        let mesh = &model.mesh;
        let vertex = |index: u32| -> Result<ModelVertex, ResourceError> {
            let i = index as usize;
            let position = mesh
                .positions
                .get(3 * i..3 * i + 3)
                .ok_or_else(|| ResourceError::decode(&what, format!("index {index} out of range")))?;
            let normal = mesh
                .normals
                .get(3 * i..3 * i + 3)
                .map_or([0.0; 3], |n| [n[0], n[1], n[2]]);
            let uv = mesh
                .texcoords
                .get(2 * i..2 * i + 2)
                .map_or([0.0; 2], |t| [t[0], t[1]]);
            Ok(ModelVertex {
                position: [position[0], position[1], position[2]],
                normal,
                uv,
            })
        };

        for triangle in mesh.indices.chunks_exact(3) {
            let mut corners = [
                vertex(triangle[0])?,
                vertex(triangle[1])?,
                vertex(triangle[2])?,
            ];
            if mesh.normals.is_empty() {
                let face = face_normal(&corners);
                for corner in &mut corners {
                    corner.normal = face;
                }
            }
            vertices.extend_from_slice(&corners);
        }
    }

    if vertices.is_empty() {
        return Err(ResourceError::decode(what, "no triangles"));
    }
    Ok(vertices)
}

fn face_normal(corners: &[ModelVertex; 3]) -> [f32; 3] {
    let [a, b, c] = corners.map(|v| Vec3::from(v.position));
    (b - a).cross(c - a).normalize_or_zero().to_array()
}

fn bounds(vertices: &[ModelVertex]) -> (Vec3, Vec3) {
    vertices.iter().fold(
        (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
        |(min, max), v| {
            let p = Vec3::from(v.position);
            (min.min(p), max.max(p))
        },
    )
}

/// Wavefront OBJ geometry with an optional albedo texture.
#[derive(Debug)]
pub struct ModelKind;

impl ResourceKind for ModelKind {
    const KIND: &'static str = "model";
    type Source = ModelSource;
    type Staged = ModelData;
    type Uploaded = GpuModel;

    fn decode(source: ModelSource) -> Result<ModelData, ResourceError> {
        let vertices = decode_obj(&source.obj)?;
        let albedo = source.albedo.as_deref().map(decode_image).transpose()?;
        let (bounds_min, bounds_max) = bounds(&vertices);
        Ok(ModelData {
            vertices,
            albedo,
            bounds_min,
            bounds_max,
        })
    }

    fn upload(staged: ModelData, gpu: &dyn GpuContext, label: &str) -> Result<GpuModel, ResourceError> {
        let vertex_count = u32::try_from(staged.vertices.len()).map_err(|_| {
            ResourceError::decode(label, format!("{} vertices", staged.vertices.len()))
        })?;
        let buffer = gpu
            .create_vertex_buffer(label, bytemuck::cast_slice(&staged.vertices), vertex_count)
            .map_err(|e| ResourceError::upload(label, e))?;

        let albedo = match &staged.albedo {
            Some(image) => match upload_image(image, gpu, &format!("{label}/albedo")) {
                Ok(texture) => Some(texture),
                Err(error) => {
                    gpu.release_buffer(buffer);
                    return Err(error);
                }
            },
            None => None,
        };

        Ok(GpuModel {
            buffer,
            vertex_count,
            albedo,
            bounds_min: staged.bounds_min,
            bounds_max: staged.bounds_max,
        })
    }

    fn release(uploaded: &GpuModel, gpu: &dyn GpuContext) {
        gpu.release_buffer(uploaded.buffer);
        if let Some(albedo) = uploaded.albedo {
            gpu.release_texture(albedo.id);
        }
    }
}

pub type ModelResource = Resource<ModelKind>;
