//! Image-based lighting inputs: an equirectangular HDR environment map and the
//! precomputed split-sum BRDF lookup table.
//!
//! The lookup table is a raw little-endian RGBA32F dump of a square image, the
//! way the offline precompute writes it. Its edge length follows from the file
//! size.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ResourceError, locate};
use crate::gpu::{FloatImage, GpuContext, TextureId};
use crate::resource::{Resource, ResourceKind};

/// Bytes per RGBA32F texel.
const TEXEL_BYTES: usize = 16;

/// Where an environment is loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentSource {
    /// HDR (or any decodable) equirectangular map.
    pub map: PathBuf,
    /// Raw RGBA32F BRDF lookup table.
    pub brdf: PathBuf,
}

/// Both images decoded on the worker.
#[derive(Debug)]
pub struct EnvironmentStaged {
    pub map: FloatImage,
    pub brdf: FloatImage,
}

/// Uploaded environment textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuEnvironment {
    pub map: TextureId,
    pub brdf: TextureId,
    pub width: u32,
    pub height: u32,
    pub brdf_size: u32,
}

/// Locate and decode an image to RGBA32F, keeping HDR range.
pub fn decode_float_image(path: &Path) -> Result<FloatImage, ResourceError> {
    let found = locate(path)?;
    let image = image::open(&found)
        .map_err(|e| ResourceError::decode(found.display().to_string(), e))?;
    Ok(FloatImage::from_rgba32f(image.into_rgba32f()))
}

/// Read a square RGBA32F lookup table stored as raw little-endian floats.
pub fn read_brdf_lut(path: &Path) -> Result<FloatImage, ResourceError> {
    let found = locate(path)?;
    let what = found.display().to_string();
    let bytes = std::fs::read(&found).map_err(|e| ResourceError::decode(what.clone(), e))?;

    if bytes.is_empty() || bytes.len() % TEXEL_BYTES != 0 {
        return Err(ResourceError::decode(
            what,
            format!("{} bytes is not a whole number of RGBA32F texels", bytes.len()),
        ));
    }
    let texels = bytes.len() / TEXEL_BYTES;
    let side = (texels as f64).sqrt().round() as usize;
    if side * side != texels {
        return Err(ResourceError::decode(
            what,
            format!("{texels} texels do not form a square table"),
        ));
    }

    let pixels = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok(FloatImage::new(side as u32, side as u32, pixels))
}

/// Environment map plus BRDF table, uploaded as two float textures.
#[derive(Debug)]
pub struct EnvironmentKind;

impl ResourceKind for EnvironmentKind {
    const KIND: &'static str = "environment";
    type Source = EnvironmentSource;
    type Staged = EnvironmentStaged;
    type Uploaded = GpuEnvironment;

    fn decode(source: EnvironmentSource) -> Result<EnvironmentStaged, ResourceError> {
        let map = decode_float_image(&source.map)?;
        if map.width != 2 * map.height {
            tracing::warn!(
                width = map.width,
                height = map.height,
                "environment map is not 2:1 equirectangular"
            );
        }
        let brdf = read_brdf_lut(&source.brdf)?;
        Ok(EnvironmentStaged { map, brdf })
    }

    fn upload(
        staged: EnvironmentStaged,
        gpu: &dyn GpuContext,
        label: &str,
    ) -> Result<GpuEnvironment, ResourceError> {
        let map = gpu
            .create_float_texture(label, &staged.map)
            .map_err(|e| ResourceError::upload(label, e))?;

        let brdf_label = format!("{label}_brdf");
        let brdf = match gpu.create_float_texture(&brdf_label, &staged.brdf) {
            Ok(id) => id,
            Err(e) => {
                gpu.release_texture(map);
                return Err(ResourceError::upload(brdf_label, e));
            }
        };

        Ok(GpuEnvironment {
            map,
            brdf,
            width: staged.map.width,
            height: staged.map.height,
            brdf_size: staged.brdf.width,
        })
    }

    fn release(uploaded: &GpuEnvironment, gpu: &dyn GpuContext) {
        gpu.release_texture(uploaded.map);
        gpu.release_texture(uploaded.brdf);
    }
}

pub type EnvironmentResource = Resource<EnvironmentKind>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuCall, HeadlessContext};
    use crate::kinds::skybox::{SkyboxPaths, SkyboxResource};
    use crate::state::ResourceState;
    use sensorview_common::{MessageLevel, MessageLog};
    use sensorview_scheduler::TaskScheduler;
    use std::rc::Rc;
    use std::time::{Duration, Instant};

    fn write_lut(path: &Path, side: usize) {
        let bytes: Vec<u8> = (0..side * side * 4)
            .flat_map(|i| (i as f32 * 0.25).to_le_bytes())
            .collect();
        std::fs::write(path, bytes).unwrap();
    }

    fn write_environment(dir: &Path) -> EnvironmentSource {
        let map = dir.join("studio.png");
        image::RgbImage::from_pixel(8, 4, image::Rgb([255, 0, 255]))
            .save(&map)
            .unwrap();
        let brdf = dir.join("brdf.bin");
        write_lut(&brdf, 2);
        EnvironmentSource { map, brdf }
    }

    fn write_faces(folder: &Path) -> SkyboxPaths {
        let paths = SkyboxPaths::from_folder(folder, "png");
        for path in paths.in_upload_order() {
            image::RgbImage::from_pixel(4, 4, image::Rgb([90, 140, 220]))
                .save(path)
                .unwrap();
        }
        paths
    }

    #[test]
    fn map_decodes_to_normalized_floats() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_environment(dir.path());
        let map = decode_float_image(&source.map).unwrap();
        assert_eq!((map.width, map.height), (8, 4));
        assert_eq!(&map.pixels[..4], &[1.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn lut_size_follows_file_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brdf.bin");
        write_lut(&path, 3);

        let lut = read_brdf_lut(&path).unwrap();
        assert_eq!((lut.width, lut.height), (3, 3));
        assert_eq!(lut.pixels.len(), 36);
        assert_eq!(lut.pixels[5], 1.25);
    }

    #[test]
    fn malformed_lut_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let ragged = dir.path().join("ragged.bin");
        std::fs::write(&ragged, [0u8; 20]).unwrap();
        let oblong = dir.path().join("oblong.bin");
        std::fs::write(&oblong, [0u8; 32]).unwrap();

        for path in [ragged, oblong] {
            assert!(matches!(
                read_brdf_lut(&path),
                Err(ResourceError::DecodeFailed { .. })
            ));
        }
    }

    #[test]
    fn environment_uploads_two_float_textures() {
        let dir = tempfile::tempdir().unwrap();
        let gpu = Rc::new(HeadlessContext::new());
        let environment =
            EnvironmentResource::new("studio", gpu.clone(), Rc::new(MessageLog::new()));

        environment.run(write_environment(dir.path()));
        environment.ready();
        assert_eq!(environment.state(), ResourceState::Uploaded);
        assert_eq!(
            gpu.calls(),
            vec![
                GpuCall::CreateFloatTexture {
                    label: "studio".into(),
                    width: 8,
                    height: 4
                },
                GpuCall::CreateFloatTexture {
                    label: "studio_brdf".into(),
                    width: 2,
                    height: 2
                },
            ]
        );
        assert_eq!(environment.with_uploaded(|e| e.brdf_size), Some(2));

        drop(environment);
        assert_eq!(gpu.live_textures(), 0);
    }

    #[test]
    fn missing_lut_fails_without_upload() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = write_environment(dir.path());
        source.brdf = dir.path().join("absent.bin");

        let gpu = Rc::new(HeadlessContext::new());
        let log = Rc::new(MessageLog::new());
        let environment = EnvironmentResource::new("studio", gpu.clone(), log.clone());
        environment.run(source);
        environment.ready();

        assert!(matches!(environment.error(), Some(ResourceError::NotFound { .. })));
        assert_eq!(gpu.upload_count(), 0);
        assert_eq!(log.count(MessageLevel::Error), 1);
    }

    #[test]
    fn skybox_finalize_chains_the_environment_load() {
        let dir = tempfile::tempdir().unwrap();
        let faces = write_faces(dir.path());
        let source = write_environment(dir.path());

        let scheduler = Rc::new(TaskScheduler::default());
        let gpu = Rc::new(HeadlessContext::new());
        let log = Rc::new(MessageLog::new());
        let skybox = SkyboxResource::new("sky", gpu.clone(), log.clone());
        let environment = EnvironmentResource::new("studio", gpu.clone(), log.clone());

        let (chained, follow_up) = (scheduler.clone(), environment.clone());
        skybox.load_then(&scheduler, faces, move |_| {
            follow_up.load(&chained, source);
        });
        assert_eq!(scheduler.stats().total_registered, 1);

        let deadline = Instant::now() + Duration::from_secs(5);
        while skybox.state() != ResourceState::Uploaded {
            assert!(Instant::now() < deadline, "skybox never uploaded");
            scheduler.tick();
            std::thread::sleep(Duration::from_millis(1));
        }
        // Registered from inside the skybox's finalize, during that same tick.
        assert_eq!(scheduler.stats().total_registered, 2);

        while !scheduler.finished() {
            assert!(Instant::now() < deadline, "environment never finished");
            scheduler.tick();
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(environment.state(), ResourceState::Uploaded);
        assert_eq!(gpu.live_textures(), 3);
        assert!(log.is_empty());
    }
}
