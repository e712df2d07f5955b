//! JSON scene manifests and the resources they keep alive.
//!
//! ```json
//! {
//!   "poll_interval_ms": 50,
//!   "max_running": null,
//!   "skybox": { "folder": "resources/sky", "extension": "png" },
//!   "environment": { "map": "studio.hdr", "brdf": "brdf.bin" },
//!   "textures": [{ "name": "ground", "path": "resources/ground.png" }],
//!   "models": [{ "name": "car", "obj": "car.obj", "albedo": "car.png" }],
//!   "fonts": [{ "name": "sans", "atlas": "sans.png", "info": "sans.fnt" }]
//! }
//! ```
//!
//! Relative paths are taken relative to the manifest file. With a skybox, the
//! environment is registered from the skybox's finalize.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use sensorview_common::MessageSink;
use sensorview_resource::{
    EnvironmentResource, EnvironmentSource, FontResource, FontSource, GpuContext, Loadable,
    ModelResource, ModelSource, ResourceState, SkyboxPaths, SkyboxResource, TextureResource,
};
use sensorview_scheduler::{SchedulerConfig, TaskScheduler};

use crate::driver::LoopConfig;

/// Errors from reading a scene manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("cannot read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid manifest: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate resource name '{0}'")]
    DuplicateName(String),
    #[error("poll_interval_ms must be positive")]
    ZeroPollInterval,
}

/// Skybox given either face by face or as a folder of `rt/lf/up/dn/bk/ft` files.
///
/// Both forms reject unknown keys, so mixing `folder` with face keys is an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SkyboxEntry {
    Folder(SkyboxFolder),
    Faces(SkyboxPaths),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkyboxFolder {
    pub folder: PathBuf,
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_extension() -> String {
    "png".into()
}

impl SkyboxEntry {
    pub fn paths(&self) -> SkyboxPaths {
        match self {
            Self::Folder(entry) => SkyboxPaths::from_folder(&entry.folder, &entry.extension),
            Self::Faces(paths) => paths.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureEntry {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub obj: PathBuf,
    #[serde(default)]
    pub albedo: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontEntry {
    pub name: String,
    pub atlas: PathBuf,
    pub info: PathBuf,
}

/// What a scene loads, plus loop and scheduler settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SceneManifest {
    pub poll_interval_ms: Option<u64>,
    pub max_running: Option<usize>,
    pub skybox: Option<SkyboxEntry>,
    pub environment: Option<EnvironmentSource>,
    pub textures: Vec<TextureEntry>,
    pub models: Vec<ModelEntry>,
    pub fonts: Vec<FontEntry>,
}

impl SceneManifest {
    pub fn from_json(text: &str) -> Result<Self, ManifestError> {
        let manifest: Self = serde_json::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Read a manifest file and anchor its relative paths at the file's folder.
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest = Self::from_json(&text)?;
        let base = path.parent().unwrap_or(Path::new(""));
        Ok(manifest.relative_to(base))
    }

    pub fn to_json_pretty(&self) -> Result<String, ManifestError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), ManifestError> {
        if self.poll_interval_ms == Some(0) {
            return Err(ManifestError::ZeroPollInterval);
        }
        let mut seen = BTreeSet::new();
        let names = self
            .textures
            .iter()
            .map(|t| &t.name)
            .chain(self.models.iter().map(|m| &m.name))
            .chain(self.fonts.iter().map(|f| &f.name));
        for name in names {
            if !seen.insert(name) {
                return Err(ManifestError::DuplicateName(name.clone()));
            }
        }
        Ok(())
    }

    /// Join every relative path onto `base`.
    pub fn relative_to(mut self, base: &Path) -> Self {
        let anchor = |path: &mut PathBuf| {
            if path.is_relative() && !base.as_os_str().is_empty() {
                *path = base.join(&*path);
            }
        };
        match &mut self.skybox {
            Some(SkyboxEntry::Folder(entry)) => anchor(&mut entry.folder),
            Some(SkyboxEntry::Faces(faces)) => {
                for path in [
                    &mut faces.right,
                    &mut faces.left,
                    &mut faces.up,
                    &mut faces.down,
                    &mut faces.back,
                    &mut faces.front,
                ] {
                    anchor(path);
                }
            }
            None => {}
        }
        if let Some(environment) = &mut self.environment {
            anchor(&mut environment.map);
            anchor(&mut environment.brdf);
        }
        for texture in &mut self.textures {
            anchor(&mut texture.path);
        }
        for model in &mut self.models {
            anchor(&mut model.obj);
            if let Some(albedo) = &mut model.albedo {
                anchor(albedo);
            }
        }
        for font in &mut self.fonts {
            anchor(&mut font.atlas);
            anchor(&mut font.info);
        }
        self
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        match self.max_running {
            Some(limit) => SchedulerConfig::bounded(limit),
            None => SchedulerConfig::unbounded(),
        }
    }

    pub fn loop_config(&self) -> LoopConfig {
        let mut config = LoopConfig::default();
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        config
    }

    /// Number of resources the manifest names.
    pub fn resource_count(&self) -> usize {
        usize::from(self.skybox.is_some())
            + usize::from(self.environment.is_some())
            + self.textures.len()
            + self.models.len()
            + self.fonts.len()
    }
}

/// One line of a scene load report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceReport {
    pub kind: &'static str,
    pub name: String,
    pub state: ResourceState,
    pub error: Option<String>,
}

/// Resources registered from a manifest. Dropping the scene releases their GPU
/// objects.
#[derive(Debug, Default)]
pub struct Scene {
    skybox: Option<Rc<SkyboxResource>>,
    environment: Option<Rc<EnvironmentResource>>,
    textures: Vec<Rc<TextureResource>>,
    models: Vec<Rc<ModelResource>>,
    fonts: Vec<Rc<FontResource>>,
}

impl Scene {
    /// Register every resource of `manifest` with `scheduler`.
    ///
    /// The environment waits for the skybox's finalize when both are present.
    pub fn load(
        manifest: &SceneManifest,
        scheduler: &Rc<TaskScheduler>,
        gpu: Rc<dyn GpuContext>,
        sink: Rc<dyn MessageSink>,
    ) -> Self {
        let _span = tracing::info_span!("scene_load", resources = manifest.resource_count()).entered();
        let mut scene = Scene::default();

        let environment = manifest.environment.clone().map(|source| {
            let resource = EnvironmentResource::new("environment", gpu.clone(), sink.clone());
            scene.environment = Some(resource.clone());
            (resource, source)
        });

        match (&manifest.skybox, environment) {
            (Some(entry), chained) => {
                let skybox = SkyboxResource::new("skybox", gpu.clone(), sink.clone());
                match chained {
                    Some((environment, source)) => {
                        let follow_up = Rc::clone(scheduler);
                        skybox.load_then(scheduler, entry.paths(), move |_| {
                            environment.load(&follow_up, source);
                        });
                    }
                    None => {
                        skybox.load(scheduler, entry.paths());
                    }
                }
                scene.skybox = Some(skybox);
            }
            (None, Some((environment, source))) => {
                environment.load(scheduler, source);
            }
            (None, None) => {}
        }
        for entry in &manifest.textures {
            let texture = TextureResource::new(entry.name.clone(), gpu.clone(), sink.clone());
            texture.load(scheduler, entry.path.clone());
            scene.textures.push(texture);
        }
        for entry in &manifest.models {
            let model = ModelResource::new(entry.name.clone(), gpu.clone(), sink.clone());
            let source = ModelSource {
                obj: entry.obj.clone(),
                albedo: entry.albedo.clone(),
            };
            model.load(scheduler, source);
            scene.models.push(model);
        }
        for entry in &manifest.fonts {
            let font = FontResource::new(entry.name.clone(), gpu.clone(), sink.clone());
            let source = FontSource {
                atlas: entry.atlas.clone(),
                info: entry.info.clone(),
            };
            font.load(scheduler, source);
            scene.fonts.push(font);
        }

        tracing::info!(pending = scheduler.pending(), "scene registered");
        scene
    }

    pub fn skybox(&self) -> Option<&Rc<SkyboxResource>> {
        self.skybox.as_ref()
    }

    pub fn environment(&self) -> Option<&Rc<EnvironmentResource>> {
        self.environment.as_ref()
    }

    pub fn textures(&self) -> &[Rc<TextureResource>] {
        &self.textures
    }

    pub fn models(&self) -> &[Rc<ModelResource>] {
        &self.models
    }

    pub fn fonts(&self) -> &[Rc<FontResource>] {
        &self.fonts
    }

    pub fn texture(&self, name: &str) -> Option<&Rc<TextureResource>> {
        self.textures.iter().find(|t| t.label() == name)
    }

    pub fn model(&self, name: &str) -> Option<&Rc<ModelResource>> {
        self.models.iter().find(|m| m.label() == name)
    }

    pub fn font(&self, name: &str) -> Option<&Rc<FontResource>> {
        self.fonts.iter().find(|f| f.label() == name)
    }

    /// Every resource in registration order.
    pub fn resources(&self) -> Vec<Rc<dyn Loadable>> {
        let mut all: Vec<Rc<dyn Loadable>> = Vec::new();
        if let Some(skybox) = &self.skybox {
            all.push(skybox.clone());
        }
        if let Some(environment) = &self.environment {
            all.push(environment.clone());
        }
        all.extend(self.textures.iter().map(|r| r.clone() as Rc<dyn Loadable>));
        all.extend(self.models.iter().map(|r| r.clone() as Rc<dyn Loadable>));
        all.extend(self.fonts.iter().map(|r| r.clone() as Rc<dyn Loadable>));
        all
    }

    pub fn report(&self) -> Vec<ResourceReport> {
        self.resources()
            .iter()
            .map(|resource| ResourceReport {
                kind: resource.kind(),
                name: resource.label().to_string(),
                state: resource.state(),
                error: resource.error().map(|e| e.to_string()),
            })
            .collect()
    }

    /// Resources that ended up `Failed`.
    pub fn failed(&self) -> usize {
        self.resources()
            .iter()
            .filter(|r| r.state() == ResourceState::Failed)
            .count()
    }

    /// True once every resource is `Uploaded` or `Failed`.
    pub fn is_settled(&self) -> bool {
        self.resources().iter().all(|r| r.state().is_terminal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorview_common::{MessageLevel, MessageLog};
    use sensorview_resource::HeadlessContext;
    use std::time::Instant;

    const TRIANGLE: &str = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";

    fn drain(scheduler: &TaskScheduler) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !scheduler.finished() {
            assert!(Instant::now() < deadline, "scene never finished loading");
            scheduler.tick();
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn empty_manifest_is_valid() {
        let manifest = SceneManifest::from_json("{}").unwrap();
        assert_eq!(manifest, SceneManifest::default());
        assert_eq!(manifest.resource_count(), 0);
        assert_eq!(manifest.loop_config(), LoopConfig::default());
        assert_eq!(manifest.scheduler_config(), SchedulerConfig::unbounded());
    }

    #[test]
    fn settings_map_onto_configs() {
        let manifest =
            SceneManifest::from_json(r#"{"poll_interval_ms": 20, "max_running": 2}"#).unwrap();
        assert_eq!(manifest.loop_config().poll_interval, Duration::from_millis(20));
        assert_eq!(manifest.scheduler_config().max_running, Some(2));
    }

    #[test]
    fn invalid_manifests_are_rejected() {
        assert!(matches!(
            SceneManifest::from_json(r#"{"textures": 3}"#),
            Err(ManifestError::Parse(_))
        ));
        assert!(matches!(
            SceneManifest::from_json(r#"{"colour": "red"}"#),
            Err(ManifestError::Parse(_))
        ));
        assert!(matches!(
            SceneManifest::from_json(r#"{"poll_interval_ms": 0}"#),
            Err(ManifestError::ZeroPollInterval)
        ));
        let duplicate = r#"{
            "textures": [{"name": "car", "path": "car.png"}],
            "models": [{"name": "car", "obj": "car.obj"}]
        }"#;
        assert!(matches!(
            SceneManifest::from_json(duplicate),
            Err(ManifestError::DuplicateName(name)) if name == "car"
        ));
    }

    #[test]
    fn skybox_accepts_folder_or_faces() {
        let folder = SceneManifest::from_json(r#"{"skybox": {"folder": "sky"}}"#).unwrap();
        let paths = folder.skybox.unwrap().paths();
        assert_eq!(paths.up, PathBuf::from("sky/up.png"));

        let faces = r#"{"skybox": {"right": "r.jpg", "left": "l.jpg", "up": "u.jpg",
                                   "down": "d.jpg", "back": "b.jpg", "front": "f.jpg"}}"#;
        let manifest = SceneManifest::from_json(faces).unwrap();
        assert_eq!(manifest.skybox.unwrap().paths().back, PathBuf::from("b.jpg"));
    }

    #[test]
    fn skybox_cannot_mix_folder_and_faces() {
        let mixed = r#"{"skybox": {"folder": "sky", "right": "r.jpg", "left": "l.jpg",
                                   "up": "u.jpg", "down": "d.jpg", "back": "b.jpg",
                                   "front": "f.jpg"}}"#;
        assert!(matches!(
            SceneManifest::from_json(mixed),
            Err(ManifestError::Parse(_))
        ));
        assert!(matches!(
            SceneManifest::from_json(r#"{"skybox": {"folder": "sky", "extention": "jpg"}}"#),
            Err(ManifestError::Parse(_))
        ));
    }

    #[test]
    fn environment_loads_after_the_skybox() {
        let dir = tempfile::tempdir().unwrap();
        for face in ["rt", "lf", "up", "dn", "bk", "ft"] {
            image::RgbImage::from_pixel(4, 4, image::Rgb([40, 60, 200]))
                .save(dir.path().join(format!("{face}.png")))
                .unwrap();
        }
        image::RgbImage::from_pixel(8, 4, image::Rgb([255, 255, 255]))
            .save(dir.path().join("studio.png"))
            .unwrap();
        std::fs::write(dir.path().join("brdf.bin"), [0u8; 64]).unwrap();

        let json = r#"{
            "skybox": {"folder": "."},
            "environment": {"map": "studio.png", "brdf": "brdf.bin"}
        }"#;
        let manifest = SceneManifest::from_json(json).unwrap().relative_to(dir.path());
        assert_eq!(manifest.resource_count(), 2);

        let scheduler = Rc::new(TaskScheduler::default());
        let gpu = Rc::new(HeadlessContext::new());
        let scene = Scene::load(&manifest, &scheduler, gpu.clone(), Rc::new(MessageLog::new()));
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scene.environment().unwrap().state(), ResourceState::Idle);

        drain(&scheduler);
        assert!(scene.is_settled());
        assert_eq!(scheduler.stats().total_registered, 2);
        let report = scene.report();
        assert_eq!(report[0].kind, "skybox");
        assert_eq!(report[1].kind, "environment");
        assert_eq!(report[1].state, ResourceState::Uploaded);
        assert_eq!(gpu.live_textures(), 3);
    }

    #[test]
    fn file_paths_are_anchored_at_the_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.json");
        std::fs::write(
            &path,
            r#"{"models": [{"name": "car", "obj": "models/car.obj", "albedo": "/abs/car.png"}]}"#,
        )
        .unwrap();

        let manifest = SceneManifest::from_file(&path).unwrap();
        assert_eq!(manifest.models[0].obj, dir.path().join("models/car.obj"));
        assert_eq!(manifest.models[0].albedo, Some(PathBuf::from("/abs/car.png")));
    }

    #[test]
    fn missing_manifest_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SceneManifest::from_file(&dir.path().join("none.json")),
            Err(ManifestError::Io { .. })
        ));
    }

    #[test]
    fn scene_loads_and_reports_each_resource() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tri.obj"), TRIANGLE).unwrap();
        image::RgbImage::from_pixel(2, 2, image::Rgb([0, 128, 0]))
            .save(dir.path().join("grass.png"))
            .unwrap();
        let json = r#"{
            "textures": [{"name": "grass", "path": "grass.png"},
                         {"name": "asphalt", "path": "asphalt.png"}],
            "models": [{"name": "tri", "obj": "tri.obj"}]
        }"#;
        let manifest = SceneManifest::from_json(json).unwrap().relative_to(dir.path());

        let scheduler = Rc::new(TaskScheduler::new(manifest.scheduler_config()));
        let gpu = Rc::new(HeadlessContext::new());
        let log = Rc::new(MessageLog::new());
        let scene = Scene::load(&manifest, &scheduler, gpu.clone(), log.clone());
        assert_eq!(scheduler.pending(), 3);
        assert!(!scene.is_settled());

        drain(&scheduler);
        assert!(scene.is_settled());
        assert_eq!(scene.failed(), 1);
        assert_eq!(log.count(MessageLevel::Error), 1);

        let report = scene.report();
        assert_eq!(report.len(), 3);
        assert_eq!(report[0].name, "grass");
        assert_eq!(report[0].state, ResourceState::Uploaded);
        assert_eq!(report[1].state, ResourceState::Failed);
        assert!(report[1].error.as_deref().unwrap().contains("asphalt.png"));
        assert_eq!(report[2].kind, "model");
        assert!(scene.model("tri").unwrap().is_renderable());

        drop(scene);
        assert_eq!(gpu.live_textures(), 0);
        assert_eq!(gpu.live_buffers(), 0);
    }
}
