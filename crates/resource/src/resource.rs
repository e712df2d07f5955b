use std::cell::{Cell, RefCell};
use std::rc::Rc;

use sensorview_common::MessageSink;
use sensorview_scheduler::{TaskId, TaskScheduler};

use crate::error::ResourceError;
use crate::gpu::GpuContext;
use crate::staging::{Collected, Staging};
use crate::state::ResourceState;

/// How one kind of resource is decoded and uploaded.
pub trait ResourceKind: 'static {
    /// Name used in labels and logs.
    const KIND: &'static str;

    /// Input of the background phase (paths, usually).
    type Source: Send + 'static;
    /// CPU-side decoded data.
    type Staged: Send + 'static;
    /// GPU-side handles kept after upload.
    type Uploaded: 'static;

    /// Background phase. Blocking I/O and CPU-bound work only.
    fn decode(source: Self::Source) -> Result<Self::Staged, ResourceError>;

    /// Owner-thread phase. Creates GPU objects from the staged data.
    fn upload(
        staged: Self::Staged,
        gpu: &dyn GpuContext,
        label: &str,
    ) -> Result<Self::Uploaded, ResourceError>;

    /// Free the GPU objects held by `uploaded`.
    fn release(uploaded: &Self::Uploaded, gpu: &dyn GpuContext);
}

/// Object-safe view of a resource, for scenes that hold mixed kinds.
pub trait Loadable {
    fn label(&self) -> &str;
    fn kind(&self) -> &'static str;
    fn state(&self) -> ResourceState;
    fn error(&self) -> Option<ResourceError>;
    fn is_ready(&self) -> bool;
    fn ready(&self);
}

/// One loadable resource of kind `K`.
///
/// The worker half ([`Staging`]) is shared through an `Arc`. Everything that
/// touches the graphics context stays on the owner thread behind `Rc`.
pub struct Resource<K: ResourceKind> {
    label: String,
    staging: Staging<K::Staged>,
    uploaded: RefCell<Option<K::Uploaded>>,
    reported: Cell<bool>,
    gpu: Rc<dyn GpuContext>,
    sink: Rc<dyn MessageSink>,
}

impl<K: ResourceKind> Resource<K> {
    pub fn new(label: impl Into<String>, gpu: Rc<dyn GpuContext>, sink: Rc<dyn MessageSink>) -> Rc<Self> {
        Rc::new(Self {
            label: label.into(),
            staging: Staging::new(),
            uploaded: RefCell::new(None),
            reported: Cell::new(false),
            gpu,
            sink,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> ResourceState {
        self.staging.state()
    }

    pub fn error(&self) -> Option<ResourceError> {
        self.staging.error()
    }

    /// Background phase, run on the calling thread.
    pub fn run(&self, source: K::Source) {
        self.staging.run(&self.label, move || K::decode(source));
    }

    /// Background phase packaged for a worker thread. Only the staging slot
    /// crosses the thread boundary.
    pub fn background(&self, source: K::Source) -> Box<dyn FnOnce() + Send + 'static> {
        let staging = self.staging.clone();
        let label = self.label.clone();
        Box::new(move || {
            let _span = tracing::debug_span!("decode", kind = K::KIND, label = %label).entered();
            staging.run(&label, move || K::decode(source));
        })
    }

    /// Non-blocking: false while the worker holds the lock or is still decoding.
    pub fn is_ready(&self) -> bool {
        self.staging.is_ready()
    }

    /// Finalize phase. Owner thread only.
    ///
    /// Uploads staged data and frees it, or reports the failure once. Calling it
    /// again after `Uploaded` or `Failed` does nothing.
    pub fn ready(&self) {
        match self.staging.collect() {
            Collected::Staged(staged) => match K::upload(staged, &*self.gpu, &self.label) {
                Ok(uploaded) => {
                    *self.uploaded.borrow_mut() = Some(uploaded);
                    self.staging.finish(Ok(()));
                    tracing::info!(kind = K::KIND, label = %self.label, "resource uploaded");
                }
                Err(error) => {
                    self.report(&error);
                    self.staging.finish(Err(error));
                }
            },
            Collected::Failed(error) => self.report(&error),
            Collected::NotReady | Collected::Uploaded => {}
        }
    }

    /// True once the GPU objects exist.
    pub fn is_renderable(&self) -> bool {
        self.uploaded.borrow().is_some()
    }

    /// Borrow the uploaded handles, if any.
    pub fn with_uploaded<R>(&self, f: impl FnOnce(&K::Uploaded) -> R) -> Option<R> {
        self.uploaded.borrow().as_ref().map(f)
    }

    /// Register this resource with `scheduler`: decode on a worker, upload on
    /// the owner thread once ready.
    pub fn load(self: &Rc<Self>, scheduler: &TaskScheduler, source: K::Source) -> TaskId {
        self.load_then(scheduler, source, |_| {})
    }

    /// [`load`](Self::load), then run `then` on the owner thread right after
    /// this resource's finalize, whatever its outcome. `then` may register
    /// follow-up loads on the same scheduler.
    pub fn load_then(
        self: &Rc<Self>,
        scheduler: &TaskScheduler,
        source: K::Source,
        then: impl FnOnce(&Self) + 'static,
    ) -> TaskId {
        let poll = Rc::clone(self);
        let finalize = Rc::clone(self);
        scheduler.add_named_process(
            format!("{}:{}", K::KIND, self.label),
            self.background(source),
            move || {
                finalize.ready();
                then(&finalize);
            },
            move || poll.is_ready(),
        )
    }

    fn report(&self, error: &ResourceError) {
        if self.reported.replace(true) {
            return;
        }
        self.sink
            .error(&format!("{} '{}': {error}", K::KIND, self.label));
    }
}

impl<K: ResourceKind> Loadable for Resource<K> {
    fn label(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> &'static str {
        K::KIND
    }

    fn state(&self) -> ResourceState {
        Resource::state(self)
    }

    fn error(&self) -> Option<ResourceError> {
        Resource::error(self)
    }

    fn is_ready(&self) -> bool {
        Resource::is_ready(self)
    }

    fn ready(&self) {
        Resource::ready(self)
    }
}

impl<K: ResourceKind> Drop for Resource<K> {
    fn drop(&mut self) {
        if let Some(uploaded) = self.uploaded.get_mut().take() {
            K::release(&uploaded, &*self.gpu);
        }
    }
}

impl<K: ResourceKind> std::fmt::Debug for Resource<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("kind", &K::KIND)
            .field("label", &self.label)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{HeadlessContext, ImageData, TextureId};
    use sensorview_common::{MessageLevel, MessageLog};
    use std::time::{Duration, Instant};

    /// Kind that "decodes" a byte into a 1x1 texture.
    struct Swatch;

    impl ResourceKind for Swatch {
        const KIND: &'static str = "swatch";
        type Source = Result<u8, String>;
        type Staged = ImageData;
        type Uploaded = TextureId;

        fn decode(source: Self::Source) -> Result<ImageData, ResourceError> {
            let shade = source.map_err(|reason| ResourceError::decode("swatch", reason))?;
            Ok(ImageData::solid(1, 1, [shade, shade, shade, 255]))
        }

        fn upload(staged: ImageData, gpu: &dyn GpuContext, label: &str) -> Result<TextureId, ResourceError> {
            gpu.create_texture(label, &staged)
                .map_err(|e| ResourceError::upload(label, e))
        }

        fn release(uploaded: &TextureId, gpu: &dyn GpuContext) {
            gpu.release_texture(*uploaded);
        }
    }

    fn fixture() -> (Rc<HeadlessContext>, Rc<MessageLog>) {
        (Rc::new(HeadlessContext::new()), Rc::new(MessageLog::new()))
    }

    fn drain(scheduler: &TaskScheduler) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !scheduler.finished() {
            assert!(Instant::now() < deadline, "load never finished");
            scheduler.tick();
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn decoded_resource_uploads_once() {
        let (gpu, log) = fixture();
        let swatch = Resource::<Swatch>::new("grey", gpu.clone(), log.clone());
        swatch.run(Ok(128));
        assert_eq!(swatch.state(), ResourceState::Decoded);
        assert!(swatch.is_ready());
        assert!(!swatch.is_renderable());

        swatch.ready();
        assert_eq!(swatch.state(), ResourceState::Uploaded);
        assert!(swatch.is_renderable());
        assert_eq!(gpu.upload_count(), 1);

        swatch.ready();
        swatch.ready();
        assert_eq!(gpu.upload_count(), 1);
        assert_eq!(swatch.state(), ResourceState::Uploaded);
        assert!(log.is_empty());
    }

    #[test]
    fn ready_before_decode_does_nothing() {
        let (gpu, log) = fixture();
        let swatch = Resource::<Swatch>::new("early", gpu.clone(), log.clone());
        swatch.ready();
        assert_eq!(swatch.state(), ResourceState::Idle);
        assert_eq!(gpu.upload_count(), 0);
    }

    #[test]
    fn failed_decode_reports_once_and_never_uploads() {
        let (gpu, log) = fixture();
        let swatch = Resource::<Swatch>::new("missing", gpu.clone(), log.clone());
        swatch.run(Err("file not found".into()));
        assert_eq!(swatch.state(), ResourceState::Failed);
        assert!(swatch.is_ready());

        swatch.ready();
        swatch.ready();
        assert_eq!(gpu.upload_count(), 0);
        assert_eq!(log.count(MessageLevel::Error), 1);
        assert!(log.entries()[0].text.contains("missing"));
    }

    #[test]
    fn upload_failure_makes_resource_failed() {
        let (gpu, log) = fixture();
        let swatch = Resource::<Swatch>::new("rejected", gpu.clone(), log.clone());
        swatch.run(Ok(1));
        gpu.fail_next_upload();
        swatch.ready();

        assert_eq!(swatch.state(), ResourceState::Failed);
        assert!(matches!(swatch.error(), Some(ResourceError::UploadFailed { .. })));
        assert!(!swatch.is_renderable());
        assert_eq!(log.count(MessageLevel::Error), 1);

        swatch.ready();
        assert_eq!(log.count(MessageLevel::Error), 1);
    }

    #[test]
    fn load_through_scheduler_finalizes_on_owner_thread() {
        let (gpu, log) = fixture();
        let scheduler = TaskScheduler::default();
        let swatch = Resource::<Swatch>::new("async", gpu.clone(), log.clone());
        swatch.load(&scheduler, Ok(200));
        assert!(!scheduler.finished());

        drain(&scheduler);
        assert_eq!(swatch.state(), ResourceState::Uploaded);
        assert_eq!(swatch.with_uploaded(|id| *id), Some(TextureId(1)));
    }

    #[test]
    fn missing_file_task_is_reaped_with_an_error() {
        let (gpu, log) = fixture();
        let scheduler = TaskScheduler::default();
        let swatch = Resource::<Swatch>::new("gone", gpu.clone(), log.clone());
        swatch.load(&scheduler, Err("no such file".into()));

        drain(&scheduler);
        assert_eq!(gpu.upload_count(), 0);
        assert_eq!(swatch.state(), ResourceState::Failed);
        assert_eq!(log.count(MessageLevel::Error), 1);
    }

    #[test]
    fn dropping_resource_releases_gpu_objects() {
        let (gpu, log) = fixture();
        let swatch = Resource::<Swatch>::new("temp", gpu.clone(), log.clone());
        swatch.run(Ok(9));
        swatch.ready();
        assert_eq!(gpu.live_textures(), 1);
        drop(swatch);
        assert_eq!(gpu.live_textures(), 0);
    }

    #[test]
    fn loadable_view_matches_resource() {
        let (gpu, log) = fixture();
        let swatch = Resource::<Swatch>::new("view", gpu, log);
        let loadable: Rc<dyn Loadable> = swatch.clone();
        assert_eq!(loadable.kind(), "swatch");
        assert_eq!(loadable.label(), "view");
        swatch.run(Ok(3));
        loadable.ready();
        assert_eq!(loadable.state(), ResourceState::Uploaded);
    }
}
