//! Graphics-context seam.
//!
//! Resources upload through [`GpuContext`] during finalize, on the owner
//! thread. [`HeadlessContext`] allocates ids without a device and records every
//! call, which is what tests and the CLI use.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;

/// Handle of a texture created by a [`GpuContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

/// Handle of a vertex buffer created by a [`GpuContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// Decoded RGBA8 image, row-major, top row first.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageData {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Single-colour image, mostly for tests and placeholder textures.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self::new(width, height, pixels)
    }

    pub fn from_rgba(image: image::RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    /// Check that the pixel buffer matches the dimensions.
    pub fn validate(&self, label: &str) -> Result<(), GpuError> {
        if self.width == 0 || self.height == 0 {
            return Err(GpuError::Empty(label.to_string()));
        }
        let expected = self.width as usize * self.height as usize * 4;
        if self.pixels.len() != expected {
            return Err(GpuError::SizeMismatch {
                label: label.to_string(),
                expected,
                actual: self.pixels.len(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for ImageData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageData")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Decoded RGBA32F image, row-major, top row first. Used for HDR maps and
/// lookup tables.
#[derive(Clone, PartialEq)]
pub struct FloatImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<f32>,
}

impl FloatImage {
    pub fn new(width: u32, height: u32, pixels: Vec<f32>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn from_rgba32f(image: image::Rgba32FImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }

    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    pub fn validate(&self, label: &str) -> Result<(), GpuError> {
        if self.width == 0 || self.height == 0 {
            return Err(GpuError::Empty(label.to_string()));
        }
        let expected = self.width as usize * self.height as usize * 4;
        if self.pixels.len() != expected {
            return Err(GpuError::SizeMismatch {
                label: label.to_string(),
                expected: expected * 4,
                actual: self.pixels.len() * 4,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for FloatImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FloatImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("texels", &(self.pixels.len() / 4))
            .finish()
    }
}

/// Errors raised by a graphics context while creating objects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GpuError {
    #[error("{0} has no data")]
    Empty(String),
    #[error("{label}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        label: String,
        expected: usize,
        actual: usize,
    },
    #[error("{label}: {size} exceeds the device limit of {limit}")]
    TooLarge { label: String, size: u32, limit: u32 },
    #[error("invalid cubemap: {0}")]
    InvalidCubemap(String),
    #[error("device rejected {label}: {reason}")]
    Rejected { label: String, reason: String },
}

/// Check six cubemap faces: square, all the same size, valid pixel buffers.
/// Returns the edge length.
pub fn validate_cubemap(faces: &[ImageData; 6]) -> Result<u32, GpuError> {
    let size = faces[0].width;
    for (index, face) in faces.iter().enumerate() {
        face.validate(&format!("cubemap face {index}"))?;
        if face.width != face.height {
            return Err(GpuError::InvalidCubemap(format!(
                "face {index} is {}x{}, faces must be square",
                face.width, face.height
            )));
        }
        if face.width != size {
            return Err(GpuError::InvalidCubemap(format!(
                "face {index} is {}x{}, face 0 is {size}x{size}",
                face.width, face.height
            )));
        }
    }
    Ok(size)
}

/// The graphics context resources upload into.
///
/// Owner thread only. Methods take `&self`; implementations keep their own
/// bookkeeping behind interior mutability.
pub trait GpuContext {
    /// Create a 2D RGBA8 texture.
    fn create_texture(&self, label: &str, image: &ImageData) -> Result<TextureId, GpuError>;

    /// Create a 2D RGBA32F texture.
    fn create_float_texture(&self, label: &str, image: &FloatImage) -> Result<TextureId, GpuError>;

    /// Create a cubemap from faces in +X, -X, +Y, -Y, +Z, -Z order
    /// (right, left, up, down, back, front).
    fn create_cubemap(&self, label: &str, faces: &[ImageData; 6]) -> Result<TextureId, GpuError>;

    /// Create a vertex buffer holding `vertex_count` vertices.
    fn create_vertex_buffer(
        &self,
        label: &str,
        contents: &[u8],
        vertex_count: u32,
    ) -> Result<BufferId, GpuError>;

    fn release_texture(&self, id: TextureId);

    fn release_buffer(&self, id: BufferId);

    /// Largest texture edge the device accepts.
    fn max_texture_size(&self) -> u32 {
        u32::MAX
    }
}

/// A call recorded by [`HeadlessContext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuCall {
    CreateTexture {
        label: String,
        width: u32,
        height: u32,
    },
    CreateFloatTexture {
        label: String,
        width: u32,
        height: u32,
    },
    CreateCubemap {
        label: String,
        size: u32,
    },
    CreateVertexBuffer {
        label: String,
        bytes: usize,
        vertex_count: u32,
    },
    ReleaseTexture(TextureId),
    ReleaseBuffer(BufferId),
}

impl GpuCall {
    pub fn is_create(&self) -> bool {
        matches!(
            self,
            Self::CreateTexture { .. }
                | Self::CreateFloatTexture { .. }
                | Self::CreateCubemap { .. }
                | Self::CreateVertexBuffer { .. }
        )
    }
}

/// Device-less [`GpuContext`]: validates input, allocates ids, records calls.
#[derive(Debug)]
pub struct HeadlessContext {
    next_id: Cell<u64>,
    max_texture_size: u32,
    fail_next: Cell<bool>,
    calls: RefCell<Vec<GpuCall>>,
    live_textures: RefCell<BTreeSet<TextureId>>,
    live_buffers: RefCell<BTreeSet<BufferId>>,
}

impl HeadlessContext {
    pub fn new() -> Self {
        Self::with_max_texture_size(8192)
    }

    pub fn with_max_texture_size(max_texture_size: u32) -> Self {
        Self {
            next_id: Cell::new(1),
            max_texture_size,
            fail_next: Cell::new(false),
            calls: RefCell::new(Vec::new()),
            live_textures: RefCell::new(BTreeSet::new()),
            live_buffers: RefCell::new(BTreeSet::new()),
        }
    }

    /// Make the next create call fail with [`GpuError::Rejected`].
    pub fn fail_next_upload(&self) {
        self.fail_next.set(true);
    }

    pub fn calls(&self) -> Vec<GpuCall> {
        self.calls.borrow().clone()
    }

    /// Number of successful create calls.
    pub fn upload_count(&self) -> usize {
        self.calls.borrow().iter().filter(|c| c.is_create()).count()
    }

    pub fn live_textures(&self) -> usize {
        self.live_textures.borrow().len()
    }

    pub fn live_buffers(&self) -> usize {
        self.live_buffers.borrow().len()
    }

    fn allocate(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn check_injected_failure(&self, label: &str) -> Result<(), GpuError> {
        if self.fail_next.replace(false) {
            return Err(GpuError::Rejected {
                label: label.to_string(),
                reason: "injected failure".into(),
            });
        }
        Ok(())
    }

    fn check_size(&self, label: &str, size: u32) -> Result<(), GpuError> {
        if size > self.max_texture_size {
            return Err(GpuError::TooLarge {
                label: label.to_string(),
                size,
                limit: self.max_texture_size,
            });
        }
        Ok(())
    }
}

impl Default for HeadlessContext {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuContext for HeadlessContext {
    fn create_texture(&self, label: &str, image: &ImageData) -> Result<TextureId, GpuError> {
        self.check_injected_failure(label)?;
        image.validate(label)?;
        self.check_size(label, image.width.max(image.height))?;

        let id = TextureId(self.allocate());
        self.live_textures.borrow_mut().insert(id);
        self.calls.borrow_mut().push(GpuCall::CreateTexture {
            label: label.to_string(),
            width: image.width,
            height: image.height,
        });
        Ok(id)
    }

    fn create_float_texture(&self, label: &str, image: &FloatImage) -> Result<TextureId, GpuError> {
        self.check_injected_failure(label)?;
        image.validate(label)?;
        self.check_size(label, image.width.max(image.height))?;

        let id = TextureId(self.allocate());
        self.live_textures.borrow_mut().insert(id);
        self.calls.borrow_mut().push(GpuCall::CreateFloatTexture {
            label: label.to_string(),
            width: image.width,
            height: image.height,
        });
        Ok(id)
    }

    fn create_cubemap(&self, label: &str, faces: &[ImageData; 6]) -> Result<TextureId, GpuError> {
        self.check_injected_failure(label)?;
        let size = validate_cubemap(faces)?;
        self.check_size(label, size)?;

        let id = TextureId(self.allocate());
        self.live_textures.borrow_mut().insert(id);
        self.calls.borrow_mut().push(GpuCall::CreateCubemap {
            label: label.to_string(),
            size,
        });
        Ok(id)
    }

    fn create_vertex_buffer(
        &self,
        label: &str,
        contents: &[u8],
        vertex_count: u32,
    ) -> Result<BufferId, GpuError> {
        self.check_injected_failure(label)?;
        if contents.is_empty() {
            return Err(GpuError::Empty(label.to_string()));
        }

        let id = BufferId(self.allocate());
        self.live_buffers.borrow_mut().insert(id);
        self.calls.borrow_mut().push(GpuCall::CreateVertexBuffer {
            label: label.to_string(),
            bytes: contents.len(),
            vertex_count,
        });
        Ok(id)
    }

    fn release_texture(&self, id: TextureId) {
        if self.live_textures.borrow_mut().remove(&id) {
            self.calls.borrow_mut().push(GpuCall::ReleaseTexture(id));
        }
    }

    fn release_buffer(&self, id: BufferId) {
        if self.live_buffers.borrow_mut().remove(&id) {
            self.calls.borrow_mut().push(GpuCall::ReleaseBuffer(id));
        }
    }

    fn max_texture_size(&self) -> u32 {
        self.max_texture_size
    }
}
