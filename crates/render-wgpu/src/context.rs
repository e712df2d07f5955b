use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use wgpu::util::DeviceExt;

use sensorview_resource::{
    BufferId, FloatImage, GpuContext, GpuError, ImageData, TextureId, validate_cubemap,
};

struct VertexBuffer {
    buffer: wgpu::Buffer,
    vertex_count: u32,
}

/// [`GpuContext`] over a wgpu device and queue.
///
/// Objects are kept in id-keyed maps so the painter can look them up from the
/// handles resources hand out.
pub struct WgpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    next_id: Cell<u64>,
    textures: RefCell<BTreeMap<TextureId, wgpu::Texture>>,
    buffers: RefCell<BTreeMap<BufferId, VertexBuffer>>,
}

impl WgpuContext {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            next_id: Cell::new(1),
            textures: RefCell::new(BTreeMap::new()),
            buffers: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// 2D view of a live texture.
    pub fn texture_view(&self, id: TextureId) -> Option<wgpu::TextureView> {
        self.textures
            .borrow()
            .get(&id)
            .map(|texture| texture.create_view(&wgpu::TextureViewDescriptor::default()))
    }

    /// Cube view of a live cubemap.
    pub fn cube_view(&self, id: TextureId) -> Option<wgpu::TextureView> {
        self.textures.borrow().get(&id).map(|texture| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("cube_view"),
                dimension: Some(wgpu::TextureViewDimension::Cube),
                ..Default::default()
            })
        })
    }

    /// Run `f` with a live vertex buffer and its vertex count.
    pub fn with_buffer<R>(&self, id: BufferId, f: impl FnOnce(&wgpu::Buffer, u32) -> R) -> Option<R> {
        self.buffers
            .borrow()
            .get(&id)
            .map(|entry| f(&entry.buffer, entry.vertex_count))
    }

    pub fn live_textures(&self) -> usize {
        self.textures.borrow().len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.borrow().len()
    }

    fn allocate(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn check_size(&self, label: &str, size: u32) -> Result<(), GpuError> {
        let limit = self.max_texture_size();
        if size > limit {
            return Err(GpuError::TooLarge {
                label: label.to_string(),
                size,
                limit,
            });
        }
        Ok(())
    }

    /// Run `create` inside a validation error scope.
    fn scoped<T>(&self, label: &str, create: impl FnOnce() -> T) -> Result<T, GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let object = create();
        match pollster::block_on(self.device.pop_error_scope()) {
            None => Ok(object),
            Some(error) => Err(GpuError::Rejected {
                label: label.to_string(),
                reason: error.to_string(),
            }),
        }
    }

    fn upload_texture(
        &self,
        label: &str,
        width: u32,
        height: u32,
        layers: u32,
        format: wgpu::TextureFormat,
        data: &[u8],
    ) -> Result<TextureId, GpuError> {
        let texture = self.scoped(label, || {
            self.device.create_texture_with_data(
                &self.queue,
                &wgpu::TextureDescriptor {
                    label: Some(label),
                    size: wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: layers,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                },
                wgpu::util::TextureDataOrder::LayerMajor,
                data,
            )
        })?;
        let id = TextureId(self.allocate());
        self.textures.borrow_mut().insert(id, texture);
        tracing::debug!(label, width, height, layers, ?format, ?id, "texture created");
        Ok(id)
    }
}

impl GpuContext for WgpuContext {
    fn create_texture(&self, label: &str, image: &ImageData) -> Result<TextureId, GpuError> {
        image.validate(label)?;
        self.check_size(label, image.width.max(image.height))?;
        self.upload_texture(
            label,
            image.width,
            image.height,
            1,
            wgpu::TextureFormat::Rgba8UnormSrgb,
            &image.pixels,
        )
    }

    fn create_float_texture(&self, label: &str, image: &FloatImage) -> Result<TextureId, GpuError> {
        image.validate(label)?;
        self.check_size(label, image.width.max(image.height))?;
        self.upload_texture(
            label,
            image.width,
            image.height,
            1,
            wgpu::TextureFormat::Rgba32Float,
            image.bytes(),
        )
    }

    fn create_cubemap(&self, label: &str, faces: &[ImageData; 6]) -> Result<TextureId, GpuError> {
        let size = validate_cubemap(faces)?;
        self.check_size(label, size)?;
        let data: Vec<u8> = faces.iter().flat_map(|face| face.pixels.iter().copied()).collect();
        self.upload_texture(label, size, size, 6, wgpu::TextureFormat::Rgba8UnormSrgb, &data)
    }

    fn create_vertex_buffer(
        &self,
        label: &str,
        contents: &[u8],
        vertex_count: u32,
    ) -> Result<BufferId, GpuError> {
        if contents.is_empty() || vertex_count == 0 {
            return Err(GpuError::Empty(label.to_string()));
        }
        let buffer = self.scoped(label, || {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents,
                    usage: wgpu::BufferUsages::VERTEX,
                })
        })?;
        let id = BufferId(self.allocate());
        self.buffers
            .borrow_mut()
            .insert(id, VertexBuffer { buffer, vertex_count });
        tracing::debug!(label, vertex_count, ?id, "vertex buffer created");
        Ok(id)
    }

    fn release_texture(&self, id: TextureId) {
        if let Some(texture) = self.textures.borrow_mut().remove(&id) {
            texture.destroy();
        }
    }

    fn release_buffer(&self, id: BufferId) {
        if let Some(entry) = self.buffers.borrow_mut().remove(&id) {
            entry.buffer.destroy();
        }
    }

    fn max_texture_size(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }
}

impl std::fmt::Debug for WgpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuContext")
            .field("textures", &self.live_textures())
            .field("buffers", &self.live_buffers())
            .finish()
    }
}
