use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use sensorview_bus::{Category, Connection, EventBus};
use sensorview_common::{ScreenSize, TracingSink};
use sensorview_render::{Presenter, RenderLoop, Scene, SceneManifest, WaitMode};
use sensorview_render_wgpu::{DrawCommand, DrawList, OrbitCamera, Painter, WgpuContext};
use sensorview_scheduler::TaskScheduler;

const ROTATE_STEP: f32 = 5.0 * std::f32::consts::PI / 180.0;
const ZOOM_STEP: f32 = 0.9;

#[derive(Parser)]
#[command(name = "sensorview-desktop", about = "Sensor view desktop application")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Scene manifest to load (JSON)
    manifest: Option<PathBuf>,

    /// Initial window width
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Initial window height
    #[arg(long, default_value = "720")]
    height: u32,
}

/// Window, surface and the objects that draw into it.
struct Gfx {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    context: Rc<WgpuContext>,
    painter: Painter,
}

impl Gfx {
    fn new(event_loop: &ActiveEventLoop, size: ScreenSize) -> Result<Self> {
        let attrs = Window::default_attributes()
            .with_title("Sensor View")
            .with_inner_size(PhysicalSize::new(size.width, size.height));
        let window = Arc::new(event_loop.create_window(attrs)?);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone())?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("no compatible graphics adapter")?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("sensorview_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))?;

        let inner = window.inner_size();
        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .context("surface reports no formats")?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: inner.width.max(1),
            height: inner.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let context = Rc::new(WgpuContext::new(device, queue));
        let painter = Painter::new(&context, format, ScreenSize::new(config.width, config.height));

        tracing::info!(
            backend = adapter.get_info().backend.to_str(),
            max_texture = context.device().limits().max_texture_dimension_2d,
            "GPU initialized"
        );

        Ok(Self {
            window,
            surface,
            config,
            context,
            painter,
        })
    }

    fn screen(&self) -> ScreenSize {
        ScreenSize::new(self.config.width, self.config.height)
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.config.width = size.width.max(1);
        self.config.height = size.height.max(1);
        self.surface.configure(self.context.device(), &self.config);
        self.painter.resize(&self.context, self.screen());
    }

    fn present(&mut self, camera: &OrbitCamera, commands: &[DrawCommand]) {
        let output = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(self.context.device(), &self.config);
                return;
            }
            Err(e) => {
                tracing::error!("surface error: {e}");
                return;
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.painter.paint(&self.context, &view, camera, commands);
        self.window.pre_present_notify();
        output.present();
    }
}

/// Swaps by painting this frame's draw list onto the surface.
struct SurfacePresenter<'a> {
    gfx: &'a mut Gfx,
    camera: &'a RefCell<OrbitCamera>,
    draws: &'a DrawList,
}

impl Presenter for SurfacePresenter<'_> {
    fn swap_buffers(&mut self) {
        let commands = self.draws.take();
        self.gfx.present(&self.camera.borrow(), &commands);
    }
}

struct Viewer {
    gfx: Gfx,
    camera: Rc<RefCell<OrbitCamera>>,
    draws: Rc<DrawList>,
    render_loop: RenderLoop,
    _scene: Scene,
    _connections: Vec<Connection>,
}

impl Viewer {
    fn new(event_loop: &ActiveEventLoop, manifest: &SceneManifest, size: ScreenSize) -> Result<Self> {
        let gfx = Gfx::new(event_loop, size)?;
        let screen = gfx.screen();

        let scheduler = Rc::new(TaskScheduler::new(manifest.scheduler_config()));
        let bus = Rc::new(EventBus::new());
        let scene = Scene::load(manifest, &scheduler, gfx.context.clone(), Rc::new(TracingSink));

        let mut camera = OrbitCamera::default();
        camera.set_viewport(screen);
        let camera = Rc::new(RefCell::new(camera));
        let draws = Rc::new(DrawList::new());
        let connections = Self::connect(&bus, &scene, &camera, &draws);

        let render_loop = RenderLoop::new(manifest.loop_config(), scheduler, bus, screen);

        Ok(Self {
            gfx,
            camera,
            draws,
            render_loop,
            _scene: scene,
            _connections: connections,
        })
    }

    /// Subscribe the camera and the draw categories this viewer renders.
    fn connect(
        bus: &EventBus,
        scene: &Scene,
        camera: &Rc<RefCell<OrbitCamera>>,
        draws: &Rc<DrawList>,
    ) -> Vec<Connection> {
        let mut connections = Vec::new();

        let viewport = Rc::clone(camera);
        connections.push(bus.connect_resize(move |size| viewport.borrow_mut().set_viewport(*size)));

        let moved = Rc::clone(camera);
        connections.push(bus.connect_camera(move || {
            let camera = moved.borrow();
            tracing::trace!(eye = ?camera.eye(), distance = camera.distance, "camera changed");
        }));

        let skybox = scene.skybox().cloned();
        let list = Rc::clone(draws);
        connections.push(bus.connect(Category::Skybox, move || {
            if let Some(command) = skybox.as_ref().and_then(|s| s.with_uploaded(DrawCommand::sky)) {
                list.push(command);
            }
        }));

        let list = Rc::clone(draws);
        connections.push(bus.connect(Category::Ground, move || list.push(DrawCommand::Grid)));

        let models = scene.models().to_vec();
        let list = Rc::clone(draws);
        connections.push(bus.connect(Category::Models, move || {
            for model in &models {
                if let Some(command) = model.with_uploaded(DrawCommand::model) {
                    list.push(command);
                }
            }
        }));

        connections
    }

    fn frame(&mut self) {
        let mut presenter = SurfacePresenter {
            gfx: &mut self.gfx,
            camera: &*self.camera,
            draws: &*self.draws,
        };
        let report = self.render_loop.frame(&mut presenter);
        if report.finalized > 0 {
            tracing::debug!(finalized = report.finalized, "resources finalized");
        }
    }

    fn handle_key(&mut self, key: KeyCode) {
        {
            let mut camera = self.camera.borrow_mut();
            match key {
                KeyCode::ArrowLeft => camera.rotate(-ROTATE_STEP, 0.0),
                KeyCode::ArrowRight => camera.rotate(ROTATE_STEP, 0.0),
                KeyCode::ArrowUp => camera.rotate(0.0, ROTATE_STEP),
                KeyCode::ArrowDown => camera.rotate(0.0, -ROTATE_STEP),
                KeyCode::Equal | KeyCode::NumpadAdd => camera.zoom(ZOOM_STEP),
                KeyCode::Minus | KeyCode::NumpadSubtract => camera.zoom(1.0 / ZOOM_STEP),
                KeyCode::KeyT => camera.top_view(),
                KeyCode::KeyI => camera.isometric_view(),
                _ => return,
            }
        }
        self.render_loop.camera_changed();
    }
}

struct App {
    manifest: SceneManifest,
    size: ScreenSize,
    viewer: Option<Viewer>,
    error: Option<anyhow::Error>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewer.is_some() {
            return;
        }
        match Viewer::new(event_loop, &self.manifest, self.size) {
            Ok(viewer) => self.viewer = Some(viewer),
            Err(e) => {
                self.error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let Some(viewer) = &mut self.viewer else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                viewer.render_loop.close();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                viewer.gfx.resize(size);
                viewer.render_loop.resized(viewer.gfx.screen());
            }
            WindowEvent::RedrawRequested => viewer.render_loop.request_redraw(),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => viewer.handle_key(key),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(viewer) = &mut self.viewer else {
            return;
        };
        if viewer.render_loop.is_closing() {
            return;
        }

        viewer.frame();
        let flow = match viewer.render_loop.wait_mode() {
            WaitMode::Blocking => ControlFlow::Wait,
            WaitMode::Timeout(timeout) => ControlFlow::WaitUntil(Instant::now() + timeout),
        };
        event_loop.set_control_flow(flow);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    tracing::info!("sensorview-desktop starting");

    let manifest = match &cli.manifest {
        Some(path) => SceneManifest::from_file(path)
            .with_context(|| format!("loading manifest {}", path.display()))?,
        None => SceneManifest::default(),
    };

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App {
        manifest,
        size: ScreenSize::new(cli.width, cli.height),
        viewer: None,
        error: None,
    };
    event_loop.run_app(&mut app)?;

    match app.error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
