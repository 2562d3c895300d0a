//! winit event loop driving one fluid instance per page surface.
//!
//! Every fluid-enabled surface of the page gets a window. Window events are
//! translated into [`InputEvent`]s for that surface's instance; the wheel
//! scrolls the whole page and is broadcast to every instance.

use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec2;
use sim::color::parse_hex;
use sim::{
    FluidInstance, Frame, InputEvent, InstanceSetup, PointerId, StaticPage, SurfaceRegistry,
    SurfaceSize, SurfaceSpec, SystemClock,
};
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{ElementState, MouseButton, MouseScrollDelta, TouchPhase, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use crate::gpu::{DisplayPipeline, GpuContext, GpuError, GpuFluid, Programs};

/// Pixels scrolled per wheel line.
const LINE_HEIGHT_PX: f32 = 40.0;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("event loop failed: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
}

#[derive(Debug, thiserror::Error)]
enum SurfaceError {
    #[error("window creation failed: {0}")]
    Window(#[from] winit::error::OsError),
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Open a window per fluid surface of `page` and run until all are closed.
pub fn run(page: StaticPage) -> Result<(), RunError> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);
    let mut runner = BackdropRunner::new(page);
    event_loop.run_app(&mut runner)?;
    Ok(())
}

/// GPU state shared by every surface.
struct Gpu {
    ctx: Arc<GpuContext>,
    programs: Arc<Programs>,
    /// One display pipeline per surface format in use
    displays: Vec<DisplayPipeline>,
}

impl Gpu {
    fn ensure_display(&mut self, format: wgpu::TextureFormat) -> Result<(), GpuError> {
        if self.display(format).is_none() {
            let display = DisplayPipeline::new(&self.ctx, format)?;
            self.displays.push(display);
        }
        Ok(())
    }

    fn display(&self, format: wgpu::TextureFormat) -> Option<&DisplayPipeline> {
        self.displays.iter().find(|d| d.format() == format)
    }
}

struct SurfaceWindow {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    /// Last cursor position in physical pixels
    cursor: Vec2,
    background: wgpu::Color,
    fluid: FluidInstance<GpuFluid, SystemClock>,
}

impl SurfaceWindow {
    fn create(
        event_loop: &ActiveEventLoop,
        gpu: &mut Gpu,
        page: &StaticPage,
        spec: &SurfaceSpec,
    ) -> Result<Self, SurfaceError> {
        let attributes = Window::default_attributes()
            .with_title(format!("backdrop - {}", spec.id))
            .with_inner_size(LogicalSize::new(
                spec.rect.width.max(1.0) as f64,
                spec.rect.height.max(1.0) as f64,
            ));
        let window = Arc::new(event_loop.create_window(attributes)?);

        let size = window.inner_size();
        let surface = gpu
            .ctx
            .instance
            .create_surface(window.clone())
            .map_err(GpuError::from)?;
        let config = gpu.ctx.surface_config(&surface, size.width, size.height)?;
        surface.configure(&gpu.ctx.device, &config);
        gpu.ensure_display(config.format)?;

        let setup = InstanceSetup::from_markup(
            &spec.id,
            &spec.settings,
            &spec.shapes,
            SurfaceSize::new(config.width, config.height),
        );
        let ctx = gpu.ctx.clone();
        let programs = gpu.programs.clone();
        let fluid = FluidInstance::new(setup, SystemClock::new(), page, |sizes| {
            GpuFluid::new(ctx, programs, sizes)
        })?;

        let background = parse_hex(&spec.background).unwrap_or_default();
        Ok(Self {
            window,
            surface,
            config,
            cursor: Vec2::ZERO,
            background: wgpu::Color {
                r: background.x as f64,
                g: background.y as f64,
                b: background.z as f64,
                a: 1.0,
            },
            fluid,
        })
    }

    fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(device, &self.config);
        }
        self.fluid.push_input(InputEvent::Resize { width, height });
    }

    fn present(&mut self, gpu: &Gpu) {
        let texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&gpu.ctx.device, &self.config);
                return;
            }
            Err(e) => {
                log::warn!("`{}`: no surface texture: {:?}", self.fluid.id(), e);
                return;
            }
        };
        let Some(display) = gpu.display(self.config.format) else {
            return;
        };

        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = gpu
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Display Encoder"),
            });
        display.draw(
            &gpu.ctx,
            &mut encoder,
            &view,
            self.fluid.backend().frame(),
            self.fluid.config().blend_mode,
            self.background,
        );
        gpu.ctx.queue.submit(std::iter::once(encoder.finish()));
        self.window.pre_present_notify();
        texture.present();
    }
}

struct BackdropRunner {
    page: StaticPage,
    gpu: Option<Gpu>,
    registry: SurfaceRegistry<SurfaceWindow>,
    window_ids: HashMap<WindowId, String>,
}

impl BackdropRunner {
    fn new(page: StaticPage) -> Self {
        Self {
            page,
            gpu: None,
            registry: SurfaceRegistry::new(),
            window_ids: HashMap::new(),
        }
    }

    fn init_gpu(&mut self) -> Result<(), GpuError> {
        let ctx = pollster::block_on(GpuContext::request(GpuContext::create_instance(), None))?;
        let ctx = Arc::new(ctx);
        let programs = Arc::new(Programs::new(&ctx)?);
        self.gpu = Some(Gpu {
            ctx,
            programs,
            displays: Vec::new(),
        });
        Ok(())
    }

    fn initialize_surfaces(&mut self, event_loop: &ActiveEventLoop) {
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };
        let page = &self.page;
        let window_ids = &mut self.window_ids;
        let created = self.registry.initialize_all(page, |spec| {
            let surface = SurfaceWindow::create(event_loop, gpu, page, spec)?;
            window_ids.insert(surface.window.id(), spec.id.clone());
            Ok::<_, SurfaceError>(surface)
        });
        log::info!("{} fluid surface(s) running", created);
    }

    fn broadcast_scroll(&mut self, dy: f32) {
        self.page.set_scroll(self.page.scroll + dy);
        let offset = self.page.scroll;
        for (_, surface) in self.registry.iter_mut() {
            surface.fluid.push_input(InputEvent::Scroll { offset });
        }
    }
}

impl ApplicationHandler for BackdropRunner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() {
            return;
        }
        if let Err(e) = self.init_gpu() {
            log::error!("GPU unavailable, fluid surfaces disabled: {}", e);
            event_loop.exit();
            return;
        }
        self.initialize_surfaces(event_loop);
        if self.registry.is_empty() {
            log::warn!("No fluid surface could be initialized");
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(id) = self.window_ids.get(&window_id).cloned() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                if let Some(mut surface) = self.registry.remove(&id) {
                    surface.fluid.teardown();
                }
                self.window_ids.remove(&window_id);
                if self.registry.is_empty() {
                    event_loop.exit();
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let dy = match delta {
                    MouseScrollDelta::LineDelta(_, y) => -y * LINE_HEIGHT_PX,
                    MouseScrollDelta::PixelDelta(pos) => -pos.y as f32,
                };
                self.broadcast_scroll(dy);
            }
            event => {
                let (Some(gpu), Some(surface)) = (self.gpu.as_ref(), self.registry.get_mut(&id)) else {
                    return;
                };
                match event {
                    WindowEvent::Resized(size) => {
                        surface.resize(&gpu.ctx.device, size.width, size.height);
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        surface.cursor = Vec2::new(position.x as f32, position.y as f32);
                        surface.fluid.push_input(InputEvent::PointerMove {
                            id: PointerId::Mouse,
                            position: surface.cursor,
                        });
                    }
                    WindowEvent::MouseInput {
                        state,
                        button: MouseButton::Left,
                        ..
                    } => {
                        let event = match state {
                            ElementState::Pressed => InputEvent::PointerDown {
                                id: PointerId::Mouse,
                                position: surface.cursor,
                            },
                            ElementState::Released => InputEvent::PointerUp { id: PointerId::Mouse },
                        };
                        surface.fluid.push_input(event);
                    }
                    WindowEvent::Touch(touch) => {
                        let id = PointerId::Touch(touch.id);
                        let position = Vec2::new(touch.location.x as f32, touch.location.y as f32);
                        let event = match touch.phase {
                            TouchPhase::Started => InputEvent::PointerDown { id, position },
                            TouchPhase::Moved => InputEvent::PointerMove { id, position },
                            TouchPhase::Ended | TouchPhase::Cancelled => InputEvent::PointerUp { id },
                        };
                        surface.fluid.push_input(event);
                    }
                    _ => {}
                }
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        let Some(gpu) = self.gpu.as_ref() else {
            return;
        };
        for (_, surface) in self.registry.iter_mut() {
            if let Frame::Run { .. } = surface.fluid.tick(&self.page) {
                surface.present(gpu);
            }
        }
    }
}
