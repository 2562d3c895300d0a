pub mod bloom;
pub mod display;
pub mod params;
pub mod programs;
pub mod readback;
pub mod solver;
pub mod target;

pub use display::DisplayPipeline;
pub use programs::Programs;
pub use solver::GpuFluid;
pub use target::RenderTarget;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// GPU error type for context, pipeline and buffer operations
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("no compatible GPU adapter")]
    NoAdapter,
    #[error("device request failed: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("surface creation failed: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    #[error("surface not supported by adapter")]
    UnsupportedSurface,
    #[error("pipeline creation failed: {0}")]
    Pipeline(String),
    #[error("GPU device lost")]
    DeviceLost,
    #[error("buffer map failed: {0:?}")]
    BufferMapFailed(wgpu::BufferAsyncError),
    #[error("channel disconnected")]
    ChannelDisconnected,
}

/// Central GPU context shared by every surface of a page.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    device_lost: Arc<AtomicBool>,
}

impl GpuContext {
    /// wgpu instance on the primary backends.
    pub fn create_instance() -> wgpu::Instance {
        wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        })
    }

    /// Request an adapter (compatible with `surface` when given) and a device.
    pub async fn request(
        instance: wgpu::Instance,
        surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<Self, GpuError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        log::info!("Using GPU: {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Backdrop Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: Self::required_limits().using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        let device_lost = Arc::new(AtomicBool::new(false));
        let flag = device_lost.clone();
        device.on_uncaptured_error(Box::new(move |error| {
            log::error!("GPU uncaptured error: {:?}", error);
            if matches!(error, wgpu::Error::OutOfMemory { .. }) {
                flag.store(true, Ordering::SeqCst);
            }
        }));

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            device_lost,
        })
    }

    /// Context without any presentation surface, for tests and offline use.
    pub fn headless() -> Result<Self, GpuError> {
        pollster::block_on(Self::request(Self::create_instance(), None))
    }

    pub fn required_limits() -> wgpu::Limits {
        wgpu::Limits {
            max_storage_buffers_per_shader_stage: 4,
            ..wgpu::Limits::downlevel_defaults()
        }
    }

    pub fn is_device_lost(&self) -> bool {
        self.device_lost.load(Ordering::SeqCst)
    }

    /// Wait for a buffer map operation to complete.
    pub fn await_buffer_map(
        &self,
        rx: std::sync::mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>,
    ) -> Result<(), GpuError> {
        if self.is_device_lost() {
            return Err(GpuError::DeviceLost);
        }
        match rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                log::error!("Buffer map failed: {:?}", e);
                Err(GpuError::BufferMapFailed(e))
            }
            Err(_) => {
                log::error!("Buffer map channel disconnected - possible device lost");
                self.device_lost.store(true, Ordering::SeqCst);
                Err(GpuError::ChannelDisconnected)
            }
        }
    }

    /// Surface configuration for a window of the given size. Prefers a
    /// non-sRGB format so composited colors reach the screen unconverted.
    pub fn surface_config(
        &self,
        surface: &wgpu::Surface<'_>,
        width: u32,
        height: u32,
    ) -> Result<wgpu::SurfaceConfiguration, GpuError> {
        let caps = surface.get_capabilities(&self.adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or(GpuError::UnsupportedSurface)?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        Ok(wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        })
    }
}

/// Run `build` inside a validation error scope and report the first error.
pub(crate) fn validated<T>(device: &wgpu::Device, build: impl FnOnce() -> T) -> Result<T, GpuError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = build();
    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(GpuError::Pipeline(error.to_string())),
        None => Ok(value),
    }
}
