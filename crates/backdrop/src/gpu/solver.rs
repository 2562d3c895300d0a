//! GPU fluid solver for one render surface.
//!
//! Runs the same pass sequence as [`sim::CpuFluid`] with compute programs
//! over storage-buffer grids. Once the device is lost every call becomes a
//! no-op; the instance keeps ticking and the surface simply stops changing.

use std::sync::Arc;

use glam::Vec4;
use sim::backend::{FluidBackend, StepParams};
use sim::display::DisplayParams;
use sim::grid::{DoubleBuffer, GridSizes};
use sim::obstacle::ObstacleStamp;
use sim::splat::{velocity_value, Splat};

use super::bloom::GpuBloom;
use super::params::{ObstacleTarget, PassParams};
use super::programs::{ParamArena, PassEncoder, Program, Programs};
use super::readback;
use super::target::RenderTarget;
use super::{GpuContext, GpuError};

/// Every grid of one surface.
struct FluidGrids {
    sizes: GridSizes,
    velocity: DoubleBuffer<RenderTarget>,
    dye: DoubleBuffer<RenderTarget>,
    pressure: DoubleBuffer<RenderTarget>,
    divergence: RenderTarget,
    curl: RenderTarget,
    bloom: GpuBloom,
    /// Composited output at dye resolution
    frame: RenderTarget,
}

impl FluidGrids {
    fn new(device: &wgpu::Device, sizes: &GridSizes) -> Self {
        let double = |desc, label: &str| {
            DoubleBuffer::new(
                RenderTarget::new(device, desc, label),
                RenderTarget::new(device, desc, label),
            )
        };
        Self {
            velocity: double(sizes.velocity_desc(), "Velocity"),
            dye: double(sizes.dye_desc(), "Dye"),
            pressure: double(sizes.scalar_desc(), "Pressure"),
            divergence: RenderTarget::new(device, sizes.scalar_desc(), "Divergence"),
            curl: RenderTarget::new(device, sizes.scalar_desc(), "Curl"),
            bloom: GpuBloom::new(device, sizes),
            frame: RenderTarget::new(device, sizes.dye_desc(), "Frame"),
            sizes: sizes.clone(),
        }
    }

    fn splat(&mut self, enc: &mut PassEncoder<'_>, splat: &Splat, aspect: f32) {
        let params = PassParams::splat(splat.point, velocity_value(splat), splat.radius, aspect);
        enc.dispatch(Program::Splat, params, self.velocity.read(), None, self.velocity.write());
        self.velocity.swap();

        let params = PassParams::splat(splat.point, splat.color, splat.radius, aspect);
        enc.dispatch(Program::Splat, params, self.dye.read(), None, self.dye.write());
        self.dye.swap();
    }

    fn step(&mut self, enc: &mut PassEncoder<'_>, params: &StepParams) {
        let dt = params.dt;

        enc.dispatch(Program::Curl, PassParams::default(), self.velocity.read(), None, &self.curl);

        enc.dispatch(
            Program::Vorticity,
            PassParams::scalar(params.curl, dt),
            self.velocity.read(),
            Some(&self.curl),
            self.velocity.write(),
        );
        self.velocity.swap();

        enc.dispatch(
            Program::Divergence,
            PassParams::default(),
            self.velocity.read(),
            None,
            &self.divergence,
        );

        enc.dispatch(
            Program::Scale,
            PassParams::scalar(params.pressure_damping, dt),
            self.pressure.read(),
            None,
            self.pressure.write(),
        );
        self.pressure.swap();

        for _ in 0..params.pressure_iterations {
            enc.dispatch(
                Program::Pressure,
                PassParams::default(),
                self.pressure.read(),
                Some(&self.divergence),
                self.pressure.write(),
            );
            self.pressure.swap();
        }

        enc.dispatch(
            Program::GradientSubtract,
            PassParams::default(),
            self.velocity.read(),
            Some(self.pressure.read()),
            self.velocity.write(),
        );
        self.velocity.swap();

        enc.dispatch(
            Program::Advect,
            PassParams::advect(dt, params.velocity_dissipation),
            self.velocity.read(),
            Some(self.velocity.read()),
            self.velocity.write(),
        );
        self.velocity.swap();

        enc.dispatch(
            Program::Advect,
            PassParams::advect(dt, params.density_dissipation),
            self.velocity.read(),
            Some(self.dye.read()),
            self.dye.write(),
        );
        self.dye.swap();
    }

    fn apply_obstacle(&mut self, enc: &mut PassEncoder<'_>, stamp: &ObstacleStamp, dt: f32) {
        let params = PassParams::obstacle(stamp, dt, ObstacleTarget::Velocity);
        enc.dispatch(Program::Obstacle, params, self.velocity.read(), None, self.velocity.write());
        self.velocity.swap();

        let params = PassParams::obstacle(stamp, dt, ObstacleTarget::Dye);
        enc.dispatch(Program::Obstacle, params, self.dye.read(), None, self.dye.write());
        self.dye.swap();
    }

    fn render(&mut self, enc: &mut PassEncoder<'_>, display: &DisplayParams) {
        let bloomed = match display.bloom {
            Some(settings) => {
                self.bloom
                    .apply(enc, self.dye.read(), &settings.curve, settings.intensity)
            }
            None => false,
        };
        let display = if bloomed {
            *display
        } else {
            DisplayParams {
                bloom: None,
                ..*display
            }
        };

        enc.dispatch(
            Program::Composite,
            PassParams::composite(&display),
            self.dye.read(),
            Some(self.bloom.output()),
            &self.frame,
        );
    }
}

// ============================================================================
// GPU FLUID
// ============================================================================

pub struct GpuFluid {
    ctx: Arc<GpuContext>,
    programs: Arc<Programs>,
    arena: ParamArena,
    grids: FluidGrids,
    steps: u64,
}

impl GpuFluid {
    pub fn new(
        ctx: Arc<GpuContext>,
        programs: Arc<Programs>,
        sizes: &GridSizes,
    ) -> Result<Self, GpuError> {
        if ctx.is_device_lost() {
            return Err(GpuError::DeviceLost);
        }
        let arena = ParamArena::new(&ctx);
        let grids = FluidGrids::new(&ctx.device, sizes);
        Ok(Self {
            ctx,
            programs,
            arena,
            grids,
            steps: 0,
        })
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    pub fn sizes(&self) -> &GridSizes {
        &self.grids.sizes
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Composited frame from the last [`FluidBackend::render`].
    pub fn frame(&self) -> &RenderTarget {
        &self.grids.frame
    }

    pub fn read_velocity(&self) -> Result<Vec<Vec4>, GpuError> {
        readback::read_target(&self.ctx, self.grids.velocity.read())
    }

    pub fn read_dye(&self) -> Result<Vec<Vec4>, GpuError> {
        readback::read_target(&self.ctx, self.grids.dye.read())
    }

    pub fn read_frame(&self) -> Result<Vec<Vec4>, GpuError> {
        readback::read_target(&self.ctx, &self.grids.frame)
    }

    pub fn read_bloom(&self) -> Result<Vec<Vec4>, GpuError> {
        readback::read_target(&self.ctx, self.grids.bloom.output())
    }

    /// Replace the current velocity state, for seeding tests and diagnostics.
    pub fn write_velocity(&mut self, texels: &[Vec4]) {
        readback::write_target(&self.ctx, self.grids.velocity.read(), texels);
    }

    pub fn write_dye(&mut self, texels: &[Vec4]) {
        readback::write_target(&self.ctx, self.grids.dye.read(), texels);
    }

    /// Record passes into one submission. Skipped once the device is lost.
    fn encode(&mut self, record: impl FnOnce(&mut FluidGrids, &mut PassEncoder<'_>)) {
        if self.ctx.is_device_lost() {
            return;
        }
        let mut enc = PassEncoder::new(&self.ctx, &self.programs, &mut self.arena);
        record(&mut self.grids, &mut enc);
        enc.submit();
    }
}

impl FluidBackend for GpuFluid {
    fn resize(&mut self, sizes: &GridSizes) {
        self.grids = FluidGrids::new(&self.ctx.device, sizes);
    }

    fn splat(&mut self, splat: &Splat, aspect: f32) {
        self.encode(|grids, enc| grids.splat(enc, splat, aspect));
    }

    fn step(&mut self, params: &StepParams) {
        self.encode(|grids, enc| grids.step(enc, params));
        self.steps += 1;
    }

    fn apply_obstacle(&mut self, stamp: &ObstacleStamp, dt: f32) {
        self.encode(|grids, enc| grids.apply_obstacle(enc, stamp, dt));
    }

    fn render(&mut self, display: &DisplayParams) {
        self.encode(|grids, enc| grids.render(enc, display));
    }
}
