//! Backend abstraction shared by the CPU reference solver and the GPU solver.

use crate::config::SimConfig;
use crate::display::DisplayParams;
use crate::grid::GridSizes;
use crate::obstacle::ObstacleStamp;
use crate::splat::Splat;

/// Per-tick solver parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepParams {
    /// Timestep in seconds, already scaled by the animation speed
    pub dt: f32,
    /// Vorticity confinement strength
    pub curl: f32,
    /// Warm-start factor applied to last frame's pressure
    pub pressure_damping: f32,
    pub pressure_iterations: u32,
    /// Effective velocity dissipation (after calm-down)
    pub velocity_dissipation: f32,
    /// Effective dye dissipation (after fade speed)
    pub density_dissipation: f32,
}

impl StepParams {
    pub fn from_config(config: &SimConfig, dt: f32, velocity_dissipation: f32) -> Self {
        Self {
            dt,
            curl: config.curl,
            pressure_damping: config.pressure,
            pressure_iterations: config.pressure_iterations,
            velocity_dissipation,
            density_dissipation: config.effective_density_dissipation(),
        }
    }
}

/// A fluid solver owning velocity, dye, pressure, divergence, curl and bloom
/// grids for one render surface.
///
/// Every call is infallible once the backend exists: failures are contained
/// at construction time.
pub trait FluidBackend {
    /// Reallocate every grid. All fluid state is reset to zero.
    fn resize(&mut self, sizes: &GridSizes);

    /// The presentation surface changed size without grids being
    /// reallocated (sub-threshold jitter or a pure swapchain change).
    fn resize_surface(&mut self, _width: u32, _height: u32) {}

    /// Inject one splat into velocity, then dye.
    fn splat(&mut self, splat: &Splat, aspect: f32);

    /// Advance one timestep.
    fn step(&mut self, params: &StepParams);

    /// Apply one obstacle directly to the live velocity and dye grids.
    fn apply_obstacle(&mut self, stamp: &ObstacleStamp, dt: f32);

    /// Bloom (if enabled) and final composite.
    fn render(&mut self, display: &DisplayParams);
}
