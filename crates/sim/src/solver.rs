//! CPU reference implementation of the stable-fluids stepper.
//!
//! Mirrors the GPU compute passes one to one: every pass reads whole source
//! fields and writes one destination field, rows in parallel with rayon.
//! Used headless (tests, no adapter) and as the ground truth the GPU passes
//! are checked against.

use glam::{Vec2, Vec3, Vec4};

use crate::backend::{FluidBackend, StepParams};
use crate::bloom::BloomChain;
use crate::display::{composite, DisplayParams};
use crate::grid::{DoubleBuffer, Field, GridSizes};
use crate::obstacle::ObstacleStamp;
use crate::splat::{apply_splat, velocity_value, Splat};

/// CPU fluid state for one surface.
#[derive(Debug)]
pub struct CpuFluid {
    sizes: GridSizes,
    velocity: DoubleBuffer<Field>,
    dye: DoubleBuffer<Field>,
    pressure: DoubleBuffer<Field>,
    divergence: Field,
    curl: Field,
    bloom: BloomChain,
    /// Last composited frame at dye resolution
    frame: Field,
    steps: u64,
}

impl CpuFluid {
    pub fn new(sizes: &GridSizes) -> Self {
        let double = |desc| DoubleBuffer::new(Field::new(desc), Field::new(desc));
        Self {
            velocity: double(sizes.velocity_desc()),
            dye: double(sizes.dye_desc()),
            pressure: double(sizes.scalar_desc()),
            divergence: Field::new(sizes.scalar_desc()),
            curl: Field::new(sizes.scalar_desc()),
            bloom: BloomChain::new(sizes),
            frame: Field::new(sizes.dye_desc()),
            sizes: sizes.clone(),
            steps: 0,
        }
    }

    pub fn sizes(&self) -> &GridSizes {
        &self.sizes
    }

    pub fn velocity(&self) -> &Field {
        self.velocity.read()
    }

    pub fn dye(&self) -> &Field {
        self.dye.read()
    }

    pub fn pressure(&self) -> &Field {
        self.pressure.read()
    }

    pub fn divergence(&self) -> &Field {
        &self.divergence
    }

    pub fn curl(&self) -> &Field {
        &self.curl
    }

    pub fn frame(&self) -> &Field {
        &self.frame
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Mutable access to the current velocity state, for seeding tests and
    /// diagnostics.
    pub fn velocity_mut(&mut self) -> &mut Field {
        self.velocity.read_mut()
    }

    pub fn dye_mut(&mut self) -> &mut Field {
        self.dye.read_mut()
    }

    // ========================================================================
    // PASSES
    // ========================================================================

    /// `0.5 * (R.y - L.y - T.x + B.x)`
    pub fn compute_curl(&mut self) {
        let velocity = self.velocity.read();
        self.curl.par_update(|x, y, _, out| {
            let (x, y) = (x as i32, y as i32);
            let l = velocity.fetch(x - 1, y).y;
            let r = velocity.fetch(x + 1, y).y;
            let t = velocity.fetch(x, y + 1).x;
            let b = velocity.fetch(x, y - 1).x;
            *out = Vec4::new(0.5 * (r - l - t + b), 0.0, 0.0, 0.0);
        });
    }

    pub fn apply_vorticity(&mut self, curl_strength: f32, dt: f32) {
        let curl = &self.curl;
        let (src, dst) = self.velocity.split_mut();
        dst.par_update(|x, y, _, out| {
            let (x, y) = (x as i32, y as i32);
            let l = curl.fetch(x - 1, y).x;
            let r = curl.fetch(x + 1, y).x;
            let t = curl.fetch(x, y + 1).x;
            let b = curl.fetch(x, y - 1).x;
            let c = curl.fetch(x, y).x;

            let mut force = 0.5 * Vec2::new(t.abs() - b.abs(), r.abs() - l.abs());
            force /= force.length() + 1e-4;
            force *= curl_strength * c;
            force.y = -force.y;

            let vel = src.fetch(x, y).truncate().truncate() + force * dt;
            *out = vel.extend(0.0).extend(0.0);
        });
        self.velocity.swap();
    }

    /// Velocity divergence with mirrored walls at the domain edge.
    pub fn compute_divergence(&mut self) {
        let velocity = self.velocity.read();
        let w = velocity.width() as i32;
        let h = velocity.height() as i32;
        self.divergence.par_update(|x, y, _, out| {
            let (x, y) = (x as i32, y as i32);
            let c = velocity.fetch(x, y);
            let l = if x == 0 { -c.x } else { velocity.fetch(x - 1, y).x };
            let r = if x == w - 1 { -c.x } else { velocity.fetch(x + 1, y).x };
            let t = if y == h - 1 { -c.y } else { velocity.fetch(x, y + 1).y };
            let b = if y == 0 { -c.y } else { velocity.fetch(x, y - 1).y };
            *out = Vec4::new(0.5 * (r - l + t - b), 0.0, 0.0, 0.0);
        });
    }

    /// Warm start then Jacobi iterations on the pressure Poisson equation.
    pub fn solve_pressure(&mut self, damping: f32, iterations: u32) {
        {
            let (src, dst) = self.pressure.split_mut();
            dst.par_update(|x, y, _, out| {
                *out = src.fetch(x as i32, y as i32) * damping;
            });
        }
        self.pressure.swap();

        let divergence = &self.divergence;
        for _ in 0..iterations {
            let (src, dst) = self.pressure.split_mut();
            dst.par_update(|x, y, _, out| {
                let (x, y) = (x as i32, y as i32);
                let l = src.fetch(x - 1, y).x;
                let r = src.fetch(x + 1, y).x;
                let t = src.fetch(x, y + 1).x;
                let b = src.fetch(x, y - 1).x;
                let div = divergence.fetch(x, y).x;
                *out = Vec4::new((l + r + b + t - div) * 0.25, 0.0, 0.0, 0.0);
            });
            self.pressure.swap();
        }
    }

    /// `velocity -= (R - L, T - B)` over the pressure field.
    pub fn subtract_gradient(&mut self) {
        let pressure = self.pressure.read();
        let (src, dst) = self.velocity.split_mut();
        dst.par_update(|x, y, _, out| {
            let (x, y) = (x as i32, y as i32);
            let l = pressure.fetch(x - 1, y).x;
            let r = pressure.fetch(x + 1, y).x;
            let t = pressure.fetch(x, y + 1).x;
            let b = pressure.fetch(x, y - 1).x;
            let vel = src.fetch(x, y).truncate().truncate() - Vec2::new(r - l, t - b);
            *out = vel.extend(0.0).extend(0.0);
        });
        self.velocity.swap();
    }

    pub fn advect_velocity(&mut self, dt: f32, dissipation: f32) {
        let (src, dst) = self.velocity.split_mut();
        advect(src, src, dst, dt, dissipation);
        self.velocity.swap();
    }

    pub fn advect_dye(&mut self, dt: f32, dissipation: f32) {
        let velocity = self.velocity.read();
        let (src, dst) = self.dye.split_mut();
        advect(velocity, src, dst, dt, dissipation);
        self.dye.swap();
    }
}

/// Semi-Lagrangian backtrace of `source` through `velocity`.
///
/// The backtrace step is measured in velocity texels regardless of the
/// destination resolution, so dye and velocity grids may differ in size.
fn advect(velocity: &Field, source: &Field, dst: &mut Field, dt: f32, dissipation: f32) {
    let texel = velocity.texel_size();
    let decay = 1.0 + dissipation * dt;
    dst.par_update(|_, _, uv, out| {
        let coord = uv - dt * velocity.sample(uv).truncate().truncate() * texel;
        *out = source.sample(coord) / decay;
    });
}

impl FluidBackend for CpuFluid {
    fn resize(&mut self, sizes: &GridSizes) {
        *self = CpuFluid::new(sizes);
    }

    fn splat(&mut self, splat: &Splat, aspect: f32) {
        let (src, dst) = self.velocity.split_mut();
        dst.data_mut().copy_from_slice(src.data());
        apply_splat(dst, splat.point, velocity_value(splat), splat.radius, aspect);
        self.velocity.swap();

        let (src, dst) = self.dye.split_mut();
        dst.data_mut().copy_from_slice(src.data());
        apply_splat(dst, splat.point, splat.color, splat.radius, aspect);
        self.dye.swap();
    }

    fn step(&mut self, params: &StepParams) {
        self.compute_curl();
        self.apply_vorticity(params.curl, params.dt);
        self.compute_divergence();
        self.solve_pressure(params.pressure_damping, params.pressure_iterations);
        self.subtract_gradient();
        self.advect_velocity(params.dt, params.velocity_dissipation);
        self.advect_dye(params.dt, params.density_dissipation);
        self.steps += 1;
    }

    fn apply_obstacle(&mut self, stamp: &ObstacleStamp, dt: f32) {
        let (src, dst) = self.velocity.split_mut();
        dst.par_update(|x, y, uv, out| {
            let vel = src.fetch(x as i32, y as i32).truncate().truncate();
            let vel = stamp.effect_at(uv).apply_to_velocity(vel, dt);
            *out = vel.extend(0.0).extend(0.0);
        });
        self.velocity.swap();

        let (src, dst) = self.dye.split_mut();
        dst.par_update(|x, y, uv, out| {
            *out = stamp.effect_at(uv).apply_to_dye(src.fetch(x as i32, y as i32), dt);
        });
        self.dye.swap();
    }

    fn render(&mut self, display: &DisplayParams) {
        let bloomed = match display.bloom {
            Some(settings) => self
                .bloom
                .apply(self.dye.read(), &settings.curve, settings.intensity),
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

        let dye = self.dye.read();
        let bloom = self.bloom.output();
        self.frame.par_update(|x, y, uv, out| {
            let c = dye.fetch(x as i32, y as i32).truncate();
            let b = if display.bloom.is_some() {
                bloom.sample(uv).truncate()
            } else {
                Vec3::ZERO
            };
            *out = composite(c, b, &display);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::grid::SurfaceSize;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn small_fluid() -> CpuFluid {
        let config = SimConfig {
            sim_resolution: 16,
            dye_resolution: 32,
            bloom_resolution: 16,
            ..SimConfig::default()
        };
        CpuFluid::new(&GridSizes::for_surface(&config, SurfaceSize::new(100, 100)))
    }

    fn total_divergence(fluid: &mut CpuFluid) -> f32 {
        fluid.compute_divergence();
        fluid.divergence().data().iter().map(|d| d.x.abs()).sum()
    }

    #[test]
    fn test_zero_field_stays_zero() {
        let mut fluid = small_fluid();
        let params = StepParams::from_config(&SimConfig::default(), 1.0 / 60.0, 0.98);
        fluid.step(&params);
        assert_eq!(fluid.velocity().max_abs(), 0.0);
        assert_eq!(fluid.dye().max_abs(), 0.0);
        assert_eq!(fluid.divergence().max_abs(), 0.0);
        assert_eq!(fluid.steps(), 1);
    }

    #[test]
    fn test_projection_reduces_divergence() {
        let mut fluid = small_fluid();
        let mut rng = StdRng::seed_from_u64(7);
        for v in fluid.velocity_mut().data_mut() {
            *v = Vec4::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), 0.0, 0.0);
        }

        let before = total_divergence(&mut fluid);
        fluid.solve_pressure(0.0, 40);
        fluid.subtract_gradient();
        let after = total_divergence(&mut fluid);
        assert!(after < before, "divergence {} -> {}", before, after);
    }

    #[test]
    fn test_gradient_subtracts_full_neighbour_difference() {
        let mut fluid = small_fluid();
        let pressure = fluid.pressure.read_mut();
        let width = pressure.width();
        for (i, p) in pressure.data_mut().iter_mut().enumerate() {
            *p = Vec4::new((i % width) as f32, 0.0, 0.0, 0.0);
        }

        fluid.subtract_gradient();
        let velocity = fluid.velocity();
        // Ramp of 1 per texel: interior sees R - L = 2, the clamped edge 1
        assert_eq!(velocity.fetch(4, 3), Vec4::new(-2.0, 0.0, 0.0, 0.0));
        assert_eq!(velocity.fetch(0, 3), Vec4::new(-1.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_splat_touches_velocity_and_dye() {
        let mut fluid = small_fluid();
        let splat = Splat {
            point: Vec2::splat(0.5),
            force: Vec2::new(100.0, 0.0),
            color: Vec3::new(1.0, 0.5, 0.0),
            radius: 0.01,
        };
        fluid.splat(&splat, 1.0);
        assert!(fluid.velocity().sample(Vec2::splat(0.5)).x > 50.0);
        assert!(fluid.dye().sample(Vec2::splat(0.5)).x > 0.5);
        assert_eq!(fluid.dye().sample(Vec2::splat(0.5)).z, 0.0);
    }

    #[test]
    fn test_dissipation_decays_dye() {
        let mut fluid = small_fluid();
        let splat = Splat {
            point: Vec2::splat(0.5),
            force: Vec2::ZERO,
            color: Vec3::ONE,
            radius: 0.05,
        };
        fluid.splat(&splat, 1.0);
        let before = fluid.dye().max_abs();
        let params = StepParams {
            density_dissipation: 1.0,
            ..StepParams::from_config(&SimConfig::default(), 0.1, 0.2)
        };
        fluid.step(&params);
        let after = fluid.dye().max_abs();
        assert!((after - before / 1.1).abs() < 1e-3);
    }

    #[test]
    fn test_blocked_obstacle_clears_region() {
        use crate::config::ObstacleMode;

        let mut fluid = small_fluid();
        let splat = Splat {
            point: Vec2::splat(0.5),
            force: Vec2::new(10.0, 10.0),
            color: Vec3::ONE,
            radius: 0.5,
        };
        fluid.splat(&splat, 1.0);

        let stamp = ObstacleStamp {
            mode: ObstacleMode::HardCorner,
            min: Vec2::splat(0.25),
            max: Vec2::splat(0.75),
            surface_px: Vec2::splat(100.0),
            strength: 0.0,
            radius: 0.0,
            time_s: 0.0,
        };
        fluid.apply_obstacle(&stamp, 1.0 / 60.0);
        assert_eq!(fluid.dye().sample(Vec2::splat(0.5)), Vec4::ZERO);
        assert_eq!(fluid.velocity().sample(Vec2::splat(0.5)), Vec4::ZERO);
        assert!(fluid.dye().sample(Vec2::splat(0.05)).x > 0.0);
    }

    #[test]
    fn test_render_composites_frame() {
        let mut fluid = small_fluid();
        let splat = Splat {
            point: Vec2::splat(0.5),
            force: Vec2::ZERO,
            color: Vec3::new(0.4, 0.0, 0.0),
            radius: 0.05,
        };
        fluid.splat(&splat, 1.0);
        fluid.render(&DisplayParams::from_config(&SimConfig::default()));
        let centre = fluid.frame().sample(Vec2::splat(0.5));
        assert!(centre.x > 0.3);
        assert!((centre.w - centre.x).abs() < 1e-5);
    }
}
