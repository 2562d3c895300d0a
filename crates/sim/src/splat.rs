//! Injection primitive: Gaussian-falloff impulses on velocity and dye.

use glam::{Vec2, Vec3};
use rand::Rng;

use crate::color::ColorGenerator;
use crate::config::SimConfig;
use crate::grid::Field;

/// Range of the number of random splats emitted at startup.
pub const STARTUP_SPLATS: std::ops::RangeInclusive<usize> = 5..=9;
/// Startup splat colors are boosted by this factor.
pub const STARTUP_COLOR_GAIN: f32 = 10.0;
/// Startup splat forces are drawn from `±STARTUP_FORCE / 2` per axis.
pub const STARTUP_FORCE: f32 = 1000.0;

/// One injection at a normalized point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Splat {
    /// Centre in `[0, 1]²`, y up
    pub point: Vec2,
    /// Velocity impulse
    pub force: Vec2,
    /// Dye impulse (may be negative in dark mode)
    pub color: Vec3,
    /// Gaussian variance in normalized units, see [`splat_radius`]
    pub radius: f32,
}

/// A motion-driven injection before it is turned into a [`Splat`].
///
/// Pointers and shape playback both produce these; the instance scales
/// `delta` by `splatForce * projectionDistance`, runs it through the
/// obstacle field and injects it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Injection {
    pub point: Vec2,
    /// Aspect-corrected normalized motion
    pub delta: Vec2,
    pub color: Vec3,
}

/// Kernel variance for the configured splat radius on a surface of `aspect`.
pub fn splat_radius(config: &SimConfig, aspect: f32) -> f32 {
    let radius = config.splat_radius / 100.0;
    if aspect > 1.0 {
        radius * aspect
    } else {
        radius
    }
}

/// Gaussian weight of a texel at `uv` for a splat centred at `point`.
#[inline]
pub fn splat_weight(uv: Vec2, point: Vec2, radius: f32, aspect: f32) -> f32 {
    let mut p = uv - point;
    p.x *= aspect;
    (-p.dot(p) / radius.max(1e-6)).exp()
}

/// Add `value * weight` to every texel of `field`.
pub fn apply_splat(field: &mut Field, point: Vec2, value: Vec3, radius: f32, aspect: f32) {
    let value = value.extend(0.0);
    field.par_update(|_, _, uv, texel| {
        *texel += value * splat_weight(uv, point, radius, aspect);
    });
}

/// Velocity-pass value of a splat (`force.x, force.y, 0`).
pub fn velocity_value(splat: &Splat) -> Vec3 {
    splat.force.extend(0.0)
}

/// Random splats used when no shapes are configured.
pub fn startup_splats<R: Rng + ?Sized>(
    config: &SimConfig,
    colors: &mut ColorGenerator,
    rng: &mut R,
    aspect: f32,
) -> Vec<Splat> {
    let count = rng.gen_range(STARTUP_SPLATS);
    let radius = splat_radius(config, aspect);
    (0..count)
        .map(|_| {
            let color = colors.generate(config, rng) * STARTUP_COLOR_GAIN;
            let point = Vec2::new(rng.gen(), rng.gen());
            let force = Vec2::new(
                STARTUP_FORCE * (rng.gen::<f32>() - 0.5),
                STARTUP_FORCE * (rng.gen::<f32>() - 0.5),
            );
            Splat {
                point,
                force,
                color,
                radius,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Channels, FieldDesc, Filter, Resolution};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_radius_scales_with_wide_aspect() {
        let config = SimConfig::default();
        assert!((splat_radius(&config, 1.0) - 0.0025).abs() < 1e-7);
        assert!((splat_radius(&config, 2.0) - 0.005).abs() < 1e-7);
        assert!((splat_radius(&config, 0.5) - 0.0025).abs() < 1e-7);
    }

    #[test]
    fn test_splat_peaks_at_centre_and_falls_off() {
        let desc = FieldDesc::new(Resolution::new(33, 33), Channels::Rgba, Filter::Linear);
        let mut field = Field::new(desc);
        let centre = field.uv(16, 16);
        apply_splat(&mut field, centre, Vec3::new(1.0, 2.0, 3.0), 0.01, 1.0);

        let peak = field.data()[field.index(16, 16)];
        assert!((peak.truncate() - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-5);

        let near = field.data()[field.index(18, 16)].x;
        let far = field.data()[field.index(30, 16)].x;
        assert!(near < peak.x && far < near);
        assert!(far < 1e-3);
    }

    #[test]
    fn test_startup_splat_count_in_range() {
        let config = SimConfig::default();
        let mut colors = ColorGenerator::new();
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let splats = startup_splats(&config, &mut colors, &mut rng, 1.5);
            assert!(STARTUP_SPLATS.contains(&splats.len()));
            for s in &splats {
                assert!(s.force.abs().max_element() <= STARTUP_FORCE * 0.5);
            }
        }
    }
}
