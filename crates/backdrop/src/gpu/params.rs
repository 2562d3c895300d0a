//! GPU shader parameter structs.
//!
//! These are `#[repr(C)]` structs uploaded to uniform buffers. Every compute
//! program shares [`PassParams`]; each program reads only the fields it
//! needs (listed on the constructors).

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use sim::bloom::BloomCurve;
use sim::display::DisplayParams;
use sim::obstacle::ObstacleStamp;

/// `flag` bit for composite: bloom texture is valid
pub const COMPOSITE_BLOOM: u32 = 1;
/// `flag` bit for composite: colors are stored negated
pub const COMPOSITE_DARK: u32 = 2;

/// Which field an obstacle pass rewrites.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObstacleTarget {
    Velocity = 0,
    Dye = 1,
}

/// Shared compute pass parameters (96 bytes).
///
/// Sizes are filled in by the pass encoder from the bound targets.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PassParams {
    /// Size of `src_a`
    pub src_size: [u32; 2],
    /// Size of `src_b`
    pub aux_size: [u32; 2],
    pub dst_size: [u32; 2],
    pub mode: u32,
    pub flag: u32,
    pub point: [f32; 2],
    pub extent: [f32; 2],
    pub value: [f32; 4],
    pub dt: f32,
    pub dissipation: f32,
    pub radius: f32,
    pub aspect: f32,
    pub scalar: f32,
    pub intensity: f32,
    pub time: f32,
    pub _pad: f32,
}

impl PassParams {
    /// Gaussian splat of `value` (velocity: `(fx, fy, 0)`, dye: rgb).
    pub fn splat(point: Vec2, value: Vec3, radius: f32, aspect: f32) -> Self {
        Self {
            point: point.to_array(),
            value: value.extend(0.0).to_array(),
            radius,
            aspect,
            ..Self::default()
        }
    }

    /// Vorticity confinement, or a plain `scalar` multiply.
    pub fn scalar(scalar: f32, dt: f32) -> Self {
        Self {
            scalar,
            dt,
            ..Self::default()
        }
    }

    pub fn advect(dt: f32, dissipation: f32) -> Self {
        Self {
            dt,
            dissipation,
            ..Self::default()
        }
    }

    /// Obstacle stamp: `point`/`extent` are the box corners, `value.xy` the
    /// surface size in pixels.
    pub fn obstacle(stamp: &ObstacleStamp, dt: f32, target: ObstacleTarget) -> Self {
        Self {
            mode: stamp.mode.as_u32(),
            flag: target as u32,
            point: stamp.min.to_array(),
            extent: stamp.max.to_array(),
            value: [stamp.surface_px.x, stamp.surface_px.y, 0.0, 0.0],
            dt,
            radius: stamp.radius,
            scalar: stamp.strength,
            time: stamp.time_s,
            ..Self::default()
        }
    }

    pub fn bloom_prefilter(curve: &BloomCurve) -> Self {
        Self {
            value: curve.curve.extend(0.0).to_array(),
            scalar: curve.threshold,
            ..Self::default()
        }
    }

    /// Diagonal blur scaled by `intensity`, added to the destination when
    /// `additive`.
    pub fn blur(intensity: f32, additive: bool) -> Self {
        Self {
            intensity,
            flag: additive as u32,
            ..Self::default()
        }
    }

    pub fn composite(display: &DisplayParams) -> Self {
        let mut flag = 0;
        if display.bloom.is_some() {
            flag |= COMPOSITE_BLOOM;
        }
        if display.dark_mode {
            flag |= COMPOSITE_DARK;
        }
        Self {
            flag,
            scalar: display.bloom_sign(),
            intensity: display.saturate,
            ..Self::default()
        }
    }
}

/// Display pass uniforms (16 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct DisplayUniforms {
    pub frame_size: [u32; 2],
    pub _pad: [u32; 2],
}
