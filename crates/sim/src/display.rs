//! Final composite of dye and bloom.
//!
//! The GPU display shader implements exactly these functions; the CPU
//! backend calls them directly.

use glam::{Mat3, Vec3, Vec4};

use crate::bloom::BloomCurve;
use crate::config::{BlendMode, SimConfig};

/// Bloom parameters for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BloomSettings {
    pub curve: BloomCurve,
    pub intensity: f32,
}

/// Display parameters for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayParams {
    pub blend_mode: BlendMode,
    /// Subtract bloom instead of adding it
    pub negative_bloom: bool,
    /// CSS `saturate()` amount, 1 = unchanged
    pub saturate: f32,
    /// Stored colors are negated; display as `1 + c`
    pub dark_mode: bool,
    /// `None` when bloom is disabled
    pub bloom: Option<BloomSettings>,
}

impl DisplayParams {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            blend_mode: config.blend_mode,
            negative_bloom: config.negative_bloom,
            saturate: config.css_saturate / 100.0,
            dark_mode: config.dark_mode,
            bloom: config.bloom.then(|| BloomSettings {
                curve: BloomCurve::from_config(config),
                intensity: config.bloom_intensity,
            }),
        }
    }

    pub fn bloom_sign(&self) -> f32 {
        if self.negative_bloom {
            -1.0
        } else {
            1.0
        }
    }
}

/// CSS filter `saturate(s)` as a color matrix.
pub fn saturate_matrix(s: f32) -> Mat3 {
    // Rows of the Filter Effects matrix, transposed into glam's columns
    Mat3::from_cols(
        Vec3::new(0.213 + 0.787 * s, 0.213 - 0.213 * s, 0.213 - 0.213 * s),
        Vec3::new(0.715 - 0.715 * s, 0.715 + 0.285 * s, 0.715 - 0.715 * s),
        Vec3::new(0.072 - 0.072 * s, 0.072 - 0.072 * s, 0.072 + 0.928 * s),
    )
}

/// Composite one texel. Returns premultiplied RGBA with alpha equal to the
/// brightest channel.
pub fn composite(dye: Vec3, bloom: Vec3, params: &DisplayParams) -> Vec4 {
    let mut c = dye;
    if params.bloom.is_some() {
        c += bloom * params.bloom_sign();
    }
    if params.dark_mode {
        c = Vec3::ONE + c;
    }
    if params.saturate != 1.0 {
        c = saturate_matrix(params.saturate) * c;
    }
    let c = c.clamp(Vec3::ZERO, Vec3::ONE);
    c.extend(c.max_element())
}

/// Blend a composited texel over a destination color. Matches the blend
/// state the GPU display pipeline uses for each mode.
pub fn blend_over(src: Vec4, dst: Vec3, mode: BlendMode) -> Vec3 {
    let s = src.truncate();
    let a = src.w;
    match mode {
        BlendMode::Normal => s + dst * (1.0 - a),
        BlendMode::Screen => s + dst * (Vec3::ONE - s),
        BlendMode::Multiply => s * dst + dst * (1.0 - a),
        BlendMode::Lighten => s.max(dst),
        BlendMode::Additive => s + dst,
    }
}
