//! Injection color generation.

use glam::Vec3;
use rand::Rng;

use crate::config::{ColorMode, SimConfig};

/// Fallback when a hex literal cannot be parsed.
pub const FALLBACK_COLOR: Vec3 = Vec3::new(1.0, 0.0, 1.0);

/// Per-instance color source.
///
/// Only the gradient mode keeps state: a hue in `[0, 1)` that drifts by
/// `gradient_speed * 0.01` turns on every call, so every injection of one
/// instance shares the same smooth drift.
#[derive(Clone, Debug, Default)]
pub struct ColorGenerator {
    gradient_hue: f32,
}

impl ColorGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gradient_hue(&self) -> f32 {
        self.gradient_hue
    }

    /// Generate one post-processed injection color.
    pub fn generate<R: Rng + ?Sized>(&mut self, config: &SimConfig, rng: &mut R) -> Vec3 {
        let saturation = (config.color_saturation * config.saturation_boost).clamp(0.0, 1.0);
        let raw = match config.color_mode {
            ColorMode::Rainbow => hsv_to_rgb(rng.gen::<f32>(), saturation, 1.0),
            ColorMode::Huerange => {
                let hue = sample_hue_range(config.hue_min, config.hue_max, rng.gen::<f32>());
                hsv_to_rgb(hue / 360.0, saturation, 1.0)
            }
            ColorMode::Gradient => {
                self.gradient_hue = (self.gradient_hue + config.gradient_speed * 0.01).rem_euclid(1.0);
                hsv_to_rgb(self.gradient_hue, saturation, 1.0)
            }
            ColorMode::Single => parse_hex(&config.fixed_color).unwrap_or_else(|| {
                log::warn!("Invalid fixed color {:?}, using magenta", config.fixed_color);
                FALLBACK_COLOR
            }),
        };
        post_process(config, raw)
    }
}

/// Brightness, overblend clamp and dark-mode negation, in that order.
pub fn post_process(config: &SimConfig, rgb: Vec3) -> Vec3 {
    let mut c = rgb * config.color_brightness;
    if config.prevent_overblending {
        c = c.min(Vec3::splat(config.max_color_intensity));
    }
    if config.dark_mode {
        c = -c;
    }
    c
}

/// Hue in degrees for a uniform draw `t` in `[0, 1)`.
///
/// `min > max` describes a range wrapping through 0°.
pub fn sample_hue_range(min: f32, max: f32, t: f32) -> f32 {
    let min = min.rem_euclid(360.0);
    let max = if max == 360.0 { 360.0 } else { max.rem_euclid(360.0) };
    let span = if min <= max { max - min } else { 360.0 - min + max };
    (min + t * span).rem_euclid(360.0)
}

/// HSV (all in `[0, 1]`) to RGB.
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Vec3 {
    let h = h.rem_euclid(1.0) * 6.0;
    let i = h.floor();
    let f = h - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);

    match i as u32 % 6 {
        0 => Vec3::new(v, t, p),
        1 => Vec3::new(q, v, p),
        2 => Vec3::new(p, v, t),
        3 => Vec3::new(p, q, v),
        4 => Vec3::new(t, p, v),
        _ => Vec3::new(v, p, q),
    }
}

/// RGB to HSV (hue in turns).
pub fn rgb_to_hsv(c: Vec3) -> (f32, f32, f32) {
    let max = c.max_element();
    let min = c.min_element();
    let delta = max - min;

    let hue = if delta <= f32::EPSILON {
        0.0
    } else if max == c.x {
        ((c.y - c.z) / delta).rem_euclid(6.0) / 6.0
    } else if max == c.y {
        ((c.z - c.x) / delta + 2.0) / 6.0
    } else {
        ((c.x - c.y) / delta + 4.0) / 6.0
    };
    let saturation = if max <= f32::EPSILON { 0.0 } else { delta / max };
    (hue, saturation, max)
}

/// Rotate the hue of `c` by `turns`, keeping saturation and value.
///
/// Negated (dark mode) colors are rotated in positive space and negated back.
pub fn rotate_hue(c: Vec3, turns: f32) -> Vec3 {
    let negative = c.max_element() <= 0.0 && c.min_element() < 0.0;
    let positive = if negative { -c } else { c };
    let (h, s, v) = rgb_to_hsv(positive);
    let rotated = hsv_to_rgb(h + turns, s, v);
    if negative {
        -rotated
    } else {
        rotated
    }
}

/// Parse `#rgb` or `#rrggbb` (leading `#` optional).
pub fn parse_hex(s: &str) -> Option<Vec3> {
    let hex = s.trim().trim_start_matches('#');
    if !hex.is_ascii() {
        return None;
    }
    let channel = |digits: &str| u8::from_str_radix(digits, 16).ok().map(|v| v as f32 / 255.0);
    match hex.len() {
        3 => {
            let mut out = [0.0; 3];
            for (slot, i) in out.iter_mut().zip(0..3) {
                let d = &hex[i..i + 1];
                *slot = channel(format!("{d}{d}").as_str())?;
            }
            Some(Vec3::from(out))
        }
        6 => Some(Vec3::new(
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        )),
        _ => None,
    }
}
