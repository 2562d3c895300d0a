//! Bloom post-processing.
//!
//! Pipeline: soft-knee prefilter into the bloom base, downsample+blur through
//! the chain, additive upsample+blur back up, final blur scaled by intensity
//! into the base. The GPU backend runs the same passes with the same
//! [`BloomCurve`].

use glam::Vec3;

use crate::config::SimConfig;
use crate::grid::{Field, GridSizes};

/// Blur taps sit this many source texels from the centre, along the diagonal.
pub const BLUR_TAP_OFFSET: f32 = 1.333_333_3;

/// Soft-knee threshold curve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BloomCurve {
    pub threshold: f32,
    /// `(threshold - knee, 2 * knee, 0.25 / knee)`
    pub curve: Vec3,
}

impl BloomCurve {
    pub fn new(threshold: f32, soft_knee: f32) -> Self {
        let knee = threshold * soft_knee + 1e-4;
        Self {
            threshold,
            curve: Vec3::new(threshold - knee, knee * 2.0, 0.25 / knee),
        }
    }

    pub fn from_config(config: &SimConfig) -> Self {
        Self::new(config.bloom_threshold, config.bloom_soft_knee)
    }

    /// Bright-pass weight applied to a color.
    pub fn prefilter(&self, c: Vec3) -> Vec3 {
        let brightness = c.max_element();
        let rq = (brightness - self.curve.x).clamp(0.0, self.curve.y);
        let rq = self.curve.z * rq * rq;
        c * rq.max(brightness - self.threshold) / brightness.max(1e-4)
    }
}

/// Bloom base plus its downsample chain.
#[derive(Clone, Debug)]
pub struct BloomChain {
    base: Field,
    levels: Vec<Field>,
}

impl BloomChain {
    pub fn new(sizes: &GridSizes) -> Self {
        Self {
            base: Field::new(sizes.bloom_desc(sizes.bloom)),
            levels: sizes
                .bloom_chain
                .iter()
                .map(|r| Field::new(sizes.bloom_desc(*r)))
                .collect(),
        }
    }

    /// Result of the last [`BloomChain::apply`].
    pub fn output(&self) -> &Field {
        &self.base
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Run the full bloom pipeline on `source`. Returns false (and leaves the
    /// output untouched) when the chain is too short to run.
    pub fn apply(&mut self, source: &Field, curve: &BloomCurve, intensity: f32) -> bool {
        if self.levels.len() < 2 {
            return false;
        }

        self.base.par_update(|_, _, uv, texel| {
            *texel = curve.prefilter(source.sample(uv).truncate()).extend(0.0);
        });

        blur_into(&self.base, &mut self.levels[0], 1.0, false);
        for i in 1..self.levels.len() {
            let (done, rest) = self.levels.split_at_mut(i);
            blur_into(&done[i - 1], &mut rest[0], 1.0, false);
        }

        for i in (0..self.levels.len() - 1).rev() {
            let (head, tail) = self.levels.split_at_mut(i + 1);
            blur_into(&tail[0], &mut head[i], 1.0, true);
        }

        blur_into(&self.levels[0], &mut self.base, intensity, false);
        true
    }
}

/// Two-tap diagonal blur of `src` into `dst`, optionally accumulating.
fn blur_into(src: &Field, dst: &mut Field, scale: f32, additive: bool) {
    let offset = src.texel_size() * BLUR_TAP_OFFSET;
    dst.par_update(|_, _, uv, texel| {
        let sum = (src.sample(uv - offset) + src.sample(uv + offset)) * 0.5 * scale;
        if additive {
            *texel += sum;
        } else {
            *texel = sum;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec4};
    use crate::grid::{Channels, FieldDesc, Filter, Resolution, SurfaceSize};

    #[test]
    fn test_curve_constants() {
        let curve = BloomCurve::new(0.6, 0.7);
        let knee = 0.6 * 0.7 + 1e-4;
        assert!((curve.curve.x - (0.6 - knee)).abs() < 1e-6);
        assert!((curve.curve.y - 2.0 * knee).abs() < 1e-6);
        assert!((curve.curve.z - 0.25 / knee).abs() < 1e-4);
    }

    #[test]
    fn test_prefilter_passes_bright_and_drops_dark() {
        let curve = BloomCurve::new(0.6, 0.7);
        assert_eq!(curve.prefilter(Vec3::ZERO), Vec3::ZERO);
        // Well below the knee
        assert!(curve.prefilter(Vec3::splat(0.1)).max_element() < 1e-6);
        // Far above threshold keeps roughly brightness - threshold
        let bright = curve.prefilter(Vec3::new(2.0, 0.0, 0.0));
        assert!((bright.x - 1.4).abs() < 1e-3);
    }

    #[test]
    fn test_short_chain_is_skipped() {
        let config = SimConfig {
            bloom_resolution: 4,
            ..SimConfig::default()
        };
        let sizes = GridSizes::for_surface(&config, SurfaceSize::new(100, 100));
        let mut chain = BloomChain::new(&sizes);
        assert_eq!(chain.level_count(), 1);

        let desc = FieldDesc::new(Resolution::new(8, 8), Channels::Rgba, Filter::Linear);
        let mut source = Field::new(desc);
        source.fill(Vec4::splat(5.0));
        assert!(!chain.apply(&source, &BloomCurve::from_config(&config), 1.0));
        assert_eq!(chain.output().max_abs(), 0.0);
    }

    #[test]
    fn test_bright_source_produces_glow() {
        let config = SimConfig {
            bloom_resolution: 32,
            ..SimConfig::default()
        };
        let sizes = GridSizes::for_surface(&config, SurfaceSize::new(64, 64));
        let mut chain = BloomChain::new(&sizes);

        let desc = FieldDesc::new(Resolution::new(64, 64), Channels::Rgba, Filter::Linear);
        let mut source = Field::new(desc);
        source.fill(Vec4::new(2.0, 2.0, 2.0, 0.0));

        assert!(chain.apply(&source, &BloomCurve::from_config(&config), 0.8));
        let centre = chain.output().sample(Vec2::splat(0.5));
        assert!(centre.x > 0.0);
        // Uniform input stays uniform through blur/upsample
        let corner = chain.output().sample(Vec2::splat(0.05));
        assert!((centre.x - corner.x).abs() < 1e-3 * centre.x.max(1.0));
    }
}
