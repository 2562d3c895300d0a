//! Grid manager: render target descriptions, CPU fields and double buffers.
//!
//! Every grid is addressed in normalized `[0, 1]²` coordinates with texel
//! centres at `(i + 0.5) / width`. Because of that the dye grid can run at a
//! different (usually higher) resolution than the velocity grid without any
//! resampling step between the two.

use glam::{UVec2, Vec2, Vec4};
use rayon::prelude::*;

use crate::config::SimConfig;

/// Surface changes smaller than this (per axis, in pixels) do not reallocate.
pub const RESIZE_HYSTERESIS_PX: u32 = 2;

// ============================================================================
// RESOLUTION
// ============================================================================

/// Grid dimensions in texels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn texel_size(&self) -> Vec2 {
        Vec2::new(1.0 / self.width.max(1) as f32, 1.0 / self.height.max(1) as f32)
    }

    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn as_uvec2(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }
}

/// Landscape grid size for a base resolution and an aspect ratio ≥ 1.
///
/// The shorter axis gets `round(base)`, the longer `round(base * aspect)`.
pub fn compute_resolution(base: f32, aspect: f32) -> Resolution {
    let aspect = if aspect < 1.0 { 1.0 / aspect } else { aspect };
    let min = base.round().max(1.0) as u32;
    let max = (base * aspect).round().max(1.0) as u32;
    Resolution::new(max, min)
}

/// Grid size for a surface, flipping the long axis for portrait surfaces.
pub fn resolution_for_surface(base: u32, surface: SurfaceSize) -> Resolution {
    let res = compute_resolution(base as f32, surface.aspect());
    if surface.width >= surface.height {
        res
    } else {
        Resolution::new(res.height, res.width)
    }
}

// ============================================================================
// SURFACE
// ============================================================================

/// Pixel size of the render surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width over height; 1 for a degenerate surface.
    pub fn aspect(&self) -> f32 {
        if self.width == 0 || self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    pub fn as_vec2(&self) -> Vec2 {
        Vec2::new(self.width.max(1) as f32, self.height.max(1) as f32)
    }

    /// True when `new` differs enough from `self` to justify reallocating
    /// every grid. Zero-sized surfaces (minimised windows) never qualify.
    pub fn needs_realloc(&self, new: SurfaceSize) -> bool {
        if new.width == 0 || new.height == 0 {
            return false;
        }
        if self.width == 0 || self.height == 0 {
            return true;
        }
        self.width.abs_diff(new.width) > RESIZE_HYSTERESIS_PX
            || self.height.abs_diff(new.height) > RESIZE_HYSTERESIS_PX
    }
}

// ============================================================================
// RENDER TARGET DESCRIPTIONS
// ============================================================================

/// Meaningful channels of a render target.
///
/// Storage is always four wide; this records how many carry data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channels {
    R,
    Rg,
    Rgba,
}

/// Sampling filter of a render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Filter {
    Linear,
    Nearest,
}

/// Description of one render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldDesc {
    pub resolution: Resolution,
    pub channels: Channels,
    pub filter: Filter,
}

impl FieldDesc {
    pub fn new(resolution: Resolution, channels: Channels, filter: Filter) -> Self {
        Self {
            resolution,
            channels,
            filter,
        }
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    pub fn texel_size(&self) -> Vec2 {
        self.resolution.texel_size()
    }
}

/// Every grid size derived from the config and the surface.
#[derive(Clone, Debug, PartialEq)]
pub struct GridSizes {
    pub surface: SurfaceSize,
    pub sim: Resolution,
    pub dye: Resolution,
    pub bloom: Resolution,
    /// Downsample chain below `bloom`, each level half the previous
    pub bloom_chain: Vec<Resolution>,
}

impl GridSizes {
    pub fn for_surface(config: &SimConfig, surface: SurfaceSize) -> Self {
        let sim = resolution_for_surface(config.sim_resolution, surface);
        let dye = resolution_for_surface(config.dye_resolution, surface);
        let bloom = resolution_for_surface(config.bloom_resolution, surface);

        let mut bloom_chain = Vec::new();
        for level in 0..config.bloom_iterations {
            let width = bloom.width >> (level + 1);
            let height = bloom.height >> (level + 1);
            if width < 2 || height < 2 {
                break;
            }
            bloom_chain.push(Resolution::new(width, height));
        }

        Self {
            surface,
            sim,
            dye,
            bloom,
            bloom_chain,
        }
    }

    pub fn velocity_desc(&self) -> FieldDesc {
        FieldDesc::new(self.sim, Channels::Rg, Filter::Linear)
    }

    pub fn dye_desc(&self) -> FieldDesc {
        FieldDesc::new(self.dye, Channels::Rgba, Filter::Linear)
    }

    /// Pressure, divergence and curl share this description.
    pub fn scalar_desc(&self) -> FieldDesc {
        FieldDesc::new(self.sim, Channels::R, Filter::Nearest)
    }

    pub fn bloom_desc(&self, resolution: Resolution) -> FieldDesc {
        FieldDesc::new(resolution, Channels::Rgba, Filter::Linear)
    }

    /// Bloom needs at least two chain levels to be worth running.
    pub fn bloom_available(&self) -> bool {
        self.bloom_chain.len() >= 2
    }
}

// ============================================================================
// DOUBLE BUFFER
// ============================================================================

/// Read/write pair of render targets.
///
/// After [`DoubleBuffer::swap`] `read()` holds the most recently written state.
#[derive(Debug)]
pub struct DoubleBuffer<T> {
    read: T,
    write: T,
}

impl<T> DoubleBuffer<T> {
    pub fn new(read: T, write: T) -> Self {
        Self { read, write }
    }

    pub fn read(&self) -> &T {
        &self.read
    }

    pub fn write(&self) -> &T {
        &self.write
    }

    pub fn read_mut(&mut self) -> &mut T {
        &mut self.read
    }

    pub fn write_mut(&mut self) -> &mut T {
        &mut self.write
    }

    /// Borrow the read side immutably and the write side mutably.
    pub fn split_mut(&mut self) -> (&T, &mut T) {
        (&self.read, &mut self.write)
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.read, &mut self.write);
    }
}

// ============================================================================
// CPU FIELD
// ============================================================================

/// CPU render target: `width * height` four-channel texels, row-major with
/// row 0 at the bottom (`y` grows upwards like texture coordinates).
#[derive(Clone, Debug)]
pub struct Field {
    desc: FieldDesc,
    data: Vec<Vec4>,
}

impl Field {
    /// Zero-initialized field.
    pub fn new(desc: FieldDesc) -> Self {
        Self {
            desc,
            data: vec![Vec4::ZERO; desc.resolution.texel_count()],
        }
    }

    pub fn desc(&self) -> &FieldDesc {
        &self.desc
    }

    pub fn width(&self) -> usize {
        self.desc.width() as usize
    }

    pub fn height(&self) -> usize {
        self.desc.height() as usize
    }

    pub fn texel_size(&self) -> Vec2 {
        self.desc.texel_size()
    }

    pub fn data(&self) -> &[Vec4] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [Vec4] {
        &mut self.data
    }

    pub fn fill(&mut self, value: Vec4) {
        self.data.fill(value);
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width() + x
    }

    /// Normalized coordinate of a texel centre.
    #[inline]
    pub fn uv(&self, x: usize, y: usize) -> Vec2 {
        Vec2::new(
            (x as f32 + 0.5) / self.width() as f32,
            (y as f32 + 0.5) / self.height() as f32,
        )
    }

    /// Texel fetch with clamp-to-edge addressing.
    #[inline]
    pub fn fetch(&self, x: i32, y: i32) -> Vec4 {
        let cx = x.clamp(0, self.width() as i32 - 1) as usize;
        let cy = y.clamp(0, self.height() as i32 - 1) as usize;
        self.data[cy * self.width() + cx]
    }

    /// Sample at a normalized coordinate, honouring the field's filter.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let st = uv * Vec2::new(self.width() as f32, self.height() as f32) - Vec2::splat(0.5);
        match self.desc.filter {
            Filter::Nearest => self.fetch(st.x.round() as i32, st.y.round() as i32),
            Filter::Linear => {
                let base = st.floor();
                let f = st - base;
                let (x0, y0) = (base.x as i32, base.y as i32);

                let a = self.fetch(x0, y0);
                let b = self.fetch(x0 + 1, y0);
                let c = self.fetch(x0, y0 + 1);
                let d = self.fetch(x0 + 1, y0 + 1);

                let bottom = a.lerp(b, f.x);
                let top = c.lerp(d, f.x);
                bottom.lerp(top, f.y)
            }
        }
    }

    /// Update every texel in parallel (one rayon task per row).
    ///
    /// The closure receives the texel coordinates, the texel centre in
    /// normalized space and the texel itself.
    pub fn par_update<F>(&mut self, f: F)
    where
        F: Fn(usize, usize, Vec2, &mut Vec4) + Sync,
    {
        let width = self.width();
        let height = self.height();
        self.data
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, texel) in row.iter_mut().enumerate() {
                    let uv = Vec2::new(
                        (x as f32 + 0.5) / width as f32,
                        (y as f32 + 0.5) / height as f32,
                    );
                    f(x, y, uv, texel);
                }
            });
    }

    /// Largest absolute value of any channel; used by diagnostics and tests.
    pub fn max_abs(&self) -> f32 {
        self.data
            .iter()
            .map(|v| v.abs().max_element())
            .fold(0.0, f32::max)
    }
}
