//! GPU render targets.
//!
//! Every grid lives in a storage buffer of `vec4<f32>` texels laid out like
//! the CPU [`sim::grid::Field`]: row-major, row 0 at the bottom. Keeping one
//! layout for all grids lets every compute program share a bind group layout.

use sim::grid::FieldDesc;

/// Bytes per texel (`vec4<f32>`).
pub const TEXEL_BYTES: u64 = 16;

pub struct RenderTarget {
    pub buffer: wgpu::Buffer,
    pub desc: FieldDesc,
}

impl RenderTarget {
    /// Zero-initialized target for `desc`.
    pub fn new(device: &wgpu::Device, desc: FieldDesc, label: &str) -> Self {
        let texels = desc.resolution.texel_count().max(1) as u64;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: texels * TEXEL_BYTES,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self { buffer, desc }
    }

    pub fn size(&self) -> [u32; 2] {
        [self.desc.width(), self.desc.height()]
    }

    pub fn byte_len(&self) -> u64 {
        self.buffer.size()
    }
}

impl std::fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTarget")
            .field("size", &self.size())
            .field("channels", &self.desc.channels)
            .finish()
    }
}
