//! Blocking readback of render targets.
//!
//! Used by tests and diagnostics to compare GPU grids against the CPU
//! reference solver. The frame loop never reads back.

use std::sync::mpsc;

use glam::Vec4;

use super::target::RenderTarget;
use super::{GpuContext, GpuError};

/// Copy `target` into a staging buffer, wait for the map and return its
/// texels in row-major order (row 0 at the bottom).
pub fn read_target(ctx: &GpuContext, target: &RenderTarget) -> Result<Vec<Vec4>, GpuError> {
    if ctx.is_device_lost() {
        return Err(GpuError::DeviceLost);
    }

    let size = target.byte_len();
    let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Staging"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
    encoder.copy_buffer_to_buffer(&target.buffer, 0, &staging, 0, size);
    ctx.queue.submit(std::iter::once(encoder.finish()));

    let (tx, rx) = mpsc::channel();
    staging
        .slice(..)
        .map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
    ctx.device.poll(wgpu::Maintain::Wait);
    ctx.await_buffer_map(rx)?;

    let texels = {
        let data = staging.slice(..).get_mapped_range();
        // Mapped ranges are only guaranteed 4-byte aligned for f32 access
        let slice: &[[f32; 4]] = bytemuck::cast_slice(&data);
        slice[..target.desc.resolution.texel_count()]
            .iter()
            .map(|t| Vec4::from_array(*t))
            .collect::<Vec<_>>()
    };
    staging.unmap();
    Ok(texels)
}

/// Overwrite `target` with `texels` (row-major, row 0 at the bottom).
pub fn write_target(ctx: &GpuContext, target: &RenderTarget, texels: &[Vec4]) {
    let count = target.desc.resolution.texel_count().min(texels.len());
    let data: Vec<[f32; 4]> = texels[..count].iter().map(|t| t.to_array()).collect();
    ctx.queue
        .write_buffer(&target.buffer, 0, bytemuck::cast_slice(&data));
}
