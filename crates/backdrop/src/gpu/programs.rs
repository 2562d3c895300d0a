//! Compiled compute programs and the pass encoder that dispatches them.
//!
//! All programs share one bind group layout:
//! - 0: [`PassParams`] uniform (dynamic offset into a [`ParamArena`])
//! - 1: `src_a` (read)
//! - 2: `src_b` (read)
//! - 3: `dst` (read_write)
//!
//! Programs are compiled once per [`GpuContext`] and shared by every surface.

use std::num::NonZeroU64;

use super::params::PassParams;
use super::target::RenderTarget;
use super::{validated, GpuContext, GpuError};

const PARAMS_SIZE: u64 = std::mem::size_of::<PassParams>() as u64;
/// Dispatches per submission before the arena is flushed.
const ARENA_SLOTS: u64 = 128;
const WORKGROUP_SIZE: u32 = 8;

/// One compute entry point of `fluid.wgsl`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Program {
    Splat,
    Curl,
    Vorticity,
    Divergence,
    Scale,
    Pressure,
    GradientSubtract,
    Advect,
    Obstacle,
    BloomPrefilter,
    Blur,
    Composite,
}

impl Program {
    pub const ALL: [Program; 12] = [
        Program::Splat,
        Program::Curl,
        Program::Vorticity,
        Program::Divergence,
        Program::Scale,
        Program::Pressure,
        Program::GradientSubtract,
        Program::Advect,
        Program::Obstacle,
        Program::BloomPrefilter,
        Program::Blur,
        Program::Composite,
    ];

    pub fn entry_point(self) -> &'static str {
        match self {
            Program::Splat => "splat",
            Program::Curl => "curl",
            Program::Vorticity => "vorticity",
            Program::Divergence => "divergence",
            Program::Scale => "scale",
            Program::Pressure => "pressure",
            Program::GradientSubtract => "gradient_subtract",
            Program::Advect => "advect",
            Program::Obstacle => "obstacle",
            Program::BloomPrefilter => "bloom_prefilter",
            Program::Blur => "blur",
            Program::Composite => "composite",
        }
    }
}

/// Every fluid compute pipeline plus their shared layout.
pub struct Programs {
    layout: wgpu::BindGroupLayout,
    pipelines: Vec<wgpu::ComputePipeline>,
}

impl Programs {
    /// Compile all programs. Any compile or validation error is reported
    /// as [`GpuError::Pipeline`].
    pub fn new(ctx: &GpuContext) -> Result<Self, GpuError> {
        let device = &ctx.device;

        let shader = validated(device, || {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Fluid Shader"),
                source: wgpu::ShaderSource::Wgsl(
                    concat!(include_str!("shaders/common.wgsl"), include_str!("shaders/fluid.wgsl"))
                        .into(),
                ),
            })
        })?;

        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Fluid Bind Group Layout"),
            entries: &[
                // params (uniform, one slot per dispatch)
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(PARAMS_SIZE),
                    },
                    count: None,
                },
                // src_a (read)
                storage(1, true),
                // src_b (read)
                storage(2, true),
                // dst (read_write)
                storage(3, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Fluid Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipelines = validated(device, || {
            Program::ALL
                .iter()
                .map(|program| {
                    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                        label: Some(program.entry_point()),
                        layout: Some(&pipeline_layout),
                        module: &shader,
                        entry_point: Some(program.entry_point()),
                        compilation_options: Default::default(),
                        cache: None,
                    })
                })
                .collect::<Vec<_>>()
        })?;

        log::info!("Compiled {} fluid programs", pipelines.len());
        Ok(Self { layout, pipelines })
    }

    fn pipeline(&self, program: Program) -> &wgpu::ComputePipeline {
        &self.pipelines[program as usize]
    }
}

// ============================================================================
// PARAM ARENA
// ============================================================================

/// Uniform buffer holding one [`PassParams`] slot per dispatch of a
/// submission. Slots are staged on the CPU and uploaded right before submit.
pub struct ParamArena {
    buffer: wgpu::Buffer,
    stride: u64,
    staging: Vec<u8>,
    used: u64,
}

impl ParamArena {
    pub fn new(ctx: &GpuContext) -> Self {
        let alignment = ctx.device.limits().min_uniform_buffer_offset_alignment as u64;
        let stride = PARAMS_SIZE.div_ceil(alignment) * alignment;
        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Pass Params Arena"),
            size: stride * ARENA_SLOTS,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            stride,
            staging: vec![0; (stride * ARENA_SLOTS) as usize],
            used: 0,
        }
    }

    fn is_full(&self) -> bool {
        self.used == ARENA_SLOTS
    }

    /// Stage `params` and return its dynamic offset.
    fn push(&mut self, params: &PassParams) -> u32 {
        let offset = self.used * self.stride;
        let start = offset as usize;
        self.staging[start..start + PARAMS_SIZE as usize].copy_from_slice(bytemuck::bytes_of(params));
        self.used += 1;
        offset as u32
    }

    fn upload(&mut self, queue: &wgpu::Queue) {
        if self.used > 0 {
            let len = (self.used * self.stride) as usize;
            queue.write_buffer(&self.buffer, 0, &self.staging[..len]);
        }
        self.used = 0;
    }
}

// ============================================================================
// PASS ENCODER
// ============================================================================

/// Records compute dispatches for one frame of one surface.
pub struct PassEncoder<'a> {
    ctx: &'a GpuContext,
    programs: &'a Programs,
    arena: &'a mut ParamArena,
    encoder: wgpu::CommandEncoder,
    dispatches: u32,
}

impl<'a> PassEncoder<'a> {
    pub fn new(ctx: &'a GpuContext, programs: &'a Programs, arena: &'a mut ParamArena) -> Self {
        let encoder = Self::create_encoder(ctx);
        Self {
            ctx,
            programs,
            arena,
            encoder,
            dispatches: 0,
        }
    }

    fn create_encoder(ctx: &GpuContext) -> wgpu::CommandEncoder {
        ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Fluid Encoder"),
        })
    }

    pub fn dispatches(&self) -> u32 {
        self.dispatches
    }

    /// Run `program` over every texel of `dst`. `src_b` defaults to `src_a`.
    /// `dst` must not be one of the sources.
    pub fn dispatch(
        &mut self,
        program: Program,
        mut params: PassParams,
        src_a: &RenderTarget,
        src_b: Option<&RenderTarget>,
        dst: &RenderTarget,
    ) {
        if self.arena.is_full() {
            self.flush();
        }
        let src_b = src_b.unwrap_or(src_a);
        params.src_size = src_a.size();
        params.aux_size = src_b.size();
        params.dst_size = dst.size();
        let offset = self.arena.push(&params);

        let bind_group = self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(program.entry_point()),
            layout: &self.programs.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &self.arena.buffer,
                        offset: 0,
                        size: NonZeroU64::new(PARAMS_SIZE),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: src_a.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: src_b.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: dst.buffer.as_entire_binding(),
                },
            ],
        });

        let [width, height] = dst.size();
        let mut pass = self.encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(program.entry_point()),
            timestamp_writes: None,
        });
        pass.set_pipeline(self.programs.pipeline(program));
        pass.set_bind_group(0, &bind_group, &[offset]);
        pass.dispatch_workgroups(
            width.div_ceil(WORKGROUP_SIZE),
            height.div_ceil(WORKGROUP_SIZE),
            1,
        );
        self.dispatches += 1;
    }

    pub fn copy(&mut self, src: &RenderTarget, dst: &RenderTarget) {
        let len = src.byte_len().min(dst.byte_len());
        self.encoder.copy_buffer_to_buffer(&src.buffer, 0, &dst.buffer, 0, len);
    }

    pub fn clear(&mut self, target: &RenderTarget) {
        self.encoder.clear_buffer(&target.buffer, 0, None);
    }

    /// Submit what has been recorded so far and start a new encoder.
    fn flush(&mut self) {
        let encoder = std::mem::replace(&mut self.encoder, Self::create_encoder(self.ctx));
        self.arena.upload(&self.ctx.queue);
        self.ctx.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Encoder for non-compute work recorded after the dispatches.
    pub fn encoder_mut(&mut self) -> &mut wgpu::CommandEncoder {
        &mut self.encoder
    }

    pub fn submit(self) {
        let PassEncoder {
            ctx,
            arena,
            encoder,
            ..
        } = self;
        arena.upload(&ctx.queue);
        ctx.queue.submit(std::iter::once(encoder.finish()));
    }
}
