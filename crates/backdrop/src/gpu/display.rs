//! Presentation of composited frames.
//!
//! One render pipeline per [`BlendMode`]; the blend state reproduces
//! [`sim::display::blend_over`] against the surface's clear color.

use sim::config::BlendMode;

use super::params::DisplayUniforms;
use super::target::RenderTarget;
use super::{validated, GpuContext, GpuError};

const BLEND_MODES: [BlendMode; 5] = [
    BlendMode::Normal,
    BlendMode::Screen,
    BlendMode::Multiply,
    BlendMode::Lighten,
    BlendMode::Additive,
];

fn blend_state(mode: BlendMode) -> wgpu::BlendState {
    let color = match mode {
        BlendMode::Normal => wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
        BlendMode::Screen => wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrc,
            operation: wgpu::BlendOperation::Add,
        },
        BlendMode::Multiply => wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::Dst,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
        // Min/Max ignore the factors but wgpu requires them to be One
        BlendMode::Lighten => wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Max,
        },
        BlendMode::Additive => wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Add,
        },
    };
    wgpu::BlendState {
        color,
        alpha: wgpu::BlendComponent::OVER,
    }
}

pub struct DisplayPipeline {
    layout: wgpu::BindGroupLayout,
    pipelines: Vec<(BlendMode, wgpu::RenderPipeline)>,
    uniforms: wgpu::Buffer,
    format: wgpu::TextureFormat,
}

impl DisplayPipeline {
    pub fn new(ctx: &GpuContext, format: wgpu::TextureFormat) -> Result<Self, GpuError> {
        let device = &ctx.device;

        let shader = validated(device, || {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Display Shader"),
                source: wgpu::ShaderSource::Wgsl(include_str!("shaders/display.wgsl").into()),
            })
        })?;

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Display Bind Group Layout"),
            entries: &[
                // uniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // frame (read)
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Display Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipelines = validated(device, || {
            BLEND_MODES
                .iter()
                .map(|&mode| {
                    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                        label: Some("Display Pipeline"),
                        layout: Some(&pipeline_layout),
                        vertex: wgpu::VertexState {
                            module: &shader,
                            entry_point: Some("vs_main"),
                            buffers: &[],
                            compilation_options: Default::default(),
                        },
                        fragment: Some(wgpu::FragmentState {
                            module: &shader,
                            entry_point: Some("fs_main"),
                            targets: &[Some(wgpu::ColorTargetState {
                                format,
                                blend: Some(blend_state(mode)),
                                write_mask: wgpu::ColorWrites::ALL,
                            })],
                            compilation_options: Default::default(),
                        }),
                        primitive: wgpu::PrimitiveState::default(),
                        depth_stencil: None,
                        multisample: wgpu::MultisampleState::default(),
                        multiview: None,
                        cache: None,
                    });
                    (mode, pipeline)
                })
                .collect::<Vec<_>>()
        })?;

        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Display Uniforms"),
            size: std::mem::size_of::<DisplayUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            layout,
            pipelines,
            uniforms,
            format,
        })
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    fn pipeline(&self, mode: BlendMode) -> Option<&wgpu::RenderPipeline> {
        self.pipelines
            .iter()
            .find(|(m, _)| *m == mode)
            .map(|(_, p)| p)
    }

    /// Clear `view` to `clear` and blend `frame` over it.
    pub fn draw(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        frame: &RenderTarget,
        mode: BlendMode,
        clear: wgpu::Color,
    ) {
        let uniforms = DisplayUniforms {
            frame_size: frame.size(),
            _pad: [0; 2],
        };
        ctx.queue
            .write_buffer(&self.uniforms, 0, bytemuck::bytes_of(&uniforms));

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Display Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: frame.buffer.as_entire_binding(),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Display Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        if let Some(pipeline) = self.pipeline(mode) {
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_mode_has_a_blend_state() {
        for mode in BLEND_MODES {
            let state = blend_state(mode);
            assert_eq!(state.alpha, wgpu::BlendComponent::OVER);
        }
        assert_eq!(blend_state(BlendMode::Lighten).color.operation, wgpu::BlendOperation::Max);
        assert_eq!(blend_state(BlendMode::Normal), wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING);
    }
}
