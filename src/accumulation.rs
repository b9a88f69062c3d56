use wgpu::include_wgsl;

use crate::device::{FrameTargets, TARGET_FORMAT};
use crate::dispatch::workgroup_counts;
use crate::renderer::{ScreenQuad, Vertex};

/// One step of the running average for a single channel, exactly as the
/// accumulate kernel computes it: `sample * w + average * (1 - w)`.
///
/// With `w = 1 / (n + 1)` the result stays the mean of every sample since the
/// last reset, and `w = 1` discards the previous average entirely.
pub fn accumulate(average: f32, sample: f32, weight: f32) -> f32 {
    sample * weight + average * (1.0 - weight)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AccumulationState {
    sample_count: u32,
    /// History texture holding the current average.
    front: usize,
}

impl AccumulationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn reset(&mut self) {
        self.sample_count = 0;
    }

    /// Weight of the next sample. 1 for the first sample after a reset.
    pub fn blend_weight(&self) -> f32 {
        1.0 / (self.sample_count as f32 + 1.0)
    }

    /// `(read, write)` indices into the history pair for the next sample.
    pub fn history_indices(&self) -> (usize, usize) {
        (self.front, 1 - self.front)
    }

    pub fn advance(&mut self) {
        self.sample_count = self.sample_count.saturating_add(1);
        self.front = 1 - self.front;
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct AccumulateParams {
    weight: f32,
    _padding: [f32; 3],
}

pub struct AccumulationCompositor {
    accumulate_layout: wgpu::BindGroupLayout,
    accumulate_pipeline: wgpu::ComputePipeline,
    params_buffer: wgpu::Buffer,
    present_layout: wgpu::BindGroupLayout,
    present_pipeline: wgpu::RenderPipeline,
    quad: ScreenQuad,
}

fn texture_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
        },
        count: None,
    }
}

impl AccumulationCompositor {
    pub fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat) -> Self {
        let accumulate_shader =
            device.create_shader_module(include_wgsl!("asset/shader/accumulate.wgsl"));
        let present_shader =
            device.create_shader_module(include_wgsl!("asset/shader/composite.wgsl"));

        let accumulate_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                texture_entry(0, wgpu::ShaderStages::COMPUTE),
                texture_entry(1, wgpu::ShaderStages::COMPUTE),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: TARGET_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
            label: Some("accumulate_bind_group_layout"),
        });
        let accumulate_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Accumulate Pipeline Layout"),
                bind_group_layouts: &[&accumulate_layout],
                push_constant_ranges: &[],
            });
        let accumulate_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Accumulate Pipeline"),
            layout: Some(&accumulate_pipeline_layout),
            module: &accumulate_shader,
            entry_point: "main",
        });
        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Accumulate Params Buffer"),
            size: std::mem::size_of::<AccumulateParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let present_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[texture_entry(0, wgpu::ShaderStages::FRAGMENT)],
            label: Some("present_bind_group_layout"),
        });
        let present_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Present Pipeline Layout"),
            bind_group_layouts: &[&present_layout],
            push_constant_ranges: &[],
        });
        let present_pipeline = create_present_pipeline(
            device,
            &present_pipeline_layout,
            &present_shader,
            surface_format,
            "Present Pipeline",
        );

        Self {
            accumulate_layout,
            accumulate_pipeline,
            params_buffer,
            present_layout,
            present_pipeline,
            quad: ScreenQuad::new(device),
        }
    }

    /// Folds the raw frame into the running average, counts the sample and
    /// copies the new average onto `output`.
    pub fn composite(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        targets: &FrameTargets,
        state: &mut AccumulationState,
        output: &wgpu::TextureView,
    ) {
        let (read, write) = state.history_indices();
        let params = AccumulateParams {
            weight: state.blend_weight(),
            _padding: [0.0; 3],
        };
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));

        let accumulate_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.accumulate_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&targets.raw.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&targets.history[read].view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&targets.history[write].view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.params_buffer.as_entire_binding(),
                },
            ],
            label: Some("accumulate_bind_group"),
        });
        {
            let (groups_x, groups_y) = workgroup_counts(targets.width, targets.height);
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Accumulate Pass"),
            });
            pass.set_pipeline(&self.accumulate_pipeline);
            pass.set_bind_group(0, &accumulate_bind_group, &[]);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        state.advance();

        let present_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.present_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&targets.history[write].view),
            }],
            label: Some("present_bind_group"),
        });
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Present Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: true,
                },
            })],
            depth_stencil_attachment: None,
        });
        render_pass.set_pipeline(&self.present_pipeline);
        render_pass.set_bind_group(0, &present_bind_group, &[]);
        self.quad.draw(&mut render_pass);
    }
}

fn create_present_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    label: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: "vs_main",
            buffers: &[Vertex::layout()],
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: "fs_main",
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
    })
}
