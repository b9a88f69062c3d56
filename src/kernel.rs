use wgpu::include_wgsl;

use crate::device::TARGET_FORMAT;

/// The ray tracing compute kernel and the state bound to it for the current
/// frame.
///
/// Group 0 holds the per-frame parameters, group 1 the output image.
pub struct Kernel {
    pipeline: wgpu::ComputePipeline,
    parameters_layout: wgpu::BindGroupLayout,
    output_layout: wgpu::BindGroupLayout,
    parameters: Option<wgpu::BindGroup>,
}

impl Kernel {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(include_wgsl!("asset/shader/raytrace.wgsl"));

        let parameters_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
            label: Some("kernel_parameters_layout"),
        });

        let output_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: TARGET_FORMAT,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            }],
            label: Some("kernel_output_layout"),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Kernel Pipeline Layout"),
            bind_group_layouts: &[&parameters_layout, &output_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Ray Trace Kernel"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "main",
        });

        Self {
            pipeline,
            parameters_layout,
            output_layout,
            parameters: None,
        }
    }

    pub fn pipeline(&self) -> &wgpu::ComputePipeline {
        &self.pipeline
    }

    pub fn parameters_layout(&self) -> &wgpu::BindGroupLayout {
        &self.parameters_layout
    }

    pub fn output_layout(&self) -> &wgpu::BindGroupLayout {
        &self.output_layout
    }

    pub fn parameters(&self) -> Option<&wgpu::BindGroup> {
        self.parameters.as_ref()
    }

    pub fn set_parameters(&mut self, parameters: wgpu::BindGroup) {
        self.parameters = Some(parameters);
    }
}
