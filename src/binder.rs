use glam::{Mat4, Vec2};
use rand::Rng;

use crate::device::{GpuSphere, SphereBuffer};
use crate::kernel::Kernel;
use crate::scene::{DirectionalLight, GroundMaterial};
use crate::texture::Texture;

/// Uniform block read by the kernel. Matches `TraceParams` in `raytrace.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TraceParams {
    pub camera_to_world: [[f32; 4]; 4],
    pub inverse_projection: [[f32; 4]; 4],
    pub pixel_offset: [f32; 2],
    pub reflection_depth: u32,
    pub sphere_count: u32,
    /// Forward direction in xyz, intensity in w.
    pub directional_light: [f32; 4],
    pub ground_albedo: [f32; 4],
    pub ground_specular: [f32; 4],
}

/// Everything the kernel needs for one frame, apart from device resources.
#[derive(Debug, Clone, Copy)]
pub struct FrameParameters {
    pub camera_to_world: Mat4,
    pub inverse_projection: Mat4,
    pub pixel_offset: Vec2,
    pub light: DirectionalLight,
    pub ground: GroundMaterial,
    pub reflection_depth: u32,
}

impl TraceParams {
    pub fn new(frame: &FrameParameters, sphere_count: u32) -> Self {
        Self {
            camera_to_world: frame.camera_to_world.to_cols_array_2d(),
            inverse_projection: frame.inverse_projection.to_cols_array_2d(),
            pixel_offset: frame.pixel_offset.to_array(),
            reflection_depth: frame.reflection_depth,
            sphere_count,
            directional_light: frame.light.packed().to_array(),
            ground_albedo: frame.ground.albedo_rgb().extend(0.0).to_array(),
            ground_specular: frame.ground.specular_rgb().extend(0.0).to_array(),
        }
    }
}

/// Sub-pixel ray offset in [0, 1)², drawn fresh every frame so the running
/// average supersamples each pixel.
pub fn pixel_jitter<R: Rng + ?Sized>(rng: &mut R) -> Vec2 {
    Vec2::new(rng.gen(), rng.gen())
}

pub struct ParameterBinder {
    params_buffer: wgpu::Buffer,
    /// Bound in place of the sphere buffer when the scene has no spheres.
    empty_spheres: wgpu::Buffer,
}

impl ParameterBinder {
    pub fn new(device: &wgpu::Device) -> Self {
        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Trace Params Buffer"),
            size: std::mem::size_of::<TraceParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let empty_spheres = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Empty Sphere Buffer"),
            size: GpuSphere::SIZE,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        Self {
            params_buffer,
            empty_spheres,
        }
    }

    /// Writes this frame's parameters and binds them, together with the
    /// environment map and sphere buffer, to the kernel.
    pub fn bind(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        kernel: &mut Kernel,
        frame: &FrameParameters,
        environment: &Texture,
        spheres: Option<&SphereBuffer>,
    ) {
        let (sphere_buffer, sphere_count) = match spheres {
            Some(spheres) => (&spheres.buffer, spheres.count),
            None => (&self.empty_spheres, 0),
        };

        queue.write_buffer(
            &self.params_buffer,
            0,
            bytemuck::bytes_of(&TraceParams::new(frame, sphere_count)),
        );

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: kernel.parameters_layout(),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: sphere_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&environment.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&environment.sampler),
                },
            ],
            label: Some("kernel_parameters"),
        });
        kernel.set_parameters(bind_group);
    }
}
