use crate::device::StorageTarget;
use crate::error::RenderError;
use crate::kernel::Kernel;
use crate::precondition;

/// Pixels per workgroup along each axis. Matches `@workgroup_size` in the kernel.
pub const TILE_SIZE: u32 = 8;

/// Workgroups needed to cover a `width` x `height` image.
pub fn workgroup_counts(width: u32, height: u32) -> (u32, u32) {
    (width.div_ceil(TILE_SIZE), height.div_ceil(TILE_SIZE))
}

/// Records one kernel launch writing a single sample per pixel into `raw`.
pub fn dispatch(
    device: &wgpu::Device,
    encoder: &mut wgpu::CommandEncoder,
    kernel: &Kernel,
    width: u32,
    height: u32,
    raw: &StorageTarget,
) -> Result<(), RenderError> {
    precondition!(
        let Some(parameters) = kernel.parameters(),
        "kernel dispatched before parameters were bound"
    );

    let output = device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout: kernel.output_layout(),
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::TextureView(&raw.view),
        }],
        label: Some("kernel_output"),
    });

    let (groups_x, groups_y) = workgroup_counts(width, height);
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some("Ray Trace Pass"),
    });
    pass.set_pipeline(kernel.pipeline());
    pass.set_bind_group(0, parameters, &[]);
    pass.set_bind_group(1, &output, &[]);
    pass.dispatch_workgroups(groups_x, groups_y, 1);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_hd_group_counts() {
        assert_eq!(workgroup_counts(1920, 1080), (240, 135));
    }

    #[test]
    fn single_pixel_needs_one_group() {
        assert_eq!(workgroup_counts(1, 1), (1, 1));
    }

    #[test]
    fn partial_tiles_round_up() {
        assert_eq!(workgroup_counts(8, 9), (1, 2));
        assert_eq!(workgroup_counts(1921, 7), (241, 1));
    }

    #[test]
    fn largest_extent_does_not_overflow() {
        assert_eq!(workgroup_counts(u32::MAX, u32::MAX), (536_870_912, 536_870_912));
    }
}
