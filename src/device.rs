use crate::application::Screen;
use crate::error::RenderError;
use crate::scene::Sphere;

/// Device layout of a sphere: 10 floats, 40 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuSphere {
    pub position: [f32; 3],
    pub radius: f32,
    pub albedo: [f32; 3],
    pub specular: [f32; 3],
}

impl GpuSphere {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}

impl From<&Sphere> for GpuSphere {
    fn from(sphere: &Sphere) -> Self {
        Self {
            position: sphere.position.to_array(),
            radius: sphere.radius,
            albedo: sphere.albedo.to_array(),
            specular: sphere.specular.to_array(),
        }
    }
}

/// Format shared by the raw frame and the accumulation history. Full f32
/// channels keep small late-sample weights from rounding away.
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// A device allocation that can free itself.
pub trait DeviceResource {
    fn release(self);
}

/// Creates device resources. Implemented by [`Screen`], and by a counting
/// mock in tests.
pub trait DeviceAllocator {
    type SphereBuffer: DeviceResource;
    type Targets: DeviceResource;

    fn allocate_sphere_buffer(&self, count: usize) -> Result<Self::SphereBuffer, RenderError>;
    fn upload_spheres(&self, buffer: &Self::SphereBuffer, spheres: &[GpuSphere]);
    fn allocate_targets(&self, width: u32, height: u32) -> Result<Self::Targets, RenderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allocation {
    Reused,
    Reallocated,
}

struct Allocated<T> {
    len: usize,
    resource: T,
}

struct SizedTargets<T> {
    width: u32,
    height: u32,
    targets: T,
}

/// Owns the sphere buffer and the frame targets. Everything still held is
/// released when the manager is dropped.
pub struct DeviceBufferManager<A: DeviceAllocator> {
    spheres: Option<Allocated<A::SphereBuffer>>,
    targets: Option<SizedTargets<A::Targets>>,
}

impl<A: DeviceAllocator> Default for DeviceBufferManager<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: DeviceAllocator> DeviceBufferManager<A> {
    pub fn new() -> Self {
        Self {
            spheres: None,
            targets: None,
        }
    }

    /// Uploads the whole sphere list, reallocating when the element count
    /// changed. An empty list leaves no buffer behind.
    pub fn ensure_sphere_buffer(
        &mut self,
        allocator: &A,
        spheres: &[Sphere],
    ) -> Result<Option<&A::SphereBuffer>, RenderError> {
        let stale = self
            .spheres
            .as_ref()
            .map_or(true, |current| current.len != spheres.len());
        if stale {
            self.release_sphere_buffer();
            if spheres.is_empty() {
                return Ok(None);
            }
            let resource = allocator.allocate_sphere_buffer(spheres.len())?;
            tracing::info!(count = spheres.len(), "allocated sphere buffer");
            self.spheres = Some(Allocated {
                len: spheres.len(),
                resource,
            });
        }

        let packed: Vec<GpuSphere> = spheres.iter().map(GpuSphere::from).collect();
        Ok(self.spheres.as_ref().map(|current| {
            allocator.upload_spheres(&current.resource, &packed);
            &current.resource
        }))
    }

    pub fn sphere_buffer(&self) -> Option<&A::SphereBuffer> {
        self.spheres.as_ref().map(|current| &current.resource)
    }

    /// Makes sure the frame targets match the output resolution. On failure
    /// the previous targets stay in place.
    pub fn ensure_accumulation_target(
        &mut self,
        allocator: &A,
        width: u32,
        height: u32,
    ) -> Result<Allocation, RenderError> {
        if let Some(current) = &self.targets {
            if current.width == width && current.height == height {
                return Ok(Allocation::Reused);
            }
        }

        let targets = allocator.allocate_targets(width, height)?;
        if let Some(previous) = self.targets.take() {
            previous.targets.release();
        }
        tracing::info!(width, height, "allocated accumulation target");
        self.targets = Some(SizedTargets {
            width,
            height,
            targets,
        });
        Ok(Allocation::Reallocated)
    }

    pub fn accumulation_target(&self) -> Option<&A::Targets> {
        self.targets.as_ref().map(|current| &current.targets)
    }

    pub fn target_size(&self) -> Option<(u32, u32)> {
        self.targets
            .as_ref()
            .map(|current| (current.width, current.height))
    }

    /// Idempotent.
    pub fn release_sphere_buffer(&mut self) {
        if let Some(previous) = self.spheres.take() {
            previous.resource.release();
        }
    }

    /// Releases every device resource. Idempotent.
    pub fn release(&mut self) {
        self.release_sphere_buffer();
        if let Some(previous) = self.targets.take() {
            previous.targets.release();
        }
    }
}

impl<A: DeviceAllocator> Drop for DeviceBufferManager<A> {
    fn drop(&mut self) {
        self.release();
    }
}

pub struct SphereBuffer {
    pub buffer: wgpu::Buffer,
    pub count: u32,
}

impl DeviceResource for SphereBuffer {
    fn release(self) {
        self.buffer.destroy();
    }
}

pub struct StorageTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// The kernel's raw output and the two halves of the running average. Each
/// frame reads one history texture and writes the other.
pub struct FrameTargets {
    pub width: u32,
    pub height: u32,
    pub raw: StorageTarget,
    pub history: [StorageTarget; 2],
}

impl DeviceResource for FrameTargets {
    fn release(self) {
        self.raw.texture.destroy();
        for target in self.history {
            target.texture.destroy();
        }
    }
}

fn create_storage_target(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    label: &str,
) -> StorageTarget {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TARGET_FORMAT,
        usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    StorageTarget { texture, view }
}

/// Runs `allocate` inside an out-of-memory error scope.
fn scoped_allocation<T>(
    device: &wgpu::Device,
    what: &'static str,
    allocate: impl FnOnce() -> T,
) -> Result<T, RenderError> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let resource = allocate();
    match pollster::block_on(device.pop_error_scope()) {
        None => Ok(resource),
        Some(error) => Err(RenderError::Resource {
            what,
            message: error.to_string(),
        }),
    }
}

impl DeviceAllocator for Screen {
    type SphereBuffer = SphereBuffer;
    type Targets = FrameTargets;

    fn allocate_sphere_buffer(&self, count: usize) -> Result<SphereBuffer, RenderError> {
        let buffer = scoped_allocation(&self.device, "sphere buffer", || {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Sphere Buffer"),
                size: count as u64 * GpuSphere::SIZE,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })?;
        Ok(SphereBuffer {
            buffer,
            count: count as u32,
        })
    }

    fn upload_spheres(&self, buffer: &SphereBuffer, spheres: &[GpuSphere]) {
        self.queue
            .write_buffer(&buffer.buffer, 0, bytemuck::cast_slice(spheres));
    }

    fn allocate_targets(&self, width: u32, height: u32) -> Result<FrameTargets, RenderError> {
        scoped_allocation(&self.device, "frame targets", || FrameTargets {
            width,
            height,
            raw: create_storage_target(&self.device, width, height, "Raw Frame Target"),
            history: [
                create_storage_target(&self.device, width, height, "Accumulation Target A"),
                create_storage_target(&self.device, width, height, "Accumulation Target B"),
            ],
        })
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;

    #[derive(Debug, Default)]
    pub struct Counters {
        pub buffer_allocations: Cell<usize>,
        pub buffer_releases: Cell<usize>,
        pub uploads: RefCell<Vec<usize>>,
        pub target_allocations: Cell<usize>,
        pub target_releases: Cell<usize>,
    }

    /// Records every allocation and release; either kind of allocation can be
    /// switched to fail.
    #[derive(Default)]
    pub struct CountingAllocator {
        pub counters: Rc<Counters>,
        pub fail_spheres: Cell<bool>,
        pub fail_targets: Cell<bool>,
    }

    #[derive(Debug)]
    pub struct MockBuffer {
        pub id: usize,
        pub len: usize,
        counters: Rc<Counters>,
    }

    impl DeviceResource for MockBuffer {
        fn release(self) {
            let releases = &self.counters.buffer_releases;
            releases.set(releases.get() + 1);
        }
    }

    #[derive(Debug)]
    pub struct MockTargets {
        pub id: usize,
        counters: Rc<Counters>,
    }

    impl DeviceResource for MockTargets {
        fn release(self) {
            let releases = &self.counters.target_releases;
            releases.set(releases.get() + 1);
        }
    }

    fn out_of_memory(what: &'static str) -> RenderError {
        RenderError::Resource {
            what,
            message: "out of memory".into(),
        }
    }

    impl DeviceAllocator for CountingAllocator {
        type SphereBuffer = MockBuffer;
        type Targets = MockTargets;

        fn allocate_sphere_buffer(&self, count: usize) -> Result<MockBuffer, RenderError> {
            if self.fail_spheres.get() {
                return Err(out_of_memory("sphere buffer"));
            }
            let allocations = &self.counters.buffer_allocations;
            allocations.set(allocations.get() + 1);
            Ok(MockBuffer {
                id: allocations.get(),
                len: count,
                counters: Rc::clone(&self.counters),
            })
        }

        fn upload_spheres(&self, buffer: &MockBuffer, spheres: &[GpuSphere]) {
            assert_eq!(buffer.len, spheres.len());
            self.counters.uploads.borrow_mut().push(spheres.len());
        }

        fn allocate_targets(&self, _width: u32, _height: u32) -> Result<MockTargets, RenderError> {
            if self.fail_targets.get() {
                return Err(out_of_memory("frame targets"));
            }
            let allocations = &self.counters.target_allocations;
            allocations.set(allocations.get() + 1);
            Ok(MockTargets {
                id: allocations.get(),
                counters: Rc::clone(&self.counters),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::CountingAllocator;
    use super::*;

    fn spheres(count: usize) -> Vec<Sphere> {
        (0..count)
            .map(|i| Sphere {
                position: glam::Vec3::new(i as f32 * 10.0, 1.0, 0.0),
                radius: 1.0,
                albedo: glam::Vec3::ONE,
                specular: glam::Vec3::splat(0.04),
            })
            .collect()
    }

    #[test]
    fn gpu_sphere_is_forty_bytes() {
        assert_eq!(GpuSphere::SIZE, 40);
        let sphere = &spheres(1)[0];
        let packed = GpuSphere::from(sphere);
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&packed));
        assert_eq!(
            floats,
            &[0.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.04, 0.04, 0.04]
        );
    }

    #[test]
    fn targets_hold_full_precision_floats() {
        assert_eq!(TARGET_FORMAT, wgpu::TextureFormat::Rgba32Float);
    }

    #[test]
    fn equal_length_reuses_buffer() {
        let allocator = CountingAllocator::default();
        let mut manager = DeviceBufferManager::new();

        manager.ensure_sphere_buffer(&allocator, &spheres(3)).unwrap();
        let buffer = manager
            .ensure_sphere_buffer(&allocator, &spheres(3))
            .unwrap()
            .unwrap();

        assert_eq!(buffer.id, 1);
        let counters = &allocator.counters;
        assert_eq!(counters.buffer_allocations.get(), 1);
        assert_eq!(counters.buffer_releases.get(), 0);
        assert_eq!(*counters.uploads.borrow(), vec![3, 3]);
    }

    #[test]
    fn different_length_releases_then_reallocates() {
        let allocator = CountingAllocator::default();
        let mut manager = DeviceBufferManager::new();

        manager.ensure_sphere_buffer(&allocator, &spheres(3)).unwrap();
        let buffer = manager
            .ensure_sphere_buffer(&allocator, &spheres(5))
            .unwrap()
            .unwrap();

        assert_eq!((buffer.id, buffer.len), (2, 5));
        assert_eq!(allocator.counters.buffer_allocations.get(), 2);
        assert_eq!(allocator.counters.buffer_releases.get(), 1);
    }

    #[test]
    fn empty_scene_creates_no_buffer() {
        let allocator = CountingAllocator::default();
        let mut manager = DeviceBufferManager::new();

        manager.ensure_sphere_buffer(&allocator, &spheres(2)).unwrap();
        let buffer = manager.ensure_sphere_buffer(&allocator, &[]).unwrap();

        assert!(buffer.is_none());
        assert!(manager.sphere_buffer().is_none());
        let counters = &allocator.counters;
        assert_eq!(counters.buffer_allocations.get(), 1);
        assert_eq!(counters.buffer_releases.get(), 1);
        assert_eq!(*counters.uploads.borrow(), vec![2]);
    }

    #[test]
    fn failed_sphere_allocation_leaves_no_buffer_until_retried() {
        let allocator = CountingAllocator::default();
        let mut manager = DeviceBufferManager::new();
        manager.ensure_sphere_buffer(&allocator, &spheres(2)).unwrap();

        allocator.fail_spheres.set(true);
        let result = manager.ensure_sphere_buffer(&allocator, &spheres(4));

        assert!(matches!(result, Err(RenderError::Resource { .. })));
        assert!(manager.sphere_buffer().is_none());
        assert_eq!(allocator.counters.buffer_releases.get(), 1);

        allocator.fail_spheres.set(false);
        let buffer = manager
            .ensure_sphere_buffer(&allocator, &spheres(4))
            .unwrap()
            .unwrap();

        assert_eq!((buffer.id, buffer.len), (2, 4));
        assert_eq!(*allocator.counters.uploads.borrow(), vec![2, 4]);
    }

    #[test]
    fn release_is_idempotent() {
        let allocator = CountingAllocator::default();
        let mut manager: DeviceBufferManager<CountingAllocator> = DeviceBufferManager::new();

        manager.release();
        manager.ensure_sphere_buffer(&allocator, &spheres(1)).unwrap();
        manager
            .ensure_accumulation_target(&allocator, 4, 4)
            .unwrap();
        manager.release();
        manager.release();
        drop(manager);

        assert_eq!(allocator.counters.buffer_releases.get(), 1);
        assert_eq!(allocator.counters.target_releases.get(), 1);
    }

    #[test]
    fn dropping_the_manager_releases_everything() {
        let allocator = CountingAllocator::default();
        {
            let mut manager = DeviceBufferManager::new();
            manager.ensure_sphere_buffer(&allocator, &spheres(3)).unwrap();
            manager
                .ensure_accumulation_target(&allocator, 16, 16)
                .unwrap();
        }

        assert_eq!(allocator.counters.buffer_releases.get(), 1);
        assert_eq!(allocator.counters.target_releases.get(), 1);
    }

    #[test]
    fn target_follows_resolution() {
        let allocator = CountingAllocator::default();
        let mut manager = DeviceBufferManager::new();

        assert_eq!(
            manager.ensure_accumulation_target(&allocator, 800, 600).unwrap(),
            Allocation::Reallocated
        );
        assert_eq!(
            manager.ensure_accumulation_target(&allocator, 800, 600).unwrap(),
            Allocation::Reused
        );
        assert_eq!(
            manager.ensure_accumulation_target(&allocator, 1024, 600).unwrap(),
            Allocation::Reallocated
        );

        assert_eq!(manager.target_size(), Some((1024, 600)));
        assert_eq!(allocator.counters.target_allocations.get(), 2);
        assert_eq!(allocator.counters.target_releases.get(), 1);
    }

    #[test]
    fn failed_target_allocation_keeps_previous_target() {
        let allocator = CountingAllocator::default();
        let mut manager = DeviceBufferManager::new();
        manager.ensure_accumulation_target(&allocator, 64, 64).unwrap();

        allocator.fail_targets.set(true);
        let result = manager.ensure_accumulation_target(&allocator, 128, 128);

        assert!(matches!(result, Err(RenderError::Resource { .. })));
        assert_eq!(manager.target_size(), Some((64, 64)));
        assert_eq!(manager.accumulation_target().map(|targets| targets.id), Some(1));
        assert_eq!(allocator.counters.target_releases.get(), 0);
    }
}
