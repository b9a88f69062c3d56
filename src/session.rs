use crate::{
    accumulation::AccumulationState,
    camera::Camera,
    config::TracerConfig,
    device::{Allocation, DeviceAllocator, DeviceBufferManager},
    error::RenderError,
    invalidation::InvalidationMonitor,
    scene::{DirectionalLight, GroundMaterial, Scene, SceneGenerator},
};

/// Scene, accumulation and device-buffer state carried from frame to frame.
///
/// Decides when the running average starts over: scene regeneration, config
/// edits, camera changes and target reallocation all reset it.
pub struct TraceSession<A: DeviceAllocator> {
    config: TracerConfig,
    scene: Scene,
    /// Number of scenes generated so far; offsets the configured seed.
    generation: u64,
    spheres_pending: bool,
    monitor: InvalidationMonitor,
    accumulation: AccumulationState,
    buffers: DeviceBufferManager<A>,
}

impl<A: DeviceAllocator> TraceSession<A> {
    /// An empty session; call [`TraceSession::regenerate_scene`] to populate it.
    pub fn new(config: TracerConfig) -> Self {
        Self {
            scene: Scene::from_config(&config),
            config,
            generation: 0,
            spheres_pending: false,
            monitor: InvalidationMonitor::new(),
            accumulation: AccumulationState::new(),
            buffers: DeviceBufferManager::new(),
        }
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn spheres_pending(&self) -> bool {
        self.spheres_pending
    }

    pub fn accumulation(&self) -> &AccumulationState {
        &self.accumulation
    }

    pub fn buffers(&self) -> &DeviceBufferManager<A> {
        &self.buffers
    }

    /// The current frame targets together with the state that decides how
    /// the next sample is folded into them.
    pub fn frame_targets(&mut self) -> Option<(&A::Targets, &mut AccumulationState)> {
        let targets = self.buffers.accumulation_target()?;
        Some((targets, &mut self.accumulation))
    }

    /// Builds a new sphere field from the current config, restarts
    /// accumulation and uploads the spheres.
    pub fn regenerate_scene(&mut self, allocator: &A) {
        let seed = self.config.seed.wrapping_add(self.generation);
        self.generation += 1;

        let mut scene = Scene::from_config(&self.config);
        scene.spheres = SceneGenerator::from_config(&self.config).generate(seed);
        tracing::info!(
            seed,
            spheres = scene.spheres.len(),
            attempts = self.config.max_sphere_count,
            "regenerated scene"
        );
        self.scene = scene;

        self.accumulation.reset();
        self.spheres_pending = true;
        self.upload_spheres(allocator);
    }

    fn upload_spheres(&mut self, allocator: &A) {
        match self.buffers.ensure_sphere_buffer(allocator, &self.scene.spheres) {
            Ok(_) => self.spheres_pending = false,
            Err(error) => tracing::warn!(%error, "sphere upload failed, retrying next frame"),
        }
    }

    /// Applies a runtime config edit, then regenerates the scene or restarts
    /// accumulation depending on `autoRegenerateOnConfigChange`.
    pub fn edit_config(&mut self, allocator: &A, edit: impl FnOnce(&mut TracerConfig)) {
        edit(&mut self.config);
        tracing::info!(
            reflection_depth = self.config.reflection_depth,
            ground_albedo = self.config.ground_albedo,
            ground_specular = self.config.ground_specular,
            auto_regenerate = self.config.auto_regenerate_on_config_change,
            "config changed"
        );
        self.scene.ground = GroundMaterial {
            albedo: self.config.ground_albedo,
            specular: self.config.ground_specular,
        };
        self.scene.light = DirectionalLight {
            direction: glam::Vec3::from(self.config.light_direction),
            intensity: self.config.light_intensity,
        };

        if self.config.auto_regenerate_on_config_change {
            self.regenerate_scene(allocator);
        } else {
            self.monitor.invalidate();
        }
    }

    /// Everything that has to happen before the kernel runs: change
    /// detection, pending sphere uploads and target sizing. An error means
    /// the frame has to be skipped.
    pub fn prepare_frame(
        &mut self,
        allocator: &A,
        camera: &mut Camera,
        width: u32,
        height: u32,
    ) -> Result<(), RenderError> {
        if self.monitor.has_scene_or_camera_changed(camera) {
            tracing::debug!(
                samples = self.accumulation.sample_count(),
                "camera or scene changed, restarting accumulation"
            );
            self.accumulation.reset();
        }

        if self.spheres_pending {
            self.upload_spheres(allocator);
        }

        match self
            .buffers
            .ensure_accumulation_target(allocator, width, height)?
        {
            Allocation::Reallocated => self.accumulation.reset(),
            Allocation::Reused => {}
        }
        Ok(())
    }

    /// Releases every device resource. Idempotent.
    pub fn release(&mut self) {
        self.buffers.release();
    }
}
