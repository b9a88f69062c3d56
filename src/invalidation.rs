use crate::camera::Camera;

/// Decides once per frame whether accumulation has to start over.
///
/// Camera changes are read from the camera's own change flag; other edits
/// (config changes, resizes) are reported through [`InvalidationMonitor::invalidate`].
/// Both flags are cleared when read, so each change is observed exactly once.
#[derive(Debug, Default)]
pub struct InvalidationMonitor {
    scene_changed: bool,
}

impl InvalidationMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&mut self) {
        self.scene_changed = true;
    }

    pub fn has_scene_or_camera_changed(&mut self, camera: &mut Camera) -> bool {
        let camera_changed = camera.take_changed();
        let scene_changed = std::mem::take(&mut self.scene_changed);
        camera_changed || scene_changed
    }
}
