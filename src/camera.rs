use winit::event::{
    DeviceEvent, ElementState, Event, KeyboardInput, MouseButton, VirtualKeyCode, WindowEvent,
};

use crate::config::TracerConfig;

const MAX_PITCH: f32 = 89.0;
const MIN_FOV: f32 = 1.0;
const MAX_FOV: f32 = 179.0;

/// A perspective camera looking down its local -Z axis.
///
/// Every setter that changes the transform or projection raises a change flag
/// that [`Camera::take_changed`] reads and clears.
#[derive(Debug, Clone)]
pub struct Camera {
    position: glam::Vec3,
    /// Degrees, around +Y.
    yaw: f32,
    /// Degrees, around +X.
    pitch: f32,
    fov_y: f32,
    aspect: f32,
    z_near: f32,
    z_far: f32,
    changed: bool,
}

impl Camera {
    pub fn new(position: glam::Vec3, yaw: f32, pitch: f32, fov_y: f32, aspect: f32) -> Self {
        Self {
            position,
            yaw,
            pitch: pitch.clamp(-MAX_PITCH, MAX_PITCH),
            fov_y: fov_y.clamp(MIN_FOV, MAX_FOV),
            aspect,
            z_near: 0.1,
            z_far: 1000.0,
            changed: true,
        }
    }

    pub fn from_config(config: &TracerConfig, aspect: f32) -> Self {
        Self::new(
            glam::Vec3::from(config.camera_position),
            config.camera_yaw,
            config.camera_pitch,
            config.field_of_view,
            aspect,
        )
    }

    pub fn position(&self) -> glam::Vec3 {
        self.position
    }

    pub fn fov_y(&self) -> f32 {
        self.fov_y
    }

    pub fn rotation(&self) -> glam::Quat {
        glam::Quat::from_euler(
            glam::EulerRot::YXZ,
            self.yaw.to_radians(),
            self.pitch.to_radians(),
            0.0,
        )
    }

    pub fn camera_to_world(&self) -> glam::Mat4 {
        glam::Mat4::from_rotation_translation(self.rotation(), self.position)
    }

    pub fn projection(&self) -> glam::Mat4 {
        glam::Mat4::perspective_rh(
            self.fov_y.to_radians(),
            self.aspect,
            self.z_near,
            self.z_far,
        )
    }

    pub fn inverse_projection(&self) -> glam::Mat4 {
        self.projection().inverse()
    }

    /// Moves along the camera's local axes.
    pub fn translate_local(&mut self, offset: glam::Vec3) {
        if offset != glam::Vec3::ZERO {
            self.position += self.rotation() * offset;
            self.changed = true;
        }
    }

    pub fn rotate(&mut self, yaw_delta: f32, pitch_delta: f32) {
        if yaw_delta != 0.0 || pitch_delta != 0.0 {
            self.yaw = (self.yaw + yaw_delta).rem_euclid(360.0);
            self.pitch = (self.pitch + pitch_delta).clamp(-MAX_PITCH, MAX_PITCH);
            self.changed = true;
        }
    }

    pub fn set_fov_y(&mut self, fov_y: f32) {
        let fov_y = fov_y.clamp(MIN_FOV, MAX_FOV);
        if fov_y != self.fov_y {
            self.fov_y = fov_y;
            self.changed = true;
        }
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect != self.aspect {
            self.aspect = aspect;
            self.changed = true;
        }
    }

    /// Whether the camera changed since the last call.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct MoveKeys {
    forward: bool,
    back: bool,
    left: bool,
    right: bool,
    up: bool,
    down: bool,
    widen: bool,
    narrow: bool,
}

/// Free-look controller: right mouse drag to look, WASD/Space/Shift to fly,
/// Q/E to change the field of view, L to lock the view.
pub struct FreeLookController {
    pub speed: f32,
    pub sensitivity: f32,
    pub fov_speed: f32,
    keys: MoveKeys,
    looking: bool,
    locked: bool,
    mouse_delta: glam::Vec2,
}

impl FreeLookController {
    pub fn new(speed: f32, sensitivity: f32) -> Self {
        Self {
            speed,
            sensitivity,
            fov_speed: 20.0,
            keys: MoveKeys::default(),
            looking: false,
            locked: false,
            mouse_delta: glam::Vec2::ZERO,
        }
    }

    /// Returns whether the event was consumed.
    pub fn process_events(&mut self, event: &Event<()>) -> bool {
        match event {
            Event::DeviceEvent {
                event: DeviceEvent::MouseMotion { delta },
                ..
            } => {
                if self.looking && !self.locked {
                    self.mouse_delta += glam::Vec2::new(delta.0 as f32, delta.1 as f32);
                }
                self.looking
            }
            Event::WindowEvent {
                event:
                    WindowEvent::MouseInput {
                        state,
                        button: MouseButton::Right,
                        ..
                    },
                ..
            } => {
                self.looking = *state == ElementState::Pressed;
                true
            }
            Event::WindowEvent {
                event:
                    WindowEvent::KeyboardInput {
                        input:
                            KeyboardInput {
                                state,
                                virtual_keycode: Some(keycode),
                                ..
                            },
                        ..
                    },
                ..
            } => {
                let pressed = *state == ElementState::Pressed;
                match keycode {
                    VirtualKeyCode::W => self.keys.forward = pressed,
                    VirtualKeyCode::S => self.keys.back = pressed,
                    VirtualKeyCode::A => self.keys.left = pressed,
                    VirtualKeyCode::D => self.keys.right = pressed,
                    VirtualKeyCode::Space => self.keys.up = pressed,
                    VirtualKeyCode::LShift => self.keys.down = pressed,
                    VirtualKeyCode::Q => self.keys.widen = pressed,
                    VirtualKeyCode::E => self.keys.narrow = pressed,
                    VirtualKeyCode::L if pressed => {
                        self.locked = !self.locked;
                        tracing::info!(locked = self.locked, "camera look lock");
                    }
                    _ => return false,
                }
                true
            }
            _ => false,
        }
    }

    /// Applies input gathered since the last frame.
    pub fn update_camera(&mut self, camera: &mut Camera, elapsed: f32) {
        let delta = std::mem::take(&mut self.mouse_delta) * self.sensitivity;
        camera.rotate(-delta.x, -delta.y);

        let axis = |positive: bool, negative: bool| (positive as i32 - negative as i32) as f32;
        let direction = glam::Vec3::new(
            axis(self.keys.right, self.keys.left),
            axis(self.keys.up, self.keys.down),
            axis(self.keys.back, self.keys.forward),
        );
        camera.translate_local(direction.normalize_or_zero() * self.speed * elapsed);

        let zoom = axis(self.keys.widen, self.keys.narrow);
        if zoom != 0.0 {
            camera.set_fov_y(camera.fov_y() + zoom * self.fov_speed * elapsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        let mut camera = Camera::new(glam::Vec3::new(0.0, 1.0, 5.0), 0.0, 0.0, 60.0, 1.0);
        camera.take_changed();
        camera
    }

    #[test]
    fn new_camera_reports_a_change_once() {
        let mut camera = Camera::new(glam::Vec3::ZERO, 0.0, 0.0, 60.0, 1.0);
        assert!(camera.take_changed());
        assert!(!camera.take_changed());
    }

    #[test]
    fn transform_edits_raise_change_flag() {
        let mut camera = camera();

        camera.rotate(0.0, 0.0);
        camera.translate_local(glam::Vec3::ZERO);
        assert!(!camera.take_changed());

        camera.translate_local(glam::Vec3::X);
        assert!(camera.take_changed());
        assert!(!camera.take_changed());

        camera.rotate(10.0, 0.0);
        assert!(camera.take_changed());

        camera.set_fov_y(camera.fov_y());
        assert!(!camera.take_changed());
        camera.set_fov_y(45.0);
        assert!(camera.take_changed());
    }

    #[test]
    fn identity_orientation_looks_down_negative_z() {
        let camera = camera();
        let forward = camera.camera_to_world().transform_vector3(-glam::Vec3::Z);
        assert!(forward.abs_diff_eq(-glam::Vec3::Z, 1e-6));
        let origin = camera.camera_to_world().transform_point3(glam::Vec3::ZERO);
        assert_eq!(origin, camera.position());
    }

    #[test]
    fn inverse_projection_unprojects_screen_center_forward() {
        let camera = camera();
        let view = camera.inverse_projection() * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        let direction = (view.truncate() / view.w).normalize();
        assert!(direction.abs_diff_eq(-glam::Vec3::Z, 1e-5));
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = camera();
        camera.rotate(0.0, 500.0);
        let up = camera.camera_to_world().transform_vector3(-glam::Vec3::Z);
        assert!(up.y > 0.99);
        assert!(up.y < 1.0);
    }

    #[test]
    fn controller_moves_camera_forward() {
        let mut controller = FreeLookController::new(10.0, 0.1);
        let mut camera = camera();
        controller.keys.forward = true;

        controller.update_camera(&mut camera, 0.5);

        assert!(camera.position().abs_diff_eq(glam::Vec3::new(0.0, 1.0, 0.0), 1e-5));
        assert!(camera.take_changed());
    }

    #[test]
    fn idle_controller_leaves_camera_untouched() {
        let mut controller = FreeLookController::new(10.0, 0.1);
        let mut camera = camera();
        controller.update_camera(&mut camera, 0.016);
        assert!(!camera.take_changed());
    }
}
