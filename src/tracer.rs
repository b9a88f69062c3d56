use image::RgbaImage;
use rand::{rngs::StdRng, SeedableRng};
use wgpu::SurfaceError;
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent},
};

use crate::{
    accumulation::AccumulationCompositor,
    application::{AppState, Layer, Screen},
    binder::{pixel_jitter, FrameParameters, ParameterBinder},
    camera::{Camera, FreeLookController},
    config::TracerConfig,
    dispatch::dispatch,
    error::RenderError,
    kernel::Kernel,
    precondition,
    session::TraceSession,
    texture::{sky_gradient, Texture},
};

const SKY_WIDTH: u32 = 1024;
const SKY_HEIGHT: u32 = 512;
const GROUND_STEP: f32 = 0.05;

/// Everything the layer needs before the GPU is available.
pub struct TracerSettings {
    pub config: TracerConfig,
    pub environment: RgbaImage,
}

impl TracerSettings {
    /// Loads the configured environment map, or falls back to a gradient sky.
    pub fn load(config: TracerConfig) -> Result<Self, RenderError> {
        let environment = match &config.environment_map {
            Some(path) => image::open(path)?.to_rgba8(),
            None => sky_gradient(SKY_WIDTH, SKY_HEIGHT),
        };
        Ok(Self {
            config,
            environment,
        })
    }
}

/// A config edit made at runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ConfigEdit {
    ReflectionDepth(i32),
    GroundAlbedo(f32),
    GroundSpecular(f32),
    ToggleAutoRegenerate,
}

impl ConfigEdit {
    fn from_key(keycode: VirtualKeyCode) -> Option<Self> {
        match keycode {
            VirtualKeyCode::PageUp => Some(Self::ReflectionDepth(1)),
            VirtualKeyCode::PageDown => Some(Self::ReflectionDepth(-1)),
            VirtualKeyCode::RBracket => Some(Self::GroundAlbedo(GROUND_STEP)),
            VirtualKeyCode::LBracket => Some(Self::GroundAlbedo(-GROUND_STEP)),
            VirtualKeyCode::Apostrophe => Some(Self::GroundSpecular(GROUND_STEP)),
            VirtualKeyCode::Semicolon => Some(Self::GroundSpecular(-GROUND_STEP)),
            VirtualKeyCode::F1 => Some(Self::ToggleAutoRegenerate),
            _ => None,
        }
    }

    fn apply(self, config: &mut TracerConfig) {
        match self {
            Self::ReflectionDepth(delta) => config.step_reflection_depth(delta),
            Self::GroundAlbedo(delta) => config.step_ground_albedo(delta),
            Self::GroundSpecular(delta) => config.step_ground_specular(delta),
            Self::ToggleAutoRegenerate => {
                config.auto_regenerate_on_config_change = !config.auto_regenerate_on_config_change
            }
        }
    }
}

/// Renders one progressive sample per frame on top of a [`TraceSession`].
pub struct ProgressiveTracer {
    session: TraceSession<Screen>,
    camera: Camera,
    camera_controller: FreeLookController,

    kernel: Kernel,
    binder: ParameterBinder,
    compositor: AccumulationCompositor,
    environment: Texture,
    jitter_rng: StdRng,
}

impl ProgressiveTracer {
    fn encode_frame(
        &mut self,
        screen: &Screen,
        encoder: &mut wgpu::CommandEncoder,
        output: &wgpu::TextureView,
    ) -> Result<(), RenderError> {
        let (width, height) = screen.resolution();
        let scene = self.session.scene();
        let frame = FrameParameters {
            camera_to_world: self.camera.camera_to_world(),
            inverse_projection: self.camera.inverse_projection(),
            pixel_offset: pixel_jitter(&mut self.jitter_rng),
            light: scene.light,
            ground: scene.ground,
            reflection_depth: self.session.config().reflection_depth,
        };
        self.binder.bind(
            &screen.device,
            &screen.queue,
            &mut self.kernel,
            &frame,
            &self.environment,
            self.session.buffers().sphere_buffer(),
        );

        precondition!(
            let Some((targets, accumulation)) = self.session.frame_targets(),
            "frame encoded before the accumulation target exists"
        );
        dispatch(
            &screen.device,
            encoder,
            &self.kernel,
            width,
            height,
            &targets.raw,
        )?;
        self.compositor.composite(
            &screen.device,
            &screen.queue,
            encoder,
            targets,
            accumulation,
            output,
        );
        Ok(())
    }
}

impl Layer for ProgressiveTracer {
    type Settings = TracerSettings;
    type LayerErr = ();

    fn start(settings: TracerSettings, screen: &mut Screen, _app: &AppState) -> Self {
        let TracerSettings {
            config,
            environment,
        } = settings;
        let (width, height) = screen.resolution();

        let mut tracer = Self {
            camera: Camera::from_config(&config, width as f32 / height as f32),
            camera_controller: FreeLookController::new(40.0, 0.15),
            kernel: Kernel::new(&screen.device),
            binder: ParameterBinder::new(&screen.device),
            compositor: AccumulationCompositor::new(&screen.device, screen.config.format),
            environment: Texture::from_image(
                &screen.device,
                &screen.queue,
                &environment,
                Some("Environment Map"),
            ),
            jitter_rng: StdRng::seed_from_u64(config.seed),
            session: TraceSession::new(config),
        };
        tracer.session.regenerate_scene(screen);
        tracer
    }

    fn process_event(&mut self, event: &Event<()>, screen: &mut Screen) {
        if self.camera_controller.process_events(event) {
            return;
        }

        if let Event::WindowEvent {
            event:
                WindowEvent::KeyboardInput {
                    input:
                        KeyboardInput {
                            state: ElementState::Pressed,
                            virtual_keycode: Some(keycode),
                            ..
                        },
                    ..
                },
            ..
        } = event
        {
            if *keycode == VirtualKeyCode::R {
                self.session.regenerate_scene(screen);
            } else if let Some(edit) = ConfigEdit::from_key(*keycode) {
                self.session.edit_config(screen, |config| edit.apply(config));
            }
        }
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>, _app: &AppState, _screen: &mut Screen) {
        if new_size.width > 0 && new_size.height > 0 {
            self.camera
                .set_aspect(new_size.width as f32 / new_size.height as f32);
        }
    }

    fn update(&mut self, app: &AppState, _screen: &mut Screen) {
        self.camera_controller
            .update_camera(&mut self.camera, app.elapsed_time());
    }

    fn render(&mut self, _app: &AppState, screen: &mut Screen) -> Result<(), SurfaceError> {
        let (width, height) = screen.resolution();
        if let Err(error) = self
            .session
            .prepare_frame(screen, &mut self.camera, width, height)
        {
            tracing::warn!(%error, "skipping frame");
            return Ok(());
        }

        let output = screen.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = screen
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        if let Err(error) = self.encode_frame(screen, &mut encoder, &view) {
            tracing::warn!(%error, "skipping frame");
            return Ok(());
        }

        screen.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        tracing::trace!(
            samples = self.session.accumulation().sample_count(),
            "frame presented"
        );

        Ok(())
    }

    fn shutdown(&mut self, _app: &AppState, _screen: &mut Screen) -> Result<(), Self::LayerErr> {
        self.session.release();
        tracing::info!(
            samples = self.session.accumulation().sample_count(),
            "released device buffers, exiting"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edits_map_to_keys() {
        assert_eq!(
            ConfigEdit::from_key(VirtualKeyCode::PageUp),
            Some(ConfigEdit::ReflectionDepth(1))
        );
        assert_eq!(
            ConfigEdit::from_key(VirtualKeyCode::LBracket),
            Some(ConfigEdit::GroundAlbedo(-GROUND_STEP))
        );
        assert_eq!(ConfigEdit::from_key(VirtualKeyCode::W), None);
        assert_eq!(ConfigEdit::from_key(VirtualKeyCode::R), None);
    }

    #[test]
    fn edits_keep_config_valid() {
        let mut config = TracerConfig::default();
        for _ in 0..40 {
            ConfigEdit::ReflectionDepth(1).apply(&mut config);
            ConfigEdit::GroundAlbedo(GROUND_STEP).apply(&mut config);
            ConfigEdit::GroundSpecular(-GROUND_STEP).apply(&mut config);
        }
        assert!(config.validate().is_ok());
        assert_eq!(config.reflection_depth, 10);
        assert_eq!(config.ground_albedo, 1.0);
        assert_eq!(config.ground_specular, 0.0);
    }

    #[test]
    fn toggle_flips_auto_regenerate() {
        let mut config = TracerConfig::default();
        let before = config.auto_regenerate_on_config_change;
        ConfigEdit::ToggleAutoRegenerate.apply(&mut config);
        assert_eq!(config.auto_regenerate_on_config_change, !before);
    }

    #[test]
    fn default_settings_use_gradient_sky() {
        let settings = TracerSettings::load(TracerConfig::default()).unwrap();
        assert_eq!(settings.environment.dimensions(), (SKY_WIDTH, SKY_HEIGHT));
    }

    #[test]
    fn missing_environment_map_is_an_error() {
        let config = TracerConfig {
            environment_map: Some("/definitely/not/here.png".into()),
            ..Default::default()
        };
        assert!(matches!(
            TracerSettings::load(config),
            Err(RenderError::EnvironmentMap(_))
        ));
    }
}
