use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const MIN_REFLECTION_DEPTH: u32 = 1;
pub const MAX_REFLECTION_DEPTH: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// User-adjustable renderer options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TracerConfig {
    pub reflection_depth: u32,
    pub ground_specular: f32,
    pub ground_albedo: f32,
    pub sphere_radius_range: [f32; 2],
    pub max_sphere_count: u32,
    pub placement_radius: f32,
    pub auto_regenerate_on_config_change: bool,
    pub seed: u64,
    pub light_direction: [f32; 3],
    pub light_intensity: f32,
    pub camera_position: [f32; 3],
    /// Degrees.
    pub camera_yaw: f32,
    /// Degrees.
    pub camera_pitch: f32,
    /// Vertical, in degrees.
    pub field_of_view: f32,
    pub environment_map: Option<PathBuf>,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            reflection_depth: 8,
            ground_specular: 0.6,
            ground_albedo: 0.8,
            sphere_radius_range: [3.0, 8.0],
            max_sphere_count: 100,
            placement_radius: 100.0,
            auto_regenerate_on_config_change: true,
            seed: 0,
            light_direction: [-0.4, -1.0, 0.6],
            light_intensity: 1.0,
            camera_position: [0.0, 40.0, 120.0],
            camera_yaw: 0.0,
            camera_pitch: -15.0,
            field_of_view: 60.0,
            environment_map: None,
        }
    }
}

impl TracerConfig {
    /// Loads the config from a JSON file, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_owned(),
                    source,
                })?;
                Self::from_json(&raw).map_err(|source| ConfigError::Parse {
                    path: path.to_owned(),
                    source,
                })?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_REFLECTION_DEPTH..=MAX_REFLECTION_DEPTH).contains(&self.reflection_depth) {
            return Err(ConfigError::Invalid(format!(
                "reflectionDepth must be in {MIN_REFLECTION_DEPTH}..={MAX_REFLECTION_DEPTH}, got {}",
                self.reflection_depth
            )));
        }
        if !is_unit(self.ground_specular) || !is_unit(self.ground_albedo) {
            return Err(ConfigError::Invalid(
                "groundSpecular and groundAlbedo must be in [0, 1]".into(),
            ));
        }

        let [min_radius, max_radius] = self.sphere_radius_range;
        if !min_radius.is_finite() || !max_radius.is_finite() {
            return Err(ConfigError::Invalid(
                "sphereRadiusRange must contain finite values".into(),
            ));
        }
        if min_radius < 0.0 || min_radius > max_radius {
            return Err(ConfigError::Invalid(format!(
                "sphereRadiusRange must satisfy 0 <= min <= max, got [{min_radius}, {max_radius}]"
            )));
        }

        if !self.placement_radius.is_finite() || self.placement_radius <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "placementRadius must be positive, got {}",
                self.placement_radius
            )));
        }

        let light = glam::Vec3::from(self.light_direction);
        if !light.is_finite() || light.length_squared() < 1e-8 {
            return Err(ConfigError::Invalid(
                "lightDirection must be a finite, non-zero vector".into(),
            ));
        }
        if !self.light_intensity.is_finite() || self.light_intensity < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "lightIntensity must be non-negative, got {}",
                self.light_intensity
            )));
        }

        if !glam::Vec3::from(self.camera_position).is_finite() {
            return Err(ConfigError::Invalid(
                "cameraPosition must contain finite values".into(),
            ));
        }
        if !(self.field_of_view > 0.0 && self.field_of_view < 180.0) {
            return Err(ConfigError::Invalid(format!(
                "fieldOfView must be in (0, 180), got {}",
                self.field_of_view
            )));
        }

        Ok(())
    }

    pub fn step_reflection_depth(&mut self, delta: i32) {
        let depth = self.reflection_depth as i32 + delta;
        self.reflection_depth =
            depth.clamp(MIN_REFLECTION_DEPTH as i32, MAX_REFLECTION_DEPTH as i32) as u32;
    }

    pub fn step_ground_albedo(&mut self, delta: f32) {
        self.ground_albedo = (self.ground_albedo + delta).clamp(0.0, 1.0);
    }

    pub fn step_ground_specular(&mut self, delta: f32) {
        self.ground_specular = (self.ground_specular + delta).clamp(0.0, 1.0);
    }
}

fn is_unit(value: f32) -> bool {
    (0.0..=1.0).contains(&value)
}
