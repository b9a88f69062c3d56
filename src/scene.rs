use glam::{Vec3, Vec4};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::config::TracerConfig;

/// Specular reflectance given to non-metal spheres.
pub const DIELECTRIC_SPECULAR: f32 = 0.04;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub position: Vec3,
    pub radius: f32,

    pub albedo: Vec3,
    pub specular: Vec3,
}

impl Sphere {
    pub fn overlaps(&self, other: &Sphere) -> bool {
        let min_distance = self.radius + other.radius;
        self.position.distance_squared(other.position) < min_distance * min_distance
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels in.
    pub direction: Vec3,
    pub intensity: f32,
}

impl DirectionalLight {
    /// Forward direction in xyz, intensity in w.
    pub fn packed(&self) -> Vec4 {
        self.direction.normalize_or_zero().extend(self.intensity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundMaterial {
    pub albedo: f32,
    pub specular: f32,
}

impl GroundMaterial {
    pub fn albedo_rgb(&self) -> Vec3 {
        Vec3::splat(self.albedo)
    }

    pub fn specular_rgb(&self) -> Vec3 {
        Vec3::splat(self.specular)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub spheres: Vec<Sphere>,
    pub light: DirectionalLight,
    pub ground: GroundMaterial,
}

impl Scene {
    /// A scene with the configured light and ground but no spheres yet.
    pub fn from_config(config: &TracerConfig) -> Self {
        Self {
            spheres: Vec::new(),
            light: DirectionalLight {
                direction: Vec3::from(config.light_direction),
                intensity: config.light_intensity,
            },
            ground: GroundMaterial {
                albedo: config.ground_albedo,
                specular: config.ground_specular,
            },
        }
    }
}

/// Random sphere field placement.
///
/// Every attempt draws a candidate resting on the ground plane inside the
/// placement disk. Candidates overlapping an accepted sphere are dropped, so
/// `max_count` bounds the attempts rather than the number of spheres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneGenerator {
    pub max_count: u32,
    pub min_radius: f32,
    pub max_radius: f32,
    pub placement_radius: f32,
}

impl SceneGenerator {
    pub fn from_config(config: &TracerConfig) -> Self {
        let [min_radius, max_radius] = config.sphere_radius_range;
        Self {
            max_count: config.max_sphere_count,
            min_radius,
            max_radius,
            placement_radius: config.placement_radius,
        }
    }

    pub fn generate(&self, seed: u64) -> Vec<Sphere> {
        self.generate_with(&mut StdRng::seed_from_u64(seed))
    }

    pub fn generate_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Sphere> {
        let mut spheres: Vec<Sphere> = Vec::new();

        for _ in 0..self.max_count {
            let radius = self.min_radius + rng.gen::<f32>() * (self.max_radius - self.min_radius);
            let planar = sample_disk(rng) * self.placement_radius;
            let position = Vec3::new(planar.x, radius, planar.y);

            // Material draws happen before the overlap test so that the
            // number of values consumed per attempt does not depend on it.
            let color = random_color(rng);
            let metal = rng.gen::<f32>() < 0.5;

            if radius <= 0.0 {
                continue;
            }

            let (albedo, specular) = if metal {
                (Vec3::ZERO, color)
            } else {
                (color, Vec3::splat(DIELECTRIC_SPECULAR))
            };
            let candidate = Sphere {
                position,
                radius,
                albedo,
                specular,
            };

            if spheres.iter().any(|other| candidate.overlaps(other)) {
                continue;
            }
            spheres.push(candidate);
        }

        spheres
    }
}

/// Uniform point in the unit disk, returned as (x, z).
fn sample_disk<R: Rng + ?Sized>(rng: &mut R) -> glam::Vec2 {
    let r = rng.gen::<f32>().sqrt();
    let theta = rng.gen::<f32>() * std::f32::consts::TAU;
    glam::Vec2::new(r * theta.cos(), r * theta.sin())
}

/// Uniform hue, saturation and value, returned in linear RGB.
fn random_color<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    let hsv = Vec3::new(rng.gen(), rng.gen(), rng.gen());
    let srgb = hsv_to_rgb(hsv.x, hsv.y, hsv.z);
    Vec3::new(
        srgb_to_linear(srgb.x),
        srgb_to_linear(srgb.y),
        srgb_to_linear(srgb.z),
    )
}

pub fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> Vec3 {
    let h = hue.rem_euclid(1.0) * 6.0;
    let chroma = value * saturation;
    let x = chroma * (1.0 - ((h % 2.0) - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = value - chroma;
    Vec3::new(r + m, g + m, b + m)
}

pub fn srgb_to_linear(channel: f32) -> f32 {
    if channel <= 0.04045 {
        channel / 12.92
    } else {
        ((channel + 0.055) / 1.055).powf(2.4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> SceneGenerator {
        SceneGenerator {
            max_count: 200,
            min_radius: 1.0,
            max_radius: 6.0,
            placement_radius: 60.0,
        }
    }

    #[test]
    fn generated_spheres_never_overlap() {
        for seed in 0..8 {
            let spheres = generator().generate(seed);
            assert!(!spheres.is_empty());
            for (i, a) in spheres.iter().enumerate() {
                for b in &spheres[i + 1..] {
                    let distance = a.position.distance(b.position);
                    assert!(
                        distance >= a.radius + b.radius - 1e-4,
                        "seed {seed}: {a:?} overlaps {b:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn spheres_rest_on_ground_inside_placement_disk() {
        let generator = generator();
        for sphere in generator.generate(7) {
            assert_eq!(sphere.position.y, sphere.radius);
            assert!(sphere.radius >= generator.min_radius && sphere.radius <= generator.max_radius);
            let planar = glam::Vec2::new(sphere.position.x, sphere.position.z);
            assert!(planar.length() <= generator.placement_radius + 1e-3);
        }
    }

    #[test]
    fn materials_are_metal_or_dielectric() {
        let spheres = generator().generate(3);
        let mut metals = 0;
        let mut dielectrics = 0;
        for sphere in &spheres {
            if sphere.albedo == Vec3::ZERO {
                metals += 1;
            } else {
                assert_eq!(sphere.specular, Vec3::splat(DIELECTRIC_SPECULAR));
                dielectrics += 1;
            }
            let color = sphere.albedo + sphere.specular;
            assert!(color.cmpge(Vec3::ZERO).all() && color.cmple(Vec3::splat(1.05)).all());
        }
        assert!(metals > 0 && dielectrics > 0);
    }

    #[test]
    fn same_seed_is_reproducible() {
        let generator = generator();
        assert_eq!(generator.generate(11), generator.generate(11));
        assert_ne!(generator.generate(11), generator.generate(12));
    }

    #[test]
    fn zero_count_yields_empty_scene() {
        let generator = SceneGenerator {
            max_count: 0,
            ..generator()
        };
        assert!(generator.generate(0).is_empty());
    }

    #[test]
    fn attempt_budget_bounds_the_loop() {
        // Every candidate overlaps the first one accepted.
        let generator = SceneGenerator {
            max_count: 50,
            min_radius: 10.0,
            max_radius: 10.0,
            placement_radius: 1.0,
        };
        assert_eq!(generator.generate(5).len(), 1);
    }

    #[test]
    fn zero_radius_candidates_are_dropped() {
        let generator = SceneGenerator {
            max_count: 20,
            min_radius: 0.0,
            max_radius: 0.0,
            placement_radius: 10.0,
        };
        assert!(generator.generate(1).is_empty());
    }

    #[test]
    fn hsv_primaries() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), Vec3::new(1.0, 0.0, 0.0));
        assert!(hsv_to_rgb(1.0 / 3.0, 1.0, 1.0).abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-5));
        assert!(hsv_to_rgb(2.0 / 3.0, 1.0, 1.0).abs_diff_eq(Vec3::new(0.0, 0.0, 1.0), 1e-5));
        assert_eq!(hsv_to_rgb(0.5, 0.0, 0.25), Vec3::splat(0.25));
    }

    #[test]
    fn srgb_endpoints_map_to_linear_endpoints() {
        assert_eq!(srgb_to_linear(0.0), 0.0);
        assert!((srgb_to_linear(1.0) - 1.0).abs() < 1e-6);
        assert!(srgb_to_linear(0.5) < 0.5);
    }

    #[test]
    fn light_packs_direction_and_intensity() {
        let light = DirectionalLight {
            direction: Vec3::new(0.0, -2.0, 0.0),
            intensity: 1.5,
        };
        assert_eq!(light.packed(), Vec4::new(0.0, -1.0, 0.0, 1.5));
    }
}
