//! Ground surface the rigs walk on.
//! Uses deterministic noise so the same seed always produces the same hills.
//!
//! Scale: 1 unit = 1 meter
//! - A standing rig is roughly 1m from body center to ground
//! - Hills are gentle (a few meters) so gait and jump arcs stay readable

use bevy::prelude::*;
use noise::{NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

/// Default world seed - same seed = same ground.
pub const WORLD_SEED: u32 = 42;

/// Maximum height variation of the rolling hills (meters).
pub const MAX_HEIGHT: f32 = 4.0;

/// Base height offset.
pub const BASE_HEIGHT: f32 = 0.0;

/// March step used when intersecting rays with the heightfield.
const RAY_MARCH_STEP: f32 = 0.1;

/// Bisection iterations used to refine a heightfield hit.
const RAY_REFINE_ITERATIONS: usize = 8;

/// How the ground is produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TerrainSource {
    /// Infinite horizontal plane at a fixed height.
    Flat { height: f32 },
    /// Perlin hills generated from a seed.
    Hills { seed: u32 },
}

impl Default for TerrainSource {
    fn default() -> Self {
        TerrainSource::Hills { seed: WORLD_SEED }
    }
}

/// Terrain generator using Perlin noise
pub struct TerrainGenerator {
    height_noise: Perlin,
    detail_noise: Perlin,
}

impl TerrainGenerator {
    pub fn new(seed: u32) -> Self {
        Self {
            height_noise: Perlin::new(seed),
            detail_noise: Perlin::new(seed.wrapping_add(3000)),
        }
    }

    /// Get terrain height at a world position
    pub fn get_height(&self, x: f32, z: f32) -> f32 {
        // Broad rolling hills
        let base_scale = 0.02;
        let base = self.height_noise.get([x as f64 * base_scale, z as f64 * base_scale]) as f32;
        let hills = (base * 0.5 + 0.5) * MAX_HEIGHT;

        // Small bumps so feet don't all land at the same height
        let detail_scale = 0.3;
        let detail = self.detail_noise.get([x as f64 * detail_scale, z as f64 * detail_scale]) as f32 * 0.05;

        BASE_HEIGHT + hills + detail + self.get_ledge_height(x, z)
    }

    /// A raised ledge near spawn for exercising jump waypoints.
    fn get_ledge_height(&self, x: f32, z: f32) -> f32 {
        let ledge_min = Vec2::new(8.0, -3.0);
        let ledge_max = Vec2::new(12.0, 3.0);
        let ledge_height = 1.2;

        if x >= ledge_min.x && x <= ledge_max.x && z >= ledge_min.y && z <= ledge_max.y {
            ledge_height
        } else {
            0.0
        }
    }
}

/// Resource holding the ground surface
#[derive(Resource)]
pub struct WorldTerrain {
    source: TerrainSource,
    generator: Option<TerrainGenerator>,
}

impl Default for WorldTerrain {
    fn default() -> Self {
        Self::new(TerrainSource::default())
    }
}

impl WorldTerrain {
    pub fn new(source: TerrainSource) -> Self {
        let generator = match source {
            TerrainSource::Flat { .. } => None,
            TerrainSource::Hills { seed } => Some(TerrainGenerator::new(seed)),
        };
        Self { source, generator }
    }

    /// Flat plane, handy for tests and calibration scenarios.
    pub fn flat(height: f32) -> Self {
        Self::new(TerrainSource::Flat { height })
    }

    pub fn source(&self) -> TerrainSource {
        self.source
    }

    /// Get terrain height at a world position
    pub fn get_height(&self, x: f32, z: f32) -> f32 {
        match (&self.source, &self.generator) {
            (TerrainSource::Flat { height }, _) => *height,
            (_, Some(generator)) => generator.get_height(x, z),
            (_, None) => BASE_HEIGHT,
        }
    }

    /// Get the terrain normal at a world position
    pub fn get_normal(&self, x: f32, z: f32) -> Vec3 {
        if let TerrainSource::Flat { .. } = self.source {
            return Vec3::Y;
        }

        // Sample heights in a small cross pattern around the point
        let sample_dist = 0.25;
        let h_left = self.get_height(x - sample_dist, z);
        let h_right = self.get_height(x + sample_dist, z);
        let h_back = self.get_height(x, z - sample_dist);
        let h_front = self.get_height(x, z + sample_dist);

        let dx = (h_right - h_left) / (2.0 * sample_dist);
        let dz = (h_front - h_back) / (2.0 * sample_dist);

        // normal = (-dx, 1, -dz) normalized
        Vec3::new(-dx, 1.0, -dz).normalize()
    }

    /// Intersect a ray with the heightfield.
    ///
    /// Returns the distance along `dir` (assumed normalized) to the first point at or below
    /// the surface, or `None` if the ray stays above ground for `max_distance`.
    pub fn raycast(&self, origin: Vec3, dir: Vec3, max_distance: f32) -> Option<f32> {
        self.march(origin, dir, max_distance, 0.0)
    }

    /// Sweep a sphere along a ray against the heightfield.
    ///
    /// The sphere is treated as touching when its lowest point reaches the surface
    /// directly below its center, which is accurate enough for gentle hills.
    pub fn spherecast(&self, origin: Vec3, radius: f32, dir: Vec3, max_distance: f32) -> Option<f32> {
        self.march(origin, dir, max_distance, radius)
    }

    fn march(&self, origin: Vec3, dir: Vec3, max_distance: f32, clearance: f32) -> Option<f32> {
        let below = |t: f32| {
            let p = origin + dir * t;
            p.y - clearance <= self.get_height(p.x, p.z)
        };

        if below(0.0) {
            return Some(0.0);
        }

        let mut prev = 0.0;
        let mut t = RAY_MARCH_STEP.min(max_distance);
        while t <= max_distance {
            if below(t) {
                // Refine between the last point above ground and this one
                let (mut lo, mut hi) = (prev, t);
                for _ in 0..RAY_REFINE_ITERATIONS {
                    let mid = (lo + hi) * 0.5;
                    if below(mid) {
                        hi = mid;
                    } else {
                        lo = mid;
                    }
                }
                return Some(hi);
            }
            prev = t;
            if t >= max_distance {
                break;
            }
            t = (t + RAY_MARCH_STEP).min(max_distance);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_raycast_down() {
        let terrain = WorldTerrain::flat(1.0);
        let hit = terrain.raycast(Vec3::new(0.0, 3.0, 0.0), Vec3::NEG_Y, 5.0);
        let distance = hit.expect("ray should hit the plane");
        assert!((distance - 2.0).abs() < 0.01);
    }

    #[test]
    fn test_raycast_misses_when_short() {
        let terrain = WorldTerrain::flat(0.0);
        assert!(terrain.raycast(Vec3::new(0.0, 3.0, 0.0), Vec3::NEG_Y, 1.0).is_none());
    }

    #[test]
    fn test_spherecast_hits_earlier_than_ray() {
        let terrain = WorldTerrain::flat(0.0);
        let origin = Vec3::new(0.0, 2.0, 0.0);
        let ray = terrain.raycast(origin, Vec3::NEG_Y, 5.0).unwrap();
        let sphere = terrain.spherecast(origin, 0.25, Vec3::NEG_Y, 5.0).unwrap();
        assert!(sphere < ray);
        assert!((ray - sphere - 0.25).abs() < 0.01);
    }

    #[test]
    fn test_hills_are_deterministic() {
        let a = WorldTerrain::new(TerrainSource::Hills { seed: 7 });
        let b = WorldTerrain::new(TerrainSource::Hills { seed: 7 });
        assert_eq!(a.get_height(12.5, -3.0), b.get_height(12.5, -3.0));
        let n = a.get_normal(4.0, 4.0);
        assert!(n.y > 0.0);
        assert!((n.length() - 1.0).abs() < 1e-4);
    }
}
