//! Physics queries the locomotion core needs from the world.
//!
//! Rigs and the autopilot never touch terrain or obstacles directly. They go through
//! [`WorldProbe`], which keeps the core testable against a bare plane and lets the
//! simulation host swap in whatever collision representation it has.

use bevy::prelude::*;

use crate::spatial::{ObstacleEntry, SpatialObstacleGrid};
use crate::terrain::{TerrainSource, WorldTerrain};

/// A single probe hit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProbeHit {
    /// Contact point. For sphere probes this is on the surface, not the sphere center.
    pub point: Vec3,
    pub normal: Vec3,
    /// Distance travelled along the probe direction.
    pub distance: f32,
    /// Set when the hit belongs to a tracked obstacle rather than the ground.
    pub obstacle: Option<u32>,
}

/// Ray and sphere queries against static geometry.
pub trait WorldProbe {
    /// `dir` must be normalized.
    fn raycast(&self, origin: Vec3, dir: Vec3, max_distance: f32) -> Option<ProbeHit>;

    /// Sweep a sphere of `radius` from `origin` along `dir`.
    fn spherecast(&self, origin: Vec3, radius: f32, dir: Vec3, max_distance: f32) -> Option<ProbeHit>;

    /// Like [`WorldProbe::raycast`] but only reports tracked obstacles, looking through the ground.
    fn obstacle_raycast(&self, origin: Vec3, dir: Vec3, max_distance: f32) -> Option<ProbeHit> {
        self.raycast(origin, dir, max_distance).filter(|hit| hit.obstacle.is_some())
    }
}

/// Terrain plus obstacles, the default probe target for the simulation.
#[derive(Resource, Default)]
pub struct CollisionWorld {
    pub terrain: WorldTerrain,
    pub obstacles: SpatialObstacleGrid,
}

impl CollisionWorld {
    pub fn new(source: TerrainSource) -> Self {
        Self {
            terrain: WorldTerrain::new(source),
            obstacles: SpatialObstacleGrid::new(),
        }
    }

    /// Flat ground with no obstacles.
    pub fn flat(height: f32) -> Self {
        Self::new(TerrainSource::Flat { height })
    }

    pub fn with_obstacles(mut self, obstacles: impl IntoIterator<Item = ObstacleEntry>) -> Self {
        for entry in obstacles {
            self.obstacles.insert(entry);
        }
        self
    }

    fn terrain_hit(&self, origin: Vec3, dir: Vec3, distance: f32) -> ProbeHit {
        // Sphere probes touch the surface directly below their center
        let center = origin + dir * distance;
        ProbeHit {
            point: Vec3::new(center.x, self.terrain.get_height(center.x, center.z), center.z),
            normal: self.terrain.get_normal(center.x, center.z),
            distance,
            obstacle: None,
        }
    }

    fn nearest(&self, terrain: Option<ProbeHit>, obstacle: Option<ProbeHit>) -> Option<ProbeHit> {
        match (terrain, obstacle) {
            (Some(t), Some(o)) => Some(if o.distance <= t.distance { o } else { t }),
            (t, o) => t.or(o),
        }
    }
}

impl WorldProbe for CollisionWorld {
    fn raycast(&self, origin: Vec3, dir: Vec3, max_distance: f32) -> Option<ProbeHit> {
        let terrain = self
            .terrain
            .raycast(origin, dir, max_distance)
            .map(|d| self.terrain_hit(origin, dir, d));
        self.nearest(terrain, self.obstacle_raycast(origin, dir, max_distance))
    }

    fn obstacle_raycast(&self, origin: Vec3, dir: Vec3, max_distance: f32) -> Option<ProbeHit> {
        self.obstacles.raycast(origin, dir, max_distance, 0.0).map(|hit| ProbeHit {
            point: origin + dir * hit.distance,
            normal: hit.normal,
            distance: hit.distance,
            obstacle: Some(hit.id),
        })
    }

    fn spherecast(&self, origin: Vec3, radius: f32, dir: Vec3, max_distance: f32) -> Option<ProbeHit> {
        let terrain = self
            .terrain
            .spherecast(origin, radius, dir, max_distance)
            .map(|d| self.terrain_hit(origin, dir, d));
        let obstacle = self.obstacles.raycast(origin, dir, max_distance, radius).map(|hit| ProbeHit {
            point: origin + dir * hit.distance - hit.normal * radius,
            normal: hit.normal,
            distance: hit.distance,
            obstacle: Some(hit.id),
        });
        self.nearest(terrain, obstacle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall() -> ObstacleEntry {
        ObstacleEntry {
            id: 9,
            center: Vec2::new(3.0, 0.0),
            half_extents: Vec2::new(0.5, 2.0),
            rotation: 0.0,
            base_y: 0.0,
            height: 3.0,
        }
    }

    #[test]
    fn test_ray_reports_obstacle_before_ground() {
        let world = CollisionWorld::flat(0.0).with_obstacles([wall()]);
        let hit = world.raycast(Vec3::new(0.0, 1.0, 0.0), Vec3::X, 10.0).unwrap();
        assert_eq!(hit.obstacle, Some(9));
        assert!((hit.point.x - 2.5).abs() < 1e-4);
    }

    #[test]
    fn test_ground_hit_has_no_obstacle_id() {
        let world = CollisionWorld::flat(0.0).with_obstacles([wall()]);
        let hit = world.raycast(Vec3::new(0.0, 2.0, 0.0), Vec3::NEG_Y, 5.0).unwrap();
        assert_eq!(hit.obstacle, None);
        assert!(hit.point.y.abs() < 0.01);
        assert_eq!(hit.normal, Vec3::Y);
    }

    #[test]
    fn test_obstacle_probe_sees_through_ground() {
        // Wall footing sunk below the surface; a descending ray meets the ground first
        let sunk = ObstacleEntry {
            base_y: -2.0,
            ..wall()
        };
        let world = CollisionWorld::flat(0.0).with_obstacles([sunk]);
        let origin = Vec3::new(0.0, 0.5, 0.0);
        let dir = Vec3::new(1.0, -0.4, 0.0).normalize();

        let ground = world.raycast(origin, dir, 10.0).unwrap();
        assert_eq!(ground.obstacle, None);
        let hit = world.obstacle_raycast(origin, dir, 10.0).unwrap();
        assert_eq!(hit.obstacle, Some(9));
    }

    #[test]
    fn test_sphere_point_lies_on_ground() {
        let world = CollisionWorld::flat(0.5);
        let hit = world.spherecast(Vec3::new(1.0, 3.0, 1.0), 0.3, Vec3::NEG_Y, 5.0).unwrap();
        assert!((hit.point.y - 0.5).abs() < 0.01);
        assert!((hit.distance - 2.2).abs() < 0.01);
    }
}
