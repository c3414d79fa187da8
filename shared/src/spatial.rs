//! Spatial hashing for obstacle probes.
//!
//! Obstacles are upright boxes: a rotated rectangle footprint extruded between a base and
//! a top height. The autopilot fires several probes per rig per tick, so each probe only
//! tests the obstacles registered in the grid cells it crosses.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Size of each spatial grid cell in world units.
/// Should be roughly the size of the largest obstacle footprint.
pub const SPATIAL_CELL_SIZE: f32 = 4.0;

/// An upright box obstacle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObstacleEntry {
    /// Caller-supplied identifier reported back in probe hits.
    pub id: u32,
    /// Footprint center in world XZ.
    pub center: Vec2,
    /// Half-extents of the footprint.
    pub half_extents: Vec2,
    /// Rotation about +Y in radians.
    pub rotation: f32,
    /// World height of the bottom face.
    pub base_y: f32,
    /// Height of the box above `base_y`.
    pub height: f32,
}

/// Result of intersecting a ray with an obstacle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObstacleHit {
    pub id: u32,
    pub distance: f32,
    pub normal: Vec3,
}

impl ObstacleEntry {
    pub fn contains_point(&self, point: Vec2) -> bool {
        let local = self.to_local(point - self.center);
        local.abs().cmple(self.half_extents).all()
    }

    /// World XZ bounds of the rotated footprint, grown by `pad`.
    fn bounds(&self, pad: f32) -> (Vec2, Vec2) {
        let (sin, cos) = self.rotation.sin_cos();
        let reach = Vec2::new(
            self.half_extents.x * cos.abs() + self.half_extents.y * sin.abs(),
            self.half_extents.x * sin.abs() + self.half_extents.y * cos.abs(),
        ) + Vec2::splat(pad);
        (self.center - reach, self.center + reach)
    }

    /// Rotate a world XZ offset into the footprint frame.
    fn to_local(&self, v: Vec2) -> Vec2 {
        Vec2::from_angle(-self.rotation).rotate(v)
    }

    /// Slab test of a ray against this box, grown by `inflate` on every side.
    ///
    /// `dir` must be normalized. Rays starting inside the box report no hit.
    pub fn raycast(&self, origin: Vec3, dir: Vec3, max_distance: f32, inflate: f32) -> Option<ObstacleHit> {
        let o = self.to_local(Vec2::new(origin.x, origin.z) - self.center);
        let d = self.to_local(Vec2::new(dir.x, dir.z));

        let half = self.half_extents + Vec2::splat(inflate);
        let lo = Vec3::new(-half.x, self.base_y - inflate, -half.y);
        let hi = Vec3::new(half.x, self.base_y + self.height + inflate, half.y);
        let o = Vec3::new(o.x, origin.y, o.y);
        let d = Vec3::new(d.x, dir.y, d.y);

        // (distance, axis, outward sign) of the face the ray enters through
        let mut enter = (f32::NEG_INFINITY, 0, 0.0);
        let mut exit = f32::INFINITY;

        for axis in 0..3 {
            if d[axis].abs() < 1e-6 {
                if o[axis] < lo[axis] || o[axis] > hi[axis] {
                    return None;
                }
                continue;
            }
            let near_lo = (lo[axis] - o[axis]) / d[axis];
            let near_hi = (hi[axis] - o[axis]) / d[axis];
            let (near, far, sign) = if near_lo <= near_hi {
                (near_lo, near_hi, -1.0)
            } else {
                (near_hi, near_lo, 1.0)
            };
            if near > enter.0 {
                enter = (near, axis, sign);
            }
            exit = exit.min(far);
            if enter.0 > exit {
                return None;
            }
        }

        let (distance, axis, sign) = enter;
        if !(0.0..=max_distance).contains(&distance) {
            return None;
        }

        let normal = match axis {
            1 => Vec3::Y * sign,
            _ => {
                let local = if axis == 0 { Vec2::X * sign } else { Vec2::Y * sign };
                let world = Vec2::from_angle(self.rotation).rotate(local);
                Vec3::new(world.x, 0.0, world.y)
            }
        };

        Some(ObstacleHit {
            id: self.id,
            distance,
            normal,
        })
    }
}

/// Spatial hash of obstacle footprints.
#[derive(Resource, Default, Debug)]
pub struct SpatialObstacleGrid {
    /// Cell -> indices of the obstacles whose bounds overlap it.
    cells: HashMap<IVec2, Vec<usize>>,
    obstacles: Vec<ObstacleEntry>,
}

impl SpatialObstacleGrid {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn cell_of(pos: Vec2) -> IVec2 {
        (pos / SPATIAL_CELL_SIZE).floor().as_ivec2()
    }

    /// Every cell overlapping the XZ rectangle `lo..hi`.
    fn cells_between(lo: Vec2, hi: Vec2) -> impl Iterator<Item = IVec2> {
        let (a, b) = (Self::cell_of(lo), Self::cell_of(hi));
        (a.x..=b.x).flat_map(move |x| (a.y..=b.y).map(move |z| IVec2::new(x, z)))
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.obstacles.clear();
    }

    pub fn insert(&mut self, entry: ObstacleEntry) {
        let (lo, hi) = entry.bounds(0.0);
        let idx = self.obstacles.len();
        self.obstacles.push(entry);
        for cell in Self::cells_between(lo, hi) {
            self.cells.entry(cell).or_default().push(idx);
        }
    }

    /// True when `point` lies inside any obstacle footprint.
    #[inline]
    pub fn point_blocked(&self, point: Vec2) -> bool {
        self.cells
            .get(&Self::cell_of(point))
            .is_some_and(|indices| indices.iter().any(|&i| self.obstacles[i].contains_point(point)))
    }

    /// Nearest obstacle hit along a ray.
    ///
    /// `inflate` grows every box, which turns the query into a sphere sweep of that radius.
    pub fn raycast(&self, origin: Vec3, dir: Vec3, max_distance: f32, inflate: f32) -> Option<ObstacleHit> {
        let end = origin + dir * max_distance;
        let (a, b) = (Vec2::new(origin.x, origin.z), Vec2::new(end.x, end.z));
        let pad = Vec2::splat(inflate);

        let mut tested = Vec::new();
        let mut best: Option<ObstacleHit> = None;
        for cell in Self::cells_between(a.min(b) - pad, a.max(b) + pad) {
            for &idx in self.cells.get(&cell).into_iter().flatten() {
                if tested.contains(&idx) {
                    continue;
                }
                tested.push(idx);
                let Some(hit) = self.obstacles[idx].raycast(origin, dir, max_distance, inflate) else {
                    continue;
                };
                if best.map_or(true, |b| hit.distance < b.distance) {
                    best = Some(hit);
                }
            }
        }
        best
    }

    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }
}
