//! Simulated avatar body: ground sensing and target integration.
//!
//! Each fixed tick the rig
//! - probes the ground below the body (ray + sphere, nearer hit wins)
//! - smooths the ground point for the gait logic
//! - lets the active animator write a new `target`
//! - blends velocity toward the target and integrates, with gravity scaled by rig size

use bevy::prelude::*;

use crate::config::RigConfig;
use crate::world::{ProbeHit, WorldProbe};

/// Latest ground contact information.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroundState {
    pub on_ground: bool,
    pub last_position: Vec3,
    pub last_normal: Vec3,
    /// Exponentially smoothed ground point; x/z always track the body.
    pub smoothed_position: Vec3,
}

/// The simulated avatar.
#[derive(Component, Clone, Debug)]
pub struct Rig {
    pub body: Transform,
    pub head: Transform,
    pub velocity: Vec3,
    /// Desired next body position, written by the active animator.
    pub target: Vec3,
    pub ground: GroundState,
    /// Inactive rigs skip integration entirely.
    pub active: bool,
    pub use_gravity: bool,
    /// Cleared during ballistic flight so velocity is governed by gravity alone.
    pub ground_follow: bool,
    /// Entity size; scales gravity, probes and clearance.
    pub scale: f32,
    ground_seen: bool,
}

impl Rig {
    pub fn new(position: Vec3, config: &RigConfig) -> Self {
        let body = Transform::from_translation(position);
        let mut rig = Self {
            body,
            head: body,
            velocity: Vec3::ZERO,
            target: position,
            ground: GroundState {
                on_ground: false,
                last_position: position,
                last_normal: Vec3::Y,
                smoothed_position: position,
            },
            active: true,
            use_gravity: true,
            ground_follow: true,
            scale: 1.0,
            ground_seen: false,
        };
        rig.sync_head(config);
        rig
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale.max(0.01);
        self
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.body.translation
    }

    /// Horizontal facing direction (unit length).
    pub fn forward(&self) -> Vec3 {
        let f = *self.body.forward();
        Vec3::new(f.x, 0.0, f.z).normalize_or(Vec3::NEG_Z)
    }

    /// Horizontal right direction (unit length).
    pub fn right(&self) -> Vec3 {
        let r = *self.body.right();
        Vec3::new(r.x, 0.0, r.z).normalize_or(Vec3::X)
    }

    /// Body height above the smoothed ground point.
    pub fn height_above_ground(&self) -> f32 {
        self.body.translation.y - self.ground.smoothed_position.y
    }

    /// Probe the ground below the body.
    ///
    /// Records the nearer of the ray and sphere hits. When neither hits, `on_ground` is
    /// cleared and the previous ground data is kept as-is.
    pub fn sense_ground<P: WorldProbe + ?Sized>(&mut self, world: &P, config: &RigConfig) -> bool {
        let origin = self.body.translation + Vec3::Y * config.probe_offset;
        let reach = config.probe_offset + config.ground_check_distance * self.scale;

        let ray = world.raycast(origin, Vec3::NEG_Y, reach);
        let sphere = world.spherecast(origin, config.probe_radius * self.scale, Vec3::NEG_Y, reach);

        let nearest = match (ray, sphere) {
            (Some(r), Some(s)) => Some(nearer_hit(origin, r, s)),
            (r, s) => r.or(s),
        };

        let Some(hit) = nearest else {
            self.ground.on_ground = false;
            return false;
        };

        self.ground.on_ground = true;
        self.ground.last_position = hit.point;
        self.ground.last_normal = hit.normal;
        if !self.ground_seen {
            self.ground.smoothed_position = hit.point;
            self.ground_seen = true;
        }
        true
    }

    /// Exponentially smooth the ground point and pin its x/z to the body.
    pub fn smooth_ground(&mut self, dt: f32, config: &RigConfig) {
        let t = (config.ground_smoothing * dt).clamp(0.0, 1.0);
        let mut smoothed = self.ground.smoothed_position.lerp(self.ground.last_position, t);
        smoothed.x = self.body.translation.x;
        smoothed.z = self.body.translation.z;
        self.ground.smoothed_position = smoothed;
    }

    /// Apply a turn command in [-1, 1] (positive turns counter-clockwise seen from above).
    pub fn turn(&mut self, turn: f32, dt: f32, config: &RigConfig) {
        if turn != 0.0 {
            self.body.rotate_y(turn.clamp(-1.0, 1.0) * config.turn_rate * dt);
        }
    }

    /// Blend velocity toward the target and integrate one tick.
    ///
    /// `gravity` is the world gravity magnitude. It is scaled by the rig size, and cancelled
    /// by an equal counter-force when `use_gravity` is off.
    pub fn integrate<P: WorldProbe + ?Sized>(&mut self, world: &P, gravity: f32, dt: f32, config: &RigConfig) {
        if !self.active {
            return;
        }

        if self.ground_follow {
            let desired = (self.target - self.body.translation) * config.follow_speed;
            let blend = (config.velocity_blend * dt).clamp(0.0, 1.0);
            self.velocity = self.velocity.lerp(desired, blend);
        }

        let gravity_accel = Vec3::NEG_Y * gravity * self.scale;
        self.velocity += gravity_accel * dt;
        if !self.use_gravity {
            self.velocity -= gravity_accel * dt;
        }

        self.body.translation += self.velocity * dt;
        self.resolve_ground_contact(world, config);
        self.sync_head(config);
    }

    /// Keep the body above the ground it is standing on.
    fn resolve_ground_contact<P: WorldProbe + ?Sized>(&mut self, world: &P, config: &RigConfig) {
        let clearance = config.min_clearance * self.scale;
        let origin = self.body.translation + Vec3::Y * config.probe_offset;
        if let Some(hit) = world.raycast(origin, Vec3::NEG_Y, config.probe_offset + clearance) {
            if hit.obstacle.is_none() || hit.normal.y > 0.5 {
                self.body.translation.y = self.body.translation.y.max(hit.point.y + clearance);
                if self.velocity.y < 0.0 {
                    self.velocity.y = 0.0;
                }
            }
        }
    }

    fn sync_head(&mut self, config: &RigConfig) {
        self.head.rotation = self.body.rotation;
        self.head.translation = self.body.translation + self.body.rotation * (config.head_offset * self.scale);
    }
}

fn nearer_hit(origin: Vec3, a: ProbeHit, b: ProbeHit) -> ProbeHit {
    if a.point.distance_squared(origin) <= b.point.distance_squared(origin) {
        a
    } else {
        b
    }
}
