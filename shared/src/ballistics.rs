//! Jump trajectory solver
//!
//! Closed-form projectile motion: pick a launch angle, solve for the launch speed that
//! lands on a target point, and sample the resulting arc for path previews.

use bevy::prelude::*;

/// Shallowest allowed launch angle (degrees).
pub const MIN_LAUNCH_ANGLE_DEG: f32 = 15.0;

/// Steepest allowed launch angle (degrees).
pub const MAX_LAUNCH_ANGLE_DEG: f32 = 75.0;

/// Horizontal distances below this are treated as straight up.
pub const MIN_HORIZONTAL_DISTANCE: f32 = 0.01;

/// Minimum apex height of the vertical fallback launch (meters).
pub const FALLBACK_MIN_HEIGHT: f32 = 1.0;

/// Number of segments in a sampled arc (the polyline has one more point).
pub const ARC_SEGMENTS: usize = 15;

/// Which branch of the solver produced a launch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LaunchKind {
    /// The requested angle reaches the target.
    Direct,
    /// Target unreachable at that angle (or directly overhead): straight-up hop.
    VerticalFallback,
}

/// Launch velocity plus how long the flight lasts until the target height is reached again.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LaunchSolution {
    pub velocity: Vec3,
    pub flight_time: f32,
    pub kind: LaunchKind,
}

impl LaunchSolution {
    /// Position `t` seconds after launching from `from`.
    ///
    /// `gravity` is the magnitude of downward acceleration.
    pub fn position_at(&self, from: Vec3, gravity: f32, t: f32) -> Vec3 {
        from + self.velocity * t + Vec3::NEG_Y * (0.5 * gravity * t * t)
    }

    /// Highest point above the launch height.
    pub fn apex_height(&self, gravity: f32) -> f32 {
        let vy = self.velocity.y.max(0.0);
        vy * vy / (2.0 * gravity)
    }
}

/// Clamp a launch angle to the supported range.
pub fn clamp_launch_angle(angle_deg: f32) -> f32 {
    angle_deg.clamp(MIN_LAUNCH_ANGLE_DEG, MAX_LAUNCH_ANGLE_DEG)
}

/// Solve the launch velocity that carries a body from `from` to `to` at `angle_deg`.
///
/// `v = sqrt(g·D² / (2·cos²θ·(D·tanθ − Δy)))`, where `D` is the horizontal distance and
/// `Δy` the height difference. Falls back to a vertical launch clearing `max(1, Δy)` when
/// `D` is ~0 or the denominator is not positive.
pub fn solve_launch(from: Vec3, to: Vec3, angle_deg: f32, gravity: f32) -> LaunchSolution {
    let theta = clamp_launch_angle(angle_deg).to_radians();
    let delta = to - from;
    let horizontal = Vec3::new(delta.x, 0.0, delta.z);
    let distance = horizontal.length();
    let dy = delta.y;

    if distance >= MIN_HORIZONTAL_DISTANCE {
        let cos_t = theta.cos();
        let denominator = 2.0 * cos_t * cos_t * (distance * theta.tan() - dy);
        if denominator > 0.0 {
            let speed = (gravity * distance * distance / denominator).sqrt();
            let dir = horizontal / distance;
            let velocity = dir * (speed * cos_t) + Vec3::Y * (speed * theta.sin());
            return LaunchSolution {
                velocity,
                flight_time: distance / (speed * cos_t),
                kind: LaunchKind::Direct,
            };
        }
    }

    vertical_launch(dy, gravity)
}

/// Straight-up launch whose apex clears `max(1, dy)`.
fn vertical_launch(dy: f32, gravity: f32) -> LaunchSolution {
    let height = dy.max(FALLBACK_MIN_HEIGHT);
    let vy = (2.0 * gravity * height).sqrt();
    // Descending root of y(t) = dy
    let disc = (vy * vy - 2.0 * gravity * dy).max(0.0);
    LaunchSolution {
        velocity: Vec3::Y * vy,
        flight_time: (vy + disc.sqrt()) / gravity,
        kind: LaunchKind::VerticalFallback,
    }
}

/// Sample the jump arc from `from` toward `to` as a polyline of `ARC_SEGMENTS + 1` points.
pub fn sample_arc(from: Vec3, to: Vec3, angle_deg: f32, gravity: f32) -> Vec<Vec3> {
    let solution = solve_launch(from, to, angle_deg, gravity);
    let step = solution.flight_time / ARC_SEGMENTS as f32;
    (0..=ARC_SEGMENTS)
        .map(|i| solution.position_at(from, gravity, step * i as f32))
        .collect()
}

/// Advance a projectile one step under constant gravity (semi-implicit Euler).
///
/// Returns (new_position, new_velocity)
pub fn step_projectile(position: Vec3, velocity: Vec3, gravity: f32, dt: f32) -> (Vec3, Vec3) {
    let vel = velocity + Vec3::NEG_Y * gravity * dt;
    (position + vel * dt, vel)
}
