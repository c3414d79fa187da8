//! Bot steering: follow, flee and waypoint paths.
//!
//! Every tick the autopilot turns its goal into a single [`AutopilotCommand`]: a horizontal
//! move direction, a proportional turn command and, when a path climbs, a jump target that
//! is repeated until the animator reports the launch. Obstacle probes deflect the direction before it is handed to the animator.

use std::collections::VecDeque;
use std::f32::consts::FRAC_PI_4;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::animator::horizontal;
use crate::config::AutopilotConfig;
use crate::predictor::MovementPredictor;
use crate::rig::Rig;
use crate::world::{ProbeHit, WorldProbe};

/// After a path jump fires, arming is suppressed for this long (seconds).
const JUMP_REARM_DELAY: f32 = 1.2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutopilotGoal {
    #[default]
    Idle,
    /// Chase a tracked player.
    Follow { target: u64 },
    /// Run from every tracked player within the flee radius.
    Flee,
    /// Walk the queued waypoints.
    Path,
}

/// What the autopilot wants this tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AutopilotCommand {
    /// Unit horizontal direction, or zero to stand still.
    pub direction: Vec3,
    /// Turn command in [-1, 1]; positive turns counter-clockwise.
    pub turn: f32,
    pub jump_target: Option<Vec3>,
    /// Set once the follow target or the last waypoint is within reach.
    pub reached: bool,
}

/// Rig state the autopilot steers from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyState {
    pub position: Vec3,
    /// Horizontal facing direction.
    pub forward: Vec3,
    /// Height of the ground under the feet.
    pub ground_y: f32,
    /// Travel speed of the active animator, or zero when it doesn't move the body.
    pub speed: f32,
    /// Jumps the animator has actually launched.
    pub jump_launches: u32,
}

impl From<&Rig> for BodyState {
    fn from(rig: &Rig) -> Self {
        Self {
            position: rig.position(),
            forward: rig.forward(),
            ground_y: rig.ground.smoothed_position.y,
            speed: 0.0,
            jump_launches: 0,
        }
    }
}

/// Everything outside the bot that steering depends on.
pub struct Surroundings<'a> {
    pub world: &'a dyn WorldProbe,
    pub predictor: &'a MovementPredictor,
    /// Latest known position of every tracked player.
    pub players: &'a [(u64, Vec3)],
    pub config: &'a AutopilotConfig,
    pub dt: f32,
}

#[derive(Component, Clone, Debug, Default)]
pub struct Autopilot {
    pub goal: AutopilotGoal,
    pub path: VecDeque<Vec3>,
    armed_jump: Option<Vec3>,
    /// Launch count when the armed jump was first requested.
    jump_requested_at: Option<u32>,
    rearm_timer: f32,
    waypoints_reached: u32,
    jumps_fired: u32,
}

impl Autopilot {
    pub fn new(goal: AutopilotGoal) -> Self {
        Self { goal, ..default() }
    }

    pub fn with_path(waypoints: impl IntoIterator<Item = Vec3>) -> Self {
        Self {
            goal: AutopilotGoal::Path,
            path: waypoints.into_iter().collect(),
            ..default()
        }
    }

    /// Replace the queued path.
    pub fn set_path(&mut self, waypoints: impl IntoIterator<Item = Vec3>) {
        self.path = waypoints.into_iter().collect();
        self.armed_jump = None;
        self.jump_requested_at = None;
        self.goal = AutopilotGoal::Path;
    }

    pub fn armed_jump(&self) -> Option<Vec3> {
        self.armed_jump
    }

    pub fn waypoints_reached(&self) -> u32 {
        self.waypoints_reached
    }

    pub fn jumps_fired(&self) -> u32 {
        self.jumps_fired
    }

    pub fn tick(&mut self, body: &BodyState, env: &Surroundings) -> AutopilotCommand {
        self.rearm_timer = (self.rearm_timer - env.dt).max(0.0);
        match self.goal {
            AutopilotGoal::Idle => AutopilotCommand::default(),
            AutopilotGoal::Path => self.tick_path(body, env),
            AutopilotGoal::Follow { target } => self.tick_follow(target, body, env),
            AutopilotGoal::Flee => self.tick_flee(body, env),
        }
    }

    fn tick_path(&mut self, body: &BodyState, env: &Surroundings) -> AutopilotCommand {
        let cfg = env.config;
        if self.jump_requested_at.is_some_and(|at| body.jump_launches > at) {
            debug!("Jump toward {:?} launched", self.armed_jump);
            self.armed_jump = None;
            self.jump_requested_at = None;
            self.rearm_timer = JUMP_REARM_DELAY;
            self.jumps_fired += 1;
        }

        while let Some(&next) = self.path.front() {
            if horizontal(next - body.position).length() >= cfg.reach_threshold {
                break;
            }
            self.path.pop_front();
            self.waypoints_reached += 1;
            if self.armed_jump == Some(next) {
                self.armed_jump = None;
                self.jump_requested_at = None;
            }
            debug!("Waypoint {:?} reached, {} remaining", next, self.path.len());
        }

        let Some(&waypoint) = self.path.front() else {
            return AutopilotCommand {
                reached: true,
                ..default()
            };
        };

        let to = horizontal(waypoint - body.position);
        if self.armed_jump.is_none() && self.rearm_timer <= 0.0 && waypoint.y - body.ground_y > cfg.jump_height_threshold {
            self.armed_jump = Some(waypoint);
            debug!("Jump armed for waypoint {:?}", waypoint);
        }

        // Keep requesting until the animator reports a launch; it refuses during cooldown
        // or while off the ground.
        let jump_target = self.armed_jump.filter(|_| to.length() <= cfg.jump_prepare_distance);
        if jump_target.is_some() {
            self.jump_requested_at.get_or_insert(body.jump_launches);
        }

        let direction = avoid_obstacles(body.position, to.normalize_or_zero(), env);
        AutopilotCommand {
            direction,
            turn: turn_command(body.forward, direction, cfg),
            jump_target,
            reached: false,
        }
    }

    fn tick_follow(&mut self, target: u64, body: &BodyState, env: &Surroundings) -> AutopilotCommand {
        let cfg = env.config;
        let intercept_speed = if body.speed > 0.0 { body.speed } else { cfg.intercept_speed };
        let actual = env.players.iter().find(|(id, _)| *id == target).map(|(_, p)| *p);
        let Some(actual) = actual else {
            trace!("Follow target {} not present", target);
            return AutopilotCommand::default();
        };

        let aim = env
            .predictor
            .find_intercept(target, body.position, intercept_speed)
            .map(|(point, _)| point)
            .or_else(|| env.predictor.predict(target, cfg.follow_lead_time))
            .unwrap_or(actual);

        let to_actual = horizontal(actual - body.position);
        if to_actual.length() < cfg.reach_threshold {
            return AutopilotCommand {
                turn: turn_command(body.forward, to_actual.normalize_or_zero(), cfg),
                reached: true,
                ..default()
            };
        }

        let desired = horizontal(aim - body.position).normalize_or(to_actual.normalize_or_zero());
        let direction = avoid_obstacles(body.position, desired, env);
        AutopilotCommand {
            direction,
            turn: turn_command(body.forward, direction, cfg),
            ..default()
        }
    }

    fn tick_flee(&mut self, body: &BodyState, env: &Surroundings) -> AutopilotCommand {
        let cfg = env.config;
        let threats = env.players.iter().map(|(_, p)| *p);
        let away = flee_direction(body.position, threats, cfg.flee_radius);
        if away == Vec3::ZERO {
            return AutopilotCommand::default();
        }
        let direction = avoid_obstacles(body.position, away, env);
        AutopilotCommand {
            direction,
            turn: turn_command(body.forward, direction, cfg),
            ..default()
        }
    }
}

// =============================================================================
// STEERING HELPERS
// =============================================================================

/// Proportional turn toward `desired`: `min(angle, max_turn) / divisor`, signed so the
/// shorter way round is taken.
pub fn turn_command(forward: Vec3, desired: Vec3, cfg: &AutopilotConfig) -> f32 {
    let f = horizontal(forward).normalize_or_zero();
    let d = horizontal(desired).normalize_or_zero();
    if f == Vec3::ZERO || d == Vec3::ZERO {
        return 0.0;
    }
    let angle = f.angle_between(d).to_degrees();
    let cross = f.cross(d).y;
    // Directly behind: pick a side instead of stalling
    let sign = if cross.abs() < 1e-6 { if angle > 90.0 { 1.0 } else { 0.0 } } else { cross.signum() };
    (angle.min(cfg.max_turn_deg) / cfg.turn_divisor.max(1e-3) * sign).clamp(-1.0, 1.0)
}

/// Normalized inverse-distance-weighted repulsion from threats within `radius`.
pub fn flee_direction(position: Vec3, threats: impl IntoIterator<Item = Vec3>, radius: f32) -> Vec3 {
    let mut push = Vec3::ZERO;
    for threat in threats {
        let away = horizontal(position - threat);
        let distance = away.length();
        if distance >= radius {
            continue;
        }
        if distance < 1e-3 {
            // On top of us: any direction beats standing still
            push += Vec3::X;
            continue;
        }
        push += away / (distance * distance);
    }
    push.normalize_or_zero()
}

/// Deflect `direction` around tracked obstacles.
///
/// Probes forward and at ±45° for `avoid_probe_distance`, and backward for
/// `avoid_back_probe_distance`. A forward hit turns the direction along the hit surface,
/// toward the side whose diagonal probe runs further. If front and both diagonals are
/// blocked but the back is clear the bot backs off.
pub fn avoid_obstacles(position: Vec3, direction: Vec3, env: &Surroundings) -> Vec3 {
    if direction == Vec3::ZERO {
        return direction;
    }
    let cfg = env.config;
    let probe = |dir: Vec3, reach: f32| -> Option<ProbeHit> { env.world.obstacle_raycast(position, dir, reach) };

    let Some(front) = probe(direction, cfg.avoid_probe_distance) else {
        return direction;
    };

    let left_dir = Quat::from_rotation_y(FRAC_PI_4) * direction;
    let right_dir = Quat::from_rotation_y(-FRAC_PI_4) * direction;
    let left = probe(left_dir, cfg.avoid_probe_distance);
    let right = probe(right_dir, cfg.avoid_probe_distance);

    if left.is_some() && right.is_some() && probe(-direction, cfg.avoid_back_probe_distance).is_none() {
        trace!("Boxed in at {:?}, backing off", position);
        return -direction;
    }

    let normal = horizontal(front.normal).normalize_or(-direction);
    let tangent = Vec3::new(-normal.z, 0.0, normal.x);
    let clearance = |hit: Option<ProbeHit>| hit.map_or(f32::INFINITY, |h| h.distance);
    let toward = if clearance(left) >= clearance(right) { left_dir } else { right_dir };
    let side = if tangent.dot(toward) >= 0.0 { tangent } else { -tangent };
    trace!("Obstacle {:?} ahead, deflecting to {:?}", front.obstacle, side);
    side
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::ObstacleEntry;
    use crate::world::CollisionWorld;

    const DT: f32 = 1.0 / 60.0;

    fn body_at(position: Vec3) -> BodyState {
        BodyState {
            position,
            forward: Vec3::NEG_Z,
            ground_y: 0.0,
            speed: 0.0,
            jump_launches: 0,
        }
    }

    fn block(id: u32, center: Vec2, half_extents: Vec2) -> ObstacleEntry {
        ObstacleEntry {
            id,
            center,
            half_extents,
            rotation: 0.0,
            base_y: 0.0,
            height: 3.0,
        }
    }

    #[test]
    fn test_path_reaches_single_waypoint() {
        let world = CollisionWorld::flat(0.0);
        let predictor = MovementPredictor::default();
        let config = AutopilotConfig::default();
        let env = Surroundings {
            world: &world,
            predictor: &predictor,
            players: &[],
            config: &config,
            dt: DT,
        };
        let goal = Vec3::new(5.0, 0.0, 0.0);
        let mut autopilot = Autopilot::with_path([goal]);
        let mut body = body_at(Vec3::ZERO);

        let mut finished = false;
        for _ in 0..600 {
            let command = autopilot.tick(&body, &env);
            let distance = horizontal(goal - body.position).length();
            if distance >= config.reach_threshold {
                assert!(command.direction.length() > 0.5, "stalled {distance} from the goal");
                assert!(!command.reached);
            } else {
                assert_eq!(command.direction, Vec3::ZERO);
                assert!(command.reached);
                finished = true;
                break;
            }
            body.position += command.direction * 2.5 * DT;
        }

        assert!(finished);
        assert!(autopilot.path.is_empty());
        assert_eq!(autopilot.waypoints_reached(), 1);
        assert!(body.position.x > 4.5);
    }

    #[test]
    fn test_path_advances_through_waypoints() {
        let world = CollisionWorld::flat(0.0);
        let predictor = MovementPredictor::default();
        let config = AutopilotConfig::default();
        let env = Surroundings {
            world: &world,
            predictor: &predictor,
            players: &[],
            config: &config,
            dt: DT,
        };
        let mut autopilot = Autopilot::with_path([Vec3::new(2.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 2.0), Vec3::new(0.0, 0.0, 2.0)]);
        let mut body = body_at(Vec3::ZERO);
        for _ in 0..600 {
            let command = autopilot.tick(&body, &env);
            if command.reached {
                break;
            }
            body.position += command.direction * 2.5 * DT;
        }
        assert_eq!(autopilot.waypoints_reached(), 3);
        assert!(horizontal(body.position - Vec3::new(0.0, 0.0, 2.0)).length() < config.reach_threshold);
    }

    #[test]
    fn test_jump_waypoint_fires_once_within_prepare_distance() {
        let world = CollisionWorld::flat(0.0);
        let predictor = MovementPredictor::default();
        let config = AutopilotConfig::default();
        let env = Surroundings {
            world: &world,
            predictor: &predictor,
            players: &[],
            config: &config,
            dt: DT,
        };
        let ledge = Vec3::new(4.0, 1.2, 0.0);
        let mut autopilot = Autopilot::with_path([ledge]);
        let mut body = body_at(Vec3::ZERO);

        let first = autopilot.tick(&body, &env);
        assert_eq!(first.jump_target, None);
        assert_eq!(autopilot.armed_jump(), Some(ledge));

        let mut requests = 0;
        let mut fired_at = None;
        for _ in 0..120 {
            let command = autopilot.tick(&body, &env);
            if let Some(target) = command.jump_target {
                assert_eq!(target, ledge);
                requests += 1;
                fired_at.get_or_insert(horizontal(ledge - body.position).length());
                // The animator launches on the first request
                body.jump_launches += 1;
            }
            body.position += command.direction * 2.5 * DT;
        }

        assert_eq!(requests, 1);
        let distance = fired_at.expect("jump never fired");
        assert!(distance <= config.jump_prepare_distance);
        assert_eq!(autopilot.jumps_fired(), 1);
        assert_eq!(autopilot.armed_jump(), None);
    }

    #[test]
    fn test_refused_jump_is_requested_again() {
        let world = CollisionWorld::flat(0.0);
        let predictor = MovementPredictor::default();
        let config = AutopilotConfig::default();
        let env = Surroundings {
            world: &world,
            predictor: &predictor,
            players: &[],
            config: &config,
            dt: DT,
        };
        let ledge = Vec3::new(1.0, 1.2, 0.0);
        let mut autopilot = Autopilot::with_path([ledge]);
        let mut body = body_at(Vec3::ZERO);

        // Animator still cooling down: no launch for the first few requests
        for _ in 0..10 {
            assert_eq!(autopilot.tick(&body, &env).jump_target, Some(ledge));
        }
        assert_eq!(autopilot.jumps_fired(), 0);
        assert_eq!(autopilot.armed_jump(), Some(ledge));

        body.jump_launches = 1;
        let after = autopilot.tick(&body, &env);
        assert_eq!(after.jump_target, None);
        assert_eq!(autopilot.jumps_fired(), 1);
        assert_eq!(autopilot.armed_jump(), None);
    }

    #[test]
    fn test_intercept_uses_body_speed() {
        let world = CollisionWorld::flat(0.0);
        let mut predictor = MovementPredictor::default();
        let config = AutopilotConfig::default();
        let mut target = Vec3::ZERO;
        for i in 0..60 {
            target = Vec3::new(i as f32 * 2.0 * DT, 0.0, -6.0);
            predictor.observe(42, target, i as f32 * DT);
        }
        let players = [(42u64, target)];
        let env = Surroundings {
            world: &world,
            predictor: &predictor,
            players: &players,
            config: &config,
            dt: DT,
        };

        let slow = BodyState { speed: 3.5, ..body_at(Vec3::ZERO) };
        let fast = BodyState { speed: 8.0, ..body_at(Vec3::ZERO) };
        let slow_aim = Autopilot::new(AutopilotGoal::Follow { target: 42 }).tick(&slow, &env).direction;
        let fast_aim = Autopilot::new(AutopilotGoal::Follow { target: 42 }).tick(&fast, &env).direction;
        // A slower body must lead the target further
        assert!(slow_aim.x > fast_aim.x, "slow {slow_aim:?} fast {fast_aim:?}");
    }

    #[test]
    fn test_turn_command_sign_and_magnitude() {
        let config = AutopilotConfig::default();
        // Facing -Z, target to the left (-X) needs a counter-clockwise turn
        let left = turn_command(Vec3::NEG_Z, Vec3::NEG_X, &config);
        assert!((left - 1.0).abs() < 1e-4);
        let right = turn_command(Vec3::NEG_Z, Vec3::X, &config);
        assert!((right + 1.0).abs() < 1e-4);

        let slight = turn_command(Vec3::NEG_Z, Quat::from_rotation_y(0.3) * Vec3::NEG_Z, &config);
        assert!((slight - 0.3f32.to_degrees() / 90.0).abs() < 1e-3);
        assert_eq!(turn_command(Vec3::NEG_Z, Vec3::NEG_Z, &config), 0.0);
        assert!(turn_command(Vec3::NEG_Z, Vec3::Z, &config).abs() > 0.99);
    }

    #[test]
    fn test_avoidance_deflects_along_wall() {
        let world = CollisionWorld::flat(0.0).with_obstacles([block(1, Vec2::new(1.4, 0.0), Vec2::new(0.2, 3.0))]);
        let predictor = MovementPredictor::default();
        let config = AutopilotConfig::default();
        let env = Surroundings {
            world: &world,
            predictor: &predictor,
            players: &[],
            config: &config,
            dt: DT,
        };
        let position = Vec3::new(0.0, 1.0, 0.0);
        let deflected = avoid_obstacles(position, Vec3::X, &env);
        assert!(deflected.x.abs() < 1e-4);
        assert!((deflected.z.abs() - 1.0).abs() < 1e-4);

        // A clear diagonal picks that side
        let offset = CollisionWorld::flat(0.0).with_obstacles([block(2, Vec2::new(1.2, -1.25), Vec2::new(0.2, 1.75))]);
        let env = Surroundings { world: &offset, ..env };
        let deflected = avoid_obstacles(position, Vec3::X, &env);
        assert!(deflected.z > 0.9);

        // Nothing ahead leaves the direction untouched
        assert_eq!(avoid_obstacles(position, Vec3::NEG_X, &env), Vec3::NEG_X);
    }

    #[test]
    fn test_boxed_in_backs_off() {
        let world = CollisionWorld::flat(0.0).with_obstacles([
            block(1, Vec2::new(1.0, 0.0), Vec2::new(0.2, 0.5)),
            block(2, Vec2::new(0.7, 0.7), Vec2::new(0.2, 0.2)),
            block(3, Vec2::new(0.7, -0.7), Vec2::new(0.2, 0.2)),
        ]);
        let predictor = MovementPredictor::default();
        let config = AutopilotConfig::default();
        let env = Surroundings {
            world: &world,
            predictor: &predictor,
            players: &[],
            config: &config,
            dt: DT,
        };
        let direction = avoid_obstacles(Vec3::new(0.0, 1.0, 0.0), Vec3::X, &env);
        assert_eq!(direction, Vec3::NEG_X);
    }

    #[test]
    fn test_flee_weights_nearer_threats() {
        let position = Vec3::ZERO;
        let threats = [Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 4.0), Vec3::new(-20.0, 0.0, 0.0)];
        let away = flee_direction(position, threats, 8.0);
        assert!((away.length() - 1.0).abs() < 1e-4);
        // Nearest threat at +X dominates; the far one at -X is ignored
        assert!(away.x < -0.9);
        assert!(away.z < 0.0);

        assert_eq!(flee_direction(position, [Vec3::new(30.0, 0.0, 0.0)], 8.0), Vec3::ZERO);
    }

    #[test]
    fn test_follow_aims_ahead_of_moving_target() {
        let world = CollisionWorld::flat(0.0);
        let mut predictor = MovementPredictor::default();
        let config = AutopilotConfig::default();
        let mut target = Vec3::new(0.0, 0.0, -6.0);
        for i in 0..60 {
            target = Vec3::new(i as f32 * 2.0 * DT, 0.0, -6.0);
            predictor.observe(42, target, i as f32 * DT);
        }
        let players = [(42u64, target)];
        let env = Surroundings {
            world: &world,
            predictor: &predictor,
            players: &players,
            config: &config,
            dt: DT,
        };

        let mut autopilot = Autopilot::new(AutopilotGoal::Follow { target: 42 });
        let command = autopilot.tick(&body_at(Vec3::ZERO), &env);
        let straight = horizontal(target).normalize();
        // Leads the target along +X rather than aiming straight at it
        assert!(command.direction.x > straight.x);
        assert!(command.turn < 0.0);

        let missing = Autopilot::new(AutopilotGoal::Follow { target: 7 }).tick(&body_at(Vec3::ZERO), &env);
        assert_eq!(missing, AutopilotCommand::default());
    }

    #[test]
    fn test_follow_reached_when_close() {
        let world = CollisionWorld::flat(0.0);
        let predictor = MovementPredictor::default();
        let config = AutopilotConfig::default();
        let players = [(5u64, Vec3::new(0.2, 0.0, 0.1))];
        let env = Surroundings {
            world: &world,
            predictor: &predictor,
            players: &players,
            config: &config,
            dt: DT,
        };
        let mut autopilot = Autopilot::new(AutopilotGoal::Follow { target: 5 });
        let command = autopilot.tick(&body_at(Vec3::ZERO), &env);
        assert!(command.reached);
        assert_eq!(command.direction, Vec3::ZERO);
    }
}
