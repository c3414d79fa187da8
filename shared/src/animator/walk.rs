//! Bipedal gait and ballistic jumps.
//!
//! The hands double as feet. One foot swings while the other stays planted; the swinging
//! foot plants once the body has covered a full stride since the last plant, and the roles
//! swap. Body height bobs within the gait's height range, driven by time when idle and by
//! stride progress when walking.

use std::f32::consts::{PI, TAU};

use bevy::prelude::*;

use super::{AnimContext, horizontal, project_on_plane, slerp_points};
use crate::ballistics::solve_launch;
use crate::config::{GaitMode, GaitParams, WalkConfig};
use crate::hand::{Hand, HandDriver, Hands};
use crate::rig::Rig;

/// Slack above the gait's max height within which a descending body counts as landed.
const LANDING_HEIGHT_SLACK: f32 = 0.1;

/// Downward reach of the foot probes below the smoothed ground point.
const FOOT_PROBE_DEPTH: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JumpState {
    Grounded,
    Airborne { elapsed: f32 },
}

#[derive(Clone, Debug)]
pub struct WalkAnimator {
    pub gait: GaitMode,
    pub jump_angle_deg: f32,
    state: JumpState,
    cooldown: f32,
    bob_time: f32,
    walk_cycle_time: f32,
    swing: Hand,
    /// Body position (horizontal) at the last foot plant.
    last_plant_body: Vec3,
    steps_taken: u32,
    jumps: u32,
    landings: u32,
}

impl WalkAnimator {
    pub fn new(config: &WalkConfig) -> Self {
        Self {
            gait: config.gait,
            jump_angle_deg: config.jump_angle_deg,
            state: JumpState::Grounded,
            cooldown: 0.0,
            bob_time: 0.0,
            walk_cycle_time: 0.0,
            swing: Hand::Right,
            last_plant_body: Vec3::ZERO,
            steps_taken: 0,
            jumps: 0,
            landings: 0,
        }
    }

    pub fn state(&self) -> JumpState {
        self.state
    }

    pub fn is_airborne(&self) -> bool {
        matches!(self.state, JumpState::Airborne { .. })
    }

    /// Remaining jump cooldown in seconds.
    pub fn cooldown(&self) -> f32 {
        self.cooldown
    }

    pub fn walk_cycle_time(&self) -> f32 {
        self.walk_cycle_time
    }

    pub fn swinging_foot(&self) -> Hand {
        self.swing
    }

    pub fn steps_taken(&self) -> u32 {
        self.steps_taken
    }

    pub fn jumps(&self) -> u32 {
        self.jumps
    }

    pub fn landings(&self) -> u32 {
        self.landings
    }

    pub(super) fn on_enter(&mut self, rig: &Rig) {
        self.state = JumpState::Grounded;
        self.walk_cycle_time = 0.0;
        self.last_plant_body = horizontal(rig.position());
    }

    pub(super) fn animate(&mut self, rig: &mut Rig, hands: &mut Hands, ctx: &AnimContext) {
        let walk = &ctx.config.walk;
        let params = walk.gait_params(ctx.input.gait.unwrap_or(self.gait));
        self.cooldown = (self.cooldown - ctx.dt).max(0.0);

        if let JumpState::Airborne { elapsed } = self.state {
            let elapsed = elapsed + ctx.dt;
            let landed = rig.ground.on_ground
                && rig.velocity.y <= 0.0
                && rig.height_above_ground() <= params.max_height * rig.scale + LANDING_HEIGHT_SLACK;
            if landed || elapsed >= walk.jump_cooldown {
                self.land(rig, elapsed);
            } else {
                self.state = JumpState::Airborne { elapsed };
                rig.target = rig.position();
                tuck_feet(rig, hands, ctx);
                return;
            }
        }

        if let Some(landing) = ctx.input.jump_target {
            if self.cooldown <= 0.0 && rig.ground.on_ground {
                self.launch(rig, landing, &params, ctx);
                tuck_feet(rig, hands, ctx);
                return;
            }
        }

        let direction = horizontal(ctx.input.direction).clamp_length_max(1.0);
        if direction.length_squared() > 1e-4 {
            self.walk_step(rig, hands, direction, &params, walk, ctx);
        } else {
            self.stand(rig, hands, &params, ctx);
        }
    }

    fn launch(&mut self, rig: &mut Rig, landing: Vec3, params: &GaitParams, ctx: &AnimContext) {
        let from = rig.position();
        let to = landing + Vec3::Y * (params.min_height * rig.scale);
        let solution = solve_launch(from, to, self.jump_angle_deg, ctx.config.gravity * rig.scale);

        rig.velocity = solution.velocity;
        rig.ground_follow = false;
        rig.target = from;
        self.state = JumpState::Airborne { elapsed: 0.0 };
        self.cooldown = ctx.config.walk.jump_cooldown;
        self.jumps += 1;
        debug!(
            "Jump launch {:?} toward {:?} ({:?}, flight {:.2}s)",
            from, landing, solution.kind, solution.flight_time
        );
    }

    fn land(&mut self, rig: &mut Rig, elapsed: f32) {
        self.state = JumpState::Grounded;
        self.landings += 1;
        self.walk_cycle_time = 0.0;
        self.last_plant_body = horizontal(rig.position());
        rig.ground_follow = true;
        debug!("Jump landed at {:?} after {:.2}s", rig.position(), elapsed);
    }

    /// No horizontal input: idle bob, both feet planted on their hit points.
    fn stand(&mut self, rig: &mut Rig, hands: &mut Hands, params: &GaitParams, ctx: &AnimContext) {
        self.bob_time += ctx.dt;
        self.walk_cycle_time = 0.0;
        self.last_plant_body = horizontal(rig.position());

        let bob = 0.5 + 0.5 * (TAU * self.bob_time).sin();
        let height = params.min_height + (params.max_height - params.min_height) * bob;
        let position = rig.position();
        rig.target = Vec3::new(position.x, rig.ground.smoothed_position.y + height * rig.scale, position.z);

        for hand in [Hand::Left, Hand::Right] {
            let hit = foot_hit(rig, hand, Vec3::ZERO, params, ctx);
            let driver = hands.get_mut(hand);
            plant(driver, rig, hit, ctx);
        }
    }

    fn walk_step(
        &mut self,
        rig: &mut Rig,
        hands: &mut Hands,
        direction: Vec3,
        params: &GaitParams,
        walk: &WalkConfig,
        ctx: &AnimContext,
    ) {
        let position = rig.position();
        let stride = (params.stride_length * rig.scale).max(1e-3);
        let travelled = horizontal(position - self.last_plant_body).length();
        let normalized = travelled / stride;
        self.walk_cycle_time = normalized * params.speed_multiplier;

        let height = params.min_height + (params.max_height - params.min_height) * (PI * self.walk_cycle_time.clamp(0.0, 1.0)).sin();
        let speed = walk.walk_speed * params.speed_multiplier * rig.scale;
        let lead = direction * (speed / ctx.config.rig.follow_speed.max(1e-3));
        rig.target = Vec3::new(
            position.x + lead.x,
            rig.ground.smoothed_position.y + height * rig.scale,
            position.z + lead.z,
        );

        let planted = self.swing.opposite();
        let hold = hands.get(planted).last_snap;
        let planted_driver = hands.get_mut(planted);
        planted_driver.target = planted_driver.clamp_to_reach(hold, rig, &ctx.config.hands);
        planted_driver.grounded = true;

        let phase = normalized.clamp(0.0, 1.0);
        let hit = foot_hit(rig, self.swing, direction, params, ctx);
        let swing_driver = hands.get_mut(self.swing);
        if normalized >= 1.0 {
            plant(swing_driver, rig, hit, ctx);
            hands.get_mut(planted).grounded = false;
            trace!("Foot plant {:?} at {:?}", self.swing, hit.0);
            self.swing = planted;
            self.last_plant_body = horizontal(position);
            self.steps_taken += 1;
            return;
        }

        let (point, normal) = hit;
        let arc = slerp_points(swing_driver.last_snap, point, phase, position);
        let lifted = arc + Vec3::Y * ((PI * phase).sin() * params.step_height * rig.scale);
        swing_driver.target = swing_driver.clamp_to_reach(lifted, rig, &ctx.config.hands);
        swing_driver.look_at = swing_driver.target + direction;
        swing_driver.up = normal;
        swing_driver.hit_point = point;
        swing_driver.hit_normal = normal;
        swing_driver.grounded = false;
    }
}

/// Ground point under a foot's probe position, falling back to the smoothed ground.
fn foot_hit(rig: &Rig, hand: Hand, direction: Vec3, params: &GaitParams, ctx: &AnimContext) -> (Vec3, Vec3) {
    let ground = rig.ground.smoothed_position;
    let hip = HandDriver::default_offset(hand, &ctx.config.hands).x * rig.scale;
    let lead = direction * (params.stride_length * 0.5 * rig.scale);
    let offset = project_on_plane(rig.right() * hip + lead, rig.ground.last_normal);
    let probe = ground + offset;

    let origin = probe + Vec3::Y * ctx.config.rig.probe_offset;
    let reach = ctx.config.rig.probe_offset + FOOT_PROBE_DEPTH * rig.scale;
    match ctx.world.raycast(origin, Vec3::NEG_Y, reach) {
        Some(hit) => (hit.point, hit.normal),
        None => (probe, rig.ground.last_normal),
    }
}

fn plant(driver: &mut HandDriver, rig: &Rig, (point, normal): (Vec3, Vec3), ctx: &AnimContext) {
    driver.target = driver.clamp_to_reach(point, rig, &ctx.config.hands);
    driver.look_at = driver.target + rig.forward();
    driver.up = normal;
    driver.hit_point = point;
    driver.hit_normal = normal;
    driver.last_snap = point;
    driver.grounded = true;
}

/// Pull both feet to their resting anchors for the flight.
fn tuck_feet(rig: &Rig, hands: &mut Hands, ctx: &AnimContext) {
    for driver in hands.iter_mut() {
        driver.target = driver.anchor(rig, &ctx.config.hands);
        driver.look_at = driver.target + rig.forward();
        driver.up = Vec3::Y;
        driver.grounded = false;
    }
}
