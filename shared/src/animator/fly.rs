//! Free flight with a flapping wing pose.

use std::f32::consts::TAU;

use bevy::prelude::*;

use super::AnimContext;
use crate::hand::Hands;
use crate::rig::Rig;

/// Vertical amplitude of a wing flap relative to the shoulder.
const FLAP_AMPLITUDE: f32 = 0.25;

/// Shoulder height below the head.
const SHOULDER_DROP: f32 = 0.2;

#[derive(Clone, Debug, Default)]
pub struct FlyAnimator {
    flap_phase: f32,
}

impl FlyAnimator {
    pub fn flap_phase(&self) -> f32 {
        self.flap_phase
    }

    pub(super) fn animate(&mut self, rig: &mut Rig, hands: &mut Hands, ctx: &AnimContext) {
        let fly = &ctx.config.fly;
        let direction = ctx.input.direction.clamp_length_max(1.0);
        let speed = fly.fly_speed * rig.scale;
        rig.target = rig.position() + direction * (speed / ctx.config.rig.follow_speed.max(1e-3));

        // Idle hover still flaps slowly
        self.flap_phase = (self.flap_phase + (1.0 + rig.velocity.length() * fly.flap_rate) * ctx.dt).fract();
        let lift = (TAU * self.flap_phase).sin() * FLAP_AMPLITUDE * rig.scale;

        let shoulder = rig.head.translation - Vec3::Y * (SHOULDER_DROP * rig.scale);
        let forward = rig.forward();
        let right = rig.right();
        for driver in hands.iter_mut() {
            let wing = shoulder + right * (driver.hand.side() * fly.wing_span * rig.scale) + Vec3::Y * lift;
            driver.target = driver.clamp_to_reach(wing, rig, &ctx.config.hands);
            driver.look_at = driver.target + forward;
            driver.up = Vec3::Y;
            driver.grounded = false;
            driver.overridden = true;
        }
    }
}

/// Flight ignores gravity for as long as it is active.
pub(super) fn on_enter(rig: &mut Rig) {
    rig.use_gravity = false;
    rig.ground_follow = true;
}
