//! Animator strategies.
//!
//! Exactly one animator drives a rig at a time. Switching always runs `on_exit` on the old
//! strategy (hands back to neutral, gravity and ground-follow restored) before `on_enter` on
//! the new one.

mod fly;
mod pose;
mod walk;

pub use fly::FlyAnimator;
pub use pose::{HandPose, PoseAnimator};
pub use walk::{JumpState, WalkAnimator};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{GaitMode, LocomotionConfig};
use crate::hand::Hands;
use crate::rig::Rig;
use crate::world::WorldProbe;

// =============================================================================
// INPUT
// =============================================================================

/// Movement request consumed by the active animator each tick.
#[derive(Component, Clone, Debug, Default, PartialEq)]
pub struct MoveInput {
    /// World-space direction; its length (capped at 1) scales speed.
    pub direction: Vec3,
    /// Turn command in [-1, 1], positive turns counter-clockwise.
    pub turn: f32,
    /// Landing point for a ballistic jump, if one should fire this tick.
    pub jump_target: Option<Vec3>,
    /// Overrides the animator's configured gait.
    pub gait: Option<GaitMode>,
}

/// Everything an animator reads besides the rig and hands.
pub struct AnimContext<'a> {
    pub world: &'a dyn WorldProbe,
    pub config: &'a LocomotionConfig,
    pub input: &'a MoveInput,
    pub dt: f32,
}

// =============================================================================
// STRATEGY ENUM
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnimatorKind {
    #[default]
    Walk,
    Fly,
    Pose,
}

#[derive(Clone, Debug)]
pub enum Animator {
    Walk(WalkAnimator),
    Fly(FlyAnimator),
    Pose(PoseAnimator),
}

impl Animator {
    pub fn from_kind(kind: AnimatorKind, config: &LocomotionConfig) -> Self {
        match kind {
            AnimatorKind::Walk => Animator::Walk(WalkAnimator::new(&config.walk)),
            AnimatorKind::Fly => Animator::Fly(FlyAnimator::default()),
            AnimatorKind::Pose => Animator::Pose(PoseAnimator::new(HandPose::Rest)),
        }
    }

    pub fn kind(&self) -> AnimatorKind {
        match self {
            Animator::Walk(_) => AnimatorKind::Walk,
            Animator::Fly(_) => AnimatorKind::Fly,
            Animator::Pose(_) => AnimatorKind::Pose,
        }
    }

    pub fn on_enter(&mut self, rig: &mut Rig, hands: &mut Hands, config: &LocomotionConfig) {
        match self {
            Animator::Walk(walk) => walk.on_enter(rig),
            Animator::Fly(_) => fly::on_enter(rig),
            Animator::Pose(_) => {}
        }
        for driver in hands.iter_mut() {
            driver.overridden = true;
            driver.follow_rate = config.hands.follow_rate;
        }
    }

    /// Horizontal speed this strategy moves the body at under full input, or `None` when it
    /// holds the body in place.
    pub fn travel_speed(&self, input: &MoveInput, rig: &Rig, config: &LocomotionConfig) -> Option<f32> {
        match self {
            Animator::Walk(walk) => {
                let params = config.walk.gait_params(input.gait.unwrap_or(walk.gait));
                Some(config.walk.walk_speed * params.speed_multiplier * rig.scale)
            }
            Animator::Fly(_) => Some(config.fly.fly_speed * rig.scale),
            Animator::Pose(_) => None,
        }
    }

    /// Ballistic jumps launched so far.
    pub fn jump_launches(&self) -> u32 {
        match self {
            Animator::Walk(walk) => walk.jumps(),
            _ => 0,
        }
    }

    /// Release everything this strategy may have overridden.
    pub fn on_exit(&mut self, rig: &mut Rig, hands: &mut Hands, config: &LocomotionConfig) {
        hands.reset(rig, &config.hands);
        rig.use_gravity = true;
        rig.ground_follow = true;
        rig.target = rig.position();
    }

    /// Compute this tick's body target and hand targets.
    pub fn animate(&mut self, rig: &mut Rig, hands: &mut Hands, ctx: &AnimContext) {
        match self {
            Animator::Walk(walk) => walk.animate(rig, hands, ctx),
            Animator::Fly(fly) => fly.animate(rig, hands, ctx),
            Animator::Pose(pose) => pose.animate(rig, hands, ctx),
        }
    }
}

/// The single animator driving a rig.
#[derive(Component, Clone, Debug)]
pub struct ActiveAnimator {
    current: Animator,
    transitions: u32,
}

impl ActiveAnimator {
    /// Activate `animator` on a freshly spawned rig.
    pub fn start(mut animator: Animator, rig: &mut Rig, hands: &mut Hands, config: &LocomotionConfig) -> Self {
        animator.on_enter(rig, hands, config);
        Self {
            current: animator,
            transitions: 0,
        }
    }

    pub fn current(&self) -> &Animator {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut Animator {
        &mut self.current
    }

    pub fn kind(&self) -> AnimatorKind {
        self.current.kind()
    }

    /// Number of switches since the rig was spawned.
    pub fn transitions(&self) -> u32 {
        self.transitions
    }

    /// Exit the current animator and enter `next`.
    pub fn switch(&mut self, mut next: Animator, rig: &mut Rig, hands: &mut Hands, config: &LocomotionConfig) {
        let from = self.current.kind();
        self.current.on_exit(rig, hands, config);
        next.on_enter(rig, hands, config);
        debug!("Animator switch {:?} -> {:?}", from, next.kind());
        self.current = next;
        self.transitions += 1;
    }

    pub fn animate(&mut self, rig: &mut Rig, hands: &mut Hands, ctx: &AnimContext) {
        self.current.animate(rig, hands, ctx);
    }
}

/// Ask the locomotion plugin to switch an entity's animator.
#[derive(Message, Clone, Copy, Debug)]
pub struct AnimatorRequest {
    pub entity: Entity,
    pub kind: AnimatorKind,
}

// =============================================================================
// SHARED MATH
// =============================================================================

/// Spherical interpolation of two points around `pivot`, blending their distances linearly.
pub fn slerp_points(from: Vec3, to: Vec3, t: f32, pivot: Vec3) -> Vec3 {
    let a = from - pivot;
    let b = to - pivot;
    let (len_a, len_b) = (a.length(), b.length());
    if len_a < 1e-4 || len_b < 1e-4 {
        return from.lerp(to, t);
    }
    let arc = Quat::from_rotation_arc(a / len_a, b / len_b);
    let rotation = Quat::IDENTITY.slerp(arc, t);
    pivot + rotation * (a / len_a) * (len_a + (len_b - len_a) * t)
}

/// Remove the component of `v` along `normal`.
pub fn project_on_plane(v: Vec3, normal: Vec3) -> Vec3 {
    let n = normal.normalize_or(Vec3::Y);
    v - n * v.dot(n)
}

/// Flatten to the XZ plane.
#[inline]
pub fn horizontal(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}
