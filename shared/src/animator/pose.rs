//! Static hand poses held relative to the head.

use std::f32::consts::TAU;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::AnimContext;
use crate::hand::{Hand, HandButtons, HandDriver, Hands};
use crate::rig::Rig;

/// Wave oscillations per second.
const WAVE_RATE: f32 = 2.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum HandPose {
    #[default]
    Rest,
    /// Both hands above the head, triggers held.
    Raised,
    /// Right hand waving beside the head.
    Wave,
    /// Right hand pointing at a world position with the grip held.
    Point { at: Vec3 },
}

#[derive(Clone, Debug)]
pub struct PoseAnimator {
    pub pose: HandPose,
    time: f32,
}

impl PoseAnimator {
    pub fn new(pose: HandPose) -> Self {
        Self { pose, time: 0.0 }
    }

    pub(super) fn animate(&mut self, rig: &mut Rig, hands: &mut Hands, ctx: &AnimContext) {
        self.time += ctx.dt;
        let position = rig.position();
        let height = ctx.config.pose.pose_height * rig.scale;
        rig.target = Vec3::new(position.x, rig.ground.smoothed_position.y + height, position.z);

        let head = rig.head.translation;
        let right = rig.right();
        let forward = rig.forward();
        let scale = rig.scale;

        for hand in [Hand::Left, Hand::Right] {
            let side = hand.side();
            let driver = hands.get_mut(hand);
            let (target, look_at, buttons) = match self.pose {
                HandPose::Rest => {
                    let anchor = driver.anchor(rig, &ctx.config.hands);
                    (anchor, anchor + forward, HandButtons::default())
                }
                HandPose::Raised => {
                    let target = head + (right * (0.25 * side) + Vec3::Y * 0.3) * scale;
                    let buttons = HandButtons {
                        trigger: true,
                        ..default()
                    };
                    (target, target + Vec3::Y, buttons)
                }
                HandPose::Wave if hand == Hand::Right => {
                    let sway = (TAU * WAVE_RATE * self.time).sin() * 0.1;
                    let target = head + (right * (0.35 + sway) + Vec3::Y * 0.2) * scale;
                    (target, target + Vec3::Y, HandButtons::default())
                }
                HandPose::Point { at } if hand == Hand::Right => {
                    let aim = (at - head).normalize_or(forward);
                    let target = head + aim * (0.6 * scale);
                    let buttons = HandButtons {
                        grip: true,
                        ..default()
                    };
                    (target, at, buttons)
                }
                HandPose::Wave | HandPose::Point { .. } => {
                    let anchor = driver.anchor(rig, &ctx.config.hands);
                    (anchor, anchor + forward, HandButtons::default())
                }
            };
            place(driver, rig, target, look_at, buttons, ctx);
        }
    }
}

fn place(driver: &mut HandDriver, rig: &Rig, target: Vec3, look_at: Vec3, buttons: HandButtons, ctx: &AnimContext) {
    driver.target = driver.clamp_to_reach(target, rig, &ctx.config.hands);
    driver.look_at = look_at;
    driver.up = Vec3::Y;
    driver.buttons = buttons;
    driver.grounded = false;
    driver.overridden = true;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animator::MoveInput;
    use crate::config::LocomotionConfig;
    use crate::world::CollisionWorld;

    fn run(pose: HandPose, ticks: usize) -> (Rig, Hands) {
        let config = LocomotionConfig::default();
        let world = CollisionWorld::flat(0.0);
        let mut rig = Rig::new(Vec3::new(0.0, 1.0, 0.0), &config.rig);
        let mut hands = Hands::at_rest(&rig, &config.hands);
        let mut animator = PoseAnimator::new(pose);
        let input = MoveInput::default();
        let dt = 1.0 / 60.0;
        for _ in 0..ticks {
            rig.sense_ground(&world, &config.rig);
            rig.smooth_ground(dt, &config.rig);
            let ctx = AnimContext {
                world: &world,
                config: &config,
                input: &input,
                dt,
            };
            animator.animate(&mut rig, &mut hands, &ctx);
            rig.integrate(&world, config.gravity, dt, &config.rig);
            hands.follow();
        }
        (rig, hands)
    }

    #[test]
    fn test_raised_hands_hold_triggers_above_body() {
        let (rig, hands) = run(HandPose::Raised, 90);
        assert!(hands.left.buttons.trigger && hands.right.buttons.trigger);
        assert!(hands.left.transform.translation.y > rig.position().y);
        assert!(hands.right.transform.translation.y > rig.position().y);
    }

    #[test]
    fn test_point_grips_right_hand_only() {
        let (_, hands) = run(HandPose::Point { at: Vec3::new(5.0, 1.0, -5.0) }, 30);
        assert!(hands.right.buttons.grip);
        assert_eq!(hands.left.buttons, HandButtons::default());
        assert_eq!(hands.right.look_at, Vec3::new(5.0, 1.0, -5.0));
    }

    #[test]
    fn test_body_holds_pose_height() {
        let (rig, _) = run(HandPose::Rest, 120);
        let config = LocomotionConfig::default();
        assert!((rig.height_above_ground() - config.pose.pose_height).abs() < 0.1);
    }
}
