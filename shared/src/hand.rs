//! Per-hand drivers.
//!
//! Animators never move hand transforms directly: they set a target, look-at point and
//! follow rate, and the driver interpolates toward it every tick. In the walk gait the
//! hands double as feet, so the driver also remembers its last plant and ground hit.

use bevy::prelude::*;

use crate::config::HandConfig;
use crate::rig::Rig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    /// -1 for the left hand, +1 for the right.
    pub fn side(self) -> f32 {
        match self {
            Hand::Left => -1.0,
            Hand::Right => 1.0,
        }
    }

    pub fn opposite(self) -> Hand {
        match self {
            Hand::Left => Hand::Right,
            Hand::Right => Hand::Left,
        }
    }
}

/// Controller buttons an animator can hold down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HandButtons {
    pub grip: bool,
    pub trigger: bool,
    pub primary: bool,
    pub secondary: bool,
}

#[derive(Clone, Debug)]
pub struct HandDriver {
    pub hand: Hand,
    pub transform: Transform,
    pub target: Vec3,
    pub look_at: Vec3,
    pub up: Vec3,
    /// Per-tick interpolation factor in [0, 1].
    pub follow_rate: f32,
    pub buttons: HandButtons,
    pub grounded: bool,
    /// Where this hand was last planted.
    pub last_snap: Vec3,
    pub hit_point: Vec3,
    pub hit_normal: Vec3,
    /// True while an animator owns this hand.
    pub overridden: bool,
}

impl HandDriver {
    pub fn new(hand: Hand, position: Vec3, config: &HandConfig) -> Self {
        Self {
            hand,
            transform: Transform::from_translation(position),
            target: position,
            look_at: position + Vec3::NEG_Z,
            up: Vec3::Y,
            follow_rate: config.follow_rate,
            buttons: HandButtons::default(),
            grounded: false,
            last_snap: position,
            hit_point: position,
            hit_normal: Vec3::Y,
            overridden: false,
        }
    }

    /// Resting offset in body space.
    pub fn default_offset(hand: Hand, config: &HandConfig) -> Vec3 {
        Vec3::new(config.default_offset.x * hand.side(), config.default_offset.y, config.default_offset.z)
    }

    /// World-space resting anchor for this hand on `rig`.
    pub fn anchor(&self, rig: &Rig, config: &HandConfig) -> Vec3 {
        rig.body.translation + rig.body.rotation * (Self::default_offset(self.hand, config) * rig.scale)
    }

    /// Pull `point` back inside `max_reach` of the resting anchor.
    pub fn clamp_to_reach(&self, point: Vec3, rig: &Rig, config: &HandConfig) -> Vec3 {
        let anchor = self.anchor(rig, config);
        let offset = point - anchor;
        let reach = config.max_reach * rig.scale;
        if offset.length_squared() > reach * reach {
            anchor + offset.normalize() * reach
        } else {
            point
        }
    }

    /// Interpolate the transform toward the target and look-at orientation.
    pub fn follow(&mut self) {
        let rate = self.follow_rate.clamp(0.0, 1.0);
        self.transform.translation = self.transform.translation.lerp(self.target, rate);

        let look = self.look_at - self.transform.translation;
        if look.length_squared() > 1e-6 && look.cross(self.up).length_squared() > 1e-6 {
            let goal = Transform::from_translation(self.transform.translation)
                .looking_at(self.look_at, self.up)
                .rotation;
            self.transform.rotation = self.transform.rotation.slerp(goal, rate);
        }
    }

    /// Return to a neutral state at `position`, releasing every override.
    pub fn reset(&mut self, position: Vec3, config: &HandConfig) {
        self.target = position;
        self.look_at = position + Vec3::NEG_Z;
        self.up = Vec3::Y;
        self.follow_rate = config.follow_rate;
        self.buttons = HandButtons::default();
        self.grounded = false;
        self.last_snap = position;
        self.hit_point = position;
        self.hit_normal = Vec3::Y;
        self.overridden = false;
    }
}

/// Both hand drivers of one rig.
#[derive(Component, Clone, Debug)]
pub struct Hands {
    pub left: HandDriver,
    pub right: HandDriver,
}

impl Hands {
    /// Drivers placed at their resting anchors on `rig`.
    pub fn at_rest(rig: &Rig, config: &HandConfig) -> Self {
        let place = |hand| {
            let position = rig.body.translation + rig.body.rotation * (HandDriver::default_offset(hand, config) * rig.scale);
            HandDriver::new(hand, position, config)
        };
        Self {
            left: place(Hand::Left),
            right: place(Hand::Right),
        }
    }

    pub fn get(&self, hand: Hand) -> &HandDriver {
        match hand {
            Hand::Left => &self.left,
            Hand::Right => &self.right,
        }
    }

    pub fn get_mut(&mut self, hand: Hand) -> &mut HandDriver {
        match hand {
            Hand::Left => &mut self.left,
            Hand::Right => &mut self.right,
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut HandDriver> {
        [&mut self.left, &mut self.right].into_iter()
    }

    /// Reset both drivers to their resting anchors.
    pub fn reset(&mut self, rig: &Rig, config: &HandConfig) {
        for driver in self.iter_mut() {
            let anchor = driver.anchor(rig, config);
            driver.reset(anchor, config);
            driver.transform.translation = anchor;
        }
    }

    pub fn follow(&mut self) {
        for driver in self.iter_mut() {
            driver.follow();
        }
    }
}

/// The input poll animators force their buttons into.
#[derive(Component, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControllerState {
    pub left: HandButtons,
    pub right: HandButtons,
}

impl ControllerState {
    /// Overwrite the poll with whatever the drivers currently hold.
    pub fn force_from(&mut self, hands: &Hands) {
        self.left = hands.left.buttons;
        self.right = hands.right.buttons;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RigConfig;

    #[test]
    fn test_follow_converges_on_target() {
        let config = HandConfig::default();
        let mut driver = HandDriver::new(Hand::Right, Vec3::ZERO, &config);
        driver.target = Vec3::new(1.0, 0.5, -0.5);
        driver.look_at = driver.target + Vec3::NEG_Z;
        for _ in 0..60 {
            driver.follow();
        }
        assert!((driver.transform.translation - driver.target).length() < 1e-3);
    }

    #[test]
    fn test_reset_clears_overrides() {
        let config = HandConfig::default();
        let mut driver = HandDriver::new(Hand::Left, Vec3::ZERO, &config);
        driver.buttons.grip = true;
        driver.grounded = true;
        driver.overridden = true;
        driver.follow_rate = 1.0;

        driver.reset(Vec3::ONE, &config);
        assert_eq!(driver.buttons, HandButtons::default());
        assert!(!driver.grounded);
        assert!(!driver.overridden);
        assert_eq!(driver.follow_rate, config.follow_rate);
        assert_eq!(driver.target, Vec3::ONE);
    }

    #[test]
    fn test_clamp_to_reach() {
        let hand_config = HandConfig::default();
        let rig = Rig::new(Vec3::new(0.0, 1.0, 0.0), &RigConfig::default());
        let hands = Hands::at_rest(&rig, &hand_config);
        let anchor = hands.right.anchor(&rig, &hand_config);

        let far = anchor + Vec3::X * 5.0;
        let clamped = hands.right.clamp_to_reach(far, &rig, &hand_config);
        assert!(((clamped - anchor).length() - hand_config.max_reach).abs() < 1e-4);

        let near = anchor + Vec3::X * 0.1;
        assert_eq!(hands.right.clamp_to_reach(near, &rig, &hand_config), near);
    }

    #[test]
    fn test_hands_are_mirrored() {
        let hand_config = HandConfig::default();
        let rig = Rig::new(Vec3::ZERO, &RigConfig::default());
        let hands = Hands::at_rest(&rig, &hand_config);
        assert_eq!(hands.left.transform.translation.x, -hands.right.transform.translation.x);
    }

    #[test]
    fn test_controller_state_is_forced() {
        let hand_config = HandConfig::default();
        let rig = Rig::new(Vec3::ZERO, &RigConfig::default());
        let mut hands = Hands::at_rest(&rig, &hand_config);
        hands.right.buttons.trigger = true;

        let mut poll = ControllerState::default();
        poll.left.grip = true;
        poll.force_from(&hands);
        assert!(poll.right.trigger);
        assert!(!poll.left.grip);
    }
}
