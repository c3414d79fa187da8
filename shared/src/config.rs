//! Tuning values for the locomotion core.
//!
//! Every struct has defaults matching the constants below and derives serde with
//! `#[serde(default)]`, so a RON file only needs to list what it overrides.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

// =============================================================================
// WORLD
// =============================================================================

/// Gravity magnitude in m/s^2 (applied along -Y).
pub const GRAVITY: f32 = 9.81;

// =============================================================================
// RIG
// =============================================================================

/// Height above the body the ground probes start from.
pub const PROBE_OFFSET: f32 = 0.5;

/// How far below the body the ground probes reach (scaled by rig size).
pub const GROUND_CHECK_DISTANCE: f32 = 1.6;

/// Radius of the ground sphere probe.
pub const PROBE_RADIUS: f32 = 0.2;

/// Target-to-velocity gain: velocity = (target - position) * FOLLOW_SPEED.
pub const FOLLOW_SPEED: f32 = 10.0;

/// How quickly velocity blends toward the follow velocity (per second).
pub const VELOCITY_BLEND: f32 = 30.0;

/// Ground position smoothing rate (per second).
pub const GROUND_SMOOTHING: f32 = 12.0;

/// Minimum body clearance above the ground (scaled by rig size).
pub const MIN_CLEARANCE: f32 = 0.35;

/// Yaw rate for a full turn command, radians per second.
pub const TURN_RATE: f32 = 4.0;

/// Head position relative to the body.
pub const HEAD_OFFSET: Vec3 = Vec3::new(0.0, 0.45, 0.0);

// =============================================================================
// HANDS
// =============================================================================

/// Resting hand offsets in body space (left hand mirrors the right).
pub const DEFAULT_HAND_OFFSET: Vec3 = Vec3::new(0.22, -0.6, 0.1);

/// Per-tick interpolation factor for hand follow.
pub const HAND_FOLLOW_RATE: f32 = 0.35;

/// Hand targets never stray further than this from the resting offset.
pub const MAX_REACH: f32 = 0.75;

// =============================================================================
// ANIMATORS
// =============================================================================

/// Walking speed in meters per second before the gait multiplier.
pub const WALK_SPEED: f32 = 2.5;

/// Default jump launch angle (degrees).
pub const JUMP_ANGLE_DEG: f32 = 45.0;

/// Cooldown after a jump launch (seconds); also the maximum airborne time.
pub const JUMP_COOLDOWN: f32 = 1.0;

/// Flying speed in meters per second.
pub const FLY_SPEED: f32 = 4.0;

/// Body height above ground while holding a pose.
pub const POSE_HEIGHT: f32 = 1.0;

// =============================================================================
// AUTOPILOT
// =============================================================================

/// Horizontal distance at which a waypoint or target counts as reached.
pub const REACH_THRESHOLD: f32 = 0.5;

/// Height rise that turns a waypoint into a jump waypoint.
pub const JUMP_HEIGHT_THRESHOLD: f32 = 0.6;

/// Distance from a jump waypoint at which the armed jump fires.
pub const JUMP_PREPARE_DISTANCE: f32 = 1.2;

/// Largest heading error (degrees) the turn controller acts on at once.
pub const MAX_TURN_DEG: f32 = 90.0;

/// Divides the clamped heading error into a turn command.
pub const TURN_DIVISOR: f32 = 90.0;

/// Forward and diagonal obstacle probe length.
pub const AVOID_PROBE_DISTANCE: f32 = 1.5;

/// Backward obstacle probe length.
pub const AVOID_BACK_PROBE_DISTANCE: f32 = 0.5;

/// Threats further than this are ignored when fleeing.
pub const FLEE_RADIUS: f32 = 8.0;

/// How far ahead follow targets are predicted when no intercept is found.
pub const FOLLOW_LEAD_TIME: f32 = 0.3;

// =============================================================================
// CONFIG STRUCTS
// =============================================================================

/// Walking style. Each mode has its own height range, step height and stride.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GaitMode {
    Smooth,
    Tall,
    Short,
    #[default]
    Default,
}

/// Body and foot parameters for one gait mode.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GaitParams {
    /// Lowest body height above ground during the bob.
    pub min_height: f32,
    /// Highest body height above ground during the bob.
    pub max_height: f32,
    /// Peak foot lift during a swing.
    pub step_height: f32,
    /// Body travel that completes one step.
    pub stride_length: f32,
    /// Scales walking speed and cycle rate.
    pub speed_multiplier: f32,
}

impl GaitParams {
    pub fn for_mode(mode: GaitMode) -> Self {
        match mode {
            GaitMode::Smooth => Self {
                min_height: 0.98,
                max_height: 1.02,
                step_height: 0.12,
                stride_length: 0.7,
                speed_multiplier: 0.8,
            },
            GaitMode::Tall => Self {
                min_height: 1.25,
                max_height: 1.35,
                step_height: 0.3,
                stride_length: 0.8,
                speed_multiplier: 1.1,
            },
            GaitMode::Short => Self {
                min_height: 0.6,
                max_height: 0.7,
                step_height: 0.12,
                stride_length: 0.4,
                speed_multiplier: 1.3,
            },
            GaitMode::Default => Self {
                min_height: 0.95,
                max_height: 1.05,
                step_height: 0.2,
                stride_length: 0.6,
                speed_multiplier: 1.0,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    pub probe_offset: f32,
    pub ground_check_distance: f32,
    pub probe_radius: f32,
    pub follow_speed: f32,
    pub velocity_blend: f32,
    pub ground_smoothing: f32,
    pub min_clearance: f32,
    pub turn_rate: f32,
    pub head_offset: Vec3,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            probe_offset: PROBE_OFFSET,
            ground_check_distance: GROUND_CHECK_DISTANCE,
            probe_radius: PROBE_RADIUS,
            follow_speed: FOLLOW_SPEED,
            velocity_blend: VELOCITY_BLEND,
            ground_smoothing: GROUND_SMOOTHING,
            min_clearance: MIN_CLEARANCE,
            turn_rate: TURN_RATE,
            head_offset: HEAD_OFFSET,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandConfig {
    /// Right-hand resting offset; the left hand uses the X-mirrored value.
    pub default_offset: Vec3,
    pub follow_rate: f32,
    pub max_reach: f32,
}

impl Default for HandConfig {
    fn default() -> Self {
        Self {
            default_offset: DEFAULT_HAND_OFFSET,
            follow_rate: HAND_FOLLOW_RATE,
            max_reach: MAX_REACH,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    pub walk_speed: f32,
    pub gait: GaitMode,
    pub smooth: GaitParams,
    pub tall: GaitParams,
    pub short: GaitParams,
    pub default: GaitParams,
    pub jump_angle_deg: f32,
    pub jump_cooldown: f32,
}

impl WalkConfig {
    pub fn gait_params(&self, mode: GaitMode) -> GaitParams {
        match mode {
            GaitMode::Smooth => self.smooth,
            GaitMode::Tall => self.tall,
            GaitMode::Short => self.short,
            GaitMode::Default => self.default,
        }
    }
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            walk_speed: WALK_SPEED,
            gait: GaitMode::Default,
            smooth: GaitParams::for_mode(GaitMode::Smooth),
            tall: GaitParams::for_mode(GaitMode::Tall),
            short: GaitParams::for_mode(GaitMode::Short),
            default: GaitParams::for_mode(GaitMode::Default),
            jump_angle_deg: JUMP_ANGLE_DEG,
            jump_cooldown: JUMP_COOLDOWN,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlyConfig {
    pub fly_speed: f32,
    /// Sideways spread of the wing pose.
    pub wing_span: f32,
    /// Flap cycles per meter travelled.
    pub flap_rate: f32,
}

impl Default for FlyConfig {
    fn default() -> Self {
        Self {
            fly_speed: FLY_SPEED,
            wing_span: 0.6,
            flap_rate: 0.8,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    pub pose_height: f32,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            pose_height: POSE_HEIGHT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutopilotConfig {
    pub reach_threshold: f32,
    pub jump_height_threshold: f32,
    pub jump_prepare_distance: f32,
    pub max_turn_deg: f32,
    pub turn_divisor: f32,
    pub avoid_probe_distance: f32,
    pub avoid_back_probe_distance: f32,
    pub flee_radius: f32,
    pub follow_lead_time: f32,
    /// Intercept search speed for rigs whose animator reports no travel speed.
    pub intercept_speed: f32,
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            reach_threshold: REACH_THRESHOLD,
            jump_height_threshold: JUMP_HEIGHT_THRESHOLD,
            jump_prepare_distance: JUMP_PREPARE_DISTANCE,
            max_turn_deg: MAX_TURN_DEG,
            turn_divisor: TURN_DIVISOR,
            avoid_probe_distance: AVOID_PROBE_DISTANCE,
            avoid_back_probe_distance: AVOID_BACK_PROBE_DISTANCE,
            flee_radius: FLEE_RADIUS,
            follow_lead_time: FOLLOW_LEAD_TIME,
            intercept_speed: WALK_SPEED,
        }
    }
}

/// All locomotion tuning in one resource.
#[derive(Resource, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocomotionConfig {
    pub gravity: f32,
    pub rig: RigConfig,
    pub hands: HandConfig,
    pub walk: WalkConfig,
    pub fly: FlyConfig,
    pub pose: PoseConfig,
    pub autopilot: AutopilotConfig,
}

impl Default for LocomotionConfig {
    fn default() -> Self {
        Self {
            gravity: GRAVITY,
            rig: RigConfig::default(),
            hands: HandConfig::default(),
            walk: WalkConfig::default(),
            fly: FlyConfig::default(),
            pose: PoseConfig::default(),
            autopilot: AutopilotConfig::default(),
        }
    }
}

impl LocomotionConfig {
    /// Parse from RON text.
    pub fn from_ron(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }

    /// Load from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_ron(&text)
    }
}
