//! Procedural locomotion core: rigs, hand drivers, animators, movement prediction and
//! the bot autopilot, plus the Bevy plugin that runs them on the fixed tick.

use std::time::Duration;

pub mod animator;
pub mod autopilot;
pub mod ballistics;
pub mod config;
pub mod error;
pub mod hand;
pub mod history;
pub mod pathfind;
pub mod plugin;
pub mod predictor;
pub mod replay;
pub mod rig;
pub mod spatial;
pub mod terrain;
pub mod world;

pub use animator::{ActiveAnimator, AnimContext, Animator, AnimatorKind, AnimatorRequest, HandPose, MoveInput};
pub use autopilot::{Autopilot, AutopilotCommand, AutopilotGoal, BodyState, Surroundings};
pub use ballistics::{sample_arc, solve_launch, LaunchKind, LaunchSolution};
pub use config::{GaitMode, GaitParams, LocomotionConfig, GRAVITY};
pub use error::{LocomotionError, Result};
pub use hand::{ControllerState, Hand, HandButtons, HandDriver, Hands};
pub use history::BoundedHistory;
pub use pathfind::find_path;
pub use plugin::{bot_bundle, Bot, LocomotionPlugin, LocomotionSet, TrackedPlayer};
pub use predictor::{MovementPredictor, PlayerMovementData};
pub use replay::{Replay, ReplayFrame, ReplaySample, REPLAY_VERSION};
pub use rig::Rig;
pub use spatial::{ObstacleEntry, SpatialObstacleGrid};
pub use terrain::{TerrainSource, WorldTerrain};
pub use world::{CollisionWorld, ProbeHit, WorldProbe};

/// Fixed timestep for locomotion and autopilot (60 Hz)
pub const FIXED_TIMESTEP_HZ: f64 = 60.0;

/// Duration of one fixed tick
pub fn tick_duration() -> Duration {
    Duration::from_secs_f64(1.0 / FIXED_TIMESTEP_HZ)
}
