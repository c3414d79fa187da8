//! Scenario files - what the simulation spawns and for how long.
//!
//! A scenario file is RON holding a [`SimConfig`]: locomotion tuning plus the scenario
//! itself. Every field has a default, so `()` is a valid file.

use std::path::{Path, PathBuf};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use shared::animator::PoseAnimator;
use shared::{
    find_path, Animator, AnimatorKind, Autopilot, AutopilotGoal, CollisionWorld, GaitMode, HandPose,
    LocomotionConfig, ObstacleEntry, Result, TerrainSource,
};

/// Consulted when no config path is passed on the command line.
pub const CONFIG_ENV_VAR: &str = "LOCOMOTION_CONFIG";

/// Default simulated run time (seconds).
pub const DEFAULT_DURATION: f32 = 20.0;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub locomotion: LocomotionConfig,
    pub scenario: Scenario,
}

impl SimConfig {
    pub fn from_ron(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_ron(&text)
    }

    /// Config path from the first CLI argument, else from `LOCOMOTION_CONFIG`.
    pub fn path_from_env() -> Option<PathBuf> {
        std::env::args_os()
            .nth(1)
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR))
            .map(PathBuf::from)
    }
}

#[derive(Resource, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Simulated seconds before the app exits.
    pub duration: f32,
    /// Seeds scripted player randomness.
    pub seed: u64,
    pub terrain: TerrainSource,
    pub obstacles: Vec<ObstacleEntry>,
    pub bot: BotSpec,
    pub players: Vec<PlayerSpec>,
    /// Record tracked player movement to this file.
    pub record_replay: Option<PathBuf>,
    /// Drive tracked players from this replay instead of their scripts.
    pub play_replay: Option<PathBuf>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            duration: DEFAULT_DURATION,
            seed: 7,
            terrain: TerrainSource::default(),
            obstacles: Vec::new(),
            bot: BotSpec::default(),
            players: vec![PlayerSpec {
                id: 1,
                script: PlayerScript::Circle {
                    center: Vec3::ZERO,
                    radius: 6.0,
                    speed: 1.5,
                },
            }],
            record_replay: None,
            play_replay: None,
        }
    }
}

// =============================================================================
// BOT
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotSpec {
    /// X/Z place the bot; Y is added to the ground height there.
    pub spawn: Vec3,
    pub animator: AnimatorKind,
    /// Only used by the pose animator.
    pub pose: HandPose,
    pub gait: Option<GaitMode>,
    pub goal: BotGoal,
}

impl Default for BotSpec {
    fn default() -> Self {
        Self {
            spawn: Vec3::new(0.0, 1.0, -4.0),
            animator: AnimatorKind::Walk,
            pose: HandPose::Rest,
            gait: None,
            goal: BotGoal::Follow { target: 1 },
        }
    }
}

impl BotSpec {
    pub fn animator(&self, config: &LocomotionConfig) -> Animator {
        match self.animator {
            AnimatorKind::Pose => Animator::Pose(PoseAnimator::new(self.pose)),
            kind => Animator::from_kind(kind, config),
        }
    }

    pub fn autopilot(&self, start: Vec3, world: &CollisionWorld) -> Autopilot {
        match &self.goal {
            BotGoal::Idle => Autopilot::new(AutopilotGoal::Idle),
            BotGoal::Follow { target } => Autopilot::new(AutopilotGoal::Follow { target: *target }),
            BotGoal::Flee => Autopilot::new(AutopilotGoal::Flee),
            BotGoal::Path(route) => Autopilot::with_path(route.waypoints(start, world)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum BotGoal {
    #[default]
    Idle,
    Follow {
        target: u64,
    },
    Flee,
    Path(Route),
}

/// Waypoint presets for path goals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Route {
    /// Explicit waypoints, used as given.
    Points(Vec<Vec3>),
    /// Walk a square of `size` starting and ending at the spawn point.
    Square { size: f32 },
    /// Out along +X for `length`, then back.
    Line { length: f32 },
    /// Plan around obstacles to a destination.
    To(Vec3),
}

impl Route {
    pub fn waypoints(&self, start: Vec3, world: &CollisionWorld) -> Vec<Vec3> {
        let ground = |offset: Vec3| {
            let p = start + offset;
            Vec3::new(p.x, world.terrain.get_height(p.x, p.z), p.z)
        };
        match self {
            Route::Points(points) => points.clone(),
            Route::Square { size } => [
                Vec3::new(*size, 0.0, 0.0),
                Vec3::new(*size, 0.0, *size),
                Vec3::new(0.0, 0.0, *size),
                Vec3::ZERO,
            ]
            .into_iter()
            .map(ground)
            .collect(),
            Route::Line { length } => vec![ground(Vec3::new(*length, 0.0, 0.0)), ground(Vec3::ZERO)],
            Route::To(goal) => {
                let path = find_path(world, start, *goal);
                if path.is_empty() {
                    warn!("No path from {:?} to {:?}, heading straight for it", start, goal);
                    vec![*goal]
                } else {
                    path
                }
            }
        }
    }
}

// =============================================================================
// TRACKED PLAYERS
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerSpec {
    pub id: u64,
    pub script: PlayerScript,
}

/// How a scripted tracked player moves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PlayerScript {
    /// Counter-clockwise laps at `speed` m/s.
    Circle { center: Vec3, radius: f32, speed: f32 },
    /// Walk the points in order, looping.
    Patrol { points: Vec<Vec3>, speed: f32 },
    /// Walk along `direction`, hopping once every `hop_period` seconds.
    Hopper {
        start: Vec3,
        direction: Vec3,
        speed: f32,
        hop_height: f32,
        hop_period: f32,
    },
    /// Random targets within `radius` of `home`.
    Wander { home: Vec3, radius: f32, speed: f32 },
}
