//! Scripted tracked players
//!
//! These stand in for the remote players a bot follows or flees. They move kinematically
//! over the terrain and only expose a `Transform`, which is all the predictor sees.

use std::f32::consts::{PI, TAU};

use bevy::prelude::*;
use rand::rngs::StdRng;
use rand::Rng;
use shared::animator::horizontal;
use shared::{CollisionWorld, TrackedPlayer, WorldTerrain};

use crate::replay::ReplayPlayback;
use crate::scenario::{PlayerScript, Scenario};

/// Body height of a scripted player above the ground.
pub const STANDING_HEIGHT: f32 = 1.0;

/// Wander targets count as reached inside this radius.
const ARRIVE_DISTANCE: f32 = 0.3;

/// Share of each hop period a hopper spends in the air.
const HOP_AIR_FRACTION: f32 = 0.6;

/// Shared randomness for scripted players, seeded from the scenario.
#[derive(Resource)]
pub struct ScenarioRng(pub StdRng);

#[derive(Component, Clone, Debug)]
pub struct ScriptedMotion {
    pub script: PlayerScript,
    elapsed: f32,
    leg: usize,
    wander_target: Option<Vec3>,
}

impl ScriptedMotion {
    pub fn new(script: PlayerScript) -> Self {
        Self {
            script,
            elapsed: 0.0,
            leg: 0,
            wander_target: None,
        }
    }

    pub fn start_position(&self, terrain: &WorldTerrain) -> Vec3 {
        let p = match &self.script {
            PlayerScript::Circle { center, radius, .. } => *center + Vec3::X * *radius,
            PlayerScript::Patrol { points, .. } => points.first().copied().unwrap_or(Vec3::ZERO),
            PlayerScript::Hopper { start, .. } => *start,
            PlayerScript::Wander { home, .. } => *home,
        };
        stand_on(terrain, p)
    }

    /// Position one tick of `dt` after `position`.
    pub fn step(&mut self, position: Vec3, dt: f32, terrain: &WorldTerrain, rng: &mut impl Rng) -> Vec3 {
        self.elapsed += dt;
        match &self.script {
            PlayerScript::Circle { center, radius, speed } => {
                let angle = self.elapsed * speed / radius.max(0.1);
                let offset = Vec3::new(angle.cos(), 0.0, -angle.sin()) * *radius;
                stand_on(terrain, *center + offset)
            }
            PlayerScript::Patrol { points, speed } => {
                if points.is_empty() {
                    return position;
                }
                let target = points[self.leg % points.len()];
                let next = position + horizontal(target - position).clamp_length_max(speed * dt);
                if horizontal(target - next).length() < 1e-3 {
                    self.leg = (self.leg + 1) % points.len();
                }
                stand_on(terrain, next)
            }
            PlayerScript::Hopper {
                start,
                direction,
                speed,
                hop_height,
                hop_period,
            } => {
                let base = *start + horizontal(*direction).normalize_or_zero() * speed * self.elapsed;
                let phase = (self.elapsed / hop_period.max(0.1)).fract();
                let hop = if phase < HOP_AIR_FRACTION {
                    hop_height * (PI * phase / HOP_AIR_FRACTION).sin()
                } else {
                    0.0
                };
                stand_on(terrain, base) + Vec3::Y * hop
            }
            PlayerScript::Wander { home, radius, speed } => {
                let target = match self.wander_target {
                    Some(target) if horizontal(target - position).length() >= ARRIVE_DISTANCE => target,
                    _ => {
                        let angle = rng.gen::<f32>() * TAU;
                        let r = radius * rng.gen::<f32>().sqrt();
                        let target = *home + Vec3::new(angle.cos() * r, 0.0, angle.sin() * r);
                        trace!("Wander target {:?}", target);
                        self.wander_target = Some(target);
                        target
                    }
                };
                let to_target = horizontal(target - position);
                stand_on(terrain, position + to_target.clamp_length_max(speed * dt))
            }
        }
    }
}

fn stand_on(terrain: &WorldTerrain, p: Vec3) -> Vec3 {
    Vec3::new(p.x, terrain.get_height(p.x, p.z) + STANDING_HEIGHT, p.z)
}

/// Rotation whose forward (-Z) points along `direction`.
fn facing(direction: Vec3) -> Option<Quat> {
    let flat = horizontal(direction);
    (flat.length_squared() > 1e-8).then(|| Quat::from_rotation_y(f32::atan2(-flat.x, -flat.z)))
}

// =============================================================================
// SYSTEMS
// =============================================================================

/// Spawn the scenario's scripted players (skipped when a replay drives them instead).
pub fn spawn_scripted_players(
    mut commands: Commands,
    scenario: Res<Scenario>,
    world: Res<CollisionWorld>,
    playback: Option<Res<ReplayPlayback>>,
) {
    if playback.is_some() {
        info!("Replay playback active, not spawning {} scripted players", scenario.players.len());
        return;
    }
    for player in &scenario.players {
        let motion = ScriptedMotion::new(player.script.clone());
        let position = motion.start_position(&world.terrain);
        commands.spawn((TrackedPlayer { id: player.id }, motion, Transform::from_translation(position)));
        info!("Spawned tracked player {} at {:?}", player.id, position);
    }
}

pub fn drive_scripted_players(
    time: Res<Time>,
    world: Res<CollisionWorld>,
    mut rng: ResMut<ScenarioRng>,
    mut players: Query<(&mut ScriptedMotion, &mut Transform)>,
) {
    let dt = time.delta_secs();
    for (mut motion, mut transform) in players.iter_mut() {
        let next = motion.step(transform.translation, dt, &world.terrain, &mut rng.0);
        if let Some(rotation) = facing(next - transform.translation) {
            transform.rotation = rotation;
        }
        transform.translation = next;
    }
}
