//! World setup and scenario lifecycle (headless, no rendering)

use bevy::prelude::*;
use shared::{bot_bundle, ActiveAnimator, Animator, Autopilot, Bot, CollisionWorld, LocomotionConfig, Rig};

use crate::replay::{ReplayPlayback, ReplayRecorder};
use crate::scenario::Scenario;

/// Build terrain and obstacles for `scenario`.
pub fn build_collision_world(scenario: &Scenario) -> CollisionWorld {
    let world = CollisionWorld::new(scenario.terrain).with_obstacles(scenario.obstacles.iter().cloned());
    info!(
        "Collision world ready: {:?} terrain, {} obstacles",
        scenario.terrain,
        world.obstacles.len()
    );
    world
}

pub fn spawn_bot(
    mut commands: Commands,
    scenario: Res<Scenario>,
    config: Res<LocomotionConfig>,
    world: Res<CollisionWorld>,
) {
    let setup = &scenario.bot;
    let ground_y = world.terrain.get_height(setup.spawn.x, setup.spawn.z);
    let position = Vec3::new(setup.spawn.x, ground_y + setup.spawn.y, setup.spawn.z);

    let autopilot = setup.autopilot(position, &world);
    let waypoints = autopilot.path.len();
    let (bot, rig, hands, animator, autopilot, mut input, controller, transform) =
        bot_bundle(position, setup.animator(&config), autopilot, &config);
    input.gait = setup.gait;

    info!(
        "Spawned bot at {:?} ({:?} animator, goal {:?}, {} waypoints)",
        position,
        animator.kind(),
        autopilot.goal,
        waypoints
    );
    commands.spawn((bot, rig, hands, animator, autopilot, input, controller, transform));
}

/// Simulated time against the scenario duration.
#[derive(Resource, Debug)]
pub struct ScenarioClock {
    pub elapsed: f32,
    pub duration: f32,
    finished: bool,
}

impl ScenarioClock {
    pub fn new(duration: f32) -> Self {
        Self {
            elapsed: 0.0,
            duration,
            finished: false,
        }
    }
}

/// Ends the run once the scenario duration has passed or replay playback ran out.
/// Saves the recorded replay (if any) and reports each bot.
pub fn finish_scenario(
    time: Res<Time>,
    mut clock: ResMut<ScenarioClock>,
    recorder: Option<Res<ReplayRecorder>>,
    playback: Option<Res<ReplayPlayback>>,
    bots: Query<(&Rig, &Autopilot, &ActiveAnimator), With<Bot>>,
    mut exit: MessageWriter<AppExit>,
) {
    if clock.finished {
        return;
    }
    clock.elapsed += time.delta_secs();
    let replay_done = playback.is_some_and(|p| p.finished());
    if clock.elapsed < clock.duration && !replay_done {
        return;
    }
    clock.finished = true;

    for (rig, autopilot, active) in bots.iter() {
        let (steps, jumps, landings) = match active.current() {
            Animator::Walk(walk) => (walk.steps_taken(), walk.jumps(), walk.landings()),
            _ => (0, 0, 0),
        };
        info!(
            "Bot finished at {:?}: {} waypoints reached, {} left, {} path jumps, {} steps, {} jumps/{} landings",
            rig.position(),
            autopilot.waypoints_reached(),
            autopilot.path.len(),
            autopilot.jumps_fired(),
            steps,
            jumps,
            landings
        );
    }

    if let Some(recorder) = recorder {
        if let Err(e) = recorder.save() {
            error!("Failed to save replay {:?}: {}", recorder.path, e);
            exit.write(AppExit::error());
            return;
        }
    }

    info!("Scenario finished after {:.1}s", clock.elapsed);
    exit.write(AppExit::Success);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{BotGoal, BotSpec, Route};
    use bevy::ecs::system::RunSystemOnce;
    use shared::{AnimatorKind, GaitMode, MoveInput, ObstacleEntry, Replay, TerrainSource};
    use std::time::Duration;

    fn world_with(scenario: Scenario, delta: f32) -> World {
        let mut world = World::new();
        world.insert_resource(build_collision_world(&scenario));
        world.insert_resource(scenario);
        world.insert_resource(LocomotionConfig::default());
        world.init_resource::<Messages<AppExit>>();
        let mut time = Time::<()>::default();
        time.advance_by(Duration::from_secs_f32(delta));
        world.insert_resource(time);
        world
    }

    fn exits(world: &World) -> Vec<AppExit> {
        let messages = world.resource::<Messages<AppExit>>();
        messages.iter_current_update_messages().cloned().collect()
    }

    #[test]
    fn test_obstacles_are_registered() {
        let scenario = Scenario {
            terrain: TerrainSource::Flat { height: 0.0 },
            obstacles: vec![ObstacleEntry {
                id: 4,
                center: Vec2::new(2.0, 0.0),
                half_extents: Vec2::splat(0.5),
                rotation: 0.0,
                base_y: 0.0,
                height: 1.0,
            }],
            ..default()
        };
        let world = build_collision_world(&scenario);
        assert_eq!(world.obstacles.len(), 1);
        assert!(world.obstacles.point_blocked(Vec2::new(2.0, 0.0)));
    }

    #[test]
    fn test_spawn_bot_on_ground_with_route() {
        let scenario = Scenario {
            terrain: TerrainSource::Flat { height: 2.0 },
            bot: BotSpec {
                spawn: Vec3::new(1.0, 1.0, 1.0),
                gait: Some(GaitMode::Short),
                goal: BotGoal::Path(Route::Line { length: 3.0 }),
                animator: AnimatorKind::Walk,
                ..default()
            },
            ..default()
        };
        let mut world = world_with(scenario, 1.0 / 60.0);
        world.run_system_once(spawn_bot).unwrap();

        let mut bots = world.query_filtered::<(&Rig, &Autopilot, &MoveInput), With<Bot>>();
        let (rig, autopilot, input) = bots.single(&world).unwrap();
        assert_eq!(rig.position(), Vec3::new(1.0, 3.0, 1.0));
        assert_eq!(autopilot.path.len(), 2);
        assert_eq!(input.gait, Some(GaitMode::Short));
    }

    #[test]
    fn test_finish_waits_for_duration_then_exits_once() {
        let scenario = Scenario { duration: 1.0, ..default() };
        let mut world = world_with(scenario, 0.6);
        world.insert_resource(ScenarioClock::new(1.0));

        world.run_system_once(finish_scenario).unwrap();
        assert!(exits(&world).is_empty());

        world.run_system_once(finish_scenario).unwrap();
        assert_eq!(exits(&world), vec![AppExit::Success]);

        world.run_system_once(finish_scenario).unwrap();
        assert_eq!(exits(&world).len(), 1);
    }

    #[test]
    fn test_finish_when_replay_runs_out() {
        let mut replay = Replay::new(60.0);
        replay.push_frame(0.0, Vec::new());
        replay.push_frame(0.25, Vec::new());
        let mut world = world_with(Scenario::default(), 0.5);
        world.insert_resource(ScenarioClock::new(100.0));
        world.insert_resource(ReplayPlayback::new(replay));

        // Playback hasn't advanced yet
        world.run_system_once(finish_scenario).unwrap();
        assert!(exits(&world).is_empty());

        world.run_system_once(crate::replay::drive_replayed_players).unwrap();
        world.run_system_once(finish_scenario).unwrap();
        assert_eq!(exits(&world), vec![AppExit::Success]);
    }

    #[test]
    fn test_finish_saves_recording() {
        let path = std::env::temp_dir().join(format!("locomotion-sim-finish-{}.bin", std::process::id()));
        let mut world = world_with(Scenario::default(), 1.0);
        world.insert_resource(ScenarioClock::new(0.5));
        let mut recorder = ReplayRecorder::new(path.clone(), 60.0);
        recorder.replay.push_frame(0.0, Vec::new());
        world.insert_resource(recorder);

        world.run_system_once(finish_scenario).unwrap();
        assert_eq!(exits(&world), vec![AppExit::Success]);
        assert_eq!(Replay::load(&path).unwrap().frames.len(), 1);
        let _ = std::fs::remove_file(&path);
    }
}
