//! Bevy wiring for the locomotion core.
//!
//! Everything runs in `FixedUpdate`, chained in one order per tick:
//! observe tracked players -> purge departed -> animator switches -> autopilot ->
//! ground sensing + turning -> animate -> integrate -> hands -> Transform sync.

use std::collections::HashSet;

use bevy::prelude::*;

use crate::animator::{ActiveAnimator, AnimContext, Animator, AnimatorRequest, MoveInput};
use crate::autopilot::{Autopilot, BodyState, Surroundings};
use crate::config::LocomotionConfig;
use crate::hand::{ControllerState, Hands};
use crate::predictor::MovementPredictor;
use crate::rig::Rig;
use crate::world::CollisionWorld;

/// How often departed players are dropped from the predictor (seconds).
pub const PURGE_INTERVAL: f32 = 2.0;

/// A remote player whose movement is tracked and predicted.
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TrackedPlayer {
    pub id: u64,
}

/// Marks an autopiloted rig.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct Bot;

/// All locomotion systems; order scripted movement `.before` this set.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocomotionSet;

#[derive(Resource)]
pub struct PurgeTimer(pub Timer);

impl Default for PurgeTimer {
    fn default() -> Self {
        Self(Timer::from_seconds(PURGE_INTERVAL, TimerMode::Repeating))
    }
}

/// Components for a bot rig at `position`, with `animator` already entered.
pub fn bot_bundle(
    position: Vec3,
    animator: Animator,
    autopilot: Autopilot,
    config: &LocomotionConfig,
) -> (Bot, Rig, Hands, ActiveAnimator, Autopilot, MoveInput, ControllerState, Transform) {
    let mut rig = Rig::new(position, &config.rig);
    let mut hands = Hands::at_rest(&rig, &config.hands);
    let active = ActiveAnimator::start(animator, &mut rig, &mut hands, config);
    let transform = rig.body;
    (
        Bot,
        rig,
        hands,
        active,
        autopilot,
        MoveInput::default(),
        ControllerState::default(),
        transform,
    )
}

pub struct LocomotionPlugin;

impl Plugin for LocomotionPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<LocomotionConfig>();
        app.init_resource::<CollisionWorld>();
        app.init_resource::<PurgeTimer>();

        let gravity = app.world().resource::<LocomotionConfig>().gravity;
        if !app.world().contains_resource::<MovementPredictor>() {
            app.insert_resource(MovementPredictor::new(gravity));
        }

        app.add_message::<AnimatorRequest>();
        app.add_systems(
            FixedUpdate,
            (
                observe_tracked_players,
                purge_departed_players,
                apply_animator_requests,
                run_autopilot,
                sense_ground_and_turn,
                animate_rigs,
                integrate_rigs,
                drive_hands,
                sync_rig_transforms,
            )
                .chain()
                .in_set(LocomotionSet),
        );
    }
}

// =============================================================================
// SYSTEMS
// =============================================================================

pub fn observe_tracked_players(
    time: Res<Time>,
    mut predictor: ResMut<MovementPredictor>,
    players: Query<(&TrackedPlayer, &Transform)>,
) {
    let now = time.elapsed_secs();
    for (player, transform) in players.iter() {
        predictor.observe(player.id, transform.translation, now);
    }
}

pub fn purge_departed_players(
    time: Res<Time>,
    mut timer: ResMut<PurgeTimer>,
    mut predictor: ResMut<MovementPredictor>,
    players: Query<&TrackedPlayer>,
) {
    if !timer.0.tick(time.delta()).just_finished() {
        return;
    }
    let active: HashSet<u64> = players.iter().map(|p| p.id).collect();
    predictor.purge(&active);
}

pub fn apply_animator_requests(
    mut requests: MessageReader<AnimatorRequest>,
    config: Res<LocomotionConfig>,
    mut rigs: Query<(&mut ActiveAnimator, &mut Rig, &mut Hands)>,
) {
    for request in requests.read() {
        let Ok((mut active, mut rig, mut hands)) = rigs.get_mut(request.entity) else {
            warn!("Animator request for {:?}, which has no rig", request.entity);
            continue;
        };
        if active.kind() == request.kind {
            continue;
        }
        let next = Animator::from_kind(request.kind, &config);
        active.switch(next, &mut rig, &mut hands, &config);
    }
}

pub fn run_autopilot(
    time: Res<Time>,
    config: Res<LocomotionConfig>,
    world: Res<CollisionWorld>,
    predictor: Res<MovementPredictor>,
    players: Query<(&TrackedPlayer, &Transform)>,
    mut bots: Query<(&mut Autopilot, &Rig, Option<&ActiveAnimator>, &mut MoveInput), With<Bot>>,
) {
    let positions: Vec<(u64, Vec3)> = players.iter().map(|(p, t)| (p.id, t.translation)).collect();
    let env = Surroundings {
        world: &*world,
        predictor: &predictor,
        players: &positions,
        config: &config.autopilot,
        dt: time.delta_secs(),
    };

    for (mut autopilot, rig, animator, mut input) in bots.iter_mut() {
        if !rig.active {
            continue;
        }
        let mut body = BodyState::from(rig);
        if let Some(animator) = animator {
            body.speed = animator.current().travel_speed(&*input, rig, &config).unwrap_or(0.0);
            body.jump_launches = animator.current().jump_launches();
        }
        let command = autopilot.tick(&body, &env);
        input.direction = command.direction;
        input.turn = command.turn;
        input.jump_target = command.jump_target;
    }
}

pub fn sense_ground_and_turn(
    time: Res<Time>,
    config: Res<LocomotionConfig>,
    world: Res<CollisionWorld>,
    mut rigs: Query<(&mut Rig, Option<&MoveInput>)>,
) {
    let dt = time.delta_secs();
    for (mut rig, input) in rigs.iter_mut() {
        if !rig.active {
            continue;
        }
        rig.sense_ground(&*world, &config.rig);
        rig.smooth_ground(dt, &config.rig);
        if let Some(input) = input {
            rig.turn(input.turn, dt, &config.rig);
        }
    }
}

pub fn animate_rigs(
    time: Res<Time>,
    config: Res<LocomotionConfig>,
    world: Res<CollisionWorld>,
    mut rigs: Query<(&mut ActiveAnimator, &mut Rig, &mut Hands, Option<&MoveInput>)>,
) {
    let idle = MoveInput::default();
    for (mut active, mut rig, mut hands, input) in rigs.iter_mut() {
        if !rig.active {
            continue;
        }
        let ctx = AnimContext {
            world: &*world,
            config: &config,
            input: input.unwrap_or(&idle),
            dt: time.delta_secs(),
        };
        active.animate(&mut rig, &mut hands, &ctx);
    }
}

pub fn integrate_rigs(time: Res<Time>, config: Res<LocomotionConfig>, world: Res<CollisionWorld>, mut rigs: Query<&mut Rig>) {
    let dt = time.delta_secs();
    for mut rig in rigs.iter_mut() {
        rig.integrate(&*world, config.gravity, dt, &config.rig);
    }
}

pub fn drive_hands(mut rigs: Query<(&mut Hands, Option<&mut ControllerState>)>) {
    for (mut hands, controller) in rigs.iter_mut() {
        hands.follow();
        if let Some(mut controller) = controller {
            controller.force_from(&hands);
        }
    }
}

pub fn sync_rig_transforms(mut rigs: Query<(&Rig, &mut Transform)>) {
    for (rig, mut transform) in rigs.iter_mut() {
        *transform = rig.body;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animator::AnimatorKind;
    use crate::autopilot::AutopilotGoal;
    use bevy::ecs::system::RunSystemOnce;
    use std::time::Duration;

    fn test_world() -> World {
        let mut world = World::new();
        world.insert_resource(LocomotionConfig::default());
        world.insert_resource(CollisionWorld::flat(0.0));
        world.insert_resource(MovementPredictor::default());
        world.insert_resource(PurgeTimer::default());
        world.init_resource::<Messages<AnimatorRequest>>();
        let mut time = Time::<()>::default();
        time.advance_by(Duration::from_secs_f32(1.0 / 60.0));
        world.insert_resource(time);
        world
    }

    fn spawn_bot(world: &mut World, autopilot: Autopilot) -> Entity {
        let config = world.resource::<LocomotionConfig>().clone();
        let animator = Animator::from_kind(AnimatorKind::Walk, &config);
        world.spawn(bot_bundle(Vec3::new(0.0, 1.0, 0.0), animator, autopilot, &config)).id()
    }

    fn tick(world: &mut World) {
        world.run_system_once(observe_tracked_players).unwrap();
        world.run_system_once(apply_animator_requests).unwrap();
        world.run_system_once(run_autopilot).unwrap();
        world.run_system_once(sense_ground_and_turn).unwrap();
        world.run_system_once(animate_rigs).unwrap();
        world.run_system_once(integrate_rigs).unwrap();
        world.run_system_once(drive_hands).unwrap();
        world.run_system_once(sync_rig_transforms).unwrap();
        world.resource_mut::<Time>().advance_by(Duration::from_secs_f32(1.0 / 60.0));
    }

    #[test]
    fn test_bot_walks_path_to_waypoint() {
        let mut world = test_world();
        let bot = spawn_bot(&mut world, Autopilot::with_path([Vec3::new(5.0, 0.0, 0.0)]));

        for _ in 0..360 {
            tick(&mut world);
        }

        let autopilot = world.get::<Autopilot>(bot).unwrap();
        assert!(autopilot.path.is_empty());
        let transform = world.get::<Transform>(bot).unwrap();
        assert!((transform.translation.x - 5.0).abs() < 0.75);
        assert!(transform.translation.y > 0.3);
    }

    #[test]
    fn test_path_jump_counted_from_animator_launches() {
        let mut world = test_world();
        let bot = spawn_bot(&mut world, Autopilot::with_path([Vec3::new(2.5, 1.2, 0.0)]));

        for _ in 0..240 {
            tick(&mut world);
        }

        let fired = world.get::<Autopilot>(bot).unwrap().jumps_fired();
        let launched = world.get::<ActiveAnimator>(bot).unwrap().current().jump_launches();
        assert!(fired >= 1);
        // At most the launch of the final tick is still unconfirmed
        assert!(launched >= fired && launched - fired <= 1, "fired {fired}, launched {launched}");
    }

    #[test]
    fn test_animator_request_switches_mode() {
        let mut world = test_world();
        let bot = spawn_bot(&mut world, Autopilot::new(AutopilotGoal::Idle));
        world.write_message(AnimatorRequest {
            entity: bot,
            kind: AnimatorKind::Fly,
        });
        tick(&mut world);

        let active = world.get::<ActiveAnimator>(bot).unwrap();
        assert_eq!(active.kind(), AnimatorKind::Fly);
        assert_eq!(active.transitions(), 1);
        assert!(!world.get::<Rig>(bot).unwrap().use_gravity);
    }

    #[test]
    fn test_purge_drops_despawned_players() {
        let mut world = test_world();
        let keep = world.spawn((TrackedPlayer { id: 1 }, Transform::default())).id();
        let gone = world.spawn((TrackedPlayer { id: 2 }, Transform::default())).id();
        world.run_system_once(observe_tracked_players).unwrap();
        assert_eq!(world.resource::<MovementPredictor>().len(), 2);

        world.despawn(gone);
        // Force the timer to fire on the next run
        world.resource_mut::<PurgeTimer>().0.set_elapsed(Duration::from_secs_f32(PURGE_INTERVAL));
        world.run_system_once(purge_departed_players).unwrap();

        let predictor = world.resource::<MovementPredictor>();
        assert_eq!(predictor.len(), 1);
        assert!(predictor.get(1).is_some());
        assert!(world.get_entity(keep).is_ok());
    }
}
