//! Locomotion sim - headless Bevy app that runs bot rigs through a scenario
//!
//! Usage: `sim [scenario.ron]` (or set `LOCOMOTION_CONFIG`). Without either the built-in
//! default scenario runs.

mod replay;
mod scenario;
mod targets;
mod world;

use bevy::app::ScheduleRunnerPlugin;
use bevy::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{tick_duration, LocomotionPlugin, LocomotionSet, Replay, FIXED_TIMESTEP_HZ};

use replay::{ReplayPlayback, ReplayRecorder};
use scenario::{SimConfig, CONFIG_ENV_VAR};
use targets::ScenarioRng;
use world::ScenarioClock;

fn load_config() -> shared::Result<SimConfig> {
    match SimConfig::path_from_env() {
        Some(path) => {
            info!("Loading scenario from {:?}", path);
            SimConfig::load(&path)
        }
        None => {
            warn!("No scenario given (pass a path or set {}), using the default", CONFIG_ENV_VAR);
            Ok(SimConfig::default())
        }
    }
}

/// Insert resources and systems for `config`.
fn configure(app: &mut App, config: SimConfig) -> shared::Result<()> {
    let SimConfig { locomotion, scenario } = config;

    if let Some(path) = &scenario.play_replay {
        app.insert_resource(ReplayPlayback::new(Replay::load(path)?));
    }
    if let Some(path) = &scenario.record_replay {
        info!("Recording tracked players to {:?}", path);
        app.insert_resource(ReplayRecorder::new(path.clone(), FIXED_TIMESTEP_HZ));
    }

    // Inserted before the plugin so its init_resource calls keep them
    app.insert_resource(world::build_collision_world(&scenario));
    app.insert_resource(locomotion);
    app.insert_resource(ScenarioRng(StdRng::seed_from_u64(scenario.seed)));
    app.insert_resource(ScenarioClock::new(scenario.duration));
    app.insert_resource(scenario);

    app.add_plugins(LocomotionPlugin);

    app.add_systems(Startup, (world::spawn_bot, targets::spawn_scripted_players));

    // Tracked players move first so the predictor sees this tick's positions
    app.add_systems(
        FixedUpdate,
        (
            targets::drive_scripted_players,
            replay::drive_replayed_players.run_if(resource_exists::<ReplayPlayback>),
        )
            .before(LocomotionSet),
    );
    app.add_systems(
        FixedUpdate,
        (
            replay::record_tracked_players.run_if(resource_exists::<ReplayRecorder>),
            world::finish_scenario,
        )
            .chain()
            .after(LocomotionSet),
    );
    Ok(())
}

fn main() -> AppExit {
    let mut app = App::new();

    // Headless plugins (no rendering). The main loop runs at the fixed tick rate so each
    // frame advances FixedUpdate about once.
    app.add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(tick_duration())));
    app.add_plugins(bevy::log::LogPlugin::default());
    app.insert_resource(Time::<Fixed>::from_hz(FIXED_TIMESTEP_HZ));

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load scenario: {}", e);
            return AppExit::error();
        }
    };

    if let Err(e) = configure(&mut app, config) {
        error!("Failed to set up scenario: {}", e);
        return AppExit::error();
    }

    info!("Running locomotion sim at {} Hz", FIXED_TIMESTEP_HZ);
    app.run()
}
