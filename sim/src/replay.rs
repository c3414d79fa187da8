//! Replay recording and playback for tracked players.

use std::collections::HashSet;
use std::path::PathBuf;

use bevy::prelude::*;
use shared::{Replay, ReplaySample, TrackedPlayer};

/// Records every tracked player's position each fixed tick.
#[derive(Resource)]
pub struct ReplayRecorder {
    pub replay: Replay,
    pub path: PathBuf,
}

impl ReplayRecorder {
    pub fn new(path: PathBuf, tick_hz: f64) -> Self {
        Self {
            replay: Replay::new(tick_hz),
            path,
        }
    }

    pub fn save(&self) -> shared::Result<()> {
        self.replay.save(&self.path)
    }
}

/// Drives tracked players from a loaded replay.
#[derive(Resource)]
pub struct ReplayPlayback {
    pub replay: Replay,
    elapsed: f32,
}

impl ReplayPlayback {
    pub fn new(replay: Replay) -> Self {
        Self { replay, elapsed: 0.0 }
    }

    pub fn finished(&self) -> bool {
        self.elapsed > self.replay.duration()
    }
}

pub fn record_tracked_players(
    time: Res<Time>,
    mut recorder: ResMut<ReplayRecorder>,
    players: Query<(&TrackedPlayer, &Transform)>,
) {
    let mut samples: Vec<ReplaySample> = players
        .iter()
        .map(|(player, transform)| ReplaySample {
            id: player.id,
            position: transform.translation,
        })
        .collect();
    samples.sort_by_key(|s| s.id);
    recorder.replay.push_frame(time.elapsed_secs(), samples);
}

/// Move tracked players to their replayed positions, spawning and despawning them as
/// they appear in and vanish from the replay.
pub fn drive_replayed_players(
    mut commands: Commands,
    time: Res<Time>,
    mut playback: ResMut<ReplayPlayback>,
    mut players: Query<(Entity, &TrackedPlayer, &mut Transform)>,
) {
    playback.elapsed += time.delta_secs();
    let samples = playback.replay.sample_at(playback.elapsed);

    let mut present = HashSet::new();
    for (entity, player, mut transform) in players.iter_mut() {
        match samples.iter().find(|s| s.id == player.id) {
            Some(sample) => {
                transform.translation = sample.position;
                present.insert(player.id);
            }
            None => {
                debug!("Replayed player {} left", player.id);
                commands.entity(entity).despawn();
            }
        }
    }

    for sample in samples.iter().filter(|s| !present.contains(&s.id)) {
        debug!("Replayed player {} joined at {:?}", sample.id, sample.position);
        commands.spawn((TrackedPlayer { id: sample.id }, Transform::from_translation(sample.position)));
    }
}
