//! Movement replays - recorded tracked-player positions.
//!
//! Replays are bincode files written atomically (temp file + rename). A replay whose
//! version differs from [`REPLAY_VERSION`] is rejected rather than guessed at.

use std::path::Path;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{LocomotionError, Result};

/// Current on-disk replay format.
pub const REPLAY_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplaySample {
    pub id: u64,
    pub position: Vec3,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplayFrame {
    /// Seconds since recording started.
    pub time: f32,
    pub samples: Vec<ReplaySample>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Replay {
    pub version: u32,
    pub tick_hz: f64,
    pub frames: Vec<ReplayFrame>,
}

impl Replay {
    pub fn new(tick_hz: f64) -> Self {
        Self {
            version: REPLAY_VERSION,
            tick_hz,
            frames: Vec::new(),
        }
    }

    /// Append a frame. Frames must arrive in time order; out-of-order frames are dropped.
    pub fn push_frame(&mut self, time: f32, samples: Vec<ReplaySample>) -> bool {
        if self.frames.last().is_some_and(|last| time < last.time) {
            warn!("Dropping replay frame at {:.3}s (before the last frame)", time);
            return false;
        }
        self.frames.push(ReplayFrame { time, samples });
        true
    }

    /// Time of the last frame.
    pub fn duration(&self) -> f32 {
        self.frames.last().map_or(0.0, |f| f.time)
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Positions at `time`, linearly interpolated between the bracketing frames.
    ///
    /// Before the first frame the first frame is returned, after the last the last. An id
    /// present in only one of the two frames keeps that frame's position.
    pub fn sample_at(&self, time: f32) -> Vec<ReplaySample> {
        let next = self.frames.partition_point(|f| f.time <= time);
        let (Some(before), Some(after)) = (self.frames.get(next.wrapping_sub(1)), self.frames.get(next)) else {
            return self
                .frames
                .get(next)
                .or_else(|| self.frames.last())
                .map(|f| f.samples.clone())
                .unwrap_or_default();
        };

        let span = after.time - before.time;
        let alpha = if span > 0.0 { ((time - before.time) / span).clamp(0.0, 1.0) } else { 0.0 };
        let mut samples: Vec<ReplaySample> = before
            .samples
            .iter()
            .map(|sample| {
                let position = after
                    .samples
                    .iter()
                    .find(|s| s.id == sample.id)
                    .map_or(sample.position, |s| sample.position.lerp(s.position, alpha));
                ReplaySample { id: sample.id, position }
            })
            .collect();
        // Players joining in `after`
        samples.extend(
            after
                .samples
                .iter()
                .filter(|s| !before.samples.iter().any(|b| b.id == s.id))
                .copied(),
        );
        samples
    }

    /// Write to `path` atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let temp_path = path.with_extension("tmp");

        let bytes = bincode::serialize(self)?;
        std::fs::write(&temp_path, &bytes)?;
        std::fs::rename(&temp_path, path)?;

        info!("Saved replay {:?} ({} frames, {} bytes)", path, self.frames.len(), bytes.len());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let replay: Replay = bincode::deserialize(&bytes)?;
        if replay.version != REPLAY_VERSION {
            return Err(LocomotionError::UnsupportedReplayVersion {
                found: replay.version,
                expected: REPLAY_VERSION,
            });
        }
        info!("Loaded replay {:?} ({} frames, {:.1}s)", path, replay.frames.len(), replay.duration());
        Ok(replay)
    }
}
