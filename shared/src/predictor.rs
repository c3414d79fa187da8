//! Movement prediction for tracked players.
//!
//! Each tracked id keeps a short kinematic history. From it the predictor derives velocity,
//! acceleration, a smoothed momentum vector, heading consistency and a jump/ground state,
//! and forecasts where the player will be a fraction of a second from now.

use std::collections::{HashMap, HashSet};
use std::f32::consts::PI;

use bevy::prelude::*;

use crate::history::BoundedHistory;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Minimum spacing between admitted samples (seconds).
pub const MIN_SAMPLE_INTERVAL: f32 = 0.016;

/// Position/velocity/timestamp history length.
pub const HISTORY_CAPACITY: usize = 30;

/// Heading history length.
pub const HEADING_CAPACITY: usize = 5;

/// Momentum decay per admitted sample.
pub const MOMENTUM_DECAY: f32 = 0.95;

/// Vertical speed band considered grounded: (-AIRBORNE_BAND, AIRBORNE_BAND).
pub const AIRBORNE_BAND: f32 = 2.0;

/// Upward speed that makes a grounded -> airborne transition a jump launch.
pub const JUMP_LAUNCH_SPEED: f32 = 1.0;

/// Time in the grounded band that counts as a landing without an observed descent.
pub const LANDING_DWELL: f32 = 0.6;

/// Heading change (degrees) that marks a change of direction.
pub const DIRECTION_CHANGE_DEG: f32 = 30.0;

/// How long the direction-change state persists after the last large delta.
pub const DIRECTION_CHANGE_HOLD: f32 = 0.5;

/// Horizontal speed below which no heading is recorded.
pub const MIN_HEADING_SPEED: f32 = 0.1;

/// Consistency above which the preferred heading dominates the forecast.
pub const CONSISTENCY_THRESHOLD: f32 = 0.7;

/// Acceleration used in second-order extrapolation is capped to this magnitude.
pub const MAX_PREDICTED_ACCEL: f32 = 20.0;

/// Interception search: first, step and last candidate time.
pub const INTERCEPT_STEP: f32 = 0.1;
pub const INTERCEPT_MAX_TIME: f32 = 3.0;

/// Accept a candidate when time-to-reach is within this of the candidate time.
pub const INTERCEPT_TOLERANCE: f32 = 0.2;

// =============================================================================
// PER-PLAYER DATA
// =============================================================================

#[derive(Clone, Debug)]
pub struct PlayerMovementData {
    pub positions: BoundedHistory<Vec3>,
    pub velocities: BoundedHistory<Vec3>,
    pub timestamps: BoundedHistory<f32>,
    /// Radians, `atan2(vx, vz)`.
    pub headings: BoundedHistory<f32>,

    pub velocity: Vec3,
    pub acceleration: Vec3,
    pub momentum: Vec3,
    /// Mean horizontal speed over the velocity history.
    pub average_speed: f32,
    /// Circular mean of the recent headings (radians).
    pub preferred_direction: f32,
    /// Length of the mean heading vector in [0, 1].
    pub consistency: f32,
    pub last_direction_change: Option<f32>,

    pub is_grounded: bool,
    pub is_jumping: bool,
    pub last_ground_time: f32,
    pub jump_start_velocity: Vec3,
    pub jump_start_position: Vec3,
    pub jump_start_time: f32,
    pub jumps: u32,
    pub landings: u32,

    descent_seen: bool,
    band_entered: Option<f32>,
}

impl PlayerMovementData {
    fn new() -> Self {
        Self {
            positions: BoundedHistory::new(HISTORY_CAPACITY),
            velocities: BoundedHistory::new(HISTORY_CAPACITY),
            timestamps: BoundedHistory::new(HISTORY_CAPACITY),
            headings: BoundedHistory::new(HEADING_CAPACITY),
            velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            momentum: Vec3::ZERO,
            average_speed: 0.0,
            preferred_direction: 0.0,
            consistency: 0.0,
            last_direction_change: None,
            is_grounded: true,
            is_jumping: false,
            last_ground_time: 0.0,
            jump_start_velocity: Vec3::ZERO,
            jump_start_position: Vec3::ZERO,
            jump_start_time: 0.0,
            jumps: 0,
            landings: 0,
            descent_seen: false,
            band_entered: None,
        }
    }

    pub fn last_position(&self) -> Option<Vec3> {
        self.positions.latest().copied()
    }

    pub fn last_time(&self) -> Option<f32> {
        self.timestamps.latest().copied()
    }

    /// True while the last large heading change is recent.
    pub fn is_changing_direction(&self) -> bool {
        match (self.last_direction_change, self.last_time()) {
            (Some(changed), Some(now)) => now - changed < DIRECTION_CHANGE_HOLD,
            _ => false,
        }
    }

    fn admit(&mut self, position: Vec3, time: f32) {
        let previous = self.positions.latest().copied().zip(self.timestamps.latest().copied());
        self.positions.push(position);
        self.timestamps.push(time);

        let Some((prev_position, prev_time)) = previous else {
            self.last_ground_time = time;
            return;
        };
        let dt = time - prev_time;

        let velocity = (position - prev_position) / dt;
        if let Some(prev_velocity) = self.velocities.latest() {
            self.acceleration = (velocity - *prev_velocity) / dt;
        }
        self.velocity = velocity;
        self.velocities.push(velocity);
        self.momentum = self.momentum * MOMENTUM_DECAY + velocity * (1.0 - MOMENTUM_DECAY);

        let speeds: f32 = self.velocities.iter().map(|v| Vec2::new(v.x, v.z).length()).sum();
        self.average_speed = speeds / self.velocities.len() as f32;

        self.update_ground_state(position, time);
        self.update_heading(time);
    }

    fn update_ground_state(&mut self, position: Vec3, time: f32) {
        let vy = self.velocity.y;
        let in_band = vy > -AIRBORNE_BAND && vy < AIRBORNE_BAND;

        if self.is_grounded {
            if in_band {
                self.last_ground_time = time;
                return;
            }
            self.is_grounded = false;
            self.descent_seen = vy <= -AIRBORNE_BAND;
            self.band_entered = None;
            if vy > JUMP_LAUNCH_SPEED {
                self.is_jumping = true;
                self.jump_start_velocity = self.velocity;
                // Launch happened at the previous sample
                self.jump_start_position = self.positions.previous().copied().unwrap_or(position);
                self.jump_start_time = self.timestamps.previous().copied().unwrap_or(time);
                self.jumps += 1;
                trace!("Tracked jump launch at {:?} vy={:.2}", self.jump_start_position, vy);
            }
            return;
        }

        if vy <= -AIRBORNE_BAND {
            self.descent_seen = true;
        }
        if !in_band {
            self.band_entered = None;
            return;
        }

        let entered = *self.band_entered.get_or_insert(time);
        if self.descent_seen || time - entered >= LANDING_DWELL {
            self.is_grounded = true;
            self.is_jumping = false;
            self.descent_seen = false;
            self.band_entered = None;
            self.last_ground_time = time;
            self.landings += 1;
            trace!("Tracked landing at {:?}", position);
        }
    }

    fn update_heading(&mut self, time: f32) {
        let horizontal = Vec2::new(self.velocity.x, self.velocity.z);
        if horizontal.length() <= MIN_HEADING_SPEED {
            return;
        }
        let heading = self.velocity.x.atan2(self.velocity.z);
        if let Some(previous) = self.headings.latest() {
            if angle_delta(*previous, heading).abs() > DIRECTION_CHANGE_DEG.to_radians() {
                self.last_direction_change = Some(time);
            }
        }
        self.headings.push(heading);

        let (mean, consistency) = circular_mean(self.headings.iter().copied());
        self.preferred_direction = mean;
        self.consistency = consistency;
    }

    /// Forecast the position `t` seconds after the latest sample.
    fn predict(&self, t: f32, gravity: f32) -> Option<Vec3> {
        let position = self.last_position()?;
        if self.velocities.is_empty() {
            return Some(position);
        }
        let now = self.last_time().unwrap_or(0.0);
        let fall = Vec3::NEG_Y * (0.5 * gravity);

        if !self.is_grounded {
            if self.is_jumping {
                let flight = now - self.jump_start_time + t;
                return Some(self.jump_start_position + self.jump_start_velocity * flight + fall * flight * flight);
            }
            return Some(position + self.velocity * t + fall * t * t);
        }

        if self.is_changing_direction() {
            let since = self.last_direction_change.map_or(0.0, |changed| (now - changed).min(1.0));
            let current = self.velocity.x.atan2(self.velocity.z);
            let heading = current + angle_delta(current, self.preferred_direction) * since;
            let speed = Vec2::new(self.velocity.x, self.velocity.z).length() * 0.8;
            return Some(position + heading_vector(heading) * speed * t);
        }

        if self.consistency > CONSISTENCY_THRESHOLD {
            let steady = heading_vector(self.preferred_direction) * self.average_speed + self.momentum * 0.4;
            let velocity = self.velocity.lerp(steady, 0.6);
            return Some(position + velocity * t);
        }

        let velocity = self.velocity * 0.8 + self.momentum * 0.2;
        let acceleration = self.acceleration.clamp_length_max(MAX_PREDICTED_ACCEL);
        Some(position + velocity * t + acceleration * (0.5 * t * t))
    }
}

// =============================================================================
// PREDICTOR RESOURCE
// =============================================================================

#[derive(Resource, Debug)]
pub struct MovementPredictor {
    players: HashMap<u64, PlayerMovementData>,
    /// Gravity magnitude used for airborne extrapolation.
    pub gravity: f32,
}

impl Default for MovementPredictor {
    fn default() -> Self {
        Self::new(crate::config::GRAVITY)
    }
}

impl MovementPredictor {
    pub fn new(gravity: f32) -> Self {
        Self {
            players: HashMap::new(),
            gravity,
        }
    }

    /// Feed a position sample. Returns false when the sample came too soon and was dropped.
    pub fn observe(&mut self, id: u64, position: Vec3, time: f32) -> bool {
        let data = self.players.entry(id).or_insert_with(|| {
            debug!("Tracking player {}", id);
            PlayerMovementData::new()
        });
        if let Some(last) = data.last_time() {
            if time - last < MIN_SAMPLE_INTERVAL {
                return false;
            }
        }
        data.admit(position, time);
        true
    }

    pub fn get(&self, id: u64) -> Option<&PlayerMovementData> {
        self.players.get(&id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn tracked(&self) -> impl Iterator<Item = u64> + '_ {
        self.players.keys().copied()
    }

    /// Forecast `id`'s position `t` seconds ahead. `None` for ids never observed.
    pub fn predict(&self, id: u64, t: f32) -> Option<Vec3> {
        self.players.get(&id)?.predict(t, self.gravity)
    }

    /// Search for a point an interceptor at `from` moving at `speed` can meet `id` at.
    ///
    /// Scans 0.1 s .. 3.0 s and accepts the first candidate whose time-to-reach lies within
    /// 0.2 s of the candidate time. Returns the point and its time.
    pub fn find_intercept(&self, id: u64, from: Vec3, speed: f32) -> Option<(Vec3, f32)> {
        if speed <= 0.0 {
            return None;
        }
        let data = self.players.get(&id)?;
        let steps = (INTERCEPT_MAX_TIME / INTERCEPT_STEP).round() as usize;
        (1..=steps).find_map(|i| {
            let t = i as f32 * INTERCEPT_STEP;
            let point = data.predict(t, self.gravity)?;
            let time_to_reach = point.distance(from) / speed;
            ((time_to_reach - t).abs() < INTERCEPT_TOLERANCE).then_some((point, t))
        })
    }

    /// Drop every player not in `active`. Returns how many were removed.
    pub fn purge(&mut self, active: &HashSet<u64>) -> usize {
        let before = self.players.len();
        self.players.retain(|id, _| active.contains(id));
        let removed = before - self.players.len();
        if removed > 0 {
            warn!("Purged {} departed players from movement prediction", removed);
        }
        removed
    }
}

// =============================================================================
// ANGLE HELPERS
// =============================================================================

/// Signed shortest difference `to - from`, wrapped to [-PI, PI].
pub fn angle_delta(from: f32, to: f32) -> f32 {
    let mut delta = (to - from) % (2.0 * PI);
    if delta > PI {
        delta -= 2.0 * PI;
    } else if delta < -PI {
        delta += 2.0 * PI;
    }
    delta
}

/// Unit horizontal vector for a heading measured as `atan2(x, z)`.
pub fn heading_vector(heading: f32) -> Vec3 {
    Vec3::new(heading.sin(), 0.0, heading.cos())
}

/// Circular mean of headings: (mean angle, consistency in [0, 1]).
pub fn circular_mean(headings: impl IntoIterator<Item = f32>) -> (f32, f32) {
    let (mut sum, mut count) = (Vec2::ZERO, 0usize);
    for heading in headings {
        sum += Vec2::new(heading.sin(), heading.cos());
        count += 1;
    }
    if count == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / count as f32;
    (mean.x.atan2(mean.y), mean.length().min(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const DT: f32 = 1.0 / 60.0;

    fn feed_line(predictor: &mut MovementPredictor, id: u64, start: Vec3, velocity: Vec3, samples: usize) {
        for i in 0..samples {
            let t = i as f32 * DT;
            predictor.observe(id, start + velocity * t, t);
        }
    }

    #[test]
    fn test_history_stays_at_capacity() {
        let mut predictor = MovementPredictor::default();
        feed_line(&mut predictor, 1, Vec3::ZERO, Vec3::new(2.0, 0.0, 1.0), 200);
        let data = predictor.get(1).unwrap();
        assert_eq!(data.positions.len(), HISTORY_CAPACITY);
        assert_eq!(data.timestamps.len(), HISTORY_CAPACITY);
        assert_eq!(data.velocities.len(), HISTORY_CAPACITY);
        assert_eq!(data.headings.len(), HEADING_CAPACITY);
    }

    #[test]
    fn test_samples_are_rate_limited() {
        let mut predictor = MovementPredictor::default();
        assert!(predictor.observe(7, Vec3::ZERO, 0.0));
        assert!(!predictor.observe(7, Vec3::X, 0.01));
        assert!(predictor.observe(7, Vec3::X, 0.02));
        assert_eq!(predictor.get(7).unwrap().positions.len(), 2);
    }

    #[test]
    fn test_consistency_of_identical_headings() {
        let mut predictor = MovementPredictor::default();
        feed_line(&mut predictor, 1, Vec3::ZERO, Vec3::new(3.0, 0.0, 0.0), 20);
        let data = predictor.get(1).unwrap();
        assert!((data.consistency - 1.0).abs() < 1e-4);
        assert!((data.preferred_direction - PI / 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_consistency_of_random_headings() {
        let mut rng = StdRng::seed_from_u64(11);
        let headings: Vec<f32> = (0..4000).map(|_| rng.gen_range(-PI..PI)).collect();
        let (_, consistency) = circular_mean(headings);
        assert!(consistency < 0.1);

        // The rolling five-sample window stays well below a steady walk on average
        let mut predictor = MovementPredictor::default();
        let mut position = Vec3::ZERO;
        let mut total = 0.0;
        for i in 0..600 {
            let heading = rng.gen_range(-PI..PI);
            position += heading_vector(heading) * 3.0 * DT;
            predictor.observe(2, position, i as f32 * DT);
            total += predictor.get(2).unwrap().consistency;
        }
        assert!(total / 600.0 < 0.6);
    }

    #[test]
    fn test_one_launch_and_one_landing_per_jump() {
        let mut predictor = MovementPredictor::default();
        let g = predictor.gravity;
        let mut t = 0.0;
        let observe = |predictor: &mut MovementPredictor, y: f32, t: f32| {
            predictor.observe(3, Vec3::new(t, y, 0.0), t);
        };

        for jump in 0..3 {
            for _ in 0..30 {
                observe(&mut predictor, 0.0, t);
                t += DT;
            }
            let launch = t;
            let vy = 6.0;
            loop {
                let ft = t - launch;
                let y = vy * ft - 0.5 * g * ft * ft;
                if y < 0.0 {
                    break;
                }
                observe(&mut predictor, y, t);
                t += DT;
            }
            for _ in 0..30 {
                observe(&mut predictor, 0.0, t);
                t += DT;
            }
            let data = predictor.get(3).unwrap();
            assert_eq!(data.jumps, jump + 1);
            assert_eq!(data.landings, jump + 1);
            assert!(data.is_grounded);
        }
    }

    #[test]
    fn test_airborne_prediction_follows_launch_arc() {
        let mut predictor = MovementPredictor::default();
        let g = predictor.gravity;
        for i in 0..=10 {
            predictor.observe(4, Vec3::ZERO, i as f32 * DT);
        }
        let launch = 10.0 * DT;
        for i in 0..5 {
            let ft = (i + 1) as f32 * DT;
            predictor.observe(4, Vec3::new(0.0, 5.0 * ft - 0.5 * g * ft * ft, 0.0), launch + ft);
        }
        let data = predictor.get(4).unwrap();
        assert!(data.is_jumping);

        // Apex of a ~5 m/s launch is about 1.27 m, reached near 0.51 s after launch
        let elapsed = 5.0 * DT;
        let apex = predictor.predict(4, 0.51 - elapsed).unwrap();
        assert!((apex.y - 1.27).abs() < 0.25);
    }

    #[test]
    fn test_unknown_id_predicts_none() {
        let predictor = MovementPredictor::default();
        assert_eq!(predictor.predict(99, 0.5), None);
        assert_eq!(predictor.find_intercept(99, Vec3::ZERO, 3.0), None);
    }

    #[test]
    fn test_single_sample_is_identity() {
        let mut predictor = MovementPredictor::default();
        predictor.observe(5, Vec3::new(1.0, 2.0, 3.0), 0.0);
        assert_eq!(predictor.predict(5, 1.0), Some(Vec3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn test_intercept_search() {
        let mut predictor = MovementPredictor::default();
        feed_line(&mut predictor, 6, Vec3::new(0.0, 0.0, 6.0), Vec3::new(2.0, 0.0, 0.0), 60);

        let from = Vec3::ZERO;
        let (point, t) = predictor.find_intercept(6, from, 5.0).unwrap();
        assert!(t > 0.0 && t <= INTERCEPT_MAX_TIME);
        assert!((point.distance(from) / 5.0 - t).abs() < INTERCEPT_TOLERANCE);

        assert_eq!(predictor.find_intercept(6, from, 0.0), None);
        // Far too slow to ever catch up inside the window
        assert_eq!(predictor.find_intercept(6, from, 0.1), None);
    }

    #[test]
    fn test_direction_change_is_held_then_expires() {
        let mut predictor = MovementPredictor::default();
        let mut t = 0.0;
        let mut position = Vec3::ZERO;
        for _ in 0..30 {
            position += Vec3::X * 3.0 * DT;
            predictor.observe(8, position, t);
            t += DT;
        }
        assert!(!predictor.get(8).unwrap().is_changing_direction());

        for _ in 0..6 {
            position += Vec3::Z * 3.0 * DT;
            predictor.observe(8, position, t);
            t += DT;
        }
        assert!(predictor.get(8).unwrap().is_changing_direction());

        for _ in 0..60 {
            position += Vec3::Z * 3.0 * DT;
            predictor.observe(8, position, t);
            t += DT;
        }
        assert!(!predictor.get(8).unwrap().is_changing_direction());
    }

    #[test]
    fn test_purge_removes_departed() {
        let mut predictor = MovementPredictor::default();
        for id in 1..=4 {
            predictor.observe(id, Vec3::ZERO, 0.0);
        }
        let active: HashSet<u64> = [2, 4].into_iter().collect();
        assert_eq!(predictor.purge(&active), 2);
        assert_eq!(predictor.len(), 2);
        assert!(predictor.get(1).is_none());
        assert!(predictor.get(4).is_some());
    }
}
