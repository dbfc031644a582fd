use nalgebra::{Point3, Vector3};

use super::filter::SingerFilter;

/// Track lifecycle state, also mirrored onto the associated `Robot::track_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Tentative,
    Confirmed,
    Deleted,
}

/// A long-lived robot identity: filter state, class-confidence feature, and lifecycle
/// counters.
#[derive(Debug, Clone)]
pub struct Track {
    pub track_id: u32,
    pub state: TrackState,
    pub init_count: u32,
    pub miss_count: u32,
    pub timestamp: f64,
    filter: SingerFilter,
    feature: Vec<f32>,
}

impl Track {
    /// Creates a new Tentative track seeded from an unmatched located+detected Robot.
    pub fn new(
        track_id: u32,
        location: Point3<f32>,
        feature: Vec<f32>,
        timestamp: f64,
        observation_noise: Vector3<f32>,
    ) -> Self {
        Self {
            track_id,
            state: TrackState::Tentative,
            init_count: 1,
            miss_count: 0,
            timestamp,
            filter: SingerFilter::new(location, observation_noise),
            feature,
        }
    }

    pub fn location(&self) -> Point3<f32> {
        self.filter.location()
    }

    pub fn feature(&self) -> &[f32] {
        &self.feature
    }

    /// The track's most likely class: the argmax of its feature vector. Ties resolve to
    /// the lowest label id.
    pub fn label(&self) -> i32 {
        self.feature
            .iter()
            .enumerate()
            .rev()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .map(|(idx, _)| idx as i32)
            .unwrap_or(0)
    }

    pub fn predict(&mut self, timestamp: f64, max_acceleration: f32, tau: f32) {
        let dt = (timestamp - self.timestamp) as f32;
        self.filter.predict(dt, max_acceleration, tau);
        self.timestamp = timestamp;
    }

    // Kalman measurement update plus an exponentially-weighted running average of the
    // class-confidence feature.
    pub fn update(
        &mut self,
        location: Point3<f32>,
        feature: &[f32],
        observation_noise: Vector3<f32>,
        feature_alpha: f32,
    ) {
        self.filter.update(location, observation_noise);
        self.miss_count = 0;

        if feature.len() == self.feature.len() {
            for (slot, &new_value) in self.feature.iter_mut().zip(feature.iter()) {
                *slot = feature_alpha * new_value + (1.0 - feature_alpha) * *slot;
            }
        }
    }

    pub fn register_miss(&mut self) {
        self.miss_count += 1;
    }

    pub fn promote_if_ready(&mut self, init_thresh: u32) {
        if self.state == TrackState::Tentative && self.init_count >= init_thresh {
            self.state = TrackState::Confirmed;
        }
    }
}
