//! Multi-object tracker: per-track Singer-model Kalman filters, a global auction
//! assignment between predicted tracks and observed robots, and the birth / confirm /
//! death state machine.

mod assignment;
mod filter;
mod track;

pub use assignment::{distance_score, feature_score, match_cost, MatchingConfig};
pub use track::{Track, TrackState};

use nalgebra::Vector3;

use crate::robot::Robot;

#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    pub class_num: usize,
    pub init_thresh: u32,
    pub miss_thresh: u32,
    pub max_acceleration: f32,
    pub acceleration_correlation_time: f32,
    pub observation_noise: Vector3<f32>,
    pub feature_alpha: f32,
    pub matching: MatchingConfig,
}

pub struct Tracker {
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_track_id: u32,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_track_id: 0,
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    // Predict, assign, update lifecycle, spawn, garbage collect. `robots` are mutated
    // in place and never retained.
    pub fn update(&mut self, timestamp: f64, robots: &mut [Robot]) {
        for track in &mut self.tracks {
            track.predict(
                timestamp,
                self.config.max_acceleration,
                self.config.acceleration_correlation_time,
            );
        }

        let cost_matrix: Vec<Vec<f32>> = self
            .tracks
            .iter()
            .map(|track| {
                robots
                    .iter()
                    .map(|robot| match_cost(track, robot, &self.config.matching))
                    .collect()
            })
            .collect();

        let assignment = assignment::auction_assignment(&cost_matrix, self.config.matching.max_iter);

        let mut robot_matched = vec![false; robots.len()];

        for (track_idx, track) in self.tracks.iter_mut().enumerate() {
            match assignment[track_idx] {
                None => match track.state {
                    TrackState::Tentative => track.state = TrackState::Deleted,
                    TrackState::Confirmed => {
                        track.register_miss();
                        if track.miss_count >= self.config.miss_thresh {
                            track.state = TrackState::Deleted;
                        }
                    }
                    TrackState::Deleted => {}
                },
                Some(robot_idx) => {
                    robot_matched[robot_idx] = true;
                    let robot = &mut robots[robot_idx];

                    if let Some(location) = robot.location {
                        let feature = robot.feature(self.config.class_num);
                        track.update(
                            location,
                            &feature,
                            self.config.observation_noise,
                            self.config.feature_alpha,
                        );
                        if track.state == TrackState::Tentative {
                            track.init_count += 1;
                            track.promote_if_ready(self.config.init_thresh);
                        }
                    }

                    robot.set_track(track);
                }
            }
        }

        for (robot_idx, robot) in robots.iter_mut().enumerate() {
            if robot_matched[robot_idx] {
                continue;
            }
            if robot.is_detected() && robot.is_located() {
                let feature = robot.feature(self.config.class_num);
                let track = Track::new(
                    self.next_track_id,
                    robot.location.unwrap(),
                    feature,
                    timestamp,
                    self.config.observation_noise,
                );
                self.next_track_id += 1;
                robot.set_track(&track);
                self.tracks.push(track);
            }
        }

        self.tracks.retain(|track| track.state != TrackState::Deleted);
    }
}
