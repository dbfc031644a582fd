//! Perception core for a RoboMaster radar station: given synchronized detections and
//! LiDAR point clouds, locates opposing robots in the field frame, tracks their
//! identity across time, and reports positions to the referee system.

use anyhow::Result;
use nalgebra::Point3;

pub mod config;
pub mod radar;
pub mod robot;

use config::RadarConfig;
use radar::locate::Locator;
use radar::referee::RefereeCommunicator;
use radar::track::Tracker;
use robot::{assemble_robots, Detection, Robot};

/// Wires `Locator → Tracker → RefereeCommunicator` into the per-frame pipeline. Frame
/// acquisition (camera, LiDAR, detector) lives outside this crate; callers push
/// detections and point clouds in and read tracked robots out.
pub struct RadarStation {
    locator: Locator,
    tracker: Tracker,
    referee: RefereeCommunicator,
}

impl RadarStation {
    pub fn new(config: &RadarConfig) -> Result<Self> {
        Ok(Self {
            locator: Locator::new(config.locator_config())?,
            tracker: Tracker::new(config.tracker_config()),
            referee: RefereeCommunicator::new(
                config.referee.serial_path.clone(),
                config.referee.baud_rate,
                config.tracker.class_num,
            ),
        })
    }

    /// Runs one tick: rebuilds the Locator's depth model from `cloud`, assembles
    /// `Robot`s from `cars`/`armors`, locates and tracks them, then reports opposing
    /// robots' positions to the referee system. Returns the tracked robots for the
    /// caller's own use (e.g. a HUD overlay).
    pub fn process_frame(
        &mut self,
        timestamp: f64,
        cloud: &[Point3<f32>],
        cars: &[Detection],
        armors: &[Detection],
    ) -> Vec<Robot> {
        self.locator.update(cloud);
        self.locator.cluster();

        let mut robots = assemble_robots(cars, armors);
        self.locator.search_all(&mut robots);
        self.tracker.update(timestamp, &mut robots);

        self.referee.update();
        self.referee.send_map_robot(&robots);

        robots
    }

    pub fn referee(&self) -> &RefereeCommunicator {
        &self.referee
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{LocatorSettings, RadarInstanceConfig, RefereeSettings, TrackerSettings};

    fn identity_matrix4() -> [f32; 16] {
        let mut m = [0.0; 16];
        m[0] = 1.0;
        m[5] = 1.0;
        m[10] = 1.0;
        m[15] = 1.0;
        m
    }

    fn test_config() -> RadarConfig {
        RadarConfig {
            instance: RadarInstanceConfig {
                image_width: 640,
                image_height: 480,
                intrinsic: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
                lidar_to_camera: identity_matrix4(),
                world_to_camera: identity_matrix4(),
            },
            locator: LocatorSettings {
                zoom_factor: 1.0,
                queue_size: 3,
                min_depth_diff: 0.1,
                max_depth_diff: 10.0,
                max_distance: 100.0,
                cluster_tolerance: 0.5,
                min_cluster_size: 1,
                max_cluster_size: 10_000,
            },
            tracker: TrackerSettings {
                class_num: 6,
                init_thresh: 3,
                miss_thresh: 3,
                max_acceleration: 5.0,
                acceleration_correlation_time: 1.0,
                observation_noise: [0.1, 0.1, 0.1],
                feature_alpha: 0.5,
                distance_weight: 0.7,
                feature_weight: 0.3,
                distance_thresh: 1.0,
                max_iter: 1000,
            },
            referee: RefereeSettings {
                serial_path: "/dev/null-radar-test".to_string(),
                baud_rate: 115_200,
            },
        }
    }

    #[test]
    fn process_frame_with_empty_inputs_does_not_panic() {
        let mut station = RadarStation::new(&test_config()).unwrap();
        let robots = station.process_frame(0.0, &[], &[], &[]);
        assert!(robots.is_empty());
        assert!(!station.referee().is_connected());
    }

    #[test]
    fn process_frame_assembles_and_tracks_a_robot() {
        let mut station = RadarStation::new(&test_config()).unwrap();
        let car = Detection::new(0.0, 0.0, 640.0, 480.0, 0, 1.0);
        let armor = Detection::new(1.0, 1.0, 1.0, 1.0, 2, 0.9);

        let robots = station.process_frame(0.0, &[], &[car], &[armor]);
        assert_eq!(robots.len(), 1);
        assert_eq!(robots[0].label, Some(2));
        assert_eq!(station.tracker().tracks().len(), 0); // not located, so no track spawned
    }
}
