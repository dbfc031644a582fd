//! Runtime configuration for a radar station, loaded from TOML. Calibration matrices
//! are stored as flat arrays on the wire and converted to `nalgebra` types for the core
//! components.

use std::path::Path;

use anyhow::{Context, Result};
use nalgebra::{Matrix3, Matrix4, Vector3};
use serde::{Deserialize, Serialize};

use crate::radar::locate::LocatorConfig;
use crate::radar::track::{MatchingConfig, TrackerConfig};

/// Per-station calibration: image size, camera intrinsic, and both extrinsics, stored
/// row-major.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadarInstanceConfig {
    pub image_width: u32,
    pub image_height: u32,
    pub intrinsic: [f32; 9],
    pub lidar_to_camera: [f32; 16],
    pub world_to_camera: [f32; 16],
}

impl RadarInstanceConfig {
    pub fn camera_intrinsic(&self) -> Matrix3<f32> {
        Matrix3::from_row_slice(&self.intrinsic)
    }

    pub fn lidar_to_camera_matrix(&self) -> Matrix4<f32> {
        Matrix4::from_row_slice(&self.lidar_to_camera)
    }

    pub fn world_to_camera_matrix(&self) -> Matrix4<f32> {
        Matrix4::from_row_slice(&self.world_to_camera)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorSettings {
    pub zoom_factor: f32,
    pub queue_size: usize,
    pub min_depth_diff: f32,
    pub max_depth_diff: f32,
    pub max_distance: f32,
    pub cluster_tolerance: f32,
    pub min_cluster_size: usize,
    pub max_cluster_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerSettings {
    pub class_num: usize,
    pub init_thresh: u32,
    pub miss_thresh: u32,
    pub max_acceleration: f32,
    pub acceleration_correlation_time: f32,
    pub observation_noise: [f32; 3],
    pub feature_alpha: f32,
    pub distance_weight: f32,
    pub feature_weight: f32,
    pub distance_thresh: f32,
    pub max_iter: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefereeSettings {
    pub serial_path: String,
    pub baud_rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadarConfig {
    pub instance: RadarInstanceConfig,
    pub locator: LocatorSettings,
    pub tracker: TrackerSettings,
    pub referee: RefereeSettings,
}

impl RadarConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path:?}"))?;
        toml::from_str(&content).with_context(|| format!("failed to parse config file {path:?}"))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .with_context(|| "failed to serialize config to TOML".to_string())?;
        std::fs::write(path, content).with_context(|| format!("failed to write config file {path:?}"))
    }

    pub fn locator_config(&self) -> LocatorConfig {
        LocatorConfig {
            image_width: self.instance.image_width,
            image_height: self.instance.image_height,
            zoom_factor: self.locator.zoom_factor,
            camera_intrinsic: self.instance.camera_intrinsic(),
            lidar_to_camera: self.instance.lidar_to_camera_matrix(),
            world_to_camera: self.instance.world_to_camera_matrix(),
            queue_size: self.locator.queue_size,
            min_depth_diff: self.locator.min_depth_diff,
            max_depth_diff: self.locator.max_depth_diff,
            max_distance: self.locator.max_distance,
            cluster_tolerance: self.locator.cluster_tolerance,
            min_cluster_size: self.locator.min_cluster_size,
            max_cluster_size: self.locator.max_cluster_size,
        }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            class_num: self.tracker.class_num,
            init_thresh: self.tracker.init_thresh,
            miss_thresh: self.tracker.miss_thresh,
            max_acceleration: self.tracker.max_acceleration,
            acceleration_correlation_time: self.tracker.acceleration_correlation_time,
            observation_noise: Vector3::from_row_slice(&self.tracker.observation_noise),
            feature_alpha: self.tracker.feature_alpha,
            matching: MatchingConfig {
                distance_weight: self.tracker.distance_weight,
                feature_weight: self.tracker.feature_weight,
                distance_thresh: self.tracker.distance_thresh,
                max_iter: self.tracker.max_iter,
            },
        }
    }
}
