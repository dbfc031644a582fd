//! Fuses an image-space bounding box with a LiDAR point cloud to compute a robot's
//! 3-D field-frame position.
//!
//! The pipeline per tick is `update(cloud)` (depth-image background model) →
//! `cluster()` (Euclidean clustering over the foreground cloud) → `search(robots)`
//! (per-robot candidate grouping and centroid selection).

mod cluster;

use std::collections::{HashMap, VecDeque};

use anyhow::{anyhow, Result};
use image::{ImageBuffer, Luma};
use nalgebra::{Const, Matrix3, Matrix4, OMatrix, Point3, Vector3, Vector4};
use rayon::prelude::*;
use tracing::debug;

use crate::robot::Robot;
use cluster::euclidean_cluster;

struct Transform {
    transform_matrix: Matrix4<f32>,
    transform_matrix_inverse: Matrix4<f32>,
    rotation_matrix: Matrix3<f32>,
    rotation_matrix_inverse: Matrix3<f32>,
    translation_vector_inverse: Vector3<f32>,
}

impl TryFrom<Matrix4<f32>> for Transform {
    type Error = anyhow::Error;

    fn try_from(transform_matrix: Matrix4<f32>) -> Result<Self> {
        let transform_matrix_inverse = transform_matrix
            .try_inverse()
            .ok_or_else(|| anyhow!("failed to invert transform matrix {:#?}", transform_matrix))?;
        let rotation_matrix: Matrix3<f32> = transform_matrix.fixed_view::<3, 3>(0, 0).into();
        let rotation_matrix_inverse = rotation_matrix
            .try_inverse()
            .ok_or_else(|| anyhow!("failed to invert rotation matrix {:#?}", rotation_matrix))?;
        let translation_vector = Vector3::new(
            transform_matrix[(0, 3)],
            transform_matrix[(1, 3)],
            transform_matrix[(2, 3)],
        );

        Ok(Self {
            transform_matrix,
            transform_matrix_inverse,
            rotation_matrix,
            rotation_matrix_inverse,
            translation_vector_inverse: -translation_vector,
        })
    }
}

struct MatrixWithInverse<const DIM: usize> {
    matrix: OMatrix<f32, Const<DIM>, Const<DIM>>,
    matrix_inverse: OMatrix<f32, Const<DIM>, Const<DIM>>,
}

impl<const DIM: usize> TryFrom<OMatrix<f32, Const<DIM>, Const<DIM>>> for MatrixWithInverse<DIM> {
    type Error = anyhow::Error;

    fn try_from(matrix: OMatrix<f32, Const<DIM>, Const<DIM>>) -> Result<Self> {
        let matrix_inverse = matrix
            .try_inverse()
            .ok_or_else(|| anyhow!("failed to invert matrix {:#?}", matrix))?;
        Ok(Self {
            matrix,
            matrix_inverse,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LocatorConfig {
    pub image_width: u32,
    pub image_height: u32,
    pub zoom_factor: f32,
    pub camera_intrinsic: Matrix3<f32>,
    pub lidar_to_camera: Matrix4<f32>,
    pub world_to_camera: Matrix4<f32>,
    pub queue_size: usize,
    pub min_depth_diff: f32,
    pub max_depth_diff: f32,
    pub max_distance: f32,
    pub cluster_tolerance: f32,
    pub min_cluster_size: usize,
    pub max_cluster_size: usize,
}

type DepthImage = ImageBuffer<Luma<f32>, Vec<f32>>;

pub struct Locator {
    camera_intrinsic: MatrixWithInverse<3>,
    lidar_to_camera: Transform,
    world_to_camera: Transform,
    zoom_factor: f32,
    zoomed_width: u32,
    zoomed_height: u32,
    min_depth_diff: f32,
    max_depth_diff: f32,
    max_distance: f32,
    cluster_tolerance: f32,
    min_cluster_size: usize,
    max_cluster_size: usize,
    queue_size: usize,

    background_depth: DepthImage,
    depth_queue: VecDeque<DepthImage>,
    diff_depth_image: DepthImage,

    foreground_cloud: Vec<Point3<f32>>,
    pixel_index_map: HashMap<(u32, u32), usize>,
    index_cluster_map: Vec<isize>,
}

impl Locator {
    pub fn new(config: LocatorConfig) -> Result<Self> {
        let zoomed_width = ((config.image_width as f32) * config.zoom_factor)
            .round()
            .max(1.0) as u32;
        let zoomed_height = ((config.image_height as f32) * config.zoom_factor)
            .round()
            .max(1.0) as u32;

        Ok(Self {
            camera_intrinsic: MatrixWithInverse::try_from(config.camera_intrinsic)?,
            lidar_to_camera: Transform::try_from(config.lidar_to_camera)?,
            world_to_camera: Transform::try_from(config.world_to_camera)?,
            zoom_factor: config.zoom_factor,
            zoomed_width,
            zoomed_height,
            min_depth_diff: config.min_depth_diff,
            max_depth_diff: config.max_depth_diff,
            max_distance: config.max_distance,
            cluster_tolerance: config.cluster_tolerance,
            min_cluster_size: config.min_cluster_size,
            max_cluster_size: config.max_cluster_size,
            queue_size: config.queue_size.max(1),
            background_depth: ImageBuffer::new(zoomed_width, zoomed_height),
            depth_queue: VecDeque::with_capacity(config.queue_size.max(1)),
            diff_depth_image: ImageBuffer::new(zoomed_width, zoomed_height),
            foreground_cloud: Vec::new(),
            pixel_index_map: HashMap::new(),
            index_cluster_map: Vec::new(),
        })
    }

    // Projects a LiDAR-frame point into the zoomed depth image: (u, v, depth), where
    // depth is the camera-frame Z in raw units.
    fn lidar_to_camera(&self, point: &Point3<f32>) -> (i64, i64, f32) {
        let lidar_vector = Vector4::new(point.x, point.y, point.z, 1.0);
        let camera_point = (self.lidar_to_camera.transform_matrix * lidar_vector).xyz();
        let pixel = self.camera_intrinsic.matrix * camera_point;
        let depth = pixel.z;
        let u = ((pixel.x / depth) * self.zoom_factor).round() as i64;
        let v = ((pixel.y / depth) * self.zoom_factor).round() as i64;
        (u, v, depth)
    }

    fn camera_to_lidar(&self, u: u32, v: u32, depth: f32) -> Point3<f32> {
        let pixel = Vector3::new(
            u as f32 / self.zoom_factor,
            v as f32 / self.zoom_factor,
            1.0,
        );
        let camera_point = self.camera_intrinsic.matrix_inverse * depth * pixel
            + self.lidar_to_camera.translation_vector_inverse;
        let lidar_point = self.lidar_to_camera.rotation_matrix_inverse * camera_point;
        Point3::new(lidar_point.x, lidar_point.y, lidar_point.z)
    }

    fn lidar_to_world(&self, point: &Point3<f32>) -> Point3<f32> {
        let lidar_vector = Vector4::new(point.x, point.y, point.z, 1.0);
        let world_vector = self.world_to_camera.transform_matrix_inverse
            * self.lidar_to_camera.transform_matrix
            * lidar_vector;
        Point3::new(world_vector.x, world_vector.y, world_vector.z)
    }

    pub fn update(&mut self, cloud: &[Point3<f32>]) {
        if cloud.is_empty() {
            debug!("point cloud is empty, skipping background depth update");
            self.diff_depth_image = ImageBuffer::new(self.zoomed_width, self.zoomed_height);
            return;
        }

        let mut depth_image: DepthImage = ImageBuffer::new(self.zoomed_width, self.zoomed_height);

        let projected: Vec<(u32, u32, f32)> = cloud
            .par_iter()
            .filter_map(|point| {
                if point.x == 0.0 && point.y == 0.0 && point.z == 0.0 {
                    return None;
                }
                if point.x > self.max_distance {
                    return None;
                }
                let (u, v, depth) = self.lidar_to_camera(point);
                if u < 0 || v < 0 || u as u32 >= self.zoomed_width || v as u32 >= self.zoomed_height
                {
                    return None;
                }
                Some((u as u32, v as u32, depth))
            })
            .collect();

        for (u, v, depth) in projected {
            depth_image.put_pixel(u, v, Luma([depth]));
            let background_pixel = self.background_depth.get_pixel_mut(u, v);
            if depth > background_pixel.0[0] {
                background_pixel.0[0] = depth;
            }
        }

        self.depth_queue.push_back(depth_image);
        if self.depth_queue.len() > self.queue_size {
            self.depth_queue.pop_front();
        }

        let mut diff_depth_image: DepthImage =
            ImageBuffer::new(self.zoomed_width, self.zoomed_height);
        for frame in &self.depth_queue {
            diff_depth_image
                .enumerate_pixels_mut()
                .par_bridge()
                .for_each(|(u, v, out_pixel)| {
                    let frame_depth = frame.get_pixel(u, v).0[0];
                    if frame_depth == 0.0 {
                        return;
                    }
                    let background_depth = self.background_depth.get_pixel(u, v).0[0];
                    let delta = background_depth - frame_depth;
                    if delta >= self.min_depth_diff && delta <= self.max_depth_diff {
                        out_pixel.0[0] = frame_depth;
                    }
                });
        }
        self.diff_depth_image = diff_depth_image;
    }

    pub fn cluster(&mut self) {
        self.foreground_cloud.clear();
        self.pixel_index_map.clear();
        self.index_cluster_map.clear();

        for (u, v, pixel) in self.diff_depth_image.enumerate_pixels() {
            let depth = pixel.0[0];
            if depth == 0.0 {
                continue;
            }
            let index = self.foreground_cloud.len();
            self.foreground_cloud.push(self.camera_to_lidar(u, v, depth));
            self.pixel_index_map.insert((u, v), index);
        }

        if self.foreground_cloud.is_empty() {
            return;
        }

        self.index_cluster_map = euclidean_cluster(
            &self.foreground_cloud,
            self.cluster_tolerance,
            self.min_cluster_size,
            self.max_cluster_size,
        );
    }

    // Assigns robot.location from the largest point cluster inside the robot's
    // (zoomed) rectangle. Leaves location unset on any missing input.
    pub fn search(&self, robot: &mut Robot) {
        let Some(rect) = robot.rect else {
            return;
        };

        let x_min = (rect.x * self.zoom_factor).max(0.0).floor() as u32;
        let y_min = (rect.y * self.zoom_factor).max(0.0).floor() as u32;
        let x_max = ((rect.x + rect.width) * self.zoom_factor).ceil() as u32;
        let y_max = ((rect.y + rect.height) * self.zoom_factor).ceil() as u32;

        if x_min >= self.zoomed_width || y_min >= self.zoomed_height || x_max <= x_min || y_max <= y_min
        {
            return;
        }

        let mut candidates: HashMap<isize, Vec<Point3<f32>>> = HashMap::new();

        for v in y_min..y_max.min(self.zoomed_height) {
            for u in x_min..x_max.min(self.zoomed_width) {
                let depth = self.diff_depth_image.get_pixel(u, v).0[0];
                if depth == 0.0 {
                    continue;
                }
                let cluster_id = self
                    .pixel_index_map
                    .get(&(u, v))
                    .map(|&index| {
                        self.index_cluster_map
                            .get(index)
                            .copied()
                            .unwrap_or(-1)
                    })
                    .unwrap_or(-1);

                candidates
                    .entry(cluster_id)
                    .or_default()
                    .push(self.camera_to_lidar(u, v, depth));
            }
        }

        if candidates.is_empty() {
            return;
        }

        let mut best: Option<(isize, usize)> = None;
        for (&id, points) in &candidates {
            let replace = match best {
                None => true,
                Some((best_id, best_len)) => {
                    points.len() > best_len || (points.len() == best_len && id < best_id)
                }
            };
            if replace {
                best = Some((id, points.len()));
            }
        }

        let Some((best_id, _)) = best else {
            return;
        };
        let points = &candidates[&best_id];

        let sum = points
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.coords);
        let centroid = Point3::from(sum / points.len() as f32);

        robot.location = Some(self.lidar_to_world(&centroid));
    }

    pub fn search_all(&self, robots: &mut [Robot]) {
        robots.par_iter_mut().for_each(|robot| self.search(robot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::Detection;
    use assert_approx_eq::assert_approx_eq;

    fn identity_config() -> LocatorConfig {
        LocatorConfig {
            image_width: 640,
            image_height: 480,
            zoom_factor: 1.0,
            camera_intrinsic: Matrix3::identity(),
            lidar_to_camera: Matrix4::identity(),
            world_to_camera: Matrix4::identity(),
            queue_size: 3,
            min_depth_diff: 0.1,
            max_depth_diff: 10.0,
            max_distance: 100.0,
            cluster_tolerance: 0.5,
            min_cluster_size: 1,
            max_cluster_size: 10_000,
        }
    }

    #[test]
    fn lidar_camera_round_trip() {
        let locator = Locator::new(identity_config()).unwrap();
        // Chosen so the projected pixel lands exactly on integer coordinates; the
        // round trip is only expected to be lossless where pixel rounding doesn't
        // perturb it.
        let point = Point3::new(3.0, 6.0, 3.0);
        let (u, v, depth) = locator.lidar_to_camera(&point);
        let back = locator.camera_to_lidar(u as u32, v as u32, depth);
        assert_approx_eq!((point - back).norm(), 0.0, 1e-3);
    }

    #[test]
    fn empty_cloud_leaves_images_zero() {
        let mut locator = Locator::new(identity_config()).unwrap();
        locator.update(&[]);
        locator.cluster();
        assert!(locator.foreground_cloud.is_empty());

        let mut robot = Robot {
            rect: Some(Detection::new(0.0, 0.0, 10.0, 10.0, 0, 1.0)),
            ..Default::default()
        };
        locator.search(&mut robot);
        assert!(robot.location.is_none());
    }

    #[test]
    fn background_depth_is_running_maximum() {
        let mut locator = Locator::new(identity_config()).unwrap();

        // All three points share the same x/z, y/z ratio (0.4, 0.6) and therefore
        // project to the same zoomed pixel regardless of depth.
        locator.update(&[Point3::new(2.0, 3.0, 5.0)]);
        let first = locator.background_depth.get_pixel(0, 1).0[0];

        locator.update(&[Point3::new(4.0, 6.0, 10.0)]);
        let second = locator.background_depth.get_pixel(0, 1).0[0];

        locator.update(&[Point3::new(1.0, 1.5, 2.5)]);
        let third = locator.background_depth.get_pixel(0, 1).0[0];

        assert_eq!(first, 5.0);
        assert_eq!(second, 10.0);
        assert_eq!(third, 10.0);
    }

    #[test]
    fn search_picks_largest_cluster_and_reports_world_location() {
        let mut locator = Locator::new(identity_config()).unwrap();

        // First tick establishes a static background at the far depth (15). Second
        // tick places a robot-sized cluster at the same pixel but closer (depth 10),
        // producing a delta that falls inside [min_depth_diff, max_depth_diff].
        locator.update(&[Point3::new(30.0, 30.0, 15.0)]);
        locator.update(&[
            Point3::new(20.0, 20.0, 10.0),
            Point3::new(20.1, 20.0, 10.0),
            Point3::new(20.0, 20.1, 10.0),
        ]);
        locator.cluster();

        let rect = Detection::new(0.0, 0.0, 640.0, 480.0, 0, 1.0);
        let mut robot = Robot {
            rect: Some(rect),
            ..Default::default()
        };
        locator.search(&mut robot);

        assert!(robot.location.is_some());
        let location = robot.location.unwrap();
        assert_approx_eq!(location.x, 20.0, 0.5);
        assert_approx_eq!(location.y, 20.0, 0.5);
    }
}
