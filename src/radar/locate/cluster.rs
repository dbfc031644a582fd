//! Thin wrapper around the `dbscan` crate's Euclidean clustering, adapted to work
//! directly on `nalgebra::Point3` and to additionally reject oversized clusters
//! (`max_cluster_size`), which the upstream crate does not model.

use std::collections::HashMap;

use dbscan::Classification;
use nalgebra::Point3;

// Runs DBSCAN over `points` and returns, per point, its cluster id or -1 for noise.
// Clusters larger than `max_cluster_size` are relabeled as noise.
pub fn euclidean_cluster(
    points: &[Point3<f32>],
    epsilon: f32,
    min_cluster_size: usize,
    max_cluster_size: usize,
) -> Vec<isize> {
    let data: Vec<Vec<f32>> = points.iter().map(|p| vec![p.x, p.y, p.z]).collect();
    let classifications = dbscan::cluster(epsilon, min_cluster_size, &data);

    let mut labels: Vec<isize> = classifications
        .iter()
        .map(|classification| match classification {
            Classification::Core(id) | Classification::Edge(id) => *id as isize,
            Classification::Noise => -1,
        })
        .collect();

    let mut counts: HashMap<isize, usize> = HashMap::new();
    for &label in &labels {
        if label >= 0 {
            *counts.entry(label).or_insert(0) += 1;
        }
    }

    for label in labels.iter_mut() {
        if *label >= 0 && counts.get(label).copied().unwrap_or(0) > max_cluster_size {
            *label = -1;
        }
    }

    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_separated_groups_get_distinct_cluster_ids() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.1, 0.0, 0.0),
            Point3::new(0.0, 0.1, 0.0),
            Point3::new(10.0, 10.0, 0.0),
            Point3::new(10.1, 10.0, 0.0),
            Point3::new(10.0, 10.1, 0.0),
        ];
        let labels = euclidean_cluster(&points, 0.5, 2, 1_000);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_ne!(labels[0], labels[3]);
        assert!(labels.iter().all(|&l| l != -1));
    }

    #[test]
    fn oversized_cluster_is_relabeled_noise() {
        let points: Vec<_> = (0..20)
            .map(|i| Point3::new(i as f32 * 0.01, 0.0, 0.0))
            .collect();
        let labels = euclidean_cluster(&points, 0.5, 2, 5);
        assert!(labels.iter().all(|&l| l == -1));
    }

    #[test]
    fn isolated_point_is_noise() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.1, 0.0, 0.0),
            Point3::new(50.0, 50.0, 50.0),
        ];
        let labels = euclidean_cluster(&points, 0.5, 2, 1_000);
        assert_eq!(labels[2], -1);
    }
}
