//! Cost scoring and the auction algorithm used for track-to-robot assignment.

use std::collections::VecDeque;

use super::track::Track;
use crate::robot::Robot;

#[derive(Debug, Clone, Copy)]
pub struct MatchingConfig {
    pub distance_weight: f32,
    pub feature_weight: f32,
    pub distance_thresh: f32,
    pub max_iter: usize,
}

/// Distance score `s_d`, continuous at `d = D` (value 1.0) and `d = 2D` (value 0.5).
pub fn distance_score(distance: f32, threshold: f32) -> f32 {
    if distance < threshold {
        1.0
    } else if distance < 2.0 * threshold {
        1.5 - distance / (2.0 * threshold)
    } else {
        0.5 * (2.0 - distance / threshold).exp()
    }
}

/// Cosine-similarity feature score mapped from `[-1, 1]` to `[0, 1]`.
pub fn feature_score(robot_feature: &[f32], track_feature: &[f32]) -> f32 {
    debug_assert_eq!(
        robot_feature.len(),
        track_feature.len(),
        "feature dimension mismatch between robot and track"
    );

    let dot: f32 = robot_feature
        .iter()
        .zip(track_feature.iter())
        .map(|(a, b)| a * b)
        .sum();
    let norm_a = robot_feature.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = track_feature.iter().map(|v| v * v).sum::<f32>().sqrt();

    let cosine = if norm_a > 0.0 && norm_b > 0.0 {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    } else {
        0.0
    };
    (cosine + 1.0) / 2.0
}

/// Utility of matching `track` to `robot`: higher is better.
pub fn match_cost(track: &Track, robot: &Robot, config: &MatchingConfig) -> f32 {
    if !robot.is_located() && !robot.is_detected() {
        return 0.0;
    }

    let distance_component = if let Some(location) = robot.location {
        let distance = (location - track.location()).norm();
        distance_score(distance, config.distance_thresh)
    } else {
        0.0
    };

    let feature_component = if robot.is_detected() {
        feature_score(&robot.feature(track.feature().len()), track.feature())
    } else {
        0.0
    };

    config.distance_weight * distance_component + config.feature_weight * feature_component
}

/// Bertsekas auction algorithm for max-utility one-to-one assignment, capped at
/// `max_iter` total bids. Returns, for each row (track), the matched column (robot)
/// index or `None` if left unmatched when the cap is hit or the matrix is empty.
pub fn auction_assignment(cost: &[Vec<f32>], max_iter: usize) -> Vec<Option<usize>> {
    let n_rows = cost.len();
    let n_cols = cost.first().map_or(0, |row| row.len());
    if n_rows == 0 || n_cols == 0 {
        return vec![None; n_rows];
    }

    let n = n_rows.max(n_cols);
    let mut padded = vec![vec![0.0f32; n]; n];
    for (i, row) in cost.iter().enumerate() {
        padded[i][..n_cols].copy_from_slice(row);
    }

    let epsilon_min = 1.0 / (n as f32 + 1.0);
    let mut prices = vec![0.0f32; n];
    let mut row_to_col: Vec<Option<usize>> = vec![None; n];
    let mut col_to_row: Vec<Option<usize>> = vec![None; n];
    let mut epsilon = 1.0f32;
    let mut iterations = 0usize;

    'outer: while epsilon > epsilon_min {
        let mut unassigned: VecDeque<usize> =
            (0..n).filter(|&i| row_to_col[i].is_none()).collect();

        while let Some(row) = unassigned.pop_front() {
            if iterations >= max_iter {
                break 'outer;
            }
            iterations += 1;

            let mut best_value = f32::MIN;
            let mut second_value = f32::MIN;
            let mut best_col = 0usize;
            for col in 0..n {
                let value = padded[row][col] - prices[col];
                if value > best_value {
                    second_value = best_value;
                    best_value = value;
                    best_col = col;
                } else if value > second_value {
                    second_value = value;
                }
            }
            if second_value == f32::MIN {
                second_value = best_value;
            }

            prices[best_col] += (best_value - second_value) + epsilon;

            if let Some(previous_row) = col_to_row[best_col] {
                row_to_col[previous_row] = None;
                unassigned.push_back(previous_row);
            }
            col_to_row[best_col] = Some(row);
            row_to_col[row] = Some(best_col);
        }

        epsilon /= 2.0;
    }

    row_to_col
        .into_iter()
        .take(n_rows)
        .map(|col| col.filter(|&c| c < n_cols))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_score_continuous_at_boundaries() {
        let d = 2.0;
        assert!((distance_score(d - 1e-3, d) - 1.0).abs() < 1e-2);
        assert!((distance_score(d, d) - 1.0).abs() < 1e-6);
        assert!((distance_score(2.0 * d, d) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn feature_score_identical_vectors_is_one() {
        let feature = vec![0.2, 0.3, 0.5];
        assert!((feature_score(&feature, &feature) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn feature_score_zero_vectors_is_half() {
        let zero = vec![0.0, 0.0, 0.0];
        assert!((feature_score(&zero, &zero) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn auction_produces_one_to_one_matching() {
        let cost = vec![
            vec![0.9, 0.1, 0.0],
            vec![0.2, 0.8, 0.1],
            vec![0.1, 0.1, 0.95],
        ];
        let assignment = auction_assignment(&cost, 10_000);
        let matched: Vec<_> = assignment.iter().filter_map(|&c| c).collect();
        let unique: std::collections::HashSet<_> = matched.iter().collect();
        assert_eq!(matched.len(), unique.len());
    }

    #[test]
    fn auction_respects_iteration_cap() {
        let cost = vec![vec![1.0; 50]; 50];
        let assignment = auction_assignment(&cost, 1);
        assert_eq!(assignment.len(), 50);
    }

    #[test]
    fn auction_handles_empty_matrix() {
        let cost: Vec<Vec<f32>> = vec![];
        assert!(auction_assignment(&cost, 100).is_empty());
    }
}
