//! Per-frame detection and robot-entity types shared by the locator and tracker.

use nalgebra::Point3;

use crate::radar::track::{Track, TrackState};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub label: i32,
    pub confidence: f32,
}

impl Detection {
    pub fn new(x: f32, y: f32, width: f32, height: f32, label: i32, confidence: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            label,
            confidence,
        }
    }

    pub fn left(&self) -> f32 {
        self.x
    }

    pub fn top(&self) -> f32 {
        self.y
    }

    // Boundary points count as inside.
    pub fn contains_point(&self, point_x: f32, point_y: f32) -> bool {
        point_x >= self.x
            && point_x <= self.x + self.width
            && point_y >= self.y
            && point_y <= self.y + self.height
    }

    pub fn contains_rect(&self, other: &Detection) -> bool {
        self.contains_point(other.x, other.y)
            && self.contains_point(other.x + other.width, other.y)
            && self.contains_point(other.x, other.y + other.height)
            && self.contains_point(other.x + other.width, other.y + other.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x_center: f32,
    pub y_center: f32,
    pub width: f32,
    pub height: f32,
}

impl From<&Detection> for BBox {
    fn from(detection: &Detection) -> Self {
        Self {
            x_center: detection.x + detection.width / 2.0,
            y_center: detection.y + detection.height / 2.0,
            width: detection.width,
            height: detection.height,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Robot {
    pub rect: Option<Detection>,
    pub label: Option<i32>,
    pub confidence: Option<f32>,
    pub armors: Option<Vec<Detection>>,
    pub location: Option<Point3<f32>>,
    pub track_state: Option<TrackState>,
}

impl Robot {
    // Armor coordinates are shifted into absolute image space by the car's top-left
    // corner.
    pub fn assemble(car: Detection, armors_relative: &[Detection]) -> Self {
        let armors: Vec<Detection> = armors_relative
            .iter()
            .map(|armor| Detection {
                x: armor.x + car.left(),
                y: armor.y + car.top(),
                ..*armor
            })
            .collect();

        let mut robot = Robot {
            rect: Some(car),
            label: None,
            confidence: None,
            armors: None,
            location: None,
            track_state: None,
        };

        if armors.is_empty() {
            return robot;
        }

        let mut confidence_by_label: std::collections::HashMap<i32, (f32, usize)> =
            std::collections::HashMap::new();
        for armor in &armors {
            let entry = confidence_by_label.entry(armor.label).or_insert((0.0, 0));
            entry.0 += armor.confidence;
            entry.1 += 1;
        }

        if let Some((&label, &(sum, count))) = confidence_by_label
            .iter()
            .max_by(|a, b| a.1 .0.partial_cmp(&b.1 .0).unwrap())
        {
            robot.label = Some(label);
            robot.confidence = Some(sum / count as f32);
        }
        robot.armors = Some(armors);

        robot
    }

    pub fn is_detected(&self) -> bool {
        self.label.is_some()
    }

    pub fn is_located(&self) -> bool {
        self.location.is_some()
    }

    // Length-`class_num` vector whose `i`-th entry is the L1-normalized sum of
    // confidences of armors labeled `i`. Zero when there are no armors or all
    // confidences sum to zero.
    pub fn feature(&self, class_num: usize) -> Vec<f32> {
        let mut feature = vec![0.0f32; class_num];
        let Some(armors) = &self.armors else {
            return feature;
        };

        for armor in armors {
            if let Some(slot) = usize::try_from(armor.label)
                .ok()
                .filter(|&idx| idx < class_num)
            {
                feature[slot] += armor.confidence;
            }
        }

        let sum: f32 = feature.iter().sum();
        if sum > 0.0 {
            feature.iter_mut().for_each(|v| *v /= sum);
        }
        feature
    }

    // A Confirmed track always overwrites label/location; a Tentative track only fills
    // them in if the robot does not already have them.
    pub fn set_track(&mut self, track: &Track) {
        self.track_state = Some(track.state);
        match track.state {
            TrackState::Confirmed => {
                self.label = Some(track.label());
                self.location = Some(track.location());
            }
            TrackState::Tentative => {
                if self.label.is_none() {
                    self.label = Some(track.label());
                }
                if self.location.is_none() {
                    self.location = Some(track.location());
                }
            }
            TrackState::Deleted => {}
        }
    }
}

// Armors are matched to at most one car: the first car (in input order) whose
// rectangle contains the armor wins.
pub fn assemble_robots(cars: &[Detection], armors: &[Detection]) -> Vec<Robot> {
    let mut armors_by_car: Vec<Vec<Detection>> = vec![Vec::new(); cars.len()];

    for armor in armors {
        if let Some((car_idx, car)) = cars
            .iter()
            .enumerate()
            .find(|(_, car)| car.contains_rect(armor))
        {
            let mut armor_relative = *armor;
            armor_relative.x -= car.left();
            armor_relative.y -= car.top();
            armors_by_car[car_idx].push(armor_relative);
        }
    }

    cars.iter()
        .zip(armors_by_car)
        .map(|(&car, car_armors)| Robot::assemble(car, &car_armors))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_vector_is_unit_l1_or_zero() {
        let car = Detection::new(0.0, 0.0, 100.0, 100.0, 0, 1.0);
        let armors = vec![
            Detection::new(10.0, 10.0, 5.0, 5.0, 1, 0.6),
            Detection::new(20.0, 20.0, 5.0, 5.0, 2, 0.3),
        ];
        let robot = Robot::assemble(car, &armors);
        let feature = robot.feature(4);
        let l1: f32 = feature.iter().sum();
        assert!((l1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn feature_vector_is_zero_for_no_armors() {
        let car = Detection::new(0.0, 0.0, 100.0, 100.0, 0, 1.0);
        let robot = Robot::assemble(car, &[]);
        let feature = robot.feature(4);
        assert!(feature.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn winning_label_is_argmax_of_summed_confidence() {
        let car = Detection::new(0.0, 0.0, 100.0, 100.0, 0, 1.0);
        let armors = vec![
            Detection::new(1.0, 1.0, 2.0, 2.0, 3, 0.9),
            Detection::new(2.0, 2.0, 2.0, 2.0, 5, 0.4),
            Detection::new(3.0, 3.0, 2.0, 2.0, 5, 0.3),
        ];
        let robot = Robot::assemble(car, &armors);
        assert_eq!(robot.label, Some(3));
        assert!((robot.confidence.unwrap() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn armor_absolute_position_shifts_by_car_top_left() {
        let car = Detection::new(50.0, 60.0, 100.0, 100.0, 0, 1.0);
        let armors = vec![Detection::new(5.0, 5.0, 2.0, 2.0, 1, 0.5)];
        let robot = Robot::assemble(car, &armors);
        let absolute = &robot.armors.unwrap()[0];
        assert_eq!(absolute.x, 55.0);
        assert_eq!(absolute.y, 65.0);
    }

    #[test]
    fn boundary_point_counts_as_inside() {
        let rect = Detection::new(0.0, 0.0, 10.0, 10.0, 0, 1.0);
        assert!(rect.contains_point(10.0, 10.0));
        assert!(rect.contains_point(0.0, 0.0));
        assert!(!rect.contains_point(10.01, 5.0));
    }

    #[test]
    fn assemble_robots_groups_armors_by_containing_car() {
        let cars = vec![
            Detection::new(0.0, 0.0, 100.0, 100.0, 0, 0.9),
            Detection::new(200.0, 200.0, 100.0, 100.0, 0, 0.8),
        ];
        let armors = vec![
            Detection::new(10.0, 10.0, 5.0, 5.0, 1, 0.7),
            Detection::new(210.0, 210.0, 5.0, 5.0, 2, 0.6),
        ];

        let robots = assemble_robots(&cars, &armors);
        assert_eq!(robots.len(), 2);
        assert_eq!(robots[0].label, Some(1));
        assert_eq!(robots[1].label, Some(2));
    }

    #[test]
    fn assemble_robots_handles_no_armors() {
        let cars = vec![Detection::new(0.0, 0.0, 100.0, 100.0, 0, 0.9)];
        let robots = assemble_robots(&cars, &[]);
        assert_eq!(robots.len(), 1);
        assert!(robots[0].armors.is_none());
        assert!(!robots[0].is_detected());
    }
}
