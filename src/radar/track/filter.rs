//! Singer-model Kalman filter over a 9-dimensional state
//! `[x, vx, ax, y, vy, ay, z, vz, az]`.
//!
//! Each axis carries its own position/velocity/acceleration triple and shares the same
//! maneuver time constant `tau` and acceleration variance `max_acceleration^2`.

use nalgebra::{Point3, SMatrix, SVector};

const STATE_DIM: usize = 9;
const MEAS_DIM: usize = 3;

type StateVector = SVector<f32, STATE_DIM>;
type StateMatrix = SMatrix<f32, STATE_DIM, STATE_DIM>;
type MeasVector = SVector<f32, MEAS_DIM>;
type MeasMatrix = SMatrix<f32, MEAS_DIM, MEAS_DIM>;
type ObservationMatrix = SMatrix<f32, MEAS_DIM, STATE_DIM>;

/// Per-axis indices into the state vector: position, velocity, acceleration.
const AXIS_OFFSETS: [usize; 3] = [0, 3, 6];

#[derive(Debug, Clone)]
pub struct SingerFilter {
    pub mean: StateVector,
    pub covariance: StateMatrix,
}

impl SingerFilter {
    pub fn new(location: Point3<f32>, observation_noise: nalgebra::Vector3<f32>) -> Self {
        let mut mean = StateVector::zeros();
        for (axis, &offset) in AXIS_OFFSETS.iter().enumerate() {
            mean[offset] = location[axis];
        }

        let mut covariance = StateMatrix::identity() * 1.0e4;
        for (axis, &offset) in AXIS_OFFSETS.iter().enumerate() {
            covariance[(offset, offset)] = observation_noise[axis].powi(2);
        }

        Self { mean, covariance }
    }

    pub fn location(&self) -> Point3<f32> {
        Point3::new(self.mean[0], self.mean[3], self.mean[6])
    }

    pub fn predict(&mut self, dt: f32, max_acceleration: f32, tau: f32) {
        if dt <= 0.0 {
            return;
        }

        let (transition, process_noise) = singer_matrices(dt, max_acceleration, tau);

        let mut full_transition = StateMatrix::zeros();
        let mut full_process_noise = StateMatrix::zeros();
        for &offset in AXIS_OFFSETS.iter() {
            full_transition
                .fixed_view_mut::<3, 3>(offset, offset)
                .copy_from(&transition);
            full_process_noise
                .fixed_view_mut::<3, 3>(offset, offset)
                .copy_from(&process_noise);
        }

        self.mean = full_transition * self.mean;
        self.covariance =
            full_transition * self.covariance * full_transition.transpose() + full_process_noise;
    }

    pub fn update(&mut self, location: Point3<f32>, observation_noise: nalgebra::Vector3<f32>) {
        let mut observation_matrix = ObservationMatrix::zeros();
        for (axis, &offset) in AXIS_OFFSETS.iter().enumerate() {
            observation_matrix[(axis, offset)] = 1.0;
        }

        let measurement = MeasVector::new(location.x, location.y, location.z);
        let measurement_noise = MeasMatrix::from_diagonal(&MeasVector::new(
            observation_noise.x.powi(2),
            observation_noise.y.powi(2),
            observation_noise.z.powi(2),
        ));

        let innovation = measurement - observation_matrix * self.mean;
        let innovation_covariance =
            observation_matrix * self.covariance * observation_matrix.transpose()
                + measurement_noise;

        let Some(innovation_covariance_inverse) = innovation_covariance.try_inverse() else {
            return;
        };

        let kalman_gain =
            self.covariance * observation_matrix.transpose() * innovation_covariance_inverse;

        self.mean += kalman_gain * innovation;
        let identity = StateMatrix::identity();
        self.covariance = (identity - kalman_gain * observation_matrix) * self.covariance;
    }
}

/// Discretized Singer-model transition and process-noise matrices for a single axis,
/// per the standard closed form (Singer 1970 / Bar-Shalom).
fn singer_matrices(
    dt: f32,
    max_acceleration: f32,
    tau: f32,
) -> (SMatrix<f32, 3, 3>, SMatrix<f32, 3, 3>) {
    let alpha = 1.0 / tau;
    let alpha_dt = alpha * dt;
    let exp_neg = (-alpha_dt).exp();
    let exp_neg2 = (-2.0 * alpha_dt).exp();

    #[rustfmt::skip]
    let transition = SMatrix::<f32, 3, 3>::new(
        1.0, dt, (alpha * dt - 1.0 + exp_neg) / alpha.powi(2),
        0.0, 1.0, (1.0 - exp_neg) / alpha,
        0.0, 0.0, exp_neg,
    );

    let sigma2 = max_acceleration.powi(2);
    let scale = 2.0 * alpha * sigma2;

    let q11 = (1.0 - exp_neg2 + 2.0 * alpha_dt + (2.0 * alpha.powi(3) * dt.powi(3)) / 3.0
        - 2.0 * alpha.powi(2) * dt.powi(2)
        - 4.0 * alpha_dt * exp_neg)
        / (2.0 * alpha.powi(5));
    let q12 = (exp_neg2 + 1.0 - 2.0 * exp_neg + 2.0 * alpha_dt * exp_neg - 2.0 * alpha_dt
        + alpha.powi(2) * dt.powi(2))
        / (2.0 * alpha.powi(4));
    let q13 = (1.0 - exp_neg2 - 2.0 * alpha_dt * exp_neg) / (2.0 * alpha.powi(3));
    let q22 = (4.0 * exp_neg - 3.0 - exp_neg2 + 2.0 * alpha_dt) / (2.0 * alpha.powi(3));
    let q23 = (exp_neg2 + 1.0 - 2.0 * exp_neg) / (2.0 * alpha.powi(2));
    let q33 = (1.0 - exp_neg2) / (2.0 * alpha);

    #[rustfmt::skip]
    let process_noise = SMatrix::<f32, 3, 3>::new(
        q11, q12, q13,
        q12, q22, q23,
        q13, q23, q33,
    ) * scale;

    (transition, process_noise)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn predict_advances_position_by_velocity() {
        let mut filter = SingerFilter::new(
            Point3::new(1.0, 2.0, 3.0),
            nalgebra::Vector3::new(0.1, 0.1, 0.1),
        );
        filter.mean[1] = 2.0; // vx
        filter.predict(1.0, 1.0, 2.0);
        assert!(filter.mean[0] > 1.0 + 2.0 * 0.5);
    }

    #[test]
    fn update_pulls_state_toward_measurement() {
        let mut filter = SingerFilter::new(
            Point3::new(0.0, 0.0, 0.0),
            nalgebra::Vector3::new(0.1, 0.1, 0.1),
        );
        filter.update(Point3::new(5.0, 5.0, 5.0), nalgebra::Vector3::new(0.1, 0.1, 0.1));
        let location = filter.location();
        assert_approx_eq!(location.x, 5.0, 0.5);
        assert_approx_eq!(location.y, 5.0, 0.5);
    }

    #[test]
    fn process_noise_diagonal_matches_closed_form() {
        let (_transition, process_noise) = singer_matrices(1.0, 2.0, 1.0);
        let alpha = 1.0f32;
        let expected_q33 = 2.0 * alpha * 2.0f32.powi(2) * (1.0 - (-2.0 * alpha).exp()) / (2.0 * alpha);
        assert_approx_eq!(process_noise[(2, 2)], expected_q33, 1e-4);
    }
}
