use nalgebra::Vector3;

/// PD attitude controller producing body torques.
#[derive(Clone, Debug)]
pub struct AttitudeController {
    /// Proportional gain for roll and pitch.
    pub kp: f32,

    /// Derivative gain for roll and pitch.
    pub kd: f32,

    pub kp_yaw: f32,
    pub kd_yaw: f32,
}

impl Default for AttitudeController {
    fn default() -> Self {
        Self {
            kp: 0.030,
            kd: 0.023,
            kp_yaw: 0.0025,
            kd_yaw: 0.0026,
        }
    }
}

impl AttitudeController {
    /// Calculate the torque command from the desired and current attitude and the
    /// current Euler angle rates (all in the fixed frame).
    pub fn torque(
        &self,
        attitude_cmd: &Vector3<f32>,
        attitude: &Vector3<f32>,
        angle_rates: &Vector3<f32>,
    ) -> Vector3<f32> {
        let err = attitude_cmd - attitude;

        Vector3::new(
            self.kp * err.x - self.kd * angle_rates.x,
            self.kp * err.y - self.kd * angle_rates.y,
            self.kp_yaw * err.z - self.kd_yaw * angle_rates.z,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn at_rest_on_target_is_zero() {
        let controller = AttitudeController::default();
        let attitude = Vector3::new(0.1, -0.2, 0.3);
        assert_eq!(
            controller.torque(&attitude, &attitude, &Vector3::zeros()),
            Vector3::zeros()
        );
    }

    #[test]
    fn yaw_uses_its_own_gains() {
        let controller = AttitudeController::default();
        let torque = controller.torque(
            &Vector3::new(1., 1., 1.),
            &Vector3::zeros(),
            &Vector3::new(1., 1., 1.),
        );

        assert_relative_eq!(torque.x, 0.030 - 0.023);
        assert_relative_eq!(torque.y, 0.030 - 0.023);
        assert_relative_eq!(torque.z, 0.0025 - 0.0026);
    }
}
