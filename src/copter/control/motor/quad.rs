use super::MotorControl;
use crate::copter::{QuadParams, FRONT, LEFT, REAR, RIGHT};
use nalgebra::{Vector3, Vector4};

/// Mixer for a plus-configuration quadcopter.
#[derive(Clone, Debug)]
pub struct QuadMotorControl {
    /// Perpendicular distance to axes [m].
    pub length: f32,

    /// Drag/thrust ratio
    pub kappa: f32,

    /// Maximum force of a single rotor [N].
    pub max_thrust: f32,
}

impl Default for QuadMotorControl {
    fn default() -> Self {
        Self::from(&QuadParams::default())
    }
}

impl From<&QuadParams> for QuadMotorControl {
    fn from(params: &QuadParams) -> Self {
        Self {
            length: params.arm_length,
            kappa: params.drag_coeff,
            max_thrust: params.rotor_max_force,
        }
    }
}

impl QuadMotorControl {
    /// Split a torque and collective thrust command into the force of each rotor [N].
    pub fn rotor_forces(&self, moment_cmd: Vector3<f32>, collective_thrust: f32) -> Vector4<f32> {
        // 1. Torque contribution of each pair of opposite rotors
        let t1 = moment_cmd.x / (2. * self.length);
        let t2 = moment_cmd.y / (2. * self.length);
        let t3 = moment_cmd.z / (4. * self.kappa);
        let base = collective_thrust / 4.;

        // 2. Combine into the force on each rotor
        let mut forces = Vector4::zeros();
        forces[FRONT] = base - t2 - t3;
        forces[RIGHT] = base - t1 + t3;
        forces[REAR] = base + t2 - t3;
        forces[LEFT] = base + t1 + t3;
        forces
    }

    /// Rescale rotor forces to duty cycles.
    ///
    /// The range spans from the smallest force (at most zero) to the largest
    /// force (at least the rotor maximum).
    pub fn duty_cycles(&self, forces: Vector4<f32>) -> Vector4<f32> {
        let min = forces.min().min(0.);
        let max = forces.max().max(self.max_thrust);

        let slope = if max == min { f32::MAX } else { 1. / (max - min) };
        forces.map(|force| slope * (force - min))
    }
}

impl MotorControl for QuadMotorControl {
    fn motor_control(&self, moment_cmd: Vector3<f32>, collective_thrust: f32) -> Vector4<f32> {
        self.duty_cycles(self.rotor_forces(moment_cmd, collective_thrust))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copter::QuadDynamics;
    use approx::assert_relative_eq;

    #[test]
    fn equal_forces_give_equal_duty_cycles() {
        let mixer = QuadMotorControl::default();
        let dc = mixer.motor_control(Vector3::zeros(), 20.);

        assert_relative_eq!(dc, Vector4::repeat(dc[0]));
        assert_relative_eq!(dc[0], 5. / 15.);
    }

    #[test]
    fn degenerate_range_stays_finite() {
        let mixer = QuadMotorControl {
            max_thrust: 0.,
            ..QuadMotorControl::default()
        };
        let dc = mixer.duty_cycles(Vector4::zeros());

        assert!(dc.iter().all(|dc| dc.is_finite()));
        assert_eq!(dc, Vector4::zeros());
    }

    #[test]
    fn negative_forces_shift_the_range() {
        let mixer = QuadMotorControl::default();
        let dc = mixer.duty_cycles(Vector4::new(-5., 0., 5., 10.));

        assert_relative_eq!(dc, Vector4::new(0., 0.25, 0.5, 0.75));
    }

    #[test]
    fn mixing_inverts_the_rotor_model() {
        let params = QuadParams::default();
        let mixer = QuadMotorControl::from(&params);
        let quad = QuadDynamics::new(params);

        let moment = Vector3::new(0.2, -0.1, 0.05);
        let forces = mixer.rotor_forces(moment, 12.);

        // Forces are within the linear range, feed them back through the model
        let dc = forces / params.rotor_max_force;
        assert_relative_eq!(quad.torques(&dc), moment, epsilon = 1e-5);
        assert_relative_eq!(quad.thrust(&dc), 12., epsilon = 1e-5);
    }
}
