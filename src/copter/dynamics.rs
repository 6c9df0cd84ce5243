use super::{QuadParams, FRONT, LEFT, REAR, RIGHT};
use crate::state::{ControllerState, DroneState};
use nalgebra::{Vector3, Vector4};
use tracing::warn;

/// Below this `|cos(pitch)|` the Euler rate transform is treated as singular.
const GIMBAL_LOCK: f32 = 1e-4;

/// Convert body angular rates to Euler angle rates at `attitude` (roll, pitch, yaw).
pub fn euler_rates(body: &Vector3<f32>, attitude: &Vector3<f32>) -> Vector3<f32> {
    let (sin_phi, cos_phi) = attitude.x.sin_cos();
    let (sin_theta, cos_theta) = attitude.y.sin_cos();
    let tan_theta = sin_theta / cos_theta;

    if cos_theta.abs() < GIMBAL_LOCK {
        warn!(pitch = attitude.y, "euler rate transform near gimbal lock");
    }

    Vector3::new(
        body.x + sin_phi * tan_theta * body.y + cos_phi * tan_theta * body.z,
        cos_phi * body.y - sin_phi * body.z,
        (sin_phi / cos_theta) * body.y + (cos_phi / cos_theta) * body.z,
    )
}

/// Convert Euler angle rates to body angular rates at `attitude` (roll, pitch, yaw).
pub fn body_rates(euler: &Vector3<f32>, attitude: &Vector3<f32>) -> Vector3<f32> {
    let (sin_phi, cos_phi) = attitude.x.sin_cos();
    let (sin_theta, cos_theta) = attitude.y.sin_cos();

    Vector3::new(
        euler.x - sin_theta * euler.z,
        cos_phi * euler.y + cos_theta * sin_phi * euler.z,
        -sin_phi * euler.y + cos_theta * cos_phi * euler.z,
    )
}

/// Rigid body model of a plus-configuration quadcopter.
#[derive(Clone, Debug, Default)]
pub struct QuadDynamics {
    pub params: QuadParams,
}

impl QuadDynamics {
    pub fn new(params: QuadParams) -> Self {
        Self { params }
    }

    /// Force produced by each rotor (in N).
    pub fn rotor_forces(&self, rotor_dc: &Vector4<f32>) -> Vector4<f32> {
        rotor_dc * self.params.rotor_max_force
    }

    /// Total thrust along the body z axis (in N).
    pub fn thrust(&self, rotor_dc: &Vector4<f32>) -> f32 {
        self.rotor_forces(rotor_dc).sum()
    }

    /// Body torques produced by the rotors (in N*m).
    pub fn torques(&self, rotor_dc: &Vector4<f32>) -> Vector3<f32> {
        let f = self.rotor_forces(rotor_dc);
        let l = self.params.arm_length;
        let c = self.params.drag_coeff;

        Vector3::new(
            l * (f[LEFT] - f[RIGHT]),
            l * (f[REAR] - f[FRONT]),
            c * (f[LEFT] + f[RIGHT] - f[REAR] - f[FRONT]),
        )
    }

    /// Linear acceleration in the fixed frame (in m/s^2).
    ///
    /// Only roll and pitch tilt the thrust vector.
    pub fn linear_acceleration(&self, drone: &DroneState) -> Vector3<f32> {
        let (sin_phi, cos_phi) = drone.ang_pos.x.sin_cos();
        let (sin_theta, cos_theta) = drone.ang_pos.y.sin_cos();
        let thrust = self.thrust(&drone.rotor_dc) / self.params.mass;

        Vector3::new(
            thrust * sin_theta,
            thrust * sin_phi * cos_theta,
            thrust * cos_theta * cos_phi - self.params.gravity,
        )
    }

    /// Angular acceleration in the body frame (in rad/s^2).
    pub fn angular_acceleration(&self, drone: &DroneState) -> Vector3<f32> {
        let m = self.torques(&drone.rotor_dc);
        let i = self.params.inertia;
        let w = drone.body_ang_vel;

        Vector3::new(
            (m.x - (i.y - i.z) * w.y * w.z) / i.x,
            (m.y - (i.z - i.x) * w.z * w.x) / i.y,
            (m.z - (i.x - i.y) * w.x * w.y) / i.z,
        )
    }

    /// Advance `drone` by `dt` seconds with the commanded duty cycles.
    pub fn step(&self, drone: &mut DroneState, control: &ControllerState, dt: f32) {
        // 1. Apply the latest command
        drone.rotor_dc = control.rotor_dc;

        // 2. Accelerations from the state before the step
        let lin_acc = self.linear_acceleration(drone);
        let ang_acc = self.angular_acceleration(drone);

        // 3. Integrate the attitude
        drone.body_ang_vel += ang_acc * dt;
        drone.ang_vel = euler_rates(&drone.body_ang_vel, &drone.ang_pos);
        drone.ang_pos += drone.ang_vel * dt;

        // 4. Integrate the position
        drone.velocity += lin_acc * dt;
        drone.position += drone.velocity * dt;

        // The drone cannot keep sinking once below the floor
        if drone.position.z < 0. {
            drone.velocity.z = 0.;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn equal_duty_cycles_produce_no_torque() {
        let quad = QuadDynamics::default();
        for dc in [0., 0.25, 0.6, 1.] {
            assert_eq!(quad.torques(&Vector4::repeat(dc)), Vector3::zeros());
        }
    }

    #[test]
    fn idle_rotors_fall_at_gravity() {
        let quad = QuadDynamics::default();
        let mut drone = DroneState::at(Vector3::new(0., 0., 5.));
        drone.ang_pos = Vector3::new(0.2, -0.1, 1.);

        let acc = quad.linear_acceleration(&drone);
        assert_eq!(acc, Vector3::new(0., 0., -crate::GRAVITY));
    }

    #[test]
    fn hover_thrust_balances_gravity() {
        let quad = QuadDynamics::default();
        let params = quad.params;
        let dc = params.mass * params.gravity / params.max_thrust();

        let mut drone = DroneState::at(Vector3::new(0., 0., 5.));
        let control = ControllerState {
            rotor_dc: Vector4::repeat(dc),
        };
        for _ in 0..100 {
            quad.step(&mut drone, &control, 0.01);
        }

        assert_relative_eq!(drone.position, Vector3::new(0., 0., 5.), epsilon = 1e-3);
        assert_relative_eq!(drone.ang_pos, Vector3::zeros());
    }

    #[test]
    fn left_rotor_rolls_positive() {
        let quad = QuadDynamics::default();
        let mut rotor_dc = Vector4::repeat(0.2);
        rotor_dc[LEFT] = 0.3;

        let m = quad.torques(&rotor_dc);
        assert!(m.x > 0.);
        assert_relative_eq!(m.y, 0.);
        assert!(m.z > 0.);
    }

    #[test]
    fn rate_transforms_are_inverse() {
        let attitude = Vector3::new(0.3, -0.2, 0.7);
        let body = Vector3::new(0.5, -1., 0.25);

        let back = body_rates(&euler_rates(&body, &attitude), &attitude);
        assert_relative_eq!(back, body, epsilon = 1e-5);
    }

    #[test]
    fn level_attitude_rates_are_identical() {
        let body = Vector3::new(0.5, -1., 0.25);
        assert_relative_eq!(euler_rates(&body, &Vector3::zeros()), body);
    }

    #[test]
    fn sinking_below_floor_stops_vertical_velocity() {
        let quad = QuadDynamics::default();
        let mut drone = DroneState::at(Vector3::new(0., 0., 0.001));

        quad.step(&mut drone, &ControllerState::default(), 0.1);
        assert!(drone.position.z < 0.);
        assert_eq!(drone.velocity.z, 0.);
    }
}
