use super::Stabilizer;
use crate::ball::BallParams;
use crate::copter::QuadParams;
use crate::state::{BallState, ControllerState, DroneState};
use nalgebra::Vector3;

/// Predict where a ball falling with `gravity` descends through `height`.
///
/// The ball's trajectory is first traced back to where it left the ground,
/// then forward to where it comes down through `height` on the way down.
/// Negative discriminants are treated as zero.
pub fn predict_landing(
    position: &Vector3<f32>,
    velocity: &Vector3<f32>,
    height: f32,
    gravity: f32,
) -> Vector3<f32> {
    // 1. Time since the ball left the ground
    let discriminant = (velocity.z * velocity.z + 2. * gravity * position.z).max(0.);
    let t_flight = (velocity.z - discriminant.sqrt()) / -gravity;

    // 2. Launch speed and ground position
    let launch_speed = velocity.z + gravity * t_flight;
    let launch_x = position.x - velocity.x * t_flight;
    let launch_y = position.y - velocity.y * t_flight;

    // 3. Time from the ground until the ball descends through `height`
    let discriminant = (launch_speed * launch_speed - 2. * gravity * height).max(0.);
    let t_settle = (launch_speed + discriminant.sqrt()) / gravity;

    Vector3::new(
        launch_x + velocity.x * t_settle,
        launch_y + velocity.y * t_settle,
        height,
    )
}

/// Outer loop steering the drone under the predicted landing point of the ball.
#[derive(Clone, Debug)]
pub struct DriverController {
    pub kp_xy: f32,
    pub kd_xy: f32,
    pub kp_z: f32,
    pub kd_z: f32,

    /// Bound on the commanded acceleration along each axis [m/s^2].
    pub max_acceleration: f32,

    /// Fraction of the combined rotor thrust the controller may command.
    pub thrust_margin: f32,

    /// Height the ball is caught at [m].
    pub catch_height: f32,

    /// Gravity acting on the ball [m/s^2].
    pub ball_gravity: f32,

    pub mass: f32,
    pub gravity: f32,
    pub max_thrust: f32,

    pub stabilizer: Stabilizer,
}

impl Default for DriverController {
    fn default() -> Self {
        Self::new(&QuadParams::default(), &BallParams::default())
    }
}

impl DriverController {
    pub fn new(quad: &QuadParams, ball: &BallParams) -> Self {
        Self {
            kp_xy: 0.12,
            kd_xy: 0.56,
            kp_z: 0.12,
            kd_z: 0.56,
            max_acceleration: 12.,
            thrust_margin: 0.85,
            catch_height: 5.,
            ball_gravity: ball.gravity(),
            mass: quad.mass,
            gravity: quad.gravity,
            max_thrust: quad.max_thrust(),
            stabilizer: Stabilizer::from(quad),
        }
    }

    /// Calculate the PD acceleration command towards `position_cmd`,
    /// bounded to `max_acceleration` on every axis.
    pub fn acceleration_control(
        &self,
        position_cmd: &Vector3<f32>,
        position: &Vector3<f32>,
        velocity: &Vector3<f32>,
    ) -> Vector3<f32> {
        let err_p = position_cmd - position;
        let acc = Vector3::new(
            self.kp_xy * err_p.x - self.kd_xy * velocity.x,
            self.kp_xy * err_p.y - self.kd_xy * velocity.y,
            self.kp_z * err_p.z - self.kd_z * velocity.z,
        );

        acc.map(|a| num_traits::clamp(a, -self.max_acceleration, self.max_acceleration))
    }

    /// Calculate the roll and pitch producing `acceleration_cmd`, with zero yaw.
    pub fn roll_pitch_command(&self, acceleration_cmd: &Vector3<f32>) -> Vector3<f32> {
        let vertical = self.gravity + acceleration_cmd.z;
        let roll = (acceleration_cmd.y / vertical).atan();
        let pitch = (acceleration_cmd.x / vertical).atan();

        Vector3::new(
            if roll.is_nan() { 0. } else { roll },
            if pitch.is_nan() { 0. } else { pitch },
            0.,
        )
    }

    /// Calculate the collective thrust command [N].
    ///
    /// Gravity is compensated for the current tilt and the vertical acceleration
    /// command is projected through the commanded tilt.
    pub fn thrust_command(
        &self,
        attitude_cmd: &Vector3<f32>,
        attitude: &Vector3<f32>,
        acceleration_cmd: &Vector3<f32>,
    ) -> f32 {
        let hover = self.mass * self.gravity / (attitude.y.cos() * attitude.x.cos());
        let thrust = hover + acceleration_cmd.z * attitude_cmd.y.cos() * attitude_cmd.x.cos();

        thrust.min(self.max_thrust * self.thrust_margin)
    }

    /// Run the full control chain for one driver period.
    pub fn control(&self, drone: &DroneState, ball: &BallState) -> ControllerState {
        let target = predict_landing(
            &ball.position,
            &ball.velocity,
            self.catch_height,
            self.ball_gravity,
        );

        let acceleration_cmd = self.acceleration_control(&target, &drone.position, &drone.velocity);
        let attitude_cmd = self.roll_pitch_command(&acceleration_cmd);
        let thrust_cmd = self.thrust_command(&attitude_cmd, &drone.ang_pos, &acceleration_cmd);

        self.stabilizer.stabilize(drone, &attitude_cmd, thrust_cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn resting_ball_is_caught_in_place() {
        let target = predict_landing(&Vector3::new(3., -4., 5.), &Vector3::zeros(), 5., 4.905);
        assert_relative_eq!(target, Vector3::new(3., -4., 5.), epsilon = 1e-5);
    }

    #[test]
    fn landing_follows_the_horizontal_velocity() {
        let gravity = crate::GRAVITY / 2.;
        let target = predict_landing(
            &Vector3::new(10., 0., 5.),
            &Vector3::new(-2., 0., 10.),
            5.,
            gravity,
        );

        // Ballistic time until the ball is back at 5 m
        let t = 2. * 10. / gravity;
        assert_relative_eq!(target, Vector3::new(10. - 2. * t, 0., 5.), epsilon = 1e-3);
    }

    #[test]
    fn ball_below_catch_height_has_finite_target() {
        let target = predict_landing(&Vector3::new(1., 1., 0.5), &Vector3::new(1., 0., -3.), 5., 4.905);
        assert!(target.iter().all(|n| n.is_finite()));
    }

    #[test]
    fn acceleration_is_bounded() {
        let driver = DriverController::default();
        let acc = driver.acceleration_control(
            &Vector3::new(1000., -1000., 0.),
            &Vector3::zeros(),
            &Vector3::new(0., 0., 100.),
        );
        assert_eq!(acc, Vector3::new(12., -12., -12.));
    }

    #[test]
    fn free_fall_command_has_level_attitude() {
        let driver = DriverController::default();
        let attitude = driver.roll_pitch_command(&Vector3::new(0., 0., -crate::GRAVITY));
        assert_eq!(attitude, Vector3::zeros());
    }

    #[test]
    fn thrust_is_capped() {
        let driver = DriverController::default();
        let thrust = driver.thrust_command(
            &Vector3::zeros(),
            &Vector3::zeros(),
            &Vector3::new(0., 0., 1000.),
        );
        assert_relative_eq!(thrust, 60. * 0.85);

        let hover = driver.thrust_command(&Vector3::zeros(), &Vector3::zeros(), &Vector3::zeros());
        assert_relative_eq!(hover, 0.5 * crate::GRAVITY);
    }

    #[test]
    fn hovering_under_the_ball_keeps_rotors_level() {
        let driver = DriverController::default();
        let drone = DroneState::at(Vector3::new(0., 0., 5.));
        let ball = BallState::at(Vector3::new(0., 0., 5.));

        let control = driver.control(&drone, &ball);
        let dc = control.rotor_dc;
        assert_relative_eq!(dc, nalgebra::Vector4::repeat(dc[0]));
        assert_relative_eq!(dc[0] * 60., 0.5 * crate::GRAVITY, epsilon = 1e-4);
    }
}
