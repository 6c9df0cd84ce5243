//! Two-layer flight control.
//!
//! The [`DriverController`] predicts where the ball comes down and turns the position
//! error into an attitude and thrust command. The [`Stabilizer`] tracks that attitude
//! and mixes the result into rotor duty cycles.

use crate::copter::QuadParams;
use crate::state::{ControllerState, DroneState};
use nalgebra::Vector3;

pub mod attitude;
pub use attitude::AttitudeController;

mod driver;
pub use driver::{predict_landing, DriverController};

mod motor;
pub use motor::{MotorControl, QuadMotorControl};

/// Inner attitude loop followed by the motor mixer.
#[derive(Clone, Debug, Default)]
pub struct Stabilizer<M = QuadMotorControl> {
    pub attitude: AttitudeController,
    pub motors: M,
}

impl From<&QuadParams> for Stabilizer {
    fn from(params: &QuadParams) -> Self {
        Self {
            attitude: AttitudeController::default(),
            motors: QuadMotorControl::from(params),
        }
    }
}

impl<M: MotorControl> Stabilizer<M> {
    /// Calculate the duty cycles tracking `attitude_cmd` with a collective `thrust_cmd` [N].
    pub fn stabilize(
        &self,
        drone: &DroneState,
        attitude_cmd: &Vector3<f32>,
        thrust_cmd: f32,
    ) -> ControllerState {
        let torque_cmd = self
            .attitude
            .torque(attitude_cmd, &drone.ang_pos, &drone.ang_vel);

        ControllerState {
            rotor_dc: self.motors.motor_control(torque_cmd, thrust_cmd),
        }
    }
}
