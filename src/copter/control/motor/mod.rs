use nalgebra::{Vector3, Vector4};

mod quad;
pub use quad::QuadMotorControl;

/// Mixer turning a body torque and collective thrust command into rotor duty cycles.
pub trait MotorControl {
    fn motor_control(&self, moment_cmd: Vector3<f32>, collective_thrust: f32) -> Vector4<f32>;
}
