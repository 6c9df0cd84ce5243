//! Quadcopter model and flight control.

pub mod control;

mod dynamics;
pub use dynamics::{body_rates, euler_rates, QuadDynamics};

/// Index of the front rotor.
pub const FRONT: usize = 0;

/// Index of the right rotor.
pub const RIGHT: usize = 1;

/// Index of the rear rotor.
pub const REAR: usize = 2;

/// Index of the left rotor.
pub const LEFT: usize = 3;

/// Physical parameters of a quadcopter in the plus configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadParams {
    /// Maximum force of a single rotor (in N).
    pub rotor_max_force: f32,

    /// Mass of the drone (in kg).
    pub mass: f32,

    /// Distance from the center of mass to each rotor (in m).
    pub arm_length: f32,

    /// Drag/thrust ratio of the rotors.
    pub drag_coeff: f32,

    /// Diagonal of the inertia matrix (in kg*m^2).
    pub inertia: nalgebra::Vector3<f32>,

    /// Acceleration of gravity (in m/s^2).
    pub gravity: f32,
}

impl Default for QuadParams {
    fn default() -> Self {
        Self {
            rotor_max_force: 15.,
            mass: 0.5,
            arm_length: 0.2,
            drag_coeff: 0.08,
            inertia: nalgebra::Vector3::new(5.5e-3, 5.5e-3, 1e-3),
            gravity: crate::GRAVITY,
        }
    }
}

impl QuadParams {
    /// Combined thrust of all four rotors at full duty cycle (in N).
    pub fn max_thrust(&self) -> f32 {
        self.rotor_max_force * 4.
    }
}
