//! Shared simulation state.
//!
//! Each entity is protected by its own [`RobustLock`] and is only ever copied in
//! and out whole. A worker holds at most one entity lock at a time.

use crate::panel::PanelState;
use nalgebra::{Vector3, Vector4};

mod lock;
mod raw;
pub use lock::{Acquire, LockGuard, RobustLock};

/// State of the simulated quadcopter.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DroneState {
    /// Duty cycle applied to each rotor (front, right, rear, left).
    pub rotor_dc: Vector4<f32>,

    /// Angular velocity in the body frame (in rad/s).
    pub body_ang_vel: Vector3<f32>,

    /// Roll, pitch and yaw in the fixed frame (in rad).
    pub ang_pos: Vector3<f32>,

    /// Euler angle rates in the fixed frame (in rad/s).
    pub ang_vel: Vector3<f32>,

    /// Position in the fixed frame (in m).
    pub position: Vector3<f32>,

    /// Linear velocity in the fixed frame (in m/s).
    pub velocity: Vector3<f32>,
}

impl DroneState {
    /// A drone at rest at `position`.
    pub fn at(position: Vector3<f32>) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

/// State of the ball.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BallState {
    pub position: Vector3<f32>,
    pub velocity: Vector3<f32>,
}

impl BallState {
    /// A ball at rest at `position`.
    pub fn at(position: Vector3<f32>) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

/// Rotor duty cycles commanded by the flight controller.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ControllerState {
    pub rotor_dc: Vector4<f32>,
}

/// The store shared by every task.
#[derive(Debug, Default)]
pub struct SharedState {
    pub drone: RobustLock<DroneState>,
    pub ball: RobustLock<BallState>,
    pub control: RobustLock<ControllerState>,
    pub panel: RobustLock<PanelState>,
}

impl SharedState {
    /// Create a new store with zeroed simulation entities and the given panel.
    pub fn new(panel: PanelState) -> Self {
        Self {
            panel: RobustLock::new(panel),
            ..Self::default()
        }
    }

    /// Zero the drone, ball and controller, taking each lock in turn.
    pub fn reset_simulation(&self) {
        self.drone.reset();
        self.ball.reset();
        self.control.reset();
    }

    /// Zero the drone, ball and controller without locking.
    pub fn reset_simulation_unlocked(&mut self) {
        self.drone.reset_unlocked();
        self.ball.reset_unlocked();
        self.control.reset_unlocked();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_leaves_the_panel_alone() {
        let mut panel = PanelState::default();
        panel.set_launch(7., 0.);
        let store = SharedState::new(panel);

        store.drone.store(&DroneState::at(Vector3::new(1., 2., 3.)));
        store.ball.store(&BallState::at(Vector3::new(4., 5., 6.)));
        store.control.store(&ControllerState {
            rotor_dc: Vector4::repeat(0.5),
        });

        store.reset_simulation();
        assert_eq!(store.drone.snapshot(), DroneState::default());
        assert_eq!(store.ball.snapshot(), BallState::default());
        assert_eq!(store.control.snapshot(), ControllerState::default());
        assert_eq!(store.panel.snapshot().power(), 7.);
    }

    #[test]
    fn unlocked_reset_zeroes_entities() {
        let mut store = SharedState::default();
        store.ball.store(&BallState::at(Vector3::new(4., 5., 6.)));

        store.reset_simulation_unlocked();
        assert_eq!(store.ball.snapshot(), BallState::default());
    }
}
