//! # catching-drone
//! A periodic real-time executive running a quadcopter that tries to catch a thrown ball.
//!
//! # Generic components
//! [`scheduler`] contains the fixed-priority periodic task executive: one OS thread per
//! task, absolute activation instants and advisory deadline-miss counting.
//!
//! [`state`] contains the shared state store. Every simulation entity sits behind its own
//! crash-tolerant [`RobustLock`](state::RobustLock) and is only ever copied in and out whole.
//!
//! # Simulation components
//! [`copter`] holds the quadrotor rigid-body model ([`QuadDynamics`]) and its two-layer
//! flight controller: the PD [`Stabilizer`](copter::control::Stabilizer) and the
//! trajectory-predicting [`DriverController`](copter::control::DriverController).
//!
//! [`ball`] holds the projectile model ([`BallDynamics`]).
//!
//! [`supervisor`] drives the task lifecycle from the run/pause/reset state requested by the
//! [`panel`], and [`tasks`] wires everything into a [`World`](tasks::World).
//!
//! Use the lower level models directly to step a simulation without any threads:
//! ```
//! use catching_drone::{BallDynamics, QuadDynamics};
//! use catching_drone::state::{BallState, ControllerState, DroneState};
//! use nalgebra::Vector3;
//!
//! let quad = QuadDynamics::default();
//! let ball = BallDynamics::default();
//!
//! let mut drone = DroneState::at(Vector3::new(0., 0., 5.));
//! let mut projectile = BallState::at(Vector3::new(10., 0., 5.));
//! ball.launch(&mut projectile, 10., 0.);
//!
//! quad.step(&mut drone, &ControllerState::default(), 0.03);
//! ball.step(&mut projectile, &drone, 0.03);
//! assert!(projectile.position.x < 10.);
//! ```

pub mod ball;
pub use ball::{BallDynamics, BallParams};

pub mod config;
pub use config::SimConfig;

pub mod copter;
pub use copter::{QuadDynamics, QuadParams};

mod error;
pub use error::{Error, Result};

pub mod panel;

pub mod scheduler;

pub mod state;

pub mod supervisor;
pub use supervisor::Supervisor;

pub mod tasks;

pub mod telemetry;

/// Acceleration of gravity (in m/s^2).
pub const GRAVITY: f32 = 9.81;
