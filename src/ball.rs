//! Projectile model of the thrown ball.

use crate::state::{BallState, DroneState};
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Parameters of the ball model.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BallParams {
    /// The ball falls with `GRAVITY / gravity_scale`.
    pub gravity_scale: f32,

    /// Horizontal distance below which the drone catches the ball [m].
    pub catch_radius: f32,

    /// Height above the drone below which the drone catches the ball [m].
    pub catch_height: f32,

    /// Accepted launch direction range.
    pub direction_range: (f32, f32),

    /// Launch direction attenuation.
    pub direction_scale: f32,

    /// Factor applied to the panel power before the throw.
    pub power_scale: f32,

    /// Per-axis factor applied to the launch velocity.
    pub velocity_scale: Vector3<f32>,
}

impl Default for BallParams {
    fn default() -> Self {
        Self {
            gravity_scale: 2.,
            catch_radius: 0.5,
            catch_height: 1.5,
            direction_range: (-5., 5.),
            direction_scale: 10.,
            power_scale: 0.5,
            velocity_scale: Vector3::new(1., 1., 10.),
        }
    }
}

impl BallParams {
    /// Gravity acting on the ball [m/s^2].
    pub fn gravity(&self) -> f32 {
        crate::GRAVITY / self.gravity_scale
    }
}

/// What stopped the ball during a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Collision {
    None,
    Drone,
    Floor,
}

/// Projectile model with drone and floor collisions.
#[derive(Clone, Debug, Default)]
pub struct BallDynamics {
    pub params: BallParams,
}

impl BallDynamics {
    pub fn new(params: BallParams) -> Self {
        Self { params }
    }

    /// Check whether the ball rests on the drone or below the floor.
    pub fn collision(&self, ball: &BallState, drone: &DroneState) -> Collision {
        let offset = ball.position - drone.position;
        let horizontal = offset.xy().norm();

        if horizontal < self.params.catch_radius
            && offset.z > 0.
            && offset.z < self.params.catch_height
        {
            Collision::Drone
        } else if ball.position.z < 0. {
            Collision::Floor
        } else {
            Collision::None
        }
    }

    /// Apply gravity to the vertical velocity.
    pub fn update_velocity(&self, ball: &mut BallState, dt: f32) {
        ball.velocity.z -= dt * self.params.gravity();
    }

    /// Integrate the position, clamping the ball to the floor.
    pub fn update_position(&self, ball: &mut BallState, dt: f32) {
        ball.position.z += dt * ball.velocity.z;

        if ball.position.z < 0. {
            // Grounded: no bounce and no horizontal drift
            ball.position.z = 0.;
            ball.velocity = Vector3::zeros();
        } else {
            ball.position.x += dt * ball.velocity.x;
            ball.position.y += dt * ball.velocity.y;
        }
    }

    /// Advance `ball` by `dt` seconds. A colliding ball stops and does not move.
    pub fn step(&self, ball: &mut BallState, drone: &DroneState, dt: f32) -> Collision {
        let collision = self.collision(ball, drone);
        if collision != Collision::None {
            ball.velocity = Vector3::zeros();
            return collision;
        }

        self.update_velocity(ball, dt);
        self.update_position(ball, dt);
        Collision::None
    }

    /// Throw the ball towards the world origin.
    ///
    /// `direction` deflects the throw sideways; values outside of the accepted
    /// range are replaced with zero.
    pub fn launch(&self, ball: &mut BallState, power: f32, direction: f32) {
        let (min, max) = self.params.direction_range;
        let direction = if (min..=max).contains(&direction) {
            direction / self.params.direction_scale
        } else {
            0.
        };

        let horizontal = ball.position.xy();
        let distance = horizontal.norm();
        let toward_origin = if distance > 0. {
            -horizontal / distance
        } else {
            Vector2::zeros()
        };

        let angle = ball.position.y.atan2(ball.position.x);
        let deflection = Vector2::new(angle.sin() * direction, angle.cos() * -direction);
        let heading = toward_origin + deflection;

        let power = power * self.params.power_scale;
        let scale = self.params.velocity_scale;
        ball.velocity = Vector3::new(
            heading.x * power * scale.x,
            heading.y * power * scale.y,
            power * scale.z,
        );
    }
}
