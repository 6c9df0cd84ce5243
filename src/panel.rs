//! Control panel state and the headless scripted panel.
//!
//! Object positions are kept in panel map coordinates, the way an operator places them
//! on the map box. The supervisor reads them back in world coordinates.

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::info;

/// Map box horizontal extent (in panel pixels).
pub const MAP_X: (f32, f32) = (15., 385.);

/// Map box vertical extent (in panel pixels), top edge first.
pub const MAP_Y: (f32, f32) = (175., 585.);

/// Extent of the simulated world along both horizontal axes (in m).
pub const WORLD: (f32, f32) = (-100., 100.);

/// Height the drone is placed at (in m).
pub const DRONE_HEIGHT: f32 = 5.;

/// Launch power range.
pub const POWER: (f32, f32) = (0., 10.);

/// Launch direction range.
pub const DIRECTION: (f32, f32) = (-5., 5.);

/// Simulation state requested through the panel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimState {
    #[default]
    Stopped,
    Running,
    Paused,
}

/// Linearly map `value` from `[in_start, in_end]` to `[out_start, out_end]`.
///
/// Out of range input is replaced with the middle of the input range and a
/// degenerate input range uses `f32::MAX` as slope.
pub fn r_map(value: f32, in_start: f32, in_end: f32, out_start: f32, out_end: f32) -> f32 {
    let value = if value < in_start || value > in_end {
        in_start + (in_end - in_start) / 2.
    } else {
        value
    };

    let slope = if in_end - in_start == 0. {
        f32::MAX
    } else {
        (out_end - out_start) / (in_end - in_start)
    };

    out_start + slope * (value - in_start)
}

/// Convert panel map coordinates to world coordinates.
pub fn map_to_world(map: Vector2<f32>) -> Vector2<f32> {
    Vector2::new(
        r_map(map.x, MAP_X.0, MAP_X.1, WORLD.0, WORLD.1),
        r_map(map.y, MAP_Y.0, MAP_Y.1, WORLD.0, WORLD.1),
    )
}

/// Convert world coordinates to panel map coordinates.
pub fn world_to_map(world: Vector2<f32>) -> Vector2<f32> {
    Vector2::new(
        r_map(world.x, WORLD.0, WORLD.1, MAP_X.0, MAP_X.1),
        r_map(world.y, WORLD.0, WORLD.1, MAP_Y.0, MAP_Y.1),
    )
}

/// State shared between the panel and the supervisor.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PanelState {
    drone_positioned: bool,
    ball_positioned: bool,
    state: SimState,
    /// Map x/y, world z.
    drone_pos: Vector3<f32>,
    /// Map x/y, world z.
    ball_pos: Vector3<f32>,
    power: f32,
    direction: f32,
}

impl PanelState {
    /// A freshly reset panel.
    pub fn new() -> Self {
        let mut panel = Self::default();
        panel.reset();
        panel
    }

    /// Clear everything, then restore the drone height.
    pub fn reset(&mut self) {
        *self = Self {
            drone_pos: Vector3::new(0., 0., DRONE_HEIGHT),
            ..Self::default()
        };
    }

    pub fn state(&self) -> SimState {
        self.state
    }

    pub fn set_state(&mut self, state: SimState) {
        self.state = state;
    }

    /// Returns `true` if both the drone and the ball are positioned.
    pub fn objects_positioned(&self) -> bool {
        self.drone_positioned && self.ball_positioned
    }

    /// Returns `true` if either the drone or the ball is positioned.
    pub fn any_positioned(&self) -> bool {
        self.drone_positioned || self.ball_positioned
    }

    /// Place the drone at world `(x, y)` unless it is already positioned.
    pub fn position_drone(&mut self, x: f32, y: f32) {
        if !self.drone_positioned {
            let map = world_to_map(Vector2::new(x, y));
            self.drone_pos = Vector3::new(map.x, map.y, self.drone_pos.z);
            self.drone_positioned = true;
        }
    }

    /// Place the ball at world `(x, y, z)` unless it is already positioned.
    pub fn position_ball(&mut self, x: f32, y: f32, z: f32) {
        if !self.ball_positioned {
            let map = world_to_map(Vector2::new(x, y));
            self.ball_pos = Vector3::new(map.x, map.y, z);
            self.ball_positioned = true;
        }
    }

    /// Set the launch power and direction.
    /// A value outside of its range is replaced with zero.
    pub fn set_launch(&mut self, power: f32, direction: f32) {
        self.power = if (POWER.0..=POWER.1).contains(&power) {
            power
        } else {
            0.
        };
        self.direction = if (DIRECTION.0..=DIRECTION.1).contains(&direction) {
            direction
        } else {
            0.
        };
    }

    pub fn power(&self) -> f32 {
        self.power
    }

    pub fn direction(&self) -> f32 {
        self.direction
    }

    /// World coordinates of the drone and the ball.
    pub fn real_coords(&self) -> (Vector3<f32>, Vector3<f32>) {
        (to_world(&self.drone_pos), to_world(&self.ball_pos))
    }

    /// Follow the simulated objects on the map while the simulation is running.
    pub fn track(&mut self, drone: &Vector3<f32>, ball: &Vector3<f32>) {
        if self.state == SimState::Running {
            self.drone_pos = to_map(drone);
            self.ball_pos = to_map(ball);
        }
    }

    /// Apply an operator command.
    pub fn apply(&mut self, command: &PanelCommand) -> PanelStatus {
        match *command {
            PanelCommand::PositionDrone { x, y } => self.position_drone(x, y),
            PanelCommand::PositionBall { x, y, z } => self.position_ball(x, y, z),
            PanelCommand::Launch { power, direction } => self.set_launch(power, direction),
            PanelCommand::Run => {
                if self.objects_positioned() {
                    self.state = SimState::Running;
                }
            }
            PanelCommand::Pause => {
                if self.state == SimState::Running {
                    self.state = SimState::Paused;
                }
            }
            PanelCommand::Reset => self.reset(),
            PanelCommand::Quit => return PanelStatus::Closed,
        }
        PanelStatus::Open
    }
}

fn to_world(map: &Vector3<f32>) -> Vector3<f32> {
    let xy = map_to_world(map.xy());
    Vector3::new(xy.x, xy.y, map.z)
}

fn to_map(world: &Vector3<f32>) -> Vector3<f32> {
    let xy = world_to_map(world.xy());
    Vector3::new(xy.x, xy.y, world.z)
}

/// Operator command, with object positions in world coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum PanelCommand {
    PositionDrone {
        x: f32,
        y: f32,
    },
    PositionBall {
        x: f32,
        y: f32,
        #[serde(default)]
        z: f32,
    },
    Launch {
        power: f32,
        direction: f32,
    },
    Run,
    Pause,
    Reset,
    Quit,
}

/// A command to apply once `at_ms` milliseconds have passed since the panel opened.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptStep {
    pub at_ms: u64,
    #[serde(flatten)]
    pub command: PanelCommand,
}

impl ScriptStep {
    pub fn new(at_ms: u64, command: PanelCommand) -> Self {
        Self { at_ms, command }
    }
}

/// Whether the panel is still open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelStatus {
    Open,
    Closed,
}

/// An operator surface updating the panel once per panel period.
pub trait ControlPanel: Send {
    /// Update the private panel copy at instant `now`.
    fn update(&mut self, panel: &mut PanelState, now: Instant) -> PanelStatus;
}

/// Headless panel replaying a timed list of commands.
#[derive(Clone, Debug, Default)]
pub struct ScriptedPanel {
    steps: VecDeque<ScriptStep>,
    opened: Option<Instant>,
    closed: bool,
}

impl ScriptedPanel {
    pub fn new(mut steps: Vec<ScriptStep>) -> Self {
        steps.sort_by_key(|step| step.at_ms);
        Self {
            steps: steps.into(),
            opened: None,
            closed: false,
        }
    }
}

impl ControlPanel for ScriptedPanel {
    fn update(&mut self, panel: &mut PanelState, now: Instant) -> PanelStatus {
        if self.closed {
            return PanelStatus::Closed;
        }

        let opened = *self.opened.get_or_insert(now);
        let elapsed = now.saturating_duration_since(opened);

        while let Some(step) = self.steps.front().copied() {
            if Duration::from_millis(step.at_ms) > elapsed {
                break;
            }
            self.steps.pop_front();

            info!(at_ms = step.at_ms, command = ?step.command, "panel command");
            if panel.apply(&step.command) == PanelStatus::Closed {
                self.closed = true;
                return PanelStatus::Closed;
            }
        }

        PanelStatus::Open
    }
}
