//! Simulation configuration.

use crate::ball::BallParams;
use crate::panel::{PanelCommand, ScriptStep};
use crate::scheduler::{Priority, TaskFn, TaskSpec};
use crate::tasks::TaskId;
use crate::telemetry::Encoding;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Timing of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Period between activations (in milliseconds).
    pub period_ms: u32,

    /// Relative deadline (in milliseconds), defaults to the period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u32>,

    /// Fixed priority, out of range values are mapped to the lowest priority.
    pub priority: u8,
}

impl TaskConfig {
    /// Creates a task config with a deadline equal to the period.
    #[must_use]
    pub const fn new(period_ms: u32, priority: u8) -> Self {
        Self {
            period_ms,
            deadline_ms: None,
            priority,
        }
    }

    /// Sets the relative deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline_ms: u32) -> Self {
        self.deadline_ms = Some(deadline_ms);
        self
    }

    /// Builds the executor entry for this task.
    pub fn spec<T>(&self, name: &'static str, f: TaskFn<T>) -> TaskSpec<T> {
        let spec = TaskSpec::new(name, f)
            .with_period(self.period_ms)
            .with_priority(Priority::new(self.priority));

        match self.deadline_ms {
            Some(deadline) => spec.with_deadline(deadline),
            None => spec,
        }
    }
}

/// Timing of every task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskTable {
    pub driver: TaskConfig,
    pub drone: TaskConfig,
    pub ball: TaskConfig,
    pub telemetry: TaskConfig,
    pub panel: TaskConfig,
    pub supervisor: TaskConfig,
}

impl Default for TaskTable {
    fn default() -> Self {
        Self {
            driver: TaskConfig::new(20, 80),
            drone: TaskConfig::new(30, 70),
            ball: TaskConfig::new(30, 70),
            telemetry: TaskConfig::new(30, 40),
            panel: TaskConfig::new(30, 30),
            supervisor: TaskConfig::new(50, 20),
        }
    }
}

impl TaskTable {
    pub fn get(&self, id: TaskId) -> &TaskConfig {
        match id {
            TaskId::Driver => &self.driver,
            TaskId::Drone => &self.drone,
            TaskId::Ball => &self.ball,
            TaskId::Telemetry => &self.telemetry,
            TaskId::Panel => &self.panel,
            TaskId::Supervisor => &self.supervisor,
        }
    }
}

/// Telemetry transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Address of the visualisation server.
    pub address: String,

    /// Wire encoding of each frame.
    pub encoding: Encoding,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8585".to_owned(),
            encoding: Encoding::Json,
        }
    }
}

/// Configuration of a simulation run.
///
/// # Example
///
/// ```
/// use catching_drone::SimConfig;
///
/// let config = SimConfig::default();
/// assert_eq!(config.tasks.driver.period_ms, 20);
/// assert!(!config.realtime);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Timing of every task.
    pub tasks: TaskTable,

    /// Run workers under the fixed-priority FIFO policy.
    pub realtime: bool,

    /// Multiplier applied to the physics time step.
    pub game_speed: f32,

    /// Ball launch and collision model.
    pub ball: BallParams,

    /// Telemetry transport.
    pub telemetry: TelemetryConfig,

    /// Supervisor periods between two deadline reports (0 = disabled).
    pub deadline_report_periods: u64,

    /// Commands replayed by the scripted panel.
    pub script: Vec<ScriptStep>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tasks: TaskTable::default(),
            realtime: false,
            game_speed: 1.,
            ball: BallParams::default(),
            telemetry: TelemetryConfig::default(),
            deadline_report_periods: 100,
            script: default_script(),
        }
    }
}

impl SimConfig {
    /// Loads a configuration from a JSON file.
    /// Missing fields keep their default value.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_owned(),
            source,
        })?;

        let config: Self = serde_json::from_str(&json).map_err(|source| Error::Config {
            path: path.to_owned(),
            source,
        })?;

        if !config.is_valid() {
            return Err(Error::InvalidConfig {
                path: path.to_owned(),
            });
        }
        Ok(config)
    }

    /// Sets the script replayed by the panel.
    #[must_use]
    pub fn with_script(mut self, script: Vec<ScriptStep>) -> Self {
        self.script = script;
        self
    }

    /// Validates the configuration.
    ///
    /// Returns `true` if every period is non-zero and the game speed is positive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        TaskId::ALL
            .iter()
            .all(|&id| self.tasks.get(id).period_ms > 0)
            && self.game_speed > 0.
    }
}

/// Place the drone at the origin and throw the ball from 10 m away, run after
/// half a second and quit after fifteen.
///
/// With the default ball model the drone catches the ball about eight seconds
/// into the run.
pub fn default_script() -> Vec<ScriptStep> {
    vec![
        ScriptStep::new(0, PanelCommand::PositionDrone { x: 0., y: 0. }),
        ScriptStep::new(0, PanelCommand::PositionBall { x: 10., y: 0., z: 0. }),
        ScriptStep::new(
            0,
            PanelCommand::Launch {
                power: 4.,
                direction: 0.,
            },
        ),
        ScriptStep::new(500, PanelCommand::Run),
        ScriptStep::new(15_000, PanelCommand::Quit),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = SimConfig::default();
        assert!(config.is_valid());
        assert_eq!(config.telemetry.address, "127.0.0.1:8585");
        assert_eq!(config.tasks.supervisor, TaskConfig::new(50, 20));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: SimConfig = serde_json::from_str(
            r#"{
                "game_speed": 2.0,
                "telemetry": { "encoding": "binary" },
                "ball": { "power_scale": 1.0, "velocity_scale": [0.2, 0.2, 1.0] },
                "tasks": { "driver": { "period_ms": 10, "deadline_ms": 8, "priority": 90 } }
            }"#,
        )
        .unwrap();

        assert_eq!(config.game_speed, 2.);
        assert_eq!(config.telemetry.encoding, Encoding::Binary);
        assert_eq!(config.telemetry.address, "127.0.0.1:8585");
        assert_eq!(config.tasks.driver, TaskConfig::new(10, 90).with_deadline(8));
        assert_eq!(config.tasks.drone, TaskConfig::new(30, 70));
        assert_eq!(config.ball.velocity_scale, nalgebra::Vector3::new(0.2, 0.2, 1.));
        assert_eq!(config.ball.power_scale, 1.);
        assert_eq!(config.ball.catch_radius, BallParams::default().catch_radius);
        assert_eq!(config.script, default_script());
    }

    #[test]
    fn zero_period_is_invalid() {
        let mut config = SimConfig::default();
        config.tasks.ball.period_ms = 0;
        assert!(!config.is_valid());
    }

    #[test]
    fn task_spec_maps_priority_and_deadline() {
        let spec = TaskConfig::new(30, 120).spec::<()>("ball", |_| {});
        assert_eq!(spec.priority, Priority::LOW);
        assert_eq!(spec.deadline(), spec.period());

        let spec = TaskConfig::new(30, 70).with_deadline(10).spec::<()>("ball", |_| {});
        assert_eq!(spec.priority, Priority::new(70));
        assert_eq!(spec.deadline.map(|deadline| deadline.0), Some(10));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = SimConfig::load(Path::new("/nonexistent/catching-drone.json")).unwrap_err();
        assert!(matches!(err, Error::ConfigRead { .. }));
    }
}
