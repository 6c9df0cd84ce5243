//! Simulation lifecycle state machine.
//!
//! Every supervisor period the state requested on the panel is compared with the
//! current one and the matching workers are started or stopped:
//!
//! | current | requested | action                                              |
//! |---------|-----------|-----------------------------------------------------|
//! | Stopped | Stopped   | place drone and ball from the panel, start telemetry once |
//! | Stopped | Running   | start drone, ball and driver                         |
//! | Paused  | Running   | start telemetry, drone, ball and driver              |
//! | Running | Paused    | stop telemetry, drone, ball and driver               |
//! | other   | Stopped   | stop the four workers and zero every entity          |
//!
//! A run request is ignored until both objects are positioned.

use crate::ball::BallDynamics;
use crate::panel::{PanelState, SimState};
use crate::state::SharedState;
use crate::tasks::TaskId;
use crate::Result;
use tracing::info;

/// Workers the supervisor starts and stops.
const SIMULATION: [TaskId; 4] = [TaskId::Telemetry, TaskId::Drone, TaskId::Ball, TaskId::Driver];

/// Starts and stops task workers on behalf of the supervisor.
pub trait TaskControl {
    /// Start `task` unless it is already running.
    fn start(&mut self, task: TaskId) -> Result<()>;

    /// Stop every task in `tasks` and wait for them to exit.
    fn stop(&mut self, tasks: &[TaskId]);
}

#[derive(Clone, Debug)]
pub struct Supervisor {
    state: SimState,
    first_run: bool,
    ball: BallDynamics,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(BallDynamics::default())
    }
}

impl Supervisor {
    /// Create a stopped supervisor launching balls with `ball`.
    pub fn new(ball: BallDynamics) -> Self {
        Self {
            state: SimState::Stopped,
            first_run: true,
            ball,
        }
    }

    pub fn state(&self) -> SimState {
        self.state
    }

    /// Returns `true` until the telemetry worker was started after the last reset.
    pub fn is_first_run(&self) -> bool {
        self.first_run
    }

    /// React to the state requested on `panel`.
    pub fn update<C>(&mut self, panel: &PanelState, store: &SharedState, tasks: &mut C) -> Result<()>
    where
        C: TaskControl,
    {
        let mut requested = panel.state();
        if requested == SimState::Running
            && self.state != SimState::Running
            && !panel.objects_positioned()
        {
            requested = self.state;
        }

        match requested {
            SimState::Stopped => self.react_to_stop(panel, store, tasks)?,
            SimState::Running => self.react_to_run(tasks)?,
            SimState::Paused => self.react_to_pause(tasks),
        }

        if requested != self.state {
            info!(from = ?self.state, to = ?requested, "simulation state changed");
            self.state = requested;
        }
        Ok(())
    }

    fn react_to_stop<C>(&mut self, panel: &PanelState, store: &SharedState, tasks: &mut C) -> Result<()>
    where
        C: TaskControl,
    {
        if self.state == SimState::Stopped {
            self.place_objects(panel, store);
            if self.first_run {
                tasks.start(TaskId::Telemetry)?;
                self.first_run = false;
            }
        } else {
            tasks.stop(&SIMULATION);
            store.reset_simulation();
            self.first_run = true;
        }
        Ok(())
    }

    fn react_to_run<C>(&mut self, tasks: &mut C) -> Result<()>
    where
        C: TaskControl,
    {
        let start: &[TaskId] = match self.state {
            SimState::Stopped => &SIMULATION[1..],
            SimState::Paused => &SIMULATION,
            SimState::Running => &[],
        };

        for &task in start {
            tasks.start(task)?;
        }
        Ok(())
    }

    fn react_to_pause<C>(&mut self, tasks: &mut C)
    where
        C: TaskControl,
    {
        if self.state == SimState::Running {
            tasks.stop(&SIMULATION);
        }
    }

    /// Copy the panel placement into the drone and ball, and arm the ball launch.
    fn place_objects(&self, panel: &PanelState, store: &SharedState) {
        let (drone_pos, ball_pos) = panel.real_coords();

        let mut drone = store.drone.snapshot();
        drone.position = drone_pos;
        store.drone.store(&drone);

        let mut ball = store.ball.snapshot();
        ball.position = ball_pos;
        self.ball.launch(&mut ball, panel.power(), panel.direction());
        store.ball.store(&ball);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::PanelCommand;
    use crate::state::{BallState, DroneState};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use std::collections::BTreeSet;

    #[derive(Default)]
    struct Recorder {
        running: BTreeSet<TaskId>,
        starts: Vec<TaskId>,
        stops: Vec<TaskId>,
    }

    impl TaskControl for Recorder {
        fn start(&mut self, task: TaskId) -> Result<()> {
            if self.running.insert(task) {
                self.starts.push(task);
            }
            Ok(())
        }

        fn stop(&mut self, tasks: &[TaskId]) {
            for task in tasks {
                if self.running.remove(task) {
                    self.stops.push(*task);
                }
            }
        }
    }

    fn positioned_panel() -> PanelState {
        let mut panel = PanelState::new();
        panel.apply(&PanelCommand::PositionDrone { x: 0., y: 0. });
        panel.apply(&PanelCommand::PositionBall { x: 10., y: 0., z: 5. });
        panel.apply(&PanelCommand::Launch {
            power: 10.,
            direction: 0.,
        });
        panel
    }

    #[test]
    fn stopped_places_objects_and_starts_telemetry_once() {
        let mut supervisor = Supervisor::default();
        let store = SharedState::default();
        let mut tasks = Recorder::default();
        let panel = positioned_panel();

        supervisor.update(&panel, &store, &mut tasks).unwrap();
        supervisor.update(&panel, &store, &mut tasks).unwrap();

        assert_eq!(tasks.starts, [TaskId::Telemetry]);
        assert!(!supervisor.is_first_run());

        let drone = store.drone.snapshot();
        assert_relative_eq!(drone.position, Vector3::new(0., 0., 5.), epsilon = 1e-3);

        let ball = store.ball.snapshot();
        assert_relative_eq!(ball.position, Vector3::new(10., 0., 5.), epsilon = 1e-3);
        assert_relative_eq!(ball.velocity, Vector3::new(-5., 0., 50.), epsilon = 1e-3);
    }

    #[test]
    fn run_without_objects_is_ignored() {
        let mut supervisor = Supervisor::default();
        let store = SharedState::default();
        let mut tasks = Recorder::default();

        let mut panel = PanelState::new();
        panel.set_state(SimState::Running);
        supervisor.update(&panel, &store, &mut tasks).unwrap();

        assert_eq!(supervisor.state(), SimState::Stopped);
        assert_eq!(tasks.starts, [TaskId::Telemetry]);
    }

    #[test]
    fn run_pause_resume() {
        let mut supervisor = Supervisor::default();
        let store = SharedState::default();
        let mut tasks = Recorder::default();
        let mut panel = positioned_panel();

        supervisor.update(&panel, &store, &mut tasks).unwrap();

        panel.apply(&PanelCommand::Run);
        supervisor.update(&panel, &store, &mut tasks).unwrap();
        assert_eq!(supervisor.state(), SimState::Running);
        assert_eq!(
            tasks.starts,
            [TaskId::Telemetry, TaskId::Drone, TaskId::Ball, TaskId::Driver]
        );

        panel.apply(&PanelCommand::Pause);
        supervisor.update(&panel, &store, &mut tasks).unwrap();
        assert_eq!(supervisor.state(), SimState::Paused);
        assert!(tasks.running.is_empty());

        panel.apply(&PanelCommand::Run);
        supervisor.update(&panel, &store, &mut tasks).unwrap();
        assert_eq!(supervisor.state(), SimState::Running);
        assert_eq!(tasks.running.len(), 4);
    }

    #[test]
    fn reset_stops_everything_and_zeroes_entities() {
        let mut supervisor = Supervisor::default();
        let store = SharedState::default();
        let mut tasks = Recorder::default();
        let mut panel = positioned_panel();

        supervisor.update(&panel, &store, &mut tasks).unwrap();
        panel.apply(&PanelCommand::Run);
        supervisor.update(&panel, &store, &mut tasks).unwrap();

        panel.apply(&PanelCommand::Reset);
        supervisor.update(&panel, &store, &mut tasks).unwrap();

        assert_eq!(supervisor.state(), SimState::Stopped);
        assert!(supervisor.is_first_run());
        assert!(tasks.running.is_empty());
        assert_eq!(store.drone.snapshot(), DroneState::default());
        assert_eq!(store.ball.snapshot(), BallState::default());

        // The next stopped period starts telemetry again
        supervisor.update(&panel, &store, &mut tasks).unwrap();
        assert!(tasks.running.contains(&TaskId::Telemetry));
    }
}
