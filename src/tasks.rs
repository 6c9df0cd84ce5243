//! The task table and the routines run by each worker.

use crate::ball::BallDynamics;
use crate::config::SimConfig;
use crate::copter::control::DriverController;
use crate::copter::QuadDynamics;
use crate::panel::{ControlPanel, PanelState, PanelStatus};
use crate::scheduler::{reap, Event, Executor, TaskFn, TaskSpec};
use crate::state::{RobustLock, SharedState};
use crate::supervisor::{Supervisor, TaskControl};
use crate::telemetry::{Telemetry, TelemetrySink};
use crate::{Error, Result};
use std::sync::{mpsc, Arc};
use tracing::{debug, error, info};

/// Logical tasks, in task table order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskId {
    Driver,
    Drone,
    Ball,
    Telemetry,
    Panel,
    Supervisor,
}

impl TaskId {
    pub const ALL: [TaskId; 6] = [
        TaskId::Driver,
        TaskId::Drone,
        TaskId::Ball,
        TaskId::Telemetry,
        TaskId::Panel,
        TaskId::Supervisor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TaskId::Driver => "driver",
            TaskId::Drone => "drone",
            TaskId::Ball => "ball",
            TaskId::Telemetry => "telemetry",
            TaskId::Panel => "panel",
            TaskId::Supervisor => "supervisor",
        }
    }

    /// Slot of this task in the executor.
    pub fn index(self) -> usize {
        self as usize
    }

    fn routine(self) -> TaskFn<World> {
        match self {
            TaskId::Driver => driver_task,
            TaskId::Drone => drone_task,
            TaskId::Ball => ball_task,
            TaskId::Telemetry => telemetry_task,
            TaskId::Panel => panel_task,
            TaskId::Supervisor => supervisor_task,
        }
    }
}

/// Why the process should exit.
#[derive(Debug)]
pub enum Shutdown {
    /// The operator closed the panel.
    PanelClosed,

    /// A worker hit an unrecoverable error.
    Fatal(Error),
}

/// Everything the workers share.
pub struct World {
    pub store: SharedState,
    pub quad: QuadDynamics,
    pub ball: BallDynamics,
    pub driver: DriverController,
    game_speed: f32,
    deadline_report_periods: u64,
    telemetry: Box<dyn TelemetrySink>,
    panel: RobustLock<Box<dyn ControlPanel>>,
    supervisor: RobustLock<Supervisor>,
    executor: RobustLock<Executor<World>>,
    shutdown: mpsc::Sender<Shutdown>,
}

/// Builds the executor entry of every task from the configuration.
pub fn task_table(config: &SimConfig) -> Vec<TaskSpec<World>> {
    TaskId::ALL
        .iter()
        .map(|&id| config.tasks.get(id).spec(id.name(), id.routine()))
        .collect()
}

impl World {
    /// Create the shared world and the channel on which it requests shutdown.
    pub fn new(
        config: &SimConfig,
        telemetry: Box<dyn TelemetrySink>,
        panel: Box<dyn ControlPanel>,
    ) -> (Arc<Self>, mpsc::Receiver<Shutdown>) {
        let (shutdown, requests) = mpsc::channel();
        let quad = QuadDynamics::default();
        let ball = BallDynamics::new(config.ball);

        let world = Self {
            store: SharedState::new(PanelState::new()),
            driver: DriverController::new(&quad.params, &ball.params),
            supervisor: RobustLock::new(Supervisor::new(ball.clone())),
            quad,
            ball,
            game_speed: config.game_speed,
            deadline_report_periods: config.deadline_report_periods,
            telemetry,
            panel: RobustLock::new(panel),
            executor: RobustLock::new(Executor::new(task_table(config), config.realtime)),
            shutdown,
        };

        (Arc::new(world), requests)
    }

    /// Start the supervisor and panel workers.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut executor = self.executor.lock();
        executor.create(TaskId::Supervisor.index(), self)?;
        executor.create(TaskId::Panel.index(), self)?;
        Ok(())
    }

    /// Run one supervisor period.
    pub fn supervise(self: &Arc<Self>) -> Result<()> {
        let panel = self.store.panel.snapshot();
        let mut supervisor = self.supervisor.lock();
        let mut executor = self.executor.lock();

        supervisor.update(
            &panel,
            &self.store,
            &mut Workers {
                executor: &mut *executor,
                world: self,
            },
        )
    }

    /// Returns `true` if the worker of `task` is alive.
    pub fn is_running(&self, task: TaskId) -> bool {
        self.executor.lock().is_running(task.index())
    }

    /// Total deadline misses of `task`.
    pub fn misses(&self, task: TaskId) -> u32 {
        self.executor.lock().misses(task.index())
    }

    /// Log the deadline-miss count of every task.
    pub fn deadline_report(&self) {
        self.executor.lock().deadline_report();
    }

    /// Stop every worker and wait for them to exit.
    pub fn shutdown(&self) {
        // Workers may need the executor while winding down, join them without it
        let workers = self.executor.lock().close();
        for (name, worker) in workers {
            reap(name, worker);
        }

        info!("all tasks stopped");
        self.deadline_report();
    }

    fn request_shutdown(&self, reason: Shutdown) {
        // The receiver is gone once shutdown is underway
        let _ = self.shutdown.send(reason);
    }

    fn dt(&self, event: &Event<'_, World>) -> f32 {
        event.period.0 as f32 * 1.0e-3 * self.game_speed
    }
}

/// [`TaskControl`] over the executor of a world.
struct Workers<'a> {
    executor: &'a mut Executor<World>,
    world: &'a Arc<World>,
}

impl TaskControl for Workers<'_> {
    fn start(&mut self, task: TaskId) -> Result<()> {
        self.executor.create(task.index(), self.world)
    }

    fn stop(&mut self, tasks: &[TaskId]) {
        let ids: Vec<usize> = tasks.iter().map(|task| task.index()).collect();
        self.executor.stop(&ids);
    }
}

fn driver_task(event: Event<'_, World>) {
    let world = event.state;
    let drone = world.store.drone.snapshot();
    let ball = world.store.ball.snapshot();

    let control = world.driver.control(&drone, &ball);
    world.store.control.store(&control);
}

fn drone_task(event: Event<'_, World>) {
    let world = event.state;
    let control = world.store.control.snapshot();
    let mut drone = world.store.drone.snapshot();

    world.quad.step(&mut drone, &control, world.dt(&event));
    world.store.drone.store(&drone);
}

fn ball_task(event: Event<'_, World>) {
    let world = event.state;
    let drone = world.store.drone.snapshot();
    let mut ball = world.store.ball.snapshot();

    world.ball.step(&mut ball, &drone, world.dt(&event));
    world.store.ball.store(&ball);
}

fn telemetry_task(event: Event<'_, World>) {
    let world = event.state;
    let drone = world.store.drone.snapshot();
    let ball = world.store.ball.snapshot();

    if let Err(error) = world.telemetry.publish(&Telemetry::now(&drone, &ball)) {
        debug!(%error, "telemetry frame dropped");
    }
}

fn panel_task(event: Event<'_, World>) {
    let world = event.state;
    let drone = world.store.drone.snapshot();
    let ball = world.store.ball.snapshot();
    let mut panel = world.store.panel.snapshot();

    let status = world.panel.lock().update(&mut panel, event.now);
    panel.track(&drone.position, &ball.position);
    world.store.panel.store(&panel);

    if status == PanelStatus::Closed {
        world.request_shutdown(Shutdown::PanelClosed);
    }
}

fn supervisor_task(event: Event<'_, World>) {
    let world = event.state;
    if let Err(error) = world.supervise() {
        error!(%error, "supervisor failed");
        world.request_shutdown(Shutdown::Fatal(error));
    }

    let every = world.deadline_report_periods;
    if every > 0 && event.cycle > 0 && event.cycle % every == 0 {
        world.deadline_report();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_table_follows_task_ids() {
        let table = task_table(&SimConfig::default());
        assert_eq!(table.len(), TaskId::ALL.len());

        for id in TaskId::ALL {
            assert_eq!(table[id.index()].name, id.name());
        }
        assert_eq!(table[TaskId::Driver.index()].period.0, 20);
        assert_eq!(table[TaskId::Supervisor.index()].priority.get(), 20);
    }
}
