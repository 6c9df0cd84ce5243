//! Fixed-priority periodic task executive.
//!
//! Every task runs on its own OS thread. A worker anchors its activation instants when it
//! starts, runs its routine once per period and checks the absolute deadline after each run.
//! Cancellation is cooperative: a killed worker exits at its next period boundary.

use crate::{Error, Result};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use embedded_time::duration::Milliseconds;
use std::time::Instant;
use tracing::{debug, info, warn};

mod task;
pub use task::{std_duration, PeriodicTask, Priority, TaskFn, TaskSpec};

/// An event containing the current time, the period and the shared state for a task.
pub struct Event<'a, T> {
    /// The state of the system running the executor.
    pub state: &'a Arc<T>,

    /// The instant this activation started.
    pub now: Instant,

    /// The period of the task.
    pub period: Milliseconds<u32>,

    /// Number of activations of this worker before this one.
    pub cycle: u64,
}

/// Handle of a running worker thread.
#[derive(Debug)]
pub struct Worker {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

impl Worker {
    /// Request cancellation. The worker exits at its next period boundary.
    pub fn kill(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Returns `true` if the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker thread to exit.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}

/// A slot in the task table.
#[derive(Debug)]
struct Slot<T> {
    spec: TaskSpec<T>,
    misses: Arc<AtomicU32>,
    worker: Option<Worker>,
}

/// Executive owning one slot per configured task.
///
/// Tasks are addressed by their index in the table passed to [`Executor::new`].
#[derive(Debug)]
pub struct Executor<T> {
    slots: Vec<Slot<T>>,
    realtime: bool,
    closed: bool,
}

impl<T> Executor<T>
where
    T: Send + Sync + 'static,
{
    /// Create a new executor from a table of tasks.
    ///
    /// With `realtime` set, workers run under the FIFO fixed-priority policy
    /// and failing to apply it is an error.
    pub fn new(specs: Vec<TaskSpec<T>>, realtime: bool) -> Self {
        let slots = specs
            .into_iter()
            .map(|spec| Slot {
                spec,
                misses: Arc::default(),
                worker: None,
            })
            .collect();

        Self {
            slots,
            realtime,
            closed: false,
        }
    }

    /// Start the worker of task `id` if it is not already running.
    pub fn create(&mut self, id: usize, state: &Arc<T>) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let Some(slot) = self.slots.get_mut(id) else {
            return Ok(());
        };

        if slot
            .worker
            .as_ref()
            .map_or(false, |worker| !worker.is_finished())
        {
            return Ok(());
        }

        // The previous worker exited on its own
        if let Some(worker) = slot.worker.take() {
            reap(slot.spec.name, worker);
        }

        let worker = spawn(&slot.spec, slot.misses.clone(), state.clone(), self.realtime)?;
        info!(task = slot.spec.name, priority = %slot.spec.priority, "task started");
        slot.worker = Some(worker);

        Ok(())
    }

    /// Request cancellation of task `id` without waiting for it.
    pub fn kill(&self, id: usize) {
        if let Some(worker) = self.slots.get(id).and_then(|slot| slot.worker.as_ref()) {
            worker.kill();
        }
    }

    /// Wait for the worker of task `id` to exit.
    pub fn join(&mut self, id: usize) {
        if let Some(slot) = self.slots.get_mut(id) {
            if let Some(worker) = slot.worker.take() {
                reap(slot.spec.name, worker);
                info!(task = slot.spec.name, "task stopped");
            }
        }
    }

    /// Cancel every task in `ids`, then wait for all of them.
    pub fn stop(&mut self, ids: &[usize]) {
        for &id in ids {
            self.kill(id);
        }
        for &id in ids {
            self.join(id);
        }
    }

    /// Returns `true` if task `id` has a live worker.
    pub fn is_running(&self, id: usize) -> bool {
        self.slots
            .get(id)
            .and_then(|slot| slot.worker.as_ref())
            .map_or(false, |worker| !worker.is_finished())
    }

    /// Total deadline misses of task `id`.
    pub fn misses(&self, id: usize) -> u32 {
        self.slots
            .get(id)
            .map_or(0, |slot| slot.misses.load(Ordering::Relaxed))
    }

    /// Log the deadline-miss count of every task.
    pub fn deadline_report(&self) {
        for slot in &self.slots {
            info!(
                task = slot.spec.name,
                misses = slot.misses.load(Ordering::Relaxed),
                "deadline misses"
            );
        }
    }

    /// Cancel every task and hand their workers over so they can be joined
    /// without holding the executor.
    ///
    /// The executor refuses to start new workers afterwards.
    pub fn close(&mut self) -> Vec<(&'static str, Worker)> {
        self.closed = true;
        self.slots
            .iter_mut()
            .filter_map(|slot| {
                let worker = slot.worker.take()?;
                worker.kill();
                Some((slot.spec.name, worker))
            })
            .collect()
    }
}

/// Join a worker, logging if its routine panicked.
pub fn reap(name: &'static str, worker: Worker) {
    if worker.join().is_err() {
        warn!(task = name, "worker terminated by a panic");
    }
}

fn spawn<T>(
    spec: &TaskSpec<T>,
    misses: Arc<AtomicU32>,
    state: Arc<T>,
    realtime: bool,
) -> Result<Worker>
where
    T: Send + Sync + 'static,
{
    let name = spec.name;
    let priority = spec.priority;
    let f = spec.f;
    let task = PeriodicTask::new(spec.period(), spec.deadline(), misses);

    let stop = Arc::new(AtomicBool::new(false));
    let worker_stop = stop.clone();

    // The worker reports whether its scheduling policy could be applied
    let (ready_tx, ready_rx) = mpsc::sync_channel(1);

    let handle = thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || {
            if realtime {
                if let Err(error) = set_fifo_priority(priority) {
                    let _ = ready_tx.send(Err(error));
                    return;
                }
            }
            let _ = ready_tx.send(Ok(()));
            run(name, f, &state, task, &worker_stop);
        })
        .map_err(|source| Error::spawn(name, source))?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(Worker { handle, stop }),
        Ok(Err(source)) => {
            let _ = handle.join();
            Err(Error::scheduling(name, priority, source))
        }
        Err(_) => {
            let _ = handle.join();
            Err(Error::spawn(
                name,
                io::Error::new(io::ErrorKind::Other, "worker exited during start-up"),
            ))
        }
    }
}

fn run<T>(name: &'static str, f: TaskFn<T>, state: &Arc<T>, mut task: PeriodicTask, stop: &AtomicBool) {
    task.set_period();

    let mut cycle = 0;
    while !stop.load(Ordering::Acquire) {
        f(Event {
            state,
            now: Instant::now(),
            period: task.period(),
            cycle,
        });

        if task.deadline_miss() {
            warn!(task = name, misses = task.misses(), "deadline miss");
        }

        cycle += 1;
        task.wait_for_period();
    }

    debug!(task = name, cycles = cycle, "worker exiting");
}

#[cfg(target_os = "linux")]
fn set_fifo_priority(priority: Priority) -> io::Result<()> {
    let param = libc::sched_param {
        sched_priority: i32::from(priority.get()),
    };

    // SAFETY: `param` is a valid scheduling parameter for the calling thread
    let code = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    if code == 0 {
        Ok(())
    } else {
        Err(io::Error::from_raw_os_error(code))
    }
}

#[cfg(not(target_os = "linux"))]
fn set_fifo_priority(_priority: Priority) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "fixed-priority scheduling is only available on linux",
    ))
}
