use super::Event;
use core::fmt;
use embedded_time::duration::Milliseconds;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Fixed scheduling priority of a task, where a larger value is more urgent.
///
/// Values outside of `LOW..=HIGH` are mapped to [`Priority::LOW`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    /// Least urgent priority.
    pub const LOW: Self = Self(1);

    /// Most urgent priority.
    pub const HIGH: Self = Self(99);

    /// Create a new priority, falling back to [`Priority::LOW`] when out of range.
    pub fn new(priority: u8) -> Self {
        if (Self::LOW.0..=Self::HIGH.0).contains(&priority) {
            Self(priority)
        } else {
            Self::LOW
        }
    }

    /// Returns the raw priority value.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::LOW
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Routine run once per activation of a task.
pub type TaskFn<T> = fn(Event<'_, T>);

/// A task to run at a fixed period.
pub struct TaskSpec<T> {
    /// Name of the task (also used as the worker thread name).
    pub name: &'static str,

    /// The function to run.
    pub f: TaskFn<T>,

    /// The period between activations (in milliseconds).
    pub period: Milliseconds<u32>,

    /// Relative deadline (in milliseconds), defaults to the period.
    pub deadline: Option<Milliseconds<u32>>,

    /// The fixed priority of the worker.
    pub priority: Priority,
}

impl<T> TaskSpec<T> {
    /// Create a new task from its name and the function to run.
    pub fn new(name: &'static str, f: TaskFn<T>) -> Self {
        Self {
            name,
            f,
            period: Milliseconds(0),
            deadline: None,
            priority: Priority::LOW,
        }
    }

    /// Builder method to set `period` and return `self`
    pub fn with_period(mut self, millis: u32) -> Self {
        self.period = Milliseconds(millis);
        self
    }

    /// Builder method to set `deadline` and return `self`
    pub fn with_deadline(mut self, millis: u32) -> Self {
        self.deadline = Some(Milliseconds(millis));
        self
    }

    /// Builder method to set `priority` and return `self`
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn period(&self) -> Milliseconds<u32> {
        self.period
    }

    /// The relative deadline, which is the period unless set.
    pub fn deadline(&self) -> Milliseconds<u32> {
        self.deadline.unwrap_or(self.period)
    }
}

/// Convert a task duration to a [`Duration`] for the OS clock and sleeps.
pub fn std_duration(millis: Milliseconds<u32>) -> Duration {
    Duration::from_millis(u64::from(millis.0))
}

impl<T> Clone for TaskSpec<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            f: self.f,
            period: self.period,
            deadline: self.deadline,
            priority: self.priority,
        }
    }
}

impl<T> fmt::Debug for TaskSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("name", &self.name)
            .field("period", &self.period)
            .field("deadline", &self.deadline)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Timing bookkeeping of a running periodic task.
///
/// Activations are absolute instants anchored at [`set_period`](Self::set_period),
/// so lateness in one cycle never shifts the following ones.
#[derive(Debug)]
pub struct PeriodicTask {
    period: Milliseconds<u32>,
    deadline: Milliseconds<u32>,
    activation: Instant,
    abs_deadline: Instant,
    misses: Arc<AtomicU32>,
}

impl PeriodicTask {
    /// Create the bookkeeping for a task anchored at the current instant.
    ///
    /// `misses` is shared with the executor so the count outlives the worker.
    pub fn new(period: Milliseconds<u32>, deadline: Milliseconds<u32>, misses: Arc<AtomicU32>) -> Self {
        let now = Instant::now();
        Self {
            period,
            deadline,
            activation: now + std_duration(period),
            abs_deadline: now + std_duration(deadline),
            misses,
        }
    }

    /// Anchor the task at the current instant.
    pub fn set_period(&mut self) {
        self.set_period_at(Instant::now());
    }

    /// Anchor the task at `now`.
    /// The next activation is `now + period`, the first deadline is `now + deadline`.
    pub fn set_period_at(&mut self, now: Instant) {
        self.activation = now + std_duration(self.period);
        self.abs_deadline = now + std_duration(self.deadline);
    }

    /// Sleep until the next activation instant, then advance by one period.
    pub fn wait_for_period(&mut self) {
        let now = Instant::now();
        if self.activation > now {
            thread::sleep(self.activation - now);
        }
        self.advance();
    }

    /// Advance the activation and deadline by one period without sleeping.
    pub fn advance(&mut self) {
        let period = std_duration(self.period);
        self.activation += period;
        self.abs_deadline += period;
    }

    /// Returns `true` and counts a miss if the current instant is past the absolute deadline.
    pub fn deadline_miss(&self) -> bool {
        self.deadline_miss_at(Instant::now())
    }

    /// Returns `true` and counts a miss if `now` is past the absolute deadline.
    pub fn deadline_miss_at(&self, now: Instant) -> bool {
        if now > self.abs_deadline {
            self.misses.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    pub fn period(&self) -> Milliseconds<u32> {
        self.period
    }

    pub fn activation(&self) -> Instant {
        self.activation
    }

    pub fn abs_deadline(&self) -> Instant {
        self.abs_deadline
    }

    /// Total deadline misses recorded for this task.
    pub fn misses(&self) -> u32 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(period_ms: u32, deadline_ms: u32) -> PeriodicTask {
        PeriodicTask::new(Milliseconds(period_ms), Milliseconds(deadline_ms), Arc::default())
    }

    #[test]
    fn priority_out_of_range_is_low() {
        assert_eq!(Priority::new(0), Priority::LOW);
        assert_eq!(Priority::new(100), Priority::LOW);
        assert_eq!(Priority::new(80).get(), 80);
        assert!(Priority::HIGH > Priority::new(50));
    }

    #[test]
    fn deadline_defaults_to_period() {
        let spec = TaskSpec::<()>::new("idle", |_| {}).with_period(30);
        assert_eq!(spec.deadline(), Milliseconds(30u32));

        let spec = spec.with_deadline(10);
        assert_eq!(spec.deadline(), Milliseconds(10u32));
        assert_eq!(std_duration(spec.period()), Duration::from_millis(30));
    }

    #[test]
    fn activations_are_exact_multiples_of_the_period() {
        let mut task = task(20, 20);
        let t0 = Instant::now();
        task.set_period_at(t0);

        for k in 1..=5u32 {
            assert_eq!(task.activation(), t0 + Duration::from_millis(20) * k);
            assert_eq!(task.abs_deadline(), t0 + Duration::from_millis(20) * k);
            task.advance();
        }
    }

    #[test]
    fn miss_is_counted_only_past_the_deadline() {
        let mut task = task(30, 10);
        let t0 = Instant::now();
        task.set_period_at(t0);

        // Exactly at the deadline is on time
        assert!(!task.deadline_miss_at(t0 + Duration::from_millis(10)));
        assert!(task.deadline_miss_at(t0 + Duration::from_millis(11)));
        assert_eq!(task.misses(), 1);

        task.advance();
        assert!(!task.deadline_miss_at(t0 + Duration::from_millis(35)));
        assert!(task.deadline_miss_at(t0 + Duration::from_millis(41)));
        assert_eq!(task.misses(), 2);
    }

    #[test]
    fn misses_survive_the_bookkeeping() {
        let misses = Arc::new(AtomicU32::new(0));
        let t0 = Instant::now();

        let mut first = PeriodicTask::new(Milliseconds(5), Milliseconds(0), misses.clone());
        first.set_period_at(t0);
        assert!(first.deadline_miss_at(t0 + Duration::from_millis(1)));
        drop(first);

        let second = PeriodicTask::new(Milliseconds(5), Milliseconds(0), misses.clone());
        assert_eq!(second.misses(), 1);
    }

    #[test]
    fn wait_for_period_sleeps_until_activation() {
        let mut task = task(15, 15);
        let t0 = Instant::now();
        task.set_period_at(t0);
        task.wait_for_period();

        assert!(Instant::now() >= t0 + Duration::from_millis(15));
        assert_eq!(task.activation(), t0 + Duration::from_millis(30));
    }

    #[test]
    fn repeated_waits_do_not_drift() {
        let period = Duration::from_millis(2);
        let mut task = task(2, 2);
        let t0 = Instant::now();
        task.set_period_at(t0);

        for k in 1..=50u32 {
            task.wait_for_period();
            assert_eq!(task.activation(), t0 + period * (k + 1));
            assert_eq!(task.abs_deadline(), t0 + period * (k + 1));
        }
        assert!(Instant::now() >= t0 + period * 50);
    }
}
