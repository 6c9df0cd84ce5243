//! Error types for the simulation executive.
//!
//! Only start-up and wiring failures are errors. Numeric degeneracies in the
//! physics and control code resolve to fallback values and deadline overruns
//! are counted, so neither ever shows up here.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::scheduler::Priority;

/// Result alias used across the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Fatal failures of the executive.
#[derive(Debug, Error)]
pub enum Error {
    /// The operating system refused to create a worker thread.
    #[error("unable to create worker for task {task}: {source}")]
    Spawn {
        /// Name of the task whose worker could not be created.
        task: &'static str,
        /// Underlying OS error.
        source: io::Error,
    },

    /// The fixed-priority policy could not be applied to a worker.
    #[error("unable to schedule task {task} at priority {priority}: {source}")]
    Scheduling {
        /// Name of the task.
        task: &'static str,
        /// Requested priority.
        priority: Priority,
        /// Underlying OS error.
        source: io::Error,
    },

    /// The telemetry socket could not be opened or connected.
    #[error("unable to open telemetry transport: {0}")]
    Telemetry(#[source] io::Error),

    /// A telemetry frame could not be encoded.
    #[error("unable to encode telemetry frame: {0}")]
    Encode(#[from] serde_json::Error),

    /// The configuration file could not be read.
    #[error("unable to read config {path}: {source}")]
    ConfigRead {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },

    /// The configuration file is not valid.
    #[error("invalid config {path}: {source}")]
    Config {
        /// Path of the configuration file.
        path: PathBuf,
        /// Parse error.
        source: serde_json::Error,
    },

    /// The configuration parsed but holds a zero period or a non-positive game speed.
    #[error("invalid config {path}: periods and game speed must be positive")]
    InvalidConfig {
        /// Path of the configuration file.
        path: PathBuf,
    },
}

impl Error {
    /// Creates a spawn error for `task`.
    #[must_use]
    pub fn spawn(task: &'static str, source: io::Error) -> Self {
        Self::Spawn { task, source }
    }

    /// Creates a scheduling error for `task`.
    #[must_use]
    pub fn scheduling(task: &'static str, priority: Priority, source: io::Error) -> Self {
        Self::Scheduling {
            task,
            priority,
            source,
        }
    }
}
