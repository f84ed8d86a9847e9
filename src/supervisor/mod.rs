//! Workload supervision
//!
//! This module handles:
//! - The Halted/Running state machine that owns the workload
//! - The provider contract that launches worker processes
//! - Lifecycle hooks invoked around termination
//!
//! Termination is a request only: the supervisor never waits for a worker to
//! exit and never restarts one that crashed.

mod machine;
mod provider;
mod workload;

pub use machine::{StartOutcome, StopOutcome, Supervisor, SupervisorError};
pub use provider::CommandProvider;
pub use workload::WorkloadProvider;

#[cfg(test)]
pub use machine::Status;
#[cfg(test)]
pub use workload::{ProcessHandle, Workload};
