//! Workload supervision state machine
//!
//! Two states, `Halted` and `Running`. `start` and `stop` are the only
//! transitions and both hold the state lock for their whole duration, so no
//! caller ever observes a half-stopped workload.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::workload::{Hook, HookStage, Workload, WorkloadProvider};

/// Supervisor state; the sum type keeps `Halted` free of handles and hooks
pub enum SupervisorState {
    Halted,
    Running(Workload),
}

impl SupervisorState {
    pub fn status(&self) -> Status {
        match self {
            SupervisorState::Halted => Status::Halted,
            SupervisorState::Running(_) => Status::Running,
        }
    }
}

/// Externally visible state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Halted,
    Running,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Halted => f.write_str("HALTED"),
            Status::Running => f.write_str("RUNNING"),
        }
    }
}

/// Result of a successful `start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Launched from `Halted`
    Started,
    /// Was running; stopped then launched again
    Restarted,
    /// `only_halted` was set and the workload is running; nothing happened
    AlreadyRunning,
}

/// Result of a successful `stop`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    AlreadyHalted,
}

/// Faults raised while changing or reading state
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("workload provider failed: {0}")]
    Provider(String),

    #[error("workload provider returned no processes")]
    EmptyWorkload,

    #[error("{stage} hook failed: {reason}")]
    Hook { stage: HookStage, reason: String },

    #[error("failed to terminate {handle}: {source}")]
    Terminate {
        handle: String,
        #[source]
        source: std::io::Error,
    },

    #[error("restart aborted, {0}")]
    Restart(Box<SupervisorError>),

    #[error("supervisor state is unavailable (a previous operation panicked)")]
    StateUnavailable,
}

/// Owns the single workload of this instance
pub struct Supervisor {
    state: Mutex<SupervisorState>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    /// Create a supervisor in the `Halted` state
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SupervisorState::Halted),
        }
    }

    /// Current state; never mutates
    pub fn status(&self) -> Result<Status, SupervisorError> {
        Ok(self.lock()?.status())
    }

    /// Launch the workload, restarting it first if it is already running
    ///
    /// With `only_halted` a running workload is left alone and the provider is
    /// not invoked.
    pub fn start(
        &self,
        provider: &dyn WorkloadProvider,
        only_halted: bool,
    ) -> Result<StartOutcome, SupervisorError> {
        let mut state = self.lock()?;

        let restarting = match *state {
            SupervisorState::Running(_) if only_halted => {
                debug!("start skipped, workload already running");
                return Ok(StartOutcome::AlreadyRunning);
            }
            SupervisorState::Running(_) => {
                info!("restarting workload");
                halt(&mut state).map_err(|e| SupervisorError::Restart(Box::new(e)))?;
                true
            }
            SupervisorState::Halted => false,
        };

        let workload = contain(|| provider.launch()).map_err(SupervisorError::Provider)?;
        if workload.handles.is_empty() {
            warn!("workload provider returned no processes");
            return Err(SupervisorError::EmptyWorkload);
        }

        info!(processes = workload.handles.len(), "workload running");
        *state = SupervisorState::Running(workload);

        Ok(if restarting {
            StartOutcome::Restarted
        } else {
            StartOutcome::Started
        })
    }

    /// Run the stop sequence: pre-stop hook, terminate handles, post-stop hook
    pub fn stop(&self) -> Result<StopOutcome, SupervisorError> {
        let mut state = self.lock()?;
        halt(&mut state)
    }

    fn lock(&self) -> Result<MutexGuard<'_, SupervisorState>, SupervisorError> {
        self.state
            .lock()
            .map_err(|_| SupervisorError::StateUnavailable)
    }
}

/// Stop whatever is running and leave the state `Halted`
///
/// On any fault the workload stays in place (handles already signalled are not
/// signalled again by this call) and the error is returned.
fn halt(state: &mut SupervisorState) -> Result<StopOutcome, SupervisorError> {
    let workload = match state {
        SupervisorState::Halted => return Ok(StopOutcome::AlreadyHalted),
        SupervisorState::Running(workload) => workload,
    };

    if let Some(hook) = workload.hooks.pre_stop.as_mut() {
        run_hook(HookStage::PreStop, hook)?;
    }

    for handle in workload.handles.iter_mut() {
        debug!(handle = %handle.describe(), "requesting termination");
        handle
            .terminate()
            .map_err(|source| SupervisorError::Terminate {
                handle: handle.describe(),
                source,
            })?;
    }

    if let Some(hook) = workload.hooks.post_stop.as_mut() {
        run_hook(HookStage::PostStop, hook)?;
    }

    // Handles are dropped without waiting for exit
    *state = SupervisorState::Halted;
    info!("workload halted");
    Ok(StopOutcome::Stopped)
}

fn run_hook(stage: HookStage, hook: &mut Hook) -> Result<(), SupervisorError> {
    debug!(%stage, "running lifecycle hook");
    contain(|| hook()).map_err(|reason| SupervisorError::Hook { stage, reason })
}

/// Run externally supplied code, turning both errors and panics into text
fn contain<T>(f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::workload::ProcessHandle;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type Log = Arc<Mutex<Vec<String>>>;

    struct RecordingHandle {
        index: usize,
        log: Log,
        fail: bool,
    }

    impl ProcessHandle for RecordingHandle {
        fn terminate(&mut self) -> std::io::Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("terminate {}", self.index));
            if self.fail {
                return Err(std::io::Error::other("no such process"));
            }
            Ok(())
        }

        fn describe(&self) -> String {
            format!("worker-{}", self.index)
        }
    }

    fn push(log: &Log, entry: &str) {
        log.lock().unwrap().push(entry.to_string());
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    /// Provider launching `count` recording handles with both hooks set
    fn provider(log: Log, count: usize, launches: Arc<AtomicUsize>) -> impl WorkloadProvider {
        move || -> anyhow::Result<Workload> {
            launches.fetch_add(1, Ordering::SeqCst);
            push(&log, "launch");
            let handles = (0..count)
                .map(|index| {
                    Box::new(RecordingHandle {
                        index,
                        log: log.clone(),
                        fail: false,
                    }) as Box<dyn ProcessHandle>
                })
                .collect();
            let pre = log.clone();
            let post = log.clone();
            Ok(Workload::new(handles)
                .with_pre_stop(move || {
                    push(&pre, "pre_stop");
                    Ok(())
                })
                .with_post_stop(move || {
                    push(&post, "post_stop");
                    Ok(())
                }))
        }
    }

    #[test]
    fn test_initial_state_is_halted() {
        let supervisor = Supervisor::new();
        assert_eq!(supervisor.status().unwrap(), Status::Halted);
    }

    #[test]
    fn test_stop_when_halted_is_noop() {
        let supervisor = Supervisor::new();
        assert_eq!(supervisor.stop().unwrap(), StopOutcome::AlreadyHalted);
        assert_eq!(supervisor.stop().unwrap(), StopOutcome::AlreadyHalted);
        assert_eq!(supervisor.status().unwrap(), Status::Halted);
    }

    #[test]
    fn test_start_then_stop() {
        let log = Log::default();
        let launches = Arc::new(AtomicUsize::new(0));
        let provider = provider(log.clone(), 2, launches.clone());
        let supervisor = Supervisor::new();

        assert_eq!(
            supervisor.start(&provider, false).unwrap(),
            StartOutcome::Started
        );
        assert_eq!(supervisor.status().unwrap(), Status::Running);

        assert_eq!(supervisor.stop().unwrap(), StopOutcome::Stopped);
        assert_eq!(supervisor.status().unwrap(), Status::Halted);

        assert_eq!(
            entries(&log),
            vec![
                "launch",
                "pre_stop",
                "terminate 0",
                "terminate 1",
                "post_stop"
            ]
        );
    }

    #[test]
    fn test_only_halted_skips_running_workload() {
        let log = Log::default();
        let launches = Arc::new(AtomicUsize::new(0));
        let provider = provider(log.clone(), 1, launches.clone());
        let supervisor = Supervisor::new();

        supervisor.start(&provider, false).unwrap();
        assert_eq!(
            supervisor.start(&provider, true).unwrap(),
            StartOutcome::AlreadyRunning
        );
        assert_eq!(launches.load(Ordering::SeqCst), 1);
        assert_eq!(entries(&log), vec!["launch"]);
    }

    #[test]
    fn test_only_halted_starts_halted_workload() {
        let log = Log::default();
        let launches = Arc::new(AtomicUsize::new(0));
        let provider = provider(log, 1, launches.clone());
        let supervisor = Supervisor::new();

        assert_eq!(
            supervisor.start(&provider, true).unwrap(),
            StartOutcome::Started
        );
        assert_eq!(launches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_restart_runs_full_stop_sequence_first() {
        let log = Log::default();
        let launches = Arc::new(AtomicUsize::new(0));
        let provider = provider(log.clone(), 2, launches.clone());
        let supervisor = Supervisor::new();

        supervisor.start(&provider, false).unwrap();
        assert_eq!(
            supervisor.start(&provider, false).unwrap(),
            StartOutcome::Restarted
        );

        assert_eq!(
            entries(&log),
            vec![
                "launch",
                "pre_stop",
                "terminate 0",
                "terminate 1",
                "post_stop",
                "launch"
            ]
        );
        assert_eq!(supervisor.status().unwrap(), Status::Running);
    }

    #[test]
    fn test_restart_halts_before_launching() {
        let launches = Arc::new(AtomicUsize::new(0));
        let log = Log::default();
        let good = provider(log.clone(), 1, launches);
        let supervisor = Supervisor::new();
        supervisor.start(&good, false).unwrap();

        let failing = || -> anyhow::Result<Workload> { Err(anyhow!("config missing")) };
        let err = supervisor.start(&failing, false).unwrap_err();
        assert!(matches!(err, SupervisorError::Provider(_)));

        // Old workload was fully stopped before the provider ran
        assert_eq!(supervisor.status().unwrap(), Status::Halted);
        assert_eq!(entries(&log).last().unwrap(), "post_stop");
    }

    #[test]
    fn test_provider_error_leaves_halted() {
        let supervisor = Supervisor::new();
        let failing = || -> anyhow::Result<Workload> { Err(anyhow!("bot.py not found")) };

        let err = supervisor.start(&failing, false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "workload provider failed: bot.py not found"
        );
        assert_eq!(supervisor.status().unwrap(), Status::Halted);
    }

    #[test]
    fn test_provider_panic_is_contained() {
        let supervisor = Supervisor::new();
        let panicking = || -> anyhow::Result<Workload> { panic!("worker crashed") };

        let err = supervisor.start(&panicking, false).unwrap_err();
        assert!(err.to_string().contains("panicked: worker crashed"));
        // Lock is not poisoned
        assert_eq!(supervisor.status().unwrap(), Status::Halted);
    }

    #[test]
    fn test_empty_workload_is_rejected() {
        let supervisor = Supervisor::new();
        let empty = || -> anyhow::Result<Workload> { Ok(Workload::new(Vec::new())) };

        assert!(matches!(
            supervisor.start(&empty, false),
            Err(SupervisorError::EmptyWorkload)
        ));
        assert_eq!(supervisor.status().unwrap(), Status::Halted);
    }

    #[test]
    fn test_pre_stop_failure_keeps_workload() {
        let log = Log::default();
        let hook_log = log.clone();
        let handle_log = log.clone();
        let provider = move || -> anyhow::Result<Workload> {
            let handle = RecordingHandle {
                index: 0,
                log: handle_log.clone(),
                fail: false,
            };
            let hook_log = hook_log.clone();
            Ok(
                Workload::new(vec![Box::new(handle)]).with_pre_stop(move || {
                    push(&hook_log, "pre_stop");
                    Err(anyhow!("flush failed"))
                }),
            )
        };
        let supervisor = Supervisor::new();
        supervisor.start(&provider, false).unwrap();

        let err = supervisor.stop().unwrap_err();
        assert_eq!(err.to_string(), "pre-stop hook failed: flush failed");
        assert_eq!(supervisor.status().unwrap(), Status::Running);
        assert_eq!(entries(&log), vec!["pre_stop"]);
    }

    #[test]
    fn test_terminate_failure_is_reported() {
        let log = Log::default();
        let handle_log = log.clone();
        let provider = move || -> anyhow::Result<Workload> {
            Ok(Workload::new(vec![
                Box::new(RecordingHandle {
                    index: 0,
                    log: handle_log.clone(),
                    fail: true,
                }),
                Box::new(RecordingHandle {
                    index: 1,
                    log: handle_log.clone(),
                    fail: false,
                }),
            ]))
        };
        let supervisor = Supervisor::new();
        supervisor.start(&provider, false).unwrap();

        let err = supervisor.stop().unwrap_err();
        assert!(matches!(err, SupervisorError::Terminate { .. }));
        assert!(err.to_string().starts_with("failed to terminate worker-0"));
        assert_eq!(entries(&log), vec!["terminate 0"]);
    }

    #[test]
    fn test_restart_aborted_when_stop_fails() {
        let launches = Arc::new(AtomicUsize::new(0));
        let counter = launches.clone();
        let provider = move || -> anyhow::Result<Workload> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Workload::new(vec![Box::new(RecordingHandle {
                index: 0,
                log: Log::default(),
                fail: false,
            })])
            .with_post_stop(|| Err(anyhow!("disk full"))))
        };
        let supervisor = Supervisor::new();
        supervisor.start(&provider, false).unwrap();

        let err = supervisor.start(&provider, false).unwrap_err();
        assert!(matches!(err, SupervisorError::Restart(_)));
        assert_eq!(launches.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.status().unwrap(), Status::Running);
    }

    #[test]
    fn test_hooks_are_optional() {
        let supervisor = Supervisor::new();
        let provider = || -> anyhow::Result<Workload> {
            Ok(Workload::new(vec![Box::new(RecordingHandle {
                index: 0,
                log: Log::default(),
                fail: false,
            })]))
        };
        supervisor.start(&provider, false).unwrap();
        assert_eq!(supervisor.stop().unwrap(), StopOutcome::Stopped);
    }
}
