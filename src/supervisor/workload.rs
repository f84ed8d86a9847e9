//! Workload descriptor and the provider contract
//!
//! A provider launches the worker processes and hands back a [`Workload`]:
//! one handle per process plus optional lifecycle hooks. The supervisor never
//! looks inside a handle beyond asking it to terminate.

use std::fmt;
use tokio::process::Child;

/// Zero-argument lifecycle callback
pub type Hook = Box<dyn FnMut() -> anyhow::Result<()> + Send>;

/// A running worker process that can be asked to stop
pub trait ProcessHandle: Send {
    /// Request termination. Must not wait for the process to exit.
    fn terminate(&mut self) -> std::io::Result<()>;

    /// Short label for logs and diagnostics
    fn describe(&self) -> String;
}

/// Optional callbacks invoked around handle termination
///
/// `pre_stop` runs before any handle is signalled, `post_stop` after all of
/// them have been.
#[derive(Default)]
pub struct LifecycleHooks {
    pub pre_stop: Option<Hook>,
    pub post_stop: Option<Hook>,
}

/// Which hook slot is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    PreStop,
    PostStop,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookStage::PreStop => f.write_str("pre-stop"),
            HookStage::PostStop => f.write_str("post-stop"),
        }
    }
}

/// Everything a provider launched
pub struct Workload {
    pub handles: Vec<Box<dyn ProcessHandle>>,
    pub hooks: LifecycleHooks,
}

impl Workload {
    pub fn new(handles: Vec<Box<dyn ProcessHandle>>) -> Self {
        Self {
            handles,
            hooks: LifecycleHooks::default(),
        }
    }

    pub fn with_pre_stop(
        mut self,
        hook: impl FnMut() -> anyhow::Result<()> + Send + 'static,
    ) -> Self {
        self.hooks.pre_stop = Some(Box::new(hook));
        self
    }

    pub fn with_post_stop(
        mut self,
        hook: impl FnMut() -> anyhow::Result<()> + Send + 'static,
    ) -> Self {
        self.hooks.post_stop = Some(Box::new(hook));
        self
    }
}

impl fmt::Debug for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workload")
            .field(
                "handles",
                &self.handles.iter().map(|h| h.describe()).collect::<Vec<_>>(),
            )
            .field("pre_stop", &self.hooks.pre_stop.is_some())
            .field("post_stop", &self.hooks.post_stop.is_some())
            .finish()
    }
}

/// Factory for the workload; invoked with no arguments on every start
pub trait WorkloadProvider: Send + Sync {
    fn launch(&self) -> anyhow::Result<Workload>;
}

impl<F> WorkloadProvider for F
where
    F: Fn() -> anyhow::Result<Workload> + Send + Sync,
{
    fn launch(&self) -> anyhow::Result<Workload> {
        self()
    }
}

/// Handle over a spawned child process
///
/// Termination is a kill request only; the child is reaped by the runtime in
/// the background once the handle is dropped.
pub struct ChildHandle {
    child: Child,
    label: String,
}

impl ChildHandle {
    pub fn new(child: Child, label: impl Into<String>) -> Self {
        Self {
            child,
            label: label.into(),
        }
    }
}

impl ProcessHandle for ChildHandle {
    fn terminate(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }

    fn describe(&self) -> String {
        match self.child.id() {
            Some(pid) => format!("{} (pid {pid})", self.label),
            None => format!("{} (exited)", self.label),
        }
    }
}
