//! Workload provider backed by configured command lines

use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

use super::workload::{ChildHandle, ProcessHandle, Workload, WorkloadProvider};
use crate::config::WorkloadConfig;

/// Spawns one process per configured command line
///
/// The optional `pre_stop` / `post_stop` lines become lifecycle hooks that run
/// to completion; a non-zero exit counts as a hook fault.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    commands: Vec<String>,
    pre_stop: Option<String>,
    post_stop: Option<String>,
    working_dir: Option<PathBuf>,
}

impl CommandProvider {
    pub fn new(config: &WorkloadConfig) -> Self {
        Self {
            commands: config.commands.clone(),
            pre_stop: config.pre_stop.clone(),
            post_stop: config.post_stop.clone(),
            working_dir: config.working_dir.clone(),
        }
    }
}

impl WorkloadProvider for CommandProvider {
    fn launch(&self) -> Result<Workload> {
        if self.commands.is_empty() {
            bail!("no workload commands configured");
        }

        let mut handles: Vec<Box<dyn ProcessHandle>> = Vec::with_capacity(self.commands.len());
        for line in &self.commands {
            match spawn_worker(line, self.working_dir.as_ref()) {
                Ok(handle) => {
                    info!(worker = %handle.describe(), "worker spawned");
                    handles.push(Box::new(handle));
                }
                Err(e) => {
                    // Do not leave half a workload behind
                    for handle in handles.iter_mut() {
                        if let Err(kill_err) = handle.terminate() {
                            warn!(worker = %handle.describe(), "cleanup kill failed: {}", kill_err);
                        }
                    }
                    return Err(e);
                }
            }
        }

        let mut workload = Workload::new(handles);
        if let Some(line) = self.pre_stop.clone() {
            let dir = self.working_dir.clone();
            workload = workload.with_pre_stop(move || run_hook_command(&line, dir.as_ref()));
        }
        if let Some(line) = self.post_stop.clone() {
            let dir = self.working_dir.clone();
            workload = workload.with_post_stop(move || run_hook_command(&line, dir.as_ref()));
        }
        Ok(workload)
    }
}

fn split_line(line: &str) -> Result<Vec<String>> {
    let argv = shlex::split(line).ok_or_else(|| anyhow!("unbalanced quotes in `{line}`"))?;
    if argv.is_empty() {
        bail!("empty command line");
    }
    Ok(argv)
}

fn spawn_worker(line: &str, working_dir: Option<&PathBuf>) -> Result<ChildHandle> {
    let argv = split_line(line)?;

    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..])
        .stdin(Stdio::null())
        .kill_on_drop(false);
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    let child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn `{line}`"))?;
    Ok(ChildHandle::new(child, argv[0].clone()))
}

fn run_hook_command(line: &str, working_dir: Option<&PathBuf>) -> Result<()> {
    let argv = split_line(line)?;

    let mut cmd = std::process::Command::new(&argv[0]);
    cmd.args(&argv[1..]).stdin(Stdio::null());
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    let status = cmd
        .status()
        .with_context(|| format!("failed to run `{line}`"))?;
    if !status.success() {
        bail!("`{line}` exited with {status}");
    }
    Ok(())
}
