//! Ad-hoc local command execution
//!
//! Argument tokens arrive already split by the command parser. They are
//! joined back with single spaces and re-split with POSIX shell quoting, so a
//! quoted argument survives either ingestion path the same way.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("no command given")]
    EmptyCommand,

    #[error("unbalanced quotes in command: {0}")]
    UnbalancedQuotes(String),

    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Everything a finished captured run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRun {
    pub args: Vec<String>,
    /// `None` when the process was ended by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl fmt::Display for CapturedRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "args={:?}, ", self.args)?;
        match self.exit_code {
            Some(code) => writeln!(f, "returncode={code}")?,
            None => writeln!(f, "returncode=signal")?,
        }
        writeln!(f, "stdout:\n{}", self.stdout)?;
        write!(f, "stderr:\n{}", self.stderr)
    }
}

/// Runs shell commands on behalf of the dispatcher
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor {
    working_dir: Option<PathBuf>,
}

impl ShellExecutor {
    pub fn new(working_dir: Option<PathBuf>) -> Self {
        Self { working_dir }
    }

    /// Run to completion and capture output and exit status
    ///
    /// Blocks the caller for as long as the command runs; there is no timeout.
    pub async fn run_captured(&self, tokens: &[String]) -> Result<CapturedRun, ShellError> {
        let argv = parse_command(tokens)?;
        debug!(?argv, "running captured command");

        let output = self
            .command(&argv)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ShellError::Spawn {
                program: argv[0].clone(),
                source,
            })?;

        let run = CapturedRun {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            args: argv,
        };
        info!(exit_code = ?run.exit_code, "captured command finished");
        Ok(run)
    }

    /// Launch and return immediately; returns the child's pid when known
    pub fn spawn_detached(&self, tokens: &[String]) -> Result<Option<u32>, ShellError> {
        let argv = parse_command(tokens)?;

        let child = self
            .command(&argv)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| ShellError::Spawn {
                program: argv[0].clone(),
                source,
            })?;

        let pid = child.id();
        info!(?argv, ?pid, "detached command launched");
        Ok(pid)
    }

    fn command(&self, argv: &[String]) -> Command {
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]).stdin(Stdio::null());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Join tokens with spaces and re-split with shell quoting
pub fn parse_command(tokens: &[String]) -> Result<Vec<String>, ShellError> {
    let line = tokens.join(" ");
    let argv = shlex::split(&line).ok_or_else(|| ShellError::UnbalancedQuotes(line.clone()))?;
    if argv.is_empty() {
        return Err(ShellError::EmptyCommand);
    }
    Ok(argv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn tokens(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_parse_rejoins_and_resplits() {
        assert_eq!(
            parse_command(&tokens(&["echo", "'hello", "world'"])).unwrap(),
            vec!["echo", "hello world"]
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_command(&[]), Err(ShellError::EmptyCommand)));
        assert!(matches!(
            parse_command(&tokens(&["echo", "\"oops"])),
            Err(ShellError::UnbalancedQuotes(_))
        ));
    }

    #[test]
    fn test_captured_run_display() {
        let run = CapturedRun {
            args: vec!["ls".into()],
            exit_code: Some(0),
            stdout: "a\n".into(),
            stderr: String::new(),
        };
        assert_eq!(
            run.to_string(),
            "args=[\"ls\"], returncode=0\nstdout:\na\n\nstderr:\n"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captured_output_and_status() {
        let shell = ShellExecutor::default();

        let run = shell
            .run_captured(&tokens(&["sh", "-c", "'echo out; echo err >&2; exit 3'"]))
            .await
            .unwrap();
        assert_eq!(run.exit_code, Some(3));
        assert_eq!(run.stdout, "out\n");
        assert_eq!(run.stderr, "err\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_working_dir_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let shell = ShellExecutor::new(Some(dir.path().to_path_buf()));

        let run = shell.run_captured(&tokens(&["ls"])).await.unwrap();
        assert!(run.stdout.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let shell = ShellExecutor::default();
        let err = shell
            .run_captured(&tokens(&["definitely-not-a-real-program-4242"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ShellError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_detached_returns_immediately() {
        let shell = ShellExecutor::default();
        let started = Instant::now();

        let pid = shell.spawn_detached(&tokens(&["sleep", "5"])).unwrap();
        assert!(pid.is_some());
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
