//! Shell command handlers

use super::HandlerContext;
use crate::response::{FailureKind, Response};

/// Handle shell / shellall: run to completion and report the output
pub async fn handle_shell(ctx: &HandlerContext<'_>, tokens: &[String]) -> Response {
    match ctx.services.shell.run_captured(tokens).await {
        Ok(run) => Response::info(format!("SHELL EXECUTION RESULTS --\n{run}")),
        Err(e) => Response::failure(FailureKind::ShellExecution, e),
    }
}

/// Handle shellprocess / shellprocessall: launch and acknowledge right away
pub async fn handle_shell_detached(ctx: &HandlerContext<'_>, tokens: &[String]) -> Response {
    match ctx.services.shell.spawn_detached(tokens) {
        Ok(_) => Response::info("SHELL PROCESS EXECUTED"),
        Err(e) => Response::failure(FailureKind::ShellProcess, e),
    }
}
