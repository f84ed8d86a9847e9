//! Start and stop handlers
//!
//! Both are two-phase: a receipt goes out before the supervisor is touched,
//! since hooks and providers may take a while. The completion notice does not
//! echo the command.

use super::HandlerContext;
use crate::response::{FailureKind, Response};
use crate::supervisor::{StartOutcome, StopOutcome, SupervisorError};
use tracing::info;

const BUSY_NOTICE: &str = "[local commands unavailable until complete]";

/// Handle start / startall
pub async fn handle_start(ctx: &HandlerContext<'_>, only_halted: bool) -> Response {
    ctx.reply(Response::info(format!("STARTUP SIGNAL RECEIVED\n{BUSY_NOTICE}")))
        .await;

    let services = ctx.services;
    let response = match services.supervisor.start(services.provider.as_ref(), only_halted) {
        Ok(StartOutcome::Started) => Response::success("STARTUP COMPLETE"),
        Ok(StartOutcome::Restarted) => Response::success("RESTART COMPLETE"),
        Ok(StartOutcome::AlreadyRunning) => Response::info("device already running"),
        Err(SupervisorError::Restart(cause)) => Response::failure(FailureKind::Startup, cause),
        Err(e) => Response::failure(FailureKind::Startup, e),
    };

    info!(only_halted, "start handled");
    response.no_cmd()
}

/// Handle stop / stopall
pub async fn handle_stop(ctx: &HandlerContext<'_>) -> Response {
    ctx.reply(Response::info(format!("SHUTDOWN SIGNAL RECEIVED\n{BUSY_NOTICE}")))
        .await;

    let response = match ctx.services.supervisor.stop() {
        Ok(StopOutcome::Stopped) => Response::success("SHUTDOWN COMPLETE"),
        Ok(StopOutcome::AlreadyHalted) => Response::info("device already halted"),
        Err(e) => Response::failure(FailureKind::Shutdown, e),
    };

    info!("stop handled");
    response.no_cmd()
}
