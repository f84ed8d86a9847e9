//! System-off handler

use super::HandlerContext;
use crate::response::Response;
use tracing::warn;

/// Handle systemoff / systemoffall
///
/// Only acknowledges; the caller stops the workload and ends the event loop.
pub async fn handle_system_off(ctx: &HandlerContext<'_>) -> Response {
    warn!(identity = %ctx.identity, "system off requested");
    Response::info("SYSTEM SWITCHING OFF")
}
