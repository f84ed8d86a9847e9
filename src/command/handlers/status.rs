//! Status query handler

use super::HandlerContext;
use crate::response::{FailureKind, Response};

/// Handle status / statusall; never changes state
pub async fn handle_status(ctx: &HandlerContext<'_>) -> Response {
    match ctx.services.supervisor.status() {
        Ok(status) => Response::info(format!("STATUS -- {status}")),
        Err(e) => Response::failure(FailureKind::StatusQuery, e),
    }
}
