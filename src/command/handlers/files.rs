//! File transfer handlers

use super::HandlerContext;
use crate::files::TransferOutcome;
use crate::response::{FailureKind, Response};

/// Handle sendfiles / sendfilesall: save the attachments of the command message
pub async fn handle_send_files(ctx: &HandlerContext<'_>) -> Response {
    match ctx.services.files.receive(&ctx.origin.attachments).await {
        Ok(saved) if saved.is_empty() => Response::info("no files saved"),
        Ok(saved) => Response::success(format!("{} saved", saved.join(", "))),
        Err(e) => Response::failure(FailureKind::FileSend, e),
    }
}

/// Handle getfiles / getfilesall
pub async fn handle_get_files(ctx: &HandlerContext<'_>, filenames: &[String]) -> Response {
    let outcome = match ctx.services.files.fetch(filenames).await {
        Ok(outcome) => outcome,
        Err(e) => return Response::failure(FailureKind::FileFetch, e),
    };

    let headline = match &outcome {
        TransferOutcome::None => return Response::info("no files retrieved"),
        TransferOutcome::One(_) => "file retrieved",
        TransferOutcome::Many(_) => "files retrieved",
    };
    Response::success(headline).with_files(outcome.into_files())
}
