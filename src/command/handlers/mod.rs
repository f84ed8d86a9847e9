//! Command handlers for each command kind

mod files;
mod lifecycle;
mod shell;
mod status;
mod system;

pub use files::{handle_get_files, handle_send_files};
pub use lifecycle::{handle_start, handle_stop};
pub use shell::{handle_shell, handle_shell_detached};
pub use status::handle_status;
pub use system::handle_system_off;

use procfleet_shared::ChatMessage;
use std::sync::Arc;
use tracing::warn;

use crate::files::FileGateway;
use crate::identity::DeviceIdentity;
use crate::response::Response;
use crate::shell::ShellExecutor;
use crate::supervisor::{Supervisor, WorkloadProvider};
use crate::transport::ReplySink;

/// Everything a handler may act on
pub struct Services {
    pub supervisor: Arc<Supervisor>,
    pub provider: Arc<dyn WorkloadProvider>,
    pub files: FileGateway,
    pub shell: ShellExecutor,
}

/// Context passed to command handlers
pub struct HandlerContext<'a> {
    pub identity: &'a DeviceIdentity,
    /// The message that carried the command
    pub origin: &'a ChatMessage,
    pub sink: &'a dyn ReplySink,
    pub services: &'a Services,
}

impl HandlerContext<'_> {
    /// Render and deliver `response` in answer to the originating message
    ///
    /// Delivery failures are logged; the command itself has already run.
    pub async fn reply(&self, response: Response) {
        let reply = response.render(self.identity);
        if let Err(e) = self.sink.deliver(self.origin, reply).await {
            warn!(message_id = self.origin.id, "reply delivery failed: {:#}", e);
        }
    }
}
