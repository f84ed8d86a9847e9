//! Command executor - parses, gates and dispatches incoming commands

use procfleet_shared::ChatMessage;
use tracing::{debug, info};

use super::handlers::{self, HandlerContext, Services};
use super::parser::{self, ParseError};
use super::registry::{CommandKind, CommandRegistry, CommandSpec, Scope};
use crate::identity::DeviceIdentity;
use crate::response::{FailureKind, Response};
use crate::transport::ReplySink;

/// Result of handling one inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResult {
    /// Not a command, self-authored, or addressed to another device
    Ignored,
    /// A command ran (or failed to parse) and was answered
    Completed,
    /// System off was acknowledged; the instance should exit
    Shutdown,
}

/// Executes commands received over the control channel
pub struct CommandExecutor {
    identity: DeviceIdentity,
    chat_name: String,
    prefix: String,
    registry: CommandRegistry,
    services: Services,
}

impl CommandExecutor {
    /// Create a new command executor
    pub fn new(identity: DeviceIdentity, prefix: impl Into<String>, services: Services) -> Self {
        Self {
            chat_name: identity.chat_name(),
            identity,
            prefix: prefix.into(),
            registry: CommandRegistry::new(),
            services,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Run whatever command `message` carries and deliver the replies to `sink`
    pub async fn handle_message(&self, message: &ChatMessage, sink: &dyn ReplySink) -> CommandResult {
        if message.author.name == self.chat_name {
            return CommandResult::Ignored;
        }

        let parsed = if message.author.is_bot() {
            parser::parse_raw(&message.content, &self.prefix)
        } else {
            parser::parse_interactive(&message.content, &self.prefix)
        };

        match parsed {
            None => CommandResult::Ignored,
            Some(Ok(invocation)) => {
                self.dispatch(&invocation.name, &invocation.args, message, sink)
                    .await
            }
            Some(Err(e)) => {
                self.context(message, sink).reply(parse_failure(e)).await;
                CommandResult::Completed
            }
        }
    }

    /// Resolve `name`, apply the identity gate and run the handler
    pub async fn dispatch(
        &self,
        name: &str,
        args: &[String],
        origin: &ChatMessage,
        sink: &dyn ReplySink,
    ) -> CommandResult {
        let ctx = self.context(origin, sink);

        let Some(spec) = self.registry.resolve(name) else {
            ctx.reply(parse_failure(ParseError::UnknownCommand(name.to_string())))
                .await;
            return CommandResult::Completed;
        };

        let args = match self.route(spec, args) {
            Ok(Some(rest)) => rest,
            Ok(None) => {
                debug!(command = spec.name, "addressed to another device");
                return CommandResult::Ignored;
            }
            Err(e) => {
                ctx.reply(parse_failure(e)).await;
                return CommandResult::Completed;
            }
        };

        info!(
            command = spec.name,
            author = %origin.author.name,
            message_id = origin.id,
            "executing command"
        );

        let response = match spec.kind {
            CommandKind::Start => {
                let only_halted = spec.scope == Scope::Universal
                    && args.first().map(String::as_str) == Some("halted");
                handlers::handle_start(&ctx, only_halted).await
            }
            CommandKind::Stop => handlers::handle_stop(&ctx).await,
            CommandKind::SendFiles => handlers::handle_send_files(&ctx).await,
            CommandKind::GetFiles => handlers::handle_get_files(&ctx, args).await,
            CommandKind::Status => handlers::handle_status(&ctx).await,
            CommandKind::Shell => handlers::handle_shell(&ctx, args).await,
            CommandKind::ShellDetached => handlers::handle_shell_detached(&ctx, args).await,
            CommandKind::SystemOff => handlers::handle_system_off(&ctx).await,
        };

        ctx.reply(response).await;

        match spec.kind {
            CommandKind::SystemOff => CommandResult::Shutdown,
            _ => CommandResult::Completed,
        }
    }

    /// Identity gate; yields the arguments left for the handler, or `None`
    /// when the command names another device
    fn route<'a>(
        &self,
        spec: &CommandSpec,
        args: &'a [String],
    ) -> Result<Option<&'a [String]>, ParseError> {
        match spec.scope {
            Scope::Universal => Ok(Some(args)),
            Scope::Device { target_required } => match args.split_first() {
                Some((target, rest)) => Ok(self.identity.matches(target).then_some(rest)),
                None if target_required => Err(ParseError::MissingArgument("device_id")),
                None => Ok(Some(args)),
            },
        }
    }

    fn context<'a>(&'a self, origin: &'a ChatMessage, sink: &'a dyn ReplySink) -> HandlerContext<'a> {
        HandlerContext {
            identity: &self.identity,
            origin,
            sink,
            services: &self.services,
        }
    }
}

fn parse_failure(error: ParseError) -> Response {
    Response::failure(FailureKind::Parse, error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::{FileGateway, LocalStorage};
    use crate::response::Reply;
    use crate::shell::ShellExecutor;
    use crate::supervisor::{ProcessHandle, Status, Supervisor, Workload, WorkloadProvider};
    use anyhow::Result;
    use async_trait::async_trait;
    use procfleet_shared::{Attachment, Author, Post};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingSink {
        replies: Mutex<Vec<Reply>>,
    }

    impl RecordingSink {
        fn take(&self) -> Vec<Reply> {
            std::mem::take(&mut *self.replies.lock().unwrap())
        }
    }

    #[async_trait]
    impl ReplySink for RecordingSink {
        async fn deliver(&self, _origin: &ChatMessage, reply: Reply) -> Result<()> {
            self.replies.lock().unwrap().push(reply);
            Ok(())
        }
    }

    struct NoopHandle;

    impl ProcessHandle for NoopHandle {
        fn terminate(&mut self) -> std::io::Result<()> {
            Ok(())
        }

        fn describe(&self) -> String {
            "noop".into()
        }
    }

    struct CountingProvider {
        launches: AtomicUsize,
    }

    impl WorkloadProvider for CountingProvider {
        fn launch(&self) -> Result<Workload> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(Workload::new(vec![Box::new(NoopHandle) as Box<dyn ProcessHandle>]))
        }
    }

    struct Fixture {
        executor: CommandExecutor,
        provider: Arc<CountingProvider>,
        sink: RecordingSink,
    }

    impl Fixture {
        fn new(root: &Path) -> Self {
            let provider = Arc::new(CountingProvider {
                launches: AtomicUsize::new(0),
            });
            let services = Services {
                supervisor: Arc::new(Supervisor::new()),
                provider: provider.clone(),
                files: FileGateway::new(
                    Arc::new(LocalStorage::new(root)),
                    ["procfleet.toml".to_string(), "id.txt".to_string()],
                ),
                shell: ShellExecutor::new(None),
            };
            Self {
                executor: CommandExecutor::new(DeviceIdentity::new("NODE1"), "$", services),
                provider,
                sink: RecordingSink::default(),
            }
        }

        async fn user(&self, text: &str) -> CommandResult {
            let message = ChatMessage::from_post(1, Author::user("operator"), Post::text(text));
            self.executor.handle_message(&message, &self.sink).await
        }

        async fn bot(&self, name: &str, text: &str) -> CommandResult {
            let message = ChatMessage::from_post(2, Author::bot(name), Post::text(text));
            self.executor.handle_message(&message, &self.sink).await
        }

        async fn with_files(&self, text: &str, files: Vec<Attachment>) -> CommandResult {
            let post = Post {
                attachments: files,
                ..Post::text(text)
            };
            let message = ChatMessage::from_post(3, Author::user("operator"), post);
            self.executor.handle_message(&message, &self.sink).await
        }

        fn contents(&self) -> Vec<String> {
            self.sink.take().into_iter().map(|r| r.content).collect()
        }

        fn status(&self) -> Status {
            self.executor.services().supervisor.status().unwrap()
        }
    }

    #[tokio::test]
    async fn test_device_command_for_this_instance_runs() {
        let dir = tempfile::tempdir().unwrap();
        let fx = Fixture::new(dir.path());

        assert_eq!(fx.user("$start node1").await, CommandResult::Completed);

        let replies = fx.sink.take();
        assert_eq!(replies.len(), 2);
        assert_eq!(
            replies[0].content,
            "NODE1: [i] STARTUP SIGNAL RECEIVED\n[local commands unavailable until complete]"
        );
        assert!(replies[0].echo);
        assert_eq!(replies[1].content, "NODE1: [*] STARTUP COMPLETE");
        assert!(!replies[1].echo);
        assert_eq!(fx.status(), Status::Running);
    }

    #[tokio::test]
    async fn test_device_command_for_other_instance_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let fx = Fixture::new(dir.path());

        assert_eq!(fx.user("$start NODE2").await, CommandResult::Ignored);
        assert_eq!(fx.user("$ss node2").await, CommandResult::Ignored);
        assert!(fx.sink.take().is_empty());
        assert_eq!(fx.provider.launches.load(Ordering::SeqCst), 0);
        assert_eq!(fx.status(), Status::Halted);
    }

    #[tokio::test]
    async fn test_parse_failures_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let fx = Fixture::new(dir.path());

        fx.user("$bogus node1").await;
        fx.user("$start").await;
        fx.bot("scheduler", "$shell node1 echo 'oops").await;

        assert_eq!(
            fx.contents(),
            vec![
                "NODE1: Command \"bogus\" is not found",
                "NODE1: device_id is a required argument that is missing.",
                "NODE1: Unbalanced quotes in command",
            ]
        );
    }

    #[tokio::test]
    async fn test_own_messages_and_plain_text_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let fx = Fixture::new(dir.path());

        assert_eq!(fx.bot("procfleet-NODE1", "$ssa").await, CommandResult::Ignored);
        assert_eq!(
            fx.bot("procfleet-NODE2", "NODE2: [i] STATUS -- HALTED").await,
            CommandResult::Ignored
        );
        assert_eq!(fx.user("good morning").await, CommandResult::Ignored);
        assert_eq!(fx.user("$ ssa").await, CommandResult::Ignored);
        assert_eq!(fx.bot("scheduler", "$ ssa").await, CommandResult::Ignored);
        assert_eq!(fx.bot("scheduler", "$").await, CommandResult::Ignored);
        assert!(fx.sink.take().is_empty());
    }

    #[tokio::test]
    async fn test_peer_bots_use_the_same_commands() {
        let dir = tempfile::tempdir().unwrap();
        let fx = Fixture::new(dir.path());

        assert_eq!(fx.bot("procfleet-NODE2", "$ssa").await, CommandResult::Completed);
        fx.bot("scheduler", "$status").await;
        assert_eq!(
            fx.contents(),
            vec!["NODE1: [i] STATUS -- HALTED", "NODE1: [i] STATUS -- HALTED"]
        );
    }

    #[tokio::test]
    async fn test_start_variants() {
        let dir = tempfile::tempdir().unwrap();
        let fx = Fixture::new(dir.path());

        fx.user("$sta").await;
        fx.user("$startall halted").await;
        fx.user("$startall").await;

        let completions: Vec<String> = fx.contents().into_iter().skip(1).step_by(2).collect();
        assert_eq!(
            completions,
            vec![
                "NODE1: [*] STARTUP COMPLETE",
                "NODE1: [i] device already running",
                "NODE1: [*] RESTART COMPLETE",
            ]
        );
        assert_eq!(fx.provider.launches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stop_reports_and_halts() {
        let dir = tempfile::tempdir().unwrap();
        let fx = Fixture::new(dir.path());

        fx.user("$stopall").await;
        fx.user("$st node1").await;
        fx.user("$sp NODE1").await;
        assert_eq!(fx.status(), Status::Halted);

        let replies = fx.sink.take();
        assert_eq!(replies.len(), 6);
        assert_eq!(
            replies[0].content,
            "NODE1: [i] SHUTDOWN SIGNAL RECEIVED\n[local commands unavailable until complete]"
        );
        assert_eq!(replies[1].content, "NODE1: [i] device already halted");
        assert_eq!(replies[5].content, "NODE1: [*] SHUTDOWN COMPLETE");
        assert!(!replies[5].echo);
    }

    #[tokio::test]
    async fn test_send_files_skips_reserved_names() {
        let dir = tempfile::tempdir().unwrap();
        let fx = Fixture::new(dir.path());

        fx.with_files(
            "$sf node1",
            vec![Attachment::new("procfleet.toml", &b"x = 1"[..])],
        )
        .await;
        fx.with_files(
            "$sendfilesall",
            vec![
                Attachment::new("id.txt", &b"EVIL"[..]),
                Attachment::new("data.txt", &b"payload"[..]),
            ],
        )
        .await;

        assert_eq!(
            fx.contents(),
            vec!["NODE1: [i] no files saved", "NODE1: [*] data.txt saved"]
        );
        assert!(!dir.path().join("procfleet.toml").exists());
        assert!(!dir.path().join("id.txt").exists());
        assert_eq!(std::fs::read(dir.path().join("data.txt")).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_get_files_counts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        let fx = Fixture::new(dir.path());

        fx.user("$gfa").await;
        fx.user("$gf node1 a.txt").await;
        fx.user("$getfilesall a.txt b.txt").await;
        fx.user("$getfiles node1 a.txt missing.txt").await;

        let replies = fx.sink.take();
        assert_eq!(replies[0].content, "NODE1: [i] no files retrieved");
        assert!(replies[0].files.is_empty());
        assert_eq!(replies[1].content, "NODE1: [*] file retrieved");
        assert_eq!(replies[1].files.len(), 1);
        assert_eq!(replies[2].content, "NODE1: [*] files retrieved");
        assert_eq!(replies[2].files.len(), 2);
        assert!(replies[3]
            .content
            .starts_with("NODE1: [!] file fetch failure\ncannot read missing.txt"));
        assert!(replies[3].files.is_empty());
    }

    #[tokio::test]
    async fn test_get_file_larger_than_a_reply_fails() {
        let dir = tempfile::tempdir().unwrap();
        let big = std::fs::File::create(dir.path().join("big.log")).unwrap();
        big.set_len(25 * 1024 * 1024).unwrap();
        let fx = Fixture::new(dir.path());

        fx.user("$gfa big.log").await;

        let replies = fx.sink.take();
        assert_eq!(replies.len(), 1);
        assert!(replies[0]
            .content
            .starts_with("NODE1: [!] file fetch failure
big.log does not fit in one reply"));
        assert!(replies[0].files.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_modes() {
        let dir = tempfile::tempdir().unwrap();
        let fx = Fixture::new(dir.path());

        fx.user("$shellall echo hello").await;
        fx.user("$slpa true").await;
        fx.user("$sl node1").await;

        let contents = fx.contents();
        assert!(contents[0].starts_with("NODE1: [i] SHELL EXECUTION RESULTS --\n"));
        assert!(contents[0].contains("returncode=0"));
        assert!(contents[0].contains("hello"));
        assert_eq!(contents[1], "NODE1: [i] SHELL PROCESS EXECUTED");
        assert!(contents[2].starts_with("NODE1: [!] shell execution failure\n"));
    }

    #[tokio::test]
    async fn test_system_off_requests_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let fx = Fixture::new(dir.path());

        assert_eq!(fx.user("$systemoff node2").await, CommandResult::Ignored);
        assert_eq!(fx.user("$systemoffall").await, CommandResult::Shutdown);
        assert_eq!(fx.contents(), vec!["NODE1: [i] SYSTEM SWITCHING OFF"]);
    }
}
