//! Operator client: posts one command line to the hub and prints what comes back

use anyhow::{bail, Context, Result};
use clap::Parser;
use procfleet_shared::{
    codec::{self, FrameDecoder},
    defaults, Attachment, AuthorKind, ChatMessage, Frame, Post,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "fleetctl", version, about = "Send a command line to every fleet instance")]
struct Cli {
    /// Hub address
    #[arg(long, env = "PROCFLEET_HUB", default_value = defaults::HUB_ADDRESS)]
    hub: String,

    /// Name shown as the author of the post
    #[arg(long, default_value = "operator")]
    name: String,

    /// Post as an automated peer (raw shell-quoted parsing on the instances)
    #[arg(long)]
    bot: bool,

    /// File to attach; repeatable
    #[arg(long = "attach", value_name = "FILE")]
    attachments: Vec<PathBuf>,

    /// Seconds to keep printing replies
    #[arg(long, default_value_t = 5)]
    wait: u64,

    /// Directory received attachments are written to
    #[arg(long, value_name = "DIR")]
    save_dir: Option<PathBuf>,

    /// The line to post, e.g. `$status` or `$getfiles node1 log.txt`
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    line: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .init();

    let cli = Cli::parse();

    let mut attachments = Vec::with_capacity(cli.attachments.len());
    for path in &cli.attachments {
        attachments.push(read_attachment(path).await?);
    }

    let kind = if cli.bot {
        AuthorKind::Bot
    } else {
        AuthorKind::User
    };
    let post = Post {
        content: cli.line.join(" "),
        attachments,
        reference: None,
    };

    let mut stream = TcpStream::connect(&cli.hub)
        .await
        .with_context(|| format!("connect to {}", cli.hub))?;
    stream
        .write_all(&codec::encode(&Frame::Hello {
            name: cli.name.clone(),
            kind,
        })?)
        .await?;
    stream.write_all(&codec::encode(&Frame::Post(post))?).await?;

    let deadline = Instant::now() + Duration::from_secs(cli.wait);
    let mut decoder = FrameDecoder::new();
    let mut read_buf = vec![0u8; defaults::READ_BUFFER_SIZE];

    loop {
        let n = match tokio::time::timeout_at(deadline, stream.read(&mut read_buf)).await {
            Err(_) => break,
            Ok(read) => read.context("read from hub")?,
        };
        if n == 0 {
            warn!("hub closed the connection");
            break;
        }
        decoder.extend(&read_buf[..n]);

        while let Some(frame) = decoder.decode_next()? {
            match frame {
                Frame::Message(message) => {
                    println!("{}", render(&message));
                    if let Some(dir) = &cli.save_dir {
                        for saved in save_attachments(dir, &message.attachments).await? {
                            println!("  saved {}", saved.display());
                        }
                    }
                }
                other => debug!("ignoring {:?}", other),
            }
        }
    }

    Ok(())
}

async fn read_attachment(path: &Path) -> Result<Attachment> {
    let Some(name) = path.file_name() else {
        bail!("{} does not name a file", path.display());
    };
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Attachment::new(name.to_string_lossy(), data))
}

/// One line per message, attachment names indented below it
fn render(message: &ChatMessage) -> String {
    let mut out = format!("[{}] {}: {}", message.id, message.author.name, message.content);
    if let Some(reference) = &message.reference {
        out.push_str(&format!("\n  (re #{}: {})", reference.message_id, reference.content));
    }
    for attachment in &message.attachments {
        out.push_str(&format!(
            "\n  + {} ({} bytes)",
            attachment.filename,
            attachment.len()
        ));
    }
    out
}

/// Write attachments under `dir` by bare name
async fn save_attachments(dir: &Path, attachments: &[Attachment]) -> Result<Vec<PathBuf>> {
    let mut saved = Vec::with_capacity(attachments.len());
    for attachment in attachments {
        let Some(name) = Path::new(&attachment.filename).file_name() else {
            warn!(filename = %attachment.filename, "skipping attachment without a name");
            continue;
        };
        let path = dir.join(name);
        tokio::fs::write(&path, &attachment.data)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        saved.push(path);
    }
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use procfleet_shared::{Author, MessageReference};

    #[test]
    fn test_cli_collects_trailing_line() {
        let cli = Cli::parse_from([
            "fleetctl", "--bot", "--attach", "a.txt", "--attach", "b.txt", "$shellall", "ls", "-la",
        ]);
        assert!(cli.bot);
        assert_eq!(cli.attachments.len(), 2);
        assert_eq!(cli.line.join(" "), "$shellall ls -la");
        assert_eq!(cli.hub, defaults::HUB_ADDRESS);
    }

    #[test]
    fn test_render_shows_reference_and_files() {
        let origin = ChatMessage::from_post(4, Author::user("operator"), Post::text("$gfa log.txt"));
        let post = Post {
            content: "NODE1: [*] file retrieved".into(),
            attachments: vec![Attachment::new("log.txt", &b"abc"[..])],
            reference: Some(MessageReference::to(&origin)),
        };
        let reply = ChatMessage::from_post(5, Author::bot("procfleet-NODE1"), post);

        assert_eq!(
            render(&reply),
            "[5] procfleet-NODE1: NODE1: [*] file retrieved\n  (re #4: $gfa log.txt)\n  + log.txt (3 bytes)"
        );
    }

    #[tokio::test]
    async fn test_attachments_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("report.txt");
        std::fs::write(&source, "all good").unwrap();

        let attachment = read_attachment(&source).await.unwrap();
        assert_eq!(attachment.filename, "report.txt");

        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();
        let saved = save_attachments(&out, &[attachment]).await.unwrap();
        assert_eq!(saved, vec![out.join("report.txt")]);
        assert_eq!(std::fs::read_to_string(&saved[0]).unwrap(), "all good");
    }
}
