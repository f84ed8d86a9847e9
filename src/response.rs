//! Identity-stamped replies
//!
//! Handlers build a [`Response`] without knowing who they are; the identity is
//! stamped in by [`Response::render`] right before delivery.

use procfleet_shared::Attachment;
use std::fmt;

use crate::identity::DeviceIdentity;

/// Which operation a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Startup,
    Shutdown,
    FileSend,
    FileFetch,
    ShellExecution,
    ShellProcess,
    StatusQuery,
    /// The reply could not be put on the wire
    Delivery,
    /// Reported in the host framework's own wording, without a headline
    Parse,
}

impl FailureKind {
    /// First line of a failure reply; `None` for parse failures
    pub fn headline(self) -> Option<&'static str> {
        let text = match self {
            FailureKind::Startup => "startup failure",
            FailureKind::Shutdown => "shutdown failure",
            FailureKind::FileSend => "file send failure",
            FailureKind::FileFetch => "file fetch failure",
            FailureKind::ShellExecution => "shell execution failure",
            FailureKind::ShellProcess => "shell process execution failure",
            FailureKind::StatusQuery => "status query failure",
            FailureKind::Delivery => "reply delivery failure",
            FailureKind::Parse => return None,
        };
        Some(text)
    }
}

/// Tone marker shown after the identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Success,
    Failure(FailureKind),
}

impl Tone {
    fn marker(&self) -> &'static str {
        match self {
            Tone::Info => "[i]",
            Tone::Success => "[*]",
            Tone::Failure(_) => "[!]",
        }
    }
}

/// Reply template, not yet bound to an identity
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    tone: Tone,
    text: String,
    echo: bool,
    files: Vec<Attachment>,
}

impl Response {
    pub fn info(text: impl Into<String>) -> Self {
        Self::new(Tone::Info, text.into())
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::new(Tone::Success, text.into())
    }

    /// Failure of `kind`, followed by a short diagnostic line
    pub fn failure(kind: FailureKind, diagnostic: impl fmt::Display) -> Self {
        let text = match kind.headline() {
            Some(headline) => format!("{headline}\n{diagnostic}"),
            None => diagnostic.to_string(),
        };
        Self::new(Tone::Failure(kind), text)
    }

    fn new(tone: Tone, text: String) -> Self {
        Self {
            tone,
            text,
            echo: true,
            files: Vec::new(),
        }
    }

    /// Suppress the echo of the originating command
    pub fn no_cmd(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn with_files(mut self, files: Vec<Attachment>) -> Self {
        self.files = files;
        self
    }

    #[cfg(test)]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self.tone {
            Tone::Failure(kind) => Some(kind),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn echo(&self) -> bool {
        self.echo
    }

    /// Bind the template to `identity`, producing what goes on the wire
    pub fn render(self, identity: &DeviceIdentity) -> Reply {
        let content = match self.tone {
            Tone::Failure(kind) if kind.headline().is_none() => {
                format!("{identity}: {}", self.text)
            }
            tone => format!("{identity}: {} {}", tone.marker(), self.text),
        };
        Reply {
            content,
            files: self.files,
            echo: self.echo,
        }
    }
}

/// A rendered reply ready for the transport
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub content: String,
    pub files: Vec<Attachment>,
    /// Whether the delivered message should reference the originating command
    pub echo: bool,
}
