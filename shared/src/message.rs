//! Control channel message types
//!
//! Clients open a session with [`Frame::Hello`], submit [`Post`]s, and receive
//! every post the hub accepted as a [`ChatMessage`] (their own included).

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::now_ms;

/// Who is on the other end of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorKind {
    /// A human typing commands
    User,
    /// An automated peer (another instance, a script, a webhook)
    Bot,
}

/// Message author as stamped by the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub kind: AuthorKind,
}

impl Author {
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AuthorKind::User,
        }
    }

    pub fn bot(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AuthorKind::Bot,
        }
    }

    pub fn is_bot(&self) -> bool {
        self.kind == AuthorKind::Bot
    }
}

/// A file carried inline with a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    #[serde(with = "base64_bytes")]
    pub data: Bytes,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Echo of the message a reply answers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReference {
    pub message_id: u64,
    pub content: String,
}

impl MessageReference {
    pub fn to(message: &ChatMessage) -> Self {
        Self {
            message_id: message.id,
            content: message.content.clone(),
        }
    }
}

/// Client submission, before the hub has stamped it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<MessageReference>,
}

impl Post {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// A post as delivered by the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub author: Author,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<MessageReference>,
    pub timestamp_ms: u64,
}

impl ChatMessage {
    /// Stamp a post with its hub-assigned id and author
    pub fn from_post(id: u64, author: Author, post: Post) -> Self {
        Self {
            id,
            author,
            content: post.content,
            attachments: post.attachments,
            reference: post.reference,
            timestamp_ms: now_ms(),
        }
    }
}

/// Everything that travels on a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// First frame of every session, client to hub
    Hello { name: String, kind: AuthorKind },
    /// Client to hub
    Post(Post),
    /// Hub to client
    Message(ChatMessage),
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
