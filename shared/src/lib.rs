//! procfleet Shared Protocol Types
//!
//! This crate provides the wire types and codec used between fleet instances,
//! the hub that relays the control channel, and operator clients.

pub mod codec;
pub mod message;

use std::time::{SystemTime, UNIX_EPOCH};

pub use message::{Attachment, Author, AuthorKind, ChatMessage, Frame, MessageReference, Post};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Defaults shared by every binary in the workspace
pub mod defaults {
    /// Address the hub listens on and clients connect to
    pub const HUB_ADDRESS: &str = "127.0.0.1:7400";

    /// Prefix marking a line as a command
    pub const COMMAND_PREFIX: &str = "$";

    /// Read buffer size for socket reads
    pub const READ_BUFFER_SIZE: usize = 8192;
}
