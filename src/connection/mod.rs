//! Connection management for the hub session
//!
//! This module handles:
//! - A persistent hub connection with automatic reconnection
//! - Bidirectional frame streaming
//! - Posting replies back to the channel

mod manager;
mod sink;

pub use manager::{ConnectionConfig, ConnectionEvent, ConnectionManager};
pub use sink::HubReplySink;
