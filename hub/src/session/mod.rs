//! Session management for connected chat clients
//!
//! This module handles:
//! - The hello handshake that names a client
//! - Tracking every live session
//! - Stamping posts into messages and fanning them out

mod connection;
mod manager;

pub use connection::ClientSession;
pub use manager::{SessionManager, DEFAULT_QUEUE_DEPTH};
