//! Session manager for tracking all connected clients

use super::connection::SessionHandle;
use procfleet_shared::{codec, Author, ChatMessage, Frame, Post};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Frames a client may fall behind by before it is disconnected
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Manages all active client sessions
pub struct SessionManager {
    /// Map of session_id -> session handle
    sessions: RwLock<HashMap<u64, SessionHandle>>,
    session_id: AtomicU64,
    message_id: AtomicU64,
    queue_depth: usize,
}

impl SessionManager {
    /// Create a session manager whose clients may fall `queue_depth` frames behind
    pub fn with_queue_depth(queue_depth: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            session_id: AtomicU64::new(0),
            message_id: AtomicU64::new(0),
            queue_depth,
        }
    }

    /// Outbound queue size for new sessions
    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    /// Get the next session ID
    pub fn next_session_id(&self) -> u64 {
        self.session_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Register a client session
    pub async fn register(&self, handle: SessionHandle) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(handle.session_id, handle);
    }

    /// Unregister a client session
    pub async fn unregister(&self, session_id: u64) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&session_id);
    }

    /// Stamp `post` with the next message id and send it to every session,
    /// the author's included
    pub async fn publish(&self, author: Author, post: Post) -> ChatMessage {
        let id = self.message_id.fetch_add(1, Ordering::SeqCst) + 1;
        let message = ChatMessage::from_post(id, author, post);
        self.broadcast(&Frame::Message(message.clone())).await;
        message
    }

    /// Broadcast a frame to all connected clients
    ///
    /// Never waits on a client. A session whose queue is full is removed and
    /// its connection closed.
    pub async fn broadcast(&self, frame: &Frame) {
        let encoded = match codec::encode(frame) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("dropping broadcast: {}", e);
                return;
            }
        };

        let mut stalled = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for (session_id, handle) in sessions.iter() {
                match handle.try_send(encoded.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(
                            session_id,
                            name = %handle.author.name,
                            addr = %handle.addr,
                            "client is not keeping up, disconnecting"
                        );
                        stalled.push(*session_id);
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(session_id, "skipping closed session");
                    }
                }
            }
        }

        if !stalled.is_empty() {
            let mut sessions = self.sessions.write().await;
            for session_id in stalled {
                if let Some(handle) = sessions.remove(&session_id) {
                    handle.evict();
                }
            }
        }
    }

    /// Names of every connected client
    pub async fn connected_names(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        sessions.values().map(|h| h.author.name.clone()).collect()
    }

    /// Get the number of connected clients
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::with_queue_depth(DEFAULT_QUEUE_DEPTH)
    }
}
