//! Seams between the hub session and whatever carries it

use anyhow::Result;
use async_trait::async_trait;
use procfleet_shared::ChatMessage;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::response::Reply;

/// Byte stream carrying frames to and from the hub
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> TransportStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Opens sessions to the hub
#[async_trait]
pub trait TransportConnector: Send + Sync {
    type Stream: TransportStream;

    /// One connection attempt; retries and timeouts belong to the caller
    async fn connect(&self) -> Result<Self::Stream>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Delivers replies back to where a command came from
#[async_trait]
pub trait ReplySink: Send + Sync {
    /// Send `reply` in answer to `origin`
    async fn deliver(&self, origin: &ChatMessage, reply: Reply) -> Result<()>;
}
