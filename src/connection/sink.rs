//! Reply delivery over the hub session

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use procfleet_shared::{ChatMessage, MessageReference, Post};
use tokio::sync::mpsc;

use crate::response::Reply;
use crate::transport::ReplySink;

/// Posts replies through the connection manager's outbound queue
#[derive(Clone)]
pub struct HubReplySink {
    outbound: mpsc::Sender<Post>,
}

impl HubReplySink {
    pub fn new(outbound: mpsc::Sender<Post>) -> Self {
        Self { outbound }
    }
}

#[async_trait]
impl ReplySink for HubReplySink {
    async fn deliver(&self, origin: &ChatMessage, reply: Reply) -> Result<()> {
        let post = Post {
            content: reply.content,
            attachments: reply.files,
            reference: reply.echo.then(|| MessageReference::to(origin)),
        };
        self.outbound
            .send(post)
            .await
            .map_err(|_| anyhow!("Connection closed"))
    }
}
