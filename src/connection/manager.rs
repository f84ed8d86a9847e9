//! Connection manager with a persistent hub session and automatic reconnection

use anyhow::{anyhow, Result};
use bytes::Bytes;
use procfleet_shared::{
    codec::{self, CodecError, FrameDecoder},
    defaults, AuthorKind, ChatMessage, Frame, Post,
};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::HubConfig;
use crate::identity::DeviceIdentity;
use crate::response::{FailureKind, Response};
use crate::transport::{TcpConnector, TransportConnector, TransportStream};

/// Events emitted by the connection manager
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Session with the hub established
    Connected { transport: &'static str },
    /// Session lost; a reconnect is scheduled
    Disconnected { reason: String },
    /// A message relayed by the hub
    Received(ChatMessage),
    /// A connection attempt failed
    ConnectionFailed { reason: String },
}

/// Configuration for connection manager
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Stamped on the notice that replaces a post too large to send
    pub identity: DeviceIdentity,
    /// Name announced to the hub; every message we post carries it
    pub chat_name: String,
    pub hub_address: String,
    /// Reconnection delay (initial)
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay
    pub max_reconnect_delay: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(identity: &DeviceIdentity, hub: &HubConfig) -> Self {
        Self {
            identity: identity.clone(),
            chat_name: identity.chat_name(),
            hub_address: hub.address.clone(),
            reconnect_delay: hub.reconnect_delay(),
            max_reconnect_delay: hub.max_reconnect_delay(),
            connect_timeout: hub.connect_timeout(),
        }
    }
}

/// Manages the hub session in a background task
pub struct ConnectionManager {
    /// Channel to send posts to the hub
    outbound_tx: mpsc::Sender<Post>,
    /// Channel to receive connection events
    event_rx: mpsc::Receiver<ConnectionEvent>,
    task: JoinHandle<()>,
}

impl ConnectionManager {
    /// Create a new connection manager and start the connection loop
    pub fn new(config: ConnectionConfig) -> Self {
        let connector = TcpConnector::new(config.hub_address.clone());
        Self::with_connector(connector, config)
    }

    /// Same as [`ConnectionManager::new`] over any transport
    pub fn with_connector<C>(connector: C, config: ConnectionConfig) -> Self
    where
        C: TransportConnector + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::channel::<Post>(100);
        let (event_tx, event_rx) = mpsc::channel::<ConnectionEvent>(100);

        let task = tokio::spawn(async move {
            connection_loop(connector, config, outbound_rx, event_tx).await;
        });

        Self {
            outbound_tx,
            event_rx,
            task,
        }
    }

    /// Receive the next connection event
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.event_rx.recv().await
    }

    /// Get a clone of the sender for outbound posts
    pub fn get_sender(&self) -> mpsc::Sender<Post> {
        self.outbound_tx.clone()
    }

    /// Flush queued posts, then end the session
    ///
    /// Completes once every other sender handed out by
    /// [`ConnectionManager::get_sender`] has been dropped too.
    pub async fn finish(self) {
        let Self {
            outbound_tx,
            event_rx,
            task,
        } = self;
        drop(outbound_tx);
        drop(event_rx);
        let _ = task.await;
    }
}

/// Main connection loop with reconnection logic
async fn connection_loop<C: TransportConnector>(
    connector: C,
    config: ConnectionConfig,
    mut outbound_rx: mpsc::Receiver<Post>,
    event_tx: mpsc::Sender<ConnectionEvent>,
) {
    let mut reconnect_delay = config.reconnect_delay;

    loop {
        match timeout(config.connect_timeout, connector.connect()).await {
            Ok(Ok(stream)) => {
                reconnect_delay = config.reconnect_delay;

                let announced = event_tx
                    .send(ConnectionEvent::Connected {
                        transport: connector.name(),
                    })
                    .await;
                if announced.is_err() {
                    return;
                }

                match handle_connection(stream, &config, &mut outbound_rx, &event_tx).await {
                    // Manager went away
                    Ok(()) => return,
                    Err(reason) => {
                        let _ = event_tx
                            .send(ConnectionEvent::Disconnected {
                                reason: reason.to_string(),
                            })
                            .await;
                    }
                }
            }
            Ok(Err(e)) => {
                let _ = event_tx
                    .send(ConnectionEvent::ConnectionFailed {
                        reason: e.to_string(),
                    })
                    .await;
            }
            Err(_) => {
                let _ = event_tx
                    .send(ConnectionEvent::ConnectionFailed {
                        reason: format!("timed out after {:?}", config.connect_timeout),
                    })
                    .await;
            }
        }

        if event_tx.is_closed() {
            return;
        }

        debug!(delay = ?reconnect_delay, "reconnecting to hub");
        tokio::time::sleep(reconnect_delay).await;

        // Exponential backoff
        reconnect_delay = std::cmp::min(reconnect_delay * 2, config.max_reconnect_delay);
    }
}

/// Drive one hub session until it fails or the manager is dropped
///
/// Returns `Ok(())` only when the manager side has gone away.
async fn handle_connection<S: TransportStream>(
    stream: S,
    config: &ConnectionConfig,
    outbound_rx: &mut mpsc::Receiver<Post>,
    event_tx: &mpsc::Sender<ConnectionEvent>,
) -> Result<()> {
    let (mut reader, mut writer) = tokio::io::split(stream);

    let hello = Frame::Hello {
        name: config.chat_name.clone(),
        kind: AuthorKind::Bot,
    };
    writer.write_all(&codec::encode(&hello)?).await?;

    let mut decoder = FrameDecoder::new();
    let mut read_buf = vec![0u8; defaults::READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                let Some(post) = outbound else {
                    return Ok(());
                };
                writer.write_all(&encode_post(post, &config.identity)?).await?;
            }

            read = reader.read(&mut read_buf) => {
                let n = read.map_err(|e| anyhow!("Read error: {}", e))?;
                if n == 0 {
                    return Err(anyhow!("Hub closed connection"));
                }
                decoder.extend(&read_buf[..n]);

                while let Some(frame) = decoder.decode_next()? {
                    match frame {
                        Frame::Message(message) => {
                            if event_tx.send(ConnectionEvent::Received(message)).await.is_err() {
                                return Ok(());
                            }
                        }
                        other => warn!("unexpected frame from hub: {:?}", other),
                    }
                }
            }
        }
    }
}

/// Encode `post`, or a failure notice in its place when it cannot be framed
fn encode_post(post: Post, identity: &DeviceIdentity) -> Result<Bytes, CodecError> {
    let reference = post.reference.clone();
    match codec::encode(&Frame::Post(post)) {
        Ok(encoded) => Ok(encoded),
        Err(e) => {
            warn!("outbound post not sent: {}", e);
            let notice = Response::failure(FailureKind::Delivery, e).render(identity);
            codec::encode(&Frame::Post(Post {
                content: notice.content,
                attachments: Vec::new(),
                reference,
            }))
        }
    }
}
