//! Individual client session handling

use anyhow::{anyhow, bail, Result};
use bytes::Bytes;
use procfleet_shared::{codec::FrameDecoder, defaults, Author, Frame};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// Handle to queue frames for a specific client
///
/// Frames are written by a per-session task, so queueing never waits on the
/// client's socket.
#[derive(Clone)]
pub struct SessionHandle {
    pub session_id: u64,
    pub author: Author,
    pub addr: SocketAddr,
    outbound: mpsc::Sender<Bytes>,
    writer: AbortHandle,
}

impl SessionHandle {
    /// Queue an encoded frame without waiting
    pub fn try_send(&self, encoded: Bytes) -> Result<(), TrySendError<Bytes>> {
        self.outbound.try_send(encoded)
    }

    /// Stop writing to this client; [`SessionHandle::closed`] resolves after
    pub fn evict(&self) {
        self.writer.abort();
    }

    /// Resolves once the writer task has ended
    pub async fn closed(&self) {
        self.outbound.closed().await
    }
}

/// Active client session
pub struct ClientSession {
    handle: SessionHandle,
    reader: ReadHalf<TcpStream>,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
}

impl ClientSession {
    /// Wait for the client's hello and build the session from it
    ///
    /// Any other first frame ends the session. At most `queue_depth` frames
    /// wait for the client before [`SessionHandle::try_send`] reports it full.
    pub async fn accept(
        stream: TcpStream,
        addr: SocketAddr,
        session_id: u64,
        queue_depth: usize,
    ) -> Result<Self> {
        let (mut reader, writer) = tokio::io::split(stream);
        let mut decoder = FrameDecoder::new();
        let mut read_buf = vec![0u8; defaults::READ_BUFFER_SIZE];

        let first = loop {
            if let Some(frame) = decoder.decode_next()? {
                break frame;
            }
            let n = reader.read(&mut read_buf).await?;
            if n == 0 {
                bail!("{} closed before hello", addr);
            }
            decoder.extend(&read_buf[..n]);
        };

        let author = match first {
            Frame::Hello { name, kind } if !name.trim().is_empty() => Author { name, kind },
            Frame::Hello { .. } => bail!("{} sent an empty name", addr),
            other => return Err(anyhow!("{} sent {:?} before hello", addr, other)),
        };

        let (outbound, outbound_rx) = mpsc::channel(queue_depth.max(1));
        let writer = tokio::spawn(write_loop(writer, outbound_rx, addr)).abort_handle();

        Ok(Self {
            handle: SessionHandle {
                session_id,
                author,
                addr,
                outbound,
                writer,
            },
            reader,
            decoder,
            read_buf,
        })
    }

    /// Get a cloneable handle for sending frames
    pub fn get_handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn author(&self) -> &Author {
        &self.handle.author
    }

    /// Read the next frame from this session
    /// Returns None if the connection is closed or sent garbage
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            match self.decoder.decode_next() {
                Ok(Some(frame)) => return Some(frame),
                Ok(None) => {}
                Err(e) => {
                    warn!(addr = %self.handle.addr, "decode error: {}", e);
                    return None;
                }
            }

            match self.reader.read(&mut self.read_buf).await {
                Ok(0) => return None,
                Ok(n) => self.decoder.extend(&self.read_buf[..n]),
                Err(e) => {
                    warn!(addr = %self.handle.addr, "read error: {}", e);
                    return None;
                }
            }
        }
    }
}

/// Drain queued frames onto the socket until every handle is gone
async fn write_loop(
    mut writer: WriteHalf<TcpStream>,
    mut outbound: mpsc::Receiver<Bytes>,
    addr: SocketAddr,
) {
    while let Some(encoded) = outbound.recv().await {
        if let Err(e) = writer.write_all(&encoded).await {
            warn!(%addr, "write error: {}", e);
            return;
        }
    }
    debug!(%addr, "writer finished");
    let _ = writer.shutdown().await;
}
