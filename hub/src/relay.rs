//! Accept loop and per-client relay

use anyhow::Result;
use procfleet_shared::Frame;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::session::{ClientSession, SessionManager};

/// Accept clients forever, one task per connection
pub async fn serve(listener: TcpListener, sessions: Arc<SessionManager>) -> Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        debug!(%addr, "connection accepted");

        let sessions = sessions.clone();
        tokio::spawn(async move {
            handle_client(stream, addr, sessions).await;
        });
    }
}

async fn handle_client(stream: TcpStream, addr: SocketAddr, sessions: Arc<SessionManager>) {
    let session_id = sessions.next_session_id();
    let mut session =
        match ClientSession::accept(stream, addr, session_id, sessions.queue_depth()).await {
            Ok(session) => session,
            Err(e) => {
                warn!(%addr, "handshake failed: {:#}", e);
                return;
            }
        };

    let author = session.author().clone();
    let handle = session.get_handle();
    sessions.register(handle.clone()).await;
    let online = sessions.count().await;
    info!(
        session_id,
        %addr,
        name = %author.name,
        kind = ?author.kind,
        online,
        "client joined"
    );

    loop {
        tokio::select! {
            frame = session.recv() => match frame {
                Some(Frame::Post(post)) => {
                    let message = sessions.publish(author.clone(), post).await;
                    debug!(id = message.id, from = %author.name, "relayed: {}", message.content);
                }
                Some(other) => warn!(session_id, "ignoring {:?} from {}", other, author.name),
                None => break,
            },
            _ = handle.closed() => {
                debug!(session_id, "writer closed");
                break;
            }
        }
    }

    sessions.unregister(session_id).await;
    let online = sessions.connected_names().await;
    info!(session_id, name = %author.name, ?online, "client left");
}
