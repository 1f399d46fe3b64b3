//! Connection handling and broadcast for the relay.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use chat_core::tcp_transport::{TcpTransport, TcpWriter};
use chat_core::transport::{Frame, FrameReader, FrameWriter, Transport, TransportError};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Lines buffered per client before a slow reader starts missing messages.
const BROADCAST_CAPACITY: usize = 100;

/// Pause after an accept error that is not about a single aborted client,
/// typically running out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Fans every received line out to all connected clients.
pub struct ChatRelay {
    broadcast_tx: broadcast::Sender<String>,
}

impl ChatRelay {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { broadcast_tx }
    }

    /// Accept clients on `listener` forever. Accept errors are logged and
    /// retried.
    pub async fn serve(&self, listener: TcpListener) {
        loop {
            let (socket, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    let backoff = accept_backoff(&e);
                    tracing::warn!(error = %e, ?backoff, "Accept failed");
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            };
            tracing::info!(%addr, "Client connected");

            // Subscribe before spawning so the client sees everything
            // broadcast after its accept, including its own first line.
            let broadcast_tx = self.broadcast_tx.clone();
            let broadcast_rx = self.broadcast_tx.subscribe();

            tokio::spawn(async move {
                match handle_connection(socket, broadcast_tx, broadcast_rx).await {
                    Ok(()) => tracing::info!(%addr, "Client disconnected"),
                    Err(e) => tracing::warn!(%addr, error = %e, "Client connection error"),
                }
            });
        }
    }
}

impl Default for ChatRelay {
    fn default() -> Self {
        Self::new()
    }
}

/// Relay lines from one client and forward broadcasts back to it.
async fn handle_connection(
    socket: TcpStream,
    broadcast_tx: broadcast::Sender<String>,
    broadcast_rx: broadcast::Receiver<String>,
) -> Result<(), RelayError> {
    let addr = socket.peer_addr()?;
    let (mut reader, writer) = TcpTransport::from_stream(socket).split();

    let forward_handle = tokio::spawn(forward_broadcasts(writer, broadcast_rx, addr));

    let result: Result<(), RelayError> = loop {
        let text = match reader.read_frame().await {
            Ok(Frame::Line(text)) => text,
            Ok(Frame::End) => break Ok(()),
            Err(e) => break Err(e.into()),
        };
        if text.trim().is_empty() {
            continue;
        }
        tracing::debug!(%addr, line = %text, "Relaying");
        // No receivers only means nobody is listening right now.
        let _ = broadcast_tx.send(text);
    };

    forward_handle.abort();
    result
}

/// How long to wait before the next accept after `e`.
fn accept_backoff(e: &io::Error) -> Duration {
    match e.kind() {
        // The failed handshake belonged to one client; the next one is fine.
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::Interrupted => Duration::ZERO,
        _ => ACCEPT_BACKOFF,
    }
}

async fn forward_broadcasts(
    mut writer: TcpWriter,
    mut broadcast_rx: broadcast::Receiver<String>,
    addr: SocketAddr,
) {
    loop {
        match broadcast_rx.recv().await {
            Ok(text) => {
                if writer.write_frame(&text).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(%addr, skipped, "Client fell behind; lines dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
