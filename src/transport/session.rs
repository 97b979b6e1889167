//! Per-connection event loop.
//!
//! Each accepted socket gets one task that owns the socket and the codec and
//! serializes every callback for that connection:
//!
//! - socket readable → feed bytes into the codec, invoke `on_traffic`
//! - frame queued on the outbox → encode and write it
//! - close scheduled, or server shutting down → send a close frame and stop
//!
//! A scheduled close also interrupts a write stalled on a peer that stopped
//! reading. When the loop ends, the outbox is dropped (further sends fail) and
//! `on_close` runs exactly once from here.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::hub::{Action, EventHandler};

use super::codec::{Codec, WireBuffer, WsCodec};
use super::connection::Connection;
use super::server::ShutdownSignal;

// ============================================================================
// Constants
// ============================================================================

/// Bytes read from the socket per data-ready round.
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Upper bound for writing the final close frame.
const CLOSE_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// Session
// ============================================================================

/// Drives one connection from accept to close.
pub(crate) async fn run<H: EventHandler>(
    stream: TcpStream,
    remote_addr: SocketAddr,
    handler: Arc<H>,
    shutdown: ShutdownSignal,
    outbox_capacity: usize,
) {
    if let Err(e) = stream.set_nodelay(true) {
        trace!(error = %e, "Failed to set TCP_NODELAY");
    }

    let (connection, mut outbox) = Connection::with_capacity(remote_addr, outbox_capacity);

    match handler.on_open(&connection) {
        Action::Continue => {}
        action => {
            if action == Action::Shutdown {
                shutdown.trigger();
            }
            finish(handler.as_ref(), &connection, None, &shutdown);
            return;
        }
    }

    let wire = WireBuffer::new();
    let mut codec = WsCodec::new(wire.clone());
    let (mut reader, mut writer) = stream.into_split();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    let error: Option<Error> = loop {
        tokio::select! {
            // Data-ready
            read = reader.read(&mut buf) => {
                match read {
                    Ok(0) => {
                        debug!(conn = %connection.id(), "Socket reached EOF");
                        break None;
                    }

                    Ok(n) => {
                        wire.feed(&buf[..n]);
                        let action = handler.on_traffic(&connection, &mut codec);

                        // Handshake response, pongs, close replies
                        if let Err(e) = flush(&wire, &mut writer).await {
                            break Some(e);
                        }

                        match action {
                            Action::Continue => {}
                            Action::Close => break None,
                            Action::Shutdown => {
                                shutdown.trigger();
                                break None;
                            }
                        }
                    }

                    Err(e) => break Some(e.into()),
                }
            }

            // Frames from broadcasts
            queued = outbox.recv() => {
                let Some(frame) = queued else {
                    break None;
                };
                if let Err(e) = codec.write_message(&frame) {
                    break Some(e);
                }

                // A peer that stopped reading stalls here until closed
                tokio::select! {
                    written = flush(&wire, &mut writer) => {
                        if let Err(e) = written {
                            break Some(e);
                        }
                    }
                    () = connection.close_requested() => {
                        debug!(conn = %connection.id(), "Close requested during stalled write");
                        break None;
                    }
                    () = shutdown.triggered() => break None,
                }
            }

            () = connection.close_requested() => {
                debug!(conn = %connection.id(), "Close requested");
                close_gracefully(&mut codec, &wire, &mut writer).await;
                break None;
            }

            () = shutdown.triggered() => {
                close_gracefully(&mut codec, &wire, &mut writer).await;
                break None;
            }
        }
    };

    drop(outbox);
    let _ = writer.shutdown().await;

    finish(handler.as_ref(), &connection, error.as_ref(), &shutdown);
}

/// Runs the close callback and honors a shutdown request from it.
fn finish<H: EventHandler>(
    handler: &H,
    connection: &Connection,
    error: Option<&Error>,
    shutdown: &ShutdownSignal,
) {
    if handler.on_close(connection, error) == Action::Shutdown {
        shutdown.trigger();
    }
}

/// Writes whatever the codec produced to the socket.
async fn flush(wire: &WireBuffer, writer: &mut OwnedWriteHalf) -> Result<()> {
    let bytes = wire.take_outbound();
    if !bytes.is_empty() {
        writer.write_all(&bytes).await?;
    }
    Ok(())
}

/// Sends a close frame if the connection was upgraded. Errors are ignored,
/// the socket is going away either way.
async fn close_gracefully(codec: &mut WsCodec, wire: &WireBuffer, writer: &mut OwnedWriteHalf) {
    if let Err(e) = codec.close() {
        trace!(error = %e, "Close frame not sent");
    }
    if tokio::time::timeout(CLOSE_WRITE_TIMEOUT, flush(wire, writer))
        .await
        .is_err()
    {
        trace!("Close frame write timed out");
    }
}

// ============================================================================
// Tests
// ============================================================================
