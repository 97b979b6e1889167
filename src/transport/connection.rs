//! Connection handle shared between the hub and a session task.
//!
//! The session task owns the socket and the codec. Everyone else holds an
//! `Arc<Connection>` and talks to the socket through a bounded frame queue,
//! so a broadcast running on any worker never touches another worker's
//! socket directly.
//!
//! # Delivery
//!
//! [`Connection::send`] enqueues a frame and returns immediately. It fails
//! when the queue is full (the peer is not keeping up) or once the session
//! task has dropped its [`Outbox`].
//!
//! # Closing
//!
//! A close request bypasses the queue: [`Connection::schedule_close`] sets a
//! flag and wakes the session through [`Connection::close_requested`], even
//! while frames are still pending or a write is stalled.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

use crate::config::DEFAULT_OUTBOX_CAPACITY;
use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::protocol::{Frame, ProtocolState};

// ============================================================================
// Types
// ============================================================================

/// Receiving half of a connection's frame queue, owned by its session.
pub type Outbox = mpsc::Receiver<Frame>;

// ============================================================================
// Connection
// ============================================================================

/// One live client connection.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync`. All methods are non-blocking.
#[derive(Debug)]
pub struct Connection {
    /// Stable identity, used as registry key.
    id: ConnectionId,
    /// Peer address, for diagnostics only.
    remote_addr: SocketAddr,
    /// Handshake-pending vs upgraded.
    state: ProtocolState,
    /// Set once a close has been scheduled.
    closing: AtomicBool,
    /// Wakes the session when a close is scheduled.
    close_notify: Notify,
    /// Frame queue to the owning session task.
    frame_tx: mpsc::Sender<Frame>,
}

impl Connection {
    /// Creates a connection handle with the default queue capacity.
    ///
    /// The protocol state starts in the handshake phase.
    #[must_use]
    pub fn new(remote_addr: SocketAddr) -> (Arc<Self>, Outbox) {
        Self::with_capacity(remote_addr, DEFAULT_OUTBOX_CAPACITY)
    }

    /// Creates a connection handle whose queue holds at most `capacity`
    /// frames (at least one).
    #[must_use]
    pub fn with_capacity(remote_addr: SocketAddr, capacity: usize) -> (Arc<Self>, Outbox) {
        let (frame_tx, frame_rx) = mpsc::channel(capacity.max(1));

        let connection = Arc::new(Self {
            id: ConnectionId::next(),
            remote_addr,
            state: ProtocolState::new(),
            closing: AtomicBool::new(false),
            close_notify: Notify::new(),
            frame_tx,
        });

        (connection, frame_rx)
    }

    /// Returns the connection ID.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the peer address.
    #[inline]
    #[must_use]
    pub const fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Returns the protocol state tracker.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> &ProtocolState {
        &self.state
    }

    /// Returns `true` once the WebSocket handshake has completed.
    #[inline]
    #[must_use]
    pub fn is_upgraded(&self) -> bool {
        self.state.is_upgraded()
    }

    /// Returns `true` once a close has been scheduled.
    #[inline]
    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Queues a frame for writing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Delivery`] if the queue is full or the session has
    /// already ended.
    pub fn send(&self, frame: Frame) -> Result<()> {
        self.frame_tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => Error::delivery(self.id, "outbound queue full"),
            TrySendError::Closed(_) => Error::delivery(self.id, "connection closed"),
        })?;

        trace!(conn = %self.id, "Frame queued");
        Ok(())
    }

    /// Asks the owning session to close the connection.
    ///
    /// Idempotent. Frames still queued are discarded. The registry entry is
    /// removed later by the close callback.
    pub fn schedule_close(&self) {
        if !self.closing.swap(true, Ordering::AcqRel) {
            self.close_notify.notify_one();
            trace!(conn = %self.id, "Close scheduled");
        }
    }

    /// Resolves once a close has been scheduled.
    pub async fn close_requested(&self) {
        if self.is_closing() {
            return;
        }
        self.close_notify.notified().await;
    }
}

// ============================================================================
// Tests
// ============================================================================
