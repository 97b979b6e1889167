//! Reactor callback contract.
//!
//! The reactor (see [`crate::transport::Server`]) drives an [`EventHandler`]
//! through a fixed set of callbacks. Callbacks for one connection never run
//! concurrently with each other; callbacks for different connections and the
//! tick may run concurrently on different workers.
//!
//! Callbacks are synchronous and must return promptly. Socket I/O happens in
//! the reactor, outside the callbacks.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;
use crate::transport::{Codec, Connection};

// ============================================================================
// Action
// ============================================================================

/// What the reactor should do after a callback returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Action {
    /// Keep going.
    #[default]
    Continue,
    /// Close the connection the callback was invoked for.
    Close,
    /// Stop the whole server.
    Shutdown,
}

// ============================================================================
// EventHandler
// ============================================================================

/// Callbacks invoked by the reactor.
pub trait EventHandler: Send + Sync + 'static {
    /// The listener is bound and about to accept connections.
    fn on_boot(&self, _listen_addr: SocketAddr) -> Action {
        Action::Continue
    }

    /// A TCP connection was accepted. No data has been read yet.
    fn on_open(&self, connection: &Arc<Connection>) -> Action;

    /// The connection is gone. `error` is set when it ended abnormally.
    ///
    /// May be called more than once for the same connection. Returning
    /// [`Action::Shutdown`] stops the server.
    fn on_close(&self, connection: &Connection, error: Option<&Error>) -> Action;

    /// New bytes are buffered in `codec`.
    fn on_traffic(&self, connection: &Connection, codec: &mut dyn Codec) -> Action;

    /// Periodic timer. Returns the delay until the next tick.
    fn on_tick(&self) -> (Duration, Action);

    /// The server stopped accepting and all sessions have ended.
    fn on_shutdown(&self) {}
}
