//! Process-wide registry of live connections.
//!
//! Keyed by [`ConnectionId`]. Membership only changes from the open and close
//! callbacks; the data and tick paths only read it.
//!
//! # Locking
//!
//! A broadcast clones the member list under the read lock and delivers after
//! releasing it, so a slow fan-out never blocks open/close on other workers.
//! Delivery itself only enqueues onto each connection's channel.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{trace, warn};

use crate::config::FanoutPolicy;
use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::protocol::Frame;
use crate::transport::Connection;

// ============================================================================
// Types
// ============================================================================

/// Map of connection IDs to live connections.
type ConnectionMap = FxHashMap<ConnectionId, Arc<Connection>>;

// ============================================================================
// ConnectionRegistry
// ============================================================================

/// Set of live connections with fan-out.
///
/// Thread-safe, shared by every worker and the ticker.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<ConnectionMap>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LifecycleViolation`] if the connection is already
    /// tracked.
    pub fn track(&self, connection: &Arc<Connection>) -> Result<()> {
        let mut connections = self.connections.write();
        if connections.contains_key(&connection.id()) {
            return Err(Error::lifecycle_violation(format!(
                "connection {} tracked twice",
                connection.id()
            )));
        }

        connections.insert(connection.id(), Arc::clone(connection));
        Ok(())
    }

    /// Removes a connection.
    ///
    /// Returns `false` if it was not tracked; duplicate close notifications
    /// are expected and harmless.
    pub fn untrack(&self, id: ConnectionId) -> bool {
        self.connections.write().remove(&id).is_some()
    }

    /// Returns `true` if the connection is tracked.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().contains_key(&id)
    }

    /// Returns the number of tracked connections.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Returns `true` if nothing is tracked.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Returns the current members.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Sends `frame` to every upgraded connection.
    ///
    /// Connections still in the handshake phase, already closing, or equal to
    /// `exclude` are skipped. Every connection whose delivery fails is
    /// scheduled for close.
    ///
    /// Returns the number of connections the frame was queued for.
    ///
    /// # Errors
    ///
    /// - [`Error::Delivery`] on the first failure with
    ///   [`FanoutPolicy::ShortCircuit`]
    /// - [`Error::PartialDelivery`] listing all failures with
    ///   [`FanoutPolicy::BestEffort`]
    pub fn broadcast(
        &self,
        frame: &Frame,
        policy: FanoutPolicy,
        exclude: Option<ConnectionId>,
    ) -> Result<usize> {
        let mut delivered = 0;
        let mut failed = Vec::new();

        for connection in self.snapshot() {
            if exclude == Some(connection.id())
                || !connection.is_upgraded()
                || connection.is_closing()
            {
                continue;
            }

            match connection.send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        conn = %connection.id(),
                        remote = %connection.remote_addr(),
                        error = %e,
                        "Delivery failed, closing connection"
                    );
                    connection.schedule_close();

                    match policy {
                        FanoutPolicy::ShortCircuit => return Err(e),
                        FanoutPolicy::BestEffort => failed.push(connection.id()),
                    }
                }
            }
        }

        trace!(delivered, failed = failed.len(), kind = %frame.kind(), "Broadcast done");

        if failed.is_empty() {
            Ok(delivered)
        } else {
            Err(Error::partial_delivery(failed, delivered))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
