//! Broadcast hub: relays every inbound message to all connections.
//!
//! # Connection States
//!
//! ```text
//!  open ──► Connecting ──handshake ok──► Ready ──message──► Ready (broadcast)
//!               │                          │
//!               └─handshake failed─┐       └─malformed / peer close─┐
//!                                  ▼                                 ▼
//!                                Closed ◄──────── close callback ────┘
//! ```
//!
//! Independently of any connection, the tick broadcasts a fixed system
//! message and logs the connection count.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::HubConfig;
use crate::error::{Error, Result};
use crate::protocol::Frame;
use crate::transport::{Codec, Connection, Handshake};

use super::event::{Action, EventHandler};
use super::registry::ConnectionRegistry;

// ============================================================================
// BroadcastHub
// ============================================================================

/// Many-to-many fan-out over WebSocket.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use wshub::{BroadcastHub, HubConfig, Server, ServerConfig};
///
/// let hub = Arc::new(BroadcastHub::new(HubConfig::default()));
/// let server = Server::bind(ServerConfig::default()).await?;
/// server.run(hub, async { let _ = tokio::signal::ctrl_c().await; }).await?;
/// ```
#[derive(Debug)]
pub struct BroadcastHub {
    /// Broadcast policy.
    config: HubConfig,
    /// Live connections.
    registry: ConnectionRegistry,
    /// Open connections, maintained alongside the registry.
    connected: AtomicI64,
    /// Periodic system message, built once.
    system_frame: Frame,
    /// Recorded on boot.
    listen_addr: OnceLock<SocketAddr>,
}

impl BroadcastHub {
    /// Creates a hub with no connections.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        let system_frame = Frame::text(config.system_message.clone());

        Self {
            config,
            registry: ConnectionRegistry::new(),
            connected: AtomicI64::new(0),
            system_frame,
            listen_addr: OnceLock::new(),
        }
    }

    /// Returns the hub configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Returns the connection registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Returns the number of open connections.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> i64 {
        self.connected.load(Ordering::Acquire)
    }

    /// Returns the address recorded by `on_boot`.
    #[inline]
    #[must_use]
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listen_addr.get().copied()
    }

    /// Relays a message from `sender` to every tracked connection.
    ///
    /// The sender is included unless `echo_to_sender` is disabled.
    ///
    /// # Errors
    ///
    /// Returns the fan-out error of [`ConnectionRegistry::broadcast`].
    pub fn relay(&self, sender: &Connection, frame: &Frame) -> Result<usize> {
        let exclude = (!self.config.echo_to_sender).then(|| sender.id());
        self.registry.broadcast(frame, self.config.fanout, exclude)
    }

    /// Sends the system message to every tracked connection.
    ///
    /// # Errors
    ///
    /// Returns the fan-out error of [`ConnectionRegistry::broadcast`].
    pub fn broadcast_system_message(&self) -> Result<usize> {
        self.registry
            .broadcast(&self.system_frame, self.config.fanout, None)
    }

    /// Handshake phase of a data-ready callback. One attempt per call.
    fn upgrade(&self, connection: &Connection, codec: &mut dyn Codec) -> Action {
        info!(
            conn = %connection.id(),
            remote = %connection.remote_addr(),
            "Upgrading to WebSocket"
        );

        match codec.upgrade() {
            Ok(Handshake::Complete) => {
                connection.state().mark_upgraded();
                debug!(conn = %connection.id(), "WebSocket upgrade complete");
                Action::Continue
            }
            Ok(Handshake::Incomplete) => {
                debug!(conn = %connection.id(), "Upgrade request incomplete, waiting");
                Action::Continue
            }
            Err(e) => {
                warn!(
                    conn = %connection.id(),
                    remote = %connection.remote_addr(),
                    error = %e,
                    "WebSocket upgrade failed"
                );
                Action::Close
            }
        }
    }

    /// Ready phase of a data-ready callback. Drains every complete message.
    fn relay_inbound(&self, connection: &Connection, codec: &mut dyn Codec) -> Action {
        loop {
            let frame = match codec.read_message() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Action::Continue,
                Err(e) if e.is_clean_close() => {
                    debug!(conn = %connection.id(), "Closed by peer");
                    return Action::Close;
                }
                Err(e) => {
                    warn!(
                        conn = %connection.id(),
                        remote = %connection.remote_addr(),
                        error = %e,
                        "Malformed message"
                    );
                    return Action::Close;
                }
            };

            info!(
                conn = %connection.id(),
                remote = %connection.remote_addr(),
                kind = %frame.kind(),
                msg = %frame,
                "Message received"
            );

            if let Err(e) = self.relay(connection, &frame) {
                warn!(conn = %connection.id(), error = %e, "Broadcast incomplete");
                if e.failed_connections().contains(&connection.id()) {
                    return Action::Close;
                }
            }
        }
    }
}

// ============================================================================
// BroadcastHub - Event Handlers
// ============================================================================

impl EventHandler for BroadcastHub {
    fn on_boot(&self, listen_addr: SocketAddr) -> Action {
        if self.listen_addr.set(listen_addr).is_err() {
            warn!(%listen_addr, "Hub booted twice, keeping first address");
        }
        info!("Broadcast hub listening on tcp://{listen_addr}");
        Action::Continue
    }

    fn on_open(&self, connection: &Arc<Connection>) -> Action {
        if let Err(e) = self.registry.track(connection) {
            error!(conn = %connection.id(), error = %e, "Connection already tracked");
            return Action::Close;
        }
        self.connected.fetch_add(1, Ordering::AcqRel);

        debug!(
            conn = %connection.id(),
            remote = %connection.remote_addr(),
            "Connection opened"
        );
        Action::Continue
    }

    fn on_close(&self, connection: &Connection, error: Option<&Error>) -> Action {
        if let Some(e) = error {
            warn!(
                conn = %connection.id(),
                remote = %connection.remote_addr(),
                error = %e,
                "Connection error"
            );
        }

        if self.registry.untrack(connection.id()) {
            self.connected.fetch_sub(1, Ordering::AcqRel);
            info!(
                conn = %connection.id(),
                remote = %connection.remote_addr(),
                "Connection closed"
            );
        }

        Action::Continue
    }

    fn on_traffic(&self, connection: &Connection, codec: &mut dyn Codec) -> Action {
        if connection.is_upgraded() {
            self.relay_inbound(connection, codec)
        } else {
            self.upgrade(connection, codec)
        }
    }

    fn on_tick(&self) -> (Duration, Action) {
        info!(connected = self.connection_count(), "Tick");

        if let Err(e) = self.broadcast_system_message() {
            warn!(error = %e, "System broadcast incomplete");
        }

        (self.config.tick_interval, Action::Continue)
    }

    fn on_shutdown(&self) {
        info!(connected = self.connection_count(), "Broadcast hub stopped");
    }
}

// ============================================================================
// Tests
// ============================================================================
