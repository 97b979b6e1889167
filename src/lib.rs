//! wshub - Multi-core WebSocket broadcast hub.
//!
//! Every text or binary message received from one client is relayed to all
//! connected clients, and a fixed system message is broadcast to everyone on a
//! periodic tick.
//!
//! # Architecture
//!
//! The crate separates the event-driven reactor from the application logic:
//!
//! - **Reactor** ([`transport`]): accepts TCP connections on all cores, runs
//!   one session task per connection, buffers inbound bytes and writes
//!   outbound frames
//! - **Hub** ([`hub`]): implements [`EventHandler`]; tracks connections,
//!   keeps the live count, performs the WebSocket upgrade and fans messages out
//!
//! Key design principles:
//!
//! - Callbacks are synchronous; socket I/O never happens inside them
//! - A connection receives broadcasts only after its handshake completes
//! - A failed delivery schedules that connection for close
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use wshub::{BroadcastHub, HubConfig, Result, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let server = Server::bind(ServerConfig::new().with_port(9000)).await?;
//!     let hub = Arc::new(BroadcastHub::new(HubConfig::default()));
//!
//!     server
//!         .run(hub, async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | [`ServerConfig`] and [`HubConfig`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`hub`] | [`BroadcastHub`] and the [`EventHandler`] contract |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Message frames and handshake state |
//! | [`transport`] | Reactor, sessions and WebSocket codec |

// ============================================================================
// Modules
// ============================================================================

/// Server and hub configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Connection lifecycle and broadcast fan-out.
pub mod hub;

/// Type-safe identifiers.
pub mod identifiers;

/// Message frames and per-connection protocol state.
pub mod protocol;

/// TCP reactor and WebSocket framing.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::{FanoutPolicy, HubConfig, ServerConfig};

// Error types
pub use error::{Error, Result};

// Hub types
pub use hub::{Action, BroadcastHub, ConnectionRegistry, EventHandler};

// Identifier types
pub use identifiers::ConnectionId;

// Protocol types
pub use protocol::{Frame, MessageKind, ProtocolState};

// Transport types
pub use transport::{Codec, Connection, Handshake, Server, WsCodec};
