//! TCP reactor and WebSocket framing.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────── Server ────────────┐
//!  clients ─────► │ accept loop (one per acceptor) │
//!                 └───────────────┬────────────────┘
//!                                 │ spawn
//!                 ┌───────────────▼────────────────┐
//!  socket ◄─────► │ session: WireBuffer + WsCodec  │ ◄──── Outbox ◄──── Connection::send
//!                 │ on_open / on_traffic / on_close│
//!                 └────────────────────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. Accept - TCP connection accepted, `on_open` registers it
//! 2. Handshake - bytes buffered until a full HTTP upgrade request arrives
//! 3. Ready - each data-ready round decodes every buffered message
//! 4. Close - peer EOF, close frame, decode error or scheduled close;
//!    `on_close` runs once from the session
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | Sans-IO WebSocket codec over an in-memory wire buffer |
//! | `connection` | Shared connection handle and outbound queue |
//! | `server` | Listener binding, accept loops, ticker, shutdown |
//! | `session` | Per-connection event loop |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket upgrade and framing.
pub mod codec;

/// Connection handle.
pub mod connection;

/// Listener and reactor.
pub mod server;

mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{Codec, Handshake, WireBuffer, WsCodec};
pub use connection::{Connection, Outbox};
pub use server::Server;
