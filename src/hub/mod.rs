//! Connection lifecycle and broadcast fan-out.
//!
//! # Architecture
//!
//! ```text
//!            ┌──────────────────────── BroadcastHub ─────────────────────────┐
//!  reactor   │                                                               │
//!  ───────►  │  on_open ──► track ──┐                                        │
//!  callbacks │  on_close ─► untrack ┤    ConnectionRegistry                  │
//!            │  on_traffic ─────────┼──► broadcast ──► Connection::send ──►  │ session
//!            │  on_tick ────────────┘                                        │ tasks
//!            └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `broadcast` | [`BroadcastHub`], the [`EventHandler`] implementation |
//! | `event` | Reactor callback contract |
//! | `registry` | Shared set of live connections |

// ============================================================================
// Submodules
// ============================================================================

/// Broadcast hub.
pub mod broadcast;

/// Reactor callback contract.
pub mod event;

/// Connection registry.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use broadcast::BroadcastHub;
pub use event::{Action, EventHandler};
pub use registry::ConnectionRegistry;
