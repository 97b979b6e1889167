//! WebSocket message types and per-connection protocol state.
//!
//! # Protocol Overview
//!
//! | Phase | Wire format | Tracked by |
//! |-------|-------------|------------|
//! | Handshake | HTTP/1.1 `Upgrade: websocket` | [`ProtocolState`] (`upgraded = false`) |
//! | Ready | WebSocket frames | [`ProtocolState`] (`upgraded = true`) |
//!
//! Only text and binary frames are application messages. Control frames
//! (ping, pong, close) are handled by the codec and never broadcast.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Application message and its kind tag |
//! | `state` | Handshake-pending vs upgraded tracker |

// ============================================================================
// Submodules
// ============================================================================

/// Application-level framed messages.
pub mod frame;

/// Per-connection protocol state tracker.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{Frame, MessageKind};
pub use state::ProtocolState;
