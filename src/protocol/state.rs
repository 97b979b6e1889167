//! Per-connection protocol state tracker.
//!
//! A connection starts in the handshake phase and is upgraded exactly once.
//! The flag is atomic because broadcasts running on other workers read it to
//! decide whether the connection may receive application frames.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};

// ============================================================================
// ProtocolState
// ============================================================================

/// Handshake-pending vs upgraded.
///
/// Transitions `false -> true` once and is never reset.
#[derive(Debug, Default)]
pub struct ProtocolState {
    upgraded: AtomicBool,
}

impl ProtocolState {
    /// Creates a state in the handshake phase.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            upgraded: AtomicBool::new(false),
        }
    }

    /// Returns `true` once the WebSocket handshake has completed.
    #[inline]
    #[must_use]
    pub fn is_upgraded(&self) -> bool {
        self.upgraded.load(Ordering::Acquire)
    }

    /// Marks the handshake as completed.
    ///
    /// Returns `true` if this call performed the transition.
    #[inline]
    pub fn mark_upgraded(&self) -> bool {
        !self.upgraded.swap(true, Ordering::AcqRel)
    }
}

// ============================================================================
// Tests
// ============================================================================
