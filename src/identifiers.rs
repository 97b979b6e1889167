//! Type-safe identifiers.
//!
//! Connections are keyed by a process-unique integer handle rather than by
//! socket address or pointer, so a handle never aliases a later connection
//! that happens to reuse the same transport resources.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// ConnectionId
// ============================================================================

/// Next connection ID to hand out. Starts at 1 so IDs fit `NonZeroU64`.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Stable handle for one live connection.
///
/// IDs are allocated monotonically and never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(NonZeroU64);

impl ConnectionId {
    /// Allocates the next unused connection ID.
    #[must_use]
    pub fn next() -> Self {
        let raw = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        // Wrapping past u64::MAX is not reachable in practice.
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    /// Creates an ID from a raw value. Returns `None` for 0.
    #[inline]
    #[must_use]
    pub const fn from_u64(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    /// Returns the raw integer value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
