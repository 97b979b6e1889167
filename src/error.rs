//! Error types for the broadcast hub.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use wshub::{Result, Error};
//!
//! fn relay(registry: &ConnectionRegistry, frame: &Frame) -> Result<usize> {
//!     registry.broadcast(frame, FanoutPolicy::ShortCircuit, None)
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants | Scope |
//! |----------|----------|-------|
//! | Configuration | [`Error::Config`], [`Error::Bind`] | Process |
//! | Protocol | [`Error::Handshake`], [`Error::Decode`], [`Error::PeerClosed`], [`Error::Protocol`] | One connection |
//! | Fan-out | [`Error::Delivery`], [`Error::PartialDelivery`] | Failed peers |
//! | Lifecycle | [`Error::LifecycleViolation`] | Programming error |
//! | External | [`Error::Io`], [`Error::WebSocket`] | One connection |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::net::SocketAddr;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::ConnectionId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Apart from [`Error::Bind`], every error is local to a single connection.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when server or hub configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Failed to bind the listening socket.
    ///
    /// The only process-fatal error.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address the server tried to bind.
        addr: SocketAddr,
        /// Underlying socket error.
        source: IoError,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// WebSocket upgrade handshake failed.
    ///
    /// Returned for malformed or unsupported upgrade requests.
    #[error("Handshake failed: {message}")]
    Handshake {
        /// Description of the handshake failure.
        message: String,
    },

    /// Inbound frame could not be decoded.
    #[error("Decode failed: {message}")]
    Decode {
        /// Description of the malformed data.
        message: String,
    },

    /// Peer closed the connection cleanly.
    #[error("Connection closed by peer")]
    PeerClosed,

    /// Codec used out of order (e.g. reading before the upgrade).
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Fan-out Errors
    // ========================================================================
    /// Delivery to one connection failed; fan-out stopped there.
    #[error("Delivery to connection {connection_id} failed: {message}")]
    Delivery {
        /// The connection that could not be written to.
        connection_id: ConnectionId,
        /// Description of the delivery failure.
        message: String,
    },

    /// Delivery failed for some connections; the rest were served.
    #[error("Delivery failed for {} connection(s), {delivered} delivered", failed.len())]
    PartialDelivery {
        /// Connections that could not be written to.
        failed: Vec<ConnectionId>,
        /// Number of successful deliveries.
        delivered: usize,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Internal invariant breach, such as tracking a connection twice.
    #[error("Lifecycle violation: {message}")]
    LifecycleViolation {
        /// Description of the violated invariant.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a bind error.
    #[inline]
    pub fn bind(addr: SocketAddr, source: IoError) -> Self {
        Self::Bind { addr, source }
    }

    /// Creates a handshake error.
    #[inline]
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// Creates a decode error.
    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a delivery error.
    #[inline]
    pub fn delivery(connection_id: ConnectionId, message: impl Into<String>) -> Self {
        Self::Delivery {
            connection_id,
            message: message.into(),
        }
    }

    /// Creates a partial delivery error.
    #[inline]
    pub fn partial_delivery(failed: Vec<ConnectionId>, delivered: usize) -> Self {
        Self::PartialDelivery { failed, delivered }
    }

    /// Creates a lifecycle violation error.
    #[inline]
    pub fn lifecycle_violation(message: impl Into<String>) -> Self {
        Self::LifecycleViolation {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the peer ended the connection without a protocol error.
    ///
    /// Clean closes are logged at a lower severity than malformed data.
    #[inline]
    #[must_use]
    pub fn is_clean_close(&self) -> bool {
        matches!(
            self,
            Self::PeerClosed
                | Self::WebSocket(WsError::ConnectionClosed | WsError::AlreadyClosed)
        )
    }

    /// Returns `true` if this is a fan-out delivery error.
    #[inline]
    #[must_use]
    pub fn is_delivery_error(&self) -> bool {
        matches!(self, Self::Delivery { .. } | Self::PartialDelivery { .. })
    }

    /// Returns `true` if the error only affects the connection it occurred on.
    #[inline]
    #[must_use]
    pub fn is_connection_local(&self) -> bool {
        !matches!(self, Self::Bind { .. } | Self::Config { .. })
    }

    /// Returns the connections a fan-out error failed to reach.
    ///
    /// Empty for every other error.
    #[must_use]
    pub fn failed_connections(&self) -> &[ConnectionId] {
        match self {
            Self::Delivery { connection_id, .. } => std::slice::from_ref(connection_id),
            Self::PartialDelivery { failed, .. } => failed,
            _ => &[],
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::handshake("missing Upgrade header");
        assert_eq!(err.to_string(), "Handshake failed: missing Upgrade header");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("tick interval must be positive");
        assert_eq!(
            err.to_string(),
            "Configuration error: tick interval must be positive"
        );
    }

    #[test]
    fn test_partial_delivery_display() {
        let failed = vec![ConnectionId::next(), ConnectionId::next()];
        let err = Error::partial_delivery(failed, 3);
        assert_eq!(
            err.to_string(),
            "Delivery failed for 2 connection(s), 3 delivered"
        );
    }

    #[test]
    fn test_is_clean_close() {
        assert!(Error::PeerClosed.is_clean_close());
        assert!(Error::WebSocket(WsError::ConnectionClosed).is_clean_close());
        assert!(!Error::decode("bad opcode").is_clean_close());
    }

    #[test]
    fn test_failed_connections() {
        let id = ConnectionId::next();
        let single = Error::delivery(id, "closed");
        assert_eq!(single.failed_connections(), &[id]);

        let other = ConnectionId::next();
        let partial = Error::partial_delivery(vec![id, other], 0);
        assert_eq!(partial.failed_connections(), &[id, other]);

        assert!(Error::PeerClosed.failed_connections().is_empty());
    }

    #[test]
    fn test_is_connection_local() {
        let bind = Error::bind(
            "0.0.0.0:9000".parse().expect("valid addr"),
            IoError::new(ErrorKind::AddrInUse, "in use"),
        );
        assert!(!bind.is_connection_local());
        assert!(Error::decode("bad frame").is_connection_local());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::BrokenPipe, "broken pipe");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
