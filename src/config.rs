//! Hub and server configuration.
//!
//! Two plain option structs with builder-style setters:
//!
//! - [`ServerConfig`] - how the reactor listens and schedules work
//! - [`HubConfig`] - broadcast policy and the periodic system message
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use wshub::{FanoutPolicy, HubConfig, ServerConfig};
//!
//! let server = ServerConfig::new().with_port(9000).with_multicore(true);
//! let hub = HubConfig::new()
//!     .with_tick_interval(Duration::from_secs(3))
//!     .with_echo_to_sender(false)
//!     .with_fanout(FanoutPolicy::BestEffort);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default listen port.
pub const DEFAULT_PORT: u16 = 9000;

/// Default interval between system broadcasts.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(3);

/// Default text of the periodic system broadcast.
pub const DEFAULT_SYSTEM_MESSAGE: &str = "system: This is a broadcasted system message!";

/// Default listen backlog.
const DEFAULT_BACKLOG: u32 = 1024;

/// Default number of frames queued per connection before delivery fails.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 1024;

// ============================================================================
// FanoutPolicy
// ============================================================================

/// What a broadcast does when delivery to one connection fails.
///
/// Failed connections are scheduled for close under both policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FanoutPolicy {
    /// Stop at the first failure and report it.
    ///
    /// Connections after the failing one miss this round.
    #[default]
    ShortCircuit,

    /// Deliver to every healthy connection and report all failures together.
    BestEffort,
}

// ============================================================================
// ServerConfig
// ============================================================================

/// Listener and runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind.
    pub ip: IpAddr,

    /// Port to bind. 0 lets the OS pick.
    pub port: u16,

    /// Spread connections over one worker per processor.
    pub multicore: bool,

    /// Enable `SO_REUSEPORT` and run one accept loop per worker.
    pub reuse_port: bool,

    /// Drive [`EventHandler::on_tick`](crate::hub::EventHandler::on_tick).
    pub ticker: bool,

    /// Listen backlog.
    pub backlog: u32,

    /// Frames queued per connection before delivery to it fails and the
    /// connection is closed.
    pub outbox_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConfig {
    /// Creates a configuration listening on `0.0.0.0:9000` with all cores,
    /// reuse-port and the ticker enabled.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            multicore: true,
            reuse_port: true,
            ticker: true,
            backlog: DEFAULT_BACKLOG,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }

    /// Sets the bind address.
    #[inline]
    #[must_use]
    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = ip;
        self
    }

    /// Sets the bind port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enables or disables multi-core scheduling.
    #[inline]
    #[must_use]
    pub fn with_multicore(mut self, multicore: bool) -> Self {
        self.multicore = multicore;
        self
    }

    /// Enables or disables `SO_REUSEPORT`.
    #[inline]
    #[must_use]
    pub fn with_reuse_port(mut self, reuse_port: bool) -> Self {
        self.reuse_port = reuse_port;
        self
    }

    /// Enables or disables the periodic tick.
    #[inline]
    #[must_use]
    pub fn with_ticker(mut self, ticker: bool) -> Self {
        self.ticker = ticker;
        self
    }

    /// Sets the per-connection outbound queue capacity.
    #[inline]
    #[must_use]
    pub fn with_outbox_capacity(mut self, capacity: usize) -> Self {
        self.outbox_capacity = capacity;
        self
    }

    /// Returns the socket address to bind.
    #[inline]
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// Number of worker loops: one per processor, or one when single-core.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        if self.multicore {
            thread::available_parallelism().map_or(1, NonZeroUsize::get)
        } else {
            1
        }
    }

    /// Number of accept loops sharing the port.
    ///
    /// Only reuse-port lets several listeners bind the same address.
    #[must_use]
    pub fn acceptor_count(&self) -> usize {
        if self.reuse_port && cfg!(all(unix, not(target_os = "solaris"), not(target_os = "illumos"))) {
            self.worker_count()
        } else {
            1
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the backlog or the outbox capacity is
    /// zero.
    pub fn validate(&self) -> Result<()> {
        if self.backlog == 0 {
            return Err(Error::config("listen backlog must be greater than zero"));
        }
        if self.outbox_capacity == 0 {
            return Err(Error::config("outbox capacity must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// HubConfig
// ============================================================================

/// Broadcast behavior of [`BroadcastHub`](crate::hub::BroadcastHub).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Delay returned to the scheduler after each tick.
    pub tick_interval: Duration,

    /// Text sent to every connection on each tick.
    pub system_message: String,

    /// Relay inbound messages back to their sender too (loop-back).
    pub echo_to_sender: bool,

    /// Partial-failure behavior of each broadcast.
    pub fanout: FanoutPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl HubConfig {
    /// Creates the default configuration: 3s ticks, loop-back enabled,
    /// short-circuit fan-out.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            system_message: DEFAULT_SYSTEM_MESSAGE.to_string(),
            echo_to_sender: true,
            fanout: FanoutPolicy::default(),
        }
    }

    /// Sets the tick interval.
    #[inline]
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sets the periodic system message.
    #[inline]
    #[must_use]
    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = message.into();
        self
    }

    /// Includes or excludes the sender when relaying its messages.
    #[inline]
    #[must_use]
    pub fn with_echo_to_sender(mut self, echo: bool) -> Self {
        self.echo_to_sender = echo;
        self
    }

    /// Sets the fan-out failure policy.
    #[inline]
    #[must_use]
    pub fn with_fanout(mut self, fanout: FanoutPolicy) -> Self {
        self.fanout = fanout;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the tick interval is zero.
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(Error::config("tick interval must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 9000);
        assert_eq!(config.ip, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert!(config.multicore);
        assert!(config.reuse_port);
        assert!(config.ticker);
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:9000");
    }

    #[test]
    fn test_server_builder() {
        let config = ServerConfig::new()
            .with_ip(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_port(0)
            .with_multicore(false)
            .with_ticker(false);
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:0");
        assert_eq!(config.worker_count(), 1);
        assert!(!config.ticker);
    }

    #[test]
    fn test_acceptor_count_without_reuse_port() {
        let config = ServerConfig::new().with_reuse_port(false);
        assert_eq!(config.acceptor_count(), 1);
    }

    #[test]
    fn test_server_validate_backlog() {
        let mut config = ServerConfig::new();
        assert!(config.validate().is_ok());
        config.backlog = 0;
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_server_validate_outbox_capacity() {
        let config = ServerConfig::new();
        assert_eq!(config.outbox_capacity, DEFAULT_OUTBOX_CAPACITY);

        let config = config.with_outbox_capacity(0);
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_hub_defaults() {
        let config = HubConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(3));
        assert_eq!(
            config.system_message,
            "system: This is a broadcasted system message!"
        );
        assert!(config.echo_to_sender);
        assert_eq!(config.fanout, FanoutPolicy::ShortCircuit);
    }

    #[test]
    fn test_hub_validate_zero_interval() {
        let config = HubConfig::new().with_tick_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
