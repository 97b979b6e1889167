//! Multi-core TCP reactor.
//!
//! # Connection Flow
//!
//! 1. [`Server::bind`] binds one listener per acceptor (`SO_REUSEPORT` lets
//!    them share the port) and reports a bind failure as [`Error::Bind`]
//! 2. [`Server::run`] calls `on_boot`, starts the ticker and the accept loops
//! 3. Every accepted socket runs its own session task on the tokio worker pool
//! 4. Ctrl+C (or any callback returning [`Action::Shutdown`]) stops accepting,
//!    closes every session, then calls `on_shutdown`

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::hub::{Action, EventHandler};

use super::session;

// ============================================================================
// Constants
// ============================================================================

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

// ============================================================================
// ShutdownSignal
// ============================================================================

/// Process-wide stop flag shared by acceptors, sessions and the ticker.
#[derive(Debug, Clone)]
pub(crate) struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Requests shutdown. Idempotent.
    pub(crate) fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Resolves once shutdown has been requested.
    pub(crate) async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

// ============================================================================
// Server
// ============================================================================

/// A bound server, ready to run an [`EventHandler`].
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use wshub::{BroadcastHub, HubConfig, Server, ServerConfig};
///
/// let server = Server::bind(ServerConfig::new().with_port(0)).await?;
/// println!("listening on {}", server.ws_url());
///
/// let hub = Arc::new(BroadcastHub::new(HubConfig::default()));
/// server.run(hub, async { let _ = tokio::signal::ctrl_c().await; }).await?;
/// ```
#[derive(Debug)]
pub struct Server {
    /// Listener configuration.
    config: ServerConfig,
    /// One listener per accept loop, all on `local_addr`.
    listeners: Vec<TcpListener>,
    /// Actual bound address (resolved port when binding port 0).
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the listening sockets.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the configuration is invalid
    /// - [`Error::Bind`] if a socket cannot be bound
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let first = bind_listener(config.socket_addr(), &config)?;
        let local_addr = first.local_addr()?;

        let mut listeners = vec![first];
        for _ in 1..config.acceptor_count() {
            listeners.push(bind_listener(local_addr, &config)?);
        }

        debug!(%local_addr, acceptors = listeners.len(), "Server bound");

        Ok(Self {
            config,
            listeners,
            local_addr,
        })
    }

    /// Returns the bound address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the WebSocket URL clients should connect to.
    ///
    /// Format: `ws://{ip}:{port}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    /// Runs until `signal` resolves or a callback returns
    /// [`Action::Shutdown`].
    ///
    /// # Errors
    ///
    /// Currently infallible once bound; the `Result` leaves room for
    /// run-loop failures.
    pub async fn run<H, F>(self, handler: Arc<H>, signal: F) -> Result<()>
    where
        H: EventHandler,
        F: Future<Output = ()> + Send,
    {
        let shutdown = ShutdownSignal::new();

        if handler.on_boot(self.local_addr) == Action::Shutdown {
            shutdown.trigger();
        }

        let mut tasks = JoinSet::new();

        if self.config.ticker {
            tasks.spawn(run_ticker(Arc::clone(&handler), shutdown.clone()));
        }

        for listener in self.listeners {
            tasks.spawn(accept_loop(
                listener,
                Arc::clone(&handler),
                shutdown.clone(),
                self.config.outbox_capacity,
            ));
        }

        info!(
            addr = %self.local_addr,
            acceptors = self.config.acceptor_count(),
            workers = self.config.worker_count(),
            "Server started"
        );

        tokio::select! {
            () = signal => info!("Shutdown signal received"),
            () = shutdown.triggered() => info!("Shutdown requested"),
        }

        shutdown.trigger();

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Server task failed");
            }
        }

        handler.on_shutdown();
        info!("Server shutdown complete");

        Ok(())
    }
}

// ============================================================================
// Server - Background Tasks
// ============================================================================

/// Creates a listener with address (and optionally port) reuse.
fn bind_listener(addr: SocketAddr, config: &ServerConfig) -> Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|e| Error::bind(addr, e))?;

    socket.set_reuseaddr(true).map_err(|e| Error::bind(addr, e))?;

    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    if config.reuse_port {
        socket.set_reuseport(true).map_err(|e| Error::bind(addr, e))?;
    }

    socket.bind(addr).map_err(|e| Error::bind(addr, e))?;
    socket
        .listen(config.backlog)
        .map_err(|e| Error::bind(addr, e))
}

/// Accepts connections and spawns a session for each.
async fn accept_loop<H: EventHandler>(
    listener: TcpListener,
    handler: Arc<H>,
    shutdown: ShutdownSignal,
    outbox_capacity: usize,
) {
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        debug!(%addr, "New TCP connection");
                        sessions.spawn(session::run(
                            stream,
                            addr,
                            Arc::clone(&handler),
                            shutdown.clone(),
                            outbox_capacity,
                        ));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                }
            }

            // Reap finished sessions
            Some(result) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = result {
                    warn!(error = %e, "Session task failed");
                }
            }

            () = shutdown.triggered() => break,
        }
    }

    drop(listener);

    while let Some(result) = sessions.join_next().await {
        if let Err(e) = result {
            warn!(error = %e, "Session task failed");
        }
    }

    debug!("Accept loop terminated");
}

/// Invokes `on_tick` and sleeps for the delay it returns.
async fn run_ticker<H: EventHandler>(handler: Arc<H>, shutdown: ShutdownSignal) {
    loop {
        let (delay, action) = handler.on_tick();
        if action == Action::Shutdown {
            shutdown.trigger();
            break;
        }

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = shutdown.triggered() => break,
        }
    }

    debug!("Ticker terminated");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::{IpAddr, Ipv4Addr};

    use tokio::time::timeout;

    use crate::config::HubConfig;
    use crate::hub::BroadcastHub;

    fn local_config() -> ServerConfig {
        ServerConfig::new()
            .with_ip(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_port(0)
    }

    #[tokio::test]
    async fn test_server_bind_random_port() {
        let server = Server::bind(local_config()).await.expect("bind should succeed");

        assert!(server.local_addr().port() > 0);
        assert!(server.ws_url().starts_with("ws://127.0.0.1:"));
    }

    #[tokio::test]
    async fn test_reuse_port_binds_every_acceptor() {
        let config = local_config();
        let server = Server::bind(config.clone()).await.expect("bind should succeed");
        assert_eq!(server.listeners.len(), config.acceptor_count());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_bind_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = taken.local_addr().expect("addr").port();

        let config = local_config().with_port(port).with_reuse_port(false);
        let err = Server::bind(config).await.expect_err("port in use");
        assert!(matches!(err, Error::Bind { .. }));
        assert!(!err.is_connection_local());
    }

    #[tokio::test]
    async fn test_run_stops_on_signal_and_boots_hub() {
        let server = Server::bind(local_config()).await.expect("bind");
        let addr = server.local_addr();
        let hub = Arc::new(BroadcastHub::new(HubConfig::default()));

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let run = tokio::spawn(server.run(Arc::clone(&hub), async {
            let _ = stop_rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hub.listen_addr(), Some(addr));

        stop_tx.send(()).expect("send stop");
        timeout(Duration::from_secs(5), run)
            .await
            .expect("server stops")
            .expect("run task")
            .expect("run result");
    }

    #[tokio::test]
    async fn test_shutdown_signal_resolves_after_trigger() {
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();
        timeout(Duration::from_secs(1), shutdown.triggered())
            .await
            .expect("already triggered");
    }
}
