//! wshub - WebSocket broadcast server.
//!
//! Usage: wshub [--port 9000] [--tick-interval-ms 3000] [--single-core]

use std::net::IpAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wshub::config::{DEFAULT_OUTBOX_CAPACITY, DEFAULT_PORT, DEFAULT_SYSTEM_MESSAGE};
use wshub::{BroadcastHub, FanoutPolicy, HubConfig, Result, Server, ServerConfig};

// ============================================================================
// CLI
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "wshub", version, about = "Multi-core WebSocket broadcast hub")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Milliseconds between system broadcasts
    #[arg(long, default_value_t = 3000)]
    tick_interval_ms: u64,

    /// Message broadcast on every tick
    #[arg(long, default_value = DEFAULT_SYSTEM_MESSAGE)]
    system_message: String,

    /// Do not echo a message back to its sender
    #[arg(long)]
    no_echo: bool,

    /// Keep delivering to healthy clients after a failed delivery
    #[arg(long)]
    best_effort: bool,

    /// Frames queued per client before it is dropped as too slow
    #[arg(long, default_value_t = DEFAULT_OUTBOX_CAPACITY)]
    outbox_capacity: usize,

    /// Run a single worker thread
    #[arg(long)]
    single_core: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig::new()
            .with_ip(self.host)
            .with_port(self.port)
            .with_multicore(!self.single_core)
            .with_reuse_port(!self.single_core)
            .with_outbox_capacity(self.outbox_capacity)
    }

    fn hub_config(&self) -> HubConfig {
        let fanout = if self.best_effort {
            FanoutPolicy::BestEffort
        } else {
            FanoutPolicy::ShortCircuit
        };

        HubConfig::new()
            .with_tick_interval(Duration::from_millis(self.tick_interval_ms))
            .with_system_message(self.system_message.clone())
            .with_echo_to_sender(!self.no_echo)
            .with_fanout(fanout)
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let server_config = cli.server_config();
    let hub_config = cli.hub_config();

    let runtime = if server_config.multicore {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(server_config.worker_count())
            .enable_all()
            .build()
    } else {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
    };

    let runtime = match runtime {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to build runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(serve(server_config, hub_config));
    info!("server exits: {result:?}");

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

async fn serve(server_config: ServerConfig, hub_config: HubConfig) -> Result<()> {
    hub_config.validate()?;

    let server = Server::bind(server_config).await?;
    let hub = Arc::new(BroadcastHub::new(hub_config));

    server
        .run(hub, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await
}

fn init_logging(debug: bool) {
    let default = if debug { "wshub=debug" } else { "wshub=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["wshub"]).expect("parse");

        let server = cli.server_config();
        assert_eq!(server.port, DEFAULT_PORT);
        assert!(server.multicore);
        assert!(server.reuse_port);
        assert_eq!(server.outbox_capacity, DEFAULT_OUTBOX_CAPACITY);

        let hub = cli.hub_config();
        assert_eq!(hub.tick_interval, Duration::from_secs(3));
        assert_eq!(hub.system_message, DEFAULT_SYSTEM_MESSAGE);
        assert!(hub.echo_to_sender);
        assert_eq!(hub.fanout, FanoutPolicy::ShortCircuit);
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "wshub",
            "--port",
            "9100",
            "--host",
            "127.0.0.1",
            "--tick-interval-ms",
            "250",
            "--no-echo",
            "--best-effort",
            "--single-core",
            "--outbox-capacity",
            "16",
        ])
        .expect("parse");

        let server = cli.server_config();
        assert_eq!(server.socket_addr().to_string(), "127.0.0.1:9100");
        assert!(!server.multicore);
        assert!(!server.reuse_port);
        assert_eq!(server.outbox_capacity, 16);

        let hub = cli.hub_config();
        assert_eq!(hub.tick_interval, Duration::from_millis(250));
        assert!(!hub.echo_to_sender);
        assert_eq!(hub.fanout, FanoutPolicy::BestEffort);
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(Cli::try_parse_from(["wshub", "--port", "70000"]).is_err());
    }
}
