//! End-to-end tests against a running server with real WebSocket clients.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use wshub::config::DEFAULT_SYSTEM_MESSAGE;
use wshub::{BroadcastHub, EventHandler, HubConfig, Server, ServerConfig};

// ============================================================================
// Harness
// ============================================================================

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

struct Running {
    url: String,
    hub: Arc<BroadcastHub>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<wshub::Result<()>>,
}

impl Running {
    async fn start(hub_config: HubConfig, ticker: bool) -> Result<Self> {
        let config = ServerConfig::new()
            .with_ip(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_port(0)
            .with_ticker(ticker);

        let server = Server::bind(config).await?;
        let url = server.ws_url();
        let hub = Arc::new(BroadcastHub::new(hub_config));

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run(Arc::clone(&hub), async {
            let _ = stop_rx.await;
        }));

        Ok(Self {
            url,
            hub,
            stop: Some(stop_tx),
            task,
        })
    }

    async fn connect(&self) -> Result<Client> {
        let (client, _response) = connect_async(self.url.as_str())
            .await
            .context("websocket connect")?;
        Ok(client)
    }

    async fn wait_for_count(&self, expected: i64) -> Result<()> {
        for _ in 0..100 {
            if self.hub.connection_count() == expected {
                return Ok(());
            }
            sleep(Duration::from_millis(20)).await;
        }
        bail!(
            "connection count stuck at {}, expected {expected}",
            self.hub.connection_count()
        )
    }

    async fn stop(mut self) -> Result<()> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        timeout(RECV_TIMEOUT, self.task).await???;
        Ok(())
    }
}

async fn next_message(client: &mut Client) -> Result<Message> {
    loop {
        let message = timeout(RECV_TIMEOUT, client.next())
            .await
            .context("timed out waiting for message")?
            .context("stream ended")??;

        if !message.is_ping() && !message.is_pong() {
            return Ok(message);
        }
    }
}

async fn next_text(client: &mut Client) -> Result<String> {
    match next_message(client).await? {
        Message::Text(text) => Ok(text.to_string()),
        other => bail!("expected text, got {other:?}"),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_scenario_relay_close_then_tick() -> Result<()> {
    let server = Running::start(HubConfig::default(), false).await?;
    let mut a = server.connect().await?;
    let mut b = server.connect().await?;
    let mut c = server.connect().await?;
    server.wait_for_count(3).await?;

    // Loop-back: the sender hears its own message too
    a.send(Message::text("hello")).await?;
    assert_eq!(next_text(&mut a).await?, "hello");
    assert_eq!(next_text(&mut b).await?, "hello");
    assert_eq!(next_text(&mut c).await?, "hello");

    b.close(None).await?;
    server.wait_for_count(2).await?;
    assert_eq!(server.hub.registry().len(), 2);

    let _ = server.hub.on_tick();

    assert_eq!(next_text(&mut a).await?, DEFAULT_SYSTEM_MESSAGE);
    assert_eq!(next_text(&mut c).await?, DEFAULT_SYSTEM_MESSAGE);

    // B only sees the end of its own close handshake
    while let Ok(Some(Ok(message))) = timeout(Duration::from_millis(200), b.next()).await {
        assert!(
            !matches!(message, Message::Text(_)),
            "closed client got {message:?}"
        );
    }
    assert_eq!(server.hub.registry().len(), 2);

    server.stop().await
}

#[tokio::test]
async fn test_binary_message_keeps_its_kind() -> Result<()> {
    let server = Running::start(HubConfig::default(), false).await?;
    let mut a = server.connect().await?;
    let mut b = server.connect().await?;
    server.wait_for_count(2).await?;

    a.send(Message::binary(vec![1u8, 2, 3])).await?;

    match next_message(&mut b).await? {
        Message::Binary(data) => assert_eq!(&data[..], &[1u8, 2, 3]),
        other => bail!("expected binary, got {other:?}"),
    }

    server.stop().await
}

#[tokio::test]
async fn test_no_echo_skips_sender() -> Result<()> {
    let config = HubConfig::default().with_echo_to_sender(false);
    let server = Running::start(config, false).await?;
    let mut a = server.connect().await?;
    let mut b = server.connect().await?;
    server.wait_for_count(2).await?;

    a.send(Message::text("first")).await?;
    assert_eq!(next_text(&mut b).await?, "first");

    b.send(Message::text("second")).await?;
    // A sees B's message but never its own
    assert_eq!(next_text(&mut a).await?, "second");

    server.stop().await
}

#[tokio::test]
async fn test_ticker_broadcasts_system_message() -> Result<()> {
    let config = HubConfig::default()
        .with_tick_interval(Duration::from_millis(50))
        .with_system_message("system: tick");
    let server = Running::start(config, true).await?;
    let mut client = server.connect().await?;

    assert_eq!(next_text(&mut client).await?, "system: tick");
    assert_eq!(next_text(&mut client).await?, "system: tick");

    server.stop().await
}

#[tokio::test]
async fn test_shutdown_closes_clients() -> Result<()> {
    let server = Running::start(HubConfig::default(), false).await?;
    let mut client = server.connect().await?;
    server.wait_for_count(1).await?;

    let hub = Arc::clone(&server.hub);
    server.stop().await?;

    assert_eq!(hub.connection_count(), 0);
    match timeout(RECV_TIMEOUT, client.next()).await? {
        None | Some(Ok(Message::Close(_))) | Some(Err(_)) => Ok(()),
        Some(Ok(other)) => bail!("expected close, got {other:?}"),
    }
}

#[tokio::test]
async fn test_plain_http_request_is_dropped() -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let server = Running::start(HubConfig::default(), false).await?;
    let addr = server.url.trim_start_matches("ws://").to_string();

    let mut stream = TcpStream::connect(addr).await?;
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await?;

    let mut buf = [0u8; 64];
    let read = timeout(RECV_TIMEOUT, stream.read(&mut buf)).await?;
    assert!(matches!(read, Ok(0) | Err(_)));
    server.wait_for_count(0).await?;

    server.stop().await
}
