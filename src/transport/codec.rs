//! WebSocket codec over buffered bytes.
//!
//! The session task reads raw bytes from the socket and feeds them into a
//! [`WireBuffer`]. The codec parses from that buffer and reports one of:
//!
//! - a complete message (or a completed handshake)
//! - not enough bytes yet (`Ok(None)` / [`Handshake::Incomplete`])
//! - invalid data ([`Error::Handshake`] / [`Error::Decode`]) or a clean close
//!   ([`Error::PeerClosed`])
//!
//! Bytes the codec wants to send (handshake response, pongs, close replies,
//! broadcast frames) accumulate in the same buffer until the session drains
//! them with [`WireBuffer::take_outbound`].
//!
//! [`WsCodec`] drives `tungstenite`'s sans-IO state machines: the buffer
//! reports `WouldBlock` when empty, which tungstenite treats as "resume later".

// ============================================================================
// Imports
// ============================================================================

use std::io::{self, ErrorKind, Read, Write};
use std::mem;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio_tungstenite::tungstenite::handshake::server::{NoCallback, ServerHandshake};
use tokio_tungstenite::tungstenite::handshake::{HandshakeError, MidHandshake};
use tokio_tungstenite::tungstenite::{self, Error as WsError, WebSocket};

use crate::error::{Error, Result};
use crate::protocol::Frame;

// ============================================================================
// Codec
// ============================================================================

/// Outcome of one handshake attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    /// Upgrade finished; the connection speaks WebSocket from now on.
    Complete,
    /// The upgrade request has not fully arrived yet.
    Incomplete,
}

/// Framing contract the hub consumes.
///
/// Implementations parse from bytes already buffered by the reactor and never
/// block.
pub trait Codec: Send {
    /// Attempts the upgrade handshake with the buffered bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Handshake`] for malformed or unsupported requests.
    fn upgrade(&mut self) -> Result<Handshake>;

    /// Parses the next complete application message.
    ///
    /// Returns `Ok(None)` when the buffer holds no complete message.
    ///
    /// # Errors
    ///
    /// - [`Error::PeerClosed`] if the peer closed cleanly
    /// - [`Error::Decode`] for malformed frames
    fn read_message(&mut self) -> Result<Option<Frame>>;

    /// Encodes one message for writing.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is not upgraded or already closed.
    fn write_message(&mut self, frame: &Frame) -> Result<()>;

    /// Starts a server-initiated close. A no-op before the upgrade.
    ///
    /// # Errors
    ///
    /// Returns an error if the close frame cannot be encoded.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// WireBuffer
// ============================================================================

#[derive(Debug, Default)]
struct Buffers {
    inbound: BytesMut,
    outbound: BytesMut,
}

/// In-memory byte pipe between a socket and a codec.
///
/// Cloning yields another handle to the same buffers.
#[derive(Debug, Clone, Default)]
pub struct WireBuffer {
    inner: Arc<Mutex<Buffers>>,
}

impl WireBuffer {
    /// Creates empty buffers.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends bytes received from the socket.
    pub fn feed(&self, bytes: &[u8]) {
        self.inner.lock().inbound.extend_from_slice(bytes);
    }

    /// Number of received bytes the codec has not consumed yet.
    #[must_use]
    pub fn pending_inbound(&self) -> usize {
        self.inner.lock().inbound.len()
    }

    /// Takes every byte the codec produced since the last call.
    #[must_use]
    pub fn take_outbound(&self) -> Bytes {
        self.inner.lock().outbound.split().freeze()
    }
}

impl Read for WireBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock();
        if inner.inbound.is_empty() {
            return Err(ErrorKind::WouldBlock.into());
        }

        let n = buf.len().min(inner.inbound.len());
        let chunk = inner.inbound.split_to(n);
        buf[..n].copy_from_slice(&chunk);
        Ok(n)
    }
}

impl Write for WireBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().outbound.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// WsCodec
// ============================================================================

/// Handshake in progress, waiting for more request bytes.
type PendingHandshake = MidHandshake<ServerHandshake<WireBuffer, NoCallback>>;

enum CodecState {
    Fresh,
    Handshaking(Box<PendingHandshake>),
    Open(WebSocket<WireBuffer>),
    Failed,
}

/// Server-side WebSocket codec backed by `tungstenite`.
pub struct WsCodec {
    wire: WireBuffer,
    state: CodecState,
}

impl WsCodec {
    /// Creates a codec reading from and writing to `wire`.
    #[must_use]
    pub fn new(wire: WireBuffer) -> Self {
        Self {
            wire,
            state: CodecState::Fresh,
        }
    }

    /// Returns the underlying byte pipe.
    #[inline]
    #[must_use]
    pub fn wire(&self) -> &WireBuffer {
        &self.wire
    }

    /// Returns `true` once the handshake has completed.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self.state, CodecState::Open(_))
    }

    fn socket(&mut self) -> Result<&mut WebSocket<WireBuffer>> {
        match &mut self.state {
            CodecState::Open(ws) => Ok(ws),
            _ => Err(Error::protocol("WebSocket handshake not completed")),
        }
    }
}

impl Codec for WsCodec {
    fn upgrade(&mut self) -> Result<Handshake> {
        let attempt = match mem::replace(&mut self.state, CodecState::Failed) {
            CodecState::Fresh => tungstenite::accept(self.wire.clone()),
            CodecState::Handshaking(pending) => (*pending).handshake(),
            open @ CodecState::Open(_) => {
                self.state = open;
                return Err(Error::protocol("connection already upgraded"));
            }
            CodecState::Failed => return Err(Error::protocol("handshake already failed")),
        };

        match attempt {
            Ok(ws) => {
                self.state = CodecState::Open(ws);
                Ok(Handshake::Complete)
            }
            Err(HandshakeError::Interrupted(pending)) => {
                self.state = CodecState::Handshaking(Box::new(pending));
                Ok(Handshake::Incomplete)
            }
            Err(HandshakeError::Failure(e)) => Err(Error::handshake(e.to_string())),
        }
    }

    fn read_message(&mut self) -> Result<Option<Frame>> {
        let ws = self.socket()?;

        loop {
            match ws.read() {
                Ok(message) if message.is_close() => {
                    // Push the queued close reply into the wire buffer
                    let _ = ws.flush();
                    return Err(Error::PeerClosed);
                }
                Ok(message) => {
                    if let Some(frame) = Frame::from_message(message) {
                        return Ok(Some(frame));
                    }
                    // Control frame, answered by tungstenite
                }
                Err(WsError::Io(e)) if e.kind() == ErrorKind::WouldBlock => {
                    let _ = ws.flush();
                    return Ok(None);
                }
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                    return Err(Error::PeerClosed);
                }
                Err(e) => return Err(Error::decode(e.to_string())),
            }
        }
    }

    fn write_message(&mut self, frame: &Frame) -> Result<()> {
        let message = frame.to_message()?;
        self.socket()?.send(message)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        match &mut self.state {
            CodecState::Open(ws) => match ws.close(None) {
                Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
                Err(e) => Err(e.into()),
            },
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
