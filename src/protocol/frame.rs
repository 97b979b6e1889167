//! Application-level framed messages.
//!
//! A [`Frame`] is one discrete message on an upgraded connection, tagged with
//! its [`MessageKind`]. The payload is reference-counted so fan-out to many
//! connections clones a pointer, not the bytes.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str;

use bytes::Bytes;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, Result};

// ============================================================================
// MessageKind
// ============================================================================

/// Kind tag of an application message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// UTF-8 text message.
    Text,
    /// Opaque binary message.
    Binary,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Binary => f.write_str("binary"),
        }
    }
}

// ============================================================================
// Frame
// ============================================================================

/// One application message.
///
/// Text frames always carry valid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    kind: MessageKind,
    payload: Bytes,
}

impl Frame {
    /// Creates a text frame.
    #[inline]
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            payload: Bytes::from(text.into()),
        }
    }

    /// Creates a binary frame.
    #[inline]
    #[must_use]
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageKind::Binary,
            payload: payload.into(),
        }
    }

    /// Returns the message kind.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Returns the raw payload.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Returns the payload as text, for text frames.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self.kind {
            MessageKind::Text => str::from_utf8(&self.payload).ok(),
            MessageKind::Binary => None,
        }
    }

    /// Extracts the application frame from a WebSocket message.
    ///
    /// Returns `None` for control messages.
    #[must_use]
    pub fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::Text(text) => Some(Self {
                kind: MessageKind::Text,
                payload: Bytes::from(text),
            }),
            Message::Binary(payload) => Some(Self::binary(payload)),
            Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_) => None,
        }
    }

    /// Converts the frame into a WebSocket message for writing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if a text payload is not UTF-8.
    pub fn to_message(&self) -> Result<Message> {
        match self.kind {
            MessageKind::Text => {
                let text = str::from_utf8(&self.payload)
                    .map_err(|e| Error::protocol(format!("text frame is not UTF-8: {e}")))?;
                Ok(Message::text(text.to_owned()))
            }
            MessageKind::Binary => Ok(Message::Binary(self.payload.clone())),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => write!(f, "{text}"),
            None => write!(f, "<{} bytes>", self.payload.len()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_frame() {
        let frame = Frame::text("hello");
        assert_eq!(frame.kind(), MessageKind::Text);
        assert_eq!(frame.as_text(), Some("hello"));
        assert_eq!(frame.payload().as_ref(), b"hello");
    }

    #[test]
    fn test_binary_frame_has_no_text() {
        let frame = Frame::binary(vec![0xde, 0xad]);
        assert_eq!(frame.kind(), MessageKind::Binary);
        assert!(frame.as_text().is_none());
        assert_eq!(frame.to_string(), "<2 bytes>");
    }

    #[test]
    fn test_from_message_skips_control() {
        assert!(Frame::from_message(Message::Ping(Bytes::new())).is_none());
        assert!(Frame::from_message(Message::Close(None)).is_none());

        let frame = Frame::from_message(Message::text("hi")).expect("text frame");
        assert_eq!(frame, Frame::text("hi"));
    }

    #[test]
    fn test_from_message_shares_text_buffer() {
        use tokio_tungstenite::tungstenite::Utf8Bytes;

        let raw = Bytes::from_static("héllo".as_bytes());
        let text = Utf8Bytes::try_from(raw.clone()).expect("valid utf-8");

        let frame = Frame::from_message(Message::Text(text)).expect("text frame");
        assert_eq!(frame.as_text(), Some("héllo"));
        assert_eq!(frame.payload().as_ptr(), raw.as_ptr());
    }

    #[test]
    fn test_to_message_keeps_kind() {
        let text = Frame::text("hello").to_message().expect("text message");
        assert!(matches!(text, Message::Text(ref t) if t.as_str() == "hello"));

        let binary = Frame::binary(vec![1, 2, 3]).to_message().expect("binary");
        assert!(matches!(binary, Message::Binary(ref b) if b.as_ref() == &[1u8, 2, 3]));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(MessageKind::Text.to_string(), "text");
        assert_eq!(MessageKind::Binary.to_string(), "binary");
    }
}
