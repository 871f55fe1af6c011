//! HandshakeSession: turns a fresh connection into a screen session.
//!
//! # The handshake (for beginners)
//!
//! ```text
//! server                                   screen
//!   │ ── Hello("Synergy", 1, 8) ──────────► │
//!   │ ◄── HelloBack("Synergy", 1, 6, "laptop")
//!   │ ── QINF ─────────────────────────────► │
//!   │ ◄── DINF(0, 0, 1280, 800, 640, 400) ── │
//!   │ ── CIAK ─────────────────────────────► │   Ready
//! ```
//!
//! The peer's version is fixed by its hello-back and decides the layout of
//! several later messages.  The screen's shape has to be known before focus
//! can enter it, hence the info exchange.
//!
//! This type does no I/O.  [`HandshakeSession::receive`] takes one frame
//! payload and returns the messages to send back; the network layer owns the
//! socket and the overall timeout.

use std::time::Duration;

use edgeshare_core::protocol::{decode_hello_back, PROTOCOL_MAJOR, PROTOCOL_MINOR};
use edgeshare_core::{
    decode_message, Message, ProtocolError, ProtocolName, ProtocolVariant, ScreenName, ScreenShape,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::application::screen_session::{validate_info, InvalidScreenInfo};

/// Why a handshake failed.
#[derive(Debug, Error, PartialEq)]
pub enum HandshakeError {
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("malformed handshake message: {0}")]
    Malformed(ProtocolError),
    #[error("protocol tag mismatch")]
    TagMismatch,
    #[error("incompatible version {major}.{minor}")]
    Incompatible { major: u16, minor: u16 },
    #[error(transparent)]
    InvalidInfo(#[from] InvalidScreenInfo),
    #[error("unexpected {0} during handshake")]
    Unexpected(&'static str),
    #[error("peer closed the connection during handshake")]
    Disconnected,
}

impl From<ProtocolError> for HandshakeError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::UnknownProtocolTag => HandshakeError::TagMismatch,
            other => HandshakeError::Malformed(other),
        }
    }
}

impl HandshakeError {
    /// The message to send the peer before closing, if any.
    pub fn reply(&self) -> Option<Message> {
        match self {
            HandshakeError::Timeout(_)
            | HandshakeError::TagMismatch
            | HandshakeError::Incompatible { .. } => Some(Message::Incompatible {
                major: PROTOCOL_MAJOR,
                minor: PROTOCOL_MINOR,
            }),
            HandshakeError::Malformed(_)
            | HandshakeError::InvalidInfo(_)
            | HandshakeError::Unexpected(_) => Some(Message::Bad),
            HandshakeError::Disconnected => None,
        }
    }
}

/// Where the handshake is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    AwaitingHello,
    AwaitingHelloBack,
    AwaitingInfo,
    Ready,
    Failed,
}

/// Everything learned about the peer during a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeOutcome {
    /// Name as declared by the peer (may be an alias).
    pub name: ScreenName,
    pub variant: ProtocolVariant,
    pub shape: ScreenShape,
    pub cursor: (i32, i32),
}

/// Per-connection handshake state machine.
#[derive(Debug)]
pub struct HandshakeSession {
    protocol: ProtocolName,
    state: HandshakeState,
    variant: Option<ProtocolVariant>,
    name: Option<ScreenName>,
    outcome: Option<HandshakeOutcome>,
}

impl HandshakeSession {
    pub fn new(protocol: ProtocolName) -> Self {
        Self {
            protocol,
            state: HandshakeState::AwaitingHello,
            variant: None,
            name: None,
            outcome: None,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == HandshakeState::Ready
    }

    /// The negotiated version, or the server's own before negotiation.
    pub fn variant(&self) -> ProtocolVariant {
        self.variant.unwrap_or(ProtocolVariant::CURRENT)
    }

    /// Returns the greeting to send first.
    pub fn start(&mut self) -> Message {
        self.state = HandshakeState::AwaitingHelloBack;
        Message::Hello {
            protocol: self.protocol,
            major: PROTOCOL_MAJOR,
            minor: PROTOCOL_MINOR,
        }
    }

    /// Handles one frame payload from the peer.
    ///
    /// Returns the messages to send in reply.  Any error moves the handshake
    /// to [`HandshakeState::Failed`]; send [`HandshakeError::reply`] and close.
    pub fn receive(&mut self, payload: &[u8]) -> Result<Vec<Message>, HandshakeError> {
        let result = match self.state {
            HandshakeState::AwaitingHelloBack => self.on_hello_back(payload),
            HandshakeState::AwaitingInfo => self.on_info(payload),
            HandshakeState::AwaitingHello => Err(HandshakeError::Unexpected("data before hello")),
            HandshakeState::Ready | HandshakeState::Failed => {
                Err(HandshakeError::Unexpected("data after handshake"))
            }
        };
        if result.is_err() {
            self.state = HandshakeState::Failed;
        }
        result
    }

    /// Records that the peer did not answer within `after`.
    pub fn timed_out(&mut self, after: Duration) -> HandshakeError {
        self.state = HandshakeState::Failed;
        HandshakeError::Timeout(after)
    }

    /// Consumes a ready handshake.
    pub fn finish(self) -> Option<HandshakeOutcome> {
        if self.state == HandshakeState::Ready {
            self.outcome
        } else {
            None
        }
    }

    fn on_hello_back(&mut self, payload: &[u8]) -> Result<Vec<Message>, HandshakeError> {
        let Message::HelloBack {
            protocol,
            major,
            minor,
            name,
        } = decode_hello_back(payload)?
        else {
            return Err(HandshakeError::Unexpected("message instead of hello-back"));
        };

        if protocol != self.protocol {
            return Err(HandshakeError::TagMismatch);
        }
        // Versions travel as signed 16-bit numbers.
        let variant = ProtocolVariant::new(major, minor);
        if (major as i16) <= 0 || (minor as i16) < 0 || !variant.is_supported() {
            return Err(HandshakeError::Incompatible { major, minor });
        }

        debug!(%name, %variant, "hello-back");
        self.variant = Some(variant);
        self.name = Some(ScreenName::new(name));
        self.state = HandshakeState::AwaitingInfo;
        Ok(vec![Message::QueryInfo])
    }

    fn on_info(&mut self, payload: &[u8]) -> Result<Vec<Message>, HandshakeError> {
        match decode_message(payload, self.variant())? {
            Message::Info(screen_info) => {
                let (shape, cursor) = validate_info(&screen_info)?;
                let name = self
                    .name
                    .take()
                    .ok_or(HandshakeError::Unexpected("info before hello-back"))?;
                info!(screen = %name, variant = %self.variant(), ?shape, "handshake complete");
                self.outcome = Some(HandshakeOutcome {
                    name,
                    variant: self.variant(),
                    shape,
                    cursor,
                });
                self.state = HandshakeState::Ready;
                Ok(vec![Message::InfoAck])
            }
            Message::KeepAlive | Message::Noop => Ok(Vec::new()),
            other => Err(HandshakeError::Unexpected(other.name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use edgeshare_core::encode_message;
    use edgeshare_core::protocol::ScreenInfo;

    use super::*;

    /// Encodes `msg` and strips the 4-byte length prefix.
    fn payload(msg: &Message) -> Vec<u8> {
        let framed = encode_message(msg, ProtocolVariant::CURRENT).unwrap();
        framed[4..].to_vec()
    }

    fn hello_back(protocol: ProtocolName, major: u16, minor: u16, name: &str) -> Vec<u8> {
        payload(&Message::HelloBack {
            protocol,
            major,
            minor,
            name: name.to_string(),
        })
    }

    fn info(width: u16, height: u16) -> Vec<u8> {
        payload(&Message::Info(ScreenInfo {
            x: 0,
            y: 0,
            width,
            height,
            mx: 10,
            my: 10,
        }))
    }

    fn started() -> HandshakeSession {
        let mut hs = HandshakeSession::new(ProtocolName::Synergy);
        hs.start();
        hs
    }

    // ── Happy path ───────────────────────────────────────────────────────────

    #[test]
    fn test_start_sends_hello_with_server_version() {
        let mut hs = HandshakeSession::new(ProtocolName::Barrier);

        let hello = hs.start();

        assert_eq!(
            hello,
            Message::Hello {
                protocol: ProtocolName::Barrier,
                major: 1,
                minor: 8
            }
        );
        assert_eq!(hs.state(), HandshakeState::AwaitingHelloBack);
    }

    #[test]
    fn test_full_handshake_yields_outcome() {
        // Arrange
        let mut hs = started();

        // Act
        let after_hello = hs.receive(&hello_back(ProtocolName::Synergy, 1, 6, "laptop")).unwrap();
        let after_info = hs.receive(&info(1280, 800)).unwrap();

        // Assert
        assert_eq!(after_hello, vec![Message::QueryInfo]);
        assert_eq!(after_info, vec![Message::InfoAck]);
        assert!(hs.is_ready());
        let outcome = hs.finish().unwrap();
        assert_eq!(outcome.name.as_str(), "laptop");
        assert_eq!(outcome.variant, ProtocolVariant::new(1, 6));
        assert_eq!(outcome.shape, ScreenShape::new(0, 0, 1280, 800));
        assert_eq!(outcome.cursor, (10, 10));
    }

    #[test]
    fn test_keep_alive_while_awaiting_info_is_tolerated() {
        let mut hs = started();
        hs.receive(&hello_back(ProtocolName::Synergy, 1, 8, "laptop")).unwrap();

        let replies = hs.receive(&payload(&Message::KeepAlive)).unwrap();

        assert!(replies.is_empty());
        assert_eq!(hs.state(), HandshakeState::AwaitingInfo);
    }

    // ── Version negotiation ──────────────────────────────────────────────────

    #[test]
    fn test_unsupported_versions_are_incompatible() {
        for (major, minor) in [(2, 0), (1, 9), (0, 5), (0xFFFF, 0), (1, 0x8000)] {
            let mut hs = started();

            let err = hs
                .receive(&hello_back(ProtocolName::Synergy, major, minor, "laptop"))
                .unwrap_err();

            assert_eq!(err, HandshakeError::Incompatible { major, minor });
            assert_eq!(err.reply(), Some(Message::Incompatible { major: 1, minor: 8 }));
            assert_eq!(hs.state(), HandshakeState::Failed);
        }
    }

    #[test]
    fn test_every_supported_minor_is_accepted() {
        for minor in 0..=8 {
            let mut hs = started();
            assert!(hs
                .receive(&hello_back(ProtocolName::Synergy, 1, minor, "laptop"))
                .is_ok());
        }
    }

    #[test]
    fn test_other_protocol_tag_is_incompatible() {
        let mut hs = started();

        let err = hs
            .receive(&hello_back(ProtocolName::Barrier, 1, 6, "laptop"))
            .unwrap_err();

        assert_eq!(err, HandshakeError::TagMismatch);
        assert_eq!(err.reply(), Some(Message::Incompatible { major: 1, minor: 8 }));
    }

    // ── Malformed input ──────────────────────────────────────────────────────

    #[test]
    fn test_oversized_hello_back_is_bad() {
        let mut hs = started();
        let long_name = "x".repeat(2000);

        let err = hs
            .receive(&hello_back(ProtocolName::Synergy, 1, 6, &long_name))
            .unwrap_err();

        assert!(matches!(err, HandshakeError::Malformed(ProtocolError::HelloTooLong(_))));
        assert_eq!(err.reply(), Some(Message::Bad));
    }

    #[test]
    fn test_truncated_hello_back_is_bad() {
        let mut hs = started();

        let err = hs.receive(b"Synergy\x00").unwrap_err();

        assert_eq!(err.reply(), Some(Message::Bad));
    }

    #[test]
    fn test_zero_sized_screen_is_bad() {
        let mut hs = started();
        hs.receive(&hello_back(ProtocolName::Synergy, 1, 6, "laptop")).unwrap();

        let err = hs.receive(&info(0, 800)).unwrap_err();

        assert!(matches!(err, HandshakeError::InvalidInfo(_)));
        assert_eq!(err.reply(), Some(Message::Bad));
        assert!(hs.finish().is_none());
    }

    #[test]
    fn test_application_message_before_info_is_bad() {
        let mut hs = started();
        hs.receive(&hello_back(ProtocolName::Synergy, 1, 6, "laptop")).unwrap();

        let err = hs
            .receive(&payload(&Message::MouseMove { x: 1, y: 1 }))
            .unwrap_err();

        assert_eq!(err, HandshakeError::Unexpected("DMMV"));
    }

    #[test]
    fn test_timeout_replies_incompatible() {
        let mut hs = started();

        let err = hs.timed_out(Duration::from_secs(5));

        assert_eq!(err.reply(), Some(Message::Incompatible { major: 1, minor: 8 }));
        assert_eq!(hs.state(), HandshakeState::Failed);
    }
}
