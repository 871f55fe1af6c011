//! TCP networking for secondary screens.
//!
//! # Connection lifecycle (for beginners)
//!
//! ```text
//!  accept ──► negotiate (Hello / HelloBack / QInfo / DInfo / CIAK)
//!                 │ failure: EICV or EBAD, close
//!                 ▼
//!            ScreenSession ──SessionReady──► Server
//!                 │
//!     ┌───────────┴────────────┐
//!  reader task             writer task
//!  frames → SessionMessage  outbound channel → frames
//!  EOF    → SessionClosed   + CALV every 3 s (1.3+)
//! ```
//!
//! Each connection owns two tasks.  The server never touches the socket: it
//! pushes [`Message`]s into the session's outbound channel and receives
//! decoded messages as events.
//!
//! [`Message`]: edgeshare_core::Message

use std::net::SocketAddr;

use edgeshare_core::ProtocolError;
use thiserror::Error;

use crate::application::handshake::HandshakeError;

pub mod framing;
pub mod listener;

/// Error type for socket and stream operations.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    /// The peer hung up in the middle of a frame.
    #[error("connection closed mid-frame")]
    UnexpectedEof,
}
