//! All edgeshare protocol message types.
//!
//! Every message after the handshake starts with a four-character ASCII
//! opcode.  The first letter groups them:
//!
//! | Prefix | Meaning                          | Examples           |
//! |--------|----------------------------------|--------------------|
//! | `C`    | command (server → screen)        | `CINN`, `COUT`     |
//! | `D`    | data (input events, clipboard)   | `DMMV`, `DCLP`     |
//! | `Q`    | query                            | `QINF`             |
//! | `E`    | error, the sender then hangs up  | `EICV`, `EBSY`     |
//!
//! The handshake messages ([`Message::Hello`] and [`Message::HelloBack`]) are
//! the exception: they start with a seven-byte protocol tag instead.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::screen::{ClipboardSlot, ScreenShape};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Major protocol version spoken by this server.
pub const PROTOCOL_MAJOR: u16 = 1;

/// Highest minor protocol version spoken by this server.
pub const PROTOCOL_MINOR: u16 = 8;

/// Largest frame payload accepted from a peer.
pub const MAX_MESSAGE_LENGTH: usize = 4 * 1024 * 1024;

/// Largest string or list field accepted inside a payload.
pub const MAX_FIELD_LENGTH: usize = 1024 * 1024;

/// Largest `HelloBack` payload accepted during the handshake.
pub const MAX_HELLO_LENGTH: usize = 1024;

/// Size of the protocol tag that opens `Hello` and `HelloBack`.
pub const PROTOCOL_TAG_LENGTH: usize = 7;

/// Largest data chunk in a chunked clipboard transfer.
pub const CLIPBOARD_CHUNK_SIZE: usize = 32 * 1024;

/// How often keep-alives are sent to peers that understand them.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(3);

/// Number of missed keep-alive intervals after which a peer is declared dead.
pub const KEEP_ALIVES_UNTIL_DEATH: u32 = 3;

// ── Protocol tag ──────────────────────────────────────────────────────────────

/// Which seven-byte tag opens the handshake.
///
/// Both tags speak the same message set; they only differ in the greeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolName {
    #[default]
    Synergy,
    Barrier,
}

impl ProtocolName {
    pub fn tag(self) -> &'static [u8; PROTOCOL_TAG_LENGTH] {
        match self {
            ProtocolName::Synergy => b"Synergy",
            ProtocolName::Barrier => b"Barrier",
        }
    }

    pub fn from_tag(tag: &[u8]) -> Option<ProtocolName> {
        match tag {
            b"Synergy" => Some(ProtocolName::Synergy),
            b"Barrier" => Some(ProtocolName::Barrier),
            _ => None,
        }
    }

    /// Value of the `PROT` option for this tag.
    pub fn option_value(self) -> i32 {
        match self {
            ProtocolName::Synergy => 0,
            ProtocolName::Barrier => 1,
        }
    }
}

impl fmt::Display for ProtocolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolName::Synergy => f.write_str("synergy"),
            ProtocolName::Barrier => f.write_str("barrier"),
        }
    }
}

// ── Protocol variant ──────────────────────────────────────────────────────────

/// The protocol version a peer speaks, fixed once at handshake time.
///
/// Field presence for some messages depends on the version; the capability
/// methods below answer those questions so the codec never compares version
/// numbers itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolVariant {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVariant {
    /// The newest version this server speaks.
    pub const CURRENT: ProtocolVariant = ProtocolVariant {
        major: PROTOCOL_MAJOR,
        minor: PROTOCOL_MINOR,
    };

    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Returns `true` for 1.0 through 1.8.
    pub fn is_supported(self) -> bool {
        self.major == PROTOCOL_MAJOR && self.minor <= PROTOCOL_MINOR
    }

    fn at_least(self, minor: u16) -> bool {
        self.major > PROTOCOL_MAJOR || (self.major == PROTOCOL_MAJOR && self.minor >= minor)
    }

    /// Key messages carry the physical key button (1.1+).
    pub fn has_key_button(self) -> bool {
        self.at_least(1)
    }

    /// Relative mouse motion can be sent (1.2+).
    pub fn has_relative_moves(self) -> bool {
        self.at_least(2)
    }

    /// Keep-alives are exchanged and the wheel carries a horizontal delta (1.3+).
    pub fn has_keep_alive(self) -> bool {
        self.at_least(3)
    }

    pub fn has_horizontal_wheel(self) -> bool {
        self.at_least(3)
    }

    /// Clipboard data travels as start/chunk/end messages (1.6+).
    pub fn has_clipboard_chunks(self) -> bool {
        self.at_least(6)
    }
}

impl Default for ProtocolVariant {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

// ── Opcodes ───────────────────────────────────────────────────────────────────

/// Four-character opcodes, as they appear on the wire.
pub mod opcode {
    pub const NOOP: &[u8; 4] = b"CNOP";
    pub const CLOSE: &[u8; 4] = b"CBYE";
    pub const ENTER: &[u8; 4] = b"CINN";
    pub const LEAVE: &[u8; 4] = b"COUT";
    pub const CLIPBOARD_GRAB: &[u8; 4] = b"CCLP";
    pub const SCREEN_SAVER: &[u8; 4] = b"CSEC";
    pub const RESET_OPTIONS: &[u8; 4] = b"CROP";
    pub const INFO_ACK: &[u8; 4] = b"CIAK";
    pub const KEEP_ALIVE: &[u8; 4] = b"CALV";
    pub const KEY_DOWN: &[u8; 4] = b"DKDN";
    pub const KEY_REPEAT: &[u8; 4] = b"DKRP";
    pub const KEY_UP: &[u8; 4] = b"DKUP";
    pub const MOUSE_DOWN: &[u8; 4] = b"DMDN";
    pub const MOUSE_UP: &[u8; 4] = b"DMUP";
    pub const MOUSE_MOVE: &[u8; 4] = b"DMMV";
    pub const MOUSE_REL_MOVE: &[u8; 4] = b"DMRM";
    pub const MOUSE_WHEEL: &[u8; 4] = b"DMWM";
    pub const CLIPBOARD_DATA: &[u8; 4] = b"DCLP";
    pub const INFO: &[u8; 4] = b"DINF";
    pub const SET_OPTIONS: &[u8; 4] = b"DSOP";
    pub const QUERY_INFO: &[u8; 4] = b"QINF";
    pub const INCOMPATIBLE: &[u8; 4] = b"EICV";
    pub const BUSY: &[u8; 4] = b"EBSY";
    pub const UNKNOWN: &[u8; 4] = b"EUNK";
    pub const BAD: &[u8; 4] = b"EBAD";
}

// ── Clipboard transfer ────────────────────────────────────────────────────────

/// Position of a `DCLP` message within a chunked clipboard transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClipboardMark {
    /// Opens a transfer.  The data is the decimal total size.
    Start = 1,
    /// At most [`CLIPBOARD_CHUNK_SIZE`] bytes of the payload.
    Chunk = 2,
    /// Closes a transfer.  The data is empty.
    End = 3,
}

impl TryFrom<u8> for ClipboardMark {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            1 => Ok(ClipboardMark::Start),
            2 => Ok(ClipboardMark::Chunk),
            3 => Ok(ClipboardMark::End),
            _ => Err(()),
        }
    }
}

// ── Screen info ───────────────────────────────────────────────────────────────

/// Shape and cursor position reported by a screen in `DINF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenInfo {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
    /// Cursor X at the time of the report.
    pub mx: i16,
    /// Cursor Y at the time of the report.
    pub my: i16,
}

impl ScreenInfo {
    pub fn shape(&self) -> ScreenShape {
        ScreenShape::new(
            i32::from(self.x),
            i32::from(self.y),
            i32::from(self.width),
            i32::from(self.height),
        )
    }
}

// ── Message ───────────────────────────────────────────────────────────────────

/// Every message exchanged between the server and a secondary screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    // Handshake
    /// Server greeting: tag and the server's version.
    Hello {
        protocol: ProtocolName,
        major: u16,
        minor: u16,
    },
    /// Screen reply: tag, the screen's version, and its name.
    HelloBack {
        protocol: ProtocolName,
        major: u16,
        minor: u16,
        name: String,
    },

    // Commands
    Noop,
    /// Asks the screen to disconnect.
    Close,
    /// The cursor enters the screen at `(x, y)`.
    Enter { x: i16, y: i16, seq: u32, mask: u16 },
    Leave,
    /// The sender now owns `slot`.
    ClipboardGrab { slot: ClipboardSlot, seq: u32 },
    ScreenSaver { active: bool },
    ResetOptions,
    InfoAck,
    KeepAlive,

    // Data
    KeyDown { key: u16, mask: u16, button: u16 },
    KeyRepeat {
        key: u16,
        mask: u16,
        count: u16,
        button: u16,
    },
    KeyUp { key: u16, mask: u16, button: u16 },
    MouseDown { button: u8 },
    MouseUp { button: u8 },
    MouseMove { x: i16, y: i16 },
    MouseRelMove { dx: i16, dy: i16 },
    MouseWheel { dx: i16, dy: i16 },
    /// Clipboard contents.  `mark` is `None` for versions before 1.6, where the
    /// whole payload travels in one message.
    ClipboardData {
        slot: ClipboardSlot,
        seq: u32,
        mark: Option<ClipboardMark>,
        data: Vec<u8>,
    },
    Info(ScreenInfo),
    /// Flattened `id, value` pairs.
    SetOptions(Vec<u32>),
    QueryInfo,

    // Errors
    Incompatible { major: u16, minor: u16 },
    Busy,
    Unknown,
    Bad,

    /// A well-framed message whose opcode this server does not know.
    Unrecognized { opcode: [u8; 4] },
}

impl Message {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Message::Hello { .. } => "Hello",
            Message::HelloBack { .. } => "HelloBack",
            Message::Noop => "CNOP",
            Message::Close => "CBYE",
            Message::Enter { .. } => "CINN",
            Message::Leave => "COUT",
            Message::ClipboardGrab { .. } => "CCLP",
            Message::ScreenSaver { .. } => "CSEC",
            Message::ResetOptions => "CROP",
            Message::InfoAck => "CIAK",
            Message::KeepAlive => "CALV",
            Message::KeyDown { .. } => "DKDN",
            Message::KeyRepeat { .. } => "DKRP",
            Message::KeyUp { .. } => "DKUP",
            Message::MouseDown { .. } => "DMDN",
            Message::MouseUp { .. } => "DMUP",
            Message::MouseMove { .. } => "DMMV",
            Message::MouseRelMove { .. } => "DMRM",
            Message::MouseWheel { .. } => "DMWM",
            Message::ClipboardData { .. } => "DCLP",
            Message::Info(_) => "DINF",
            Message::SetOptions(_) => "DSOP",
            Message::QueryInfo => "QINF",
            Message::Incompatible { .. } => "EICV",
            Message::Busy => "EBSY",
            Message::Unknown => "EUNK",
            Message::Bad => "EBAD",
            Message::Unrecognized { .. } => "unrecognized",
        }
    }

    /// Returns `true` for the `E*` messages, after which the sender disconnects.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Message::Incompatible { .. } | Message::Busy | Message::Unknown | Message::Bad
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_capabilities_by_minor_version() {
        let v10 = ProtocolVariant::new(1, 0);
        let v13 = ProtocolVariant::new(1, 3);
        let v16 = ProtocolVariant::new(1, 6);

        assert!(!v10.has_key_button());
        assert!(!v10.has_keep_alive());
        assert!(v13.has_keep_alive());
        assert!(v13.has_horizontal_wheel());
        assert!(!v13.has_clipboard_chunks());
        assert!(v16.has_clipboard_chunks());
    }

    #[test]
    fn test_variant_supported_range() {
        assert!(ProtocolVariant::new(1, 0).is_supported());
        assert!(ProtocolVariant::new(1, 8).is_supported());
        assert!(!ProtocolVariant::new(1, 9).is_supported());
        assert!(!ProtocolVariant::new(2, 0).is_supported());
        assert!(!ProtocolVariant::new(0, 5).is_supported());
    }

    #[test]
    fn test_variant_ordering() {
        assert!(ProtocolVariant::new(1, 3) < ProtocolVariant::new(1, 6));
        assert_eq!(ProtocolVariant::CURRENT.to_string(), "1.8");
    }

    #[test]
    fn test_protocol_name_tags() {
        assert_eq!(ProtocolName::Synergy.tag(), b"Synergy");
        assert_eq!(ProtocolName::from_tag(b"Barrier"), Some(ProtocolName::Barrier));
        assert_eq!(ProtocolName::from_tag(b"Nothing"), None);
    }

    #[test]
    fn test_screen_info_shape_widens_fields() {
        let info = ScreenInfo {
            x: -1920,
            y: 0,
            width: 1920,
            height: 1080,
            mx: 0,
            my: 0,
        };
        assert_eq!(info.shape(), ScreenShape::new(-1920, 0, 1920, 1080));
    }

    #[test]
    fn test_error_messages_are_flagged() {
        assert!(Message::Busy.is_error());
        assert!(Message::Incompatible { major: 1, minor: 8 }.is_error());
        assert!(!Message::Close.is_error());
    }
}
