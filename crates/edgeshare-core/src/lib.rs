//! # edgeshare-core
//!
//! Shared library for the edgeshare server containing the screen topology,
//! the switching primitives, and the wire codec spoken by secondary screens.
//!
//! It has zero dependencies on OS APIs, async runtimes, or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! edgeshare is a software KVM switch: one computer (the "primary screen")
//! captures its local keyboard and mouse and forwards them to other computers
//! ("secondary screens") when the cursor crosses a configured screen edge.
//!
//! This crate defines:
//!
//! - **`domain`** – Pure rules with no I/O.  The most important piece is the
//!   [`Topology`]: which screen lies on which side of which other screen, over
//!   which fraction of the edge, plus the option sets that tune switching.
//!
//! - **`protocol`** – How bytes travel over the network.  Every message is a
//!   length-prefixed frame that starts with a 4-byte ASCII opcode (`CINN`,
//!   `DMMV`, ...) followed by big-endian fields.  The exact fields depend on the
//!   [`ProtocolVariant`] negotiated during the handshake.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `edgeshare_core::Topology` instead of `edgeshare_core::domain::topology::Topology`.
pub use domain::options::{OptionId, OptionSet};
pub use domain::screen::{
    ClipboardSlot, CornerMask, Direction, ModifierMask, ScreenName, ScreenShape,
};
pub use domain::topology::{EdgeLink, Interval, Topology, TopologyError};
pub use protocol::codec::{decode_frame, decode_message, encode_message, Frame, ProtocolError};
pub use protocol::messages::{Message, ProtocolName, ProtocolVariant};
