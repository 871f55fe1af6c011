//! ScreenSession: the server's view of one connected secondary screen.
//!
//! A session is created once the handshake has finished.  It remembers the
//! screen's shape, the last cursor position the screen reported, where the
//! cursor should land on an explicit jump, and which clipboard slots the
//! screen has not yet seen.  Every method that "talks" to the screen just
//! pushes a [`Message`] onto the session's outbound channel; a writer task
//! owned by the network layer turns those into bytes.
//!
//! # Clipboard transfer (for beginners)
//!
//! Screens speaking protocol 1.6 or later receive clipboards in pieces:
//!
//! ```text
//! DCLP slot seq Start "70000"      ← total size as decimal text
//! DCLP slot seq Chunk <32 KiB>
//! DCLP slot seq Chunk <32 KiB>
//! DCLP slot seq Chunk <4464 B>
//! DCLP slot seq End   ""
//! ```
//!
//! Older screens get one `DCLP` with the whole payload.

use std::fmt;

use edgeshare_core::protocol::{ClipboardMark, ScreenInfo, CLIPBOARD_CHUNK_SIZE, MAX_FIELD_LENGTH};
use edgeshare_core::{ClipboardSlot, Message, ProtocolVariant, ScreenName, ScreenShape};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Largest clipboard a screen may announce in a chunked transfer.
const MAX_INCOMING_CLIPBOARD: usize = 32 * 1024 * 1024;

// ── SessionId ─────────────────────────────────────────────────────────────────

/// Identity of a session for the lifetime of its connection.
///
/// The primary screen always uses [`SessionId::PRIMARY`] (the nil UUID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    pub const PRIMARY: SessionId = SessionId(Uuid::nil());

    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn is_primary(self) -> bool {
        self == Self::PRIMARY
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Screen info validation ───────────────────────────────────────────────────

/// A `DINF` report with a non-positive width or height.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid screen info: {width}x{height}")]
pub struct InvalidScreenInfo {
    pub width: i32,
    pub height: i32,
}

/// Checks a `DINF` report and returns the shape and cursor position to use.
///
/// A cursor outside the shape is replaced by the shape's center.
pub fn validate_info(info: &ScreenInfo) -> Result<(ScreenShape, (i32, i32)), InvalidScreenInfo> {
    let shape = info.shape();
    if !shape.is_valid() {
        return Err(InvalidScreenInfo {
            width: shape.width,
            height: shape.height,
        });
    }
    let (mx, my) = (i32::from(info.mx), i32::from(info.my));
    let cursor = if shape.contains(mx, my) {
        (mx, my)
    } else {
        shape.center()
    };
    Ok((shape, cursor))
}

/// Converts a server coordinate to the 16-bit wire form, saturating.
pub(crate) fn to_wire(v: i32) -> i16 {
    v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

// ── Clipboard state ───────────────────────────────────────────────────────────

#[derive(Debug)]
struct IncomingClipboard {
    seq: u32,
    expected: usize,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct SlotState {
    /// The screen has not seen the current payload of this slot.
    dirty: bool,
    incoming: Option<IncomingClipboard>,
}

// ── ScreenSession ─────────────────────────────────────────────────────────────

/// One connected secondary screen.
#[derive(Debug)]
pub struct ScreenSession {
    id: SessionId,
    name: ScreenName,
    variant: ProtocolVariant,
    outbound: mpsc::UnboundedSender<Message>,
    shape: ScreenShape,
    cursor: (i32, i32),
    jump_cursor: (i32, i32),
    /// Sequence number of the most recent `CINN`; stamped on clipboard data.
    enter_seq: u32,
    slots: [SlotState; 2],
    options: Vec<u32>,
    reader: Option<AbortHandle>,
}

impl ScreenSession {
    /// Creates a session for a screen that finished its handshake.
    ///
    /// Both clipboard slots start dirty so the first entry pushes them.
    pub fn new(
        name: ScreenName,
        variant: ProtocolVariant,
        shape: ScreenShape,
        cursor: (i32, i32),
        outbound: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            name,
            variant,
            outbound,
            shape,
            cursor,
            jump_cursor: cursor,
            enter_seq: 0,
            slots: [
                SlotState {
                    dirty: true,
                    incoming: None,
                },
                SlotState {
                    dirty: true,
                    incoming: None,
                },
            ],
            options: Vec::new(),
            reader: None,
        }
    }

    /// Ties the connection's reader task to this session.  The task is
    /// aborted when the session is dropped.
    pub fn attach_reader(&mut self, reader: AbortHandle) {
        self.reader = Some(reader);
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> &ScreenName {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: ScreenName) {
        self.name = name;
    }

    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    pub fn shape(&self) -> ScreenShape {
        self.shape
    }

    /// Last cursor position reported by the screen.
    pub fn cursor(&self) -> (i32, i32) {
        self.cursor
    }

    pub fn jump_cursor(&self) -> (i32, i32) {
        self.jump_cursor
    }

    pub fn set_jump_cursor(&mut self, x: i32, y: i32) {
        self.jump_cursor = (x, y);
    }

    /// Option pairs most recently sent with `DSOP`.
    pub fn options(&self) -> &[u32] {
        &self.options
    }

    fn send(&self, message: Message) {
        trace!(screen = %self.name, message = message.name(), "queue");
        if self.outbound.send(message).is_err() {
            trace!(screen = %self.name, "outbound channel closed");
        }
    }

    // ── Focus ────────────────────────────────────────────────────────────────

    pub fn enter(&mut self, x: i32, y: i32, seq: u32, mask: u16, for_screensaver: bool) {
        debug!(screen = %self.name, x, y, seq, mask, for_screensaver, "send enter");
        self.enter_seq = seq;
        self.send(Message::Enter {
            x: to_wire(x),
            y: to_wire(y),
            seq,
            mask,
        });
    }

    /// Tells the screen it lost focus.  A remote screen never vetoes.
    pub fn leave(&mut self) -> bool {
        debug!(screen = %self.name, "send leave");
        self.send(Message::Leave);
        true
    }

    pub fn screensaver(&self, active: bool) {
        debug!(screen = %self.name, active, "send screensaver");
        self.send(Message::ScreenSaver { active });
    }

    /// Sends `reply` (normally `CBYE`) asking the peer to hang up.
    pub fn close(&self, reply: Message) {
        debug!(screen = %self.name, reply = reply.name(), "send close");
        self.send(reply);
    }

    pub fn reject(&self, reply: Message) {
        self.send(reply);
    }

    /// Applies a `DINF` received after the handshake and acknowledges it.
    pub fn apply_info(&mut self, info: &ScreenInfo) -> Result<(), InvalidScreenInfo> {
        let (shape, cursor) = validate_info(info)?;
        debug!(screen = %self.name, ?shape, ?cursor, "screen info");
        self.shape = shape;
        self.cursor = cursor;
        self.send(Message::InfoAck);
        Ok(())
    }

    // ── Options ──────────────────────────────────────────────────────────────

    /// Replaces the screen's options: `CROP` followed by `DSOP`.
    pub fn send_options(&mut self, options: Vec<u32>) {
        debug!(screen = %self.name, pairs = options.len() / 2, "send options");
        self.send(Message::ResetOptions);
        self.send(Message::SetOptions(options.clone()));
        self.options = options;
    }

    // ── Input relay ──────────────────────────────────────────────────────────

    pub fn key_down(&self, key: u16, mask: u16, button: u16) {
        self.send(Message::KeyDown { key, mask, button });
    }

    pub fn key_repeat(&self, key: u16, mask: u16, count: u16, button: u16) {
        self.send(Message::KeyRepeat {
            key,
            mask,
            count,
            button,
        });
    }

    pub fn key_up(&self, key: u16, mask: u16, button: u16) {
        self.send(Message::KeyUp { key, mask, button });
    }

    pub fn mouse_down(&self, button: u8) {
        self.send(Message::MouseDown { button });
    }

    pub fn mouse_up(&self, button: u8) {
        self.send(Message::MouseUp { button });
    }

    pub fn mouse_move(&self, x: i32, y: i32) {
        self.send(Message::MouseMove {
            x: to_wire(x),
            y: to_wire(y),
        });
    }

    /// Relative motion; dropped for screens older than 1.2.
    pub fn mouse_relative_move(&self, dx: i32, dy: i32) {
        if !self.variant.has_relative_moves() {
            return;
        }
        self.send(Message::MouseRelMove {
            dx: to_wire(dx),
            dy: to_wire(dy),
        });
    }

    pub fn mouse_wheel(&self, dx: i32, dy: i32) {
        self.send(Message::MouseWheel {
            dx: to_wire(dx),
            dy: to_wire(dy),
        });
    }

    // ── Clipboard ────────────────────────────────────────────────────────────

    pub fn is_clipboard_dirty(&self, slot: ClipboardSlot) -> bool {
        self.slots[slot.index()].dirty
    }

    pub fn set_clipboard_dirty(&mut self, slot: ClipboardSlot, dirty: bool) {
        self.slots[slot.index()].dirty = dirty;
    }

    /// Tells the screen someone else now owns `slot`.
    pub fn grab_clipboard(&mut self, slot: ClipboardSlot, seq: u32) {
        debug!(screen = %self.name, ?slot, seq, "send clipboard grab");
        self.send(Message::ClipboardGrab { slot, seq });
        self.slots[slot.index()].dirty = true;
    }

    /// Pushes `data` into `slot` if the screen has not seen it yet.
    pub fn set_clipboard(&mut self, slot: ClipboardSlot, data: &[u8]) {
        let state = &mut self.slots[slot.index()];
        if !state.dirty {
            return;
        }
        state.dirty = false;

        let seq = self.enter_seq;
        if self.variant.has_clipboard_chunks() {
            debug!(screen = %self.name, ?slot, len = data.len(), "send clipboard in chunks");
            self.send(Message::ClipboardData {
                slot,
                seq,
                mark: Some(ClipboardMark::Start),
                data: data.len().to_string().into_bytes(),
            });
            for chunk in data.chunks(CLIPBOARD_CHUNK_SIZE) {
                self.send(Message::ClipboardData {
                    slot,
                    seq,
                    mark: Some(ClipboardMark::Chunk),
                    data: chunk.to_vec(),
                });
            }
            self.send(Message::ClipboardData {
                slot,
                seq,
                mark: Some(ClipboardMark::End),
                data: Vec::new(),
            });
        } else if data.len() > MAX_FIELD_LENGTH {
            warn!(
                screen = %self.name,
                ?slot,
                len = data.len(),
                "clipboard too large for protocol {}, not sent",
                self.variant
            );
        } else {
            debug!(screen = %self.name, ?slot, len = data.len(), "send clipboard");
            self.send(Message::ClipboardData {
                slot,
                seq,
                mark: None,
                data: data.to_vec(),
            });
        }
    }

    /// Feeds one received `DCLP` into the slot's reassembly buffer.
    ///
    /// Returns `(seq, payload)` once a complete clipboard has arrived.
    pub fn receive_clipboard(
        &mut self,
        slot: ClipboardSlot,
        seq: u32,
        mark: Option<ClipboardMark>,
        data: Vec<u8>,
    ) -> Option<(u32, Vec<u8>)> {
        let name = &self.name;
        let state = &mut self.slots[slot.index()];
        match mark {
            None => Some((seq, data)),
            Some(ClipboardMark::Start) => {
                let expected = std::str::from_utf8(&data)
                    .ok()
                    .and_then(|s| s.trim().parse::<usize>().ok());
                match expected {
                    Some(expected) if expected <= MAX_INCOMING_CLIPBOARD => {
                        trace!(screen = %name, ?slot, seq, expected, "clipboard transfer start");
                        state.incoming = Some(IncomingClipboard {
                            seq,
                            expected,
                            data: Vec::with_capacity(expected.min(CLIPBOARD_CHUNK_SIZE)),
                        });
                    }
                    _ => {
                        warn!(screen = %name, ?slot, "invalid clipboard transfer size");
                        state.incoming = None;
                    }
                }
                None
            }
            Some(ClipboardMark::Chunk) => {
                match state.incoming.as_mut() {
                    Some(incoming) if incoming.seq == seq => {
                        if incoming.data.len() + data.len() > incoming.expected {
                            warn!(screen = %name, ?slot, "clipboard transfer overran its size");
                            state.incoming = None;
                        } else {
                            incoming.data.extend_from_slice(&data);
                        }
                    }
                    _ => debug!(screen = %name, ?slot, seq, "clipboard chunk without start"),
                }
                None
            }
            Some(ClipboardMark::End) => match state.incoming.take() {
                Some(incoming) if incoming.seq == seq && incoming.data.len() == incoming.expected => {
                    Some((seq, incoming.data))
                }
                Some(incoming) => {
                    warn!(
                        screen = %name,
                        ?slot,
                        got = incoming.data.len(),
                        expected = incoming.expected,
                        "incomplete clipboard transfer"
                    );
                    None
                }
                None => {
                    debug!(screen = %name, ?slot, seq, "clipboard end without start");
                    None
                }
            },
        }
    }
}

impl Drop for ScreenSession {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
