//! Binary codec for encoding and decoding edgeshare protocol messages.
//!
//! Wire format:
//! ```text
//! [length:4][opcode:4][fields...]              after the handshake
//! [length:4][tag:7][major:2][minor:2][...]     Hello / HelloBack
//! ```
//! `length` counts the bytes after itself.  All multi-byte integers are
//! big-endian.  A string is a `u32` byte count followed by the bytes; a list
//! of `u32` is a `u32` item count followed by the items.
//!
//! Some fields only exist from a given protocol version on, so encoding and
//! decoding take the peer's [`ProtocolVariant`].

use thiserror::Error;

use crate::domain::screen::ClipboardSlot;
use crate::protocol::messages::{
    opcode, ClipboardMark, Message, ProtocolName, ProtocolVariant, ScreenInfo, MAX_FIELD_LENGTH,
    MAX_HELLO_LENGTH, MAX_MESSAGE_LENGTH, PROTOCOL_TAG_LENGTH,
};

/// Size of the length prefix in front of every frame.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The frame header declares a payload larger than [`MAX_MESSAGE_LENGTH`].
    #[error("bad framing: declared length {declared} exceeds {MAX_MESSAGE_LENGTH}")]
    BadFraming { declared: usize },

    /// The payload could not be parsed (truncated, bad enum value, UTF-8 error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A string or list field is larger than [`MAX_FIELD_LENGTH`].
    #[error("field of {len} bytes exceeds limit of {limit}")]
    FieldTooLarge { len: usize, limit: usize },

    /// The `HelloBack` payload is larger than [`MAX_HELLO_LENGTH`].
    #[error("hello reply of {0} bytes is too long")]
    HelloTooLong(usize),

    /// The handshake payload does not start with a known protocol tag.
    #[error("unknown protocol tag")]
    UnknownProtocolTag,
}

/// Result of looking for one frame at the start of a buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame<'a> {
    /// A whole frame is available.  `consumed` includes the length prefix.
    Complete { payload: &'a [u8], consumed: usize },
    /// The buffer holds only part of a frame.
    NeedMoreData,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Looks for one length-prefixed frame at the start of `buf`.
///
/// # Errors
///
/// Returns [`ProtocolError::BadFraming`] as soon as the header declares a
/// payload over the limit, before waiting for the payload itself.
///
/// # Examples
///
/// ```rust
/// use edgeshare_core::protocol::codec::{decode_frame, Frame};
///
/// let bytes = [0, 0, 0, 4, b'C', b'N', b'O', b'P'];
/// assert_eq!(
///     decode_frame(&bytes).unwrap(),
///     Frame::Complete { payload: b"CNOP", consumed: 8 }
/// );
/// assert_eq!(decode_frame(&bytes[..6]).unwrap(), Frame::NeedMoreData);
/// ```
pub fn decode_frame(buf: &[u8]) -> Result<Frame<'_>, ProtocolError> {
    if buf.len() < FRAME_HEADER_SIZE {
        return Ok(Frame::NeedMoreData);
    }
    let declared = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if declared > MAX_MESSAGE_LENGTH {
        return Err(ProtocolError::BadFraming { declared });
    }
    let total = FRAME_HEADER_SIZE + declared;
    if buf.len() < total {
        return Ok(Frame::NeedMoreData);
    }
    Ok(Frame::Complete {
        payload: &buf[FRAME_HEADER_SIZE..total],
        consumed: total,
    })
}

/// Encodes `msg` for a peer speaking `variant`, including the length prefix.
///
/// # Errors
///
/// Returns [`ProtocolError::FieldTooLarge`] if a string or list field is over
/// the limit, or [`ProtocolError::BadFraming`] if the whole payload is.
///
/// # Examples
///
/// ```rust
/// use edgeshare_core::protocol::codec::{decode_frame, decode_message, encode_message, Frame};
/// use edgeshare_core::protocol::messages::{Message, ProtocolVariant};
///
/// let v = ProtocolVariant::CURRENT;
/// let msg = Message::MouseMove { x: 10, y: -4 };
/// let bytes = encode_message(&msg, v).unwrap();
/// let Frame::Complete { payload, .. } = decode_frame(&bytes).unwrap() else { panic!() };
/// assert_eq!(decode_message(payload, v).unwrap(), msg);
/// ```
pub fn encode_message(msg: &Message, variant: ProtocolVariant) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::with_capacity(32);
    buf.extend_from_slice(&[0; FRAME_HEADER_SIZE]);
    encode_payload(&mut buf, msg, variant)?;

    let len = buf.len() - FRAME_HEADER_SIZE;
    if len > MAX_MESSAGE_LENGTH {
        return Err(ProtocolError::BadFraming { declared: len });
    }
    buf[..FRAME_HEADER_SIZE].copy_from_slice(&(len as u32).to_be_bytes());
    Ok(buf)
}

/// Decodes one post-handshake payload (opcode plus fields).
///
/// Unknown opcodes decode to [`Message::Unrecognized`]; it is up to the caller
/// to decide whether that is fatal.  Trailing bytes after the known fields are
/// ignored.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the payload is truncated or a field is invalid.
pub fn decode_message(payload: &[u8], variant: ProtocolVariant) -> Result<Message, ProtocolError> {
    require_len(payload, 4, "opcode")?;
    let code: [u8; 4] = [payload[0], payload[1], payload[2], payload[3]];
    let mut r = Reader::new(&payload[4..], "message");

    let msg = match &code {
        opcode::NOOP => Message::Noop,
        opcode::CLOSE => Message::Close,
        opcode::ENTER => Message::Enter {
            x: r.i16()?,
            y: r.i16()?,
            seq: r.u32()?,
            mask: r.u16()?,
        },
        opcode::LEAVE => Message::Leave,
        opcode::CLIPBOARD_GRAB => Message::ClipboardGrab {
            slot: r.slot()?,
            seq: r.u32()?,
        },
        opcode::SCREEN_SAVER => Message::ScreenSaver {
            active: r.u8()? != 0,
        },
        opcode::RESET_OPTIONS => Message::ResetOptions,
        opcode::INFO_ACK => Message::InfoAck,
        opcode::KEEP_ALIVE => Message::KeepAlive,
        opcode::KEY_DOWN | opcode::KEY_UP => {
            let key = r.u16()?;
            let mask = r.u16()?;
            let button = if variant.has_key_button() { r.u16()? } else { 0 };
            if &code == opcode::KEY_DOWN {
                Message::KeyDown { key, mask, button }
            } else {
                Message::KeyUp { key, mask, button }
            }
        }
        opcode::KEY_REPEAT => {
            let key = r.u16()?;
            let mask = r.u16()?;
            let count = r.u16()?;
            let button = if variant.has_key_button() { r.u16()? } else { 0 };
            Message::KeyRepeat {
                key,
                mask,
                count,
                button,
            }
        }
        opcode::MOUSE_DOWN => Message::MouseDown { button: r.u8()? },
        opcode::MOUSE_UP => Message::MouseUp { button: r.u8()? },
        opcode::MOUSE_MOVE => Message::MouseMove {
            x: r.i16()?,
            y: r.i16()?,
        },
        opcode::MOUSE_REL_MOVE => Message::MouseRelMove {
            dx: r.i16()?,
            dy: r.i16()?,
        },
        opcode::MOUSE_WHEEL => {
            let dx = if variant.has_horizontal_wheel() { r.i16()? } else { 0 };
            Message::MouseWheel { dx, dy: r.i16()? }
        }
        opcode::CLIPBOARD_DATA => {
            let slot = r.slot()?;
            let seq = r.u32()?;
            let mark = if variant.has_clipboard_chunks() {
                let raw = r.u8()?;
                Some(ClipboardMark::try_from(raw).map_err(|_| {
                    ProtocolError::MalformedPayload(format!("unknown clipboard mark: {raw}"))
                })?)
            } else {
                None
            };
            Message::ClipboardData {
                slot,
                seq,
                mark,
                data: r.bytes()?.to_vec(),
            }
        }
        opcode::INFO => Message::Info(ScreenInfo {
            x: r.i16()?,
            y: r.i16()?,
            width: r.u16()?,
            height: r.u16()?,
            mx: r.i16()?,
            my: r.i16()?,
        }),
        opcode::SET_OPTIONS => Message::SetOptions(r.u32_list()?),
        opcode::QUERY_INFO => Message::QueryInfo,
        opcode::INCOMPATIBLE => Message::Incompatible {
            major: r.u16()?,
            minor: r.u16()?,
        },
        opcode::BUSY => Message::Busy,
        opcode::UNKNOWN => Message::Unknown,
        opcode::BAD => Message::Bad,
        _ => Message::Unrecognized { opcode: code },
    };
    Ok(msg)
}

/// Decodes the server's `Hello` payload.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the tag is unknown or the payload is truncated.
pub fn decode_hello(payload: &[u8]) -> Result<Message, ProtocolError> {
    let (protocol, major, minor, _) = decode_greeting(payload)?;
    Ok(Message::Hello {
        protocol,
        major,
        minor,
    })
}

/// Decodes a screen's `HelloBack` payload.
///
/// # Errors
///
/// Returns [`ProtocolError::HelloTooLong`] for payloads over
/// [`MAX_HELLO_LENGTH`], and other [`ProtocolError`]s for a bad tag, a
/// truncated payload, or a name that is not UTF-8.
pub fn decode_hello_back(payload: &[u8]) -> Result<Message, ProtocolError> {
    if payload.len() > MAX_HELLO_LENGTH {
        return Err(ProtocolError::HelloTooLong(payload.len()));
    }
    let (protocol, major, minor, mut r) = decode_greeting(payload)?;
    let name = std::str::from_utf8(r.bytes()?)
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8 in name: {e}")))?
        .to_string();
    Ok(Message::HelloBack {
        protocol,
        major,
        minor,
        name,
    })
}

// ── Payload encoding ──────────────────────────────────────────────────────────

fn encode_payload(
    buf: &mut Vec<u8>,
    msg: &Message,
    variant: ProtocolVariant,
) -> Result<(), ProtocolError> {
    match msg {
        Message::Hello {
            protocol,
            major,
            minor,
        } => {
            buf.extend_from_slice(protocol.tag());
            put_u16(buf, *major);
            put_u16(buf, *minor);
        }
        Message::HelloBack {
            protocol,
            major,
            minor,
            name,
        } => {
            buf.extend_from_slice(protocol.tag());
            put_u16(buf, *major);
            put_u16(buf, *minor);
            put_bytes(buf, name.as_bytes())?;
        }
        Message::Noop => buf.extend_from_slice(opcode::NOOP),
        Message::Close => buf.extend_from_slice(opcode::CLOSE),
        Message::Enter { x, y, seq, mask } => {
            buf.extend_from_slice(opcode::ENTER);
            put_i16(buf, *x);
            put_i16(buf, *y);
            put_u32(buf, *seq);
            put_u16(buf, *mask);
        }
        Message::Leave => buf.extend_from_slice(opcode::LEAVE),
        Message::ClipboardGrab { slot, seq } => {
            buf.extend_from_slice(opcode::CLIPBOARD_GRAB);
            buf.push(*slot as u8);
            put_u32(buf, *seq);
        }
        Message::ScreenSaver { active } => {
            buf.extend_from_slice(opcode::SCREEN_SAVER);
            buf.push(u8::from(*active));
        }
        Message::ResetOptions => buf.extend_from_slice(opcode::RESET_OPTIONS),
        Message::InfoAck => buf.extend_from_slice(opcode::INFO_ACK),
        Message::KeepAlive => buf.extend_from_slice(opcode::KEEP_ALIVE),
        Message::KeyDown { key, mask, button } | Message::KeyUp { key, mask, button } => {
            let code = if matches!(msg, Message::KeyDown { .. }) {
                opcode::KEY_DOWN
            } else {
                opcode::KEY_UP
            };
            buf.extend_from_slice(code);
            put_u16(buf, *key);
            put_u16(buf, *mask);
            if variant.has_key_button() {
                put_u16(buf, *button);
            }
        }
        Message::KeyRepeat {
            key,
            mask,
            count,
            button,
        } => {
            buf.extend_from_slice(opcode::KEY_REPEAT);
            put_u16(buf, *key);
            put_u16(buf, *mask);
            put_u16(buf, *count);
            if variant.has_key_button() {
                put_u16(buf, *button);
            }
        }
        Message::MouseDown { button } => {
            buf.extend_from_slice(opcode::MOUSE_DOWN);
            buf.push(*button);
        }
        Message::MouseUp { button } => {
            buf.extend_from_slice(opcode::MOUSE_UP);
            buf.push(*button);
        }
        Message::MouseMove { x, y } => {
            buf.extend_from_slice(opcode::MOUSE_MOVE);
            put_i16(buf, *x);
            put_i16(buf, *y);
        }
        Message::MouseRelMove { dx, dy } => {
            buf.extend_from_slice(opcode::MOUSE_REL_MOVE);
            put_i16(buf, *dx);
            put_i16(buf, *dy);
        }
        Message::MouseWheel { dx, dy } => {
            buf.extend_from_slice(opcode::MOUSE_WHEEL);
            if variant.has_horizontal_wheel() {
                put_i16(buf, *dx);
            }
            put_i16(buf, *dy);
        }
        Message::ClipboardData {
            slot,
            seq,
            mark,
            data,
        } => {
            buf.extend_from_slice(opcode::CLIPBOARD_DATA);
            buf.push(*slot as u8);
            put_u32(buf, *seq);
            if variant.has_clipboard_chunks() {
                buf.push(mark.unwrap_or(ClipboardMark::Chunk) as u8);
            }
            put_bytes(buf, data)?;
        }
        Message::Info(info) => {
            buf.extend_from_slice(opcode::INFO);
            put_i16(buf, info.x);
            put_i16(buf, info.y);
            put_u16(buf, info.width);
            put_u16(buf, info.height);
            put_i16(buf, info.mx);
            put_i16(buf, info.my);
        }
        Message::SetOptions(values) => {
            buf.extend_from_slice(opcode::SET_OPTIONS);
            check_field(values.len().saturating_mul(4))?;
            put_u32(buf, values.len() as u32);
            for v in values {
                put_u32(buf, *v);
            }
        }
        Message::QueryInfo => buf.extend_from_slice(opcode::QUERY_INFO),
        Message::Incompatible { major, minor } => {
            buf.extend_from_slice(opcode::INCOMPATIBLE);
            put_u16(buf, *major);
            put_u16(buf, *minor);
        }
        Message::Busy => buf.extend_from_slice(opcode::BUSY),
        Message::Unknown => buf.extend_from_slice(opcode::UNKNOWN),
        Message::Bad => buf.extend_from_slice(opcode::BAD),
        Message::Unrecognized { opcode } => buf.extend_from_slice(opcode),
    }
    Ok(())
}

fn decode_greeting(payload: &[u8]) -> Result<(ProtocolName, u16, u16, Reader<'_>), ProtocolError> {
    require_len(payload, PROTOCOL_TAG_LENGTH + 4, "hello")?;
    let protocol = ProtocolName::from_tag(&payload[..PROTOCOL_TAG_LENGTH])
        .ok_or(ProtocolError::UnknownProtocolTag)?;
    let mut r = Reader::new(&payload[PROTOCOL_TAG_LENGTH..], "hello");
    let major = r.u16()?;
    let minor = r.u16()?;
    Ok((protocol, major, minor, r))
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn check_field(len: usize) -> Result<(), ProtocolError> {
    if len > MAX_FIELD_LENGTH {
        Err(ProtocolError::FieldTooLarge {
            len,
            limit: MAX_FIELD_LENGTH,
        })
    } else {
        Ok(())
    }
}

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_i16(buf: &mut Vec<u8>, v: i16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

/// Writes a 4-byte length prefix followed by the bytes.
fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> Result<(), ProtocolError> {
    check_field(bytes.len())?;
    put_u32(buf, bytes.len() as u32);
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Forward-only cursor over a payload.  Every read checks the remaining
/// length first, so nothing is allocated for a length the payload cannot hold.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    context: &'static str,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], context: &'static str) -> Self {
        Self {
            buf,
            pos: 0,
            context,
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let rest = &self.buf[self.pos..];
        require_len(rest, n, self.context)?;
        self.pos += n;
        Ok(&rest[..n])
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ProtocolError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn i16(&mut self) -> Result<i16, ProtocolError> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, ProtocolError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn slot(&mut self) -> Result<ClipboardSlot, ProtocolError> {
        let raw = self.u8()?;
        ClipboardSlot::try_from(raw)
            .map_err(|_| ProtocolError::MalformedPayload(format!("unknown clipboard slot: {raw}")))
    }

    /// Reads a 4-byte length prefix and then that many bytes.
    fn bytes(&mut self) -> Result<&'a [u8], ProtocolError> {
        let len = self.u32()? as usize;
        check_field(len)?;
        self.take(len)
    }

    /// Reads a 4-byte item count and then that many `u32`s.
    fn u32_list(&mut self) -> Result<Vec<u32>, ProtocolError> {
        let count = self.u32()? as usize;
        let len = count.saturating_mul(4);
        check_field(len)?;
        let raw = self.take(len)?;
        Ok(raw
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const V10: ProtocolVariant = ProtocolVariant::new(1, 0);
    const V13: ProtocolVariant = ProtocolVariant::new(1, 3);
    const V18: ProtocolVariant = ProtocolVariant::CURRENT;

    fn payload_of(bytes: &[u8]) -> &[u8] {
        match decode_frame(bytes).expect("framing failed") {
            Frame::Complete { payload, consumed } => {
                assert_eq!(consumed, bytes.len(), "frame should span the whole encoding");
                payload
            }
            Frame::NeedMoreData => panic!("incomplete frame"),
        }
    }

    fn round_trip(msg: &Message, variant: ProtocolVariant) -> Message {
        let encoded = encode_message(msg, variant).expect("encode failed");
        decode_message(payload_of(&encoded), variant).expect("decode failed")
    }

    // ── Framing ──────────────────────────────────────────────────────────────

    #[test]
    fn test_decode_frame_needs_header() {
        assert_eq!(decode_frame(&[0, 0]).unwrap(), Frame::NeedMoreData);
    }

    #[test]
    fn test_decode_frame_needs_full_payload() {
        let bytes = encode_message(&Message::KeepAlive, V18).unwrap();
        assert_eq!(
            decode_frame(&bytes[..bytes.len() - 1]).unwrap(),
            Frame::NeedMoreData
        );
    }

    #[test]
    fn test_decode_frame_rejects_oversized_declared_length() {
        // Arrange: header claims 4 MiB + 1 with no payload behind it
        let declared = (MAX_MESSAGE_LENGTH + 1) as u32;
        let bytes = declared.to_be_bytes();

        // Act / Assert: rejected before any payload arrives
        assert_eq!(
            decode_frame(&bytes),
            Err(ProtocolError::BadFraming {
                declared: MAX_MESSAGE_LENGTH + 1
            })
        );
    }

    #[test]
    fn test_decode_frame_returns_only_first_frame() {
        let mut bytes = encode_message(&Message::Noop, V18).unwrap();
        let first_len = bytes.len();
        bytes.extend(encode_message(&Message::Leave, V18).unwrap());

        match decode_frame(&bytes).unwrap() {
            Frame::Complete { payload, consumed } => {
                assert_eq!(payload, b"CNOP");
                assert_eq!(consumed, first_len);
            }
            Frame::NeedMoreData => panic!("expected a frame"),
        }
    }

    // ── Known wire bytes ─────────────────────────────────────────────────────

    #[test]
    fn test_enter_wire_layout() {
        let msg = Message::Enter {
            x: 1,
            y: -1,
            seq: 7,
            mask: 0x1001,
        };
        let bytes = encode_message(&msg, V18).unwrap();
        assert_eq!(
            bytes,
            vec![
                0, 0, 0, 14, b'C', b'I', b'N', b'N', 0, 1, 0xFF, 0xFF, 0, 0, 0, 7, 0x10, 0x01
            ]
        );
    }

    #[test]
    fn test_hello_wire_layout() {
        let msg = Message::Hello {
            protocol: ProtocolName::Synergy,
            major: 1,
            minor: 8,
        };
        let bytes = encode_message(&msg, V18).unwrap();
        assert_eq!(&bytes[4..11], b"Synergy");
        assert_eq!(&bytes[11..], &[0, 1, 0, 8]);
        assert_eq!(decode_hello(payload_of(&bytes)).unwrap(), msg);
    }

    // ── Version-dependent fields ─────────────────────────────────────────────

    #[test]
    fn test_key_down_button_only_from_1_1() {
        let msg = Message::KeyDown {
            key: 0x61,
            mask: 0,
            button: 38,
        };

        let old = encode_message(&msg, V10).unwrap();
        let new = encode_message(&msg, V13).unwrap();

        assert_eq!(old.len() + 2, new.len());
        assert_eq!(
            decode_message(payload_of(&old), V10).unwrap(),
            Message::KeyDown {
                key: 0x61,
                mask: 0,
                button: 0
            }
        );
        assert_eq!(round_trip(&msg, V13), msg);
    }

    #[test]
    fn test_key_repeat_field_order() {
        let msg = Message::KeyRepeat {
            key: 0x0102,
            mask: 0x0304,
            count: 0x0506,
            button: 0x0708,
        };
        let bytes = encode_message(&msg, V18).unwrap();
        assert_eq!(&bytes[8..], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(round_trip(&msg, V18), msg);
    }

    #[test]
    fn test_mouse_wheel_horizontal_only_from_1_3() {
        let msg = Message::MouseWheel { dx: 5, dy: -120 };

        assert_eq!(
            round_trip(&msg, V10),
            Message::MouseWheel { dx: 0, dy: -120 }
        );
        assert_eq!(round_trip(&msg, V13), msg);
    }

    #[test]
    fn test_clipboard_data_mark_only_from_1_6() {
        let msg = Message::ClipboardData {
            slot: ClipboardSlot::Selection,
            seq: 9,
            mark: Some(ClipboardMark::Start),
            data: b"12".to_vec(),
        };

        assert_eq!(round_trip(&msg, V18), msg);
        assert_eq!(
            round_trip(&msg, V13),
            Message::ClipboardData {
                slot: ClipboardSlot::Selection,
                seq: 9,
                mark: None,
                data: b"12".to_vec(),
            }
        );
    }

    #[test]
    fn test_set_options_round_trip() {
        let msg = Message::SetOptions(vec![0x5353_5754, 250, 0x4D44_4C54, 1]);
        assert_eq!(round_trip(&msg, V18), msg);
    }

    #[test]
    fn test_info_round_trip() {
        let msg = Message::Info(ScreenInfo {
            x: 0,
            y: 0,
            width: 2560,
            height: 1440,
            mx: 1280,
            my: 720,
        });
        assert_eq!(round_trip(&msg, V18), msg);
    }

    // ── Errors and limits ────────────────────────────────────────────────────

    #[test]
    fn test_unknown_opcode_is_not_an_error() {
        assert_eq!(
            decode_message(b"ZZZZ\x00\x01", V18).unwrap(),
            Message::Unrecognized { opcode: *b"ZZZZ" }
        );
    }

    #[test]
    fn test_truncated_fields_are_malformed() {
        let result = decode_message(b"DMMV\x00\x01", V18);
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_missing_opcode_is_malformed() {
        assert!(matches!(
            decode_message(b"CN", V18),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_string_length_beyond_payload_is_rejected() {
        // Arrange: DCLP (1.3) claims 100 bytes of data but carries 2
        let mut payload = b"DCLP".to_vec();
        payload.push(0);
        payload.extend_from_slice(&1u32.to_be_bytes());
        payload.extend_from_slice(&100u32.to_be_bytes());
        payload.extend_from_slice(b"hi");

        // Act / Assert
        assert!(matches!(
            decode_message(&payload, V13),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_oversized_string_field_is_rejected_on_decode() {
        let mut payload = b"DCLP".to_vec();
        payload.push(0);
        payload.extend_from_slice(&1u32.to_be_bytes());
        payload.extend_from_slice(&((MAX_FIELD_LENGTH + 1) as u32).to_be_bytes());

        assert_eq!(
            decode_message(&payload, V13),
            Err(ProtocolError::FieldTooLarge {
                len: MAX_FIELD_LENGTH + 1,
                limit: MAX_FIELD_LENGTH
            })
        );
    }

    #[test]
    fn test_oversized_list_is_rejected_on_decode() {
        let mut payload = b"DSOP".to_vec();
        payload.extend_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(
            decode_message(&payload, V18),
            Err(ProtocolError::FieldTooLarge { .. })
        ));
    }

    #[test]
    fn test_oversized_string_field_is_rejected_on_encode() {
        let msg = Message::ClipboardData {
            slot: ClipboardSlot::Clipboard,
            seq: 0,
            mark: None,
            data: vec![0; MAX_FIELD_LENGTH + 1],
        };
        assert!(matches!(
            encode_message(&msg, V10),
            Err(ProtocolError::FieldTooLarge { .. })
        ));
    }

    #[test]
    fn test_invalid_clipboard_slot_is_malformed() {
        let mut payload = b"CCLP".to_vec();
        payload.push(7);
        payload.extend_from_slice(&0u32.to_be_bytes());
        assert!(matches!(
            decode_message(&payload, V18),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_trailing_bytes_are_tolerated() {
        assert_eq!(
            decode_message(b"CALVextra", V18).unwrap(),
            Message::KeepAlive
        );
    }

    // ── Hello back ───────────────────────────────────────────────────────────

    #[test]
    fn test_hello_back_round_trip() {
        let msg = Message::HelloBack {
            protocol: ProtocolName::Barrier,
            major: 1,
            minor: 6,
            name: "laptop".to_string(),
        };
        let bytes = encode_message(&msg, V18).unwrap();
        assert_eq!(decode_hello_back(payload_of(&bytes)).unwrap(), msg);
    }

    #[test]
    fn test_hello_back_too_long_is_rejected() {
        let msg = Message::HelloBack {
            protocol: ProtocolName::Synergy,
            major: 1,
            minor: 8,
            name: "x".repeat(MAX_HELLO_LENGTH),
        };
        let bytes = encode_message(&msg, V18).unwrap();
        assert!(matches!(
            decode_hello_back(payload_of(&bytes)),
            Err(ProtocolError::HelloTooLong(_))
        ));
    }

    #[test]
    fn test_hello_back_with_unknown_tag_is_rejected() {
        let mut payload = b"Mystery".to_vec();
        payload.extend_from_slice(&[0, 1, 0, 8, 0, 0, 0, 0]);
        assert_eq!(
            decode_hello_back(&payload),
            Err(ProtocolError::UnknownProtocolTag)
        );
    }

    #[test]
    fn test_hello_back_with_bad_utf8_name_is_malformed() {
        let mut payload = b"Synergy".to_vec();
        payload.extend_from_slice(&[0, 1, 0, 8, 0, 0, 0, 1, 0xFF]);
        assert!(matches!(
            decode_hello_back(&payload),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }
}
