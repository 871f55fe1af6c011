//! Protocol module containing message types and the binary codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_frame, decode_hello, decode_hello_back, decode_message, encode_message, Frame, ProtocolError};
pub use messages::*;
