//! Typed, length-prefixed message framing for the ipclink channel.
//!
//! Every message is an 8-byte header followed by its payload:
//! - a 4-byte payload length
//! - a 4-byte message type tag, one bit per [`MessageType`]
//!
//! both in native byte order, since both ends run on the same host.
//! [`FrameDecoder`] reassembles messages from arbitrarily fragmented reads;
//! [`MessageWriter`] writes them to non-blocking streams.

pub mod codec;
pub mod decoder;
pub mod error;
pub mod message;
pub mod writer;

pub use codec::{
    decode_header, encode_header, encode_message, FrameConfig, Header, Message,
    DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use decoder::{FrameDecoder, ReadStatus};
pub use error::{FrameError, Result};
pub use message::{MessageMask, MessageType};
pub use writer::MessageWriter;
