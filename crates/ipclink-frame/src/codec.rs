use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::message::MessageType;

/// Header: length (4) + type tag (4) = 8 bytes, native byte order.
pub const HEADER_SIZE: usize = 8;

/// Default maximum payload size accepted by receivers: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Fixed-size header sent in front of every payload.
///
/// `tag` is kept raw so that decoding never fails; [`Header::kind`] maps it
/// to a [`MessageType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Payload length in bytes, not including the header.
    pub length: u32,
    /// Message type tag (one bit set for every known type).
    pub tag: u32,
}

impl Header {
    pub fn new(kind: MessageType, length: u32) -> Self {
        Self {
            length,
            tag: kind.bit(),
        }
    }

    /// The message type, if the tag names one.
    pub fn kind(&self) -> Option<MessageType> {
        MessageType::from_tag(self.tag)
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        let mut dst = &mut out[..];
        dst.put_u32_ne(self.length);
        dst.put_u32_ne(self.tag);
        out
    }
}

/// Encode a header.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────┬─────────────────┐
/// │ Length (4B)  │ Type (4B)    │ Payload         │
/// │ native order │ native order │ (Length bytes)  │
/// └──────────────┴──────────────┴─────────────────┘
/// ```
pub fn encode_header(kind: MessageType, length: u32) -> [u8; HEADER_SIZE] {
    Header::new(kind, length).to_bytes()
}

/// Decode a header. Never fails; see [`Header::kind`].
pub fn decode_header(bytes: &[u8; HEADER_SIZE]) -> Header {
    let mut src = &bytes[..];
    let length = src.get_u32_ne();
    let tag = src.get_u32_ne();
    Header { length, tag }
}

/// A complete message.
///
/// `payload` is `None` exactly when the header length is zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub payload: Option<Bytes>,
}

impl Message {
    /// Create a message; an empty payload is stored as `None`.
    pub fn new(kind: MessageType, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            kind,
            payload: (!payload.is_empty()).then_some(payload),
        }
    }

    /// A message without payload.
    pub fn empty(kind: MessageType) -> Self {
        Self {
            kind,
            payload: None,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.as_ref().map_or(0, Bytes::len)
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_none()
    }

    /// Payload bytes, empty when there is no payload.
    pub fn payload_bytes(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }

    /// The total wire size of this message (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.len()
    }
}

/// Encode a whole message into `dst`.
pub fn encode_message(message: &Message, dst: &mut BytesMut) -> Result<()> {
    let len = message.len();
    let length = u32::try_from(len).map_err(|_| FrameError::PayloadTooLarge {
        size: len,
        max: u32::MAX as usize,
    })?;
    dst.reserve(HEADER_SIZE + len);
    dst.put_slice(&encode_header(message.kind, length));
    dst.put_slice(message.payload_bytes());
    Ok(())
}

/// Configuration for message framing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size a receiver accepts. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip_for_every_type() {
        for kind in MessageType::ALL {
            for length in [0u32, 1, 8, 4096, u32::MAX] {
                let decoded = decode_header(&encode_header(kind, length));
                assert_eq!(decoded.kind(), Some(kind));
                assert_eq!(decoded.length, length);
            }
        }
    }

    #[test]
    fn header_is_native_endian_length_then_tag() {
        let bytes = encode_header(MessageType::Log, 0x0102_0304);
        assert_eq!(&bytes[..4], &0x0102_0304u32.to_ne_bytes());
        assert_eq!(&bytes[4..], &MessageType::Log.bit().to_ne_bytes());
    }

    #[test]
    fn unknown_tag_decodes_without_kind() {
        let mut raw = [0u8; HEADER_SIZE];
        raw[4..].copy_from_slice(&0x300u32.to_ne_bytes());
        let header = decode_header(&raw);
        assert_eq!(header.tag, 0x300);
        assert_eq!(header.kind(), None);
    }

    #[test]
    fn encode_message_layout() {
        let mut buf = BytesMut::new();
        let message = Message::new(MessageType::Ipc, &b"hello"[..]);
        encode_message(&message, &mut buf).unwrap();

        assert_eq!(buf.len(), message.wire_size());
        let header: [u8; HEADER_SIZE] = buf[..HEADER_SIZE].try_into().unwrap();
        assert_eq!(decode_header(&header), Header::new(MessageType::Ipc, 5));
        assert_eq!(&buf[HEADER_SIZE..], b"hello");
    }

    #[test]
    fn empty_payload_is_header_only() {
        let message = Message::new(MessageType::ExtensionInit, Vec::new());
        assert!(message.is_empty());
        assert_eq!(message.payload, None);

        let mut buf = BytesMut::new();
        encode_message(&message, &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);
    }

    #[test]
    fn payload_accessors() {
        let message = Message::new(MessageType::Scroll, Bytes::from_static(b"abc"));
        assert_eq!(message.len(), 3);
        assert_eq!(message.payload_bytes(), b"abc");
        assert_eq!(Message::empty(MessageType::Crash).payload_bytes(), b"");
    }
}
