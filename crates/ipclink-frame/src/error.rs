/// Errors that can occur while encoding, decoding or writing messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The header carries a type tag that is not a known message type.
    #[error("unknown message type tag 0x{0:x}")]
    UnknownType(u32),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing messages.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream accepted zero bytes; the peer is gone.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
