/// Errors that can occur in channel operations.
///
/// Sending never reports delivery failures; these cover setup, payload
/// encoding and explicit receives.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] ipclink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] ipclink_frame::FrameError),

    /// I/O error while preparing a stream.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload could not be serialized or deserialized.
    #[error("payload encoding error: {0}")]
    Payload(#[from] serde_json::Error),

    /// No tokio runtime to drive receives.
    #[error("no event loop: {0}")]
    EventLoop(#[from] tokio::runtime::TryCurrentError),

    /// The endpoint lost (or never had) its connection.
    #[error("endpoint {0} is disconnected")]
    Disconnected(String),

    /// Another selective receive is already waiting on this endpoint.
    #[error("endpoint {0} already has a selective receive pending")]
    WaiterBusy(String),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
