//! Message channel between a UI process and its worker processes.
//!
//! The UI process listens on a generated Unix socket path; each worker
//! connects to it and both sides exchange typed, length-prefixed messages
//! through counted [`Endpoint`] handles.
//!
//! # Crate Structure
//!
//! - [`transport`]: Unix socket bind/accept/connect and socket paths
//! - [`frame`]: Message types, header codec, incremental decoder, writer
//! - [`channel`]: Endpoints, send worker, receive driver, listener
//!
//! # Example
//!
//! ```no_run
//! use ipclink::{ChannelConfig, Dispatcher, IpcRuntime, MessageType};
//!
//! # async fn ui() -> ipclink::Result<()> {
//! let dispatcher = Dispatcher::new()
//!     .on(MessageType::Log, |endpoint, message| {
//!         println!("{}: {:?}", endpoint.name(), message.payload);
//!     })
//!     .on_hangup(|endpoint| println!("{} went away", endpoint.name()));
//! let runtime = IpcRuntime::with_current_handle(ChannelConfig::default(), dispatcher)?;
//! let listener = runtime.listen()?;
//! println!("workers connect to {}", listener.path().display());
//! # Ok(())
//! # }
//! ```

/// Re-export transport types.
pub mod transport {
    pub use ipclink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use ipclink_frame::*;
}

/// Re-export channel types.
pub mod channel {
    pub use ipclink_channel::*;
}

pub use ipclink_channel::{
    connect_endpoint, payload, ChannelConfig, ChannelError, Dispatcher, Endpoint,
    EndpointStatus, HangupPolicy, IpcRuntime, Listener, Result, WeakEndpoint,
};
pub use ipclink_frame::{Message, MessageMask, MessageType};
