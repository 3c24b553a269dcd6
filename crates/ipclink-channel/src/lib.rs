//! Endpoints and message delivery for the ipclink UI/worker channel.
//!
//! One UI process listens on a Unix socket; each worker process connects
//! to it. Both sides hold an [`Endpoint`] per connection and exchange
//! typed messages:
//!
//! - [`Endpoint::send`] never blocks. Writes go through a single send
//!   worker thread, in order per endpoint. While an endpoint is
//!   disconnected its messages are queued and written after the next
//!   connect.
//! - Received messages are reassembled by a receive task per connection
//!   and passed to the [`Dispatcher`], unless an
//!   [`Endpoint::recv_matching`] call is waiting for them.
//! - A peer hangup disconnects the endpoint and runs the dispatcher's
//!   hangup hook.
//!
//! All process-wide state lives in an [`IpcRuntime`].

pub mod config;
pub mod connector;
pub mod endpoint;
pub mod error;
pub mod handler;
pub mod listener;
pub mod payload;
pub mod runtime;

mod receiver;
mod registry;
mod sender;

pub use config::{ChannelConfig, HangupPolicy};
pub use connector::connect_endpoint;
pub use endpoint::{Endpoint, EndpointStatus, WeakEndpoint};
pub use error::{ChannelError, Result};
pub use handler::Dispatcher;
pub use listener::Listener;
pub use runtime::IpcRuntime;
