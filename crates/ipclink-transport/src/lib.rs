//! Unix domain socket transport for the ipclink channel.
//!
//! This is the lowest layer: binding and accepting on a generated socket
//! path in the UI process, connecting from worker processes, and the small
//! amount of raw-descriptor plumbing the send worker needs.

pub mod error;

#[cfg(unix)]
pub mod path;
#[cfg(unix)]
pub mod stream;
#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};

#[cfg(unix)]
pub use path::{socket_path, socket_path_in};
#[cfg(unix)]
pub use stream::{peer_credentials, PeerCredentials, WaitWritable};
#[cfg(unix)]
pub use uds::{SocketFileGuard, UnixDomainSocket};
