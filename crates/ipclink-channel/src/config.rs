use std::path::PathBuf;
use std::time::Duration;

use ipclink_frame::FrameConfig;

/// What a process does when the peer of one of its endpoints hangs up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HangupPolicy {
    /// Disconnect the endpoint, run the hangup hook, release the connection.
    #[default]
    Release,
    /// As `Release`, then remove the runtime's socket files and exit the
    /// process. Used by workers, which are useless once the UI process is
    /// gone.
    ExitProcess,
}

/// Channel configuration shared by every endpoint of a runtime.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Application name used in generated socket paths.
    pub app_name: String,
    /// Directory for generated socket paths. Default: system temp dir.
    pub socket_dir: Option<PathBuf>,
    /// Name given to endpoints created for accepted connections.
    pub accept_role: String,
    /// Framing limits for received messages.
    pub frame: FrameConfig,
    /// Behavior on peer hangup.
    pub hangup_policy: HangupPolicy,
    /// Connection attempts made by [`connect_endpoint`](crate::connect_endpoint).
    pub connect_attempts: u32,
    /// Delay between connection attempts.
    pub connect_retry_delay: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            app_name: "ipclink".to_string(),
            socket_dir: None,
            accept_role: "UI".to_string(),
            frame: FrameConfig::default(),
            hangup_policy: HangupPolicy::Release,
            connect_attempts: 5,
            connect_retry_delay: Duration::from_millis(100),
        }
    }
}

impl ChannelConfig {
    /// Directory generated socket paths are placed in.
    pub fn socket_dir(&self) -> PathBuf {
        self.socket_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
