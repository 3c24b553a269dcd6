use std::path::Path;
use std::thread;

use ipclink_transport::UnixDomainSocket;
use tracing::{info, warn};

use crate::endpoint::Endpoint;
use crate::error::Result;

/// Connect `endpoint` to the UI process listening at `path`.
///
/// Retries [`ChannelConfig::connect_attempts`](crate::ChannelConfig)
/// times with a fixed delay, blocking the calling thread in between; the
/// last failure is returned. Messages sent before the connection exists
/// are written once it does.
pub fn connect_endpoint(endpoint: &Endpoint, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let runtime = endpoint.runtime();
    let config = runtime.config();
    let attempts = config.connect_attempts.max(1);

    let mut attempt = 1;
    let stream = loop {
        match UnixDomainSocket::connect(path) {
            Ok(stream) => break stream,
            Err(err) if attempt < attempts => {
                warn!(
                    endpoint = endpoint.name(),
                    attempt,
                    attempts,
                    error = %err,
                    "connect failed, retrying"
                );
                thread::sleep(config.connect_retry_delay);
                attempt += 1;
            }
            Err(err) => return Err(err.into()),
        }
    };

    endpoint.connect_to_socket(stream)?;
    info!(endpoint = endpoint.name(), path = %path.display(), attempt, "connected to UI process");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    use ipclink_transport::TransportError;

    use super::*;
    use crate::config::ChannelConfig;
    use crate::error::ChannelError;
    use crate::handler::Dispatcher;
    use crate::runtime::IpcRuntime;

    fn make_sock_path(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "ipcl-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir.join("ui.sock")
    }

    fn runtime(attempts: u32, delay: Duration) -> IpcRuntime {
        let config = ChannelConfig {
            connect_attempts: attempts,
            connect_retry_delay: delay,
            ..ChannelConfig::default()
        };
        IpcRuntime::new(config, Dispatcher::new(), tokio::runtime::Handle::current())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn gives_up_after_configured_attempts() {
        let path = make_sock_path("noserver");
        let runtime = runtime(3, Duration::from_millis(20));
        let endpoint = runtime.endpoint("UI");

        let started = Instant::now();
        let err = connect_endpoint(&endpoint, &path).expect_err("connect should fail");
        assert!(started.elapsed() >= Duration::from_millis(40));
        assert!(matches!(
            err,
            ChannelError::Transport(TransportError::Connect { .. })
        ));
        assert!(!endpoint.is_connected());

        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn retries_until_listener_appears() {
        let path = make_sock_path("late");
        let runtime = runtime(50, Duration::from_millis(20));
        let endpoint = runtime.endpoint("UI");

        let bind_path = path.clone();
        let server = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            let socket = UnixDomainSocket::bind(&bind_path).expect("listener should bind");
            socket.accept().expect("listener should accept")
        });

        connect_endpoint(&endpoint, &path).expect("connect should eventually succeed");
        assert!(endpoint.is_connected());
        let _accepted = server.join().expect("server thread should finish");

        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }
}
