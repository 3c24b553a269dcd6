//! Socket path generation.
//!
//! Paths look like `<dir>/<app>-ipc-<pid>-<suffix>` where the suffix is
//! random alphanumeric text. A candidate is only returned if nothing exists
//! at that path yet.

use std::path::{Path, PathBuf};

use rand::distr::Alphanumeric;
use rand::Rng;
use tracing::debug;

use crate::error::{Result, TransportError};

/// Length of the random path suffix.
pub const SUFFIX_LEN: usize = 10;

const MAX_ATTEMPTS: usize = 64;

/// Generate an unused socket path in the system temporary directory.
pub fn socket_path(app: &str) -> Result<PathBuf> {
    socket_path_in(&std::env::temp_dir(), app)
}

/// Generate an unused socket path in `dir`.
pub fn socket_path_in(dir: &Path, app: &str) -> Result<PathBuf> {
    let pid = std::process::id();
    let mut rng = rand::rng();

    for _ in 0..MAX_ATTEMPTS {
        let suffix: String = (&mut rng)
            .sample_iter(Alphanumeric)
            .take(SUFFIX_LEN)
            .map(char::from)
            .collect();
        let candidate = dir.join(format!("{app}-ipc-{pid}-{suffix}"));

        // symlink_metadata so a dangling symlink also counts as taken
        if std::fs::symlink_metadata(&candidate).is_err() {
            return Ok(candidate);
        }
        debug!(path = ?candidate, "socket path collision, retrying");
    }

    Err(TransportError::PathExhausted {
        dir: dir.to_path_buf(),
        attempts: MAX_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_has_expected_shape() {
        let dir = std::env::temp_dir();
        let path = socket_path_in(&dir, "ipclink").unwrap();

        assert_eq!(path.parent(), Some(dir.as_path()));
        let name = path.file_name().unwrap().to_str().unwrap();
        let prefix = format!("ipclink-ipc-{}-", std::process::id());
        assert!(name.starts_with(&prefix), "unexpected name {name}");

        let suffix = &name[prefix.len()..];
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn generated_paths_differ() {
        let a = socket_path("ipclink").unwrap();
        let b = socket_path("ipclink").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn generated_path_does_not_exist() {
        let path = socket_path("ipclink").unwrap();
        assert!(std::fs::symlink_metadata(&path).is_err());
    }
}
