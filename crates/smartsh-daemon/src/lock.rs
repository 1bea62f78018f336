//! The daemon's own exclusive startup lock, distinct from the job store's
//! lock file: this one guards "is another daemon process already bound to
//! this address" rather than "is another process touching this database."
//!
//! Grounded on the same `fd_lock` idiom as `smartsh_store::lock`, with the
//! addition spec'd here: a stale lock (left behind by a crash) is detected
//! by probing `/health` on the configured bind address before giving up.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fd_lock::{RwLock, RwLockWriteGuard};
use smartsh_core::{Error, Result};
use tracing::{info, warn};

const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Held for the daemon's lifetime; dropping it releases the lock file and
/// removes it from disk.
pub struct DaemonLock {
    _guard: RwLockWriteGuard<'static, File>,
    path: PathBuf,
}

/// Probe `http://{bind_addr}/health`; `Ok(true)` means a healthy daemon
/// already owns the address.
async fn probe_health(bind_addr: &str) -> bool {
    let url = format!("http://{bind_addr}/health");
    let Ok(client) = reqwest::Client::builder().timeout(HEALTH_PROBE_TIMEOUT).build() else {
        return false;
    };
    matches!(client.get(url).send().await, Ok(resp) if resp.status().is_success())
}

/// Acquire the daemon's startup lock at `path`, probing `bind_addr` for an
/// existing healthy instance when the lock file is already present.
///
/// If the file exists but no healthy daemon answers at `bind_addr`, the
/// lock is treated as stale: removed and reacquired.
pub async fn acquire(path: &Path, bind_addr: &str) -> Result<DaemonLock> {
    if path.exists() {
        if probe_health(bind_addr).await {
            return Err(Error::message("another smartsh-daemon instance is already running"));
        }
        warn!(path = %path.display(), "removing stale daemon lock file");
        std::fs::remove_file(path)?;
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new().create(true).truncate(false).write(true).open(path)?;
    let lock: &'static mut RwLock<File> = Box::leak(Box::new(RwLock::new(file)));
    let guard = lock
        .try_write()
        .map_err(|e| Error::message(format!("failed to acquire daemon lock: {e}")))?;

    info!(path = %path.display(), "daemon lock acquired");
    Ok(DaemonLock { _guard: guard, path: path.to_path_buf() })
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquires_lock_when_no_file_present() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("daemon.lock");
        let lock = acquire(&path, "127.0.0.1:1").await.expect("acquire");
        assert!(path.exists());
        drop(lock);
    }

    #[tokio::test]
    async fn stale_lock_with_unreachable_health_is_removed_and_reacquired() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("daemon.lock");
        std::fs::write(&path, b"stale").expect("write stale lock");
        let lock = acquire(&path, "127.0.0.1:1").await.expect("acquire over stale lock");
        drop(lock);
    }

    #[tokio::test]
    async fn lock_is_released_and_file_removed_on_drop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("daemon.lock");
        {
            let lock = acquire(&path, "127.0.0.1:1").await.expect("acquire");
            drop(lock);
        }
        assert!(!path.exists());
    }
}
