//! Process-exclusive handle on the job store's lock file.
//!
//! Mirrors `moltis-sessions::store::SessionStore`'s use of `fd_lock::RwLock`
//! around file writes, but held for the lifetime of the daemon process
//! rather than per-write, so a second daemon pointed at the same store
//! directory fails fast instead of corrupting the database.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::time::{Duration, Instant};

use fd_lock::{RwLock, RwLockWriteGuard};

use smartsh_core::{Error, Result};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Holds an exclusive lock on `<store-dir>/store.lock` until dropped.
///
/// The backing `File` is intentionally leaked for the process lifetime so
/// the guard it hands out can outlive the function that created it; the OS
/// reclaims the descriptor on process exit either way.
pub struct StoreLock {
    _guard: RwLockWriteGuard<'static, File>,
}

impl StoreLock {
    /// Acquire the lock at `path`, retrying for up to one second before
    /// giving up with an error that names the likely cause (another
    /// `smartsh-daemon` already running against this store).
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        let lock: &'static mut RwLock<File> = Box::leak(Box::new(RwLock::new(file)));

        let deadline = Instant::now() + ACQUIRE_TIMEOUT;
        loop {
            match lock.try_write() {
                Ok(guard) => return Ok(Self { _guard: guard }),
                Err(_) if Instant::now() < deadline => {
                    std::thread::sleep(POLL_INTERVAL);
                },
                Err(_) => {
                    return Err(Error::message(format!(
                        "could not acquire exclusive lock on {} within {:?}; \
                         is another smartsh-daemon already running against this store?",
                        path.display(),
                        ACQUIRE_TIMEOUT
                    )));
                },
            }
        }
    }
}
