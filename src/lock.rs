//! Per-artifact locking
//!
//! Reading a fingerprint, regenerating the artifact and writing the new
//! fingerprint must not interleave for the same identifier. Each identifier
//! gets its own advisory lock file (`<stem>.lock`) in the fingerprint store.
//! Different identifiers never block each other.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::fingerprint::{file_stem, StoreError};

/// Delay between two attempts on a held lock
const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Waiting longer than this is logged once as contention
const CONTENTION_WARNING_AFTER: Duration = Duration::from_millis(500);

pub type LockResult<T> = Result<T, LockError>;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out after {timeout:?} waiting for lock on '{identifier}'")]
    Timeout { identifier: String, timeout: Duration },

    #[error("lock file error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Identifier(#[from] StoreError),
}

/// Exclusive advisory lock for one artifact identifier, released on drop
pub struct ArtifactLock {
    path: PathBuf,
    #[allow(dead_code)]
    file: File,
}

impl ArtifactLock {
    /// Lock `identifier` inside `dir`, waiting at most `timeout`.
    ///
    /// `dir` is created when missing.
    pub fn acquire(dir: &Path, identifier: &str, timeout: Duration) -> LockResult<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.lock", file_stem(identifier)?));

        let started = Instant::now();
        let mut contended = false;

        loop {
            match try_lock(&path) {
                Ok(file) => {
                    if contended {
                        debug!(identifier, waited_ms = started.elapsed().as_millis() as u64, "lock acquired");
                    }
                    return Ok(Self { path, file });
                }
                Err(e) if e.kind() != io::ErrorKind::WouldBlock => return Err(e.into()),
                Err(_) => {}
            }

            let waited = started.elapsed();
            if waited >= timeout {
                return Err(LockError::Timeout {
                    identifier: identifier.to_string(),
                    timeout,
                });
            }
            if !contended && waited > CONTENTION_WARNING_AFTER {
                warn!(identifier, path = %path.display(), "artifact is locked by another run, waiting");
                contended = true;
            }

            thread::sleep(RETRY_INTERVAL);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `flock(LOCK_EX | LOCK_NB)`; a held lock maps to `WouldBlock`
#[cfg(unix)]
fn try_lock(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    use std::os::unix::io::AsRawFd;

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .mode(0o644)
        .open(path)?;

    // SAFETY: the descriptor belongs to `file`, which outlives the call
    if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } == 0 {
        return Ok(file);
    }

    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(code) if code == libc::EWOULDBLOCK => Err(io::ErrorKind::WouldBlock.into()),
        _ => Err(err),
    }
}

/// Exclusive-create fallback where flock is unavailable
#[cfg(not(unix))]
fn try_lock(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => io::ErrorKind::WouldBlock.into(),
            _ => e,
        })
}

impl Drop for ArtifactLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            // SAFETY: same descriptor the lock was taken on
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = fs::remove_file(&self.path);
        }
    }
}
