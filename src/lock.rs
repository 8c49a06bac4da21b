//! The single serialization point for every repository/bounty mutation.
//!
//! Webhook processing, the reconciliation sweep and the operator CLI all take
//! this lock and hold it across their ledger calls and replies. A lock built
//! with [`GlobalLock::with_file`] also takes an exclusive `flock` on a file
//! next to the database, so a `bounty` CLI process and a running server
//! exclude each other.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

const FILE_POLL_INTERVAL: Duration = Duration::from_millis(50);
const FILE_POLL_JITTER_MS: u64 = 25;

#[derive(Clone, Default)]
pub struct GlobalLock {
    inner: Arc<Mutex<()>>,
    file: Option<Arc<LockFile>>,
}

/// Held for the whole mutation. Releases the file lock before the in-process one.
#[derive(Debug)]
pub struct LockGuard<'a> {
    _held: MutexGuard<'a, ()>,
    file: Option<&'a LockFile>,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Some(lock_file) = self.file {
            if let Err(e) = lock_file.unlock() {
                warn!(path = %lock_file.path.display(), "Failed to release lock file: {}", e);
            }
        }
    }
}

impl GlobalLock {
    /// Process-local lock. Enough when a single process owns the database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-local lock plus an exclusive lock on `path`, shared by every
    /// process that opens the same file.
    pub fn with_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        Ok(Self {
            inner: Arc::default(),
            file: Some(Arc::new(LockFile { path, file })),
        })
    }

    pub async fn acquire(&self) -> LockGuard<'_> {
        let held = self.inner.lock().await;
        let file = self.file.as_deref();

        if let Some(lock_file) = file {
            let mut waiting = false;
            loop {
                match lock_file.try_lock() {
                    Ok(true) => break,
                    Ok(false) if !waiting => {
                        debug!(path = %lock_file.path.display(), "Waiting for another process to release the lock");
                        waiting = true;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(path = %lock_file.path.display(), "Lock file error: {}", e);
                    }
                }
                let jitter_ms = rand::random::<u64>() % (FILE_POLL_JITTER_MS + 1);
                tokio::time::sleep(FILE_POLL_INTERVAL + Duration::from_millis(jitter_ms)).await;
            }
        }

        LockGuard { _held: held, file }
    }

    /// Non-blocking check, used by the health endpoint. Also reports a lock
    /// held by another process when a lock file is configured.
    pub fn is_held(&self) -> bool {
        let Ok(_held) = self.inner.try_lock() else {
            return true;
        };
        match self.file.as_deref() {
            None => false,
            Some(lock_file) => match lock_file.try_lock() {
                Ok(true) => {
                    if let Err(e) = lock_file.unlock() {
                        warn!(path = %lock_file.path.display(), "Failed to release lock file: {}", e);
                    }
                    false
                }
                Ok(false) => true,
                Err(_) => false,
            },
        }
    }
}

#[derive(Debug)]
struct LockFile {
    path: PathBuf,
    file: File,
}

impl LockFile {
    /// `Ok(false)` when another open file description holds the lock.
    fn try_lock(&self) -> io::Result<bool> {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            // SAFETY: the descriptor is owned by `self.file` and stays open for
            // the duration of the call.
            #[allow(unsafe_code)]
            let result = unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
            if result == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock
                || err.raw_os_error() == Some(libc::EWOULDBLOCK)
            {
                return Ok(false);
            }
            Err(err)
        }
        #[cfg(not(unix))]
        {
            let _ = &self.file;
            Ok(true)
        }
    }

    fn unlock(&self) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            // SAFETY: see `try_lock`.
            #[allow(unsafe_code)]
            let result = unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
            if result != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }
        #[cfg(not(unix))]
        {
            Ok(())
        }
    }
}
