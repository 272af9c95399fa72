//! Cross-process advisory lock for shared repositories.
//!
//! The lock is scoped to `<root>/.agit/swarm.lock` and serializes repository
//! mutation across processes. Within one process an async mutex layers on
//! top of the file lock, so re-entrant acquisition queues instead of
//! deadlocking on the already-held file description. The in-memory store
//! variant has no root directory and degrades to the in-process mutex only.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::error::{AgitError, Result};

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Exclusive lock over one repository root.
#[derive(Clone)]
pub struct AdvisoryLock {
    lock_path: Option<PathBuf>,
    local: Arc<Mutex<()>>,
}

impl AdvisoryLock {
    /// Lock for the repository rooted at `root`; `None` for in-memory
    /// repositories.
    pub fn for_root(root: Option<&Path>) -> Self {
        AdvisoryLock {
            lock_path: root.map(|r| r.join(".agit").join("swarm.lock")),
            local: Arc::new(Mutex::new(())),
        }
    }

    /// Acquire the lock, waiting at most `timeout`.
    ///
    /// The returned guard releases on every exit path, including panics.
    pub async fn acquire(&self, timeout: Duration) -> Result<LockGuard> {
        let deadline = tokio::time::Instant::now() + timeout;

        let local = tokio::time::timeout_at(deadline, Arc::clone(&self.local).lock_owned())
            .await
            .map_err(|_| AgitError::LockTimeout(timeout))?;

        let file = match &self.lock_path {
            None => None,
            Some(path) => Some(lock_file(path, deadline, timeout).await?),
        };

        debug!("advisory lock acquired");
        Ok(LockGuard { _local: local, file })
    }
}

async fn lock_file(
    path: &Path,
    deadline: tokio::time::Instant,
    timeout: Duration,
) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AgitError::Storage(format!("creating lock dir: {e}")))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .map_err(|e| AgitError::Storage(format!("opening lock file: {e}")))?;

    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(file),
            Err(_) if tokio::time::Instant::now() >= deadline => {
                warn!(path = %path.display(), "advisory lock wait exhausted");
                return Err(AgitError::LockTimeout(timeout));
            }
            Err(_) => tokio::time::sleep(LOCK_RETRY_INTERVAL).await,
        }
    }
}

/// Held advisory lock. Dropping releases both layers.
#[derive(Debug)]
pub struct LockGuard {
    _local: OwnedMutexGuard<()>,
    file: Option<File>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = file.unlock() {
                warn!("failed to release advisory lock file: {e}");
            }
        }
    }
}
