use crate::error::ErrorCode;
use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

/// File name of the advisory lock inside a feature directory.
pub const LOCK_FILE: &str = ".status.lock";

/// Failure to take the feature's emit lock.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("emit lock at {} still held after {waited:?}", path.display())]
    Timeout { path: PathBuf, waited: Duration },

    #[error("cannot open emit lock: {0}")]
    IoError(#[from] io::Error),
}

impl LockError {
    /// Machine-readable code associated with this lock error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::LockContention,
            Self::IoError(_) => ErrorCode::EventLogWriteFailed,
        }
    }

    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

/// Poll interval while waiting on a held lock.
const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// RAII guard serializing read-reduce-guard-append on one feature log.
///
/// This only orders processes that see the same file, i.e. agents sharing
/// one checkout or a symlinked log. Worktrees that are reconciled through
/// git merges each hold their own lock file, so two of them can still claim
/// the same work package; the claim check detects that, it cannot prevent it.
#[derive(Debug)]
pub struct EmitLock {
    file: File,
    path: PathBuf,
}

impl EmitLock {
    /// Acquire an exclusive advisory lock on `{feature_dir}/.status.lock`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] if another holder keeps the lock past
    /// `timeout`, or [`LockError::IoError`] if the lock file cannot be opened.
    pub fn acquire(feature_dir: &Path, timeout: Duration) -> Result<Self, LockError> {
        fs::create_dir_all(feature_dir)?;
        let path = feature_dir.join(LOCK_FILE);

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        let start = Instant::now();
        while file.try_lock_exclusive().is_err() {
            let waited = start.elapsed();
            if waited >= timeout {
                tracing::warn!(path = %path.display(), ?waited, "emit lock contention");
                return Err(LockError::Timeout { path, waited });
            }
            thread::sleep(RETRY_INTERVAL);
        }

        tracing::trace!(path = %path.display(), "emit lock acquired");
        Ok(Self { file, path })
    }

    /// Release before the end of scope.
    pub fn release(self) {
        drop(self);
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EmitLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
