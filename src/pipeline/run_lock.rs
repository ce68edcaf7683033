use crate::constants::LOCK_FILE;
use crate::error::{PipelineError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Exclusive claim on a data directory for the duration of one run.
///
/// The lock file is created with `create_new`, so a second run against the
/// same directory fails instead of sharing the raw or processed areas. It is
/// removed on drop. A crash can leave it behind; it holds the owning pid so
/// an operator can tell whether it is stale.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(dir: &Path) -> Result<Self> {
        Self::acquire_with(dir, |file| writeln!(file, "{}", std::process::id()))
    }

    /// Claims the lock and lets `stamp` record the owner. If stamping fails
    /// the file is removed again, so a failed claim never blocks later runs.
    fn acquire_with<F>(dir: &Path, stamp: F) -> Result<Self>
    where
        F: FnOnce(&mut File) -> io::Result<()>,
    {
        fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(PipelineError::LockHeld(path)),
            Err(e) => return Err(e.into()),
        };
        // Owned from here on: dropping it on the error path releases the file
        let lock = Self { path };
        stamp(&mut file)?;
        debug!(lock = %lock.path.display(), "acquired run lock");
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), "failed to release run lock: {}", e);
        }
    }
}
