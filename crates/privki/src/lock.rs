//! Advisory lock serialising commands against one home.

use std::fs::File;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use privki_core::{Paths, PkiError, Result};
use tracing::debug;

use crate::fsutil;

/// Exclusive lock on `~/.privki`, released on drop.
#[derive(Debug)]
pub struct RepositoryLock {
    file: File,
    path: PathBuf,
}

impl RepositoryLock {
    /// Lock the repository base directory, creating it if needed.
    ///
    /// Fails immediately if another process holds the lock.
    pub fn acquire(paths: &Paths) -> Result<Self> {
        let base = paths.base_dir();
        if !base.is_dir() {
            fsutil::create_dir_all(&base, fsutil::DIR_MODE)?;
        }
        let file = File::open(&base).map_err(|e| PkiError::io(&base, e))?;
        file.try_lock_exclusive().map_err(|e| {
            PkiError::io(
                &base,
                std::io::Error::new(
                    e.kind(),
                    format!("repository is locked by another privki process ({e})"),
                ),
            )
        })?;
        debug!(path = %base.display(), "repository locked");
        Ok(Self { file, path: base })
    }

    /// Locked directory.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RepositoryLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(path = %self.path.display(), error = %e, "unlock failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_lock_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let paths = Paths::new(tmp.path());
        let held = RepositoryLock::acquire(&paths).unwrap();
        assert!(held.path().ends_with(".privki"));

        let err = RepositoryLock::acquire(&paths).unwrap_err();
        assert!(matches!(err, PkiError::Io { .. }));
        assert!(err.to_string().contains("locked"));

        drop(held);
        RepositoryLock::acquire(&paths).unwrap();
    }
}
