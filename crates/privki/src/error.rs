//! Conversions from backend errors into [`PkiError`].
//!
//! `privki-core` stays free of openssl/rcgen/zip, so the mapping lives here.

use std::fmt::Display;
use std::path::Path;

use privki_core::{PkiError, Result};

/// Attach a failing step or archive path to a foreign error.
pub trait ResultExt<T> {
    /// Map to [`PkiError::Crypto`] naming `step`.
    fn crypto_step(self, step: impl Display) -> Result<T>;

    /// Map to [`PkiError::Archive`] naming the archive `path`.
    fn archive_at(self, path: &Path) -> Result<T>;
}

impl<T, E: Display> ResultExt<T> for std::result::Result<T, E> {
    fn crypto_step(self, step: impl Display) -> Result<T> {
        self.map_err(|e| PkiError::crypto(step.to_string(), e))
    }

    fn archive_at(self, path: &Path) -> Result<T> {
        self.map_err(|e| PkiError::archive(path, e))
    }
}
