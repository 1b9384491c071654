//! Plain-text state files under `~/.privki/config`.

use std::path::PathBuf;

use privki_core::{Paths, PkiError, Result, RootUid, StateKey};
use tracing::{debug, warn};

use crate::fsutil;

/// Reader/writer for the one-value-per-file configuration directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    paths: Paths,
}

impl StateStore {
    /// Store rooted at the given home layout.
    pub const fn new(paths: Paths) -> Self {
        Self { paths }
    }

    /// Path layout this store resolves against.
    pub const fn paths(&self) -> &Paths {
        &self.paths
    }

    /// Read a value with one trailing newline stripped.
    pub fn read(&self, key: StateKey) -> Result<String> {
        let path = self.paths.state_file(key);
        if !path.is_file() {
            return Err(PkiError::MissingState {
                key: key.file_name(),
                path,
            });
        }
        let mut value = fsutil::read_to_string(&path)?;
        if value.ends_with('\n') {
            value.pop();
        }
        Ok(value)
    }

    /// Read a value, returning `None` when the file is absent.
    pub fn read_optional(&self, key: StateKey) -> Result<Option<String>> {
        match self.read(key) {
            Ok(v) => Ok(Some(v)),
            Err(PkiError::MissingState { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Atomically write `value` followed by exactly one newline.
    pub fn write(&self, key: StateKey, value: &str) -> Result<()> {
        self.ensure_config_dir()?;
        let path = self.paths.state_file(key);
        debug!(key = %key, path = %path.display(), "writing state");
        fsutil::write_atomic(&path, format!("{value}\n").as_bytes(), fsutil::FILE_MODE)
    }

    /// Create an empty marker file.
    pub fn touch(&self, key: StateKey) -> Result<()> {
        self.ensure_config_dir()?;
        fsutil::write_atomic(&self.paths.state_file(key), b"", fsutil::FILE_MODE)
    }

    /// Whether the state file for `key` exists.
    pub fn exists(&self, key: StateKey) -> bool {
        self.paths.state_file(key).is_file()
    }

    /// Fail if a repository has already been initialised.
    pub fn assert_fresh_repository(&self) -> Result<()> {
        let path = self.paths.state_file(StateKey::RootCertUid);
        if path.exists() {
            return Err(PkiError::RepositoryExists { path });
        }
        Ok(())
    }

    /// The stored root UID.
    pub fn root_uid(&self) -> Result<RootUid> {
        RootUid::parse(&self.read(StateKey::RootCertUid)?)
    }

    /// The stored PKI materials directory.
    pub fn pki_path(&self) -> Result<PathBuf> {
        Ok(PathBuf::from(self.read(StateKey::PkiPath)?))
    }

    /// Whether a DR root exists. A missing `drstatus` counts as `false`.
    pub fn dr_enabled(&self) -> Result<bool> {
        match self.read_optional(StateKey::DrStatus)? {
            Some(v) => Ok(v.trim() == "true"),
            None => {
                warn!("no DR status recorded, continuing without a DR root");
                Ok(false)
            }
        }
    }

    fn ensure_config_dir(&self) -> Result<()> {
        let dir = self.paths.config_dir();
        if dir.is_dir() {
            return Ok(());
        }
        fsutil::create_dir_all(&dir, fsutil::DIR_MODE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, StateStore) {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(Paths::new(tmp.path()));
        (tmp, store)
    }

    #[test]
    fn test_read_missing_is_missing_state() {
        let (_tmp, store) = store();
        let err = store.read(StateKey::Org).unwrap_err();
        assert!(matches!(err, PkiError::MissingState { key: "org", .. }));
        assert!(store.read_optional(StateKey::Org).unwrap().is_none());
    }

    #[test]
    fn test_write_appends_single_newline() {
        let (tmp, store) = store();
        store.write(StateKey::Org, "Alpha Beta").unwrap();
        let raw = std::fs::read_to_string(tmp.path().join(".privki/config/org")).unwrap();
        assert_eq!(raw, "Alpha Beta\n");
        assert_eq!(store.read(StateKey::Org).unwrap(), "Alpha Beta");
        assert_eq!(
            fsutil::mode_of(&tmp.path().join(".privki/config")).unwrap(),
            fsutil::DIR_MODE
        );
    }

    #[test]
    fn test_only_one_trailing_newline_is_stripped() {
        let (tmp, store) = store();
        store.touch(StateKey::PrimaryRoot).unwrap();
        std::fs::write(tmp.path().join(".privki/config/common"), "CA\n\n").unwrap();
        assert_eq!(store.read(StateKey::Common).unwrap(), "CA\n");
        assert_eq!(store.read(StateKey::PrimaryRoot).unwrap(), "");
    }

    #[test]
    fn test_fresh_repository_check() {
        let (_tmp, store) = store();
        store.assert_fresh_repository().unwrap();
        store.write(StateKey::RootCertUid, "abc").unwrap();
        assert!(matches!(
            store.assert_fresh_repository(),
            Err(PkiError::RepositoryExists { .. })
        ));
    }

    #[test]
    fn test_dr_status_defaults_to_false() {
        let (_tmp, store) = store();
        assert!(!store.dr_enabled().unwrap());
        store.write(StateKey::DrStatus, "false").unwrap();
        assert!(!store.dr_enabled().unwrap());
        store.write(StateKey::DrStatus, "true").unwrap();
        assert!(store.dr_enabled().unwrap());
    }

    proptest! {
        #[test]
        fn write_then_read_round_trips(value in "[^\n\r]{0,64}") {
            let (_tmp, store) = store();
            store.write(StateKey::Common, &value).unwrap();
            prop_assert_eq!(store.read(StateKey::Common).unwrap(), value);
        }
    }
}
