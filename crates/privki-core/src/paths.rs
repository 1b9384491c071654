//! Path resolution for the repository layout.
//!
//! Everything here is derived from the user home; nothing touches the disk.

use std::path::{Path, PathBuf};

use crate::error::{PkiError, Result};
use crate::types::{CaRole, RootUid, StateKey};

/// Repository directory name under the home.
pub const BASE_DIR_NAME: &str = ".privki";

/// Configuration directory name under the repository.
pub const CONFIG_DIR_NAME: &str = "config";

/// Directory under the PKI path receiving intermediate distribution archives.
pub const OUTPUT_DIR_NAME: &str = "output";

/// Path resolver rooted at a user home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    home: PathBuf,
}

impl Paths {
    /// Resolve the current user's home directory.
    pub fn from_env() -> Result<Self> {
        let dirs = directories::BaseDirs::new().ok_or_else(|| {
            PkiError::Environment("unable to determine the user home directory".to_string())
        })?;
        Ok(Self::new(dirs.home_dir()))
    }

    /// Resolver for an explicit home directory.
    pub fn new(home: impl AsRef<Path>) -> Self {
        Self {
            home: normalize(home.as_ref()),
        }
    }

    /// The home directory.
    #[must_use]
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// `<home>/.privki`
    #[must_use]
    pub fn base_dir(&self) -> PathBuf {
        self.home.join(BASE_DIR_NAME)
    }

    /// `<home>/.privki/config`
    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.base_dir().join(CONFIG_DIR_NAME)
    }

    /// State file for `key` inside the config directory.
    #[must_use]
    pub fn state_file(&self, key: StateKey) -> PathBuf {
        self.config_dir().join(key.file_name())
    }

    /// Canonical PKI materials directory for a root UID: `<home>/.privki/<uid>`.
    #[must_use]
    pub fn pki_dir(&self, uid: &RootUid) -> PathBuf {
        self.base_dir().join(uid.as_str())
    }
}

/// `<pki>/<uid>-<suffix>` for the given role.
#[must_use]
pub fn ca_dir(pki_path: &Path, uid: &RootUid, role: CaRole) -> PathBuf {
    pki_path.join(format!("{uid}-{}", role.dir_suffix()))
}

/// Final name of a completed intermediate: `<pki>/<uid>-intermed-ca-<start>`.
#[must_use]
pub fn finished_intermediate_dir(pki_path: &Path, uid: &RootUid, start_stamp: &str) -> PathBuf {
    pki_path.join(format!(
        "{uid}-{}-{start_stamp}",
        CaRole::Intermediate.dir_suffix()
    ))
}

/// `<pki>/output`
#[must_use]
pub fn output_dir(pki_path: &Path) -> PathBuf {
    pki_path.join(OUTPUT_DIR_NAME)
}

/// `<pki>/output/<uid>-intermed-ca-<start>.zip`
#[must_use]
pub fn intermediate_archive(pki_path: &Path, uid: &RootUid, start_stamp: &str) -> PathBuf {
    output_dir(pki_path).join(format!(
        "{uid}-{}-{start_stamp}.zip",
        CaRole::Intermediate.dir_suffix()
    ))
}

/// Render a relative path with forward slashes, as archive entry names require.
#[must_use]
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn normalize(path: &Path) -> PathBuf {
    PathBuf::from(path.to_string_lossy().replace('\\', "/"))
}
