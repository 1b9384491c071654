use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for PKI operations
pub type Result<T> = std::result::Result<T, PkiError>;

/// Errors that can occur while managing a PKI repository
#[derive(Error, Debug)]
pub enum PkiError {
    /// A repository is already initialised under this home
    #[error("a PKI repository already exists at {}", path.display())]
    RepositoryExists {
        /// The state file proving the repository exists
        path: PathBuf,
    },

    /// A state file the operation depends on is absent
    #[error("missing state '{key}' at {}: run `privki init` and `privki create A0` first", path.display())]
    MissingState {
        /// State key name
        key: &'static str,
        /// Expected location of the state file
        path: PathBuf,
    },

    /// A required flag was omitted, empty or left at the `NA` sentinel
    #[error("argument {flag} is required")]
    MissingArgument {
        /// Flag name including leading dashes
        flag: String,
    },

    /// A flag carried a value outside its accepted domain
    #[error("invalid value for {flag}: {reason}")]
    InvalidArgument {
        /// Flag name including leading dashes
        flag: String,
        /// Why the value was rejected
        reason: String,
    },

    /// File, directory or permission failure
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// Path being read, written or created
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Underlying cryptographic primitive failed
    #[error("crypto error during {step}: {reason}")]
    Crypto {
        /// Operation that failed (e.g. "sign intermediate CSR")
        step: String,
        /// Backend error text
        reason: String,
    },

    /// Archive open/read/write/decrypt failure
    #[error("archive error at {}: {reason}", path.display())]
    Archive {
        /// Archive file involved
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Home directory unknown or backend unusable
    #[error("environment error: {0}")]
    Environment(String),
}

impl PkiError {
    /// Build an [`PkiError::Io`] for the given path.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Build a [`PkiError::Crypto`] for the named step.
    pub fn crypto(step: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Crypto {
            step: step.into(),
            reason: reason.to_string(),
        }
    }

    /// Build an [`PkiError::Archive`] for the given archive path.
    pub fn archive(path: impl AsRef<Path>, reason: impl std::fmt::Display) -> Self {
        Self::Archive {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Build a [`PkiError::MissingArgument`] for a flag.
    pub fn missing_argument(flag: impl Into<String>) -> Self {
        Self::MissingArgument { flag: flag.into() }
    }

    /// Build a [`PkiError::InvalidArgument`] for a flag.
    pub fn invalid_argument(flag: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            flag: flag.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the error was caused by command-line input
    #[must_use]
    pub const fn is_argument_error(&self) -> bool {
        matches!(
            self,
            Self::MissingArgument { .. } | Self::InvalidArgument { .. }
        )
    }

    /// Process exit code for this error.
    ///
    /// Argument errors exit with 2, repository-state errors with 3,
    /// everything else with 1.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::MissingArgument { .. } | Self::InvalidArgument { .. } => 2,
            Self::RepositoryExists { .. } | Self::MissingState { .. } => 3,
            _ => 1,
        }
    }
}
