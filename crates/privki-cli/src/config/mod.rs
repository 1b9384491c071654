//! Tool settings (`config.toml`).
//!
//! These are preferences for the binary itself. Repository state lives under
//! `~/.privki/config/` and is handled by the engine.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use directories::ProjectDirs;
use privki::crypto::{DEFAULT_KEY_BITS, MIN_KEY_BITS};
use privki_core::PkiError;
use serde::{Deserialize, Serialize};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// CLI settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// `text` or `json`.
    pub log_format: LogFormat,

    /// RSA modulus size for newly generated CA keys.
    pub rsa_key_bits: u32,

    /// Ask twice when prompting for a new passphrase.
    pub prompt_confirmation: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Text,
            rsa_key_bits: DEFAULT_KEY_BITS,
            prompt_confirmation: true,
        }
    }
}

impl Settings {
    /// Default settings file location.
    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "privki", "privki")
            .ok_or_else(|| PkiError::Environment("could not determine config directory".into()))?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading settings {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("in settings {}", path.display()))
    }

    /// Parse and validate settings text.
    pub fn parse(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), PkiError> {
        if self.rsa_key_bits < MIN_KEY_BITS {
            return Err(PkiError::invalid_argument(
                "rsa_key_bits",
                format!("must be at least {MIN_KEY_BITS}"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        assert_eq!(Settings::parse("").unwrap(), Settings::default());
        assert_eq!(Settings::default().rsa_key_bits, 4096);
    }

    #[test]
    fn test_partial_file() {
        let s = Settings::parse("log_format = \"json\"\nprompt_confirmation = false\n").unwrap();
        assert_eq!(s.log_format, LogFormat::Json);
        assert!(!s.prompt_confirmation);
        assert_eq!(s.rsa_key_bits, DEFAULT_KEY_BITS);
    }

    #[test]
    fn test_small_keys_rejected() {
        let err = Settings::parse("rsa_key_bits = 1024").unwrap_err();
        let pki = err.downcast_ref::<PkiError>().unwrap();
        assert!(pki.is_argument_error());
    }

    #[test]
    fn test_missing_file_is_default() {
        let tmp = tempfile::TempDir::new().unwrap();
        let s = Settings::load(Some(&tmp.path().join("nope.toml"))).unwrap();
        assert_eq!(s, Settings::default());
    }
}
