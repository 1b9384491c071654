//! Command implementations.
//!
//! Every command validates its flags before touching the repository, then
//! holds the repository lock for the rest of its run.

pub mod backup;
pub mod create;
pub mod init;
pub mod restore;

use anyhow::Result;
use dialoguer::Password;
use privki::{Engine, OpensslBackend, RepositoryLock, StateStore};
use privki_core::types::UNSET_SENTINEL;
use privki_core::{Passphrase, Paths, PkiError};

use crate::config::Settings;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Loaded settings file.
    pub settings: Settings,

    /// Verbose output
    pub verbose: bool,
}

impl Context {
    /// Engine bound to the current user's home.
    pub fn engine(&self) -> Result<Engine> {
        let paths = Paths::from_env()?;
        let backend = OpensslBackend::new(self.settings.rsa_key_bits)?;
        Ok(Engine::new(StateStore::new(paths), backend))
    }

    /// Use the flag value when given, otherwise prompt.
    ///
    /// `confirm` asks twice when the settings allow it; use it for new keys.
    /// A flag value is used byte for byte, surrounding spaces included.
    pub fn passphrase(&self, flag: &str, value: Option<&str>, confirm: bool) -> Result<Passphrase> {
        if let Some(value) = value.filter(|v| !v.trim().is_empty() && *v != UNSET_SENTINEL) {
            return Ok(Passphrase::new(flag, value)?);
        }

        let prompt = format!("Passphrase for {}", flag.trim_start_matches('-'));
        let mut input = Password::new().with_prompt(prompt);
        if confirm && self.settings.prompt_confirmation {
            input = input.with_confirmation("Repeat passphrase", "Passphrases do not match");
        }
        let entered = input
            .interact()
            .map_err(|e| PkiError::invalid_argument(flag, format!("could not read passphrase: {e}")))?;
        Ok(Passphrase::new(flag, entered)?)
    }
}

/// Take the repository lock for `engine`'s home.
pub fn lock(engine: &Engine) -> Result<RepositoryLock> {
    Ok(RepositoryLock::acquire(engine.state().paths())?)
}

/// Accept a directory flag only if it ends with a path separator.
pub fn directory_flag<'a>(flag: &str, value: Option<&'a str>) -> Result<&'a str, PkiError> {
    let value = privki_core::require(flag, value)?;
    if value.ends_with('/') || value.ends_with(std::path::MAIN_SEPARATOR) {
        Ok(value)
    } else {
        Err(PkiError::invalid_argument(flag, "path must end with '/'"))
    }
}
