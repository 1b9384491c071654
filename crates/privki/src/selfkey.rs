//! Archive password derived from the running executable.
//!
//! The password is the hex SHA-256 of a fixed preamble, the executable's
//! bytes and a fixed postamble, so only the same build can open its backups.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use privki_core::{PkiError, Result};
use ring::digest::{Context, SHA256};

const PREAMBLE: [&[u8]; 2] = [b"SHA256_DIGMAC_CPSR", b"HMAC_ID_CODEPSR"];
const POSTAMBLE: &[u8] = b"AES256_CBC_CTR1";

/// Buffer size for streaming the executable (64 KiB).
const BUF_SIZE: usize = 64 * 1024;

static PROCESS_KEY: OnceLock<ArchivePassword> = OnceLock::new();

/// Password used for per-entry archive encryption.
#[derive(Clone, PartialEq, Eq)]
pub struct ArchivePassword(String);

impl ArchivePassword {
    /// Wrap an explicit password.
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for ArchivePassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ArchivePassword(****)")
    }
}

/// Derive the password from an executable image on disk.
pub fn derive_from_path(executable: &Path) -> Result<ArchivePassword> {
    let mut file = File::open(executable).map_err(|e| PkiError::io(executable, e))?;
    let mut context = Context::new(&SHA256);
    for part in PREAMBLE {
        context.update(part);
    }
    let mut buf = vec![0_u8; BUF_SIZE];
    loop {
        let n = file.read(&mut buf).map_err(|e| PkiError::io(executable, e))?;
        if n == 0 {
            break;
        }
        context.update(&buf[..n]);
    }
    context.update(POSTAMBLE);
    Ok(ArchivePassword(hex::encode(context.finish().as_ref())))
}

/// Password for this process, computed once from `current_exe`.
pub fn process_password() -> Result<ArchivePassword> {
    if let Some(key) = PROCESS_KEY.get() {
        return Ok(key.clone());
    }
    let exe = std::env::current_exe()
        .map_err(|e| PkiError::Environment(format!("cannot locate own executable: {e}")))?;
    let key = derive_from_path(&exe)?;
    Ok(PROCESS_KEY.get_or_init(|| key).clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn image(bytes: &[u8]) -> NamedTempFile {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(bytes).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    #[test]
    fn test_matches_one_shot_digest() {
        let exe = image(b"\x7fELF fake binary");
        let mut all = Vec::new();
        all.extend_from_slice(b"SHA256_DIGMAC_CPSRHMAC_ID_CODEPSR");
        all.extend_from_slice(b"\x7fELF fake binary");
        all.extend_from_slice(b"AES256_CBC_CTR1");
        let expected = hex::encode(ring::digest::digest(&SHA256, &all).as_ref());

        let key = derive_from_path(exe.path()).unwrap();
        assert_eq!(key.as_str(), expected);
        assert_eq!(key.as_str().len(), 64);
    }

    #[test]
    fn test_empty_image() {
        let exe = image(b"");
        let expected = hex::encode(
            ring::digest::digest(&SHA256, b"SHA256_DIGMAC_CPSRHMAC_ID_CODEPSRAES256_CBC_CTR1")
                .as_ref(),
        );
        assert_eq!(derive_from_path(exe.path()).unwrap().as_str(), expected);
    }

    #[test]
    fn test_process_password_is_stable() {
        let a = process_password().unwrap();
        let b = process_password().unwrap();
        assert_eq!(a, b);
        assert!(!format!("{a:?}").contains(a.as_str()));
    }

    #[test]
    fn test_missing_executable_is_io_error() {
        let err = derive_from_path(Path::new("/nonexistent/privki")).unwrap_err();
        assert!(matches!(err, PkiError::Io { .. }));
    }

    proptest! {
        #[test]
        fn any_byte_change_changes_password(
            bytes in proptest::collection::vec(any::<u8>(), 1..256),
            idx in any::<prop::sample::Index>(),
            flip in 1_u8..=255,
        ) {
            let mut other = bytes.clone();
            let i = idx.index(other.len());
            other[i] ^= flip;
            let a = derive_from_path(image(&bytes).path()).unwrap();
            let b = derive_from_path(image(&other).path()).unwrap();
            prop_assert_ne!(a, b);
        }
    }
}
