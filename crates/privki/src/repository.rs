//! On-disk skeleton of a single CA directory.

use std::path::{Path, PathBuf};

use privki_core::paths::ca_dir;
use privki_core::{CaRole, PkiError, Result, RootUid};
use tracing::debug;

use crate::crypto::CryptoBackend;
use crate::fsutil;

/// Bytes of randomness in a serial.
pub const SERIAL_BYTES: usize = 16;

/// Initial CRL number.
pub const INITIAL_CRL_NUMBER: &str = "00";

const SUBDIRS: [&str; 4] = ["certs", "certreqs", "crl", "newcerts"];

/// One CA's directory and the well-known files inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaDirectory {
    root: PathBuf,
    role: CaRole,
}

impl CaDirectory {
    /// `<pki>/<uid>-<suffix>` for `role`.
    pub fn new(pki_path: &Path, uid: &RootUid, role: CaRole) -> Self {
        Self {
            root: ca_dir(pki_path, uid, role),
            role,
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub const fn role(&self) -> CaRole {
        self.role
    }

    fn file(&self, ext: &str) -> PathBuf {
        self.root.join(format!("{}.{ext}", self.role.file_stem()))
    }

    pub fn private_dir(&self) -> PathBuf {
        self.root.join("private")
    }

    pub fn certs_dir(&self) -> PathBuf {
        self.root.join("certs")
    }

    pub fn certreqs_dir(&self) -> PathBuf {
        self.root.join("certreqs")
    }

    pub fn newcerts_dir(&self) -> PathBuf {
        self.root.join("newcerts")
    }

    /// Rendered configuration, `<stem>.cnf`.
    pub fn config(&self) -> PathBuf {
        self.file("cnf")
    }

    /// Issuance ledger, `<stem>.index`.
    pub fn index(&self) -> PathBuf {
        self.file("index")
    }

    /// CRL counter, `<stem>.crlnum`.
    pub fn crlnum(&self) -> PathBuf {
        self.file("crlnum")
    }

    /// Next serial, `<stem>.serial`.
    pub fn serial(&self) -> PathBuf {
        self.file("serial")
    }

    /// CSR, `<stem>.req.pem`.
    pub fn csr(&self) -> PathBuf {
        self.file("req.pem")
    }

    /// CA certificate, `<stem>.cert.pem`.
    pub fn cert(&self) -> PathBuf {
        self.file("cert.pem")
    }

    /// Encrypted private key, `private/<stem>.key.pem`.
    pub fn key(&self) -> PathBuf {
        self.private_dir()
            .join(format!("{}.key.pem", self.role.file_stem()))
    }

    /// Revocation list, `crl/<stem>.crl`.
    pub fn crl(&self) -> PathBuf {
        self.root
            .join("crl")
            .join(format!("{}.crl", self.role.file_stem()))
    }

    /// Create the skeleton and a fresh serial.
    ///
    /// Safe to re-run: the serial is replaced, the index and CRL counter are kept.
    pub fn prepare(&self, backend: &dyn CryptoBackend) -> Result<()> {
        debug!(role = %self.role, path = %self.root.display(), "preparing CA directory");
        fsutil::create_dir_all(&self.root, fsutil::DIR_MODE)?;
        for sub in SUBDIRS {
            fsutil::create_dir_all(&self.root.join(sub), fsutil::DIR_MODE)?;
        }
        fsutil::create_dir_all(&self.private_dir(), fsutil::PRIVATE_DIR_MODE)?;

        let index = self.index();
        if !index.exists() {
            fsutil::write(&index, b"")?;
        }
        let crlnum = self.crlnum();
        if !crlnum.exists() {
            fsutil::write(&crlnum, format!("{INITIAL_CRL_NUMBER}\n").as_bytes())?;
        }
        self.rotate_serial(backend)?;
        Ok(())
    }

    /// Replace the serial with fresh randomness and return it.
    pub fn rotate_serial(&self, backend: &dyn CryptoBackend) -> Result<String> {
        let serial = backend.random_hex(SERIAL_BYTES)?;
        fsutil::write(&self.serial(), format!("{serial}\n").as_bytes())?;
        Ok(serial)
    }

    /// Current serial as hex.
    pub fn read_serial(&self) -> Result<String> {
        let path = self.serial();
        let serial = fsutil::read_to_string(&path)?.trim().to_string();
        if serial.is_empty() || !serial.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PkiError::crypto(
                format!("read serial {}", path.display()),
                "serial file is not hex",
            ));
        }
        Ok(serial)
    }

    /// Write the rendered configuration.
    pub fn write_config(&self, text: &str) -> Result<()> {
        fsutil::write_atomic(&self.config(), text.as_bytes(), fsutil::FILE_MODE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::OpensslBackend;
    use tempfile::TempDir;

    fn dir(tmp: &TempDir, role: CaRole) -> CaDirectory {
        CaDirectory::new(tmp.path(), &RootUid::parse("uid0").unwrap(), role)
    }

    #[test]
    fn test_file_names() {
        let tmp = TempDir::new().unwrap();
        let dr = dir(&tmp, CaRole::DrRoot);
        assert!(dr.path().ends_with("uid0-dr-root-ca"));
        assert!(dr.config().ends_with("uid0-dr-root-ca/root-ca.cnf"));
        assert!(dr.key().ends_with("private/root-ca.key.pem"));
        assert!(dr.crl().ends_with("crl/root-ca.crl"));

        let a1 = dir(&tmp, CaRole::Intermediate);
        assert!(a1.csr().ends_with("uid0-intermed-ca/intermed-ca.req.pem"));
    }

    #[test]
    fn test_prepare_layout_and_modes() {
        let tmp = TempDir::new().unwrap();
        let ca = dir(&tmp, CaRole::Root);
        ca.prepare(&OpensslBackend::default()).unwrap();

        for sub in SUBDIRS {
            assert!(ca.path().join(sub).is_dir(), "{sub}");
        }
        assert_eq!(
            fsutil::mode_of(&ca.private_dir()).unwrap(),
            fsutil::PRIVATE_DIR_MODE
        );
        assert_eq!(std::fs::read(ca.index()).unwrap(), b"");
        assert_eq!(std::fs::read_to_string(ca.crlnum()).unwrap(), "00\n");
        assert_eq!(ca.read_serial().unwrap().len(), SERIAL_BYTES * 2);
    }

    #[test]
    fn test_prepare_is_idempotent_but_rotates_serial() {
        let tmp = TempDir::new().unwrap();
        let ca = dir(&tmp, CaRole::Root);
        let backend = OpensslBackend::default();
        ca.prepare(&backend).unwrap();
        std::fs::write(ca.index(), "V\tentry\n").unwrap();
        let first = ca.read_serial().unwrap();

        ca.prepare(&backend).unwrap();
        assert_eq!(std::fs::read_to_string(ca.index()).unwrap(), "V\tentry\n");
        assert_ne!(ca.read_serial().unwrap(), first);
    }

    #[test]
    fn test_read_serial_rejects_garbage() {
        let tmp = TempDir::new().unwrap();
        let ca = dir(&tmp, CaRole::Root);
        std::fs::create_dir_all(ca.path()).unwrap();
        std::fs::write(ca.serial(), "not-hex\n").unwrap();
        assert!(matches!(ca.read_serial(), Err(PkiError::Crypto { .. })));
    }
}
