//! The issuance state machine: init, root, DR root and intermediate.
//!
//! ```text
//! Uninitialized --init--> Initialized --create A0--> HasRoot [--with DR--> HasDRRoot]
//!                                                        |
//!                                                        +--create A1--> <uid>-intermed-ca-<start>/
//! ```
//!
//! Each transition runs its steps in order and stops at the first error.
//! Partially written directories are left in place for inspection.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use privki_core::paths::{finished_intermediate_dir, intermediate_archive, output_dir};
use privki_core::{
    dns_name, readable_bundle_name, readable_cert_name, CaRole, Passphrase, PkiError, Result,
    RootUid, StateKey, ValidityWindow,
};
use tracing::{debug, info, warn};

use crate::archive::{self, BackupReport, RestoreReport};
use crate::crypto::{describe_certificate, CryptoBackend, OpensslBackend, SigningRequest};
use crate::fsutil;
use crate::repository::CaDirectory;
use crate::selfkey::ArchivePassword;
use crate::state::StateStore;
use crate::template::{ExtensionProfile, IntermediateCaConfig, RootCaConfig};

const INTERMEDIATE_CSR: &str = "intermed-ca.req.pem";
const INTERMEDIATE_KEY_LEGACY: &str = "intermed-ca.key";
const INTERMEDIATE_PKCS1_KEY: &str = "intermed-ca-pkcs1.key.pem";
const SIGNED_INTERMEDIATE: &str = "intermed-ca.cert.pem";
const DR_SIGNED_INTERMEDIATE: &str = "intermed-ca.dr.cert.pem";
const CHAIN_BUNDLE: &str = "intermed-ca-chain-bundle.cert.pem";
const DR_CHAIN_BUNDLE: &str = "intermed-ca-chain-bundle.dr.cert.pem";
const CROSS_SIGNED_TAG: &str = "IA1_C";
const NAME_RESTRICT_FLAG: &str = "--name-restrict";

/// Inputs of `create A0`.
#[derive(Debug, Clone)]
pub struct RootRequest {
    pub oid: String,
    pub organization: String,
    pub common_name: String,
    pub passphrase: Passphrase,
    /// Also create the DR root under the same UID and passphrase
    pub with_dr: bool,
}

/// Inputs of `create A1`.
#[derive(Debug, Clone)]
pub struct IntermediateRequest {
    pub organization: String,
    /// Single permitted DNS subtree
    pub name_restriction: Option<String>,
    pub root_passphrase: Passphrase,
    pub passphrase: Passphrase,
}

/// Outcome of `init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub uid: RootUid,
    pub pki_path: PathBuf,
    pub backend_version: String,
}

/// Outcome of `create A0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootReport {
    pub uid: RootUid,
    pub root_cert: PathBuf,
    pub readable_cert: PathBuf,
    pub dr_cert: Option<PathBuf>,
    pub window: ValidityWindow,
}

/// Outcome of `create A1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntermediateReport {
    /// Final `<uid>-intermed-ca-<start>` directory
    pub directory: PathBuf,
    /// Unencrypted distribution archive under `output/`
    pub archive: PathBuf,
    pub cross_signed: bool,
    pub window: ValidityWindow,
}

/// Lifecycle engine for one home directory.
#[derive(Debug)]
pub struct Engine<B: CryptoBackend = OpensslBackend> {
    state: StateStore,
    backend: B,
}

impl<B: CryptoBackend> Engine<B> {
    pub const fn new(state: StateStore, backend: B) -> Self {
        Self { state, backend }
    }

    pub const fn state(&self) -> &StateStore {
        &self.state
    }

    /// Create the repository and its root UID.
    pub fn init(&self) -> Result<InitReport> {
        let backend_version = self.backend.availability_check()?;
        debug!(backend = %backend_version, "crypto backend available");
        self.state.assert_fresh_repository()?;

        let uid = RootUid::generate();
        let pki_path = self.state.paths().pki_dir(&uid);
        self.state.write(StateKey::RootCertUid, uid.as_str())?;
        self.state
            .write(StateKey::PkiPath, &pki_path.to_string_lossy())?;
        fsutil::create_dir_all(&pki_path, fsutil::DIR_MODE)?;
        self.state.touch(StateKey::PrimaryRoot)?;

        info!(uid = %uid, pki_path = %pki_path.display(), "repository initialised");
        Ok(InitReport {
            uid,
            pki_path,
            backend_version,
        })
    }

    /// Create the root CA and, if requested, the DR root.
    pub fn create_root(&self, request: &RootRequest) -> Result<RootReport> {
        let (uid, pki_path) = self.active()?;
        let root = CaDirectory::new(&pki_path, &uid, CaRole::Root);
        if root.cert().exists() {
            return Err(PkiError::RepositoryExists { path: root.cert() });
        }

        self.state.write(StateKey::Oid, &request.oid)?;
        self.state.write(StateKey::Org, &request.organization)?;
        self.state.write(StateKey::Common, &request.common_name)?;

        let config = RootCaConfig::new(
            &request.oid,
            &request.organization,
            &request.common_name,
        );
        let window = ValidityWindow::root(Utc::now());
        let readable_cert = self.issue_root(&root, &uid, &config, &request.passphrase, window)?;
        warn!(
            cert = %root.cert().display(),
            "keep the root passphrase safe: it cannot be recovered and every intermediate needs it"
        );

        let dr_cert = if request.with_dr {
            let dr = CaDirectory::new(&pki_path, &uid, CaRole::DrRoot);
            self.issue_root(&dr, &uid, &config, &request.passphrase, window)?;
            self.state.write(StateKey::DrStatus, "true")?;
            Some(dr.cert())
        } else {
            None
        };

        Ok(RootReport {
            uid,
            root_cert: root.cert(),
            readable_cert,
            dr_cert,
            window,
        })
    }

    /// Issue an intermediate signed by A0 and, with a DR root, cross-signed.
    pub fn create_intermediate(&self, request: &IntermediateRequest) -> Result<IntermediateReport> {
        self.issue_intermediate(request, Utc::now())
    }

    fn issue_intermediate(
        &self,
        request: &IntermediateRequest,
        now: DateTime<Utc>,
    ) -> Result<IntermediateReport> {
        let name_restriction = request
            .name_restriction
            .as_deref()
            .map(|dns| dns_name(NAME_RESTRICT_FLAG, dns))
            .transpose()?;
        let (uid, pki_path) = self.active()?;
        let stock = self.stored_root_config()?;
        let root = CaDirectory::new(&pki_path, &uid, CaRole::Root);
        require_issued(&root)?;
        let cross_sign = self.state.dr_enabled()?;
        let dr = CaDirectory::new(&pki_path, &uid, CaRole::DrRoot);
        if cross_sign {
            require_issued(&dr)?;
        }

        let window = ValidityWindow::intermediate(now);
        let start = window.start_stamp();
        let directory = finished_intermediate_dir(&pki_path, &uid, &start);
        let archive = intermediate_archive(&pki_path, &uid, &start);
        for path in [&directory, &archive] {
            if path.exists() {
                return Err(PkiError::RepositoryExists { path: path.clone() });
            }
        }
        let working = CaDirectory::new(&pki_path, &uid, CaRole::Intermediate);
        working.prepare(&self.backend)?;
        let a1_config = IntermediateCaConfig::new(&stock.oid, &request.organization);
        working.write_config(&a1_config.render())?;

        let legacy_key = working.private_dir().join(INTERMEDIATE_KEY_LEGACY);
        self.backend.generate_csr(
            &a1_config.subject(),
            &legacy_key,
            &working.csr(),
            &request.passphrase,
        )?;
        fsutil::copy(&legacy_key, &working.key())?;
        fsutil::set_mode(&legacy_key, fsutil::KEY_MODE)?;
        fsutil::set_mode(&working.key(), fsutil::KEY_MODE)?;
        let pkcs1 = working.private_dir().join(INTERMEDIATE_PKCS1_KEY);
        self.backend
            .rsa_to_pkcs1(&working.key(), &pkcs1, &request.passphrase)?;

        let constrained = stock
            .clone()
            .with_name_constraint(name_restriction);
        let names = ReadableNames::new(&stock, &uid);

        let signed = self.sign_intermediate(&root, &working, &constrained, request, window)?;
        fsutil::copy(&signed, &working.cert())?;
        fsutil::copy(&signed, &working.path().join(names.cert("IA1")))?;
        let bundle = working.path().join(CHAIN_BUNDLE);
        write_bundle(&bundle, &[&pkcs1, &signed, &root.cert()])?;
        fsutil::copy(&bundle, &working.path().join(names.bundle("IA1")))?;

        if cross_sign {
            let signed = self.sign_intermediate(&dr, &working, &constrained, request, window)?;
            fsutil::copy(&signed, &working.path().join(DR_SIGNED_INTERMEDIATE))?;
            fsutil::copy(&signed, &working.path().join(names.cert(CROSS_SIGNED_TAG)))?;
            let bundle = working.path().join(DR_CHAIN_BUNDLE);
            write_bundle(&bundle, &[&pkcs1, &signed, &dr.cert()])?;
            fsutil::copy(&bundle, &working.path().join(names.bundle(CROSS_SIGNED_TAG)))?;
            dr.write_config(&stock.render())?;
        }
        root.write_config(&stock.render())?;

        let out = output_dir(&pki_path);
        fsutil::create_dir_all(&out, fsutil::DIR_MODE)?;
        let entries = archive::pack_intermediate(&archive, working.path(), &pki_path)?;
        std::fs::rename(working.path(), &directory).map_err(|e| PkiError::io(&directory, e))?;

        info!(
            directory = %directory.display(),
            archive = %archive.display(),
            entries,
            cross_signed = cross_sign,
            "intermediate CA issued"
        );
        Ok(IntermediateReport {
            directory,
            archive,
            cross_signed: cross_sign,
            window,
        })
    }

    /// Write encrypted archives of the repository into `destination`.
    pub fn backup(&self, destination: &Path, password: &ArchivePassword) -> Result<BackupReport> {
        archive::backup(&self.state, destination, password)
    }

    /// Replace the repository with the archives found in `source`.
    pub fn restore(&self, source: &Path, password: &ArchivePassword) -> Result<RestoreReport> {
        archive::restore(&self.state, source, password)
    }

    fn active(&self) -> Result<(RootUid, PathBuf)> {
        Ok((self.state.root_uid()?, self.state.pki_path()?))
    }

    fn stored_root_config(&self) -> Result<RootCaConfig> {
        Ok(RootCaConfig::new(
            self.state.read(StateKey::Oid)?,
            self.state.read(StateKey::Org)?,
            self.state.read(StateKey::Common)?,
        ))
    }

    /// Prepare, key, self-sign and publish one root. Returns the readable copy.
    fn issue_root(
        &self,
        ca: &CaDirectory,
        uid: &RootUid,
        config: &RootCaConfig,
        passphrase: &Passphrase,
        window: ValidityWindow,
    ) -> Result<PathBuf> {
        let role = ca.role();
        ca.prepare(&self.backend)?;
        ca.write_config(&config.render())?;
        self.backend
            .generate_csr(&config.subject(), &ca.key(), &ca.csr(), passphrase)?;
        ca.rotate_serial(&self.backend)?;
        self.backend.self_sign(&SigningRequest {
            ca,
            config,
            csr: &ca.csr(),
            cert_out: &ca.cert(),
            passphrase,
            profile: ExtensionProfile::RootCa,
            window,
        })?;

        let readable = ca.path().join(readable_cert_name(
            &config.organization,
            &config.common_name,
            role.readable_tag(),
            uid,
        ));
        fsutil::copy(&ca.cert(), &readable)?;
        self.backend.generate_empty_crl(ca, passphrase)?;

        let summary = describe_certificate(&ca.cert())?;
        info!(
            role = %role,
            cert = %ca.cert().display(),
            subject = %summary.subject,
            not_before = %window.start_stamp(),
            not_after = %window.end_stamp(),
            "root certificate issued"
        );
        Ok(readable)
    }

    /// Queue the CSR with `signer`, sign it under `config`, return the cert in `signer/certs`.
    fn sign_intermediate(
        &self,
        signer: &CaDirectory,
        working: &CaDirectory,
        config: &RootCaConfig,
        request: &IntermediateRequest,
        window: ValidityWindow,
    ) -> Result<PathBuf> {
        let queued = signer.certreqs_dir().join(INTERMEDIATE_CSR);
        fsutil::copy(&working.csr(), &queued)?;
        signer.write_config(&config.render())?;
        signer.rotate_serial(&self.backend)?;

        let cert_out = signer.certs_dir().join(SIGNED_INTERMEDIATE);
        self.backend.sign(&SigningRequest {
            ca: signer,
            config,
            csr: &queued,
            cert_out: &cert_out,
            passphrase: &request.root_passphrase,
            profile: ExtensionProfile::IntermediateCa,
            window,
        })?;

        let summary = describe_certificate(&cert_out)?;
        info!(
            signer = %signer.role(),
            issuer = %summary.issuer,
            serial = %summary.serial,
            permitted_dns = ?summary.permitted_dns,
            "intermediate signed"
        );
        Ok(cert_out)
    }
}

/// Human-readable names derived from the stored organization and common name.
struct ReadableNames<'a> {
    org: &'a str,
    common: &'a str,
    uid: &'a RootUid,
}

impl<'a> ReadableNames<'a> {
    fn new(config: &'a RootCaConfig, uid: &'a RootUid) -> Self {
        Self {
            org: &config.organization,
            common: &config.common_name,
            uid,
        }
    }

    fn cert(&self, tag: &str) -> String {
        readable_cert_name(self.org, self.common, tag, self.uid)
    }

    fn bundle(&self, tag: &str) -> String {
        readable_bundle_name(self.org, self.common, tag, self.uid)
    }
}

fn require_issued(ca: &CaDirectory) -> Result<()> {
    let cert = ca.cert();
    if cert.is_file() {
        return Ok(());
    }
    Err(PkiError::MissingState {
        key: match ca.role() {
            CaRole::DrRoot => "dr-root-ca certificate",
            _ => "root-ca certificate",
        },
        path: cert,
    })
}

/// Concatenate PEM files into a chain bundle. The bundle holds a private key, so 0400.
fn write_bundle(out: &Path, parts: &[&Path]) -> Result<()> {
    let mut bundle = Vec::new();
    for part in parts {
        let bytes = fsutil::read(part)?;
        bundle.extend_from_slice(&bytes);
        if !bytes.ends_with(b"\n") {
            bundle.push(b'\n');
        }
    }
    fsutil::write_key(out, &bundle)
}
