//! # privki
//!
//! Lifecycle engine for a small private X.509 PKI.
//!
//! ## Repository layout
//!
//! ```text
//! ~/.privki/
//! ├── config/                     one value per file (root_cert_uid, pki_path, oid, ...)
//! └── <uid>/                      PKI materials
//!     ├── <uid>-root-ca/          A0
//!     ├── <uid>-dr-root-ca/       A0-DR (optional)
//!     ├── <uid>-intermed-ca-<t>/  one per issued A1
//!     └── output/                 A1 distribution archives
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use privki::{Engine, OpensslBackend, RootRequest, StateStore};
//! use privki_core::{Paths, Passphrase, DEFAULT_OID};
//!
//! let engine = Engine::new(StateStore::new(Paths::from_env()?), OpensslBackend::default());
//! engine.init()?;
//! engine.create_root(&RootRequest {
//!     oid: DEFAULT_OID.into(),
//!     organization: "Alpha Beta".into(),
//!     common_name: "Alpha Beta CA".into(),
//!     passphrase: Passphrase::new("--passphrase", "sixchars")?,
//!     with_dr: true,
//! })?;
//! ```

pub mod archive;
pub mod crypto;
pub mod error;
mod fsutil;
pub mod issuance;
pub mod lock;
pub mod repository;
pub mod selfkey;
pub mod state;
pub mod template;

pub use archive::{BackupReport, RestoreReport, CONFIG_ARCHIVE, PKI_ARCHIVE};
pub use crypto::{describe_certificate, CertSummary, CryptoBackend, OpensslBackend};
pub use issuance::{
    Engine, InitReport, IntermediateReport, IntermediateRequest, RootReport, RootRequest,
};
pub use lock::RepositoryLock;
pub use repository::CaDirectory;
pub use selfkey::ArchivePassword;
pub use state::StateStore;
pub use template::{IntermediateCaConfig, RootCaConfig};
