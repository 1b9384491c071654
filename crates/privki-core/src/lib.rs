//! # privki-core
//!
//! Shared types for the privki toolset:
//!
//! - [`PkiError`] and the crate-wide [`Result`] alias
//! - [`Paths`], the resolver for the `~/.privki` repository layout
//! - domain types such as [`CaRole`], [`Passphrase`] and [`ValidityWindow`]

pub mod error;
pub mod paths;
pub mod types;

pub use error::{PkiError, Result};
pub use paths::Paths;
pub use types::{
    dns_name, readable_bundle_name, readable_cert_name, require, supplied, CaRole, Passphrase,
    RootUid, StateKey, ValidityWindow, DEFAULT_OID,
};
