//! # privki-cli
//!
//! Command-line front end for the privki engine.
//!
//! - `privki init`
//! - `privki create A0 --org=.. --common-name=.. [--with-dr=true] [--custom-oid=..]`
//! - `privki create A1 --org=.. [--name-restrict=..]`
//! - `privki backup --destination=<dir>/`
//! - `privki restore --source=<dir>/`
//!
//! Missing passphrase flags are prompted for on the terminal.

pub mod cli;
pub mod config;
pub mod logging;

pub use cli::run;
