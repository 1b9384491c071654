//! Command-line argument definitions using clap.
//!
//! Required flags are declared optional here so that missing values and the
//! `NA` sentinel are reported the same way, by the command itself.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Bootstrap and maintain a private PKI.
///
/// Creates a root CA (A0), an optional disaster-recovery root, and
/// cross-signed intermediates (A1) under ~/.privki.
#[derive(Parser, Debug)]
#[command(name = "privki")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Emit logs as JSON
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Settings file (default: platform config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an empty repository and its root UID
    Init,

    /// Issue a certificate authority
    Create(CreateArgs),

    /// Write encrypted archives of the repository
    Backup(BackupArgs),

    /// Replace the repository from encrypted archives
    Restore(RestoreArgs),
}

// ============================================================================
// create
// ============================================================================

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[command(subcommand)]
    pub authority: Authority,
}

#[derive(Subcommand, Debug)]
pub enum Authority {
    /// Root CA, optionally with a DR root
    #[command(name = "A0")]
    Root(RootArgs),

    /// Intermediate CA, cross-signed when a DR root exists
    #[command(name = "A1")]
    Intermediate(IntermediateArgs),
}

#[derive(Args, Debug)]
pub struct RootArgs {
    /// Also create a disaster-recovery root (true|false)
    #[arg(long, value_name = "BOOL", default_value = "false")]
    pub with_dr: String,

    /// Certificate policy OID
    #[arg(long, value_name = "OID")]
    pub custom_oid: Option<String>,

    /// Organization name
    #[arg(long)]
    pub org: Option<String>,

    /// Common name
    #[arg(long)]
    pub common_name: Option<String>,

    /// Root key passphrase (prompted when omitted)
    #[arg(long)]
    pub passphrase: Option<String>,
}

#[derive(Args, Debug)]
pub struct IntermediateArgs {
    /// Organization name
    #[arg(long)]
    pub org: Option<String>,

    /// Permitted DNS subtree for the intermediate
    #[arg(long, value_name = "DNS")]
    pub name_restrict: Option<String>,

    /// Passphrase of the existing root key(s)
    #[arg(long)]
    pub root_passphrase: Option<String>,

    /// Passphrase for the new intermediate key
    #[arg(long)]
    pub passphrase: Option<String>,
}

// ============================================================================
// backup / restore
// ============================================================================

#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Directory to write archives into (must end with '/')
    #[arg(long, value_name = "DIR/")]
    pub destination: Option<String>,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Directory holding the archives (must end with '/')
    #[arg(long, value_name = "DIR/")]
    pub source: Option<String>,
}
