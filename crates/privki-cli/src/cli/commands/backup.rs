//! `privki backup` - encrypted snapshot of the repository.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use privki::selfkey;

use super::{directory_flag, Context};
use crate::cli::args::BackupArgs;

pub fn execute(ctx: &Context, args: &BackupArgs) -> Result<()> {
    let destination = directory_flag("--destination", args.destination.as_deref())?;

    let engine = ctx.engine()?;
    let password = selfkey::process_password()?;
    let _lock = super::lock(&engine)?;
    let report = engine.backup(Path::new(destination), &password)?;

    println!("{} backup written", "Success:".green().bold());
    println!(
        "  {} {} ({} files)",
        "config:".bold(),
        report.config_archive.display(),
        report.config_entries
    );
    println!(
        "  {} {} ({} files)",
        "pki:".bold(),
        report.pki_archive.display(),
        report.pki_entries
    );
    println!(
        "{} archives open only with this exact privki binary.",
        "Note:".yellow().bold()
    );
    Ok(())
}
