//! `privki restore` - replace the repository from a backup.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use privki::selfkey;

use super::{directory_flag, Context};
use crate::cli::args::RestoreArgs;

pub fn execute(ctx: &Context, args: &RestoreArgs) -> Result<()> {
    let source = directory_flag("--source", args.source.as_deref())?;

    let engine = ctx.engine()?;
    let password = selfkey::process_password()?;
    let _lock = super::lock(&engine)?;
    let report = engine.restore(Path::new(source), &password)?;

    println!("{} repository restored", "Success:".green().bold());
    println!("  {} {}", "pki path:".bold(), report.pki_path.display());
    println!(
        "  {} {}",
        "files:".bold(),
        report.config_entries + report.pki_entries
    );
    Ok(())
}
