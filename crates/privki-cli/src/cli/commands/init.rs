//! `privki init` - create the repository.

use anyhow::Result;
use colored::Colorize;

use super::Context;

pub fn execute(ctx: &Context) -> Result<()> {
    let engine = ctx.engine()?;
    let _lock = super::lock(&engine)?;
    let report = engine.init()?;

    println!("{} repository initialised", "Success:".green().bold());
    println!("  {} {}", "uid:".bold(), report.uid.as_str().cyan());
    println!("  {} {}", "pki path:".bold(), report.pki_path.display());
    if ctx.verbose {
        println!("  {} {}", "backend:".bold(), report.backend_version.dimmed());
    }
    Ok(())
}
