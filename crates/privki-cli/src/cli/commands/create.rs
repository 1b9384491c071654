//! `privki create A0|A1` - issue certificate authorities.

use anyhow::Result;
use colored::Colorize;
use privki::{IntermediateRequest, RootRequest};
use privki_core::{dns_name, require, supplied, PkiError, DEFAULT_OID};

use super::Context;
use crate::cli::args::{Authority, CreateArgs, IntermediateArgs, RootArgs};

pub fn execute(ctx: &Context, args: CreateArgs) -> Result<()> {
    match args.authority {
        Authority::Root(args) => create_root(ctx, &args),
        Authority::Intermediate(args) => create_intermediate(ctx, &args),
    }
}

fn create_root(ctx: &Context, args: &RootArgs) -> Result<()> {
    let with_dr = parse_bool("--with-dr", &args.with_dr)?;
    let oid = match supplied(args.custom_oid.as_deref()) {
        Some(oid) => validate_oid(oid)?,
        None => DEFAULT_OID,
    };
    let organization = require("--org", args.org.as_deref())?;
    let common_name = require("--common-name", args.common_name.as_deref())?;
    let passphrase = ctx.passphrase("--passphrase", args.passphrase.as_deref(), true)?;

    let engine = ctx.engine()?;
    let _lock = super::lock(&engine)?;
    let report = engine.create_root(&RootRequest {
        oid: oid.to_string(),
        organization: organization.to_string(),
        common_name: common_name.to_string(),
        passphrase,
        with_dr,
    })?;

    println!("{} root CA {} created", "Success:".green().bold(), "A0".cyan());
    println!("  {} {}", "certificate:".bold(), report.root_cert.display());
    println!("  {} {}", "copy:".bold(), report.readable_cert.display());
    if let Some(dr) = &report.dr_cert {
        println!("  {} {}", "dr root:".bold(), dr.display());
    }
    println!(
        "  {} {} .. {}",
        "valid:".bold(),
        report.window.not_before.format("%Y-%m-%d"),
        report.window.not_after.format("%Y-%m-%d")
    );
    println!(
        "{} keep the root passphrase safe; it cannot be recovered.",
        "Note:".yellow().bold()
    );
    Ok(())
}

fn create_intermediate(ctx: &Context, args: &IntermediateArgs) -> Result<()> {
    let organization = require("--org", args.org.as_deref())?;
    let name_restriction = supplied(args.name_restrict.as_deref())
        .map(|dns| dns_name("--name-restrict", dns).map(str::to_string))
        .transpose()?;
    let root_passphrase =
        ctx.passphrase("--root-passphrase", args.root_passphrase.as_deref(), false)?;
    let passphrase = ctx.passphrase("--passphrase", args.passphrase.as_deref(), true)?;

    let engine = ctx.engine()?;
    let _lock = super::lock(&engine)?;
    let report = engine.create_intermediate(&IntermediateRequest {
        organization: organization.to_string(),
        name_restriction,
        root_passphrase,
        passphrase,
    })?;

    let how = if report.cross_signed {
        "cross-signed by A0 and A0-DR"
    } else {
        "signed by A0"
    };
    println!(
        "{} intermediate CA {} created, {}",
        "Success:".green().bold(),
        "A1".cyan(),
        how
    );
    println!("  {} {}", "directory:".bold(), report.directory.display());
    println!("  {} {}", "archive:".bold(), report.archive.display());
    Ok(())
}

fn parse_bool(flag: &str, value: &str) -> Result<bool, PkiError> {
    match value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(PkiError::invalid_argument(
            flag,
            format!("expected true or false, got '{other}'"),
        )),
    }
}

fn validate_oid(oid: &str) -> Result<&str, PkiError> {
    let arcs: Vec<&str> = oid.split('.').collect();
    let well_formed = arcs.len() >= 2
        && arcs
            .iter()
            .all(|arc| !arc.is_empty() && arc.bytes().all(|b| b.is_ascii_digit()));
    if well_formed {
        Ok(oid)
    } else {
        Err(PkiError::invalid_argument(
            "--custom-oid",
            format!("'{oid}' is not a dotted OID"),
        ))
    }
}
