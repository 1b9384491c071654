//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use anyhow::Result;
use args::{Cli, Commands};
use clap::Parser;

use crate::config::{LogFormat, Settings};

/// Run the CLI application.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref())?;

    // --json wins over the settings file
    let log_format = if cli.json {
        LogFormat::Json
    } else {
        settings.log_format
    };
    crate::logging::init(log_format, cli.verbose);

    let ctx = commands::Context {
        settings,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Init => commands::init::execute(&ctx),
        Commands::Create(args) => commands::create::execute(&ctx, args),
        Commands::Backup(args) => commands::backup::execute(&ctx, &args),
        Commands::Restore(args) => commands::restore::execute(&ctx, &args),
    }
}
