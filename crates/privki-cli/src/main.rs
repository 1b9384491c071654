//! privki - private PKI bootstrapper.

use std::process::ExitCode;

use colored::Colorize;
use privki_core::PkiError;

fn main() -> ExitCode {
    match privki_cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            let code = err
                .chain()
                .find_map(|cause| cause.downcast_ref::<PkiError>())
                .map_or(1, PkiError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
