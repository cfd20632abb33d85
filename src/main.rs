//! `dotfiles-bootstrap` binary: parse arguments and run the bootstrap.
use std::process::ExitCode;

use clap::Parser;
use dotfiles_bootstrap::{cli, commands};

fn main() -> ExitCode {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();
    let code = commands::run(&args);
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
