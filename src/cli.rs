//! Command-line interface definition.
use std::path::PathBuf;

use clap::Parser;
use clap_complete::Shell;

/// Bootstrap a fresh machine and hand it over to the dotfiles manager.
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "dotfiles-bootstrap",
    about = "Bootstrap a fresh machine and hand it over to the dotfiles manager",
    version = option_env!("BOOTSTRAP_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
)]
pub struct Cli {
    /// Echo internal diagnostics to stderr
    #[arg(short, long)]
    pub verbose: bool,

    /// Write the detailed log here instead of the cache directory
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Answer yes to every prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Show what would be done without changing anything
    #[arg(short = 'd', long)]
    pub dry_run: bool,

    /// Configuration file (default: $XDG_CONFIG_HOME/dotfiles-bootstrap/config.toml)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Dotfiles repository to initialise from
    #[arg(long, value_name = "URL")]
    pub repo: Option<String>,

    /// Branch of the dotfiles repository
    #[arg(long, value_name = "NAME")]
    pub branch: Option<String>,

    /// Print a shell completion script and exit
    #[arg(long, value_name = "SHELL")]
    pub completions: Option<Shell>,
}
