//! Run settings resolved from CLI flags, environment, config file and defaults.
//!
//! Precedence, highest first: CLI flag, environment (`PACKAGES`), config
//! file, built-in default.
pub mod toml_loader;

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use serde::Deserialize;

use crate::cli::Cli;

/// Application directory name under the XDG base directories.
pub const APP_DIR: &str = "dotfiles-bootstrap";

/// Default branch of the dotfiles repository.
pub const DEFAULT_BRANCH: &str = "main";

/// Default configuration-management tool.
pub const DEFAULT_TOOL: &str = "chezmoi";

/// Packages the handoff cannot do without.
pub const DEFAULT_DEPENDENCIES: &[&str] = &["git", "chezmoi"];

/// Install locations a fresh shell may not have on `PATH` yet.
const SYSTEM_TOOL_DIRS: &[&str] = &[
    "/snap/bin",
    "/usr/local/bin",
    "/opt/homebrew/bin",
    "/home/linuxbrew/.linuxbrew/bin",
];

/// Contents of the optional TOML configuration file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Dotfiles repository URL.
    pub repo: Option<String>,
    /// Repository branch.
    pub branch: Option<String>,
    /// Configuration-management tool executable.
    pub tool: Option<String>,
    /// Required packages (`package` or `package:executable`).
    pub dependencies: Option<Vec<String>>,
    /// Optional packages installed after the dependencies.
    pub packages: Option<Vec<String>>,
}

/// Snapshot of the environment variables the tool reads.
///
/// Captured once in `main` so resolution is a pure function of its inputs.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// `$USER` (or `$USERNAME`).
    pub user: Option<String>,
    /// `$HOME`.
    pub home: Option<PathBuf>,
    /// `$XDG_CACHE_HOME`.
    pub xdg_cache_home: Option<PathBuf>,
    /// `$XDG_CONFIG_HOME`.
    pub xdg_config_home: Option<PathBuf>,
    /// `$PACKAGES`: space-separated optional packages.
    pub packages: Option<String>,
    /// `$INCLUDES`: helper path, informational.
    pub includes: Option<String>,
}

impl Environment {
    /// Read the process environment.
    #[must_use]
    pub fn capture() -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Self {
            user: var("USER").or_else(|| var("USERNAME")),
            home: var("HOME")
                .or_else(|| var("USERPROFILE"))
                .map(PathBuf::from),
            xdg_cache_home: var("XDG_CACHE_HOME").map(PathBuf::from),
            xdg_config_home: var("XDG_CONFIG_HOME").map(PathBuf::from),
            packages: std::env::var("PACKAGES").ok(),
            includes: var("INCLUDES"),
        }
    }

    /// `$XDG_CACHE_HOME`, falling back to `~/.cache`.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.xdg_cache_home.clone().unwrap_or_else(|| self.home_dir().join(".cache"))
    }

    /// `$XDG_CONFIG_HOME`, falling back to `~/.config`.
    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.xdg_config_home.clone().unwrap_or_else(|| self.home_dir().join(".config"))
    }

    fn home_dir(&self) -> PathBuf {
        self.home.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Dotfiles repository URL.
    pub repo: String,
    /// Repository branch.
    pub branch: String,
    /// Configuration-management tool executable.
    pub tool: String,
    /// Required packages, installed with the abort policy.
    pub dependencies: Vec<String>,
    /// Optional packages, installed with the continue policy.
    pub packages: Vec<String>,
    /// Informational helper path from `$INCLUDES`.
    pub includes: Option<String>,
    /// Where the detailed log goes.
    pub log_file: PathBuf,
    /// Where the config file was looked for.
    pub config_file: PathBuf,
    /// Answer every prompt with yes.
    pub auto_confirm: bool,
    /// Report instead of changing anything.
    pub dry_run: bool,
    /// Echo diagnostics to stderr.
    pub verbose: bool,
    /// Home directory, used to find user-local tool installs.
    pub home: Option<PathBuf>,
}

impl Settings {
    /// The handoff command line the user can run by hand.
    #[must_use]
    pub fn handoff_hint(&self) -> String {
        format!(
            "{} init --apply --branch {} {}",
            self.tool, self.branch, self.repo
        )
    }

    /// Directories searched for tools installed outside `PATH`.
    #[must_use]
    pub fn tool_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = SYSTEM_TOOL_DIRS.iter().map(PathBuf::from).collect();
        if let Some(home) = &self.home {
            dirs.push(home.join(".local/bin"));
            dirs.push(home.join("bin"));
        }
        dirs
    }
}

/// Default log location: `$XDG_CACHE_HOME/dotfiles-bootstrap/bootstrap.log`.
#[must_use]
pub fn default_log_path(env: &Environment) -> PathBuf {
    env.cache_dir().join(APP_DIR).join("bootstrap.log")
}

/// Default config location: `$XDG_CONFIG_HOME/dotfiles-bootstrap/config.toml`.
#[must_use]
pub fn default_config_path(env: &Environment) -> PathBuf {
    env.config_dir().join(APP_DIR).join("config.toml")
}

/// Load the config file at `path` (missing means defaults).
///
/// # Errors
///
/// Returns an error if the file exists but is unreadable or invalid.
pub fn load_file(path: &Path) -> Result<FileConfig> {
    toml_loader::load_config(path)
}

/// Resolve settings from the command line, the environment and the config file.
///
/// # Errors
///
/// Returns an error if the config file is invalid or no repository can be
/// determined.
pub fn resolve(cli: &Cli, env: &Environment) -> Result<Settings> {
    let config_file = cli
        .config
        .clone()
        .unwrap_or_else(|| default_config_path(env));
    let file = load_file(&config_file)?;
    resolve_with(cli, env, file, config_file)
}

fn resolve_with(
    cli: &Cli,
    env: &Environment,
    file: FileConfig,
    config_file: PathBuf,
) -> Result<Settings> {
    let repo = match (cli.repo.clone(), file.repo, env.user.as_deref()) {
        (Some(repo), _, _) | (None, Some(repo), _) => repo,
        (None, None, Some(user)) => format!("https://github.com/{user}/dotfiles.git"),
        (None, None, None) => bail!("cannot determine the dotfiles repository; pass --repo"),
    };
    if repo.trim().is_empty() {
        bail!("the dotfiles repository must not be empty");
    }

    let packages = env.packages.as_deref().map_or_else(
        || file.packages.unwrap_or_default(),
        |list| list.split_whitespace().map(str::to_string).collect(),
    );

    Ok(Settings {
        repo,
        branch: cli
            .branch
            .clone()
            .or(file.branch)
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
        tool: file.tool.unwrap_or_else(|| DEFAULT_TOOL.to_string()),
        dependencies: file
            .dependencies
            .unwrap_or_else(|| DEFAULT_DEPENDENCIES.iter().map(ToString::to_string).collect()),
        packages,
        includes: env.includes.clone(),
        log_file: cli.log_file.clone().unwrap_or_else(|| default_log_path(env)),
        config_file,
        auto_confirm: cli.yes,
        dry_run: cli.dry_run,
        verbose: cli.verbose,
        home: env.home.clone(),
    })
}
