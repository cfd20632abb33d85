//! Idempotent execution of package plans.
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::manager::{Adapter, ManagerCommand, PreStep};
use super::plan::PackagePlan;
use crate::cleanup::Cleanup;
use crate::download::{Fetch, HOMEBREW_INSTALLER_URL};
use crate::error::BootstrapError;
use crate::exec::{CommandSpec, Executor, RunResult, locate};
use crate::logging::Reporter;
use crate::privilege::Privilege;

/// Delay between checks while the Command Line Tools installer runs.
pub const CLT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Maximum number of checks (30 minutes at the default interval).
pub const CLT_POLL_ATTEMPTS: u32 = 360;

/// What to do when one install in a batch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallPolicy {
    /// Stop at the first failure and propagate its exit code.
    #[default]
    AbortOnFailure,
    /// Report the failure and carry on with the rest of the batch.
    ContinueOnFailure,
}

/// Runs package plans and system maintenance through the [`Reporter`].
///
/// Every step first checks whether its effect is already in place, so
/// running twice against the same system issues no mutating command the
/// second time.
#[derive(Debug, Clone)]
pub struct Installer {
    adapter: Adapter,
    privilege: Privilege,
    fetcher: Arc<dyn Fetch>,
    cleanup: Cleanup,
    policy: InstallPolicy,
    dry_run: bool,
    tool_dirs: Vec<PathBuf>,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl Installer {
    /// Create an installer for `adapter` with the abort policy.
    #[must_use]
    pub fn new(
        adapter: Adapter,
        privilege: Privilege,
        fetcher: Arc<dyn Fetch>,
        cleanup: Cleanup,
    ) -> Self {
        Self {
            adapter,
            privilege,
            fetcher,
            cleanup,
            policy: InstallPolicy::default(),
            dry_run: false,
            tool_dirs: Vec::new(),
            poll_interval: CLT_POLL_INTERVAL,
            poll_attempts: CLT_POLL_ATTEMPTS,
        }
    }

    /// Report commands instead of running them.
    #[must_use]
    pub const fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Extra directories searched for freshly installed managers.
    #[must_use]
    pub fn tool_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.tool_dirs = dirs;
        self
    }

    /// How long and how often to wait for the Command Line Tools installer.
    #[must_use]
    pub const fn poll(mut self, interval: Duration, attempts: u32) -> Self {
        self.poll_interval = interval;
        self.poll_attempts = attempts;
        self
    }

    /// A copy of this installer using `policy`.
    #[must_use]
    pub fn with_policy(&self, policy: InstallPolicy) -> Self {
        Self {
            policy,
            ..self.clone()
        }
    }

    /// Install everything in `plan.to_install`, one command per package.
    ///
    /// # Errors
    ///
    /// Under [`InstallPolicy::AbortOnFailure`], returns
    /// [`BootstrapError::CommandFailed`] carrying the manager's exit code for
    /// the first failed install. Pre-step failures always abort.
    pub fn ensure_installed(
        &self,
        plan: &PackagePlan,
        reporter: &Reporter,
    ) -> Result<Vec<RunResult>, BootstrapError> {
        if plan.is_satisfied() {
            if plan.already_present.is_empty() {
                reporter.info("Nothing to install");
            } else {
                reporter.info(&format!("Already present: {}", join(&plan.already_present)));
            }
            return Ok(Vec::new());
        }
        if !plan.already_present.is_empty() {
            reporter.debug(&format!("already present: {}", join(&plan.already_present)));
        }

        let mut results = self.prepare(&plan.pre_steps, reporter)?;
        for package in &plan.to_install {
            self.check_interrupted()?;
            let result = self.run(reporter, &self.adapter.install_command(package));
            if !result.succeeded {
                match self.policy {
                    InstallPolicy::AbortOnFailure => return Err(failure(&result)),
                    InstallPolicy::ContinueOnFailure => {
                        reporter.warn(&format!("Could not install {package}; continuing"));
                    }
                }
            }
            results.push(result);
        }
        Ok(results)
    }

    /// Refresh, upgrade and clean the system with the primary manager.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::CommandFailed`] for the first failed command.
    pub fn update_system(&self, reporter: &Reporter) -> Result<Vec<RunResult>, BootstrapError> {
        let mut results = self.prepare(self.adapter.platform_pre_steps(), reporter)?;
        let commands = self
            .adapter
            .update_commands()
            .into_iter()
            .chain(self.adapter.upgrade_commands())
            .chain(self.adapter.clean_commands());
        for command in commands {
            self.check_interrupted()?;
            results.push(self.require(reporter, &command)?);
        }
        Ok(results)
    }

    /// Run each pre-step, skipping those already satisfied.
    ///
    /// # Errors
    ///
    /// Returns an error if a pre-step fails.
    pub fn prepare(
        &self,
        steps: &[PreStep],
        reporter: &Reporter,
    ) -> Result<Vec<RunResult>, BootstrapError> {
        let mut results = Vec::new();
        for step in steps {
            self.check_interrupted()?;
            results.extend(match step {
                PreStep::CommandLineTools => self.command_line_tools(reporter)?,
                PreStep::Homebrew => self.homebrew(reporter)?,
                PreStep::Snapd => self.snapd(reporter)?,
            });
        }
        Ok(results)
    }

    fn command_line_tools(&self, reporter: &Reporter) -> Result<Vec<RunResult>, BootstrapError> {
        let check = CommandSpec::new("xcode-select").arg("-p");
        if succeeds(reporter.executor(), &check) {
            reporter.info("Xcode Command Line Tools already installed");
            return Ok(Vec::new());
        }
        let install = ManagerCommand {
            description: "Installing Xcode Command Line Tools".to_string(),
            command: CommandSpec::new("xcode-select").arg("--install"),
            needs_root: false,
        };
        let result = self.require(reporter, &install)?;
        if self.dry_run {
            return Ok(vec![result]);
        }

        reporter.info("Waiting for the Command Line Tools installer to finish");
        for _ in 0..self.poll_attempts {
            self.check_interrupted()?;
            thread::sleep(self.poll_interval);
            if succeeds(reporter.executor(), &check) {
                reporter.success("Xcode Command Line Tools installed");
                return Ok(vec![result]);
            }
        }
        reporter.error("Timed out waiting for Xcode Command Line Tools");
        Err(BootstrapError::CommandFailed {
            description: "Waiting for Xcode Command Line Tools".to_string(),
            command: check.to_string(),
            exit_code: 1,
        })
    }

    fn homebrew(&self, reporter: &Reporter) -> Result<Vec<RunResult>, BootstrapError> {
        if locate(reporter.executor(), "brew", &self.tool_dirs).is_some() {
            reporter.info("Homebrew already installed");
            return Ok(Vec::new());
        }
        let description = "Installing Homebrew";
        if self.dry_run {
            reporter.dry_run(&format!("{description}: download {HOMEBREW_INSTALLER_URL} and run it"));
            return Ok(vec![dry_run_result(description, HOMEBREW_INSTALLER_URL)]);
        }

        reporter.action("Downloading the Homebrew installer");
        let script = self.cleanup.scratch_file("homebrew-install.sh")?;
        self.fetcher.fetch(HOMEBREW_INSTALLER_URL, script.path())?;
        reporter.debug(&format!("installer saved to {}", script.path().display()));

        let command = CommandSpec::new("/bin/bash")
            .arg(script.path().to_string_lossy())
            .env("NONINTERACTIVE", "1");
        let result = reporter.exec(description, &command);
        if result.succeeded {
            Ok(vec![result])
        } else {
            Err(failure(&result))
        }
    }

    fn snapd(&self, reporter: &Reporter) -> Result<Vec<RunResult>, BootstrapError> {
        if locate(reporter.executor(), "snap", &self.tool_dirs).is_some() {
            reporter.info("snap already available");
            return Ok(Vec::new());
        }
        let mut results = vec![self.require(reporter, &self.adapter.install_command("snapd"))?];
        if reporter.executor().which("systemctl") {
            let enable = ManagerCommand {
                description: "Enabling snapd".to_string(),
                command: CommandSpec::new("systemctl").args(["enable", "--now", "snapd.socket"]),
                needs_root: true,
            };
            results.push(self.require(reporter, &enable)?);
        }
        Ok(results)
    }

    /// Run a command, turning failure into an error.
    fn require(
        &self,
        reporter: &Reporter,
        command: &ManagerCommand,
    ) -> Result<RunResult, BootstrapError> {
        let result = self.run(reporter, command);
        if result.succeeded {
            Ok(result)
        } else {
            Err(failure(&result))
        }
    }

    fn run(&self, reporter: &Reporter, command: &ManagerCommand) -> RunResult {
        let resolved = self.resolve(reporter.executor(), command.command.clone());
        let cmd = self.privilege.elevate(resolved, command.needs_root);
        if self.dry_run {
            reporter.dry_run(&format!("{}: {cmd}", command.description));
            return dry_run_result(&command.description, &cmd.to_string());
        }
        reporter.exec(&command.description, &cmd)
    }

    /// Point at a manager installed earlier in this run but not yet on `PATH`.
    fn resolve(&self, executor: &dyn Executor, mut cmd: CommandSpec) -> CommandSpec {
        if let Some(found) = locate(executor, &cmd.program, &self.tool_dirs) {
            cmd.program = found;
        }
        cmd
    }

    fn check_interrupted(&self) -> Result<(), BootstrapError> {
        if self.cleanup.is_interrupted() {
            Err(BootstrapError::Interrupted)
        } else {
            Ok(())
        }
    }
}

fn succeeds(executor: &dyn Executor, cmd: &CommandSpec) -> bool {
    executor.run_unchecked(cmd).is_ok_and(|r| r.success)
}

fn failure(result: &RunResult) -> BootstrapError {
    BootstrapError::CommandFailed {
        description: result.description.clone(),
        command: result.command.clone(),
        exit_code: result.exit_code,
    }
}

fn dry_run_result(description: &str, command: &str) -> RunResult {
    RunResult {
        description: description.to_string(),
        command: command.to_string(),
        exit_code: 0,
        succeeded: true,
    }
}

fn join(items: &std::collections::BTreeSet<String>) -> String {
    items.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}
