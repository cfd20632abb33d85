//! The bootstrap sequence: privileges, platform, system update, dependencies,
//! handoff.
use std::sync::Arc;
use std::time::Duration;

use crate::cleanup::Cleanup;
use crate::config::Settings;
use crate::download::{Fetch, HttpFetcher};
use crate::error::BootstrapError;
use crate::exec::{CommandSpec, Executor, locate};
use crate::logging::{Reporter, StageStatus};
use crate::packages::installer::{CLT_POLL_ATTEMPTS, CLT_POLL_INTERVAL};
use crate::packages::{Adapter, InstallPolicy, Installer, PackagePlan};
use crate::platform::{self, DetectPaths, PlatformInfo};
use crate::privilege::{KEEP_ALIVE_INTERVAL, KeepAlive, Privilege};

/// Position in the bootstrap sequence.
///
/// Stages only move forward; a failure ends the run in the stage that was
/// being attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Nothing has happened yet.
    Init,
    /// Privilege elevation was attempted.
    PrivilegeAcquired,
    /// Platform detected and package manager resolved.
    PlatformDetected,
    /// System update ran or was declined.
    SystemUpdated,
    /// Required tools are installed and invocable.
    DependenciesInstalled,
    /// The configuration tool has applied the dotfiles.
    HandoffComplete,
    /// Summary printed.
    Done,
}

impl Stage {
    /// Name used in the summary.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Init => "Start",
            Self::PrivilegeAcquired => "Privileges",
            Self::PlatformDetected => "Platform",
            Self::SystemUpdated => "System update",
            Self::DependenciesInstalled => "Dependencies",
            Self::HandoffComplete => "Handoff",
            Self::Done => "Done",
        }
    }

    /// The stage after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Init => Self::PrivilegeAcquired,
            Self::PrivilegeAcquired => Self::PlatformDetected,
            Self::PlatformDetected => Self::SystemUpdated,
            Self::SystemUpdated => Self::DependenciesInstalled,
            Self::DependenciesInstalled => Self::HandoffComplete,
            Self::HandoffComplete | Self::Done => Self::Done,
        }
    }
}

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every stage completed.
    Completed,
    /// The user declined the handoff; the manual command was printed.
    HandoffDeclined,
}

/// Drives one bootstrap run.
#[derive(Debug)]
pub struct Bootstrap<'a> {
    settings: &'a Settings,
    reporter: &'a Reporter,
    executor: Arc<dyn Executor>,
    cleanup: Cleanup,
    fetcher: Arc<dyn Fetch>,
    detect_paths: DetectPaths,
    poll_interval: Duration,
    poll_attempts: u32,
    keep_alive: Option<Duration>,
    stage: Stage,
    platform: Option<PlatformInfo>,
}

impl<'a> Bootstrap<'a> {
    /// Prepare a run against the real system.
    #[must_use]
    pub fn new(
        settings: &'a Settings,
        reporter: &'a Reporter,
        executor: Arc<dyn Executor>,
        cleanup: Cleanup,
    ) -> Self {
        Self {
            settings,
            reporter,
            executor,
            cleanup,
            fetcher: Arc::new(HttpFetcher::default()),
            detect_paths: DetectPaths::default(),
            poll_interval: CLT_POLL_INTERVAL,
            poll_attempts: CLT_POLL_ATTEMPTS,
            keep_alive: Some(KEEP_ALIVE_INTERVAL),
            stage: Stage::Init,
            platform: None,
        }
    }

    /// Use `fetcher` for downloads.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetch>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Read os-release and DMI data from `paths`.
    #[must_use]
    pub fn with_detect_paths(mut self, paths: DetectPaths) -> Self {
        self.detect_paths = paths;
        self
    }

    /// Poll the Command Line Tools installer with this interval and limit.
    #[must_use]
    pub const fn with_poll(mut self, interval: Duration, attempts: u32) -> Self {
        self.poll_interval = interval;
        self.poll_attempts = attempts;
        self
    }

    /// Refresh sudo credentials every `interval`, or never with `None`.
    #[must_use]
    pub const fn with_keep_alive(mut self, interval: Option<Duration>) -> Self {
        self.keep_alive = interval;
        self
    }

    /// The last stage reached.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// The detected platform, once detection has run.
    #[must_use]
    pub const fn platform(&self) -> Option<&PlatformInfo> {
        self.platform.as_ref()
    }

    /// Run every stage in order.
    ///
    /// A failure is recorded against the stage being attempted and the
    /// summary is printed before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error; see [`BootstrapError::exit_code`].
    pub fn run(&mut self) -> Result<Outcome, BootstrapError> {
        self.run_stages()
            .map_err(|e| {
                // A command killed by the same Ctrl-C fails on its own.
                if self.cleanup.is_interrupted() {
                    BootstrapError::Interrupted
                } else {
                    e
                }
            })
            .inspect_err(|e| {
                self.reporter.record_stage(
                    self.stage.next().title(),
                    StageStatus::Failed,
                    Some(&e.to_string()),
                );
                self.reporter.print_summary();
            })
    }

    /// Run, report a fatal error on the user channel, and return the exit code.
    pub fn execute(&mut self) -> i32 {
        match self.run() {
            Ok(outcome) => {
                tracing::debug!("finished: {outcome:?}");
                0
            }
            Err(e) => {
                self.reporter.error(&e.to_string());
                self.reporter
                    .info(&format!("Details in {}", self.reporter.log().describe()));
                self.reporter.log().flush();
                e.exit_code()
            }
        }
    }

    fn run_stages(&mut self) -> Result<Outcome, BootstrapError> {
        self.log_context();

        self.reporter.stage("Acquiring privileges");
        let privilege = Privilege::acquire(self.reporter, self.settings.dry_run);
        let _keep_alive = self
            .keep_alive
            .filter(|_| privilege == Privilege::Sudo && !self.settings.dry_run)
            .map(|interval| KeepAlive::spawn(Arc::clone(&self.executor), interval));
        let privilege_note = match privilege {
            Privilege::Root => "root",
            Privilege::Sudo => "sudo",
            Privilege::Unavailable => "unavailable",
        };
        self.advance(Stage::PrivilegeAcquired, StageStatus::Ok, Some(privilege_note))?;

        self.reporter.stage("Detecting platform");
        let platform = platform::detect(self.executor.as_ref(), &self.detect_paths)?;
        self.reporter.info(&format!("Platform: {platform}"));
        let adapter = Adapter::for_platform(&platform);
        self.platform = Some(platform);
        let adapter = adapter?;
        self.reporter
            .info(&format!("Package manager: {}", adapter.manager()));
        self.advance(Stage::PlatformDetected, StageStatus::Ok, None)?;

        let installer = Installer::new(
            adapter,
            privilege,
            Arc::clone(&self.fetcher),
            self.cleanup.clone(),
        )
        .dry_run(self.settings.dry_run)
        .tool_dirs(self.settings.tool_dirs())
        .poll(self.poll_interval, self.poll_attempts);

        self.reporter.stage("Updating system");
        if self.reporter.ask_default_yes("Update system packages now?") {
            installer.update_system(self.reporter)?;
            self.advance(Stage::SystemUpdated, self.applied(), None)?;
        } else {
            self.reporter.warn("Skipping system update");
            self.advance(Stage::SystemUpdated, StageStatus::Skipped, Some("declined"))?;
        }

        self.reporter.stage("Installing dependencies");
        let plan = adapter.plan_in(
            &self.settings.dependencies,
            self.executor.as_ref(),
            &self.settings.tool_dirs(),
        );
        self.log_plan(&plan);
        installer.ensure_installed(&plan, self.reporter)?;
        let tool = self.verify_tool()?;
        self.install_optional(&adapter, &installer)?;
        self.advance(Stage::DependenciesInstalled, self.applied(), None)?;

        self.reporter.stage("Applying dotfiles");
        let hint = self.settings.handoff_hint();
        if !self.reporter.ask_default_yes(&format!("Run `{hint}` now?")) {
            self.reporter.warn("Skipping handoff");
            self.reporter.info("Run this when you are ready:");
            self.reporter.info(&format!("  {hint}"));
            self.reporter.record_stage(
                Stage::HandoffComplete.title(),
                StageStatus::Skipped,
                Some("declined"),
            );
            self.reporter.print_summary();
            return Ok(Outcome::HandoffDeclined);
        }
        self.handoff(&tool)?;
        self.advance(Stage::HandoffComplete, self.applied(), None)?;

        self.stage = Stage::Done;
        self.reporter.success("Bootstrap complete");
        self.reporter.print_summary();
        Ok(Outcome::Completed)
    }

    fn advance(
        &mut self,
        stage: Stage,
        status: StageStatus,
        message: Option<&str>,
    ) -> Result<(), BootstrapError> {
        tracing::debug!("stage {:?} -> {stage:?}", self.stage);
        self.stage = stage;
        self.reporter.record_stage(stage.title(), status, message);
        if self.cleanup.is_interrupted() {
            return Err(BootstrapError::Interrupted);
        }
        Ok(())
    }

    const fn applied(&self) -> StageStatus {
        if self.settings.dry_run {
            StageStatus::DryRun
        } else {
            StageStatus::Ok
        }
    }

    fn log_context(&self) {
        let version = option_env!("BOOTSTRAP_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"));
        self.reporter.debug(&format!("dotfiles-bootstrap {version}"));
        self.reporter
            .debug(&format!("config file: {}", self.settings.config_file.display()));
        self.reporter.debug(&format!(
            "repo: {} (branch {})",
            self.settings.repo, self.settings.branch
        ));
        self.reporter
            .debug(&format!("dependencies: {}", self.settings.dependencies.join(" ")));
        if !self.settings.packages.is_empty() {
            self.reporter
                .debug(&format!("packages: {}", self.settings.packages.join(" ")));
        }
        if let Some(includes) = &self.settings.includes {
            self.reporter.debug(&format!("includes: {includes}"));
        }
        if self.settings.dry_run {
            self.reporter.warn("Dry run: nothing will be changed");
        }
    }

    fn log_plan(&self, plan: &PackagePlan) {
        self.reporter.debug(&format!(
            "plan via {}: present [{}], missing [{}], pre-steps {:?}",
            plan.manager,
            plan.already_present.iter().cloned().collect::<Vec<_>>().join(" "),
            plan.to_install.iter().cloned().collect::<Vec<_>>().join(" "),
            plan.pre_steps
        ));
    }

    /// Confirm the configuration tool runs, returning the path to invoke.
    fn verify_tool(&self) -> Result<String, BootstrapError> {
        let tool = &self.settings.tool;
        if self.settings.dry_run {
            self.reporter
                .dry_run(&format!("would verify `{tool} --version`"));
            return Ok(tool.clone());
        }
        let not_invocable = || BootstrapError::DependencyVerification { tool: tool.clone() };
        let path = locate(self.executor.as_ref(), tool, &self.settings.tool_dirs())
            .ok_or_else(not_invocable)?;
        let result = self.reporter.exec(
            &format!("Verifying {tool}"),
            &CommandSpec::new(&path).arg("--version"),
        );
        if result.succeeded {
            Ok(path)
        } else {
            Err(not_invocable())
        }
    }

    fn install_optional(
        &self,
        adapter: &Adapter,
        installer: &Installer,
    ) -> Result<(), BootstrapError> {
        if self.settings.packages.is_empty() {
            return Ok(());
        }
        self.reporter.info("Installing optional packages");
        let plan = adapter.plan_in(
            &self.settings.packages,
            self.executor.as_ref(),
            &self.settings.tool_dirs(),
        );
        self.log_plan(&plan);
        let results = installer
            .with_policy(InstallPolicy::ContinueOnFailure)
            .ensure_installed(&plan, self.reporter)?;
        let failed: Vec<&str> = results
            .iter()
            .filter(|r| !r.succeeded)
            .map(|r| r.description.as_str())
            .collect();
        if failed.is_empty() {
            self.reporter
                .record_stage("Optional packages", self.applied(), None);
        } else {
            self.reporter.warn(&format!(
                "{} optional package(s) failed; see the log",
                failed.len()
            ));
            self.reporter.record_stage(
                "Optional packages",
                StageStatus::Failed,
                Some(&failed.join(", ")),
            );
        }
        Ok(())
    }

    fn handoff(&self, tool: &str) -> Result<(), BootstrapError> {
        let command = CommandSpec::new(tool).args([
            "init",
            "--apply",
            "--branch",
            self.settings.branch.as_str(),
            self.settings.repo.as_str(),
        ]);
        if self.settings.dry_run {
            self.reporter.dry_run(&format!("Applying dotfiles: {command}"));
            return Ok(());
        }
        let result = self.reporter.exec_interactive("Applying dotfiles", &command);
        if result.succeeded {
            Ok(())
        } else {
            Err(BootstrapError::CommandFailed {
                description: result.description,
                command: result.command,
                exit_code: result.exit_code,
            })
        }
    }
}
