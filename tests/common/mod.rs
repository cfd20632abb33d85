// Shared helpers for integration tests.
//
// Provides a scripted terminal, an executor that records every command and
// simulates package installs, and a fluent harness that wires them into a
// `Bootstrap` run with in-memory user and log channels.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dotfiles_bootstrap::cleanup::Cleanup;
use dotfiles_bootstrap::commands::Bootstrap;
use dotfiles_bootstrap::config::{DEFAULT_BRANCH, DEFAULT_DEPENDENCIES, DEFAULT_TOOL, Settings};
use dotfiles_bootstrap::download::Fetch;
use dotfiles_bootstrap::exec::{CommandSpec, ExecResult, Executor};
use dotfiles_bootstrap::logging::{LogSink, Reporter, SharedBuffer, Terminal};
use dotfiles_bootstrap::platform::DetectPaths;

/// Repository URL used by every test run.
pub const REPO: &str = "https://github.com/example/dotfiles.git";

/// Terminal that replays queued answers, then reads empty lines.
#[derive(Debug, Default)]
pub struct ScriptedTerminal {
    answers: Mutex<VecDeque<String>>,
}

impl ScriptedTerminal {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(ToString::to_string).collect()),
        }
    }
}

impl Terminal for ScriptedTerminal {
    fn read_line(&self) -> io::Result<String> {
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// Terminal with nothing attached; every read fails.
#[derive(Debug, Default)]
pub struct DetachedTerminal;

impl Terminal for DetachedTerminal {
    fn read_line(&self) -> io::Result<String> {
        Err(io::Error::new(io::ErrorKind::NotFound, "no terminal"))
    }
}

/// A scripted response for commands whose line contains `needle`.
#[derive(Debug, Clone)]
struct Script {
    needle: String,
    code: i32,
    stdout: String,
}

/// Executor that records every command line and simulates installs.
///
/// Programs in `installed` answer `which`; a successful install command adds
/// its package (and `snap` for `snapd`).
#[derive(Debug)]
pub struct RecordingExecutor {
    kernel: String,
    installed: Mutex<HashSet<String>>,
    scripts: Vec<Script>,
    side_effects: Vec<(String, String)>,
    interrupt: Option<(String, Cleanup)>,
    calls: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn new(kernel: &str) -> Self {
        Self {
            kernel: kernel.to_string(),
            installed: Mutex::new(["sudo".to_string()].into_iter().collect()),
            scripts: Vec::new(),
            side_effects: Vec::new(),
            interrupt: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn linux() -> Self {
        Self::new("Linux")
    }

    pub fn with_programs(self, programs: &[&str]) -> Self {
        self.installed
            .lock()
            .unwrap()
            .extend(programs.iter().map(ToString::to_string));
        self
    }

    pub fn without_sudo(self) -> Self {
        self.installed.lock().unwrap().remove("sudo");
        self
    }

    /// Make commands containing `needle` exit with `code`.
    pub fn fail_on(self, needle: &str, code: i32) -> Self {
        self.respond(needle, code, "")
    }

    /// Script the exit code and stdout of commands containing `needle`.
    pub fn respond(mut self, needle: &str, code: i32, stdout: &str) -> Self {
        self.scripts.push(Script {
            needle: needle.to_string(),
            code,
            stdout: stdout.to_string(),
        });
        self
    }

    /// Make `program` available once a command containing `needle` succeeds.
    pub fn installs_on(mut self, needle: &str, program: &str) -> Self {
        self.side_effects
            .push((needle.to_string(), program.to_string()));
        self
    }

    /// Simulate Ctrl-C while a command containing `needle` runs: the
    /// interrupt is recorded and the command dies with exit code 130.
    pub fn interrupt_on(mut self, needle: &str, cleanup: Cleanup) -> Self {
        self.interrupt = Some((needle.to_string(), cleanup));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, needle: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.contains(needle))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn respond_to(&self, cmd: &CommandSpec) -> ExecResult {
        let line = cmd.to_string();
        self.calls.lock().unwrap().push(line.clone());

        if cmd.program == "uname" {
            return ok(&format!("{}\n", self.kernel));
        }
        if cmd.program == "id" {
            return ok("1000\n");
        }

        if let Some((needle, cleanup)) = &self.interrupt
            && line.contains(needle.as_str())
        {
            assert!(!cleanup.interrupt());
            return ExecResult {
                stdout: String::new(),
                stderr: String::new(),
                success: false,
                code: Some(130),
            };
        }

        let script = self.scripts.iter().find(|s| line.contains(&s.needle));
        let code = script.map_or(0, |s| s.code);
        let stdout = script.map(|s| s.stdout.clone()).unwrap_or_default();

        if code == 0 {
            let mut installed = self.installed.lock().unwrap();
            for (needle, program) in &self.side_effects {
                if line.contains(needle.as_str()) {
                    installed.insert(program.clone());
                }
            }
        }

        let is_install = cmd.args.iter().any(|a| a == "install" || a == "-S");
        if code == 0
            && is_install
            && let Some(package) = cmd.args.iter().rev().find(|a| !a.starts_with('-'))
        {
            let mut installed = self.installed.lock().unwrap();
            installed.insert(package.clone());
            if package == "snapd" {
                installed.insert("snap".to_string());
            }
        }
        ExecResult {
            stdout,
            stderr: String::new(),
            success: code == 0,
            code: Some(code),
        }
    }
}

impl Executor for RecordingExecutor {
    fn run_unchecked(&self, cmd: &CommandSpec) -> anyhow::Result<ExecResult> {
        Ok(self.respond_to(cmd))
    }

    fn run_interactive(&self, cmd: &CommandSpec) -> anyhow::Result<ExecResult> {
        Ok(self.respond_to(cmd))
    }

    fn which(&self, program: &str) -> bool {
        self.installed.lock().unwrap().contains(program)
    }
}

fn ok(stdout: &str) -> ExecResult {
    ExecResult {
        stdout: stdout.to_string(),
        stderr: String::new(),
        success: true,
        code: Some(0),
    }
}

/// Fetcher that writes a stub installer script and records the URL.
#[derive(Debug, Default)]
pub struct StubFetcher {
    pub urls: Mutex<Vec<String>>,
}

impl Fetch for StubFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> anyhow::Result<()> {
        self.urls.lock().unwrap().push(url.to_string());
        std::fs::write(dest, "#!/bin/bash\nexit 0\n")?;
        Ok(())
    }
}

/// Settings for a run with defaults and no home directory.
pub fn settings() -> Settings {
    Settings {
        repo: REPO.to_string(),
        branch: DEFAULT_BRANCH.to_string(),
        tool: DEFAULT_TOOL.to_string(),
        dependencies: DEFAULT_DEPENDENCIES.iter().map(ToString::to_string).collect(),
        packages: Vec::new(),
        includes: None,
        log_file: PathBuf::from("bootstrap.log"),
        config_file: PathBuf::from("config.toml"),
        auto_confirm: false,
        dry_run: false,
        verbose: false,
        home: None,
    }
}

/// Result of one harness run.
#[derive(Debug)]
pub struct RunOutput {
    pub code: i32,
    pub user: String,
    pub log: String,
}

/// Isolated environment for running the bootstrap sequence.
pub struct Harness {
    /// Holds the os-release and DMI files.
    pub root: tempfile::TempDir,
    pub executor: Arc<RecordingExecutor>,
    pub fetcher: Arc<StubFetcher>,
    pub settings: Settings,
    pub cleanup: Cleanup,
    os_release: Option<String>,
}

impl Harness {
    pub fn new(executor: RecordingExecutor) -> Self {
        Self {
            root: tempfile::tempdir().expect("create temp dir"),
            executor: Arc::new(executor),
            fetcher: Arc::new(StubFetcher::default()),
            settings: settings(),
            cleanup: Cleanup::default(),
            os_release: None,
        }
    }

    /// A Linux host whose os-release reports `distro_id`.
    pub fn linux(distro_id: &str, executor: RecordingExecutor) -> Self {
        let mut harness = Self::new(executor);
        harness.os_release = Some(format!("NAME=\"Test\"\nID={distro_id}\n"));
        harness
    }

    /// Share `cleanup` with the run instead of a fresh registry.
    pub fn with_cleanup(mut self, cleanup: Cleanup) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Place an executable stub at `relative` under the temp root and return
    /// its directory.
    pub fn install_stub(&self, relative: &str) -> PathBuf {
        let path = self.root.path().join(relative);
        let dir = path.parent().expect("stub has a parent").to_path_buf();
        std::fs::create_dir_all(&dir).expect("create stub dir");
        std::fs::write(&path, "#!/bin/sh\n").expect("write stub");
        dir
    }

    pub fn with_settings(mut self, f: impl FnOnce(&mut Settings)) -> Self {
        f(&mut self.settings);
        self
    }

    fn detect_paths(&self) -> DetectPaths {
        let os_release = self.root.path().join("os-release");
        if let Some(contents) = &self.os_release {
            std::fs::write(&os_release, contents).expect("write os-release");
        }
        DetectPaths {
            os_release: vec![os_release],
            dmi_vendor: self.root.path().join("sys_vendor"),
        }
    }

    /// Run once, answering prompts from `answers`.
    pub fn run(&self, answers: &[&str]) -> RunOutput {
        self.run_with_terminal(Box::new(ScriptedTerminal::new(answers)))
    }

    pub fn run_with_terminal(&self, terminal: Box<dyn Terminal>) -> RunOutput {
        let user = SharedBuffer::new();
        let log = SharedBuffer::new();
        let reporter = Reporter::new(
            Box::new(user.clone()),
            LogSink::memory(log.clone()),
            terminal,
            self.executor.clone(),
        )
        .with_auto_confirm(self.settings.auto_confirm);
        let code = Bootstrap::new(
            &self.settings,
            &reporter,
            self.executor.clone(),
            self.cleanup.clone(),
        )
        .with_fetcher(self.fetcher.clone())
        .with_detect_paths(self.detect_paths())
        .with_poll(Duration::ZERO, 3)
        .with_keep_alive(None)
        .execute();
        RunOutput {
            code,
            user: user.contents(),
            log: log.contents(),
        }
    }
}
