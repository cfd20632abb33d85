//! External command execution behind an injectable [`Executor`].
use anyhow::{Context as _, Result, bail};
use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

/// Exit code reported when a program could not be spawned at all.
pub const EXIT_NOT_FOUND: i32 = 127;

/// A program invocation: program name, arguments, and extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to run (looked up on `PATH`).
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Extra environment variables set for the child.
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    /// Start building an invocation of `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Append a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child process.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Prefix this invocation with `sudo`, carrying the environment through
    /// as `KEY=value` arguments since sudo resets the child environment.
    #[must_use]
    pub fn with_sudo(self) -> Self {
        let mut args: Vec<String> = self.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
        args.push(self.program);
        args.extend(self.args);
        Self {
            program: "sudo".to_string(),
            args,
            env: Vec::new(),
        }
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in &self.env {
            write!(f, "{k}={} ", quote(v))?;
        }
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

/// Quote a word for display when it contains whitespace or shell metacharacters.
fn quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@+,%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    /// Captured standard output (empty for interactive runs).
    pub stdout: String,
    /// Captured standard error (empty for interactive runs).
    pub stderr: String,
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
}

impl From<Output> for ExecResult {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

/// Outcome of one external command run through the reporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// Human-readable description of the step.
    pub description: String,
    /// The literal command line that was run.
    pub command: String,
    /// Exit code (`-1` when killed by a signal, [`EXIT_NOT_FOUND`] when it never started).
    pub exit_code: i32,
    /// Whether the command succeeded.
    pub succeeded: bool,
}

/// Abstraction over running external programs.
///
/// The system implementation shells out; tests substitute recording or
/// scripted executors so no real package manager is ever touched.
pub trait Executor: Send + Sync + fmt::Debug {
    /// Run a command with captured output, returning the result regardless of
    /// exit status.
    ///
    /// # Errors
    ///
    /// Returns an error only if the process could not be spawned.
    fn run_unchecked(&self, cmd: &CommandSpec) -> Result<ExecResult>;

    /// Run a command attached to the terminal (stdio inherited).
    ///
    /// # Errors
    ///
    /// Returns an error only if the process could not be spawned.
    fn run_interactive(&self, cmd: &CommandSpec) -> Result<ExecResult>;

    /// Check if a program is available on `PATH`.
    fn which(&self, program: &str) -> bool;

    /// Run a command and fail on non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exits non-zero.
    fn run(&self, cmd: &CommandSpec) -> Result<ExecResult> {
        let result = self.run_unchecked(cmd)?;
        if !result.success {
            bail!(
                "{cmd} failed (exit {}): {}",
                result.code.unwrap_or(-1),
                result.stderr.trim()
            );
        }
        Ok(result)
    }
}

/// Executor that runs real processes on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn run_unchecked(&self, cmd: &CommandSpec) -> Result<ExecResult> {
        tracing::debug!("spawning: {cmd}");
        let output = cmd
            .to_command()
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to execute: {}", cmd.program))?;
        Ok(ExecResult::from(output))
    }

    fn run_interactive(&self, cmd: &CommandSpec) -> Result<ExecResult> {
        tracing::debug!("spawning (interactive): {cmd}");
        let status = cmd
            .to_command()
            .status()
            .with_context(|| format!("failed to execute: {}", cmd.program))?;
        Ok(ExecResult {
            stdout: String::new(),
            stderr: String::new(),
            success: status.success(),
            code: status.code(),
        })
    }

    fn which(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Find `program` on `PATH` or, failing that, in one of `extra_dirs`.
///
/// Package managers such as snap install into directories that a freshly
/// started shell has not yet added to `PATH`.
#[must_use]
pub fn locate(executor: &dyn Executor, program: &str, extra_dirs: &[PathBuf]) -> Option<String> {
    if executor.which(program) {
        return Some(program.to_string());
    }
    extra_dirs
        .iter()
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
        .map(|candidate| candidate.to_string_lossy().into_owned())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_program_and_args() {
        let cmd = CommandSpec::new("apt-get").args(["install", "-y", "git"]);
        assert_eq!(cmd.to_string(), "apt-get install -y git");
    }

    #[test]
    fn display_quotes_words_with_spaces() {
        let cmd = CommandSpec::new("sh").args(["-c", "echo hi; exit 3"]);
        assert_eq!(cmd.to_string(), "sh -c 'echo hi; exit 3'");
    }

    #[test]
    fn display_includes_env_prefix() {
        let cmd = CommandSpec::new("brew")
            .arg("update")
            .env("NONINTERACTIVE", "1");
        assert_eq!(cmd.to_string(), "NONINTERACTIVE=1 brew update");
    }

    #[test]
    fn with_sudo_moves_env_into_arguments() {
        let cmd = CommandSpec::new("apt-get")
            .args(["install", "-y", "git"])
            .env("DEBIAN_FRONTEND", "noninteractive")
            .with_sudo();
        assert_eq!(cmd.program, "sudo");
        assert_eq!(
            cmd.args,
            vec![
                "DEBIAN_FRONTEND=noninteractive",
                "apt-get",
                "install",
                "-y",
                "git"
            ]
        );
        assert!(cmd.env.is_empty());
    }

    #[test]
    fn quote_escapes_single_quotes() {
        assert_eq!(quote("it's"), r"'it'\''s'");
        assert_eq!(quote(""), "''");
        assert_eq!(quote("plain-word"), "plain-word");
    }

    #[cfg(unix)]
    #[test]
    fn run_unchecked_captures_exit_code() {
        let cmd = CommandSpec::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]);
        let result = SystemExecutor.run_unchecked(&cmd).unwrap();
        assert!(!result.success);
        assert_eq!(result.code, Some(3));
        assert_eq!(result.stdout.trim(), "out");
        assert_eq!(result.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[test]
    fn run_fails_on_non_zero_exit() {
        let cmd = CommandSpec::new("false");
        assert!(SystemExecutor.run(&cmd).is_err());
    }

    #[test]
    fn run_unchecked_errors_when_program_missing() {
        let cmd = CommandSpec::new("this-program-does-not-exist-12345");
        assert!(SystemExecutor.run_unchecked(&cmd).is_err());
    }

    #[test]
    fn which_missing_program() {
        assert!(
            !SystemExecutor.which("this-program-does-not-exist-12345"),
            "non-existent program should not be found"
        );
    }

    #[test]
    fn locate_falls_back_to_extra_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fake-tool-xyz"), "").unwrap();
        let found = locate(
            &SystemExecutor,
            "fake-tool-xyz",
            &[dir.path().to_path_buf()],
        );
        assert_eq!(
            found,
            Some(dir.path().join("fake-tool-xyz").to_string_lossy().into_owned())
        );
    }

    #[test]
    fn locate_returns_none_when_absent() {
        assert_eq!(locate(&SystemExecutor, "no-such-tool-xyz", &[]), None);
    }
}
