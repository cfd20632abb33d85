//! Dual-channel reporter: terse status lines for the user, full detail for
//! the audit log.
use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use super::sink::LogSink;
use super::terminal::Terminal;
use super::types::{StageEntry, StageStatus};
use crate::exec::{CommandSpec, EXIT_NOT_FOUND, ExecResult, Executor, RunResult};

const RESET: &str = "\x1b[0m";

/// Kind of user-facing line, which fixes its icon, color and log tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Action,
    Success,
    Error,
    Warn,
    Info,
    Prompt,
    DryRun,
}

impl Kind {
    const fn icon(self) -> &'static str {
        match self {
            Self::Action => "➜",
            Self::Success => "✓",
            Self::Error => "✗",
            Self::Warn => "!",
            Self::Info => "•",
            Self::Prompt => "?",
            Self::DryRun => "~",
        }
    }

    const fn color(self) -> &'static str {
        match self {
            Self::Action => "\x1b[36m",
            Self::Success => "\x1b[32m",
            Self::Error => "\x1b[31m",
            Self::Warn | Self::DryRun => "\x1b[33m",
            Self::Info => "\x1b[37m",
            Self::Prompt => "\x1b[35m",
        }
    }

    const fn tag(self) -> &'static str {
        match self {
            Self::Action => "ACTION",
            Self::Success => "OK",
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Prompt => "PROMPT",
            Self::DryRun => "DRY RUN",
        }
    }
}

/// `true` when the answer starts with `y` or `Y`; an empty answer is no.
#[must_use]
pub fn accepts_default_no(answer: &str) -> bool {
    matches!(answer.trim_start().chars().next(), Some('y' | 'Y'))
}

/// `false` only when the answer starts with `n` or `N`; an empty answer is yes.
#[must_use]
pub fn accepts_default_yes(answer: &str) -> bool {
    !matches!(answer.trim_start().chars().next(), Some('n' | 'N'))
}

/// Writes terse colored lines to the user channel and a verbose,
/// timestamped record of the same events to the [`LogSink`].
///
/// All external commands that should appear in the audit trail go through
/// [`Reporter::exec`] or [`Reporter::exec_interactive`].
pub struct Reporter {
    user: Mutex<Box<dyn Write + Send>>,
    log: LogSink,
    terminal: Box<dyn Terminal>,
    executor: Arc<dyn Executor>,
    auto_confirm: bool,
    color: bool,
    stages: Mutex<Vec<StageEntry>>,
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("log", &self.log)
            .field("executor", &self.executor)
            .field("auto_confirm", &self.auto_confirm)
            .field("color", &self.color)
            .finish_non_exhaustive()
    }
}

impl Reporter {
    /// Create a reporter writing status lines to `user` and details to `log`.
    ///
    /// Colors are off until enabled with [`Reporter::with_color`].
    #[must_use]
    pub fn new(
        user: Box<dyn Write + Send>,
        log: LogSink,
        terminal: Box<dyn Terminal>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            user: Mutex::new(user),
            log,
            terminal,
            executor,
            auto_confirm: false,
            color: false,
            stages: Mutex::new(Vec::new()),
        }
    }

    /// Answer every prompt automatically (`--yes`).
    #[must_use]
    pub const fn with_auto_confirm(mut self, auto_confirm: bool) -> Self {
        self.auto_confirm = auto_confirm;
        self
    }

    /// Enable or disable ANSI colors on the user channel.
    #[must_use]
    pub const fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// The audit log this reporter writes to.
    #[must_use]
    pub const fn log(&self) -> &LogSink {
        &self.log
    }

    /// The executor used by [`Reporter::exec`].
    #[must_use]
    pub fn executor(&self) -> &dyn Executor {
        self.executor.as_ref()
    }

    /// A step is starting.
    pub fn action(&self, msg: &str) {
        self.emit(Kind::Action, msg);
    }

    /// A step finished successfully.
    pub fn success(&self, msg: &str) {
        self.emit(Kind::Success, msg);
    }

    /// A step failed.
    pub fn error(&self, msg: &str) {
        self.emit(Kind::Error, msg);
    }

    /// Something noteworthy that does not stop the run.
    pub fn warn(&self, msg: &str) {
        self.emit(Kind::Warn, msg);
    }

    /// Plain information.
    pub fn info(&self, msg: &str) {
        self.emit(Kind::Info, msg);
    }

    /// Something that would have happened outside dry-run mode.
    pub fn dry_run(&self, msg: &str) {
        self.emit(Kind::DryRun, &format!("[dry run] {msg}"));
    }

    /// Detail that only belongs in the log.
    pub fn debug(&self, msg: &str) {
        self.log.event("DEBUG", msg);
    }

    /// Start a major section: a bold header for the user, a separator in the log.
    pub fn stage(&self, title: &str) {
        let line = if self.color {
            format!("\n\x1b[1;34m==>{RESET} \x1b[1m{title}{RESET}")
        } else {
            format!("\n==> {title}")
        };
        self.write_user(&line);
        self.log.section(title);
    }

    /// Ask a yes/no question where no (or an empty answer) is the default.
    pub fn ask(&self, prompt: &str) -> bool {
        self.confirm(prompt, false)
    }

    /// Ask a yes/no question where yes (or an empty answer) is the default.
    pub fn ask_default_yes(&self, prompt: &str) -> bool {
        self.confirm(prompt, true)
    }

    /// Ask for free-form input. Returns an empty string under `--yes` or when
    /// the terminal cannot be read.
    pub fn input(&self, prompt: &str) -> String {
        if self.auto_confirm {
            self.emit(Kind::Prompt, &format!("{prompt} (auto: empty)"));
            return String::new();
        }
        self.write_prompt(prompt);
        let answer = self.read_answer();
        self.log.event(Kind::Prompt.tag(), &format!("{prompt} -> {answer:?}"));
        answer
    }

    /// Run `cmd` with captured output.
    ///
    /// The log receives the command line, full stdout and stderr, and the
    /// exit code; the user channel only sees the status line. Never fails:
    /// a command that cannot be spawned is reported with exit code 127.
    pub fn exec(&self, description: &str, cmd: &CommandSpec) -> RunResult {
        self.action(description);
        self.log.event("EXEC", &cmd.to_string());
        let outcome = self.executor.run_unchecked(cmd);
        if let Ok(result) = &outcome {
            self.log.output("STDOUT", &result.stdout);
            self.log.output("STDERR", &result.stderr);
        }
        self.finish(description, cmd, outcome)
    }

    /// Run `cmd` attached to the terminal (password prompts, the handoff).
    ///
    /// Output is not captured; the log records the command and exit code.
    pub fn exec_interactive(&self, description: &str, cmd: &CommandSpec) -> RunResult {
        self.action(description);
        self.log.event("EXEC", &format!("{cmd} (interactive)"));
        self.flush_user();
        let outcome = self.executor.run_interactive(cmd);
        self.finish(description, cmd, outcome)
    }

    /// Record a stage result for the summary.
    pub fn record_stage(&self, name: &str, status: StageStatus, message: Option<&str>) {
        self.log.event(
            "STAGE",
            &format!(
                "{name}: {}{}",
                status.label(),
                message.map_or_else(String::new, |m| format!(" ({m})"))
            ),
        );
        let mut stages = self.stages.lock().unwrap_or_else(PoisonError::into_inner);
        stages.push(StageEntry {
            name: name.to_string(),
            status,
            message: message.map(String::from),
        });
    }

    /// Recorded stage entries, in order.
    #[must_use]
    pub fn stage_entries(&self) -> Vec<StageEntry> {
        self.stages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Print every recorded stage and the log location.
    pub fn print_summary(&self) {
        let stages = self.stage_entries();
        if stages.is_empty() {
            return;
        }
        self.stage("Summary");
        for entry in &stages {
            let suffix = entry
                .message
                .as_ref()
                .map_or_else(String::new, |msg| format!(" ({msg})"));
            let line = if self.color {
                format!(
                    "  {}{}{RESET} {}{suffix}",
                    entry.status.color(),
                    entry.status.icon(),
                    entry.name
                )
            } else {
                format!("  {} {}{suffix}", entry.status.icon(), entry.name)
            };
            self.write_user(&line);
        }
        let failed = stages
            .iter()
            .filter(|s| s.status == StageStatus::Failed)
            .count();
        self.log.event(
            "SUMMARY",
            &format!("{} stages, {failed} failed", stages.len()),
        );
        self.info(&format!("log: {}", self.log.describe()));
        self.log.flush();
    }

    /// Restore default terminal colors.
    pub fn reset_terminal(&self) {
        if self.color {
            let mut user = self.user.lock().unwrap_or_else(PoisonError::into_inner);
            write!(user, "{RESET}").ok();
            user.flush().ok();
        }
    }

    fn finish(
        &self,
        description: &str,
        cmd: &CommandSpec,
        outcome: anyhow::Result<ExecResult>,
    ) -> RunResult {
        let (exit_code, succeeded) = match outcome {
            Ok(result) => (result.code.unwrap_or(-1), result.success),
            Err(e) => {
                self.log.event("ERROR", &format!("{e:#}"));
                (EXIT_NOT_FOUND, false)
            }
        };
        self.log.event("EXIT", &exit_code.to_string());
        if succeeded {
            self.success(description);
        } else {
            self.error(&format!("{description} failed (exit code {exit_code})"));
            self.log.event(
                "FAILED",
                &format!("{description} | command: {cmd} | exit code: {exit_code}"),
            );
        }
        RunResult {
            description: description.to_string(),
            command: cmd.to_string(),
            exit_code,
            succeeded,
        }
    }

    fn confirm(&self, prompt: &str, default_yes: bool) -> bool {
        let hint = if default_yes { "[Y/n]" } else { "[y/N]" };
        let question = format!("{prompt} {hint}");
        if self.auto_confirm {
            self.emit(Kind::Prompt, &format!("{question} yes (auto)"));
            return true;
        }
        self.write_prompt(&question);
        let answer = self.read_answer();
        let accepted = if default_yes {
            accepts_default_yes(&answer)
        } else {
            accepts_default_no(&answer)
        };
        self.log.event(
            Kind::Prompt.tag(),
            &format!(
                "{question} -> {answer:?} ({})",
                if accepted { "yes" } else { "no" }
            ),
        );
        accepted
    }

    fn read_answer(&self) -> String {
        match self.terminal.read_line() {
            Ok(line) => line.trim().to_string(),
            Err(e) => {
                self.write_user("");
                self.log
                    .event("WARN", &format!("cannot read from terminal ({e}); using default"));
                String::new()
            }
        }
    }

    fn write_prompt(&self, question: &str) {
        let line = self.decorate(Kind::Prompt, question);
        let mut user = self.user.lock().unwrap_or_else(PoisonError::into_inner);
        write!(user, "{line} ").ok();
        user.flush().ok();
    }

    fn emit(&self, kind: Kind, msg: &str) {
        self.write_user(&self.decorate(kind, msg));
        self.log.event(kind.tag(), msg);
    }

    fn decorate(&self, kind: Kind, msg: &str) -> String {
        if self.color {
            format!("{}{}{RESET} {msg}", kind.color(), kind.icon())
        } else {
            format!("{} {msg}", kind.icon())
        }
    }

    fn write_user(&self, line: &str) {
        let mut user = self.user.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(user, "{line}").ok();
    }

    fn flush_user(&self) {
        let mut user = self.user.lock().unwrap_or_else(PoisonError::into_inner);
        user.flush().ok();
    }
}
