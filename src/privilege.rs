//! Administrator privilege acquisition and the sudo keep-alive.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::exec::{CommandSpec, Executor};
use crate::logging::Reporter;

/// How often the cached sudo credentials are refreshed.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(60);

const KEEP_ALIVE_TICK: Duration = Duration::from_millis(250);

/// Privilege level available for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// Already running as root; nothing to prefix.
    Root,
    /// sudo credentials were validated; root commands get a `sudo` prefix.
    Sudo,
    /// No elevation available; root commands run as-is and fail on their own.
    Unavailable,
}

impl Privilege {
    /// Acquire privileges once for the whole run.
    ///
    /// A missing or failing sudo is a warning, never an error: commands that
    /// need root will surface their own failure later.
    pub fn acquire(reporter: &Reporter, dry_run: bool) -> Self {
        let executor = reporter.executor();
        if is_root(executor) {
            reporter.info("Running as root");
            return Self::Root;
        }
        if !executor.which("sudo") {
            reporter.warn("sudo not found; continuing without administrator privileges");
            return Self::Unavailable;
        }
        if dry_run {
            reporter.dry_run("would request administrator privileges (sudo -v)");
            return Self::Sudo;
        }
        let result = reporter.exec_interactive(
            "Requesting administrator privileges",
            &CommandSpec::new("sudo").arg("-v"),
        );
        if result.succeeded {
            Self::Sudo
        } else {
            reporter.warn("Could not obtain administrator privileges; continuing");
            Self::Unavailable
        }
    }

    /// Wrap `cmd` for this privilege level when it needs root.
    #[must_use]
    pub fn elevate(self, cmd: CommandSpec, needs_root: bool) -> CommandSpec {
        match (self, needs_root) {
            (Self::Sudo, true) => cmd.with_sudo(),
            _ => cmd,
        }
    }
}

fn is_root(executor: &dyn Executor) -> bool {
    executor
        .run_unchecked(&CommandSpec::new("id").arg("-u"))
        .is_ok_and(|r| r.success && r.stdout.trim() == "0")
}

/// Background thread that refreshes sudo credentials until dropped.
#[derive(Debug)]
pub struct KeepAlive {
    stop: Arc<AtomicBool>,
}

impl KeepAlive {
    /// Start refreshing with `sudo -n true` every `interval`.
    #[must_use]
    pub fn spawn(executor: Arc<dyn Executor>, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let refresh = CommandSpec::new("sudo").args(["-n", "true"]);
        thread::spawn(move || {
            let mut waited = Duration::ZERO;
            while !flag.load(Ordering::Relaxed) {
                thread::sleep(KEEP_ALIVE_TICK);
                waited += KEEP_ALIVE_TICK;
                if waited >= interval {
                    waited = Duration::ZERO;
                    if executor.run_unchecked(&refresh).is_err() {
                        tracing::debug!("sudo keep-alive failed");
                    }
                }
            }
            tracing::debug!("sudo keep-alive stopped");
        });
        Self { stop }
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::exec::ExecResult;
    use crate::logging::{LogSink, SharedBuffer, TtyTerminal};
    use std::sync::Mutex;

    /// Executor with a fixed uid, sudo availability and `sudo -v` outcome.
    #[derive(Debug)]
    struct SudoExecutor {
        uid: &'static str,
        has_sudo: bool,
        sudo_ok: bool,
        calls: Mutex<Vec<String>>,
    }

    impl SudoExecutor {
        fn new(uid: &'static str, has_sudo: bool, sudo_ok: bool) -> Self {
            Self {
                uid,
                has_sudo,
                sudo_ok,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl Executor for SudoExecutor {
        fn run_unchecked(&self, cmd: &CommandSpec) -> anyhow::Result<ExecResult> {
            self.calls.lock().unwrap().push(cmd.to_string());
            let (stdout, success) = if cmd.program == "id" {
                (format!("{}\n", self.uid), true)
            } else {
                (String::new(), self.sudo_ok)
            };
            Ok(ExecResult {
                stdout,
                stderr: String::new(),
                success,
                code: Some(i32::from(!success)),
            })
        }
        fn run_interactive(&self, cmd: &CommandSpec) -> anyhow::Result<ExecResult> {
            self.run_unchecked(cmd)
        }
        fn which(&self, program: &str) -> bool {
            program == "sudo" && self.has_sudo
        }
    }

    fn acquire(executor: SudoExecutor) -> (Privilege, Arc<SudoExecutor>, SharedBuffer) {
        let executor = Arc::new(executor);
        let user = SharedBuffer::new();
        let reporter = Reporter::new(
            Box::new(user.clone()),
            LogSink::memory(SharedBuffer::new()),
            Box::new(TtyTerminal),
            executor.clone(),
        );
        (Privilege::acquire(&reporter, false), executor, user)
    }

    #[test]
    fn root_skips_sudo() {
        let (privilege, executor, _) = acquire(SudoExecutor::new("0", true, true));
        assert_eq!(privilege, Privilege::Root);
        assert_eq!(*executor.calls.lock().unwrap(), vec!["id -u"]);
    }

    #[test]
    fn sudo_validated_once() {
        let (privilege, executor, _) = acquire(SudoExecutor::new("1000", true, true));
        assert_eq!(privilege, Privilege::Sudo);
        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls.iter().filter(|c| *c == "sudo -v").count(), 1);
    }

    #[test]
    fn missing_sudo_warns_and_continues() {
        let (privilege, _, user) = acquire(SudoExecutor::new("1000", false, false));
        assert_eq!(privilege, Privilege::Unavailable);
        assert!(user.contents().contains("sudo not found"));
    }

    #[test]
    fn failed_sudo_warns_and_continues() {
        let (privilege, _, user) = acquire(SudoExecutor::new("1000", true, false));
        assert_eq!(privilege, Privilege::Unavailable);
        assert!(user.contents().contains("continuing"));
    }

    #[test]
    fn elevate_only_prefixes_root_commands_under_sudo() {
        let cmd = CommandSpec::new("apt-get").arg("update");
        assert_eq!(
            Privilege::Sudo.elevate(cmd.clone(), true).to_string(),
            "sudo apt-get update"
        );
        assert_eq!(
            Privilege::Sudo.elevate(cmd.clone(), false).to_string(),
            "apt-get update"
        );
        assert_eq!(
            Privilege::Root.elevate(cmd.clone(), true).to_string(),
            "apt-get update"
        );
        assert_eq!(
            Privilege::Unavailable.elevate(cmd, true).to_string(),
            "apt-get update"
        );
    }

    #[test]
    fn keep_alive_refreshes_until_dropped() {
        let executor = Arc::new(SudoExecutor::new("1000", true, true));
        let keep_alive = KeepAlive::spawn(executor.clone(), Duration::from_millis(250));
        thread::sleep(Duration::from_millis(1200));
        drop(keep_alive);
        thread::sleep(Duration::from_millis(600));
        let after_drop = executor.calls.lock().unwrap().len();
        assert!(after_drop >= 1, "keep-alive should have refreshed at least once");
        thread::sleep(Duration::from_millis(600));
        assert_eq!(executor.calls.lock().unwrap().len(), after_drop);
    }
}
