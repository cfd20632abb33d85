//! Process entry point: settings, logging, interrupt handling, and the
//! bootstrap run.
pub mod bootstrap;

use std::io::{self, IsTerminal as _, Write as _};
use std::sync::Arc;

use clap::CommandFactory as _;
use clap_complete::Shell;

use crate::cleanup::Cleanup;
use crate::cli::Cli;
use crate::config::{self, Environment};
use crate::error::{EXIT_FAILURE, EXIT_INTERRUPTED};
use crate::exec::{Executor, SystemExecutor};
use crate::logging::{self, LogSink, Reporter, TtyTerminal};

pub use bootstrap::{Bootstrap, Outcome, Stage};

/// Run the tool for parsed command-line arguments and return the exit code.
///
/// Resolves settings, opens the log, installs the interrupt handler, and
/// runs the bootstrap sequence inside a cleanup guard.
#[must_use]
pub fn run(cli: &Cli) -> i32 {
    if let Some(shell) = cli.completions {
        return completions(shell);
    }

    let env = Environment::capture();
    let settings = match config::resolve(cli, &env) {
        Ok(settings) => settings,
        Err(e) => return startup_error(&format!("{e:#}")),
    };
    let log = match LogSink::create(&settings.log_file) {
        Ok(log) => log,
        Err(e) => return startup_error(&format!("cannot open log: {e:#}")),
    };
    logging::init_subscriber(settings.verbose, &log);

    let cleanup = Cleanup::new(Some(log.clone()));
    let color = io::stdout().is_terminal();
    install_interrupt_handler(&cleanup, &log, color);

    let executor: Arc<dyn Executor> = Arc::new(SystemExecutor);
    let reporter = Reporter::new(
        Box::new(io::stdout()),
        log,
        Box::new(TtyTerminal),
        Arc::clone(&executor),
    )
    .with_auto_confirm(settings.auto_confirm)
    .with_color(color);

    let _guard = cleanup.guard();
    let code = Bootstrap::new(&settings, &reporter, executor, cleanup.clone()).execute();
    reporter.reset_terminal();
    code
}

/// Write a completion script for `shell` to stdout.
fn completions(shell: Shell) -> i32 {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "dotfiles-bootstrap", &mut io::stdout());
    0
}

fn startup_error(msg: &str) -> i32 {
    writeln!(io::stderr(), "error: {msg}").ok();
    EXIT_FAILURE
}

/// Install the Ctrl-C handler.
///
/// The first interrupt only sets the flag; the run stops at its next check
/// and unwinds through the cleanup guard. A second interrupt cleans up and
/// exits immediately.
fn install_interrupt_handler(cleanup: &Cleanup, log: &LogSink, color: bool) {
    let cleanup = cleanup.clone();
    let log = log.describe();
    let result = ctrlc::set_handler(move || {
        let repeated = cleanup.interrupt();
        if repeated {
            cleanup.run();
        }
        let mut stdout = io::stdout();
        if color {
            write!(stdout, "\x1b[0m").ok();
        }
        writeln!(stdout, "\n{}", interrupt_notice(repeated, &log)).ok();
        stdout.flush().ok();
        if repeated {
            std::process::exit(EXIT_INTERRUPTED);
        }
    });
    if let Err(e) = result {
        tracing::warn!("cannot install interrupt handler: {e}");
    }
}

fn interrupt_notice(repeated: bool, log: &str) -> String {
    if repeated {
        format!("Interrupted. Details in {log}")
    } else {
        "Interrupted; stopping after the current step (Ctrl-C again to exit now)".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn first_interrupt_asks_for_patience() {
        let notice = interrupt_notice(false, "/tmp/bootstrap.log");
        assert!(notice.contains("stopping after the current step"));
    }

    #[test]
    fn forced_exit_points_at_the_log() {
        assert_eq!(
            interrupt_notice(true, "/tmp/bootstrap.log"),
            "Interrupted. Details in /tmp/bootstrap.log"
        );
    }
}
