//! Scoped cleanup of resources created during a run.
//!
//! Cleanup runs exactly once, when the [`CleanupGuard`] held by the entry
//! point is dropped (normal exit, early return, or an interrupted run
//! unwinding) or from the Ctrl-C handler on a second interrupt. Only files
//! this run created are ever removed.
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context as _, Result};

use crate::logging::LogSink;

#[derive(Debug, Default)]
struct State {
    scratch: Mutex<Vec<PathBuf>>,
    log: Option<LogSink>,
    done: AtomicBool,
    interrupted: AtomicBool,
}

/// Registry of resources to release when the run ends.
///
/// Cheap to clone; every clone refers to the same registry, so the Ctrl-C
/// handler and the main thread agree on what has been cleaned.
#[derive(Debug, Clone, Default)]
pub struct Cleanup {
    state: Arc<State>,
}

impl Cleanup {
    /// Create a registry that flushes `log` when it runs.
    #[must_use]
    pub fn new(log: Option<LogSink>) -> Self {
        Self {
            state: Arc::new(State {
                log,
                ..State::default()
            }),
        }
    }

    /// Create an empty scratch file owned by this run.
    ///
    /// The file is created exclusively, so a pre-existing file at the same
    /// path is never adopted (and therefore never deleted).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn scratch_file(&self, name: &str) -> Result<ScratchFile> {
        let path = std::env::temp_dir().join(format!(
            "dotfiles-bootstrap-{}-{name}",
            std::process::id()
        ));
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("creating scratch file {}", path.display()))?;
        self.register(path.clone());
        Ok(ScratchFile {
            path,
            cleanup: self.clone(),
        })
    }

    /// Remember a file created by this run so it is removed on cleanup.
    pub fn register(&self, path: PathBuf) {
        tracing::debug!("registered scratch file {}", path.display());
        self.scratch().push(path);
    }

    /// Paths currently awaiting removal.
    #[must_use]
    pub fn pending(&self) -> Vec<PathBuf> {
        self.scratch().clone()
    }

    /// Whether the run has been interrupted.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.state.interrupted.load(Ordering::SeqCst)
    }

    /// Record an interrupt. The run stops at its next interrupt check and
    /// unwinds through the guard.
    ///
    /// Returns `true` if an interrupt was already pending; the caller should
    /// then [`run`](Self::run) cleanup and exit without waiting.
    #[must_use = "a repeated interrupt means the caller should exit now"]
    pub fn interrupt(&self) -> bool {
        let repeated = self.state.interrupted.swap(true, Ordering::SeqCst);
        if let Some(log) = &self.state.log {
            let msg = if repeated {
                "second interrupt, exiting now"
            } else {
                "received interrupt signal, stopping after the current step"
            };
            log.event("INTERRUPTED", msg);
            log.flush();
        }
        repeated
    }

    /// Remove registered scratch files and flush the log.
    ///
    /// Idempotent: only the first call does any work. Never fails; removal
    /// errors are logged and swallowed.
    pub fn run(&self) {
        if self.state.done.swap(true, Ordering::SeqCst) {
            return;
        }
        let paths: Vec<PathBuf> = self.scratch().drain(..).collect();
        for path in paths {
            self.remove(&path);
        }
        if let Some(log) = &self.state.log {
            log.event("CLEANUP", "done");
            log.flush();
        }
    }

    /// A guard that runs cleanup when dropped.
    #[must_use]
    pub fn guard(&self) -> CleanupGuard {
        CleanupGuard {
            cleanup: self.clone(),
        }
    }

    fn forget(&self, path: &Path) {
        self.scratch().retain(|p| p != path);
    }

    fn remove(&self, path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => tracing::debug!("removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                if let Some(log) = &self.state.log {
                    log.event("WARN", &format!("failed to remove {}: {e}", path.display()));
                }
            }
        }
    }

    fn scratch(&self) -> std::sync::MutexGuard<'_, Vec<PathBuf>> {
        self.state
            .scratch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs [`Cleanup::run`] when dropped.
#[derive(Debug)]
pub struct CleanupGuard {
    cleanup: Cleanup,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.cleanup.run();
    }
}

/// A temporary file created by this run, removed when dropped.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    cleanup: Cleanup,
}

impl ScratchFile {
    /// Location of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        self.cleanup.remove(&self.path);
        self.cleanup.forget(&self.path);
    }
}
