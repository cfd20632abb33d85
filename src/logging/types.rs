//! Core logging types: stage entries and their status.

/// Stage result for summary reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageEntry {
    /// Human-readable stage name.
    pub name: String,
    /// Final status of the stage.
    pub status: StageStatus,
    /// Optional detail message (e.g., skip reason or error description).
    pub message: Option<String>,
}

/// Status of a completed orchestrator stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// Stage completed successfully.
    Ok,
    /// Stage was skipped because the user declined it.
    Skipped,
    /// Stage ran in dry-run mode; no changes were applied.
    DryRun,
    /// Stage encountered an error and the run stopped.
    Failed,
}

impl StageStatus {
    /// Summary icon for the status.
    #[must_use]
    pub const fn icon(self) -> &'static str {
        match self {
            Self::Ok => "✓",
            Self::Skipped => "○",
            Self::DryRun => "~",
            Self::Failed => "✗",
        }
    }

    /// ANSI color code used for the icon.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Ok => "\x1b[32m",
            Self::Skipped => "\x1b[2m",
            Self::DryRun => "\x1b[33m",
            Self::Failed => "\x1b[31m",
        }
    }

    /// Lower-case label written to the log.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Skipped => "skipped",
            Self::DryRun => "dry run",
            Self::Failed => "failed",
        }
    }
}
