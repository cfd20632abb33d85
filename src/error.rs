//! Domain-specific error types for the bootstrap engine.
//!
//! Internal modules return typed errors (e.g., [`PlatformError`],
//! [`PackageError`]) which roll up into [`BootstrapError`]. The binary maps
//! the top-level error to a process exit code with
//! [`BootstrapError::exit_code`].
//!
//! # Error hierarchy
//!
//! ```text
//! BootstrapError
//! ├── Platform(PlatformError): unsupported kernel
//! ├── Package(PackageError)  : unsupported distribution
//! ├── CommandFailed          : fatal external command failure
//! ├── DependencyVerification : tool not invocable after install
//! ├── Interrupted            : Ctrl-C
//! └── Other(anyhow::Error)   : config, I/O, download
//! ```

use thiserror::Error;

/// Exit code reserved for an unsupported platform or distribution.
pub const EXIT_UNSUPPORTED_PLATFORM: i32 = 69;

/// Exit code used after an interrupt (128 + SIGINT).
pub const EXIT_INTERRUPTED: i32 = 130;

/// Exit code for failures that carry no external exit code of their own.
pub const EXIT_FAILURE: i32 = 1;

/// Top-level error type for a bootstrap run.
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// Platform detection failed.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// The detected distribution has no package-manager mapping.
    #[error(transparent)]
    Package(#[from] PackageError),

    /// An external command failed and the step cannot continue.
    #[error("{description} failed (exit {exit_code}): {command}")]
    CommandFailed {
        /// Description of the failed step.
        description: String,
        /// Literal command line that failed.
        command: String,
        /// Exit code of the failed command, propagated as the run's exit code.
        exit_code: i32,
    },

    /// The configuration tool is still not invocable after installation.
    #[error("'{tool}' is not invocable after installation")]
    DependencyVerification {
        /// Name of the tool that could not be run.
        tool: String,
    },

    /// The run was interrupted by the user.
    #[error("interrupted")]
    Interrupted,

    /// Any other failure (configuration, I/O, download).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BootstrapError {
    /// Process exit code for this error.
    ///
    /// External command failures propagate the command's own exit code; a
    /// zero or negative code (signal) is mapped to [`EXIT_FAILURE`] so a
    /// failed run never exits successfully.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Platform(_) | Self::Package(_) => EXIT_UNSUPPORTED_PLATFORM,
            Self::CommandFailed { exit_code, .. } if *exit_code > 0 => *exit_code,
            Self::Interrupted => EXIT_INTERRUPTED,
            Self::CommandFailed { .. } | Self::DependencyVerification { .. } | Self::Other(_) => {
                EXIT_FAILURE
            }
        }
    }
}

/// Errors that arise from platform detection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The kernel is neither Darwin nor Linux.
    #[error("unsupported platform: kernel '{kernel}'")]
    UnsupportedPlatform {
        /// Kernel name as reported by `uname -s`.
        kernel: String,
    },
}

/// Errors that arise from package-manager dispatch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PackageError {
    /// The distribution id has no entry in the dispatch table.
    #[error("unsupported distribution '{distro_id}'")]
    UnsupportedDistro {
        /// Raw distribution id reported by the platform detector.
        distro_id: String,
    },
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Display
    // -----------------------------------------------------------------------

    #[test]
    fn unsupported_platform_display() {
        let e = PlatformError::UnsupportedPlatform {
            kernel: "Plan9".to_string(),
        };
        assert_eq!(e.to_string(), "unsupported platform: kernel 'Plan9'");
    }

    #[test]
    fn unsupported_distro_display() {
        let e = PackageError::UnsupportedDistro {
            distro_id: "gentoo".to_string(),
        };
        assert_eq!(e.to_string(), "unsupported distribution 'gentoo'");
    }

    #[test]
    fn command_failed_display() {
        let e = BootstrapError::CommandFailed {
            description: "Install git".to_string(),
            command: "sudo apt-get install -y git".to_string(),
            exit_code: 100,
        };
        assert_eq!(
            e.to_string(),
            "Install git failed (exit 100): sudo apt-get install -y git"
        );
    }

    #[test]
    fn platform_error_is_transparent() {
        let e: BootstrapError = PlatformError::UnsupportedPlatform {
            kernel: "Plan9".to_string(),
        }
        .into();
        assert_eq!(e.to_string(), "unsupported platform: kernel 'Plan9'");
    }

    // -----------------------------------------------------------------------
    // Exit codes
    // -----------------------------------------------------------------------

    #[test]
    fn unsupported_platform_uses_reserved_code() {
        let e: BootstrapError = PlatformError::UnsupportedPlatform {
            kernel: "Plan9".to_string(),
        }
        .into();
        assert_eq!(e.exit_code(), EXIT_UNSUPPORTED_PLATFORM);
    }

    #[test]
    fn unsupported_distro_uses_reserved_code() {
        let e: BootstrapError = PackageError::UnsupportedDistro {
            distro_id: "gentoo".to_string(),
        }
        .into();
        assert_eq!(e.exit_code(), EXIT_UNSUPPORTED_PLATFORM);
    }

    #[test]
    fn command_failure_propagates_exit_code() {
        let e = BootstrapError::CommandFailed {
            description: "Install git".to_string(),
            command: "apt-get install -y git".to_string(),
            exit_code: 100,
        };
        assert_eq!(e.exit_code(), 100);
    }

    #[test]
    fn signalled_command_maps_to_generic_failure() {
        let e = BootstrapError::CommandFailed {
            description: "Update".to_string(),
            command: "pacman -Syu".to_string(),
            exit_code: -1,
        };
        assert_eq!(e.exit_code(), EXIT_FAILURE);
    }

    #[test]
    fn interrupted_uses_sigint_code() {
        assert_eq!(BootstrapError::Interrupted.exit_code(), EXIT_INTERRUPTED);
    }

    #[test]
    fn verification_failure_is_generic() {
        let e = BootstrapError::DependencyVerification {
            tool: "chezmoi".to_string(),
        };
        assert_eq!(e.exit_code(), EXIT_FAILURE);
        assert_eq!(e.to_string(), "'chezmoi' is not invocable after installation");
    }

    // -----------------------------------------------------------------------
    // Send + Sync bounds
    // -----------------------------------------------------------------------

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn all_error_types_are_send_sync() {
        assert_send_sync::<BootstrapError>();
        assert_send_sync::<PlatformError>();
        assert_send_sync::<PackageError>();
    }

    #[test]
    fn anyhow_converts_into_other() {
        let e: BootstrapError = anyhow::anyhow!("config broken").into();
        assert!(matches!(e, BootstrapError::Other(_)));
        assert_eq!(e.exit_code(), EXIT_FAILURE);
    }
}
