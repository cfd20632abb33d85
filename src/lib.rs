//! Dotfiles bootstrap engine.
//!
//! Brings a fresh macOS or Linux machine to the point where a dotfiles
//! manager (chezmoi by default) can take over: detects the platform,
//! dispatches to the native package manager, installs what is missing, and
//! hands off. Every step is reported twice: a terse line for the user and a
//! full record in the audit log.
//!
//! The public API is organised into these layers:
//!
//! - **[`platform`]**: kernel and distribution detection
//! - **[`packages`]**: package-manager dispatch, planning and installation
//! - **[`logging`]**: the dual-channel [`Reporter`](logging::Reporter) and audit log
//! - **[`commands`]**: the bootstrap sequence and process entry point
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cleanup;
pub mod cli;
pub mod commands;
pub mod config;
pub mod download;
pub mod error;
pub mod exec;
pub mod logging;
pub mod packages;
pub mod platform;
pub mod privilege;
