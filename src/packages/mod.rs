//! Package-manager dispatch, install planning and execution.

pub mod installer;
pub mod manager;
pub mod plan;

pub use installer::{InstallPolicy, Installer};
pub use manager::{Adapter, Distro, ManagerCommand, ManagerSpec, PackageManager, PreStep, spec_for};
pub use plan::{PackagePlan, Requirement, plan_for};
