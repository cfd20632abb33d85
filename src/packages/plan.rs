//! Install-if-missing planning.
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use super::manager::{Adapter, PackageManager, PreStep};
use crate::error::PackageError;
use crate::exec::{Executor, locate};
use crate::platform::PlatformInfo;

/// A required item: the package to install and the executable that proves
/// it is present.
///
/// Written `package` or `package:executable` (e.g. `ripgrep:rg`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Package name passed to the manager.
    pub package: String,
    /// Executable looked up on `PATH` and in the extra tool directories.
    pub executable: String,
}

impl Requirement {
    /// Parse `package` or `package:executable`.
    #[must_use]
    pub fn parse(item: &str) -> Self {
        let item = item.trim();
        match item.split_once(':') {
            Some((package, executable)) if !package.is_empty() && !executable.is_empty() => {
                Self {
                    package: package.to_string(),
                    executable: executable.to_string(),
                }
            }
            _ => Self {
                package: item.trim_matches(':').to_string(),
                executable: item.trim_matches(':').to_string(),
            },
        }
    }
}

/// What has to happen to satisfy a set of required packages.
///
/// Recomputed every run from the live system; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagePlan {
    /// Primary package manager.
    pub manager: PackageManager,
    /// Every requested package.
    pub required: BTreeSet<String>,
    /// Requested packages whose executable is already installed.
    pub already_present: BTreeSet<String>,
    /// `required` minus `already_present`.
    pub to_install: BTreeSet<String>,
    /// Packages in `to_install` fetched through a secondary manager.
    pub routes: BTreeMap<String, PackageManager>,
    /// Preparation to run before installing anything.
    pub pre_steps: Vec<PreStep>,
}

impl PackagePlan {
    /// Whether nothing needs installing.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.to_install.is_empty()
    }

    /// Manager that installs `package`.
    #[must_use]
    pub fn manager_for(&self, package: &str) -> PackageManager {
        self.routes.get(package).copied().unwrap_or(self.manager)
    }
}

/// Plan the installation of `required` on `platform`.
///
/// Performs existence checks only; nothing is mutated.
///
/// # Errors
///
/// Returns [`PackageError::UnsupportedDistro`] when the platform's distro has
/// no package manager.
pub fn plan_for<I, S>(
    platform: &PlatformInfo,
    required: I,
    executor: &dyn Executor,
) -> Result<PackagePlan, PackageError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Ok(Adapter::for_platform(platform)?.plan(required, executor))
}

impl Adapter {
    /// Partition `required` into present and missing packages, looking on
    /// `PATH` only.
    pub fn plan<I, S>(&self, required: I, executor: &dyn Executor) -> PackagePlan
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.plan_in(required, executor, &[])
    }

    /// Partition `required` into present and missing packages.
    ///
    /// An executable counts as present when it is on `PATH` or in one of
    /// `tool_dirs`, the same places the installer and the handoff look.
    pub fn plan_in<I, S>(
        &self,
        required: I,
        executor: &dyn Executor,
        tool_dirs: &[PathBuf],
    ) -> PackagePlan
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut plan = PackagePlan {
            manager: self.manager(),
            required: BTreeSet::new(),
            already_present: BTreeSet::new(),
            to_install: BTreeSet::new(),
            routes: BTreeMap::new(),
            pre_steps: self.platform_pre_steps().to_vec(),
        };

        for item in required {
            let req = Requirement::parse(item.as_ref());
            if req.package.is_empty() {
                continue;
            }
            plan.required.insert(req.package.clone());
            if let Some(found) = locate(executor, &req.executable, tool_dirs) {
                tracing::debug!("{} already present ({found})", req.package);
                plan.already_present.insert(req.package);
                continue;
            }
            tracing::debug!("{} missing", req.package);
            if let Some(route) = self.route_for(&req.package) {
                plan.routes.insert(req.package.clone(), route.manager);
                if !plan.pre_steps.contains(&route.pre_step) {
                    plan.pre_steps.push(route.pre_step);
                }
            }
            plan.to_install.insert(req.package);
        }
        plan
    }
}
