//! Distribution to package-manager dispatch.
//!
//! Support is a closed set: every distribution the tool understands has an
//! entry in [`Distro`], and everything else is a single lookup miss.
use std::fmt;

use crate::error::PackageError;
use crate::exec::CommandSpec;
use crate::platform::PlatformInfo;

/// Supported package managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PackageManager {
    /// Debian family (`apt-get`).
    Apt,
    /// Fedora (`dnf`).
    Dnf,
    /// Arch family (`pacman`).
    Pacman,
    /// macOS (`brew`).
    Brew,
    /// Secondary manager used on apt distributions (`snap`).
    Snap,
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(spec_for(*self).program)
    }
}

/// Supported distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distro {
    /// Ubuntu.
    Ubuntu,
    /// Debian.
    Debian,
    /// Linux Mint.
    LinuxMint,
    /// Pop!_OS.
    Pop,
    /// Fedora.
    Fedora,
    /// Arch Linux.
    Arch,
    /// Manjaro.
    Manjaro,
    /// `EndeavourOS`.
    EndeavourOs,
    /// macOS.
    Macos,
}

impl Distro {
    /// Every supported distribution.
    pub const ALL: &'static [Self] = &[
        Self::Ubuntu,
        Self::Debian,
        Self::LinuxMint,
        Self::Pop,
        Self::Fedora,
        Self::Arch,
        Self::Manjaro,
        Self::EndeavourOs,
        Self::Macos,
    ];

    /// The os-release style id of this distribution.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Ubuntu => "ubuntu",
            Self::Debian => "debian",
            Self::LinuxMint => "linuxmint",
            Self::Pop => "pop",
            Self::Fedora => "fedora",
            Self::Arch => "arch",
            Self::Manjaro => "manjaro",
            Self::EndeavourOs => "endeavouros",
            Self::Macos => "macos",
        }
    }

    /// Look up a distribution by id.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.id() == id)
    }
}

impl fmt::Display for Distro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Idempotent preparation that must happen before a manager can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreStep {
    /// Xcode Command Line Tools (macOS).
    CommandLineTools,
    /// Homebrew itself (macOS).
    Homebrew,
    /// The `snap` command (apt distributions routing packages through snap).
    Snapd,
}

impl fmt::Display for PreStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandLineTools => write!(f, "Xcode Command Line Tools"),
            Self::Homebrew => write!(f, "Homebrew"),
            Self::Snapd => write!(f, "snapd"),
        }
    }
}

/// How to drive one package manager.
#[derive(Debug, PartialEq, Eq)]
pub struct ManagerSpec {
    /// Which manager this describes.
    pub manager: PackageManager,
    /// Executable name.
    pub program: &'static str,
    /// Whether commands must run as root.
    pub needs_root: bool,
    /// Environment applied to every command.
    pub env: &'static [(&'static str, &'static str)],
    /// Refresh the package index.
    pub update: &'static [&'static [&'static str]],
    /// Upgrade installed packages.
    pub upgrade: &'static [&'static [&'static str]],
    /// Install arguments; the package name is appended.
    pub install: &'static [&'static str],
    /// Remove caches and orphans.
    pub clean: &'static [&'static [&'static str]],
}

const APT: ManagerSpec = ManagerSpec {
    manager: PackageManager::Apt,
    program: "apt-get",
    needs_root: true,
    env: &[("DEBIAN_FRONTEND", "noninteractive")],
    update: &[&["update"]],
    upgrade: &[&["upgrade", "-y"]],
    install: &["install", "-y"],
    clean: &[&["autoremove", "-y"], &["clean"]],
};

const DNF: ManagerSpec = ManagerSpec {
    manager: PackageManager::Dnf,
    program: "dnf",
    needs_root: true,
    env: &[],
    update: &[&["makecache", "--refresh"]],
    upgrade: &[&["upgrade", "-y"]],
    install: &["install", "-y"],
    clean: &[&["autoremove", "-y"], &["clean", "all"]],
};

const PACMAN: ManagerSpec = ManagerSpec {
    manager: PackageManager::Pacman,
    program: "pacman",
    needs_root: true,
    env: &[],
    update: &[],
    upgrade: &[&["-Syu", "--noconfirm"]],
    install: &["-S", "--needed", "--noconfirm"],
    clean: &[&["-Sc", "--noconfirm"]],
};

const BREW: ManagerSpec = ManagerSpec {
    manager: PackageManager::Brew,
    program: "brew",
    needs_root: false,
    env: &[("NONINTERACTIVE", "1")],
    update: &[&["update"]],
    upgrade: &[&["upgrade"]],
    install: &["install"],
    clean: &[&["cleanup"]],
};

const SNAP: ManagerSpec = ManagerSpec {
    manager: PackageManager::Snap,
    program: "snap",
    needs_root: true,
    env: &[],
    update: &[],
    upgrade: &[&["refresh"]],
    install: &["install"],
    clean: &[],
};

/// The static description of `manager`.
#[must_use]
pub const fn spec_for(manager: PackageManager) -> &'static ManagerSpec {
    match manager {
        PackageManager::Apt => &APT,
        PackageManager::Dnf => &DNF,
        PackageManager::Pacman => &PACMAN,
        PackageManager::Brew => &BREW,
        PackageManager::Snap => &SNAP,
    }
}

/// A package fetched through a manager other than the primary one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Package name.
    pub package: &'static str,
    /// Manager that installs it.
    pub manager: PackageManager,
    /// Extra install arguments, appended after the package name.
    pub extra_args: &'static [&'static str],
    /// Preparation the secondary manager needs.
    pub pre_step: PreStep,
}

const APT_ROUTES: &[Route] = &[Route {
    package: "chezmoi",
    manager: PackageManager::Snap,
    extra_args: &["--classic"],
    pre_step: PreStep::Snapd,
}];

/// One row of the dispatch table.
#[derive(Debug, Clone, Copy)]
struct Dispatch {
    spec: &'static ManagerSpec,
    pre_steps: &'static [PreStep],
    routes: &'static [Route],
}

const fn dispatch(distro: Distro) -> Dispatch {
    match distro {
        Distro::Ubuntu | Distro::Debian | Distro::LinuxMint | Distro::Pop => Dispatch {
            spec: &APT,
            pre_steps: &[],
            routes: APT_ROUTES,
        },
        Distro::Fedora => Dispatch {
            spec: &DNF,
            pre_steps: &[],
            routes: &[],
        },
        Distro::Arch | Distro::Manjaro | Distro::EndeavourOs => Dispatch {
            spec: &PACMAN,
            pre_steps: &[],
            routes: &[],
        },
        Distro::Macos => Dispatch {
            spec: &BREW,
            pre_steps: &[PreStep::CommandLineTools, PreStep::Homebrew],
            routes: &[],
        },
    }
}

/// A command produced by the adapter, not yet elevated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerCommand {
    /// Human-readable description of the step.
    pub description: String,
    /// The invocation.
    pub command: CommandSpec,
    /// Whether the command must run as root.
    pub needs_root: bool,
}

/// Package-manager adapter for one supported distribution.
#[derive(Debug, Clone, Copy)]
pub struct Adapter {
    distro: Distro,
    dispatch: Dispatch,
}

impl Adapter {
    /// Resolve the adapter for a detected platform.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::UnsupportedDistro`] when the distro id has no
    /// dispatch entry.
    pub fn for_platform(platform: &PlatformInfo) -> Result<Self, PackageError> {
        Self::for_distro_id(&platform.distro_id)
    }

    /// Resolve the adapter for a raw distro id.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::UnsupportedDistro`] when the id is unknown.
    pub fn for_distro_id(distro_id: &str) -> Result<Self, PackageError> {
        let distro = Distro::from_id(distro_id).ok_or_else(|| PackageError::UnsupportedDistro {
            distro_id: distro_id.to_string(),
        })?;
        Ok(Self::for_distro(distro))
    }

    /// The adapter for a known distribution.
    #[must_use]
    pub const fn for_distro(distro: Distro) -> Self {
        Self {
            distro,
            dispatch: dispatch(distro),
        }
    }

    /// The distribution this adapter drives.
    #[must_use]
    pub const fn distro(&self) -> Distro {
        self.distro
    }

    /// The primary package manager.
    #[must_use]
    pub const fn manager(&self) -> PackageManager {
        self.dispatch.spec.manager
    }

    /// Preparation needed before the primary manager is usable.
    #[must_use]
    pub const fn platform_pre_steps(&self) -> &'static [PreStep] {
        self.dispatch.pre_steps
    }

    /// Secondary route for `package`, if any.
    #[must_use]
    pub fn route_for(&self, package: &str) -> Option<&'static Route> {
        self.dispatch.routes.iter().find(|r| r.package == package)
    }

    /// Commands that refresh the package index.
    #[must_use]
    pub fn update_commands(&self) -> Vec<ManagerCommand> {
        self.phase(self.dispatch.spec.update, "Refreshing package index")
    }

    /// Commands that upgrade installed packages.
    #[must_use]
    pub fn upgrade_commands(&self) -> Vec<ManagerCommand> {
        self.phase(self.dispatch.spec.upgrade, "Upgrading packages")
    }

    /// Commands that remove caches and orphaned packages.
    #[must_use]
    pub fn clean_commands(&self) -> Vec<ManagerCommand> {
        self.phase(self.dispatch.spec.clean, "Cleaning up")
    }

    /// The command installing `package`, through its route if it has one.
    #[must_use]
    pub fn install_command(&self, package: &str) -> ManagerCommand {
        let (spec, extra_args) = self
            .route_for(package)
            .map_or((self.dispatch.spec, &[][..]), |r| {
                (spec_for(r.manager), r.extra_args)
            });
        let mut cmd = build(spec, spec.install, &format!("Installing {package}"));
        cmd.command = cmd.command.arg(package).args(extra_args.iter().copied());
        cmd
    }

    fn phase(&self, phase: &[&[&str]], description: &str) -> Vec<ManagerCommand> {
        let spec = self.dispatch.spec;
        phase
            .iter()
            .map(|args| build(spec, args, description))
            .collect()
    }
}

fn build(spec: &ManagerSpec, args: &[&str], description: &str) -> ManagerCommand {
    let mut command = CommandSpec::new(spec.program).args(args.iter().copied());
    for (k, v) in spec.env {
        command = command.env(*k, *v);
    }
    ManagerCommand {
        description: description.to_string(),
        command,
        needs_root: spec.needs_root,
    }
}
