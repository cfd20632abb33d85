//! Operating system and distribution detection.
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::PlatformError;
use crate::exec::{CommandSpec, Executor};

/// Standard locations of the os-release descriptor, in lookup order.
pub const OS_RELEASE_PATHS: &[&str] = &["/etc/os-release", "/usr/lib/os-release"];

/// Distro id reported on Linux when no os-release descriptor is available.
pub const GENERIC_LINUX_ID: &str = "linux";

/// Distro id reported on Darwin.
pub const MACOS_ID: &str = "macos";

const DMI_VENDOR_PATH: &str = "/sys/class/dmi/id/sys_vendor";

/// Detected operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    /// macOS (kernel `Darwin`).
    Darwin,
    /// Any Linux distribution.
    Linux,
    /// Windows.
    Windows,
    /// Anything else.
    Unknown,
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Darwin => write!(f, "darwin"),
            Self::Linux => write!(f, "linux"),
            Self::Windows => write!(f, "windows"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Platform information for the current system.
///
/// Built once per run and passed by reference to everything that dispatches
/// on it. The distro id is reported raw; deciding whether it is supported is
/// the package adapter's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    /// Operating system family.
    pub os_family: OsFamily,
    /// Lower-case distribution id (`ubuntu`, `arch`, `macos`, ...).
    pub distro_id: String,
    /// Hardware vendor, informational only.
    pub manufacturer: String,
}

impl PlatformInfo {
    /// Create a platform with explicit values.
    #[must_use]
    pub fn new(os_family: OsFamily, distro_id: &str) -> Self {
        Self {
            os_family,
            distro_id: distro_id.to_string(),
            manufacturer: String::new(),
        }
    }

    /// Returns `true` on Linux.
    #[must_use]
    pub fn is_linux(&self) -> bool {
        self.os_family == OsFamily::Linux
    }

    /// Returns `true` on macOS.
    #[must_use]
    pub fn is_macos(&self) -> bool {
        self.os_family == OsFamily::Darwin
    }
}

impl fmt::Display for PlatformInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os_family, self.distro_id)?;
        if !self.manufacturer.is_empty() {
            write!(f, " ({})", self.manufacturer)?;
        }
        Ok(())
    }
}

/// Where the detector looks for system information.
///
/// The defaults point at the real system files; tests substitute paths
/// inside a temporary directory.
#[derive(Debug, Clone)]
pub struct DetectPaths {
    /// Candidate os-release files, tried in order.
    pub os_release: Vec<PathBuf>,
    /// DMI vendor file used for the manufacturer.
    pub dmi_vendor: PathBuf,
}

impl Default for DetectPaths {
    fn default() -> Self {
        Self {
            os_release: OS_RELEASE_PATHS.iter().map(PathBuf::from).collect(),
            dmi_vendor: PathBuf::from(DMI_VENDOR_PATH),
        }
    }
}

/// Detect the running platform.
///
/// The kernel name comes from `uname -s`; when `uname` cannot be run (e.g.
/// on Windows) the compile-time target OS is used instead.
///
/// # Errors
///
/// Returns [`PlatformError::UnsupportedPlatform`] when the kernel is neither
/// Darwin nor Linux.
pub fn detect(executor: &dyn Executor, paths: &DetectPaths) -> Result<PlatformInfo, PlatformError> {
    let kernel = kernel_name(executor);
    tracing::debug!("kernel name: {kernel}");

    let os_release = if kernel == "Linux" {
        read_os_release(&paths.os_release)
    } else {
        None
    };

    let mut info = detect_from(&kernel, os_release.as_deref())?;
    info.manufacturer = match info.os_family {
        OsFamily::Darwin => "Apple".to_string(),
        _ => std::fs::read_to_string(&paths.dmi_vendor)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    };
    Ok(info)
}

/// Map a kernel name and optional os-release contents to a [`PlatformInfo`].
///
/// # Errors
///
/// Returns [`PlatformError::UnsupportedPlatform`] when the kernel is neither
/// Darwin nor Linux.
pub fn detect_from(kernel: &str, os_release: Option<&str>) -> Result<PlatformInfo, PlatformError> {
    match kernel {
        "Darwin" => Ok(PlatformInfo::new(OsFamily::Darwin, MACOS_ID)),
        "Linux" => {
            let distro_id = os_release
                .and_then(distro_id_from_os_release)
                .unwrap_or_else(|| GENERIC_LINUX_ID.to_string());
            Ok(PlatformInfo::new(OsFamily::Linux, &distro_id))
        }
        other => Err(PlatformError::UnsupportedPlatform {
            kernel: other.to_string(),
        }),
    }
}

/// Extract the distribution id from os-release contents.
///
/// Uses `ID`, falling back to the first token of `ID_LIKE` when `ID` is
/// missing or empty. Returns `None` when neither yields a value.
#[must_use]
pub fn distro_id_from_os_release(contents: &str) -> Option<String> {
    let id = os_release_field(contents, "ID").filter(|v| !v.is_empty());
    let id = id.or_else(|| {
        os_release_field(contents, "ID_LIKE")
            .and_then(|like| like.split_whitespace().next().map(str::to_string))
    })?;
    Some(id.to_lowercase())
}

/// Look up a `KEY=value` field, stripping surrounding quotes.
fn os_release_field(contents: &str, key: &str) -> Option<String> {
    contents.lines().find_map(|line| {
        let (k, v) = line.trim().split_once('=')?;
        (k == key).then(|| v.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
    })
}

fn read_os_release(candidates: &[PathBuf]) -> Option<String> {
    candidates.iter().find_map(|path| read_file(path))
}

fn read_file(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            tracing::debug!("read os-release from {}", path.display());
            Some(contents)
        }
        Err(_) => None,
    }
}

fn kernel_name(executor: &dyn Executor) -> String {
    executor
        .run_unchecked(&CommandSpec::new("uname").arg("-s"))
        .ok()
        .filter(|r| r.success)
        .map(|r| r.stdout.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| fallback_kernel_name().to_string())
}

const fn fallback_kernel_name() -> &'static str {
    if cfg!(target_os = "linux") {
        "Linux"
    } else if cfg!(target_os = "macos") {
        "Darwin"
    } else if cfg!(target_os = "windows") {
        "Windows_NT"
    } else {
        "unknown"
    }
}
