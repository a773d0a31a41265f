//! Cgroup hierarchy probes and placement-path resolution.
//!
//! The placement decision itself lives in [`path`] and is a pure
//! function of its inputs; this module supplies the host-facing probe
//! it consumes.

pub mod path;

pub use path::{CgroupPlacement, expect_pod_cgroup, resolve_cgroup_path};

use cradle_common::error::{CradleError, Result};

/// Reports the host's cgroup mode and the caller's own cgroup.
///
/// Detected state is injected into the placement rules instead of being
/// queried globally, so the decision table stays testable with
/// synthetic probes.
pub trait CgroupProbe: Send + Sync {
    /// Whether the host runs the unified (v2) hierarchy.
    ///
    /// # Errors
    ///
    /// Returns an error if the hierarchy mode cannot be determined.
    fn unified(&self) -> Result<bool>;

    /// The calling process's own cgroup path.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be read.
    fn own_cgroup(&self) -> Result<String>;
}

/// Probe backed by the real host.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCgroupProbe;

#[cfg(target_os = "linux")]
impl CgroupProbe for HostCgroupProbe {
    fn unified(&self) -> Result<bool> {
        use nix::sys::statfs::{CGROUP2_SUPER_MAGIC, statfs};

        let mount = cradle_common::constants::CGROUP_MOUNT_POINT;
        let stat = statfs(mount).map_err(|e| CradleError::io(mount, e.into()))?;
        Ok(stat.filesystem_type() == CGROUP2_SUPER_MAGIC)
    }

    fn own_cgroup(&self) -> Result<String> {
        let path = "/proc/self/cgroup";
        let content =
            std::fs::read_to_string(path).map_err(|e| CradleError::io(path, e))?;
        parse_own_cgroup(&content).ok_or_else(|| CradleError::InvalidState {
            message: format!("no cgroup entry found in {path}"),
        })
    }
}

#[cfg(not(target_os = "linux"))]
impl CgroupProbe for HostCgroupProbe {
    fn unified(&self) -> Result<bool> {
        Err(CradleError::Config {
            message: "Linux required for native container operations".into(),
        })
    }

    fn own_cgroup(&self) -> Result<String> {
        Err(CradleError::Config {
            message: "Linux required for native container operations".into(),
        })
    }
}

/// Extracts the caller's cgroup from `/proc/self/cgroup` content.
///
/// Prefers the unified `0::` entry and falls back to the first
/// hierarchy listed.
fn parse_own_cgroup(content: &str) -> Option<String> {
    let mut first = None;
    for line in content.lines() {
        let mut parts = line.splitn(3, ':');
        let hierarchy = parts.next()?;
        let _controllers = parts.next()?;
        let cgroup = parts.next()?;
        if hierarchy == "0" {
            return Some(cgroup.to_string());
        }
        if first.is_none() {
            first = Some(cgroup.to_string());
        }
    }
    first
}

/// Whether the current process runs without root privileges.
#[must_use]
pub fn is_rootless() -> bool {
    !nix::unistd::geteuid().is_root()
}
