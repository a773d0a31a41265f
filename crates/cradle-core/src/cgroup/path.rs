//! Placement-path decision table for container cgroups.
//!
//! Maps manager backend, hierarchy mode, rootless state, and the
//! configured parent to the path string handed to the OCI runtime.

use std::path::Path;

use cradle_common::constants::CGROUPFS_DEFAULT_PARENT;
use cradle_common::error::{CradleError, Result};
use cradle_common::types::{CgroupManager, ContainerId};

use super::CgroupProbe;

/// Inputs to the cgroup placement decision.
///
/// Built once per container from its configuration plus the detected
/// host capabilities; carries no live host state of its own.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone)]
pub struct CgroupPlacement<'a> {
    /// Cgroups are disabled for this container.
    pub cgroups_disabled: bool,
    /// Place the container beneath the caller's own cgroup.
    pub split: bool,
    /// Manager backend from configuration.
    pub manager: &'a CgroupManager,
    /// The caller runs without root privileges.
    pub rootless: bool,
    /// The host runs the unified (v2) hierarchy.
    pub unified: bool,
    /// Configured cgroup parent, if any.
    pub parent: Option<&'a str>,
    /// Container being placed.
    pub id: &'a ContainerId,
}

/// Whether a rootless cgroup parent was set deliberately.
///
/// Older releases set the parent to the cgroupfs default on every
/// container; treat that value, or a direct child of it, as unset so
/// containers created under those defaults keep working. Checked before
/// the general cgroupfs rule; the precedence is load-bearing.
fn is_rootless_cgroup_set(cgroup: &str) -> bool {
    let parent_dir = Path::new(cgroup)
        .parent()
        .map(|p| p.to_string_lossy().into_owned());
    cgroup != CGROUPFS_DEFAULT_PARENT && parent_dir.as_deref() != Some(CGROUPFS_DEFAULT_PARENT)
}

/// Resolves the cgroup path string for the OCI spec.
///
/// Ordered decision table, first match wins:
///
/// 1. cgroups disabled: empty string.
/// 2. split mode: `<own cgroup>/libpod-payload-<id>`; the own-cgroup
///    lookup refuses the root cgroup.
/// 3. systemd manager: `<basename(parent)>:libpod:<id>`.
/// 4. rootless with cgroupfs or a legacy hierarchy, and a parent that
///    is empty or left at the old default: empty string.
/// 5. cgroupfs manager: `<parent>/libpod-<id>`.
/// 6. anything else is a configuration error.
///
/// # Errors
///
/// Returns an error for an unrecognized manager, or if the own-cgroup
/// lookup fails or lands on the root cgroup in split mode.
pub fn resolve_cgroup_path(p: &CgroupPlacement<'_>, probe: &dyn CgroupProbe) -> Result<String> {
    if p.cgroups_disabled {
        return Ok(String::new());
    }

    if p.split {
        let own = probe.own_cgroup()?;
        if own == "/" {
            return Err(CradleError::PermissionDenied {
                message: "cgroup split mode is not allowed from the root cgroup".into(),
            });
        }
        return Ok(join_cgroup(&own, &format!("libpod-payload-{}", p.id)));
    }

    if *p.manager == CgroupManager::Systemd {
        let parent = p
            .parent
            .unwrap_or(cradle_common::constants::SYSTEMD_DEFAULT_PARENT);
        let slice = Path::new(parent)
            .file_name()
            .map_or_else(|| parent.to_string(), |n| n.to_string_lossy().into_owned());
        let path = format!("{slice}:libpod:{}", p.id);
        tracing::debug!(id = %p.id, cgroups = %path, "systemd cgroup placement");
        return Ok(path);
    }

    if p.rootless && (*p.manager == CgroupManager::Cgroupfs || !p.unified) {
        match p.parent {
            None => return Ok(String::new()),
            Some(parent) if !is_rootless_cgroup_set(parent) => return Ok(String::new()),
            Some(_) => {}
        }
    }

    if *p.manager == CgroupManager::Cgroupfs {
        let parent = p.parent.unwrap_or(CGROUPFS_DEFAULT_PARENT);
        let path = join_cgroup(parent, &format!("libpod-{}", p.id));
        tracing::debug!(id = %p.id, cgroups = %path, "cgroupfs placement");
        return Ok(path);
    }

    Err(CradleError::Config {
        message: format!("invalid cgroup manager {} requested", p.manager),
    })
}

/// Whether a pod-level cgroup is expected for this configuration.
///
/// # Errors
///
/// Returns an error for a manager that cannot host pod cgroups.
pub fn expect_pod_cgroup(p: &CgroupPlacement<'_>) -> Result<bool> {
    if p.cgroups_disabled {
        return Ok(false);
    }
    match p.manager {
        CgroupManager::Systemd => Ok(!p.rootless || p.unified),
        CgroupManager::Cgroupfs => Ok(!p.rootless),
        CgroupManager::Other(name) => Err(CradleError::Config {
            message: format!("invalid cgroup mode {name} requested for pods"),
        }),
    }
}

fn join_cgroup(parent: &str, child: &str) -> String {
    Path::new(parent).join(child).to_string_lossy().into_owned()
}
