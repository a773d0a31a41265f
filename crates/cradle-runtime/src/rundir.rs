//! Per-container run-directory population helpers.

use std::path::{Path, PathBuf};

use cradle_common::error::{CradleError, Result};
use cradle_core::label::{MacFacility, relabel_if_enabled};

use crate::container::Container;

/// Creates the directory secrets are mounted from, if absent.
///
/// The directory is created under a zeroed umask so the requested mode
/// survives, labeled with the container's mount label, owned by the
/// container's root user, and recorded in the bind-mount map. An
/// existing directory is left untouched.
///
/// # Errors
///
/// Returns an error if creation, labeling, or ownership fails.
#[cfg(unix)]
pub fn create_secret_mount_dir(container: &mut Container, mac: &dyn MacFacility) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let src = container.state.run_dir.join("run/secrets");
    match std::fs::symlink_metadata(&src) {
        Ok(_) => return Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(CradleError::io(src, e)),
    }

    let previous = nix::sys::stat::umask(nix::sys::stat::Mode::empty());
    let created = std::fs::create_dir_all(&src);
    let _ = nix::sys::stat::umask(previous);
    created.map_err(|e| CradleError::io(&src, e))?;
    std::fs::set_permissions(&src, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| CradleError::io(&src, e))?;

    relabel_if_enabled(mac, &src, &container.config.mount_label, false)?;

    let (uid, gid) = container.root_ids();
    std::os::unix::fs::chown(&src, Some(uid), Some(gid)).map_err(|e| CradleError::io(&src, e))?;

    let _ = container
        .state
        .bind_mounts
        .insert("/run/secrets".to_string(), src);
    Ok(())
}

/// Copies a host zoneinfo file into the run directory so it can be
/// bind-mounted at /etc/localtime.
///
/// # Errors
///
/// Returns an error if the zone path is a directory or any copy,
/// label, or ownership step fails.
#[cfg(unix)]
pub fn copy_timezone_file(
    container: &Container,
    mac: &dyn MacFacility,
    zone_path: &Path,
) -> Result<PathBuf> {
    let localtime = container.state.run_dir.join("localtime");

    let meta = std::fs::metadata(zone_path).map_err(|e| CradleError::io(zone_path, e))?;
    if meta.is_dir() {
        return Err(CradleError::Config {
            message: "invalid timezone: is a directory".into(),
        });
    }

    let _ = std::fs::copy(zone_path, &localtime).map_err(|e| CradleError::io(&localtime, e))?;
    container.relabel(mac, &localtime, &container.config.mount_label, false)?;
    let (uid, gid) = container.root_ids();
    std::os::unix::fs::chown(&localtime, Some(uid), Some(gid))
        .map_err(|e| CradleError::io(&localtime, e))?;
    Ok(localtime)
}
