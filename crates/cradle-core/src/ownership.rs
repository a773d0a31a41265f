//! Host-path ownership helpers.

use std::path::Path;

use cradle_common::error::{CradleError, Result};

/// Changes the owner of a host path without following a final symlink.
///
/// # Errors
///
/// Returns an error if the chown syscall fails.
#[cfg(target_os = "linux")]
pub fn lchown(path: &Path, uid: u32, gid: u32) -> Result<()> {
    std::os::unix::fs::lchown(path, Some(uid), Some(gid))
        .map_err(|e| CradleError::io(path, e))
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error — ownership changes require Linux.
#[cfg(not(target_os = "linux"))]
pub fn lchown(_path: &Path, _uid: u32, _gid: u32) -> Result<()> {
    Err(CradleError::Config {
        message: "Linux required for native container operations".into(),
    })
}

/// Changes ownership of a host path, optionally recursing into
/// directories. Symlinks are re-owned, never followed.
///
/// # Errors
///
/// Returns an error if any chown or directory read fails.
pub fn change_host_path_ownership(path: &Path, recurse: bool, uid: u32, gid: u32) -> Result<()> {
    if recurse && path.is_dir() {
        for entry in std::fs::read_dir(path).map_err(|e| CradleError::io(path, e))? {
            let entry = entry.map_err(|e| CradleError::io(path, e))?;
            change_host_path_ownership(&entry.path(), recurse, uid, gid)?;
        }
    }
    lchown(path, uid, gid)
}

/// Numeric owner and group of a path, without following a final
/// symlink.
///
/// # Errors
///
/// Returns an error if the path cannot be stat'ed.
#[cfg(unix)]
pub fn owner(path: &Path) -> Result<(u32, u32)> {
    use std::os::unix::fs::MetadataExt;

    let meta = std::fs::symlink_metadata(path).map_err(|e| CradleError::io(path, e))?;
    Ok((meta.uid(), meta.gid()))
}
