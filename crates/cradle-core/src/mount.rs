//! Mount option model, filesystem probes, and tolerant unmounting.

use std::path::Path;

use cradle_common::error::{CradleError, Result};

/// Mount propagation option: shared.
pub const MOUNT_SHARED: &str = "shared";
/// Mount propagation option: recursively shared.
pub const MOUNT_RSHARED: &str = "rshared";
/// Mount propagation option: slave.
pub const MOUNT_SLAVE: &str = "slave";
/// Mount propagation option: recursively slave.
pub const MOUNT_RSLAVE: &str = "rslave";
/// Mount propagation option: private.
pub const MOUNT_PRIVATE: &str = "private";
/// Mount propagation option: recursively private.
pub const MOUNT_RPRIVATE: &str = "rprivate";

/// Restriction flags reported for a mounted filesystem.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsOptionFlags {
    /// Device files are not interpreted.
    pub nodev: bool,
    /// Execution is not permitted.
    pub noexec: bool,
    /// Set-user-ID bits are ignored.
    pub nosuid: bool,
    /// Filesystem is read-only.
    pub readonly: bool,
}

impl FsOptionFlags {
    /// Renders the set flags as mount option strings.
    #[must_use]
    pub fn to_options(self) -> Vec<String> {
        let mut options = Vec::new();
        if self.nodev {
            options.push("nodev".to_string());
        }
        if self.noexec {
            options.push("noexec".to_string());
        }
        if self.nosuid {
            options.push("nosuid".to_string());
        }
        if self.readonly {
            options.push("ro".to_string());
        }
        options
    }
}

/// Reports restriction flags of live filesystems.
pub trait FsProbe: Send + Sync {
    /// Reads the restriction flags of the filesystem at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem cannot be queried.
    fn option_flags(&self, path: &Path) -> Result<FsOptionFlags>;
}

/// Probe backed by `statvfs(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostFsProbe;

#[cfg(target_os = "linux")]
impl FsProbe for HostFsProbe {
    fn option_flags(&self, path: &Path) -> Result<FsOptionFlags> {
        use nix::sys::statvfs::{FsFlags, statvfs};

        let stat = statvfs(path).map_err(|e| CradleError::io(path, e.into()))?;
        let flags = stat.flags();
        Ok(FsOptionFlags {
            nodev: flags.contains(FsFlags::ST_NODEV),
            noexec: flags.contains(FsFlags::ST_NOEXEC),
            nosuid: flags.contains(FsFlags::ST_NOSUID),
            readonly: flags.contains(FsFlags::ST_RDONLY),
        })
    }
}

#[cfg(not(target_os = "linux"))]
impl FsProbe for HostFsProbe {
    fn option_flags(&self, _path: &Path) -> Result<FsOptionFlags> {
        Err(CradleError::Config {
            message: "Linux required for native container operations".into(),
        })
    }
}

/// Mounts a tmpfs at `target` with `noexec,nosuid,nodev` plus the
/// given data string (size, mode, security context).
///
/// # Errors
///
/// Returns an error if the mount syscall fails.
#[cfg(target_os = "linux")]
pub fn mount_tmpfs(target: &Path, data: &str) -> Result<()> {
    use nix::mount::{MsFlags, mount};

    mount(
        Some("shm"),
        target,
        Some("tmpfs"),
        MsFlags::MS_NOEXEC | MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
        Some(data),
    )
    .map_err(|e| CradleError::io(target, e.into()))
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error — tmpfs mounts require Linux.
#[cfg(not(target_os = "linux"))]
pub fn mount_tmpfs(_target: &Path, _data: &str) -> Result<()> {
    Err(CradleError::Config {
        message: "Linux required for native container operations".into(),
    })
}

/// Unmounts a path, treating "not mounted" outcomes as success.
///
/// `EINVAL` and `ENOENT` mean the mount is already gone and are only
/// debug-logged.
///
/// # Errors
///
/// Returns an error for any other unmount failure.
#[cfg(target_os = "linux")]
pub fn unmount(target: &Path) -> Result<()> {
    use nix::errno::Errno;

    match nix::mount::umount(target) {
        Ok(()) => Ok(()),
        Err(Errno::EINVAL | Errno::ENOENT) => {
            tracing::debug!(target = %target.display(), "already unmounted");
            Ok(())
        }
        Err(e) => Err(CradleError::io(target, e.into())),
    }
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error — unmounting requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn unmount(_target: &Path) -> Result<()> {
    Err(CradleError::Config {
        message: "Linux required for native container operations".into(),
    })
}
