//! System-wide constants and default paths.

use std::path::PathBuf;
use std::sync::OnceLock;

/// Default base directory for Cradle data on Linux with root access.
pub const SYSTEM_DATA_DIR: &str = "/var/lib/cradle";

/// Returns the data directory, preferring `$HOME/.cradle` for non-root
/// or non-Linux environments, falling back to `/var/lib/cradle`.
fn resolve_data_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
        let user_dir = PathBuf::from(home).join(".cradle");
        if std::fs::create_dir_all(&user_dir).is_ok() {
            return user_dir;
        }
    }
    PathBuf::from(SYSTEM_DATA_DIR)
}

static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the resolved data directory for this session.
pub fn data_dir() -> &'static PathBuf {
    DATA_DIR.get_or_init(resolve_data_dir)
}

/// Cgroups unified hierarchy mount point.
pub const CGROUP_MOUNT_POINT: &str = "/sys/fs/cgroup";

/// Default cgroup parent used by the cgroupfs manager.
///
/// Older releases set this parent on every container; the rootless
/// placement rules still special-case it for compatibility.
pub const CGROUPFS_DEFAULT_PARENT: &str = "/libpod_parent";

/// Default cgroup parent slice used by the systemd manager.
pub const SYSTEMD_DEFAULT_PARENT: &str = "machine.slice";

/// systemd cgroup mount source under the legacy (v1) hierarchy.
pub const SYSTEMD_CGROUP_V1_PATH: &str = "/sys/fs/cgroup/systemd";

/// Release-agent interface masked inside init-style containers.
pub const SYSTEMD_RELEASE_AGENT_PATH: &str = "/sys/fs/cgroup/systemd/release_agent";

/// Default size of the /dev/shm tmpfs in bytes (64 MiB).
pub const DEFAULT_SHM_SIZE: u64 = 64 * 1024 * 1024;

/// Application name used in state files and log output.
pub const APP_NAME: &str = "cradle";
