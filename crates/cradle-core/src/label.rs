//! Mandatory-access-control label handling.
//!
//! Label computation is external; this module only reads and applies
//! the resulting security context strings.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use cradle_common::error::{CradleError, Result};

/// Read/write access to mandatory-access-control file labels.
///
/// Implemented by the host SELinux facility; tests substitute fakes.
pub trait MacFacility: Send + Sync {
    /// Whether mandatory access control is active on this host.
    fn enabled(&self) -> bool;

    /// Reads the current label of a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the label cannot be read.
    fn file_label(&self, path: &Path) -> Result<String>;

    /// Applies a label to a path, optionally recursing into directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the label cannot be applied.
    fn relabel(&self, path: &Path, label: &str, recurse: bool) -> Result<()>;
}

/// Applies a label through the facility, skipping inactive hosts and
/// empty labels.
///
/// # Errors
///
/// Returns an error if the underlying relabel fails.
pub fn relabel_if_enabled(
    mac: &dyn MacFacility,
    path: &Path,
    label: &str,
    recurse: bool,
) -> Result<()> {
    if !mac.enabled() || label.is_empty() {
        return Ok(());
    }
    mac.relabel(path, label, recurse)
}

/// Appends a security context to a mount option string.
///
/// An empty label leaves the options untouched.
#[must_use]
pub fn format_mount_label(options: &str, label: &str) -> String {
    if label.is_empty() {
        return options.to_string();
    }
    if options.is_empty() {
        format!("context=\"{label}\"")
    } else {
        format!("{options},context=\"{label}\"")
    }
}

/// SELinux-backed label facility.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelinuxMac;

const SELINUX_XATTR: &str = "security.selinux";

#[cfg(target_os = "linux")]
impl MacFacility for SelinuxMac {
    fn enabled(&self) -> bool {
        Path::new("/sys/fs/selinux/enforce").exists()
    }

    fn file_label(&self, path: &Path) -> Result<String> {
        lgetxattr(path, SELINUX_XATTR)
    }

    fn relabel(&self, path: &Path, label: &str, recurse: bool) -> Result<()> {
        lsetxattr(path, SELINUX_XATTR, label)?;
        if recurse && path.is_dir() {
            for entry in std::fs::read_dir(path).map_err(|e| CradleError::io(path, e))? {
                let entry = entry.map_err(|e| CradleError::io(path, e))?;
                self.relabel(&entry.path(), label, recurse)?;
            }
        }
        tracing::debug!(path = %path.display(), label, "applied file label");
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
impl MacFacility for SelinuxMac {
    fn enabled(&self) -> bool {
        false
    }

    fn file_label(&self, _path: &Path) -> Result<String> {
        Err(CradleError::Config {
            message: "Linux required for native container operations".into(),
        })
    }

    fn relabel(&self, _path: &Path, _label: &str, _recurse: bool) -> Result<()> {
        Err(CradleError::Config {
            message: "Linux required for native container operations".into(),
        })
    }
}

#[cfg(target_os = "linux")]
fn lgetxattr(path: &Path, name: &str) -> Result<String> {
    let c_path = c_path(path)?;
    let c_name = CString::new(name).map_err(|_| CradleError::InvalidState {
        message: format!("xattr name {name} contains a NUL byte"),
    })?;
    let mut buf = vec![0u8; 256];
    // SAFETY: both pointers come from live CStrings and the buffer
    // length matches its allocation.
    let len = unsafe {
        libc::lgetxattr(
            c_path.as_ptr(),
            c_name.as_ptr(),
            buf.as_mut_ptr().cast(),
            buf.len(),
        )
    };
    if len < 0 {
        return Err(CradleError::io(path, std::io::Error::last_os_error()));
    }
    buf.truncate(usize::try_from(len).unwrap_or(0));
    while buf.last() == Some(&0) {
        let _ = buf.pop();
    }
    String::from_utf8(buf).map_err(|_| CradleError::InvalidState {
        message: format!("non-UTF-8 label on {}", path.display()),
    })
}

#[cfg(target_os = "linux")]
fn lsetxattr(path: &Path, name: &str, value: &str) -> Result<()> {
    let c_path = c_path(path)?;
    let c_name = CString::new(name).map_err(|_| CradleError::InvalidState {
        message: format!("xattr name {name} contains a NUL byte"),
    })?;
    // SAFETY: pointers come from live CStrings / the value slice, and
    // the length matches the value slice.
    let rc = unsafe {
        libc::lsetxattr(
            c_path.as_ptr(),
            c_name.as_ptr(),
            value.as_ptr().cast(),
            value.len(),
            0,
        )
    };
    if rc != 0 {
        return Err(CradleError::io(path, std::io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn c_path(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| CradleError::InvalidState {
        message: format!("path {} contains a NUL byte", path.display()),
    })
}
