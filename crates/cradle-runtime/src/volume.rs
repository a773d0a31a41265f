//! Named volumes and ownership reconciliation.
//!
//! Each volume carries an independent exclusive lock held for the
//! duration of any read-modify-write, serializing ownership fixes
//! across containers that reference the same volume.

use std::collections::HashMap;
use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cradle_common::error::{CradleError, Result};
use cradle_core::ownership;
use serde::{Deserialize, Serialize};

use crate::container::{Container, NamedVolumeRef};

/// Persisted state of a named volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedVolume {
    /// Volume name, unique within the store.
    pub name: String,
    /// External volume driver, if one manages this volume.
    pub driver: Option<String>,
    /// Where the volume is mounted on the host.
    pub mount_point: PathBuf,
    /// Ownership still needs to be fixed on next use.
    pub needs_chown: bool,
    /// Host UID applied by the last ownership fix.
    pub uid_chowned: Option<u32>,
    /// Host GID applied by the last ownership fix.
    pub gid_chowned: Option<u32>,
}

impl NamedVolume {
    /// Creates a local volume that still needs its ownership fixed.
    #[must_use]
    pub fn new(name: impl Into<String>, mount_point: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            driver: None,
            mount_point: mount_point.into(),
            needs_chown: true,
            uid_chowned: None,
            gid_chowned: None,
        }
    }

    /// Whether an external volume driver owns this mount.
    ///
    /// Driver-managed mounts are never chowned by this layer.
    #[must_use]
    pub fn uses_volume_driver(&self) -> bool {
        self.driver.as_deref().is_some_and(|d| d != "local")
    }
}

/// Store of named volumes with one lock per volume.
pub struct VolumeStore {
    dir: PathBuf,
    entries: Mutex<HashMap<String, Arc<Mutex<NamedVolume>>>>,
}

impl VolumeStore {
    /// Opens a store rooted at the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| CradleError::io(&dir, e))?;
        Ok(Self {
            dir,
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Registers a volume and persists its initial state.
    ///
    /// # Errors
    ///
    /// Returns an error if the state record cannot be written.
    pub fn add(&self, volume: NamedVolume) -> Result<()> {
        self.write_record(&volume)?;
        let _ = lock_map(&self.entries).insert(
            volume.name.clone(),
            Arc::new(Mutex::new(volume)),
        );
        Ok(())
    }

    fn entry(&self, name: &str) -> Result<Arc<Mutex<NamedVolume>>> {
        lock_map(&self.entries)
            .get(name)
            .cloned()
            .ok_or(CradleError::NotFound {
                kind: "volume",
                id: name.to_string(),
            })
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Re-reads a volume's persisted record, picking up changes made
    /// by other processes (a copy-up may have set flags).
    fn refresh(&self, volume: &mut NamedVolume) -> Result<()> {
        let path = self.record_path(&volume.name);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                *volume = serde_json::from_str(&content)?;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CradleError::io(path, e)),
        }
    }

    fn write_record(&self, volume: &NamedVolume) -> Result<()> {
        let path = self.record_path(&volume.name);
        let content = serde_json::to_string_pretty(volume)?;
        std::fs::write(&path, content).map_err(|e| CradleError::io(path, e))
    }

    /// Runs a closure under a volume's exclusive lock, against its
    /// refreshed state.
    ///
    /// # Errors
    ///
    /// Returns [`CradleError::NotFound`] for an unknown volume, or the
    /// closure's error.
    pub fn with_volume<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut NamedVolume, &Self) -> Result<R>,
    ) -> Result<R> {
        let entry = self.entry(name)?;
        let mut volume = lock_volume(&entry);
        self.refresh(&mut volume)?;
        f(&mut volume, self)
    }

    /// Fixes a volume's ownership for the given container, at most
    /// once per volume lifecycle.
    ///
    /// The needs-chown flag is cleared and persisted before any
    /// filesystem mutation, so a crash mid-fix cannot repeat a partial
    /// chown indefinitely; once cleared it is never re-set by this
    /// layer. Target IDs come from the container's process user,
    /// translated to host IDs when a mapping table is configured. When
    /// the matching path inside the mounted container root exists, its
    /// owner, mode, and timestamps are copied onto the volume so it
    /// matches the image directory it overlays.
    ///
    /// # Errors
    ///
    /// Returns an error if the volume is unknown, the ID translation
    /// fails, or a stat/chown on the mount point fails. A missing
    /// source path inside the container root is tolerated.
    pub fn fix_volume_permissions(&self, container: &Container, v: &NamedVolumeRef) -> Result<()> {
        self.with_volume(&v.name, |volume, store| {
            if !volume.needs_chown || volume.uses_volume_driver() {
                return Ok(());
            }
            volume.needs_chown = false;

            let mut uid = container.config.process_uid;
            let mut gid = container.config.process_gid;
            if container.config.id_mappings.has_uid_map() {
                (uid, gid) = container.config.id_mappings.to_host(uid, gid)?;
            }
            volume.uid_chowned = Some(uid);
            volume.gid_chowned = Some(gid);

            store.write_record(volume)?;

            let mount_point = volume.mount_point.clone();
            ownership::lchown(&mount_point, uid, gid)?;

            let Some(root) = &container.state.mountpoint else {
                return Ok(());
            };
            let in_root = root.join(v.dest.strip_prefix("/").unwrap_or(&v.dest));
            match std::fs::symlink_metadata(&in_root) {
                Ok(meta) => {
                    use std::os::unix::fs::MetadataExt;

                    ownership::lchown(&mount_point, meta.uid(), meta.gid())?;
                    std::fs::set_permissions(&mount_point, meta.permissions())
                        .map_err(|e| CradleError::io(&mount_point, e))?;
                    copy_times(&meta, &mount_point)?;
                    Ok(())
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(CradleError::io(in_root, e)),
            }
        })
    }
}

/// Copies access and modification times onto the mount point.
fn copy_times(meta: &std::fs::Metadata, mount_point: &std::path::Path) -> Result<()> {
    let accessed = meta.accessed().map_err(|e| CradleError::io(mount_point, e))?;
    let modified = meta.modified().map_err(|e| CradleError::io(mount_point, e))?;
    let times = std::fs::FileTimes::new()
        .set_accessed(accessed)
        .set_modified(modified);
    File::open(mount_point)
        .and_then(|f| f.set_times(times))
        .map_err(|e| CradleError::io(mount_point, e))
}

fn lock_map<'a>(
    entries: &'a Mutex<HashMap<String, Arc<Mutex<NamedVolume>>>>,
) -> MutexGuard<'a, HashMap<String, Arc<Mutex<NamedVolume>>>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

fn lock_volume(entry: &Mutex<NamedVolume>) -> MutexGuard<'_, NamedVolume> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}
