//! Persistent container state records.
//!
//! Maintains one JSON record per container, rewritten after every
//! mutating operation, enabling daemon-less lifecycle management.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cradle_common::error::{CradleError, Result};
use cradle_common::types::{ContainerId, ContainerStatus};
use serde::{Deserialize, Serialize};

use crate::backend::{NetworkStatusMap, StateStore};
use crate::container::Container;

/// Persisted snapshot of a container's mutable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// Container identifier.
    pub id: ContainerId,
    /// Current lifecycle state.
    pub status: ContainerStatus,
    /// Whether the root filesystem is mounted.
    pub mounted: bool,
    /// Mount point of the root filesystem.
    pub mountpoint: Option<PathBuf>,
    /// Bind path of the network namespace, when attached.
    pub netns_path: Option<PathBuf>,
    /// Per-network status reported by the network backend.
    pub network_status: NetworkStatusMap,
    /// Host paths bind-mounted into the container.
    pub bind_mounts: HashMap<String, PathBuf>,
    /// ISO-8601 timestamp of the last save.
    pub saved_at: String,
}

/// State store writing one JSON record per container.
#[derive(Debug)]
pub struct JsonStateStore {
    dir: PathBuf,
}

impl JsonStateStore {
    /// Opens a store rooted at the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| CradleError::io(&dir, e))?;
        Ok(Self { dir })
    }

    /// Opens the store at its conventional location beneath the
    /// configured data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn from_config(config: &cradle_common::config::CradleConfig) -> Result<Self> {
        Self::open(state_dir(&config.data_dir))
    }

    fn record_path(&self, id: &ContainerId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Loads a container's persisted record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is missing or unparsable.
    pub fn load(&self, id: &ContainerId) -> Result<ContainerRecord> {
        let path = self.record_path(id);
        let content = std::fs::read_to_string(&path).map_err(|e| CradleError::io(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl StateStore for JsonStateStore {
    fn save(&self, container: &Container) -> Result<()> {
        let record = ContainerRecord {
            id: container.id().clone(),
            status: container.state.status,
            mounted: container.state.mounted,
            mountpoint: container.state.mountpoint.clone(),
            netns_path: container
                .state
                .netns
                .as_ref()
                .map(|ns| ns.path().to_path_buf()),
            network_status: container.state.network_status.clone(),
            bind_mounts: container.state.bind_mounts.clone(),
            saved_at: chrono::Utc::now().to_rfc3339(),
        };
        let path = self.record_path(container.id());
        let content = serde_json::to_string_pretty(&record)?;
        std::fs::write(&path, content).map_err(|e| CradleError::io(path, e))?;
        tracing::debug!(id = %container.id(), path = %self.dir.display(), "saved container state");
        Ok(())
    }
}

/// Returns the default state directory beneath a data directory.
#[must_use]
pub fn state_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("containers")
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::backend::NetnsHandle;
    use crate::container::ContainerConfig;

    #[test]
    fn save_and_load_round_trips_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::open(dir.path()).unwrap();

        let mut c = Container::new(ContainerConfig::new(ContainerId::new("abc")));
        c.state.mounted = true;
        c.state.mountpoint = Some(PathBuf::from("/var/lib/cradle/overlay/abc/merged"));
        c.state.netns = Some(NetnsHandle::new("/run/netns/cradle-abc"));
        store.save(&c).unwrap();

        let record = store.load(c.id()).unwrap();
        assert!(record.mounted);
        assert_eq!(
            record.netns_path,
            Some(PathBuf::from("/run/netns/cradle-abc"))
        );
        assert_eq!(record.status, ContainerStatus::Configured);
    }

    #[test]
    fn load_of_unknown_container_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::open(dir.path()).unwrap();
        assert!(store.load(&ContainerId::new("ghost")).is_err());
    }
}
