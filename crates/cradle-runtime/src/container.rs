//! The container object: immutable configuration plus mutable state.
//!
//! State is exclusively owned by the container object; callers persist
//! it through a [`crate::backend::StateStore`] after every mutating
//! operation and must serialize concurrent mutation of the same
//! container externally.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cradle_common::config::CradleConfig;
use cradle_common::error::Result;
use cradle_common::types::{CgroupManager, ContainerId, ContainerStatus, NetworkMode, PortMapping};
use cradle_core::idmap::IdMappings;
use cradle_core::label::{MacFacility, relabel_if_enabled};
use cradle_core::namespace::NamespaceKind;
use cradle_core::ownership;

use crate::backend::{NetnsHandle, NetworkStatusMap};

/// Source containers for namespaces shared instead of created.
#[derive(Debug, Clone, Default)]
pub struct NamespaceSharing {
    /// Share the IPC namespace of this container.
    pub ipc: Option<ContainerId>,
    /// Share the mount namespace of this container.
    pub mount: Option<ContainerId>,
    /// Share the network namespace of this container.
    pub network: Option<ContainerId>,
    /// Share the PID namespace of this container.
    pub pid: Option<ContainerId>,
    /// Share the user namespace of this container.
    pub user: Option<ContainerId>,
    /// Share the UTS namespace of this container.
    pub uts: Option<ContainerId>,
    /// Share the cgroup namespace of this container.
    pub cgroup: Option<ContainerId>,
}

impl NamespaceSharing {
    /// Returns the source container for one namespace kind, if any.
    #[must_use]
    pub fn get(&self, kind: NamespaceKind) -> Option<&ContainerId> {
        match kind {
            NamespaceKind::Ipc => self.ipc.as_ref(),
            NamespaceKind::Mount => self.mount.as_ref(),
            NamespaceKind::Network => self.network.as_ref(),
            NamespaceKind::Pid => self.pid.as_ref(),
            NamespaceKind::User => self.user.as_ref(),
            NamespaceKind::Uts => self.uts.as_ref(),
            NamespaceKind::Cgroup => self.cgroup.as_ref(),
        }
    }
}

/// Reference from a container to a named volume it mounts.
#[derive(Debug, Clone)]
pub struct NamedVolumeRef {
    /// Volume name in the volume store.
    pub name: String,
    /// Destination inside the container.
    pub dest: PathBuf,
}

/// Immutable creation-time configuration of a container.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Unique identifier.
    pub id: ContainerId,
    /// Configured hostname, if the user set one.
    pub hostname: Option<String>,
    /// User-specified process environment, as `KEY=value` entries.
    pub env: Vec<String>,
    /// UID the container process runs as, in-namespace.
    pub process_uid: u32,
    /// GID the container process runs as, in-namespace.
    pub process_gid: u32,
    /// Namespaces shared from other containers.
    pub shared_namespaces: NamespaceSharing,
    /// Non-network namespaces to create fresh. A kind also named in
    /// `shared_namespaces` is joined instead.
    pub isolate_namespaces: Vec<NamespaceKind>,
    /// User-specified mounts, applied before any implicit mounts.
    pub mounts: Vec<crate::spec::SpecMount>,
    /// Create a fresh network namespace.
    pub create_netns: bool,
    /// Defer network namespace setup to a later configuration phase.
    pub post_configure_netns: bool,
    /// Network mode the container was created with.
    pub network_mode: NetworkMode,
    /// Published port mappings.
    pub port_mappings: Vec<PortMapping>,
    /// Cgroup manager backend.
    pub cgroup_manager: CgroupManager,
    /// Configured cgroup parent, if any.
    pub cgroup_parent: Option<String>,
    /// Cgroups are disabled for this container.
    pub no_cgroups: bool,
    /// Place the cgroup beneath the caller's own cgroup.
    pub cgroup_split: bool,
    /// The container runs an init-style (systemd) payload.
    pub systemd: bool,
    /// SELinux mount label, empty when unlabeled.
    pub mount_label: String,
    /// SELinux process label, empty when unlabeled.
    pub process_label: String,
    /// UID/GID mapping configuration.
    pub id_mappings: IdMappings,
    /// Named volumes mounted into the container.
    pub named_volumes: Vec<NamedVolumeRef>,
    /// Directory backing the /dev/shm tmpfs.
    pub shm_dir: PathBuf,
    /// Size of the /dev/shm tmpfs in bytes.
    pub shm_size: u64,
}

impl ContainerConfig {
    /// Creates a minimal configuration for the given ID.
    ///
    /// Every flag defaults to off; network and cgroup settings default
    /// to a bridged, systemd-managed container.
    #[must_use]
    pub fn new(id: ContainerId) -> Self {
        Self {
            id,
            hostname: None,
            env: Vec::new(),
            process_uid: 0,
            process_gid: 0,
            shared_namespaces: NamespaceSharing::default(),
            isolate_namespaces: Vec::new(),
            mounts: Vec::new(),
            create_netns: false,
            post_configure_netns: false,
            network_mode: NetworkMode::Bridge,
            port_mappings: Vec::new(),
            cgroup_manager: CgroupManager::Systemd,
            cgroup_parent: None,
            no_cgroups: false,
            cgroup_split: false,
            systemd: false,
            mount_label: String::new(),
            process_label: String::new(),
            id_mappings: IdMappings::default(),
            named_volumes: Vec::new(),
            shm_dir: PathBuf::new(),
            shm_size: cradle_common::constants::DEFAULT_SHM_SIZE,
        }
    }

    /// Creates a configuration taking cgroup defaults from the
    /// runtime configuration.
    #[must_use]
    pub fn from_runtime_config(id: ContainerId, runtime: &CradleConfig) -> Self {
        let mut config = Self::new(id);
        config.cgroup_manager = runtime.cgroup_manager.clone();
        config.cgroup_parent = runtime.cgroup_parent.clone();
        config
    }
}

/// Mutable runtime state of a container.
#[derive(Debug, Clone, Default)]
pub struct ContainerState {
    /// Current lifecycle state.
    pub status: ContainerStatus,
    /// Network namespace handle, when one is attached.
    pub netns: Option<NetnsHandle>,
    /// Per-network status reported by the network backend.
    pub network_status: NetworkStatusMap,
    /// Whether the root filesystem is mounted.
    pub mounted: bool,
    /// Mount point of the root filesystem.
    pub mountpoint: Option<PathBuf>,
    /// Host paths bind-mounted into the container, keyed by
    /// destination.
    pub bind_mounts: HashMap<String, PathBuf>,
    /// Per-container runtime directory.
    pub run_dir: PathBuf,
}

/// A container instance.
#[derive(Debug, Clone)]
pub struct Container {
    /// Immutable creation-time configuration.
    pub config: ContainerConfig,
    /// Mutable runtime state.
    pub state: ContainerState,
    /// Whether the container is still registered in the runtime.
    ///
    /// State of an unregistered container is no longer persisted.
    pub valid: bool,
}

impl Container {
    /// Creates a container in the `Configured` state.
    #[must_use]
    pub fn new(config: ContainerConfig) -> Self {
        Self {
            config,
            state: ContainerState::default(),
            valid: true,
        }
    }

    /// Returns the container's identity.
    #[must_use]
    pub fn id(&self) -> &ContainerId {
        &self.config.id
    }

    /// The container's effective hostname: the configured one, or a
    /// truncated form of the ID.
    #[must_use]
    pub fn hostname(&self) -> String {
        self.config.hostname.clone().unwrap_or_else(|| {
            let id = self.config.id.as_str();
            id[..id.len().min(12)].to_string()
        })
    }

    /// Host uid/gid that in-container root maps to.
    ///
    /// Without a mapping table, in-container root is host root.
    #[must_use]
    pub fn root_ids(&self) -> (u32, u32) {
        if self.config.id_mappings.has_uid_map() {
            self.config.id_mappings.to_host(0, 0).unwrap_or((0, 0))
        } else {
            (0, 0)
        }
    }

    /// Whether this container has no networking of its own to manage.
    #[must_use]
    pub fn network_disabled(&self) -> bool {
        self.config.network_mode == NetworkMode::None
    }

    /// Applies a label to a path, skipping redundant work during
    /// initial creation.
    ///
    /// While the container has not progressed past its initial
    /// lifecycle phase, a path already carrying the target label is
    /// left alone (a tmpfs-origin path would otherwise be relabeled on
    /// every start). Past that phase the relabel is applied
    /// unconditionally; callers only invoke it once, at creation.
    ///
    /// # Errors
    ///
    /// Returns an error if the label cannot be read or applied.
    pub fn relabel(
        &self,
        mac: &dyn MacFacility,
        path: &Path,
        label: &str,
        recurse: bool,
    ) -> Result<()> {
        if !mac.enabled() || label.is_empty() {
            return Ok(());
        }
        if self.state.status.is_initial() {
            let current = mac.file_label(path)?;
            if current == label {
                return Ok(());
            }
        }
        relabel_if_enabled(mac, path, label, recurse)
    }

    /// Changes ownership of a host path with the same initial-phase
    /// guard as [`Self::relabel`].
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be stat'ed or chowned.
    pub fn change_host_path_ownership(
        &self,
        path: &Path,
        recurse: bool,
        uid: u32,
        gid: u32,
    ) -> Result<()> {
        if self.state.status.is_initial() {
            let (current_uid, current_gid) = ownership::owner(path)?;
            if current_uid == uid && current_gid == gid {
                return Ok(());
            }
        }
        ownership::change_host_path_ownership(path, recurse, uid, gid)
    }
}
