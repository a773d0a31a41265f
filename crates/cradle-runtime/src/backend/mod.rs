//! Collaborator abstractions for sandbox preparation.
//!
//! The network backend, storage driver, container registry, and state
//! store are external to this layer; preparation talks to them through
//! these traits.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cradle_common::error::{CradleError, Result};
use cradle_common::types::ContainerId;
use cradle_core::namespace::{NamespaceKind, proc_ns_path};
use serde::{Deserialize, Serialize};

use crate::container::Container;

/// Handle to a created network namespace, identified by its bind path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetnsHandle(PathBuf);

impl NetnsHandle {
    /// Creates a handle from the namespace's bind path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Path of the namespace on the host.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// Status reported by the network backend for one attached network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatusBlock {
    /// Interface names created inside the namespace.
    pub interfaces: Vec<String>,
    /// DNS server addresses assigned for this network.
    pub dns_servers: Vec<String>,
}

/// Per-network status map, keyed by network name.
pub type NetworkStatusMap = HashMap<String, NetworkStatusBlock>;

/// Creates and tears down container network namespaces.
///
/// Implementations invoke the actual network plugins; this layer only
/// coordinates them.
pub trait NetworkBackend: Send + Sync {
    /// Creates a network namespace for the container and attaches its
    /// configured networks.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace or any network attachment
    /// cannot be created.
    fn create_netns(&self, container: &Container) -> Result<(NetnsHandle, NetworkStatusMap)>;

    /// Tears down the container's network namespace.
    ///
    /// Must be idempotent: tearing down an unconfigured network is a
    /// no-op, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if live network state cannot be removed.
    fn teardown_netns(&self, container: &Container) -> Result<()>;

    /// Recreates firewall and status state for a running container.
    ///
    /// # Errors
    ///
    /// Returns an error if the network state cannot be rebuilt.
    fn reload(&self, container: &Container) -> Result<NetworkStatusMap>;

    /// Restarts the user-mode network relay for the given namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay cannot be started.
    fn setup_relay(&self, container: &Container, netns: &NetnsHandle) -> Result<()>;

    /// Restarts rootless port forwarding for the given namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the forwarder cannot be started.
    fn setup_rootless_port_forwarding(
        &self,
        container: &Container,
        netns: &NetnsHandle,
        status: &NetworkStatusMap,
    ) -> Result<()>;
}

/// Mounts and unmounts container root filesystems.
pub trait StorageBackend: Send + Sync {
    /// Mounts the container's root filesystem, returning the mount
    /// point.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be mounted.
    fn mount_root(&self, container: &Container) -> Result<PathBuf>;

    /// Unmounts the container's root filesystem, decrementing mount
    /// reference counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be unmounted.
    fn cleanup_root(&self, container: &Container) -> Result<()>;
}

/// View of another container sufficient for namespace sharing.
#[derive(Debug, Clone)]
pub struct SharedContainer {
    /// The container's identity.
    pub id: ContainerId,
    /// The container's effective hostname.
    pub hostname: String,
    /// PID of the container's init process, when running.
    pub init_pid: Option<u32>,
    /// Bind path of the container's network namespace, when created.
    pub netns_path: Option<PathBuf>,
}

impl SharedContainer {
    /// Resolves the live path of one of this container's namespaces.
    ///
    /// The network namespace prefers its bind path; every other kind
    /// requires a running init process.
    ///
    /// # Errors
    ///
    /// Returns an error if the container has no live namespace of the
    /// requested kind.
    pub fn namespace_path(&self, kind: NamespaceKind) -> Result<PathBuf> {
        if kind == NamespaceKind::Network {
            if let Some(path) = &self.netns_path {
                return Ok(path.clone());
            }
        }
        let pid = self.init_pid.ok_or_else(|| CradleError::InvalidState {
            message: format!(
                "container {} has no running process to share its {} namespace",
                self.id,
                kind.spec_name()
            ),
        })?;
        Ok(proc_ns_path(pid, kind))
    }
}

/// Looks up containers by ID for namespace sharing.
pub trait ContainerRegistry: Send + Sync {
    /// Retrieves a container's sharing view.
    ///
    /// # Errors
    ///
    /// Returns [`CradleError::NotFound`] if no container has this ID.
    fn container(&self, id: &ContainerId) -> Result<SharedContainer>;
}

/// Persists container state records.
pub trait StateStore: Send + Sync {
    /// Saves the container's current mutable state.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    fn save(&self, container: &Container) -> Result<()>;
}
