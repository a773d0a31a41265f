//! Concurrent acquisition of network and storage resources.
//!
//! `prepare` fans out network-namespace creation and storage mounting
//! as two worker threads, joins both, aggregates their errors, rolls
//! back partial successes, and persists the resulting state exactly
//! once. Callers hold the container-level lock; nothing here is safe
//! against concurrent calls on the same container.

use std::path::Path;

use cradle_common::error::{CradleError, Result};
use cradle_core::label::format_mount_label;
use cradle_core::mount::{mount_tmpfs, unmount};

use crate::backend::{NetworkBackend, StateStore, StorageBackend};
use crate::container::Container;

/// Owns the backends used to acquire and release sandbox resources.
pub struct Preparer {
    network: Box<dyn NetworkBackend>,
    storage: Box<dyn StorageBackend>,
    state: Box<dyn StateStore>,
    rootless: bool,
}

impl Preparer {
    /// Creates a preparer over the given collaborators.
    ///
    /// `rootless` is detected once by the caller and injected.
    #[must_use]
    pub fn new(
        network: Box<dyn NetworkBackend>,
        storage: Box<dyn StorageBackend>,
        state: Box<dyn StateStore>,
        rootless: bool,
    ) -> Self {
        Self {
            network,
            storage,
            state,
            rootless,
        }
    }

    /// Mounts the container's storage and sets up its network
    /// namespace, concurrently.
    ///
    /// The two units run as independent workers; their results are
    /// applied to container state sequentially once both resolve, so
    /// no lock is held across the backend I/O. Storage cleanup is
    /// triggered only when network setup failed while storage
    /// succeeded (anything else would corrupt mount reference
    /// counts); network cleanup is attempted on any error and is safe
    /// on an unconfigured network. On success the state is persisted
    /// exactly once.
    ///
    /// # Errors
    ///
    /// Returns the aggregated setup error; when both units fail the
    /// storage failure is surfaced. Cleanup failures are folded into
    /// the returned error.
    pub fn prepare(&self, container: &mut Container) -> Result<()> {
        let needs_netns = container.state.netns.is_none()
            && container.config.create_netns
            && !container.config.post_configure_netns;

        let shared: &Container = container;
        let (net_result, mount_result) = std::thread::scope(|s| {
            let net = s.spawn(|| {
                if needs_netns {
                    self.network.create_netns(shared).map(Some)
                } else {
                    Ok(None)
                }
            });
            let storage = s.spawn(|| self.storage.mount_root(shared));
            (join_worker(net), join_worker(storage))
        });

        let mut net_err = None;
        match net_result {
            Ok(Some((netns, status))) => {
                container.state.netns = Some(netns);
                container.state.network_status = status;
            }
            Ok(None) => {}
            Err(e) => net_err = Some(e),
        }

        let mut storage_err = None;
        match mount_result {
            Ok(mountpoint) => {
                container.state.mounted = true;
                tracing::debug!(
                    id = %container.id(),
                    mountpoint = %mountpoint.display(),
                    "created root filesystem"
                );
                container.state.mountpoint = Some(mountpoint);
            }
            Err(e) => storage_err = Some(e),
        }

        let net_failed = net_err.is_some();
        let storage_ok = storage_err.is_none();

        let mut create_err = net_err.map(|e| CradleError::ResourceSetup {
            resource: "network namespace",
            id: container.id().to_string(),
            source: Box::new(e),
        });
        if let Some(e) = storage_err {
            if let Some(prev) = &create_err {
                tracing::error!(id = %container.id(), error = %prev, "preparing container");
            }
            create_err = Some(CradleError::ResourceSetup {
                resource: "storage",
                id: container.id().to_string(),
                source: Box::new(e),
            });
        }

        // Only roll back storage when its mount completed; unmounting
        // a mount that never happened corrupts reference counts.
        if net_failed && storage_ok {
            if let Err(cleanup_err) = self.cleanup_storage(container) {
                if let Some(prev) = create_err.take() {
                    tracing::error!(id = %container.id(), error = %prev, "preparing container");
                    create_err = Some(CradleError::CleanupFailed {
                        primary: prev.to_string(),
                        cleanup: "unmounting storage after network create failure",
                        source: Box::new(cleanup_err),
                    });
                }
            }
        }

        // Network cleanup is idempotent and does nothing when the
        // network was never configured, so it runs on every error.
        if create_err.is_some() {
            if let Err(cleanup_err) = self.cleanup_network(container) {
                if let Some(prev) = create_err.take() {
                    tracing::error!(id = %container.id(), error = %prev, "preparing container");
                    create_err = Some(CradleError::CleanupFailed {
                        primary: prev.to_string(),
                        cleanup: "cleaning up network after setup failure",
                        source: Box::new(cleanup_err),
                    });
                }
            }
        }

        if let Some(e) = create_err {
            return Err(e);
        }

        self.state.save(container)
    }

    /// Unmounts the container root and clears mount state.
    fn cleanup_storage(&self, container: &mut Container) -> Result<()> {
        self.storage.cleanup_root(container)?;
        container.state.mounted = false;
        container.state.mountpoint = None;
        Ok(())
    }

    /// Tears down the container's network namespace, if it owns one.
    ///
    /// No-op when the namespace is shared from another container,
    /// networking is disabled, or no namespace is attached. Teardown
    /// errors are logged, never propagated — removal flows must not
    /// block on them. State is persisted only while the container is
    /// still registered.
    ///
    /// # Errors
    ///
    /// Returns an error only if persisting the cleared state fails.
    pub fn cleanup_network(&self, container: &mut Container) -> Result<()> {
        if container.config.shared_namespaces.network.is_some() {
            return Ok(());
        }
        if container.network_disabled() {
            return Ok(());
        }
        if container.state.netns.is_none() {
            tracing::debug!(id = %container.id(), "network is already cleaned up, skipping");
            return Ok(());
        }

        if let Err(e) = self.network.teardown_netns(container) {
            tracing::error!(id = %container.id(), error = %e, "unable to clean up network");
        }

        container.state.netns = None;
        container.state.network_status.clear();

        if container.valid {
            return self.state.save(container);
        }
        Ok(())
    }

    /// Recreates firewall and status state for a running container,
    /// replacing the stored network status.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend reload or the state save fails.
    pub fn reload_network(&self, container: &mut Container) -> Result<()> {
        let status = self.network.reload(container)?;
        container.state.network_status = status;
        self.state.save(container)
    }

    /// Re-establishes the user-mode relay and rootless port
    /// forwarding, both of which die with the supervising process.
    ///
    /// # Errors
    ///
    /// Returns an error if no namespace is attached or a helper cannot
    /// be started.
    pub fn setup_rootless_network(&self, container: &Container) -> Result<()> {
        if container.config.network_mode.is_relay() {
            let netns = attached_netns(container)?;
            self.network.setup_relay(container, netns)?;
        }

        if self.rootless
            && container.config.network_mode.is_bridge()
            && !container.config.port_mappings.is_empty()
        {
            let netns = attached_netns(container)?;
            self.network
                .setup_rootless_port_forwarding(container, netns, &container.state.network_status)?;
        }
        Ok(())
    }

    /// Mounts the container's /dev/shm tmpfs, sized from its
    /// configuration and labeled with the container's mount label.
    ///
    /// # Errors
    ///
    /// Returns an error if the mount syscall fails.
    pub fn mount_shm(&self, container: &Container) -> Result<()> {
        let options = format!("mode=1777,size={}", container.config.shm_size);
        let data = format_mount_label(&options, &container.config.mount_label);
        mount_tmpfs(&container.config.shm_dir, &data).map_err(|e| CradleError::ResourceSetup {
            resource: "shm tmpfs",
            id: container.id().to_string(),
            source: Box::new(e),
        })
    }

    /// Unmounts a shm mount, treating already-unmounted outcomes as
    /// success.
    ///
    /// # Errors
    ///
    /// Returns an error for any unmount failure other than "not
    /// mounted".
    pub fn unmount_shm(&self, container: &Container, mount: &Path) -> Result<()> {
        unmount(mount).map_err(|e| CradleError::ResourceSetup {
            resource: "shm tmpfs",
            id: container.id().to_string(),
            source: Box::new(e),
        })
    }
}

fn attached_netns(container: &Container) -> Result<&crate::backend::NetnsHandle> {
    container
        .state
        .netns
        .as_ref()
        .ok_or_else(|| CradleError::InvalidState {
            message: format!(
                "container {} has no network namespace attached",
                container.id()
            ),
        })
}

fn join_worker<T>(handle: std::thread::ScopedJoinHandle<'_, Result<T>>) -> Result<T> {
    handle.join().unwrap_or_else(|_| {
        Err(CradleError::InvalidState {
            message: "preparation worker panicked".into(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use cradle_common::types::{ContainerId, NetworkMode, PortMapping};

    use crate::backend::{NetnsHandle, NetworkStatusBlock, NetworkStatusMap};
    use crate::container::ContainerConfig;

    #[derive(Default)]
    struct FakeNetwork {
        fail_create: bool,
        creates: AtomicU32,
        teardowns: AtomicU32,
        relays: AtomicU32,
        port_forwards: AtomicU32,
    }

    impl NetworkBackend for FakeNetwork {
        fn create_netns(&self, _c: &Container) -> Result<(NetnsHandle, NetworkStatusMap)> {
            let _ = self.creates.fetch_add(1, Ordering::SeqCst);
            if self.fail_create {
                return Err(CradleError::Config {
                    message: "bridge unavailable".into(),
                });
            }
            let mut status = HashMap::new();
            let _ = status.insert(
                "primary".to_string(),
                NetworkStatusBlock {
                    interfaces: vec!["eth0".into()],
                    dns_servers: Vec::new(),
                },
            );
            Ok((NetnsHandle::new("/run/netns/test"), status))
        }

        fn teardown_netns(&self, _c: &Container) -> Result<()> {
            let _ = self.teardowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn reload(&self, _c: &Container) -> Result<NetworkStatusMap> {
            let mut status = HashMap::new();
            let _ = status.insert("primary".to_string(), NetworkStatusBlock::default());
            Ok(status)
        }

        fn setup_relay(&self, _c: &Container, _netns: &NetnsHandle) -> Result<()> {
            let _ = self.relays.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn setup_rootless_port_forwarding(
            &self,
            _c: &Container,
            _netns: &NetnsHandle,
            _status: &NetworkStatusMap,
        ) -> Result<()> {
            let _ = self.port_forwards.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeStorage {
        fail_mount: bool,
        mounts: AtomicU32,
        cleanups: AtomicU32,
    }

    impl StorageBackend for FakeStorage {
        fn mount_root(&self, _c: &Container) -> Result<PathBuf> {
            let _ = self.mounts.fetch_add(1, Ordering::SeqCst);
            if self.fail_mount {
                return Err(CradleError::Config {
                    message: "layer missing".into(),
                });
            }
            Ok(PathBuf::from("/var/lib/cradle/overlay/abc/merged"))
        }

        fn cleanup_root(&self, _c: &Container) -> Result<()> {
            let _ = self.cleanups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        saves: Mutex<Vec<String>>,
    }

    impl StateStore for RecordingStore {
        fn save(&self, c: &Container) -> Result<()> {
            self.saves.lock().unwrap().push(c.id().to_string());
            Ok(())
        }
    }

    impl NetworkBackend for std::sync::Arc<FakeNetwork> {
        fn create_netns(&self, c: &Container) -> Result<(NetnsHandle, NetworkStatusMap)> {
            self.as_ref().create_netns(c)
        }

        fn teardown_netns(&self, c: &Container) -> Result<()> {
            self.as_ref().teardown_netns(c)
        }

        fn reload(&self, c: &Container) -> Result<NetworkStatusMap> {
            self.as_ref().reload(c)
        }

        fn setup_relay(&self, c: &Container, netns: &NetnsHandle) -> Result<()> {
            self.as_ref().setup_relay(c, netns)
        }

        fn setup_rootless_port_forwarding(
            &self,
            c: &Container,
            netns: &NetnsHandle,
            status: &NetworkStatusMap,
        ) -> Result<()> {
            self.as_ref().setup_rootless_port_forwarding(c, netns, status)
        }
    }

    impl StorageBackend for std::sync::Arc<FakeStorage> {
        fn mount_root(&self, c: &Container) -> Result<PathBuf> {
            self.as_ref().mount_root(c)
        }

        fn cleanup_root(&self, c: &Container) -> Result<()> {
            self.as_ref().cleanup_root(c)
        }
    }

    impl StateStore for std::sync::Arc<RecordingStore> {
        fn save(&self, c: &Container) -> Result<()> {
            self.as_ref().save(c)
        }
    }

    struct Fixture {
        network: std::sync::Arc<FakeNetwork>,
        storage: std::sync::Arc<FakeStorage>,
        store: std::sync::Arc<RecordingStore>,
        preparer: Preparer,
    }

    fn fixture(fail_create: bool, fail_mount: bool) -> Fixture {
        let network = std::sync::Arc::new(FakeNetwork {
            fail_create,
            ..FakeNetwork::default()
        });
        let storage = std::sync::Arc::new(FakeStorage {
            fail_mount,
            ..FakeStorage::default()
        });
        let store = std::sync::Arc::new(RecordingStore::default());
        let preparer = Preparer::new(
            Box::new(network.clone()),
            Box::new(storage.clone()),
            Box::new(store.clone()),
            true,
        );
        Fixture {
            network,
            storage,
            store,
            preparer,
        }
    }

    fn container() -> Container {
        let mut config = ContainerConfig::new(ContainerId::new("abc"));
        config.create_netns = true;
        Container::new(config)
    }

    #[test]
    fn success_mounts_attaches_netns_and_persists_once() {
        let f = fixture(false, false);
        let mut c = container();
        f.preparer.prepare(&mut c).unwrap();

        assert!(c.state.mounted);
        assert!(c.state.mountpoint.is_some());
        assert!(c.state.netns.is_some());
        assert_eq!(c.state.network_status.len(), 1);
        assert_eq!(f.store.saves.lock().unwrap().len(), 1);
        assert_eq!(f.storage.cleanups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn network_failure_rolls_back_successful_mount_exactly_once() {
        let f = fixture(true, false);
        let mut c = container();
        let err = f.preparer.prepare(&mut c).unwrap_err();

        assert_eq!(f.storage.cleanups.load(Ordering::SeqCst), 1);
        assert!(!c.state.mounted);
        assert!(c.state.mountpoint.is_none());
        assert!(c.state.netns.is_none());
        assert!(err.to_string().contains("network namespace"));
    }

    #[test]
    fn storage_failure_surfaces_and_skips_storage_cleanup() {
        let f = fixture(false, true);
        let mut c = container();
        let err = f.preparer.prepare(&mut c).unwrap_err();

        assert_eq!(f.storage.cleanups.load(Ordering::SeqCst), 0);
        assert!(err.to_string().contains("storage"));
        // The successfully created namespace was torn back down.
        assert_eq!(f.network.teardowns.load(Ordering::SeqCst), 1);
        assert!(c.state.netns.is_none());
    }

    #[test]
    fn both_failing_surfaces_storage_error_without_storage_cleanup() {
        let f = fixture(true, true);
        let mut c = container();
        let err = f.preparer.prepare(&mut c).unwrap_err();

        assert!(err.to_string().contains("storage"));
        assert_eq!(f.storage.cleanups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn existing_namespace_is_not_recreated() {
        let f = fixture(false, false);
        let mut c = container();
        c.state.netns = Some(NetnsHandle::new("/run/netns/existing"));
        f.preparer.prepare(&mut c).unwrap();

        assert_eq!(f.network.creates.load(Ordering::SeqCst), 0);
        assert_eq!(
            c.state.netns,
            Some(NetnsHandle::new("/run/netns/existing"))
        );
    }

    #[test]
    fn deferred_network_setup_skips_creation() {
        let f = fixture(false, false);
        let mut c = container();
        c.config.post_configure_netns = true;
        f.preparer.prepare(&mut c).unwrap();
        assert_eq!(f.network.creates.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cleanup_network_is_noop_for_shared_namespace() {
        let f = fixture(false, false);
        let mut c = container();
        c.config.shared_namespaces.network = Some(ContainerId::new("peer"));
        c.state.netns = Some(NetnsHandle::new("/run/netns/peer"));
        f.preparer.cleanup_network(&mut c).unwrap();
        assert_eq!(f.network.teardowns.load(Ordering::SeqCst), 0);
        assert!(c.state.netns.is_some());
    }

    #[test]
    fn cleanup_network_is_noop_when_networking_disabled() {
        let f = fixture(false, false);
        let mut c = container();
        c.config.network_mode = NetworkMode::None;
        f.preparer.cleanup_network(&mut c).unwrap();
        assert_eq!(f.network.teardowns.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cleanup_network_is_noop_without_attached_namespace() {
        let f = fixture(false, false);
        let mut c = container();
        f.preparer.cleanup_network(&mut c).unwrap();
        assert_eq!(f.network.teardowns.load(Ordering::SeqCst), 0);
        assert!(f.store.saves.lock().unwrap().is_empty());
    }

    #[test]
    fn cleanup_network_clears_state_and_persists_when_valid() {
        let f = fixture(false, false);
        let mut c = container();
        c.state.netns = Some(NetnsHandle::new("/run/netns/test"));
        let _ = c.state.network_status.insert(
            "primary".to_string(),
            NetworkStatusBlock::default(),
        );
        f.preparer.cleanup_network(&mut c).unwrap();

        assert_eq!(f.network.teardowns.load(Ordering::SeqCst), 1);
        assert!(c.state.netns.is_none());
        assert!(c.state.network_status.is_empty());
        assert_eq!(f.store.saves.lock().unwrap().len(), 1);
    }

    #[test]
    fn cleanup_network_skips_persist_for_unregistered_container() {
        let f = fixture(false, false);
        let mut c = container();
        c.valid = false;
        c.state.netns = Some(NetnsHandle::new("/run/netns/test"));
        f.preparer.cleanup_network(&mut c).unwrap();
        assert!(f.store.saves.lock().unwrap().is_empty());
        assert!(c.state.netns.is_none());
    }

    #[test]
    fn reload_network_replaces_status_and_persists() {
        let f = fixture(false, false);
        let mut c = container();
        let _ = c.state.network_status.insert(
            "stale".to_string(),
            NetworkStatusBlock::default(),
        );
        f.preparer.reload_network(&mut c).unwrap();
        assert!(c.state.network_status.contains_key("primary"));
        assert!(!c.state.network_status.contains_key("stale"));
        assert_eq!(f.store.saves.lock().unwrap().len(), 1);
    }

    #[test]
    fn rootless_network_restarts_relay_and_port_forwarding() {
        let f = fixture(false, false);
        let mut c = container();
        c.config.network_mode = NetworkMode::Relay;
        c.state.netns = Some(NetnsHandle::new("/run/netns/test"));
        f.preparer.setup_rootless_network(&c).unwrap();
        assert_eq!(f.network.relays.load(Ordering::SeqCst), 1);
        assert_eq!(f.network.port_forwards.load(Ordering::SeqCst), 0);

        c.config.network_mode = NetworkMode::Bridge;
        c.config.port_mappings = vec![PortMapping {
            host_port: 8080,
            container_port: 80,
            protocol: "tcp".into(),
        }];
        f.preparer.setup_rootless_network(&c).unwrap();
        assert_eq!(f.network.port_forwards.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rootless_port_forwarding_requires_attached_namespace() {
        let f = fixture(false, false);
        let mut c = container();
        c.config.network_mode = NetworkMode::Bridge;
        c.config.port_mappings = vec![PortMapping {
            host_port: 8080,
            container_port: 80,
            protocol: "tcp".into(),
        }];
        assert!(f.preparer.setup_rootless_network(&c).is_err());
    }
}
