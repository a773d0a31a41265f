//! Runtime-spec assembly pipeline.
//!
//! An ordered sequence of fallible steps mutates one [`SpecBuilder`]:
//! namespace entries, systemd-compatibility mounts, shared namespaces,
//! root mount propagation, labels, and the cgroups path. The pipeline
//! short-circuits on the first error and the builder is discarded.

use std::path::Path;

use cradle_common::error::{CradleError, Result};
use cradle_core::cgroup::{CgroupPlacement, CgroupProbe, resolve_cgroup_path};
use cradle_core::idmap::{IdRangeProbe, clamp_to_available};
use cradle_core::mount::{
    FsProbe, MOUNT_RSHARED, MOUNT_RSLAVE, MOUNT_SHARED, MOUNT_SLAVE,
};
use cradle_core::namespace::{NamespaceKind, NamespaceSource, resolve};

use crate::backend::ContainerRegistry;
use crate::container::Container;
use crate::spec::{RuntimeSpec, SpecBuilder, SpecMount};

/// Destinations that an init-style payload expects on tmpfs.
const SYSTEMD_TMPFS_RUN: [&str; 2] = ["/run", "/run/lock"];
const SYSTEMD_TMPFS_STATE: [&str; 2] = ["/tmp", "/var/log/journal"];

/// Assembles the runtime spec for one prepared container.
pub struct Assembler<'a> {
    container: &'a Container,
    registry: &'a dyn ContainerRegistry,
    cgroups: &'a dyn CgroupProbe,
    fs: &'a dyn FsProbe,
    ids: &'a dyn IdRangeProbe,
    rootless: bool,
}

impl<'a> Assembler<'a> {
    /// Creates an assembler over the given container and collaborators.
    #[must_use]
    pub fn new(
        container: &'a Container,
        registry: &'a dyn ContainerRegistry,
        cgroups: &'a dyn CgroupProbe,
        fs: &'a dyn FsProbe,
        ids: &'a dyn IdRangeProbe,
        rootless: bool,
    ) -> Self {
        Self {
            container,
            registry,
            cgroups,
            fs,
            ids,
            rootless,
        }
    }

    /// Runs the full assembly pipeline and freezes the result.
    ///
    /// # Errors
    ///
    /// Returns the first step error; the partially built spec is
    /// discarded.
    pub fn assemble(&self) -> Result<RuntimeSpec> {
        let mut b = SpecBuilder::new();
        self.seed(&mut b);
        self.add_network_namespace(&mut b)?;
        self.add_systemd_mounts(&mut b)?;
        self.add_shared_namespaces(&mut b)?;
        self.add_root_propagation(&mut b);
        b.set_process_label(&self.container.config.process_label);
        b.set_mount_label(&self.container.config.mount_label);
        self.set_cgroups_path(&mut b)?;
        Ok(b.build())
    }

    /// Seeds the builder with user-specified environment and mounts
    /// plus the container's freshly created namespaces.
    fn seed(&self, b: &mut SpecBuilder) {
        for entry in &self.container.config.env {
            b.add_env_entry(entry);
        }
        for mount in &self.container.config.mounts {
            b.add_mount(mount.clone());
        }
        let sharing = &self.container.config.shared_namespaces;
        for &kind in &self.container.config.isolate_namespaces {
            if kind == NamespaceKind::Network {
                continue;
            }
            let decision = resolve(kind, sharing.get(kind), true, false);
            if decision.source == NamespaceSource::CreateNew {
                b.add_or_replace_namespace(kind, None);
            }
        }
    }

    /// Adds the network namespace entry.
    ///
    /// A deferred namespace gets a pathless entry filled in by a later
    /// configuration phase; otherwise the entry points at the
    /// namespace created during preparation.
    fn add_network_namespace(&self, b: &mut SpecBuilder) -> Result<()> {
        let config = &self.container.config;
        if !config.create_netns {
            return Ok(());
        }
        if config.post_configure_netns {
            b.add_or_replace_namespace(NamespaceKind::Network, None);
            return Ok(());
        }
        let netns = self
            .container
            .state
            .netns
            .as_ref()
            .ok_or_else(|| CradleError::InvalidState {
                message: format!(
                    "container {} has no network namespace to reference",
                    self.container.id()
                ),
            })?;
        b.add_or_replace_namespace(NamespaceKind::Network, Some(netns.path().to_path_buf()));
        Ok(())
    }

    /// Adds the mounts an init-style payload expects, when the
    /// container is marked to run one.
    fn add_systemd_mounts(&self, b: &mut SpecBuilder) -> Result<()> {
        if self.container.config.systemd {
            self.setup_systemd(b)?;
        }
        Ok(())
    }

    /// systemd expects /run, /run/lock and /tmp on tmpfs, and needs
    /// a writable cgroup mount matching the host hierarchy mode.
    fn setup_systemd(&self, b: &mut SpecBuilder) -> Result<()> {
        if !b.env_defined("container_uuid") {
            b.add_env("container_uuid", self.container.id().short());
        }

        let options = ["rw", "rprivate", "nosuid", "nodev", "tmpcopyup"];
        for dest in SYSTEMD_TMPFS_RUN.iter().chain(SYSTEMD_TMPFS_STATE.iter()) {
            if b.mount_exists(dest) {
                continue;
            }
            b.add_mount(SpecMount {
                destination: (*dest).to_string(),
                kind: "tmpfs".into(),
                source: "tmpfs".into(),
                options: options.iter().map(ToString::to_string).collect(),
            });
        }

        let unified = self.cgroups.unified()?;
        if unified {
            b.remove_mount(cradle_common::constants::CGROUP_MOUNT_POINT);

            let has_cgroup_ns = b.namespace(NamespaceKind::Cgroup).is_some();
            let mount = if has_cgroup_ns {
                SpecMount {
                    destination: cradle_common::constants::CGROUP_MOUNT_POINT.into(),
                    kind: "cgroup".into(),
                    source: "cgroup".into(),
                    options: vec!["private".into(), "rw".into()],
                }
            } else {
                SpecMount {
                    destination: cradle_common::constants::CGROUP_MOUNT_POINT.into(),
                    kind: "bind".into(),
                    source: cradle_common::constants::CGROUP_MOUNT_POINT.into(),
                    options: vec!["bind".into(), "private".into(), "rw".into()],
                }
            };
            b.add_mount(mount);
        } else {
            let mut options = vec!["bind".to_string(), "rprivate".to_string()];
            let source = cradle_common::constants::SYSTEMD_CGROUP_V1_PATH;
            match self.fs.option_flags(Path::new(source)) {
                Ok(flags) => options.extend(flags.to_options()),
                Err(_) => {
                    // Probe failure falls back to the restrictive set.
                    options.extend(["nodev".into(), "noexec".into(), "nosuid".into()]);
                }
            }
            b.add_mount(SpecMount {
                destination: source.into(),
                kind: "bind".into(),
                source: source.into(),
                options,
            });
            b.add_masked_path(cradle_common::constants::SYSTEMD_RELEASE_AGENT_PATH);
        }
        Ok(())
    }

    /// Records a join of another container's namespace.
    ///
    /// Joining a UTS namespace cannot set an independent hostname, so
    /// the other container's hostname is exported through `HOSTNAME`
    /// instead.
    fn add_namespace_container(
        &self,
        b: &mut SpecBuilder,
        kind: NamespaceKind,
        other: &cradle_common::types::ContainerId,
    ) -> Result<()> {
        let shared = self.registry.container(other)?;

        if kind == NamespaceKind::Uts {
            b.set_hostname("");
            b.add_env("HOSTNAME", &shared.hostname);
        }

        let path = shared.namespace_path(kind)?;
        b.add_or_replace_namespace(kind, Some(path));
        Ok(())
    }

    /// Applies all configured namespace joins, mapping clamps, and
    /// hostname handling.
    fn add_shared_namespaces(&self, b: &mut SpecBuilder) -> Result<()> {
        let sharing = &self.container.config.shared_namespaces;

        for kind in [
            NamespaceKind::Ipc,
            NamespaceKind::Mount,
            NamespaceKind::Network,
            NamespaceKind::Pid,
        ] {
            if let Some(other) = sharing.get(kind) {
                self.add_namespace_container(b, kind, other)?;
            }
        }

        if let Some(other) = &sharing.user {
            self.add_namespace_container(b, NamespaceKind::User, other)?;
            if b.uid_mappings().is_empty() {
                // The runtime rejects a user namespace carrying zero
                // mappings, even on a join.
                b.add_uid_mapping(0, 0, 1);
                b.add_gid_mapping(0, 0, 1);
            }
        }

        match self.ids.available() {
            Ok((available_uids, available_gids)) => {
                let uids = clamp_to_available(b.uid_mappings(), &available_uids);
                b.set_uid_mappings(uids);
                let gids = clamp_to_available(b.gid_mappings(), &available_gids);
                b.set_gid_mappings(gids);
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(error = %e, "user or group ID mappings not available");
            }
            Err(e) => return Err(e),
        }

        // With a private UTS namespace the hostname goes on the spec;
        // otherwise export the host's hostname through HOSTNAME unless
        // the user already defined it.
        let mut hostname = self.container.hostname();
        let private_uts = b
            .namespaces()
            .iter()
            .any(|ns| ns.kind == NamespaceKind::Uts && ns.path.is_none());
        if private_uts {
            b.set_hostname(&hostname);
        } else {
            hostname = host_hostname()?;
        }
        if !b.env_defined("HOSTNAME") {
            b.add_env("HOSTNAME", &hostname);
        }

        if let Some(other) = &sharing.uts {
            self.add_namespace_container(b, NamespaceKind::Uts, other)?;
        }
        if let Some(other) = &sharing.cgroup {
            self.add_namespace_container(b, NamespaceKind::Cgroup, other)?;
        }

        let mappings = &self.container.config.id_mappings;
        if sharing.user.is_none() && mappings.auto_userns {
            b.add_or_replace_namespace(NamespaceKind::User, None);
            b.clear_uid_mappings();
            for m in &mappings.uid_map {
                b.add_uid_mapping(m.host_id, m.container_id, m.size);
            }
            b.clear_gid_mappings();
            for m in &mappings.gid_map {
                b.add_gid_mapping(m.host_id, m.container_id, m.size);
            }
        }
        Ok(())
    }

    /// Infers root mount propagation from the assembled mounts.
    fn add_root_propagation(&self, b: &mut SpecBuilder) {
        if let Some(propagation) = infer_root_propagation(b.mounts()) {
            tracing::debug!(propagation, "set root propagation");
            b.set_root_propagation(propagation);
        }
    }

    /// Resolves and records the cgroups path.
    fn set_cgroups_path(&self, b: &mut SpecBuilder) -> Result<()> {
        let config = &self.container.config;
        let unified = self.cgroups.unified()?;
        let placement = CgroupPlacement {
            cgroups_disabled: config.no_cgroups,
            split: config.cgroup_split,
            manager: &config.cgroup_manager,
            rootless: self.rootless,
            unified,
            parent: config.cgroup_parent.as_deref(),
            id: self.container.id(),
        };
        let path = resolve_cgroup_path(&placement, self.cgroups)?;
        b.set_cgroups_path(&path);
        Ok(())
    }
}

/// Picks the strongest propagation requested by any mount option.
///
/// `shared` beats `rslave`; the private default stays unset. Strength
/// decides, not encounter order.
fn infer_root_propagation(mounts: &[SpecMount]) -> Option<&'static str> {
    let mut propagation = None;
    for mount in mounts {
        for option in &mount.options {
            match option.as_str() {
                MOUNT_SHARED | MOUNT_RSHARED => propagation = Some(MOUNT_SHARED),
                MOUNT_SLAVE | MOUNT_RSLAVE => {
                    if propagation.is_none() {
                        propagation = Some(MOUNT_RSLAVE);
                    }
                }
                _ => {}
            }
        }
    }
    propagation
}

/// The host's own hostname.
fn host_hostname() -> Result<String> {
    let hostname = nix::unistd::gethostname().map_err(|e| CradleError::Io {
        path: "/proc/sys/kernel/hostname".into(),
        source: e.into(),
    })?;
    Ok(hostname.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    use cradle_common::types::{CgroupManager, ContainerId};
    use cradle_core::idmap::{IdMap, IdRange};
    use cradle_core::mount::FsOptionFlags;

    use crate::backend::{NetnsHandle, SharedContainer};
    use crate::container::ContainerConfig;

    struct FakeRegistry {
        containers: HashMap<String, SharedContainer>,
    }

    impl FakeRegistry {
        fn empty() -> Self {
            Self {
                containers: HashMap::new(),
            }
        }

        fn with(shared: SharedContainer) -> Self {
            let mut containers = HashMap::new();
            let _ = containers.insert(shared.id.as_str().to_string(), shared);
            Self { containers }
        }
    }

    impl ContainerRegistry for FakeRegistry {
        fn container(&self, id: &ContainerId) -> Result<SharedContainer> {
            self.containers
                .get(id.as_str())
                .cloned()
                .ok_or(CradleError::NotFound {
                    kind: "container",
                    id: id.to_string(),
                })
        }
    }

    struct FakeCgroups {
        unified: bool,
    }

    impl CgroupProbe for FakeCgroups {
        fn unified(&self) -> Result<bool> {
            Ok(self.unified)
        }

        fn own_cgroup(&self) -> Result<String> {
            Ok("/user.slice/session-1.scope".into())
        }
    }

    struct FakeFs {
        flags: Result<FsOptionFlags>,
    }

    impl FsProbe for FakeFs {
        fn option_flags(&self, _path: &Path) -> Result<FsOptionFlags> {
            match &self.flags {
                Ok(flags) => Ok(*flags),
                Err(_) => Err(CradleError::Config {
                    message: "statvfs unavailable".into(),
                }),
            }
        }
    }

    struct FakeIds {
        outcome: IdOutcome,
    }

    enum IdOutcome {
        Ranges(Vec<IdRange>, Vec<IdRange>),
        NotSupported,
        Fatal,
    }

    impl IdRangeProbe for FakeIds {
        fn available(&self) -> Result<(Vec<IdRange>, Vec<IdRange>)> {
            match &self.outcome {
                IdOutcome::Ranges(uids, gids) => Ok((uids.clone(), gids.clone())),
                IdOutcome::NotSupported => Err(CradleError::io(
                    "/proc/self/uid_map",
                    std::io::Error::from(std::io::ErrorKind::NotFound),
                )),
                IdOutcome::Fatal => Err(CradleError::Config {
                    message: "broken probe".into(),
                }),
            }
        }
    }

    struct Fixture {
        container: Container,
        registry: FakeRegistry,
        cgroups: FakeCgroups,
        fs: FakeFs,
        ids: FakeIds,
        rootless: bool,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                container: Container::new(ContainerConfig::new(ContainerId::new(
                    "0123456789abcdef0123456789abcdefdeadbeef",
                ))),
                registry: FakeRegistry::empty(),
                cgroups: FakeCgroups { unified: true },
                fs: FakeFs {
                    flags: Ok(FsOptionFlags::default()),
                },
                ids: FakeIds {
                    outcome: IdOutcome::NotSupported,
                },
                rootless: false,
            }
        }

        fn assemble(&self) -> Result<RuntimeSpec> {
            Assembler::new(
                &self.container,
                &self.registry,
                &self.cgroups,
                &self.fs,
                &self.ids,
                self.rootless,
            )
            .assemble()
        }
    }

    fn peer(id: &str) -> SharedContainer {
        SharedContainer {
            id: ContainerId::new(id),
            hostname: format!("{id}-host"),
            init_pid: Some(4242),
            netns_path: Some(PathBuf::from("/run/netns/peer")),
        }
    }

    #[test]
    fn systemd_unified_with_cgroup_namespace_uses_cgroup_mount() {
        let mut f = Fixture::new();
        f.container.config.systemd = true;
        f.container.config.isolate_namespaces = vec![NamespaceKind::Cgroup];
        let spec = f.assemble().unwrap();
        let mount = spec
            .mounts
            .iter()
            .find(|m| m.destination == "/sys/fs/cgroup")
            .unwrap();
        assert_eq!(mount.kind, "cgroup");
        assert_eq!(mount.options, ["private", "rw"]);
    }

    #[test]
    fn systemd_unified_without_cgroup_namespace_bind_mounts_host() {
        let mut f = Fixture::new();
        f.container.config.systemd = true;
        let spec = f.assemble().unwrap();
        let mount = spec
            .mounts
            .iter()
            .find(|m| m.destination == "/sys/fs/cgroup")
            .unwrap();
        assert_eq!(mount.kind, "bind");
        assert_eq!(mount.source, "/sys/fs/cgroup");
        assert_eq!(mount.options, ["bind", "private", "rw"]);
    }

    #[test]
    fn systemd_legacy_copies_probed_flags() {
        let mut f = Fixture::new();
        f.container.config.systemd = true;
        f.cgroups.unified = false;
        f.fs.flags = Ok(FsOptionFlags {
            nodev: true,
            noexec: false,
            nosuid: true,
            readonly: true,
        });
        let spec = f.assemble().unwrap();
        let mount = spec
            .mounts
            .iter()
            .find(|m| m.destination == "/sys/fs/cgroup/systemd")
            .unwrap();
        assert_eq!(mount.options, ["bind", "rprivate", "nodev", "nosuid", "ro"]);
        assert!(
            spec.masked_paths
                .contains(&"/sys/fs/cgroup/systemd/release_agent".to_string())
        );
    }

    #[test]
    fn systemd_legacy_probe_failure_falls_back_to_restrictive_flags() {
        let mut f = Fixture::new();
        f.container.config.systemd = true;
        f.cgroups.unified = false;
        f.fs.flags = Err(CradleError::Config {
            message: "statvfs unavailable".into(),
        });
        let spec = f.assemble().unwrap();
        let mount = spec
            .mounts
            .iter()
            .find(|m| m.destination == "/sys/fs/cgroup/systemd")
            .unwrap();
        assert_eq!(
            mount.options,
            ["bind", "rprivate", "nodev", "noexec", "nosuid"]
        );
    }

    #[test]
    fn systemd_tmpfs_skips_user_claimed_destination() {
        let mut f = Fixture::new();
        f.container.config.systemd = true;
        f.container.config.mounts = vec![SpecMount {
            destination: "/tmp".into(),
            kind: "bind".into(),
            source: "/scratch".into(),
            options: vec!["rw".into()],
        }];
        let spec = f.assemble().unwrap();
        let tmp = spec
            .mounts
            .iter()
            .find(|m| m.destination == "/tmp")
            .unwrap();
        assert_eq!(tmp.source, "/scratch");
        assert!(spec.mounts.iter().any(|m| m.destination == "/run"));
        assert!(spec.mounts.iter().any(|m| m.destination == "/var/log/journal"));
    }

    #[test]
    fn systemd_sets_container_uuid_unless_user_defined() {
        let mut f = Fixture::new();
        f.container.config.systemd = true;
        let spec = f.assemble().unwrap();
        assert!(spec.env.iter().any(|e| {
            e == &format!(
                "container_uuid={}",
                &"0123456789abcdef0123456789abcdefdeadbeef"[..32]
            )
        }));

        let mut f = Fixture::new();
        f.container.config.systemd = true;
        f.container.config.env = vec!["container_uuid=user-chose-this".into()];
        let spec = f.assemble().unwrap();
        assert!(spec.env.contains(&"container_uuid=user-chose-this".to_string()));
    }

    #[test]
    fn user_join_with_zero_mappings_injects_identity_mapping() {
        let mut f = Fixture::new();
        f.registry = FakeRegistry::with(peer("other"));
        f.container.config.shared_namespaces.user = Some(ContainerId::new("other"));
        let spec = f.assemble().unwrap();
        assert_eq!(spec.uid_mappings, vec![IdMap::new(0, 0, 1)]);
        assert_eq!(spec.gid_mappings, vec![IdMap::new(0, 0, 1)]);
    }

    #[test]
    fn uts_join_exports_peer_hostname_env() {
        let mut f = Fixture::new();
        f.registry = FakeRegistry::with(peer("other"));
        f.container.config.shared_namespaces.uts = Some(ContainerId::new("other"));
        let spec = f.assemble().unwrap();
        assert_eq!(spec.hostname, "");
        assert!(spec.env.contains(&"HOSTNAME=other-host".to_string()));
        let uts = spec
            .namespaces
            .iter()
            .find(|ns| ns.kind == NamespaceKind::Uts)
            .unwrap();
        assert_eq!(uts.path, Some(PathBuf::from("/proc/4242/ns/uts")));
    }

    #[test]
    fn join_of_missing_container_is_not_found() {
        let mut f = Fixture::new();
        f.container.config.shared_namespaces.ipc = Some(ContainerId::new("ghost"));
        let err = f.assemble().unwrap_err();
        assert!(matches!(err, CradleError::NotFound { .. }));
    }

    #[test]
    fn private_uts_namespace_sets_spec_hostname() {
        let mut f = Fixture::new();
        f.container.config.isolate_namespaces = vec![NamespaceKind::Uts];
        f.container.config.hostname = Some("web-1".into());
        let spec = f.assemble().unwrap();
        assert_eq!(spec.hostname, "web-1");
        assert!(spec.env.contains(&"HOSTNAME=web-1".to_string()));
    }

    #[test]
    fn user_defined_hostname_env_wins() {
        let mut f = Fixture::new();
        f.container.config.isolate_namespaces = vec![NamespaceKind::Uts];
        f.container.config.hostname = Some("web-1".into());
        f.container.config.env = vec!["HOSTNAME=custom".into()];
        let spec = f.assemble().unwrap();
        assert!(spec.env.contains(&"HOSTNAME=custom".to_string()));
        assert!(!spec.env.contains(&"HOSTNAME=web-1".to_string()));
    }

    #[test]
    fn without_uts_namespace_hostname_stays_off_spec() {
        let f = Fixture::new();
        let spec = f.assemble().unwrap();
        assert_eq!(spec.hostname, "");
        assert!(spec.env.iter().any(|e| e.starts_with("HOSTNAME=")));
    }

    #[test]
    fn mapping_clamp_applies_available_ranges() {
        let mut f = Fixture::new();
        f.registry = FakeRegistry::with(peer("other"));
        f.container.config.shared_namespaces.user = Some(ContainerId::new("other"));
        f.ids.outcome = IdOutcome::Ranges(
            vec![IdRange { start: 0, size: 1 }],
            vec![IdRange { start: 0, size: 1 }],
        );
        let spec = f.assemble().unwrap();
        assert_eq!(spec.uid_mappings, vec![IdMap::new(0, 0, 1)]);
    }

    #[test]
    fn mapping_probe_fatal_error_propagates() {
        let mut f = Fixture::new();
        f.ids.outcome = IdOutcome::Fatal;
        assert!(f.assemble().is_err());
    }

    #[test]
    fn auto_userns_copies_configured_mappings_verbatim() {
        let mut f = Fixture::new();
        f.container.config.id_mappings.auto_userns = true;
        f.container.config.id_mappings.uid_map = vec![IdMap::new(0, 100_000, 65536)];
        f.container.config.id_mappings.gid_map = vec![IdMap::new(0, 200_000, 65536)];
        let spec = f.assemble().unwrap();
        let user = spec
            .namespaces
            .iter()
            .find(|ns| ns.kind == NamespaceKind::User)
            .unwrap();
        assert_eq!(user.path, None);
        assert_eq!(spec.uid_mappings, vec![IdMap::new(0, 100_000, 65536)]);
        assert_eq!(spec.gid_mappings, vec![IdMap::new(0, 200_000, 65536)]);
    }

    #[test]
    fn root_propagation_shared_beats_slave_in_any_order() {
        for options in [["shared", "slave"], ["slave", "shared"]] {
            let mounts: Vec<SpecMount> = options
                .iter()
                .map(|opt| SpecMount {
                    destination: format!("/{opt}"),
                    kind: "bind".into(),
                    source: "/src".into(),
                    options: vec![(*opt).to_string()],
                })
                .collect();
            assert_eq!(infer_root_propagation(&mounts), Some(MOUNT_SHARED));
        }
    }

    #[test]
    fn root_propagation_slave_alone_yields_rslave() {
        let mounts = vec![SpecMount {
            destination: "/v".into(),
            kind: "bind".into(),
            source: "/src".into(),
            options: vec!["rslave".into()],
        }];
        assert_eq!(infer_root_propagation(&mounts), Some(MOUNT_RSLAVE));
    }

    #[test]
    fn root_propagation_defaults_to_unset() {
        let mounts = vec![SpecMount {
            destination: "/v".into(),
            kind: "bind".into(),
            source: "/src".into(),
            options: vec!["rw".into(), "private".into()],
        }];
        assert_eq!(infer_root_propagation(&mounts), None);
        let f = Fixture::new();
        assert!(f.assemble().unwrap().root_propagation.is_none());
    }

    #[test]
    fn cgroups_path_lands_on_spec() {
        let mut f = Fixture::new();
        f.container.config.cgroup_manager = CgroupManager::Systemd;
        let spec = f.assemble().unwrap();
        assert_eq!(
            spec.cgroups_path,
            format!(
                "machine.slice:libpod:{}",
                "0123456789abcdef0123456789abcdefdeadbeef"
            )
        );
    }

    #[test]
    fn disabled_cgroups_produce_empty_path() {
        let mut f = Fixture::new();
        f.container.config.no_cgroups = true;
        let spec = f.assemble().unwrap();
        assert_eq!(spec.cgroups_path, "");
    }

    #[test]
    fn network_namespace_entry_references_prepared_namespace() {
        let mut f = Fixture::new();
        f.container.config.create_netns = true;
        f.container.state.netns = Some(NetnsHandle::new("/run/netns/cradle-x"));
        let spec = f.assemble().unwrap();
        let net = spec
            .namespaces
            .iter()
            .find(|ns| ns.kind == NamespaceKind::Network)
            .unwrap();
        assert_eq!(net.path, Some(PathBuf::from("/run/netns/cradle-x")));
    }

    #[test]
    fn deferred_network_namespace_has_no_path() {
        let mut f = Fixture::new();
        f.container.config.create_netns = true;
        f.container.config.post_configure_netns = true;
        let spec = f.assemble().unwrap();
        let net = spec
            .namespaces
            .iter()
            .find(|ns| ns.kind == NamespaceKind::Network)
            .unwrap();
        assert_eq!(net.path, None);
    }

    #[test]
    fn labels_are_carried_onto_spec() {
        let mut f = Fixture::new();
        f.container.config.process_label = "system_u:system_r:container_t:s0:c1,c2".into();
        f.container.config.mount_label = "system_u:object_r:container_file_t:s0:c1,c2".into();
        let spec = f.assemble().unwrap();
        assert_eq!(spec.process_label, "system_u:system_r:container_t:s0:c1,c2");
        assert_eq!(
            spec.mount_label,
            "system_u:object_r:container_file_t:s0:c1,c2"
        );
    }
}
