//! Mutable runtime-spec builder.
//!
//! Accumulates the namespace, mount, environment, mapping, and label
//! entries produced during sandbox preparation, then freezes into a
//! [`RuntimeSpec`]. Built once per preparation; on failure the builder
//! is discarded, so no partial-application rollback exists.

use std::path::PathBuf;

use cradle_core::idmap::IdMap;
use cradle_core::namespace::NamespaceKind;
use serde::{Deserialize, Serialize};

/// One mount entry in the spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecMount {
    /// Destination inside the container.
    pub destination: String,
    /// Filesystem type ("tmpfs", "bind", "cgroup").
    pub kind: String,
    /// Mount source.
    pub source: String,
    /// Ordered mount options.
    pub options: Vec<String>,
}

/// One namespace entry in the spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecNamespace {
    /// Namespace kind.
    pub kind: NamespaceKind,
    /// Path of an existing namespace to join; `None` creates a fresh
    /// one.
    pub path: Option<PathBuf>,
}

/// Accumulates spec fields during preparation.
#[derive(Debug, Clone, Default)]
pub struct SpecBuilder {
    env: Vec<String>,
    hostname: String,
    namespaces: Vec<SpecNamespace>,
    mounts: Vec<SpecMount>,
    cgroups_path: String,
    uid_mappings: Vec<IdMap>,
    gid_mappings: Vec<IdMap>,
    process_label: String,
    mount_label: String,
    masked_paths: Vec<String>,
    root_propagation: Option<String>,
}

impl SpecBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a process environment entry, replacing an existing entry
    /// with the same key.
    ///
    /// Callers that must not override a user-provided value check
    /// [`Self::env_defined`] first.
    pub fn add_env(&mut self, key: &str, value: &str) {
        let entry = format!("{key}={value}");
        if let Some(existing) = self
            .env
            .iter_mut()
            .find(|e| e.split_once('=').is_some_and(|(k, _)| k == key))
        {
            *existing = entry;
        } else {
            self.env.push(entry);
        }
    }

    /// Adds a raw `KEY=value` entry, replacing an existing entry with
    /// the same key. Entries without `=` are kept verbatim.
    pub fn add_env_entry(&mut self, entry: &str) {
        if let Some((key, value)) = entry.split_once('=') {
            self.add_env(key, value);
        } else {
            self.env.push(entry.to_string());
        }
    }

    /// Whether an environment variable is already defined.
    ///
    /// First definition wins; callers check before adding defaults.
    #[must_use]
    pub fn env_defined(&self, key: &str) -> bool {
        self.env
            .iter()
            .any(|e| e.split_once('=').is_some_and(|(k, _)| k == key))
    }

    /// The accumulated environment entries.
    #[must_use]
    pub fn env(&self) -> &[String] {
        &self.env
    }

    /// Sets the spec hostname. An empty string clears it.
    pub fn set_hostname(&mut self, hostname: &str) {
        self.hostname = hostname.to_string();
    }

    /// Adds a mount unless its destination is already claimed.
    ///
    /// Destinations are unique within one assembly; the first writer
    /// wins and later duplicates are skipped.
    pub fn add_mount(&mut self, mount: SpecMount) {
        if self.mount_exists(&mount.destination) {
            tracing::debug!(destination = %mount.destination, "mount destination already present, skipping");
            return;
        }
        self.mounts.push(mount);
    }

    /// Whether a mount with this destination is present.
    #[must_use]
    pub fn mount_exists(&self, destination: &str) -> bool {
        self.mounts.iter().any(|m| m.destination == destination)
    }

    /// Removes any mount at the given destination.
    pub fn remove_mount(&mut self, destination: &str) {
        self.mounts.retain(|m| m.destination != destination);
    }

    /// The accumulated mounts.
    #[must_use]
    pub fn mounts(&self) -> &[SpecMount] {
        &self.mounts
    }

    /// Adds a namespace entry, replacing an existing one of the same
    /// kind.
    pub fn add_or_replace_namespace(&mut self, kind: NamespaceKind, path: Option<PathBuf>) {
        self.namespaces.retain(|ns| ns.kind != kind);
        self.namespaces.push(SpecNamespace { kind, path });
    }

    /// The namespace entry of the given kind, if present.
    #[must_use]
    pub fn namespace(&self, kind: NamespaceKind) -> Option<&SpecNamespace> {
        self.namespaces.iter().find(|ns| ns.kind == kind)
    }

    /// The accumulated namespace entries.
    #[must_use]
    pub fn namespaces(&self) -> &[SpecNamespace] {
        &self.namespaces
    }

    /// Adds a UID mapping range.
    pub fn add_uid_mapping(&mut self, host_id: u32, container_id: u32, size: u32) {
        self.uid_mappings.push(IdMap {
            container_id,
            host_id,
            size,
        });
    }

    /// Adds a GID mapping range.
    pub fn add_gid_mapping(&mut self, host_id: u32, container_id: u32, size: u32) {
        self.gid_mappings.push(IdMap {
            container_id,
            host_id,
            size,
        });
    }

    /// The accumulated UID mappings.
    #[must_use]
    pub fn uid_mappings(&self) -> &[IdMap] {
        &self.uid_mappings
    }

    /// The accumulated GID mappings.
    #[must_use]
    pub fn gid_mappings(&self) -> &[IdMap] {
        &self.gid_mappings
    }

    /// Replaces the UID mapping list.
    pub fn set_uid_mappings(&mut self, mappings: Vec<IdMap>) {
        self.uid_mappings = mappings;
    }

    /// Replaces the GID mapping list.
    pub fn set_gid_mappings(&mut self, mappings: Vec<IdMap>) {
        self.gid_mappings = mappings;
    }

    /// Removes all UID mappings.
    pub fn clear_uid_mappings(&mut self) {
        self.uid_mappings.clear();
    }

    /// Removes all GID mappings.
    pub fn clear_gid_mappings(&mut self) {
        self.gid_mappings.clear();
    }

    /// Sets the cgroups path ("" when cgroups are disabled).
    pub fn set_cgroups_path(&mut self, path: &str) {
        self.cgroups_path = path.to_string();
    }

    /// Sets the SELinux process label.
    pub fn set_process_label(&mut self, label: &str) {
        self.process_label = label.to_string();
    }

    /// Sets the SELinux mount label.
    pub fn set_mount_label(&mut self, label: &str) {
        self.mount_label = label.to_string();
    }

    /// Masks a path inside the container.
    pub fn add_masked_path(&mut self, path: &str) {
        self.masked_paths.push(path.to_string());
    }

    /// Sets the root mount propagation.
    pub fn set_root_propagation(&mut self, propagation: &str) {
        self.root_propagation = Some(propagation.to_string());
    }

    /// Freezes the builder into an immutable spec.
    #[must_use]
    pub fn build(self) -> RuntimeSpec {
        RuntimeSpec {
            env: self.env,
            hostname: self.hostname,
            namespaces: self.namespaces,
            mounts: self.mounts,
            cgroups_path: self.cgroups_path,
            uid_mappings: self.uid_mappings,
            gid_mappings: self.gid_mappings,
            process_label: self.process_label,
            mount_label: self.mount_label,
            masked_paths: self.masked_paths,
            root_propagation: self.root_propagation,
        }
    }
}

/// The frozen runtime spec handed to the OCI runtime layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSpec {
    /// Process environment entries.
    pub env: Vec<String>,
    /// Spec hostname, empty when none may be set.
    pub hostname: String,
    /// Namespace entries.
    pub namespaces: Vec<SpecNamespace>,
    /// Mount entries.
    pub mounts: Vec<SpecMount>,
    /// Cgroups path, empty when cgroups are disabled.
    pub cgroups_path: String,
    /// UID mapping ranges.
    pub uid_mappings: Vec<IdMap>,
    /// GID mapping ranges.
    pub gid_mappings: Vec<IdMap>,
    /// SELinux process label.
    pub process_label: String,
    /// SELinux mount label.
    pub mount_label: String,
    /// Paths masked inside the container.
    pub masked_paths: Vec<String>,
    /// Root mount propagation, unset for the private default.
    pub root_propagation: Option<String>,
}
