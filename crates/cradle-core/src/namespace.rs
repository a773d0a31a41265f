//! Namespace kinds and the per-kind creation decision.
//!
//! Each of a container's namespaces is either created fresh, joined
//! from another container, deferred to a post-configuration phase, or
//! inherited from the host. Exactly one decision exists per kind.

use std::path::PathBuf;

use cradle_common::types::ContainerId;
use serde::{Deserialize, Serialize};

/// Linux namespace kinds a container may isolate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamespaceKind {
    /// System V IPC and POSIX message queues.
    Ipc,
    /// Mount table.
    Mount,
    /// Network stack.
    Network,
    /// Process IDs.
    Pid,
    /// UID/GID mappings.
    User,
    /// Hostname and domain name.
    Uts,
    /// Cgroup root directory.
    Cgroup,
}

impl NamespaceKind {
    /// All namespace kinds, in the order they are applied to a spec.
    pub const ALL: [Self; 7] = [
        Self::Ipc,
        Self::Mount,
        Self::Network,
        Self::Pid,
        Self::User,
        Self::Uts,
        Self::Cgroup,
    ];

    /// Name of this namespace under `/proc/<pid>/ns/`.
    #[must_use]
    pub fn proc_name(self) -> &'static str {
        match self {
            Self::Ipc => "ipc",
            Self::Mount => "mnt",
            Self::Network => "net",
            Self::Pid => "pid",
            Self::User => "user",
            Self::Uts => "uts",
            Self::Cgroup => "cgroup",
        }
    }

    /// Name used for this namespace in the runtime spec.
    #[must_use]
    pub fn spec_name(self) -> &'static str {
        match self {
            Self::Ipc => "ipc",
            Self::Mount => "mount",
            Self::Network => "network",
            Self::Pid => "pid",
            Self::User => "user",
            Self::Uts => "uts",
            Self::Cgroup => "cgroup",
        }
    }
}

/// Where a container's namespace of a given kind comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceSource {
    /// Create a fresh namespace.
    CreateNew,
    /// Join the live namespace of another container.
    JoinContainer(ContainerId),
    /// Creation happens in a later configuration phase.
    DeferPostConfigure,
    /// Use the host's namespace unchanged.
    InheritHost,
}

/// The resolved decision for one namespace kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDecision {
    /// Namespace kind the decision applies to.
    pub kind: NamespaceKind,
    /// Resolved source.
    pub source: NamespaceSource,
}

/// Resolves the decision for one namespace kind.
///
/// A configured source container always wins; otherwise a kind marked
/// for creation is created now, or deferred when the caller asked for
/// post-configuration setup (only meaningful for the network
/// namespace). Everything else inherits the host.
#[must_use]
pub fn resolve(
    kind: NamespaceKind,
    joined: Option<&ContainerId>,
    create: bool,
    post_configure: bool,
) -> NamespaceDecision {
    let source = if let Some(id) = joined {
        NamespaceSource::JoinContainer(id.clone())
    } else if create && post_configure && kind == NamespaceKind::Network {
        NamespaceSource::DeferPostConfigure
    } else if create {
        NamespaceSource::CreateNew
    } else {
        NamespaceSource::InheritHost
    };
    NamespaceDecision { kind, source }
}

/// Path of a process's live namespace under `/proc`.
#[must_use]
pub fn proc_ns_path(pid: u32, kind: NamespaceKind) -> PathBuf {
    PathBuf::from(format!("/proc/{pid}/ns/{}", kind.proc_name()))
}
