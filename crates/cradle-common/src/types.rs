//! Domain primitive types used across the Cradle workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a container instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random container ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a truncated form suitable for environment values that
    /// expect at most 32 characters.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(32)]
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a container.
///
/// Only `Configured` and `Unknown` precede the first start; several
/// idempotence guards in the ownership layer key off that initial phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerStatus {
    /// State could not be determined.
    Unknown,
    /// Container has been configured but no resources are allocated.
    Configured,
    /// Sandbox resources are allocated, process not yet started.
    Created,
    /// Container process is running.
    Running,
    /// Container has been stopped.
    Stopped,
    /// Container process has exited.
    Exited,
    /// Container is being removed.
    Removing,
}

impl ContainerStatus {
    /// Returns true while the container has not progressed past its
    /// initial creation-time phase.
    #[must_use]
    pub fn is_initial(self) -> bool {
        matches!(self, Self::Configured | Self::Unknown)
    }
}

impl Default for ContainerStatus {
    fn default() -> Self {
        Self::Configured
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Configured => write!(f, "configured"),
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Exited => write!(f, "exited"),
            Self::Removing => write!(f, "removing"),
        }
    }
}

/// Cgroup manager backend used for container placement.
///
/// Parsed from configuration; unrecognized manager names are preserved
/// so the placement rules can reject them with context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CgroupManager {
    /// Delegate cgroup creation to systemd (slice:prefix:name form).
    Systemd,
    /// Write cgroupfs paths directly.
    Cgroupfs,
    /// Unrecognized manager name carried through from configuration.
    #[serde(untagged)]
    Other(String),
}

impl fmt::Display for CgroupManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Systemd => write!(f, "systemd"),
            Self::Cgroupfs => write!(f, "cgroupfs"),
            Self::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Network mode the container was created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkMode {
    /// Bridge network managed by the network backend.
    Bridge,
    /// User-mode relay networking (no privileges required).
    Relay,
    /// Share the host's network namespace.
    Host,
    /// Networking disabled.
    None,
}

impl NetworkMode {
    /// Returns true for the user-mode relay.
    #[must_use]
    pub fn is_relay(&self) -> bool {
        matches!(self, Self::Relay)
    }

    /// Returns true for bridge networking.
    #[must_use]
    pub fn is_bridge(&self) -> bool {
        matches!(self, Self::Bridge)
    }
}

/// A single published port mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Port on the host.
    pub host_port: u16,
    /// Port inside the container.
    pub container_port: u16,
    /// Protocol ("tcp" or "udp").
    pub protocol: String,
}
