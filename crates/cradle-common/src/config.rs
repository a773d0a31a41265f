//! Global configuration model for the Cradle runtime.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::CgroupManager;

/// Root configuration for the Cradle runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CradleConfig {
    /// Base directory for Cradle state and data.
    pub data_dir: PathBuf,
    /// Cgroup manager backend for new containers.
    pub cgroup_manager: CgroupManager,
    /// Default cgroup parent for new containers, if any.
    pub cgroup_parent: Option<String>,
}

impl Default for CradleConfig {
    fn default() -> Self {
        Self {
            data_dir: crate::constants::data_dir().clone(),
            cgroup_manager: CgroupManager::Systemd,
            cgroup_parent: None,
        }
    }
}
