//! # cradle-core
//!
//! Low-level sandbox decision primitives for the Cradle runtime.
//!
//! This crate provides the pure, independently testable leaves of
//! sandbox preparation:
//! - **Cgroups**: placement-path resolution across manager backends,
//!   rootless/rootful, and unified/legacy hierarchies.
//! - **Namespaces**: the per-kind create/join/defer/inherit decision model.
//! - **ID mappings**: in-namespace to host UID/GID translation and
//!   clamping to available host ranges.
//! - **Labels and ownership**: mandatory-access-control labeling and
//!   host-path chown helpers.
//! - **Mounts**: propagation option model, filesystem probes, and
//!   tolerant unmount.
//!
//! Ambient host state (rootless mode, hierarchy mode, own cgroup) is
//! detected once and injected through probe traits rather than queried
//! globally, keeping the decision functions pure.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cgroup;
pub mod idmap;
pub mod label;
pub mod mount;
pub mod namespace;
pub mod ownership;
