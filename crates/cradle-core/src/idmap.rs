//! UID/GID mapping tables and translation to host IDs.

use cradle_common::error::{CradleError, Result};
use serde::{Deserialize, Serialize};

/// One contiguous UID or GID mapping range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMap {
    /// First ID inside the container namespace.
    pub container_id: u32,
    /// First ID on the host.
    pub host_id: u32,
    /// Number of IDs in the range.
    pub size: u32,
}

impl IdMap {
    /// Creates a mapping range.
    #[must_use]
    pub fn new(container_id: u32, host_id: u32, size: u32) -> Self {
        Self {
            container_id,
            host_id,
            size,
        }
    }
}

/// A container's full ID-mapping configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMappings {
    /// UID ranges.
    pub uid_map: Vec<IdMap>,
    /// GID ranges.
    pub gid_map: Vec<IdMap>,
    /// Allocate a private user namespace automatically.
    pub auto_userns: bool,
}

impl IdMappings {
    /// Whether a UID mapping table is configured.
    #[must_use]
    pub fn has_uid_map(&self) -> bool {
        !self.uid_map.is_empty()
    }

    /// Translates an in-namespace uid/gid pair to host IDs.
    ///
    /// # Errors
    ///
    /// Returns an error if either ID falls outside every configured
    /// range.
    pub fn to_host(&self, uid: u32, gid: u32) -> Result<(u32, u32)> {
        let host_uid = translate(&self.uid_map, uid);
        let host_gid = translate(&self.gid_map, gid);
        match (host_uid, host_gid) {
            (Some(u), Some(g)) => Ok((u, g)),
            _ => Err(CradleError::Config {
                message: format!("mapping user {uid}:{gid}: no mapping range covers it"),
            }),
        }
    }
}

fn translate(map: &[IdMap], id: u32) -> Option<u32> {
    map.iter()
        .find(|m| id >= m.container_id && id - m.container_id < m.size)
        .map(|m| m.host_id + (id - m.container_id))
}

/// One contiguous range of host IDs usable by the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    /// First usable ID.
    pub start: u32,
    /// Number of usable IDs.
    pub size: u32,
}

/// Probes the host ID ranges available to the current process.
///
/// Injected into spec assembly so the clamping step stays testable
/// with synthetic ranges.
pub trait IdRangeProbe: Send + Sync {
    /// Available host UID and GID ranges.
    ///
    /// # Errors
    ///
    /// Returns a not-found I/O error when the kernel does not support
    /// user namespaces; callers tolerate that outcome.
    fn available(&self) -> Result<(Vec<IdRange>, Vec<IdRange>)>;
}

/// Probe backed by `/proc/self/uid_map` and `gid_map`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostIdRangeProbe;

impl IdRangeProbe for HostIdRangeProbe {
    fn available(&self) -> Result<(Vec<IdRange>, Vec<IdRange>)> {
        available_host_ids()
    }
}

/// Reads the host UID and GID ranges available to the current process.
///
/// The kernel only provides `/proc/self/uid_map` and `gid_map` when
/// user namespaces are supported; callers treat a missing file as "not
/// supported" rather than fatal.
///
/// # Errors
///
/// Returns an I/O error if either file cannot be read or parsed.
pub fn available_host_ids() -> Result<(Vec<IdRange>, Vec<IdRange>)> {
    let uids = read_id_map_ranges("/proc/self/uid_map")?;
    let gids = read_id_map_ranges("/proc/self/gid_map")?;
    Ok((uids, gids))
}

fn read_id_map_ranges(path: &str) -> Result<Vec<IdRange>> {
    let content = std::fs::read_to_string(path).map_err(|e| CradleError::io(path, e))?;
    parse_id_map_ranges(&content).ok_or_else(|| CradleError::InvalidState {
        message: format!("malformed ID map in {path}"),
    })
}

/// Parses `/proc/<pid>/uid_map` content into available host ranges.
///
/// Each line is `<inside> <outside> <count>`; the IDs usable by this
/// process are the ones mapped into its namespace, identified by their
/// in-namespace value.
fn parse_id_map_ranges(content: &str) -> Option<Vec<IdRange>> {
    let mut ranges = Vec::new();
    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let inside: u32 = fields.next()?.parse().ok()?;
        let _outside: u32 = fields.next()?.parse().ok()?;
        let count: u32 = fields.next()?.parse().ok()?;
        ranges.push(IdRange {
            start: inside,
            size: count,
        });
    }
    ranges.sort_by_key(|r| r.start);
    Some(ranges)
}

/// Clamps mapping ranges to the host IDs actually available.
///
/// Each mapping is split into the sub-ranges whose host side lies
/// within the available ranges, preserving the container/host offset;
/// uncoverable remainders are dropped. Running the clamp on
/// already-clamped mappings is a no-op.
#[must_use]
pub fn clamp_to_available(mappings: &[IdMap], available: &[IdRange]) -> Vec<IdMap> {
    let mut out = Vec::new();
    for m in mappings {
        let m_start = u64::from(m.host_id);
        let m_end = m_start + u64::from(m.size);
        for a in available {
            let a_start = u64::from(a.start);
            let a_end = a_start + u64::from(a.size);
            let start = m_start.max(a_start);
            let end = m_end.min(a_end);
            if start < end {
                let shift = start - m_start;
                out.push(IdMap {
                    container_id: m.container_id + u32::try_from(shift).unwrap_or(u32::MAX),
                    host_id: u32::try_from(start).unwrap_or(u32::MAX),
                    size: u32::try_from(end - start).unwrap_or(u32::MAX),
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_host_translates_within_range() {
        let mappings = IdMappings {
            uid_map: vec![IdMap::new(0, 100_000, 65536)],
            gid_map: vec![IdMap::new(0, 200_000, 65536)],
            auto_userns: false,
        };
        assert_eq!(mappings.to_host(1000, 1000).unwrap(), (101_000, 201_000));
    }

    #[test]
    fn to_host_rejects_unmapped_id() {
        let mappings = IdMappings {
            uid_map: vec![IdMap::new(0, 100_000, 10)],
            gid_map: vec![IdMap::new(0, 200_000, 10)],
            auto_userns: false,
        };
        assert!(mappings.to_host(50, 0).is_err());
    }

    #[test]
    fn parse_id_map_handles_multiple_lines() {
        let ranges = parse_id_map_ranges("         0       1000          1\n         1     100000      65536\n")
            .unwrap();
        assert_eq!(
            ranges,
            vec![
                IdRange { start: 0, size: 1 },
                IdRange {
                    start: 1,
                    size: 65536
                }
            ]
        );
    }

    #[test]
    fn clamp_splits_mapping_across_available_ranges() {
        let mappings = vec![IdMap::new(0, 0, 20)];
        let available = vec![
            IdRange { start: 0, size: 5 },
            IdRange {
                start: 10,
                size: 10,
            },
        ];
        let clamped = clamp_to_available(&mappings, &available);
        assert_eq!(
            clamped,
            vec![IdMap::new(0, 0, 5), IdMap::new(10, 10, 10)]
        );
    }

    #[test]
    fn clamp_is_idempotent() {
        let mappings = vec![IdMap::new(0, 1000, 100), IdMap::new(500, 5000, 50)];
        let available = vec![
            IdRange {
                start: 1000,
                size: 60,
            },
            IdRange {
                start: 5000,
                size: 50,
            },
        ];
        let once = clamp_to_available(&mappings, &available);
        let twice = clamp_to_available(&once, &available);
        assert_eq!(once, twice);
    }

    #[test]
    fn clamp_drops_uncovered_mapping() {
        let mappings = vec![IdMap::new(0, 9_000_000, 10)];
        let available = vec![IdRange { start: 0, size: 100 }];
        assert!(clamp_to_available(&mappings, &available).is_empty());
    }
}
