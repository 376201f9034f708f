//! Cluster description loading and management.
//!
//! The selector itself is handed a [`Topology`] and a partition list; this
//! module builds both from a YAML cluster description of the form:
//!
//! ```yaml
//! nodes:
//!   n01:
//!     sockets: 2
//!     cores_per_socket: 8
//!     threads_per_core: 2
//!     real_memory_mb: 65536
//!     gres:
//!       - { name: gpu, count: 4 }
//! partitions:
//!   batch:
//!     priority: 100
//!     num_rows: 1
//! ```
//!
//! Node indices follow the sorted node names, so the same file always
//! produces the same coremap layout regardless of YAML map ordering.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::gres::GresPool;
use crate::occupancy::Partition;
use crate::topology::{NodeRecord, Topology};

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
///
/// Kept private; callers work with [`ClusterConfigManager`] instead.
/// `BTreeMap` keeps node and partition ordering deterministic.
#[derive(Debug, Deserialize)]
struct ClusterFile {
    nodes: BTreeMap<String, NodeEntry>,
    #[serde(default)]
    partitions: BTreeMap<String, PartitionEntry>,
}

#[derive(Debug, Deserialize)]
struct NodeEntry {
    #[serde(default = "one")]
    sockets: u16,
    #[serde(default = "one")]
    cores_per_socket: u16,
    #[serde(default = "one")]
    threads_per_core: u16,
    #[serde(default)]
    real_memory_mb: u64,
    #[serde(default)]
    gres: Vec<GresPool>,
}

#[derive(Debug, Deserialize)]
struct PartitionEntry {
    #[serde(default)]
    priority: u32,
    #[serde(default = "one")]
    num_rows: u16,
}

/// Serde default for geometry fields: the smallest legal value.
fn one() -> u16 {
    1
}

// ── ClusterConfigManager ──────────────────────────────────────────────────────

/// Loads and holds the cluster description.
#[derive(Debug, Default)]
pub struct ClusterConfigManager {
    topology: Option<Topology>,
    partitions: Vec<Partition>,
}

impl ClusterConfigManager {
    /// Creates a new, empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `path` and (re)builds the topology and partition list.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, the YAML is invalid,
    /// no nodes are defined, or a node declares a zero geometry value.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        info!("Loading cluster description from: {}", path.display());

        self.topology = None;
        self.partitions.clear();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open cluster description: {}", path.display()))?;

        let file: ClusterFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        if file.nodes.is_empty() {
            bail!("cluster description defines no nodes");
        }

        let mut records = Vec::with_capacity(file.nodes.len());
        for (name, entry) in file.nodes {
            if entry.sockets == 0 || entry.cores_per_socket == 0 || entry.threads_per_core == 0 {
                bail!("node '{name}': sockets, cores and threads must all be at least 1");
            }
            debug!(
                node = %name,
                sockets = entry.sockets,
                cores_per_socket = entry.cores_per_socket,
                threads_per_core = entry.threads_per_core,
                memory_mb = entry.real_memory_mb,
                "  node"
            );
            records.push(NodeRecord {
                name,
                sockets: entry.sockets,
                cores_per_socket: entry.cores_per_socket,
                threads_per_core: entry.threads_per_core,
                real_memory: entry.real_memory_mb,
                gres: entry.gres,
            });
        }

        for (name, entry) in file.partitions {
            debug!(partition = %name, priority = entry.priority, num_rows = entry.num_rows, "  partition");
            self.partitions
                .push(Partition::new(name, entry.priority, entry.num_rows));
        }

        let topology = Topology::new(records);
        info!(
            nodes = topology.node_count(),
            cores = topology.total_cores(),
            partitions = self.partitions.len(),
            "Cluster description loaded"
        );
        self.topology = Some(topology);
        Ok(())
    }

    /// The loaded topology, or `None` before a successful load.
    pub fn topology(&self) -> Option<&Topology> {
        self.topology.as_ref()
    }

    /// The loaded partitions, sorted by name.
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// Returns `true` after a successful [`load_from_file`](Self::load_from_file).
    pub fn is_loaded(&self) -> bool {
        self.topology.is_some()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
