/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Cluster hardware topology and the coremap index.
//!
//! A [`Topology`] is immutable for the lifetime of a placement call: the
//! node table is fixed at cluster start and every core in the cluster has a
//! stable position in a single cluster-wide core bitmap.  Node `n` owns the
//! bit span `coremap_offset(n) .. coremap_offset(n + 1)`, one bit per
//! **physical core** (threads do not get their own bits; they scale the CPU
//! counts instead).
//!
//! Within a node's span, core `c` belongs to socket
//! `(c - offset) / cores_per_socket`.

use crate::bitmap::Bitmap;
use crate::gres::GresPool;

/// Hardware description of a single compute node.
///
/// `sockets` and `cores_per_socket` are at least 1; `threads_per_core` is
/// the number of logical CPUs exposed per physical core (1 when SMT is
/// disabled).  The configuration loader enforces these bounds.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub name: String,
    pub sockets: u16,
    pub cores_per_socket: u16,
    pub threads_per_core: u16,
    /// Real memory in megabytes.
    pub real_memory: u64,
    /// Generic resources configured on the node.
    pub gres: Vec<GresPool>,
}

impl NodeRecord {
    /// Physical cores on the node.
    pub fn cores(&self) -> u32 {
        u32::from(self.sockets) * u32::from(self.cores_per_socket)
    }

    /// Logical CPUs on the node.
    pub fn cpus(&self) -> u32 {
        self.cores() * u32::from(self.threads_per_core)
    }
}

/// The node table plus the monotone coremap offset function.
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: Vec<NodeRecord>,
    /// `offsets[n]` is the first core bit of node `n`; one extra entry at
    /// the end holds the total core count.
    offsets: Vec<usize>,
}

impl Topology {
    /// Build the offset index over an ordered node table.
    pub fn new(nodes: Vec<NodeRecord>) -> Self {
        let mut offsets = Vec::with_capacity(nodes.len() + 1);
        let mut off = 0usize;
        offsets.push(off);
        for node in &nodes {
            off += node.cores() as usize;
            offsets.push(off);
        }
        Self { nodes, offsets }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, n: usize) -> &NodeRecord {
        &self.nodes[n]
    }

    pub fn nodes(&self) -> &[NodeRecord] {
        &self.nodes
    }

    /// First core bit of node `n`.  Valid for `n == node_count()` as well,
    /// where it yields the total core count.
    pub fn coremap_offset(&self, n: usize) -> usize {
        self.offsets[n]
    }

    /// Core bit span of node `n` as `begin..end`.
    pub fn core_range(&self, n: usize) -> std::ops::Range<usize> {
        self.offsets[n]..self.offsets[n + 1]
    }

    /// Total physical cores across the cluster.
    pub fn total_cores(&self) -> usize {
        self.offsets[self.nodes.len()]
    }

    /// Build a cluster-wide core bitmap with every core of the selected
    /// nodes set.
    pub fn make_core_bitmap(&self, node_map: &Bitmap) -> Bitmap {
        let mut core_map = Bitmap::new(self.total_cores());
        for n in node_map.iter_set() {
            let range = self.core_range(n);
            if range.start < range.end {
                core_map.set_range(range.start, range.end - 1);
            }
        }
        core_map
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
