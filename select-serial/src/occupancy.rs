/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Cluster occupancy snapshot: per-node usage records and partition rows.
//!
//! The selector reads this snapshot, never writes it.  Mutation happens
//! outside a placement call, when the cluster manager admits, completes or
//! preempts jobs under its own lock.
//!
//! A partition that permits oversubscription carries several **rows**; each
//! row is a cluster-wide core bitmap of allocations that may run
//! concurrently with the other rows.  Row `i + 1` only starts filling once
//! row `i` has been chosen for some job, so row occupancy is a packing
//! signal: the fullest row is the most attractive place to co-schedule.

use crate::bitmap::Bitmap;
use crate::gres::GresPool;
use crate::topology::NodeRecord;

/// Sharing state of a node, derived from the jobs currently on it.
///
/// The order matters: the filter treats the states as an escalation ladder
/// (`Available < OneRow < Reserved`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum NodeState {
    /// No restriction from running jobs.
    #[default]
    Available,
    /// At least one job on the node refuses to share.
    OneRow,
    /// The node is allocated exclusively.
    Reserved,
}

/// Per-node usage record.
#[derive(Debug, Clone, Default)]
pub struct NodeUsage {
    pub state: NodeState,
    /// Memory already allocated to running jobs, in megabytes.
    pub alloc_memory: u64,
    /// Node still has completing jobs; no new allocations while set.
    pub completing: bool,
    /// Per-node GRES override; `None` falls back to the configured list on
    /// the node record.
    pub gres: Option<Vec<GresPool>>,
}

impl NodeUsage {
    /// The GRES list in effect for this node.
    pub fn effective_gres<'a>(&'a self, record: &'a NodeRecord) -> &'a [GresPool] {
        match &self.gres {
            Some(list) => list,
            None => &record.gres,
        }
    }
}

/// One partition's occupancy: priority plus allocation rows.
#[derive(Debug, Clone)]
pub struct Partition {
    pub name: String,
    pub priority: u32,
    /// Configured oversubscription depth.  A partition with `num_rows < 2`
    /// never shares cores between rows.
    pub num_rows: u16,
    /// Built rows, at most `num_rows`.  An all-zero row is a row that was
    /// created but holds no allocation yet.
    pub rows: Vec<Bitmap>,
}

impl Partition {
    pub fn new(name: impl Into<String>, priority: u32, num_rows: u16) -> Self {
        Self {
            name: name.into(),
            priority,
            num_rows,
            rows: Vec::new(),
        }
    }

    /// Row references ordered most-full first.  Equal occupancy keeps the
    /// original row order, so results are deterministic.
    pub fn rows_by_occupancy(&self) -> Vec<&Bitmap> {
        let mut rows: Vec<&Bitmap> = self.rows.iter().collect();
        rows.sort_by(|a, b| b.count().cmp(&a.count()));
        rows
    }
}

/// Find a partition by name.
pub fn find_partition<'a>(partitions: &'a [Partition], name: &str) -> Option<&'a Partition> {
    partitions.iter().find(|p| p.name == name)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_state_escalation_order() {
        assert!(NodeState::Available < NodeState::OneRow);
        assert!(NodeState::OneRow < NodeState::Reserved);
    }

    #[test]
    fn effective_gres_prefers_usage_override() {
        let record = NodeRecord {
            name: "n01".into(),
            sockets: 1,
            cores_per_socket: 2,
            threads_per_core: 1,
            real_memory: 1024,
            gres: vec![GresPool {
                name: "gpu".into(),
                count: 4,
            }],
        };
        let mut usage = NodeUsage::default();
        assert_eq!(usage.effective_gres(&record)[0].count, 4);

        usage.gres = Some(vec![GresPool {
            name: "gpu".into(),
            count: 1,
        }]);
        assert_eq!(usage.effective_gres(&record)[0].count, 1);
    }

    #[test]
    fn rows_sort_most_full_first() {
        let mut part = Partition::new("batch", 100, 4);
        let mut sparse = Bitmap::new(8);
        sparse.set(0);
        let mut dense = Bitmap::new(8);
        dense.set_range(0, 5);
        part.rows = vec![sparse.clone(), dense.clone(), Bitmap::new(8)];

        let sorted = part.rows_by_occupancy();
        assert_eq!(sorted[0].count(), 6);
        assert_eq!(sorted[1].count(), 1);
        assert_eq!(sorted[2].count(), 0);
    }

    #[test]
    fn rows_sort_is_stable_for_equal_occupancy() {
        let mut part = Partition::new("batch", 100, 2);
        let mut a = Bitmap::new(8);
        a.set(0);
        let mut b = Bitmap::new(8);
        b.set(7);
        part.rows = vec![a.clone(), b.clone()];

        let sorted = part.rows_by_occupancy();
        assert!(sorted[0].test(0), "first row keeps its place on a tie");
        assert!(sorted[1].test(7));
    }

    #[test]
    fn find_partition_by_name() {
        let parts = vec![Partition::new("a", 1, 1), Partition::new("b", 2, 1)];
        assert_eq!(find_partition(&parts, "b").map(|p| p.priority), Some(2));
        assert!(find_partition(&parts, "c").is_none());
    }
}
