/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The allocation produced by a successful placement, plus the collaborator
//! seams invoked while assembling it.
//!
//! [`JobResources`] is the output side of the selector: which node, how
//! many CPUs, which cores, how much memory.  Its `core_bitmap` is
//! **compact**: it spans only the cores of the selected nodes, laid out in
//! coremap order, unlike the cluster-wide working bitmaps used during
//! selection.

use anyhow::Result;

use crate::bitmap::Bitmap;
use crate::job::{CrType, JobRequest, NodeSharing};
use crate::topology::Topology;

/// Resources allocated to a job.
#[derive(Debug, Clone)]
pub struct JobResources {
    /// Selected nodes (one bit for the serial selector).
    pub node_bitmap: Bitmap,
    /// Number of selected nodes.
    pub nhosts: u32,
    /// CPUs charged to the job.
    pub ncpus: u32,
    /// Sum of the per-node CPU counts after layout caps.
    pub total_cpus: u32,
    /// Sharing stance the allocation was made under.
    pub node_req: NodeSharing,
    /// CPUs per selected node, indexed by position in `node_bitmap`.
    pub cpus: Vec<u16>,
    /// CPUs in use per node (filled as tasks launch).
    pub cpus_used: Vec<u16>,
    /// Memory allocated per node, in megabytes.
    pub memory_allocated: Vec<u64>,
    /// Memory in use per node, in megabytes.
    pub memory_used: Vec<u64>,
    /// Sockets per selected node (hardware geometry).
    pub sockets_per_node: Vec<u16>,
    /// Cores per socket per selected node.
    pub cores_per_socket: Vec<u16>,
    /// Selected cores, compact over the selected nodes in coremap order.
    pub core_bitmap: Bitmap,
}

impl JobResources {
    /// Start an allocation for the selected node set with its per-node CPU
    /// counts.  Geometry and the core bitmap are filled by
    /// [`build_job_resources`].
    pub fn new(node_bitmap: Bitmap, cpus: Vec<u16>, node_req: NodeSharing) -> Self {
        let nhosts = node_bitmap.count() as u32;
        let n = nhosts as usize;
        Self {
            node_bitmap,
            nhosts,
            ncpus: 0,
            total_cpus: 0,
            node_req,
            cpus,
            cpus_used: vec![0; n],
            memory_allocated: vec![0; n],
            memory_used: vec![0; n],
            sockets_per_node: Vec::new(),
            cores_per_socket: Vec::new(),
            core_bitmap: Bitmap::new(0),
        }
    }
}

/// Fill in the hardware geometry for the selected nodes and size the
/// compact core bitmap.
pub fn build_job_resources(res: &mut JobResources, topo: &Topology) -> Result<()> {
    let mut total_cores = 0usize;
    res.sockets_per_node.clear();
    res.cores_per_socket.clear();
    for n in res.node_bitmap.iter_set() {
        if n >= topo.node_count() {
            anyhow::bail!("selected node index {n} outside the node table");
        }
        let record = topo.node(n);
        res.sockets_per_node.push(record.sockets);
        res.cores_per_socket.push(record.cores_per_socket);
        total_cores += record.cores() as usize;
    }
    res.core_bitmap = Bitmap::new(total_cores);
    Ok(())
}

// ── Collaborator seams ────────────────────────────────────────────────────────

/// Distributes the job's tasks across the allocated core bitmap.
///
/// Runs after the allocation is assembled; a failure discards the
/// placement.
pub trait TaskDistributor {
    fn distribute(&self, job: &JobRequest, cr_type: CrType, res: &mut JobResources) -> Result<()>;
}

/// Default distributor: tasks are laid out block-wise over the cores the
/// selector already picked, so the core bitmap needs no further trimming.
#[derive(Debug, Default)]
pub struct BlockDistributor;

impl TaskDistributor for BlockDistributor {
    fn distribute(&self, _job: &JobRequest, _cr_type: CrType, _res: &mut JobResources) -> Result<()> {
        Ok(())
    }
}

/// Side channel for flagging a node as broken when the selector detects an
/// unrecoverable inconsistency on it.
pub trait DrainSink {
    fn request_drain(&self, node: &str, reason: &str);
}

/// Drain sink that drops requests (for deployments where draining is
/// handled elsewhere).
#[derive(Debug, Default)]
pub struct NullDrainSink;

impl DrainSink for NullDrainSink {
    fn request_drain(&self, _node: &str, _reason: &str) {}
}

// ── Tests ─────────────────────────────────────────────────────────────────────
