/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Job request types consumed by the selector.
//!
//! A [`JobRequest`] is the read-only input side of a placement call.  The
//! fields mirror what the cluster manager hands to the selector plugin;
//! "unset" is expressed with `Option` (or an enum for the memory request)
//! rather than sentinel values, so an impossible combination cannot be
//! constructed by accident.

use bitflags::bitflags;

use crate::bitmap::Bitmap;
use crate::gres::GresRequest;

bitflags! {
    /// Consumable-resource granularity flags.
    ///
    /// `CORE`, `SOCKET` and `CPU` pick the per-node allocator; `MEMORY` is
    /// combinable with any of them and may also stand alone
    /// (memory-only scheduling).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CrType: u16 {
        const CORE   = 1 << 0;
        const SOCKET = 1 << 1;
        const CPU    = 1 << 2;
        const MEMORY = 1 << 3;
    }
}

/// Placement-call mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectMode {
    /// Allocate now; a successful call yields a full resource allocation.
    RunNow,
    /// Feasibility probe only: ignores allocated memory and node state,
    /// produces no allocation.
    TestOnly,
    /// "Would it run?" probe: full evaluation, nominal result only.
    WillRun,
}

/// The sharing stance a job takes toward other jobs on its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSharing {
    /// May share subject to partition policy.
    Available,
    /// May not share a node with any other job.
    OneRow,
    /// Demands idle nodes (exclusive use).
    Reserved,
}

/// Per-node memory requirement.
///
/// The per-cpu form multiplies with the job's effective CPU demand; the
/// per-node form is an absolute floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryRequest {
    /// No memory constraint.
    #[default]
    None,
    /// Megabytes required on the node as a whole.
    PerNode(u64),
    /// Megabytes required per allocated CPU.
    PerCpu(u64),
}

impl MemoryRequest {
    pub fn is_set(&self) -> bool {
        !matches!(self, MemoryRequest::None)
    }
}

/// Multi-core placement hints.
///
/// All fields are optional; an unset field imposes no constraint.
#[derive(Debug, Clone, Default)]
pub struct McSpec {
    /// Minimum free cores a socket must have to be used.
    pub cores_per_socket: Option<u16>,
    /// Minimum number of usable sockets a node must have.
    pub sockets_per_node: Option<u16>,
    /// Tasks to launch per core.
    pub ntasks_per_core: Option<u16>,
    /// Tasks to launch per socket (socket-granularity scheduling only).
    pub ntasks_per_socket: Option<u16>,
    /// Maximum threads per core the job will use.
    pub threads_per_core: Option<u16>,
}

/// A pending job's resource request.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub id: u32,
    /// Name of the partition the job was submitted to.
    pub partition: Option<String>,
    /// CPUs per task, at least 1.
    pub cpus_per_task: u16,
    /// Tasks to launch on the node, when constrained.
    pub ntasks_per_node: Option<u16>,
    /// Minimum CPUs on the node; 0 means no floor.
    pub pn_min_cpus: u16,
    /// Memory requirement.
    pub memory: MemoryRequest,
    /// Total task count requested; 0 when unspecified.
    pub num_tasks: u32,
    /// Minimum CPUs for the whole job.
    pub min_cpus: u32,
    /// Maximum CPUs for the whole job, when capped.
    pub max_cpus: Option<u32>,
    /// Whether the job tolerates sharing its node.
    pub shared: bool,
    /// Whether tasks may overcommit CPUs.
    pub overcommit: bool,
    /// Multi-core hints.
    pub mc: McSpec,
    /// Nodes that must be part of the allocation.
    pub req_nodes: Option<Bitmap>,
    /// Per-required-node CPU caps, indexed by required-node ordinal.
    pub req_node_layout: Option<Vec<u16>>,
    /// Generic resources requested.
    pub gres: Vec<GresRequest>,
    /// Upstream topology verdict: the candidate set has acceptable network
    /// locality.
    pub best_switch: bool,
}

impl Default for JobRequest {
    fn default() -> Self {
        Self {
            id: 0,
            partition: None,
            cpus_per_task: 1,
            ntasks_per_node: None,
            pn_min_cpus: 0,
            memory: MemoryRequest::None,
            num_tasks: 0,
            min_cpus: 1,
            max_cpus: None,
            shared: true,
            overcommit: false,
            mc: McSpec::default(),
            req_nodes: None,
            req_node_layout: None,
            gres: Vec::new(),
            best_switch: true,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cr_type_flags_combine() {
        let cr = CrType::CORE | CrType::MEMORY;
        assert!(cr.contains(CrType::CORE));
        assert!(cr.contains(CrType::MEMORY));
        assert!(!cr.contains(CrType::SOCKET));
        assert_ne!(cr, CrType::MEMORY);
    }

    #[test]
    fn memory_only_scheduling_is_expressible() {
        let cr = CrType::MEMORY;
        assert_eq!(cr, CrType::MEMORY);
        assert!(!cr.intersects(CrType::CORE | CrType::SOCKET | CrType::CPU));
    }

    #[test]
    fn memory_request_is_set() {
        assert!(!MemoryRequest::None.is_set());
        assert!(MemoryRequest::PerNode(100).is_set());
        assert!(MemoryRequest::PerCpu(100).is_set());
    }

    #[test]
    fn default_job_has_sane_baseline() {
        let job = JobRequest::default();
        assert_eq!(job.cpus_per_task, 1);
        assert_eq!(job.min_cpus, 1);
        assert!(job.shared);
        assert!(job.best_switch);
        assert!(job.ntasks_per_node.is_none());
        assert!(job.mc.ntasks_per_socket.is_none());
    }
}
