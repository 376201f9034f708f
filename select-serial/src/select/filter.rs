/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Node-state filter: drop candidate nodes the job can never use.
//!
//! Runs once per placement call, before any core-level work.  Each candidate
//! node passes three gates in order:
//!
//! 1. **Memory** — enough free memory for the job's effective minimum.
//! 2. **GRES** — the generic-resource evaluator does not veto the node.
//! 3. **Sharing** — the node's sharing state is compatible with the job's
//!    request class:
//!
//! | node state \ job request | `Reserved` | `OneRow` | `Available` |
//! |---|---|---|---|
//! | `Reserved`  | drop | drop | drop |
//! | `OneRow`    | drop | drop unless idle in sharing partitions | drop |
//! | `Available` | drop unless fully idle | drop unless idle in sharing partitions | keep |
//!
//! Dropping a node the job *requires* fails the whole placement
//! immediately.

use tracing::debug;

use crate::bitmap::Bitmap;
use crate::gres::GresEvaluator;
use crate::job::{CrType, JobRequest, MemoryRequest, NodeSharing};
use crate::occupancy::{NodeState, NodeUsage, Partition};
use crate::select::error::{SelectError, UnusableReason};
use crate::topology::Topology;

/// Drop unusable candidates from `node_map` in place.
///
/// # Errors
/// [`SelectError::RequiredNodeUnusable`] when a gate drops a node present
/// in the job's required set.
pub(crate) fn verify_node_state(
    topo: &Topology,
    job: &JobRequest,
    node_map: &mut Bitmap,
    cr_type: CrType,
    partitions: &[Partition],
    usage: &[NodeUsage],
    job_node_req: NodeSharing,
    gres: &dyn GresEvaluator,
) -> Result<(), SelectError> {
    let min_mem = effective_min_memory(job);

    for i in 0..node_map.len() {
        if !node_map.test(i) {
            continue;
        }
        let Some(reason) = drop_reason(
            topo,
            job,
            i,
            cr_type,
            partitions,
            &usage[i],
            job_node_req,
            gres,
            min_mem,
        ) else {
            continue; // node is usable, test next node
        };

        debug!(job = job.id, node = %topo.node(i).name, %reason, "filter dropped node");
        if is_required(job, i) {
            return Err(SelectError::RequiredNodeUnusable {
                job_id: job.id,
                node: topo.node(i).name.clone(),
                reason,
            });
        }
        node_map.clear(i);
    }
    Ok(())
}

/// The job's minimum free memory on a node, with the per-cpu form scaled by
/// the job's strongest per-node CPU demand.
fn effective_min_memory(job: &JobRequest) -> u64 {
    match job.memory {
        MemoryRequest::PerCpu(base) => {
            let min_cpus = job
                .ntasks_per_node
                .unwrap_or(0)
                .max(job.pn_min_cpus)
                .max(job.cpus_per_task)
                .max(1);
            base * u64::from(min_cpus)
        }
        MemoryRequest::PerNode(base) => base,
        MemoryRequest::None => 0,
    }
}

#[allow(clippy::too_many_arguments)]
fn drop_reason(
    topo: &Topology,
    job: &JobRequest,
    node_i: usize,
    cr_type: CrType,
    partitions: &[Partition],
    usage: &NodeUsage,
    job_node_req: NodeSharing,
    gres: &dyn GresEvaluator,
    min_mem: u64,
) -> Option<UnusableReason> {
    let record = topo.node(node_i);

    // node-level memory check
    if job.memory.is_set() && cr_type.contains(CrType::MEMORY) {
        let free_mem = record.real_memory.saturating_sub(usage.alloc_memory);
        if free_mem < min_mem {
            return Some(UnusableReason::InsufficientMemory {
                free_mb: free_mem,
                required_mb: min_mem,
            });
        }
    }

    // node-level gres check (feasibility only, no core map yet)
    let gres_cpus = gres.job_test(
        &job.gres,
        usage.effective_gres(record),
        true,
        None,
        topo.core_range(node_i),
        job.id,
        &record.name,
    );
    if gres_cpus == 0 {
        return Some(UnusableReason::GresRejected);
    }

    let own_part = job.partition.as_deref();
    match usage.state {
        // exclusive node
        NodeState::Reserved => Some(UnusableReason::SharingConflict {
            state: NodeState::Reserved,
        }),

        // non-resource-sharing node: only another one-row job may join, and
        // only when the node is idle in sharing partitions
        NodeState::OneRow => {
            if matches!(job_node_req, NodeSharing::Reserved | NodeSharing::Available) {
                Some(UnusableReason::SharingConflict {
                    state: NodeState::OneRow,
                })
            } else if is_node_busy(topo, partitions, node_i, true, own_part) {
                Some(UnusableReason::Busy)
            } else {
                None
            }
        }

        // available node: the job's own request class decides
        NodeState::Available => match job_node_req {
            NodeSharing::Reserved => {
                if is_node_busy(topo, partitions, node_i, false, own_part) {
                    Some(UnusableReason::Busy)
                } else {
                    None
                }
            }
            NodeSharing::OneRow => {
                if is_node_busy(topo, partitions, node_i, true, own_part) {
                    Some(UnusableReason::Busy)
                } else {
                    None
                }
            }
            NodeSharing::Available => None,
        },
    }
}

/// Does any partition row hold an allocation on this node?
///
/// With `sharing_only`, single-row partitions and the job's own partition
/// are skipped: a one-row job only cares about CPUs it would actually have
/// to share with multi-row partitions.
pub(crate) fn is_node_busy(
    topo: &Topology,
    partitions: &[Partition],
    node_i: usize,
    sharing_only: bool,
    own_partition: Option<&str>,
) -> bool {
    let range = topo.core_range(node_i);
    if range.is_empty() {
        return false;
    }
    let (lo, hi) = (range.start, range.end - 1);

    for p in partitions {
        if sharing_only && (p.num_rows < 2 || Some(p.name.as_str()) == own_partition) {
            continue;
        }
        for row in &p.rows {
            if row.any_in_range(lo, hi) {
                return true;
            }
        }
    }
    false
}

fn is_required(job: &JobRequest, node_i: usize) -> bool {
    job.req_nodes
        .as_ref()
        .is_some_and(|req| req.test(node_i))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
