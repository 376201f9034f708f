/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Selection driver: evaluate every candidate node, pick the single winner.
//!
//! `select_nodes` is one pass of the placement ladder: score each candidate
//! with the per-node allocator, drop the useless ones, let `choose_nodes`
//! settle on one node, then narrow the working core bitmap to that node's
//! selected cores.
//!
//! `choose_nodes` wraps the pick with a knapsack de-escalation: if the
//! direct pick fails, it incrementally removes low-CPU nodes and retries,
//! so a node that can only host a sliver of the job does not shadow a
//! better candidate.

use tracing::debug;

use crate::bitmap::Bitmap;
use crate::gres::GresEvaluator;
use crate::job::{CrType, JobRequest};
use crate::occupancy::NodeUsage;
use crate::select::alloc::can_job_run_on_node;
use crate::select::error::{SelectError, TopologyInconsistency, UnusableReason};
use crate::topology::Topology;

/// Per-candidate CPU counts for this job; non-candidates stay 0.
#[allow(clippy::too_many_arguments)]
fn get_res_usage(
    topo: &Topology,
    job: &JobRequest,
    node_map: &Bitmap,
    core_map: &mut Bitmap,
    usage: &[NodeUsage],
    cr_type: CrType,
    test_only: bool,
    gres: &dyn GresEvaluator,
) -> Vec<u16> {
    let mut cpu_cnt = vec![0u16; topo.node_count()];
    for n in 0..topo.node_count().min(node_map.len()) {
        if node_map.test(n) {
            cpu_cnt[n] = can_job_run_on_node(topo, job, core_map, n, usage, cr_type, test_only, gres);
        }
    }
    cpu_cnt
}

/// Settle on one node: the first required node, or the lowest-index
/// candidate with usable CPUs.  On success `node_map` holds exactly that
/// node's bit.  Returns `Ok(false)` when no candidate qualifies.
fn eval_nodes(
    topo: &Topology,
    job: &JobRequest,
    node_map: &mut Bitmap,
    node_cnt: usize,
    cpu_cnt: &[u16],
) -> Result<bool, SelectError> {
    if node_cnt != topo.node_count() {
        return Err(SelectError::InconsistentTopology(
            TopologyInconsistency::NodeCount {
                expected: topo.node_count(),
                got: node_cnt,
            },
        ));
    }
    if let Some(req) = &job.req_nodes {
        node_map.or(req);
    }

    // A serial job lands on exactly one node, so a non-empty required set
    // forces the choice onto a required node.
    let in_table = |n: &usize| *n < cpu_cnt.len() && cpu_cnt[*n] > 0;
    let chosen = match &job.req_nodes {
        Some(req) if req.count() > 0 => req.iter_set().find(in_table),
        _ => node_map.iter_set().find(in_table),
    };
    let Some(node) = chosen else {
        return Ok(false);
    };

    node_map.clear_range(0, node_map.len() - 1);
    node_map.set(node);
    Ok(true)
}

/// Knapsack de-escalation around [`eval_nodes`].
fn choose_nodes(
    topo: &Topology,
    job: &JobRequest,
    node_map: &mut Bitmap,
    node_cnt: usize,
    cpu_cnt: &[u16],
) -> Result<bool, SelectError> {
    let limit = node_map.len().min(cpu_cnt.len());

    // clear nodes without usable resources, and nodes an exclusive job
    // may not take whole because of its max_cpus cap
    for i in 0..limit {
        if !node_map.test(i) {
            continue;
        }
        let over_cap = !job.shared
            && job
                .max_cpus
                .is_some_and(|max| max < u32::from(cpu_cnt[i]));
        if cpu_cnt[i] < 1 || over_cap {
            if is_required(job, i) {
                let reason = if cpu_cnt[i] < 1 {
                    UnusableReason::NoCpus
                } else {
                    UnusableReason::ExceedsMaxCpus {
                        node_cpus: cpu_cnt[i],
                        max_cpus: job.max_cpus.unwrap_or_default(),
                    }
                };
                return Err(SelectError::RequiredNodeUnusable {
                    job_id: job.id,
                    node: topo.node(i).name.clone(),
                    reason,
                });
            }
            node_map.clear(i);
        }
    }

    let mut origmap = node_map.clone();
    if eval_nodes(topo, job, node_map, node_cnt, cpu_cnt)? {
        return Ok(true);
    }

    // The direct pick failed.  Incrementally remove nodes with low CPU
    // counts and retry, so a sliver-sized candidate cannot shadow a node
    // that fits the whole job.
    let most_cpus = cpu_cnt.iter().copied().max().unwrap_or(0);
    for threshold in 1..most_cpus {
        node_map.or(&origmap);
        let mut removed = false;
        for i in 0..limit {
            if cpu_cnt[i] > 0 && cpu_cnt[i] <= threshold {
                if !node_map.test(i) || is_required(job, i) {
                    continue;
                }
                removed = true;
                node_map.clear(i);
                origmap.clear(i);
            }
        }
        if !removed {
            continue;
        }
        if eval_nodes(topo, job, node_map, node_cnt, cpu_cnt)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// One full selection pass over the current working masks.
///
/// On success, `node_map` holds the winning node, `core_map` keeps only
/// that node's selected cores, and the returned vector carries the per-node
/// CPU counts compacted to the final node set.  `Ok(None)` means this pass
/// found no placement.
#[allow(clippy::too_many_arguments)]
pub(crate) fn select_nodes(
    topo: &Topology,
    job: &JobRequest,
    node_map: &mut Bitmap,
    node_cnt: usize,
    core_map: &mut Bitmap,
    usage: &[NodeUsage],
    cr_type: CrType,
    test_only: bool,
    gres: &dyn GresEvaluator,
) -> Result<Option<Vec<u16>>, SelectError> {
    if node_map.count() == 0 {
        return Ok(None);
    }

    let cpu_cnt = get_res_usage(topo, job, node_map, core_map, usage, cr_type, test_only, gres);

    // clear all nodes that hold no usable resources for this job
    for n in 0..node_map.len().min(cpu_cnt.len()) {
        if node_map.test(n) && cpu_cnt[n] == 0 {
            if is_required(job, n) {
                return Err(SelectError::RequiredNodeUnusable {
                    job_id: job.id,
                    node: topo.node(n).name.clone(),
                    reason: UnusableReason::NoCpus,
                });
            }
            node_map.clear(n);
        }
    }
    if node_map.count() == 0 {
        return Ok(None);
    }

    if !choose_nodes(topo, job, node_map, node_cnt, &cpu_cnt)? {
        debug!(job = job.id, "no node choice in this pass");
        return Ok(None);
    }

    // sync the core map with the final node set and compact the cpu counts
    let mut cpus = Vec::with_capacity(node_map.count());
    let mut start = 0usize;
    for n in 0..topo.node_count() {
        if node_map.test(n) {
            cpus.push(cpu_cnt[n]);
            let begin = topo.coremap_offset(n);
            if begin != start {
                core_map.clear_range(start, begin - 1);
            }
            start = topo.coremap_offset(n + 1);
        }
    }
    let total = topo.total_cores();
    if total != start {
        core_map.clear_range(start, total - 1);
    }
    Ok(Some(cpus))
}

fn is_required(job: &JobRequest, node_i: usize) -> bool {
    job.req_nodes
        .as_ref()
        .is_some_and(|req| req.test(node_i))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
