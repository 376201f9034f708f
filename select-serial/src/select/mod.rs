/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The serial selector: single-node placement against partitioned
//! occupancy.
//!
//! [`SerialSelector::job_test`] answers three questions for a pending job:
//! can it run now, on which node, and on which cores.  The search layers
//! the job against existing allocations in priority order:
//!
//! | pass | free-core mask | on success |
//! |---|---|---|
//! | 0 | every available core | feasibility established, keep going |
//! | 1 | minus all partition rows (true idle) | allocate |
//! | 2 | minus higher-priority rows only | becomes the new baseline |
//! | 3 | baseline minus same-priority rows | allocate |
//! | 4 | baseline minus one row of the job's partition, fullest first | allocate |
//!
//! A job that cannot share (one-row request) stops after pass 1.  Passes
//! that would overlap the job with equal- or lower-priority allocations
//! more aggressively are intentionally absent; pass 4 is the last word.
//!
//! All working bitmaps live in the call frame; the occupancy snapshot is
//! never written.  Callers keep the snapshot stable for the duration of a
//! call.

pub mod error;

mod alloc;
mod filter;
mod pick;

pub use error::{SelectError, TopologyInconsistency, UnusableReason};

use tracing::{debug, error};

use crate::bitmap::Bitmap;
use crate::gres::{CountingGres, GresEvaluator};
use crate::job::{CrType, JobRequest, MemoryRequest, NodeSharing, SelectMode};
use crate::occupancy::{find_partition, NodeUsage, Partition};
use crate::resources::{
    build_job_resources, BlockDistributor, DrainSink, JobResources, NullDrainSink, TaskDistributor,
};
use crate::topology::Topology;

static DEFAULT_GRES: CountingGres = CountingGres;
static DEFAULT_DISTRIBUTOR: BlockDistributor = BlockDistributor;
static DEFAULT_DRAIN: NullDrainSink = NullDrainSink;

/// Outcome of a successful placement call.
#[derive(Debug)]
pub enum Placement {
    /// Test-only mode: the job could run, nothing was allocated.
    Feasible,
    /// Will-run mode: the job would run; the caller accounts a nominal
    /// single CPU until a real allocation is made.
    WillRun,
    /// Run-now mode: the job's allocation.
    Allocated(JobResources),
}

/// Single-node placement engine over an immutable cluster topology.
///
/// Collaborators default to the in-crate implementations; deployments with
/// a richer GRES model or a custom task layout swap them in through the
/// `with_*` builders.
pub struct SerialSelector<'a> {
    topo: &'a Topology,
    gres: &'a dyn GresEvaluator,
    distributor: &'a dyn TaskDistributor,
    drain: &'a dyn DrainSink,
}

impl<'a> SerialSelector<'a> {
    pub fn new(topo: &'a Topology) -> Self {
        Self {
            topo,
            gres: &DEFAULT_GRES,
            distributor: &DEFAULT_DISTRIBUTOR,
            drain: &DEFAULT_DRAIN,
        }
    }

    pub fn with_gres(mut self, gres: &'a dyn GresEvaluator) -> Self {
        self.gres = gres;
        self
    }

    pub fn with_distributor(mut self, distributor: &'a dyn TaskDistributor) -> Self {
        self.distributor = distributor;
        self
    }

    pub fn with_drain(mut self, drain: &'a dyn DrainSink) -> Self {
        self.drain = drain;
        self
    }

    /// Find a placement for `job` among the candidate nodes in `node_map`.
    ///
    /// `node_map` is consumed as working state: after a successful run-now
    /// call it holds exactly the selected node; after a failure its
    /// contents are unspecified.
    ///
    /// # Errors
    /// * [`SelectError::Infeasible`] — no fit under current occupancy.
    /// * [`SelectError::RequiredNodeUnusable`] — a required node was
    ///   filtered or scored zero CPUs.
    /// * [`SelectError::InconsistentTopology`] — `node_cnt` disagrees with
    ///   the node table, or core accounting overflowed (drain requested).
    /// * [`SelectError::DownstreamFailure`] — a collaborator failed after
    ///   placement.
    /// * [`SelectError::BadMode`] — the mode needs a partition association
    ///   the job lacks.
    #[allow(clippy::too_many_arguments)]
    pub fn job_test(
        &self,
        job: &JobRequest,
        node_map: &mut Bitmap,
        mode: SelectMode,
        cr_type: CrType,
        job_node_req: NodeSharing,
        node_cnt: usize,
        partitions: &[Partition],
        usage: &[NodeUsage],
    ) -> Result<Placement, SelectError> {
        let test_only = mode == SelectMode::TestOnly;

        // check node state and update the candidate bitmap as necessary
        if !test_only {
            filter::verify_node_state(
                self.topo,
                job,
                node_map,
                cr_type,
                partitions,
                usage,
                job_node_req,
                self.gres,
            )?;
        }
        debug!(job = job.id, candidates = node_map.count(), "evaluating job");

        let orig_map = node_map.clone();
        let mut avail_cores = self.topo.make_core_bitmap(node_map);
        let mut free_cores = avail_cores.clone();

        // Test 0: make sure the job could succeed with every available
        // core before seeking a placement against the occupancy
        let outcome = self.select(job, node_map, node_cnt, &mut free_cores, usage, cr_type, test_only)?;
        let Some(test0_cpus) = outcome else {
            debug!(job = job.id, "test 0 fail - insufficient resources");
            return Err(SelectError::Infeasible { job_id: job.id });
        };
        if test_only {
            debug!(job = job.id, "test 0 pass - test_only");
            return Ok(Placement::Feasible);
        }
        if !job.best_switch {
            debug!(job = job.id, "test 0 fail - network locality rejected");
            return Err(SelectError::Infeasible { job_id: job.id });
        }
        if cr_type == CrType::MEMORY {
            // memory-only scheduling ignores existing CPU allocations
            return self.finalize(job, mode, cr_type, job_node_req, node_map, &free_cores, test0_cpus);
        }
        debug!(job = job.id, "test 0 pass - job fits on given resources");

        // Test 1: idle cores across all partitions
        node_map.copy_from(&orig_map);
        free_cores.copy_from(&avail_cores);
        for p in partitions {
            for row in &p.rows {
                free_cores.and_not(row);
            }
        }
        let outcome = self.select(job, node_map, node_cnt, &mut free_cores, usage, cr_type, test_only)?;
        if let Some(cpus) = outcome {
            if job.best_switch {
                debug!(job = job.id, "test 1 pass - idle resources found");
                return self.finalize(job, mode, cr_type, job_node_req, node_map, &free_cores, cpus);
            }
        }
        if job_node_req == NodeSharing::OneRow {
            // this job cannot share CPUs regardless of priority
            debug!(job = job.id, "test 1 fail - no idle resources for a no-share job");
            return Err(SelectError::Infeasible { job_id: job.id });
        }
        debug!(job = job.id, "test 1 fail - not enough idle resources");

        // Test 2: remove occupancy of higher-priority partitions; what
        // remains is the baseline for the rest of the ladder
        node_map.copy_from(&orig_map);
        free_cores.copy_from(&avail_cores);
        let own = job
            .partition
            .as_deref()
            .and_then(|name| find_partition(partitions, name))
            .ok_or(SelectError::BadMode { job_id: job.id })?;
        for p in partitions.iter().filter(|p| p.priority > own.priority) {
            for row in &p.rows {
                free_cores.and_not(row);
            }
        }
        avail_cores.copy_from(&free_cores);
        let outcome = self.select(job, node_map, node_cnt, &mut free_cores, usage, cr_type, test_only)?;
        if outcome.is_none() {
            debug!(job = job.id, "test 2 fail - resources busy with higher priority jobs");
            return Err(SelectError::Infeasible { job_id: job.id });
        }
        debug!(job = job.id, "test 2 pass - resources available at this priority");

        // Test 3: also exclude same-priority occupancy (the job's own
        // partition included)
        node_map.copy_from(&orig_map);
        free_cores.copy_from(&avail_cores);
        for p in partitions.iter().filter(|p| p.priority == own.priority) {
            for row in &p.rows {
                free_cores.and_not(row);
            }
        }
        let outcome = self.select(job, node_map, node_cnt, &mut free_cores, usage, cr_type, test_only)?;
        if let Some(cpus) = outcome {
            debug!(job = job.id, "test 3 pass - found resources");
            return self.finalize(job, mode, cr_type, job_node_req, node_map, &free_cores, cpus);
        }
        debug!(job = job.id, "test 3 fail - not enough idle resources at same priority");

        // Test 4: fit the job into one row of its own partition, fullest
        // row first to maximize packing
        if own.rows.is_empty() {
            node_map.copy_from(&orig_map);
            free_cores.copy_from(&avail_cores);
            let outcome =
                self.select(job, node_map, node_cnt, &mut free_cores, usage, cr_type, test_only)?;
            return match outcome {
                Some(cpus) => {
                    debug!(job = job.id, "test 4 pass - first row");
                    self.finalize(job, mode, cr_type, job_node_req, node_map, &free_cores, cpus)
                }
                None => {
                    debug!(job = job.id, "test 4 fail - busy partition");
                    Err(SelectError::Infeasible { job_id: job.id })
                }
            };
        }

        let sorted_rows = own.rows_by_occupancy();
        // a job that cannot fully share only ever joins row 0
        let row_limit = if job_node_req != NodeSharing::Available {
            1
        } else {
            own.num_rows as usize
        };
        let tried = sorted_rows.len().min(row_limit);
        let mut chosen = None;
        for (i, row) in sorted_rows.iter().take(row_limit).enumerate() {
            node_map.copy_from(&orig_map);
            free_cores.copy_from(&avail_cores);
            free_cores.and_not(row);
            if let Some(cpus) =
                self.select(job, node_map, node_cnt, &mut free_cores, usage, cr_type, test_only)?
            {
                debug!(job = job.id, row = i, "test 4 pass");
                chosen = Some(cpus);
                break;
            }
            debug!(job = job.id, row = i, "test 4 fail - row full");
        }
        if chosen.is_none() && tried < row_limit {
            // the partition still has an unbuilt row; try it fresh
            debug!(job = job.id, row = tried, "test 4 trying empty row");
            node_map.copy_from(&orig_map);
            free_cores.copy_from(&avail_cores);
            chosen =
                self.select(job, node_map, node_cnt, &mut free_cores, usage, cr_type, test_only)?;
        }

        match chosen {
            Some(cpus) => self.finalize(job, mode, cr_type, job_node_req, node_map, &free_cores, cpus),
            None => {
                debug!(job = job.id, "test 4 fail - busy partition");
                Err(SelectError::Infeasible { job_id: job.id })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn select(
        &self,
        job: &JobRequest,
        node_map: &mut Bitmap,
        node_cnt: usize,
        free_cores: &mut Bitmap,
        usage: &[NodeUsage],
        cr_type: CrType,
        test_only: bool,
    ) -> Result<Option<Vec<u16>>, SelectError> {
        pick::select_nodes(
            self.topo, job, node_map, node_cnt, free_cores, usage, cr_type, test_only, self.gres,
        )
    }

    /// Assemble the allocation for the selected node, run the downstream
    /// collaborators, and load the memory array.
    #[allow(clippy::too_many_arguments)]
    fn finalize(
        &self,
        job: &JobRequest,
        mode: SelectMode,
        cr_type: CrType,
        job_node_req: NodeSharing,
        node_map: &Bitmap,
        free_cores: &Bitmap,
        cpus: Vec<u16>,
    ) -> Result<Placement, SelectError> {
        if mode == SelectMode::WillRun {
            debug!(job = job.id, "will-run verdict, no allocation materialized");
            return Ok(Placement::WillRun);
        }
        if job.partition.is_none() {
            return Err(SelectError::BadMode { job_id: job.id });
        }

        let mut res = JobResources::new(node_map.clone(), cpus, job_node_req);
        let mut ncpus = res.nhosts;
        if let Some(tpn) = job.ntasks_per_node.filter(|&v| v > 0) {
            ncpus *= u32::from(tpn);
        }
        res.ncpus = ncpus.max(job.min_cpus).max(job.pn_min_cpus.into());

        build_job_resources(&mut res, self.topo).map_err(|source| {
            SelectError::DownstreamFailure {
                stage: "job resources builder",
                source,
            }
        })?;

        // lay the selected cores into the compact core bitmap, apply the
        // per-required-node layout caps, and total the cpu counts
        let csize = res.core_bitmap.len();
        let layout = job.req_node_layout.as_deref();
        let reqmap = job.req_nodes.as_ref();
        let mut total_cpus = 0u32;
        let mut compact = 0usize;
        let mut host = 0usize;
        let mut req_seen = 0usize;
        for n in 0..self.topo.node_count() {
            let layout_capped =
                layout.is_some() && reqmap.is_some_and(|r| r.test(n));
            if layout_capped {
                req_seen += 1;
            }
            if !node_map.test(n) {
                continue;
            }
            for c in self.topo.core_range(n) {
                if free_cores.test(c) {
                    if compact >= csize {
                        let name = self.topo.node(n).name.clone();
                        error!(job = job.id, node = %name, "core bitmap index overflow");
                        self.drain.request_drain(&name, "Bad core count");
                        return Err(SelectError::InconsistentTopology(
                            TopologyInconsistency::CoreIndexOverflow { node: name },
                        ));
                    }
                    res.core_bitmap.set(compact);
                }
                compact += 1;
            }
            if layout_capped {
                if let Some(&cap) = layout.and_then(|l| l.get(req_seen - 1)) {
                    res.cpus[host] = res.cpus[host].min(cap);
                }
            } else if layout.is_some() {
                res.cpus[host] = 0;
            }
            total_cpus += u32::from(res.cpus[host]);
            host += 1;
        }

        // with overcommit the cpu charge shrinks to the task count; the
        // node still hands over all its selected processors
        if job.overcommit && job.num_tasks > 0 {
            res.ncpus = total_cpus.min(job.num_tasks);
        }
        res.total_cpus = total_cpus;

        debug!(
            job = job.id,
            ncpus = res.ncpus,
            selected_cores = res.core_bitmap.count(),
            hosts = res.nhosts,
            "distributing job"
        );
        self.distributor
            .distribute(job, cr_type, &mut res)
            .map_err(|source| SelectError::DownstreamFailure {
                stage: "task distribution",
                source,
            })?;

        if cr_type.contains(CrType::MEMORY) {
            match job.memory {
                MemoryRequest::PerCpu(base) => {
                    for i in 0..res.cpus.len() {
                        res.memory_allocated[i] = u64::from(res.cpus[i]) * base;
                    }
                }
                MemoryRequest::PerNode(base) => {
                    for mem in res.memory_allocated.iter_mut() {
                        *mem = base;
                    }
                }
                MemoryRequest::None => {}
            }
        }

        Ok(Placement::Allocated(res))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
