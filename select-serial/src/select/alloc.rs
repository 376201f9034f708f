/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-node allocators: how many CPUs can the job get on one node, and
//! which cores.
//!
//! Both allocators follow the same four-step procedure over the node's span
//! of the working core bitmap:
//!
//! 1. Survey free cores per socket.
//! 2. Apply the per-socket (`cores_per_socket`) and per-node
//!    (`sockets_per_node`) minimums.
//! 3. Task math: fold `ntasks_per_core`, `ntasks_per_node`,
//!    `cpus_per_task` (and for sockets mode `ntasks_per_socket`) into a
//!    task count and a CPU budget for the node.
//! 4. Walk the node's cores in ascending order, keeping bits until the
//!    budget is spent and clearing everything else.
//!
//! The bitmap is mutated in place: on success the node's span holds exactly
//! the selected cores; on failure it is zeroed.  The returned CPU count may
//! be smaller than `selected cores x threads`; task distribution later
//! deselects the excess.
//!
//! Socket granularity differs in one structural way: a socket with any core
//! in use by another job is wholly unusable, because sockets cannot be
//! split between jobs at that granularity.

use tracing::debug;

use crate::bitmap::Bitmap;
use crate::gres::GresEvaluator;
use crate::job::{CrType, JobRequest, MemoryRequest};
use crate::occupancy::NodeUsage;
use crate::topology::Topology;

/// Job parameters both allocators read, normalized once per node.
struct AllocParams {
    cpus_per_task: u32,
    ntasks_per_node: Option<u32>,
    min_cores: u32,
    min_sockets: u32,
    /// `min(threads_per_core, ntasks_per_core)`: CPUs each kept core
    /// contributes.
    threads: u32,
}

impl AllocParams {
    fn new(job: &JobRequest, vpus: u16) -> Self {
        let mut ntasks_per_core = u32::from(u16::MAX);
        if let Some(v) = job.mc.ntasks_per_core.filter(|&v| v > 0) {
            ntasks_per_core = v.into();
        }
        if let Some(t) = job.mc.threads_per_core {
            if u32::from(t) < ntasks_per_core {
                ntasks_per_core = t.into();
            }
        }
        Self {
            cpus_per_task: job.cpus_per_task.into(),
            ntasks_per_node: job.ntasks_per_node.filter(|&v| v > 0).map(u32::from),
            min_cores: job.mc.cores_per_socket.unwrap_or(1).into(),
            min_sockets: job.mc.sockets_per_node.unwrap_or(1).into(),
            threads: u32::from(vpus).min(ntasks_per_core),
        }
    }
}

/// Select cores on node `node_i` at core (or cpu) granularity.
///
/// Returns the CPU count for the node, `0` when the job does not fit.  The
/// node's span in `core_map` ends up holding the selected cores, or nothing
/// on failure.  `cpu_type` only labels the call site; the procedure is the
/// same for both granularities.
pub(crate) fn allocate_cores(
    topo: &Topology,
    job: &JobRequest,
    core_map: &mut Bitmap,
    node_i: usize,
    _cpu_type: bool,
) -> u16 {
    let record = topo.node(node_i);
    let core_begin = topo.coremap_offset(node_i);
    let core_end = topo.coremap_offset(node_i + 1);
    let sockets = record.sockets as usize;
    let cores_per_socket = record.cores_per_socket as usize;
    let p = AllocParams::new(job, record.threads_per_core);

    let result = (|| {
        // Step 1: free-core counts per socket
        let mut free_cores = vec![0u32; sockets];
        let mut free_core_count = 0u32;
        for c in core_begin..core_end {
            if core_map.test(c) {
                free_cores[(c - core_begin) / cores_per_socket] += 1;
                free_core_count += 1;
            }
        }

        // Step 2: per-socket and per-node minimums
        let mut usable_sockets = 0u32;
        for free in free_cores.iter_mut() {
            if *free < p.min_cores {
                free_core_count -= *free;
                *free = 0;
            } else {
                usable_sockets += 1;
            }
        }
        if usable_sockets < p.min_sockets || free_core_count < 1 {
            return None;
        }

        // Step 3: task math
        let mut avail_cpus = p.threads * free_core_count;
        let mut num_tasks = avail_cpus;
        if let Some(tpn) = p.ntasks_per_node {
            // An exclusive job skips this clamp so it receives the whole
            // node.
            if job.shared {
                num_tasks = num_tasks.min(tpn);
            }
        }
        if p.cpus_per_task < 2 {
            avail_cpus = num_tasks;
        } else {
            num_tasks = num_tasks.min(avail_cpus / p.cpus_per_task);
            if p.ntasks_per_node.is_some() {
                avail_cpus = num_tasks * p.cpus_per_task;
            }
        }
        let tasks_short = p
            .ntasks_per_node
            .is_some_and(|tpn| num_tasks < tpn && !job.overcommit);
        let cpus_short = job.pn_min_cpus > 0 && avail_cpus < u32::from(job.pn_min_cpus);
        if tasks_short || cpus_short || num_tasks == 0 {
            return None;
        }

        // Step 4: keep cores until the CPU budget is spent
        let mut cpu_count = 0u32;
        let mut c = core_begin;
        while c < core_end && avail_cpus > 0 {
            if core_map.test(c) {
                let s = (c - core_begin) / cores_per_socket;
                if free_cores[s] == 0 {
                    core_map.clear(c);
                } else {
                    free_cores[s] -= 1;
                    // cpu_count must not exceed the stage-3 budget when
                    // hyperthreading rounds the last core up
                    if avail_cpus >= p.threads {
                        avail_cpus -= p.threads;
                        cpu_count += p.threads;
                    } else {
                        cpu_count += avail_cpus;
                        avail_cpus = 0;
                    }
                }
            }
            c += 1;
        }
        if c < core_end {
            core_map.clear_range(c, core_end - 1);
        }
        Some(cpu_count)
    })();

    match result {
        Some(cpus) => cpus as u16,
        None => {
            core_map.clear_range(core_begin, core_end - 1);
            0
        }
    }
}

/// Select cores on node `node_i` at socket granularity.
pub(crate) fn allocate_sockets(
    topo: &Topology,
    job: &JobRequest,
    core_map: &mut Bitmap,
    node_i: usize,
) -> u16 {
    let record = topo.node(node_i);
    let core_begin = topo.coremap_offset(node_i);
    let core_end = topo.coremap_offset(node_i + 1);
    let sockets = record.sockets as usize;
    let cores_per_socket = record.cores_per_socket as usize;
    let p = AllocParams::new(job, record.threads_per_core);
    let ntasks_per_socket = job.mc.ntasks_per_socket.filter(|&v| v > 0).map(u32::from);

    let result = (|| {
        // Step 1: free and used core counts per socket; a socket another
        // job already occupies cannot be split at this granularity
        let mut free_cores = vec![0u32; sockets];
        let mut used_cores = vec![0u32; sockets];
        let mut free_core_count = 0u32;
        for c in core_begin..core_end {
            let s = (c - core_begin) / cores_per_socket;
            if core_map.test(c) {
                free_cores[s] += 1;
                free_core_count += 1;
            } else {
                used_cores[s] += 1;
            }
        }
        for s in 0..sockets {
            if used_cores[s] > 0 {
                free_core_count -= free_cores[s];
                free_cores[s] = 0;
            }
        }

        // Step 2: per-socket and per-node minimums
        let mut usable_sockets = 0u32;
        for free in free_cores.iter_mut() {
            if *free < p.min_cores {
                free_core_count -= *free;
                *free = 0;
            } else {
                usable_sockets += 1;
            }
        }
        if usable_sockets < p.min_sockets || free_core_count < 1 {
            return None;
        }

        // Step 3: task math, summed socket by socket so ntasks_per_socket
        // can cap each socket's contribution
        let mut avail_cpus = 0u32;
        let mut num_tasks = 0u32;
        for &free in &free_cores {
            let socket_cpus = free * p.threads;
            avail_cpus += socket_cpus;
            num_tasks += match ntasks_per_socket {
                Some(nps) => socket_cpus.min(nps),
                None => socket_cpus,
            };
        }
        if let Some(tpn) = p.ntasks_per_node {
            if job.shared {
                num_tasks = num_tasks.min(tpn);
            }
        }
        if p.cpus_per_task < 2 {
            avail_cpus = num_tasks;
        } else {
            num_tasks = num_tasks.min(avail_cpus / p.cpus_per_task);
            if p.ntasks_per_node.is_some() {
                avail_cpus = num_tasks * p.cpus_per_task;
            }
        }
        let tasks_short = p.ntasks_per_node.is_some_and(|tpn| num_tasks < tpn);
        let cpus_short = job.pn_min_cpus > 0 && avail_cpus < u32::from(job.pn_min_cpus);
        if tasks_short || cpus_short || num_tasks == 0 {
            return None;
        }

        // Step 4: keep cores, enforcing ntasks_per_socket with a running
        // per-socket CPU counter
        let mut cps = num_tasks;
        if let Some(nps) = ntasks_per_socket {
            if nps > 1 {
                cps = nps;
                if p.cpus_per_task > 1 {
                    cps = nps * p.cpus_per_task;
                }
            }
        }
        let mut current_socket = usize::MAX;
        let mut socket_cpus = 0u32;
        let mut cpu_count = 0u32;
        let mut c = core_begin;
        while c < core_end && avail_cpus > 0 {
            if core_map.test(c) {
                let s = (c - core_begin) / cores_per_socket;
                if free_cores[s] > 0 {
                    if current_socket != s {
                        current_socket = s;
                        socket_cpus = p.threads;
                    } else if socket_cpus >= cps {
                        // this socket already carries its share of tasks
                        core_map.clear(c);
                        c += 1;
                        continue;
                    } else {
                        socket_cpus += p.threads;
                    }
                    free_cores[s] -= 1;
                    if avail_cpus >= p.threads {
                        avail_cpus -= p.threads;
                        cpu_count += p.threads;
                    } else {
                        cpu_count += avail_cpus;
                        avail_cpus = 0;
                    }
                } else {
                    core_map.clear(c);
                }
            }
            c += 1;
        }
        if c < core_end {
            core_map.clear_range(c, core_end - 1);
        }
        Some(cpu_count)
    })();

    match result {
        Some(cpus) => cpus as u16,
        None => {
            core_map.clear_range(core_begin, core_end - 1);
            0
        }
    }
}

/// Full per-node evaluation: allocator dispatch, then the memory and GRES
/// clamps.
///
/// Returns the CPU count the job could get on the node; `0` means the node
/// is out, and its whole span in `core_map` is cleared (except for the
/// completing-node early return, which leaves the map untouched).
#[allow(clippy::too_many_arguments)]
pub(crate) fn can_job_run_on_node(
    topo: &Topology,
    job: &JobRequest,
    core_map: &mut Bitmap,
    node_i: usize,
    usage: &[NodeUsage],
    cr_type: CrType,
    test_only: bool,
    gres: &dyn GresEvaluator,
) -> u16 {
    let node_usage = &usage[node_i];
    if !test_only && node_usage.completing {
        // no new allocations on nodes with completing jobs
        return 0;
    }

    let allocated = if cr_type.contains(CrType::CORE) {
        allocate_cores(topo, job, core_map, node_i, false)
    } else if cr_type.contains(CrType::SOCKET) {
        allocate_sockets(topo, job, core_map, node_i)
    } else {
        allocate_cores(topo, job, core_map, node_i, true)
    };
    let mut cpus = u32::from(allocated);

    let record = topo.node(node_i);
    let range = topo.core_range(node_i);
    let ntasks_per_node = u32::from(job.ntasks_per_node.unwrap_or(0));
    let cpus_per_task = u32::from(job.cpus_per_task);

    if cr_type.contains(CrType::MEMORY) {
        let avail_mem = record
            .real_memory
            .saturating_sub(if test_only { 0 } else { node_usage.alloc_memory });
        match job.memory {
            MemoryRequest::PerCpu(req_mem) => {
                while cpus > 0 && req_mem * u64::from(cpus) > avail_mem {
                    cpus -= 1;
                }
                if cpus < ntasks_per_node || (cpus_per_task > 1 && cpus < cpus_per_task) {
                    cpus = 0;
                }
            }
            MemoryRequest::PerNode(req_mem) => {
                if req_mem > avail_mem {
                    cpus = 0;
                }
            }
            MemoryRequest::None => {}
        }
    }

    // GRES affinity clamp against the cores just selected; the evaluator
    // may clear bits inside the node's span
    let mut gres_cpus = gres.job_test(
        &job.gres,
        node_usage.effective_gres(record),
        test_only,
        Some(core_map),
        range.clone(),
        job.id,
        &record.name,
    );
    if gres_cpus < ntasks_per_node || (cpus_per_task > 1 && gres_cpus < cpus_per_task) {
        gres_cpus = 0;
    }
    if gres_cpus < cpus {
        cpus = gres_cpus;
    }

    if cpus == 0 && range.start < range.end {
        core_map.clear_range(range.start, range.end - 1);
    }

    debug!(
        job = job.id,
        node = %record.name,
        cpus,
        state = ?node_usage.state,
        alloc_mem = node_usage.alloc_memory,
        real_mem = record.real_memory,
        "per-node evaluation"
    );
    cpus as u16
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gres::CountingGres;
    use crate::job::McSpec;
    use crate::topology::NodeRecord;

    /// One node: `sockets x cores x threads`, 8000MB memory.
    fn topo1(sockets: u16, cores: u16, threads: u16) -> Topology {
        Topology::new(vec![NodeRecord {
            name: "n01".into(),
            sockets,
            cores_per_socket: cores,
            threads_per_core: threads,
            real_memory: 8000,
            gres: Vec::new(),
        }])
    }

    fn full_map(topo: &Topology) -> Bitmap {
        Bitmap::filled(topo.total_cores())
    }

    // ── allocate_cores ────────────────────────────────────────────────────────

    #[test]
    fn cores_whole_idle_node() {
        let topo = topo1(2, 2, 1);
        let mut map = full_map(&topo);
        let job = JobRequest::default();
        let cpus = allocate_cores(&topo, &job, &mut map, 0, false);
        assert_eq!(cpus, 4);
        assert_eq!(map.count(), 4);
    }

    #[test]
    fn cores_budget_stops_core_walk() {
        let topo = topo1(2, 2, 1);
        let mut map = full_map(&topo);
        let job = JobRequest {
            ntasks_per_node: Some(2),
            ..Default::default()
        };
        let cpus = allocate_cores(&topo, &job, &mut map, 0, false);
        assert_eq!(cpus, 2);
        assert_eq!(map.count(), 2, "only two cores stay selected");
        assert!(map.test(0));
        assert!(map.test(1));
    }

    #[test]
    fn cores_exclusive_job_keeps_whole_node() {
        // shared = false disables the ntasks_per_node clamp, so the
        // exclusive job gets every core
        let topo = topo1(2, 2, 1);
        let mut map = full_map(&topo);
        let job = JobRequest {
            ntasks_per_node: Some(2),
            shared: false,
            ..Default::default()
        };
        let cpus = allocate_cores(&topo, &job, &mut map, 0, false);
        assert_eq!(cpus, 4);
        assert_eq!(map.count(), 4);
    }

    #[test]
    fn cores_min_cores_disqualifies_short_socket() {
        // socket 0 has one free core, socket 1 has two; min 2 per socket
        let topo = topo1(2, 2, 1);
        let mut map = full_map(&topo);
        map.clear(0);
        let job = JobRequest {
            mc: McSpec {
                cores_per_socket: Some(2),
                ..Default::default()
            },
            ..Default::default()
        };
        let cpus = allocate_cores(&topo, &job, &mut map, 0, false);
        assert_eq!(cpus, 2);
        assert!(!map.test(1), "socket 0 contributes nothing");
        assert!(map.test(2));
        assert!(map.test(3));
    }

    #[test]
    fn cores_min_sockets_fails_node() {
        let topo = topo1(2, 2, 1);
        let mut map = full_map(&topo);
        map.clear(0); // socket 0 below min_cores=2
        let job = JobRequest {
            mc: McSpec {
                cores_per_socket: Some(2),
                sockets_per_node: Some(2),
                ..Default::default()
            },
            ..Default::default()
        };
        let cpus = allocate_cores(&topo, &job, &mut map, 0, false);
        assert_eq!(cpus, 0);
        assert_eq!(map.count(), 0, "failure clears the node span");
    }

    #[test]
    fn cores_cpus_per_task_division() {
        // 4 cores, 3 cpus per task: one task fits, 3 cpus charged
        let topo = topo1(1, 4, 1);
        let mut map = full_map(&topo);
        let job = JobRequest {
            cpus_per_task: 3,
            ntasks_per_node: Some(1),
            ..Default::default()
        };
        let cpus = allocate_cores(&topo, &job, &mut map, 0, false);
        assert_eq!(cpus, 3);
        assert_eq!(map.count(), 3);
    }

    #[test]
    fn cores_ntasks_gate_fails_without_overcommit() {
        let topo = topo1(1, 4, 1);
        let mut map = full_map(&topo);
        let job = JobRequest {
            ntasks_per_node: Some(8),
            ..Default::default()
        };
        assert_eq!(allocate_cores(&topo, &job, &mut map, 0, false), 0);
        assert_eq!(map.count(), 0);
    }

    #[test]
    fn cores_overcommit_bypasses_ntasks_gate() {
        let topo = topo1(1, 4, 1);
        let mut map = full_map(&topo);
        let job = JobRequest {
            ntasks_per_node: Some(8),
            overcommit: true,
            ..Default::default()
        };
        let cpus = allocate_cores(&topo, &job, &mut map, 0, false);
        assert_eq!(cpus, 4, "overcommit accepts fewer tasks than requested");
    }

    #[test]
    fn cores_pn_min_cpus_gate() {
        let topo = topo1(1, 4, 1);
        let mut map = full_map(&topo);
        let job = JobRequest {
            pn_min_cpus: 6,
            ..Default::default()
        };
        assert_eq!(allocate_cores(&topo, &job, &mut map, 0, false), 0);
    }

    #[test]
    fn cores_hyperthreads_scale_cpu_count() {
        let topo = topo1(1, 2, 2);
        let mut map = full_map(&topo);
        let job = JobRequest::default();
        let cpus = allocate_cores(&topo, &job, &mut map, 0, false);
        assert_eq!(cpus, 4, "2 cores x 2 threads");
        assert_eq!(map.count(), 2);
    }

    #[test]
    fn cores_ntasks_per_core_caps_threads() {
        let topo = topo1(1, 2, 2);
        let mut map = full_map(&topo);
        let job = JobRequest {
            mc: McSpec {
                ntasks_per_core: Some(1),
                ..Default::default()
            },
            ..Default::default()
        };
        let cpus = allocate_cores(&topo, &job, &mut map, 0, false);
        assert_eq!(cpus, 2, "one cpu per core despite SMT");
    }

    #[test]
    fn cores_odd_budget_truncates_last_core() {
        // 2 cores x 2 threads, 3 tasks requested: budget 3 < 4
        let topo = topo1(1, 2, 2);
        let mut map = full_map(&topo);
        let job = JobRequest {
            ntasks_per_node: Some(3),
            ..Default::default()
        };
        let cpus = allocate_cores(&topo, &job, &mut map, 0, false);
        assert_eq!(cpus, 3, "last core contributes a single thread");
        assert_eq!(map.count(), 2);
    }

    // ── allocate_sockets ──────────────────────────────────────────────────────

    #[test]
    fn sockets_whole_idle_node() {
        let topo = topo1(2, 2, 1);
        let mut map = full_map(&topo);
        let job = JobRequest::default();
        let cpus = allocate_sockets(&topo, &job, &mut map, 0);
        assert_eq!(cpus, 4);
        assert_eq!(map.count(), 4);
    }

    #[test]
    fn sockets_used_core_poisons_whole_socket() {
        // one used core on socket 0 takes the whole socket out
        let topo = topo1(2, 2, 1);
        let mut map = full_map(&topo);
        map.clear(0);
        let job = JobRequest::default();
        let cpus = allocate_sockets(&topo, &job, &mut map, 0);
        assert_eq!(cpus, 2, "only socket 1 remains");
        assert!(!map.test(1), "free core on the poisoned socket is dropped");
        assert!(map.test(2));
        assert!(map.test(3));
    }

    #[test]
    fn sockets_min_sockets_fails_after_poisoning() {
        let topo = topo1(2, 2, 1);
        let mut map = full_map(&topo);
        map.clear(0); // socket 0 partially used -> unusable
        let job = JobRequest {
            mc: McSpec {
                sockets_per_node: Some(2),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(allocate_sockets(&topo, &job, &mut map, 0), 0);
        assert_eq!(map.count(), 0);
    }

    #[test]
    fn sockets_ntasks_per_socket_caps_task_count() {
        // 2 sockets x 4 cores, 1 task per socket: two tasks total
        let topo = topo1(2, 4, 1);
        let mut map = full_map(&topo);
        let job = JobRequest {
            mc: McSpec {
                ntasks_per_socket: Some(1),
                ..Default::default()
            },
            ..Default::default()
        };
        let cpus = allocate_sockets(&topo, &job, &mut map, 0);
        assert_eq!(cpus, 2);
    }

    #[test]
    fn sockets_ntasks_per_socket_limits_cores_kept() {
        // 1 socket x 4 cores, 2 tasks per socket: two cores kept
        let topo = topo1(1, 4, 1);
        let mut map = full_map(&topo);
        let job = JobRequest {
            ntasks_per_node: Some(2),
            mc: McSpec {
                ntasks_per_socket: Some(2),
                ..Default::default()
            },
            ..Default::default()
        };
        let cpus = allocate_sockets(&topo, &job, &mut map, 0);
        assert_eq!(cpus, 2);
        assert_eq!(map.count(), 2);
        assert!(map.test(0));
        assert!(map.test(1));
    }

    #[test]
    fn sockets_gate_has_no_overcommit_bypass() {
        // unlike core granularity, overcommit does not bypass the task gate
        let topo = topo1(1, 4, 1);
        let mut map = full_map(&topo);
        let job = JobRequest {
            ntasks_per_node: Some(8),
            overcommit: true,
            ..Default::default()
        };
        assert_eq!(allocate_sockets(&topo, &job, &mut map, 0), 0);
    }

    // ── can_job_run_on_node ───────────────────────────────────────────────────

    fn run_node(
        topo: &Topology,
        job: &JobRequest,
        map: &mut Bitmap,
        usage: &[NodeUsage],
        cr_type: CrType,
        test_only: bool,
    ) -> u16 {
        can_job_run_on_node(topo, job, map, 0, usage, cr_type, test_only, &CountingGres)
    }

    #[test]
    fn per_cpu_memory_clamps_cpu_count() {
        // 4 cores free, 8000MB real, 3000MB per cpu: 2 cpus fit
        let topo = topo1(1, 4, 1);
        let mut map = full_map(&topo);
        let usage = vec![NodeUsage::default()];
        let job = JobRequest {
            memory: MemoryRequest::PerCpu(3000),
            ..Default::default()
        };
        let cpus = run_node(
            &topo,
            &job,
            &mut map,
            &usage,
            CrType::CORE | CrType::MEMORY,
            false,
        );
        assert_eq!(cpus, 2);
    }

    #[test]
    fn per_node_memory_rejects_outright() {
        let topo = topo1(1, 4, 1);
        let mut map = full_map(&topo);
        let usage = vec![NodeUsage {
            alloc_memory: 7000,
            ..Default::default()
        }];
        let job = JobRequest {
            memory: MemoryRequest::PerNode(2000),
            ..Default::default()
        };
        let cpus = run_node(
            &topo,
            &job,
            &mut map,
            &usage,
            CrType::CORE | CrType::MEMORY,
            false,
        );
        assert_eq!(cpus, 0);
        assert_eq!(map.count(), 0);
    }

    #[test]
    fn test_only_ignores_allocated_memory() {
        let topo = topo1(1, 4, 1);
        let mut map = full_map(&topo);
        let usage = vec![NodeUsage {
            alloc_memory: 7000,
            ..Default::default()
        }];
        let job = JobRequest {
            memory: MemoryRequest::PerNode(2000),
            ..Default::default()
        };
        let cpus = run_node(
            &topo,
            &job,
            &mut map,
            &usage,
            CrType::CORE | CrType::MEMORY,
            true,
        );
        assert_eq!(cpus, 4);
    }

    #[test]
    fn memory_clamp_below_cpus_per_task_zeroes() {
        // per-cpu clamp leaves 2 cpus, but the job needs 3 per task
        let topo = topo1(1, 4, 1);
        let mut map = full_map(&topo);
        let usage = vec![NodeUsage::default()];
        let job = JobRequest {
            memory: MemoryRequest::PerCpu(3000),
            cpus_per_task: 3,
            overcommit: true,
            ntasks_per_node: Some(1),
            ..Default::default()
        };
        let cpus = run_node(
            &topo,
            &job,
            &mut map,
            &usage,
            CrType::CORE | CrType::MEMORY,
            false,
        );
        assert_eq!(cpus, 0);
        assert_eq!(map.count(), 0);
    }

    #[test]
    fn completing_node_returns_zero_untouched() {
        let topo = topo1(1, 4, 1);
        let mut map = full_map(&topo);
        let usage = vec![NodeUsage {
            completing: true,
            ..Default::default()
        }];
        let cpus = run_node(
            &topo,
            &JobRequest::default(),
            &mut map,
            &usage,
            CrType::CORE,
            false,
        );
        assert_eq!(cpus, 0);
        assert_eq!(map.count(), 4, "early return leaves the map as-is");
    }

    #[test]
    fn completing_gate_skipped_in_test_only() {
        let topo = topo1(1, 4, 1);
        let mut map = full_map(&topo);
        let usage = vec![NodeUsage {
            completing: true,
            ..Default::default()
        }];
        let cpus = run_node(
            &topo,
            &JobRequest::default(),
            &mut map,
            &usage,
            CrType::CORE,
            true,
        );
        assert_eq!(cpus, 4);
    }

    #[test]
    fn cr_cpu_default_dispatch_matches_core_result() {
        let topo = topo1(2, 2, 1);
        let usage = vec![NodeUsage::default()];
        let job = JobRequest::default();

        let mut map_core = full_map(&topo);
        let core = run_node(&topo, &job, &mut map_core, &usage, CrType::CORE, false);
        let mut map_cpu = full_map(&topo);
        let cpu = run_node(&topo, &job, &mut map_cpu, &usage, CrType::CPU, false);

        assert_eq!(core, cpu);
        assert_eq!(map_core, map_cpu);
    }
}
