/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Generic-resource (GRES) feasibility seam.
//!
//! The selector never interprets generic resources itself.  It asks a
//! [`GresEvaluator`] two questions per node:
//!
//! 1. During the node-state filter: "could this job's GRES request ever be
//!    satisfied here?" (`test_only = true`, no core map).
//! 2. After core selection: "how many CPUs does GRES affinity leave usable,
//!    given the cores that were just picked?"  The evaluator may clear core
//!    bits that its affinity rules forbid; the caller treats the post-call
//!    map as authoritative.
//!
//! The return value is a CPU count: `0` rejects the node outright,
//! [`GRES_CPUS_UNRESTRICTED`] means the evaluator imposes no CPU limit.

use std::ops::Range;

use serde::Deserialize;

use crate::bitmap::Bitmap;

/// CPU count meaning "no restriction from GRES".
pub const GRES_CPUS_UNRESTRICTED: u32 = u32::MAX;

/// One generic resource requested by a job, e.g. `gpu: 2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GresRequest {
    pub name: String,
    pub count: u64,
}

/// One generic resource available on a node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GresPool {
    pub name: String,
    pub count: u64,
}

/// Feasibility oracle for generic resources.
pub trait GresEvaluator {
    /// Return the number of CPUs usable on the node given the job's GRES
    /// request, or `0` to reject the node.
    ///
    /// `core_map` is present only in the post-selection call; `core_range`
    /// is the node's span within it.  Implementations may clear bits inside
    /// that span to express affinity constraints.
    #[allow(clippy::too_many_arguments)]
    fn job_test(
        &self,
        job_gres: &[GresRequest],
        node_gres: &[GresPool],
        test_only: bool,
        core_map: Option<&mut Bitmap>,
        core_range: Range<usize>,
        job_id: u32,
        node_name: &str,
    ) -> u32;
}

/// Count-based evaluator: a node qualifies when every requested resource
/// name is present with at least the requested count.  Imposes no CPU limit
/// and no core affinity.
#[derive(Debug, Default)]
pub struct CountingGres;

impl GresEvaluator for CountingGres {
    fn job_test(
        &self,
        job_gres: &[GresRequest],
        node_gres: &[GresPool],
        _test_only: bool,
        _core_map: Option<&mut Bitmap>,
        _core_range: Range<usize>,
        _job_id: u32,
        _node_name: &str,
    ) -> u32 {
        for req in job_gres {
            let available = node_gres
                .iter()
                .find(|pool| pool.name == req.name)
                .map(|pool| pool.count)
                .unwrap_or(0);
            if available < req.count {
                return 0;
            }
        }
        GRES_CPUS_UNRESTRICTED
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
