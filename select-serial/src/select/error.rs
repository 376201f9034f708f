/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the serial selector.
//!
//! Two layers, mirroring how failures actually arise:
//!
//! * [`UnusableReason`] — why one specific node cannot host the job
//!   (low-level, carries the exact gate that fired).
//! * [`SelectError`] — top-level failure returned from
//!   [`SerialSelector::job_test()`](super::SerialSelector::job_test).
//!
//! [`SelectError::Infeasible`] is the common, expected outcome for a busy
//! cluster; the scheduler simply retries the job later.  The other variants
//! indicate a malformed request or an internal inconsistency and are meant
//! to be logged loudly.

use thiserror::Error;

use crate::occupancy::NodeState;

// ── Per-node rejection reasons ────────────────────────────────────────────────

/// Why a specific node was rejected for the job.
///
/// Carried inside [`SelectError::RequiredNodeUnusable`] so the caller knows
/// both which required node failed and which gate dropped it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnusableReason {
    /// Free memory on the node is below the job's effective minimum.
    InsufficientMemory { free_mb: u64, required_mb: u64 },
    /// The GRES evaluator rejected the node.
    GresRejected,
    /// The node's sharing state is incompatible with the job's request.
    SharingConflict { state: NodeState },
    /// Jobs already running on the node conflict with the job's sharing
    /// request.
    Busy,
    /// No CPUs remain for the job on this node after the per-node
    /// allocator and its clamps ran.
    NoCpus,
    /// The node offers more CPUs than the exclusive job's `max_cpus` cap.
    ExceedsMaxCpus { node_cpus: u16, max_cpus: u32 },
}

impl std::fmt::Display for UnusableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnusableReason::InsufficientMemory {
                free_mb,
                required_mb,
            } => write!(f, "free memory {free_mb}MB below required {required_mb}MB"),

            UnusableReason::GresRejected => write!(f, "generic resources unavailable"),

            UnusableReason::SharingConflict { state } => {
                write!(f, "node sharing state {state:?} conflicts with the job request")
            }

            UnusableReason::Busy => write!(f, "running jobs conflict with the sharing request"),

            UnusableReason::NoCpus => write!(f, "no usable cpus for this job"),

            UnusableReason::ExceedsMaxCpus {
                node_cpus,
                max_cpus,
            } => write!(
                f,
                "node provides {node_cpus} cpus, above the exclusive job's max_cpus {max_cpus}"
            ),
        }
    }
}

// ── Topology inconsistencies ──────────────────────────────────────────────────

/// Inconsistency between the caller's view and the cluster topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyInconsistency {
    /// The caller's node count disagrees with the node table.
    NodeCount { expected: usize, got: usize },
    /// Laying selected cores into the job core bitmap ran past its end; a
    /// drain request was raised for the node.
    CoreIndexOverflow { node: String },
}

impl std::fmt::Display for TopologyInconsistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologyInconsistency::NodeCount { expected, got } => {
                write!(f, "caller node count {got} disagrees with node table {expected}")
            }
            TopologyInconsistency::CoreIndexOverflow { node } => {
                write!(f, "core bitmap index overflow on node '{node}'")
            }
        }
    }
}

// ── Top-level selector errors ─────────────────────────────────────────────────

/// Top-level error returned by
/// [`SerialSelector::job_test()`](super::SerialSelector::job_test).
#[derive(Debug, Error)]
pub enum SelectError {
    /// No node satisfies the request under current occupancy.  Expected and
    /// frequent; the job stays queued.
    #[error("job {job_id}: no allocation possible under current occupancy")]
    Infeasible { job_id: u32 },

    /// A node the job requires was filtered out or has zero usable CPUs.
    /// Fatal for this placement.
    #[error("job {job_id}: required node '{node}' unusable: {reason}")]
    RequiredNodeUnusable {
        job_id: u32,
        node: String,
        reason: UnusableReason,
    },

    /// The caller's inputs disagree with the cluster topology.
    #[error("cluster topology inconsistency: {0}")]
    InconsistentTopology(TopologyInconsistency),

    /// A collaborator (resources builder or task distribution) failed after
    /// a placement was found.  The partial allocation is discarded.
    #[error("{stage} failed after placement: {source}")]
    DownstreamFailure {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The mode requires a partition association the job does not have.
    #[error("job {job_id}: no partition association for this mode")]
    BadMode { job_id: u32 },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
