/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! select-serial – single-node consumable-resource selector
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── bitmap/     – cluster-wide bit vector
//! ├── topology/   – node records + coremap offset index
//! ├── config/     – YAML cluster description loader
//! ├── job/        – job request types, CR flags, modes
//! ├── occupancy/  – node usage records, partitions, rows
//! ├── gres/       – generic-resource collaborator seam
//! ├── resources/  – job-resources output + downstream collaborators
//! └── select/     – the placement engine (filter, allocators, ladder)
//! ```

pub mod bitmap;
pub mod config;
pub mod gres;
pub mod job;
pub mod occupancy;
pub mod resources;
pub mod select;
pub mod topology;

pub use bitmap::Bitmap;
pub use job::{CrType, JobRequest, McSpec, MemoryRequest, NodeSharing, SelectMode};
pub use occupancy::{NodeState, NodeUsage, Partition};
pub use resources::JobResources;
pub use select::{Placement, SelectError, SerialSelector};
pub use topology::{NodeRecord, Topology};
