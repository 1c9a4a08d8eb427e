// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
Routing error taxonomy.
*/

use thiserror::Error;

pub type RoutingResult<T> = Result<T, RoutingError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// The network cannot be routed; `stage` names the pipeline step that
    /// proved infeasibility.
    #[error("unsuccessful routing during {stage}: {reason}")]
    UnsuccessfulRouting { stage: &'static str, reason: String },

    /// A population or projection referenced an entity the network does not
    /// contain.
    #[error("unknown population {0}")]
    UnknownPopulation(usize),

    #[error("projection endpoint kind does not match population kind")]
    InvalidProjectionEndpoint,

    /// An allocation request without labels or shapes is meaningless.
    #[error("allocation request with empty labels or shapes")]
    InvalidAllocationRequest,

    /// Requests in one dependent label group must offer the same number of
    /// candidate labels.
    #[error("dependent label group {0} has inhomogeneous label counts")]
    InhomogeneousLabelGroup(usize),

    /// A partitioned source group would need events across a route that was
    /// disabled beforehand.
    #[error("event transfer across disabled internal route required")]
    DisabledRouteInUse,

    /// The constructed partition failed its own consistency check.
    #[error("constructed source partition is not valid")]
    InvalidPartition,

    /// A solved driver allocation failed its own consistency check.
    #[error("driver allocations are not a valid solution to the requests")]
    InvalidAllocation,

    #[error("coordinate out of range: {0}")]
    CoordinateOutOfRange(usize),
}
