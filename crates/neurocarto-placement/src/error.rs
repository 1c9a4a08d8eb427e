// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
Error types of the placement crate.

Most variants abort a placement run. [`PlacementError::NoAdjacentConnection`]
is the one recoverable failure: the rule set catches it and retries with a
distant connection.
*/

use neurocarto_model::ModelError;

/// Result alias used throughout the placement crate.
pub type PlacementResult<T> = Result<T, PlacementError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlacementError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Coordinate out of range: ({x}, {y})")]
    CoordinateOutOfRange { x: usize, y: usize },

    #[error("Column limit out of range: {x_max}")]
    ColumnLimitOutOfRange { x_max: usize },

    #[error("Shared-line connection blocked between columns {x_source} and {x_target}")]
    ConnectionBlocked { x_source: usize, x_target: usize },

    #[error("No valid placement spot found")]
    NoPlacementSpot,

    #[error("Overlap during placement at ({x}, {y})")]
    OverlapDuringPlacement { x: usize, y: usize },

    #[error("Start of bridge already occupied at column {x}")]
    BridgeStartOccupied { x: usize },

    #[error("Too many branches for a bridge")]
    TooManyBranches,

    #[error("Too many unplaced leafs for a single placement step")]
    TooManyUnplacedLeafs,

    #[error("No adjacent neuron circuits found to connect")]
    NoAdjacentConnection,

    #[error("No distant connection possible")]
    NoDistantConnection,

    #[error("Compartment already placed")]
    AlreadyPlaced,

    #[error("Duplicate starting state in parallel search")]
    DuplicateParallelState,

    #[error("Algorithm not implemented")]
    UnimplementedAlgorithm,
}
