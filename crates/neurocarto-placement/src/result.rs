// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
Result snapshot of a placement run.
*/

use serde::{Deserialize, Serialize};

use neurocarto_model::CompartmentOnNeuron;

use crate::grid::CoordinateSystem;

/// State of a placement algorithm after a step or a full run.
///
/// Algorithms push one snapshot per step, so earlier states remain available
/// for inspection and backtracking.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmResult {
    pub coordinate_system: CoordinateSystem,
    /// Compartments placed so far, in placement order.
    pub placed_compartments: Vec<CompartmentOnNeuron>,
    pub finished: bool,
}
