// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
Placement of multicompartment neurons onto the analog circuit grid.

The chip offers two rows of 256 neuron circuits. Each circuit carries five
switches: membrane connections to the right and the other row, a shared-line
segment switch, and two attachments of the membrane to the shared line,
direct or through a conductance. [`grid::CoordinateSystem`] models the
switch fabric; a placement maps every compartment of a
[`neurocarto_model::Neuron`] to a set of circuits and wires the compartment
connections over shared-line segments.

Strategies implement [`algorithm::PlacementAlgorithm`]:

- [`ruleset::RuleSet`] grows the neuron outward from the grid center by
  structural rules, the default choice,
- [`brute_force::BruteForce`] searches switch configurations exhaustively,
- [`evolutionary::Evolutionary`] scores configurations genetically (search
  loop pending),
- [`dummy::Dummy`] lays out unbranched chains only.

[`algorithm::valid`] judges any configuration against the target neuron,
independent of the strategy that produced it.
*/

pub mod algorithm;
pub mod brute_force;
pub mod circuit;
pub mod dummy;
pub mod error;
pub mod evolutionary;
pub mod grid;
pub mod result;
pub mod ruleset;

pub use algorithm::{
    construct_neuron, isomorphism_resources, resource_efficiency, to_logical_compartments, valid,
    ConstructedNeuron, PlacementAlgorithm,
};
pub use brute_force::{BruteForce, BruteForceParameters};
pub use circuit::NeuronCircuit;
pub use dummy::Dummy;
pub use error::{PlacementError, PlacementResult};
pub use evolutionary::{fitness, Evolutionary, EvolutionaryParameters, Fitness};
pub use grid::{CoordinateSystem, GRID_COLUMNS, GRID_ROWS};
pub use result::AlgorithmResult;
pub use ruleset::RuleSet;
