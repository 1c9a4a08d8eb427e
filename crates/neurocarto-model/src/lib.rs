// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
# neurocarto-model

Abstract multicompartment neuron model.

A neuron is an undirected graph of compartments connected by conductances.
Compartments carry mechanisms (capacitance, synaptic inputs) which translate,
through the synaptic environment of the network, into hardware resource
requirements measured in physical neuron circuits. The [`ResourceManager`]
aggregates those requirements per compartment as the currency consumed by the
placement algorithms.

## Architecture

- `number` — [`NumberTopBottom`], the resource-count triple with its
  componentwise partial order.
- `graph` — [`Neuron`], an arena-backed graph with stable, generation-counted
  descriptors, neighbour classification and isomorphism search.
- `mechanism` — the closed set of mechanism kinds and their hardware demands.
- `compartment` — the per-compartment mechanism container.
- `environment` — synaptic input demands per compartment.
- `resources` — [`ResourceManager`], requirement aggregation.
- `generator` — seeded random neuron synthesis for tests and benchmarks.
*/

pub mod compartment;
pub mod environment;
pub mod error;
pub mod generator;
pub mod graph;
pub mod mechanism;
pub mod number;
pub mod resources;

pub use compartment::{Compartment, MechanismOnCompartment};
pub use environment::{Environment, SynapticInputEnvironment, SynapticInputKind};
pub use error::{ModelError, ModelResult};
pub use generator::{GeneratorParameters, NeuronGenerator};
pub use graph::{
    CompartmentConnection, CompartmentConnectionOnNeuron, CompartmentNeighbours,
    CompartmentOnNeuron, Neuron,
};
pub use mechanism::{
    HardwareConstraint, HardwareResourceKind, HardwareResourcesWithConstraints, Mechanism,
    MechanismKind, ParameterInterval,
};
pub use number::NumberTopBottom;
pub use resources::ResourceManager;
