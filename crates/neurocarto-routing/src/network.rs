// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
Logical spiking network over placed neurons.

Populations come in three kinds: internal populations of placed
multicompartment neurons, background generators feeding a fixed PADI bus per
hemisphere, and external inputs entering over the FPGA link. Projections
connect populations per receptor with an explicit connection list. The
network is the read-only input to [`crate::constraints::RoutingConstraints`];
it carries no hardware decisions of its own.
*/

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::chip::{Hemisphere, NeuronCoordinate};
use crate::error::{RoutingError, RoutingResult};

/// Synaptic receptor kind of a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Receptor {
    Excitatory,
    Inhibitory,
}

impl Receptor {
    pub const ALL: [Receptor; 2] = [Receptor::Excitatory, Receptor::Inhibitory];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PopulationDescriptor(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectionDescriptor(pub usize);

/// One compartment of a placed neuron: its circuits on the grid, which of
/// them emits the compartment's spikes, and whether those spikes are
/// recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedCompartment {
    pub circuits: Vec<NeuronCoordinate>,
    /// Index into `circuits`; `None` for compartments that never spike.
    pub spike_master: Option<usize>,
    pub record_spikes: bool,
}

impl PlacedCompartment {
    /// The circuit emitting this compartment's spikes, if any.
    pub fn spike_source(&self) -> Option<NeuronCoordinate> {
        self.spike_master.and_then(|i| self.circuits.get(i).copied())
    }
}

/// A placed multicompartment neuron, one entry per compartment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedNeuron {
    pub compartments: Vec<PlacedCompartment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalPopulation {
    pub neurons: Vec<PlacedNeuron>,
}

/// Background spike generators; each hemisphere entry names the bus the
/// generator bank feeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundPopulation {
    pub bus_on_block: AHashMap<Hemisphere, usize>,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalPopulation {
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Population {
    Internal(InternalPopulation),
    Background(BackgroundPopulation),
    External(ExternalPopulation),
}

/// One synaptic connection of a projection. Endpoints address
/// (neuron index, compartment index) within the pre/post population;
/// background and external sources use compartment 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub pre: (usize, usize),
    pub post: (usize, usize),
    pub weight: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub pre: PopulationDescriptor,
    pub post: PopulationDescriptor,
    pub receptor: Receptor,
    pub connections: Vec<Connection>,
}

/// The logical network: populations plus projections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    populations: Vec<Population>,
    projections: Vec<Projection>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_population(&mut self, population: Population) -> PopulationDescriptor {
        self.populations.push(population);
        PopulationDescriptor(self.populations.len() - 1)
    }

    /// Projection targets must be internal populations; sources may be any
    /// population kind.
    pub fn add_projection(
        &mut self,
        projection: Projection,
    ) -> RoutingResult<ProjectionDescriptor> {
        self.population(projection.pre)?;
        let post = self.population(projection.post)?;
        if !matches!(post, Population::Internal(_)) {
            return Err(RoutingError::InvalidProjectionEndpoint);
        }
        self.projections.push(projection);
        Ok(ProjectionDescriptor(self.projections.len() - 1))
    }

    pub fn population(&self, descriptor: PopulationDescriptor) -> RoutingResult<&Population> {
        self.populations
            .get(descriptor.0)
            .ok_or(RoutingError::UnknownPopulation(descriptor.0))
    }

    pub fn internal_population(
        &self,
        descriptor: PopulationDescriptor,
    ) -> RoutingResult<&InternalPopulation> {
        match self.population(descriptor)? {
            Population::Internal(population) => Ok(population),
            _ => Err(RoutingError::InvalidProjectionEndpoint),
        }
    }

    pub fn populations(&self) -> impl Iterator<Item = (PopulationDescriptor, &Population)> {
        self.populations
            .iter()
            .enumerate()
            .map(|(i, p)| (PopulationDescriptor(i), p))
    }

    pub fn projections(&self) -> impl Iterator<Item = (ProjectionDescriptor, &Projection)> {
        self.projections
            .iter()
            .enumerate()
            .map(|(i, p)| (ProjectionDescriptor(i), p))
    }

    pub fn projection(&self, descriptor: ProjectionDescriptor) -> Option<&Projection> {
        self.projections.get(descriptor.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_circuit_neuron(x: usize, y: usize) -> PlacedNeuron {
        PlacedNeuron {
            compartments: vec![PlacedCompartment {
                circuits: vec![NeuronCoordinate::new(x, y).unwrap()],
                spike_master: Some(0),
                record_spikes: false,
            }],
        }
    }

    #[test]
    fn projections_must_target_internal_populations() {
        let mut network = Network::new();
        let internal = network.add_population(Population::Internal(InternalPopulation {
            neurons: vec![single_circuit_neuron(0, 0)],
        }));
        let external =
            network.add_population(Population::External(ExternalPopulation { size: 1 }));

        let forward = Projection {
            pre: external,
            post: internal,
            receptor: Receptor::Excitatory,
            connections: vec![Connection { pre: (0, 0), post: (0, 0), weight: 32 }],
        };
        assert!(network.add_projection(forward).is_ok());

        let backward = Projection {
            pre: internal,
            post: external,
            receptor: Receptor::Excitatory,
            connections: vec![],
        };
        assert_eq!(
            network.add_projection(backward),
            Err(RoutingError::InvalidProjectionEndpoint)
        );
    }

    #[test]
    fn unknown_population_is_reported() {
        let network = Network::new();
        assert_eq!(
            network.population(PopulationDescriptor(3)),
            Err(RoutingError::UnknownPopulation(3))
        );
    }
}
