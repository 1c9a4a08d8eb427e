// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
Feasibility constraints derived from a logical network.

Every projection connection is classified by its source kind and annotated
with the PADI bus it has to travel: internal events reach bus
`event_output % 4` on the target hemisphere's block, background generators
sit on a fixed bus per block, external events get their bus assigned later
by the source partitioning. From the classified lists the constraints expose
per-target in-degrees, per-bus synapse-row demand and the per-bus source
sets the partitioning stage consumes. [`RoutingConstraints::check`] rejects
networks that exceed a hard ceiling before any allocation work starts.

Synaptic input always lands on the column of a compartment's first circuit;
a synapse row contributes at most one synapse to a column, so a target's
in-degree on a bus bounds the rows that bus must drive.
*/

use ahash::AHashMap;

use crate::chip::{
    EventOutput, Hemisphere, NeuronCoordinate, PadiBus, SYNAPSE_ROWS_PER_BUS,
};
use crate::error::{RoutingError, RoutingResult};
use crate::network::{
    Network, Population, PopulationDescriptor, ProjectionDescriptor, Receptor,
};

/// Synapses a single neuron column can receive, one per synapse row of its
/// hemisphere.
pub const MAX_TOTAL_IN_DEGREE: usize = 256;

/// A spiking entity within a population: neuron and compartment index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompartmentOnNetwork {
    pub population: PopulationDescriptor,
    pub neuron: usize,
    pub compartment: usize,
}

/// A connection sourced by a placed neuron.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalConnection {
    pub projection: ProjectionDescriptor,
    pub index: usize,
    pub source: CompartmentOnNetwork,
    /// Spike master circuit emitting the source's events.
    pub spike: NeuronCoordinate,
    pub target: CompartmentOnNetwork,
    /// Circuit whose column receives the synapse.
    pub target_circuit: NeuronCoordinate,
    pub bus: PadiBus,
    pub receptor: Receptor,
}

/// A connection sourced by a background generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundConnection {
    pub projection: ProjectionDescriptor,
    pub index: usize,
    pub source: CompartmentOnNetwork,
    pub target: CompartmentOnNetwork,
    pub target_circuit: NeuronCoordinate,
    pub bus: PadiBus,
    pub receptor: Receptor,
}

/// A connection sourced externally; its bus is chosen by the partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalConnection {
    pub projection: ProjectionDescriptor,
    pub index: usize,
    pub source: CompartmentOnNetwork,
    pub target: CompartmentOnNetwork,
    pub target_circuit: NeuronCoordinate,
    /// Block of the target hemisphere; any bus of the block may serve it.
    pub target_block: Hemisphere,
    pub receptor: Receptor,
}

/// Aggregated view of one PADI bus for the source partitioning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PadiBusConstraints {
    pub num_background_spike_sources: usize,
    /// Placed sources with at least one connection over the bus.
    pub neuron_sources: Vec<NeuronCoordinate>,
    /// Recorded spike masters on the feeding event outputs that source no
    /// connection anywhere.
    pub only_recorded_neurons: Vec<NeuronCoordinate>,
    /// Synapse rows the bus must drive, per receptor.
    pub num_synapse_rows: AHashMap<Receptor, usize>,
}

#[derive(Debug, Clone, Default)]
pub struct RoutingConstraints {
    internal: Vec<InternalConnection>,
    background: Vec<BackgroundConnection>,
    external: Vec<ExternalConnection>,
    /// All recorded spike masters, grouped by event output.
    recorded: AHashMap<EventOutput, Vec<(CompartmentOnNetwork, NeuronCoordinate)>>,
}

impl RoutingConstraints {
    pub fn from_network(network: &Network) -> RoutingResult<Self> {
        let mut constraints = RoutingConstraints::default();

        for (population, kind) in network.populations() {
            if let Population::Internal(internal) = kind {
                for (n, neuron) in internal.neurons.iter().enumerate() {
                    for (c, compartment) in neuron.compartments.iter().enumerate() {
                        if !compartment.record_spikes {
                            continue;
                        }
                        let spike = compartment.spike_source().ok_or_else(|| {
                            RoutingError::UnsuccessfulRouting {
                                stage: "constraint extraction",
                                reason: format!(
                                    "recorded compartment {c} of neuron {n} has no \
                                     spike master"
                                ),
                            }
                        })?;
                        constraints
                            .recorded
                            .entry(spike.event_output())
                            .or_default()
                            .push((
                                CompartmentOnNetwork { population, neuron: n, compartment: c },
                                spike,
                            ));
                    }
                }
            }
        }

        for (descriptor, projection) in network.projections() {
            let pre = network.population(projection.pre)?;
            let post = network.internal_population(projection.post)?;
            for (index, connection) in projection.connections.iter().enumerate() {
                let (neuron, compartment) = connection.post;
                let target_circuit = post
                    .neurons
                    .get(neuron)
                    .and_then(|n| n.compartments.get(compartment))
                    .and_then(|c| c.circuits.first().copied())
                    .ok_or_else(|| RoutingError::UnsuccessfulRouting {
                        stage: "constraint extraction",
                        reason: format!(
                            "connection {index} of projection {} targets a missing \
                             compartment",
                            descriptor.0
                        ),
                    })?;
                let target = CompartmentOnNetwork {
                    population: projection.post,
                    neuron,
                    compartment,
                };
                let block = target_circuit.hemisphere();
                let source = CompartmentOnNetwork {
                    population: projection.pre,
                    neuron: connection.pre.0,
                    compartment: connection.pre.1,
                };
                match pre {
                    Population::Internal(internal) => {
                        let spike = internal
                            .neurons
                            .get(connection.pre.0)
                            .and_then(|n| n.compartments.get(connection.pre.1))
                            .and_then(|c| c.spike_source())
                            .ok_or_else(|| RoutingError::UnsuccessfulRouting {
                                stage: "constraint extraction",
                                reason: format!(
                                    "connection {index} of projection {} has a \
                                     non-spiking source",
                                    descriptor.0
                                ),
                            })?;
                        let bus = PadiBus::new(
                            block,
                            spike.event_output().padi_bus_on_block(),
                        )?;
                        constraints.internal.push(InternalConnection {
                            projection: descriptor,
                            index,
                            source,
                            spike,
                            target,
                            target_circuit,
                            bus,
                            receptor: projection.receptor,
                        });
                    }
                    Population::Background(generator) => {
                        let bus_index = *generator.bus_on_block.get(&block).ok_or_else(
                            || RoutingError::UnsuccessfulRouting {
                                stage: "constraint extraction",
                                reason: format!(
                                    "background population {} serves no bus on the \
                                     target block",
                                    projection.pre.0
                                ),
                            },
                        )?;
                        let bus = PadiBus::new(block, bus_index)?;
                        constraints.background.push(BackgroundConnection {
                            projection: descriptor,
                            index,
                            source,
                            target,
                            target_circuit,
                            bus,
                            receptor: projection.receptor,
                        });
                    }
                    Population::External(_) => {
                        constraints.external.push(ExternalConnection {
                            projection: descriptor,
                            index,
                            source,
                            target,
                            target_circuit,
                            target_block: block,
                            receptor: projection.receptor,
                        });
                    }
                }
            }
        }

        Ok(constraints)
    }

    pub fn internal_connections(&self) -> &[InternalConnection] {
        &self.internal
    }

    pub fn background_connections(&self) -> &[BackgroundConnection] {
        &self.background
    }

    pub fn external_connections(&self) -> &[ExternalConnection] {
        &self.external
    }

    /// Recorded spike masters per event output, sources or not.
    pub fn recorded_on_event_output(
        &self,
    ) -> &AHashMap<EventOutput, Vec<(CompartmentOnNetwork, NeuronCoordinate)>> {
        &self.recorded
    }

    /// Total synaptic in-degree per target circuit column, all buses and
    /// source kinds combined.
    pub fn in_degree(&self) -> AHashMap<CompartmentOnNetwork, usize> {
        let mut degrees: AHashMap<CompartmentOnNetwork, usize> = AHashMap::new();
        for connection in &self.internal {
            *degrees.entry(connection.target).or_default() += 1;
        }
        for connection in &self.background {
            *degrees.entry(connection.target).or_default() += 1;
        }
        for connection in &self.external {
            *degrees.entry(connection.target).or_default() += 1;
        }
        degrees
    }

    /// In-degree per target restricted to one bus, split by receptor.
    pub fn in_degree_on_bus(
        &self,
        bus: PadiBus,
    ) -> AHashMap<(CompartmentOnNetwork, Receptor), usize> {
        let mut degrees: AHashMap<(CompartmentOnNetwork, Receptor), usize> = AHashMap::new();
        for connection in self.internal.iter().filter(|c| c.bus == bus) {
            *degrees.entry((connection.target, connection.receptor)).or_default() += 1;
        }
        for connection in self.background.iter().filter(|c| c.bus == bus) {
            *degrees.entry((connection.target, connection.receptor)).or_default() += 1;
        }
        degrees
    }

    /// Synapse rows the bus must drive: a row carries one receptor and one
    /// synapse per column, so the per-receptor demand is the maximum
    /// in-degree over targets, summed across receptors.
    pub fn num_synapse_rows(&self, bus: PadiBus) -> AHashMap<Receptor, usize> {
        let degrees = self.in_degree_on_bus(bus);
        let mut rows: AHashMap<Receptor, usize> = AHashMap::new();
        for ((_, receptor), degree) in degrees {
            let entry = rows.entry(receptor).or_default();
            *entry = (*entry).max(degree);
        }
        rows
    }

    /// Distinct placed sources with a connection over the bus.
    pub fn sources_on_padi_bus(
        &self,
        bus: PadiBus,
    ) -> Vec<(CompartmentOnNetwork, NeuronCoordinate)> {
        let mut sources = Vec::new();
        for connection in self.internal.iter().filter(|c| c.bus == bus) {
            if !sources.iter().any(|(s, _)| *s == connection.source) {
                sources.push((connection.source, connection.spike));
            }
        }
        sources
    }

    /// Background generators feeding the bus.
    pub fn num_background_sources(
        &self,
        network: &Network,
        bus: PadiBus,
    ) -> RoutingResult<usize> {
        let mut total = 0;
        for (_, population) in network.populations() {
            if let Population::Background(generator) = population {
                if generator.bus_on_block.get(&bus.block) == Some(&bus.index) {
                    total += generator.size;
                }
            }
        }
        Ok(total)
    }

    /// Recorded spike masters that source no connection; their event
    /// outputs only need a recording route.
    pub fn only_recorded_neurons(&self) -> Vec<(CompartmentOnNetwork, NeuronCoordinate)> {
        let mut sources: Vec<CompartmentOnNetwork> = Vec::new();
        for connection in &self.internal {
            if !sources.contains(&connection.source) {
                sources.push(connection.source);
            }
        }
        self.recorded
            .values()
            .flatten()
            .filter(|(key, _)| !sources.contains(key))
            .copied()
            .collect()
    }

    pub fn padi_bus_constraints(
        &self,
        network: &Network,
        bus: PadiBus,
    ) -> RoutingResult<PadiBusConstraints> {
        let only_recorded = self
            .only_recorded_neurons()
            .into_iter()
            .filter(|(_, spike)| {
                spike.event_output().padi_bus_on_block() == bus.index
            })
            .map(|(_, spike)| spike)
            .collect();
        Ok(PadiBusConstraints {
            num_background_spike_sources: self.num_background_sources(network, bus)?,
            neuron_sources: self
                .sources_on_padi_bus(bus)
                .into_iter()
                .map(|(_, spike)| spike)
                .collect(),
            only_recorded_neurons: only_recorded,
            num_synapse_rows: self.num_synapse_rows(bus),
        })
    }

    /// Reject networks no allocation could ever serve.
    pub fn check(&self) -> RoutingResult<()> {
        for (target, degree) in self.in_degree() {
            if degree > MAX_TOTAL_IN_DEGREE {
                return Err(RoutingError::UnsuccessfulRouting {
                    stage: "constraint check",
                    reason: format!(
                        "target compartment {} of neuron {} requires {degree} \
                         synapses, more than the {MAX_TOTAL_IN_DEGREE} rows of its \
                         hemisphere",
                        target.compartment, target.neuron
                    ),
                });
            }
        }
        for bus in PadiBus::all() {
            let rows: usize = self.num_synapse_rows(bus).values().sum();
            if rows > SYNAPSE_ROWS_PER_BUS {
                return Err(RoutingError::UnsuccessfulRouting {
                    stage: "constraint check",
                    reason: format!(
                        "bus {} on block {} requires {rows} synapse rows, more \
                         than the available {SYNAPSE_ROWS_PER_BUS}",
                        bus.index,
                        bus.block.index()
                    ),
                });
            }
            for ((target, _), degree) in self.in_degree_on_bus(bus) {
                if degree > SYNAPSE_ROWS_PER_BUS {
                    return Err(RoutingError::UnsuccessfulRouting {
                        stage: "constraint check",
                        reason: format!(
                            "target compartment {} of neuron {} requires {degree} \
                             synapses over a single bus",
                            target.compartment, target.neuron
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{
        Connection, ExternalPopulation, InternalPopulation, PlacedCompartment,
        PlacedNeuron, Projection,
    };

    fn neuron_at(x: usize, y: usize, record: bool) -> PlacedNeuron {
        PlacedNeuron {
            compartments: vec![PlacedCompartment {
                circuits: vec![NeuronCoordinate::new(x, y).unwrap()],
                spike_master: Some(0),
                record_spikes: record,
            }],
        }
    }

    fn two_neuron_network() -> (Network, PopulationDescriptor) {
        let mut network = Network::new();
        let population = network.add_population(Population::Internal(InternalPopulation {
            neurons: vec![neuron_at(3, 0, true), neuron_at(70, 1, false)],
        }));
        network
            .add_projection(Projection {
                pre: population,
                post: population,
                receptor: Receptor::Excitatory,
                connections: vec![Connection { pre: (0, 0), post: (1, 0), weight: 10 }],
            })
            .unwrap();
        (network, population)
    }

    #[test]
    fn internal_connections_get_the_diagonal_bus() {
        let (network, _) = two_neuron_network();
        let constraints = RoutingConstraints::from_network(&network).unwrap();
        let connection = constraints.internal_connections()[0];
        // Source column 3 -> event output 0 -> bus 0; target row 1 -> bottom
        // block.
        assert_eq!(connection.bus, PadiBus::new(Hemisphere::Bottom, 0).unwrap());
        assert_eq!(connection.spike.column(), 3);

        let aggregated = constraints
            .padi_bus_constraints(&network, connection.bus)
            .unwrap();
        assert_eq!(aggregated.neuron_sources, vec![connection.spike]);
        assert_eq!(aggregated.num_background_spike_sources, 0);
        assert!(aggregated.only_recorded_neurons.is_empty());
        assert_eq!(aggregated.num_synapse_rows.get(&Receptor::Excitatory), Some(&1));
    }

    #[test]
    fn synapse_rows_are_max_over_targets_per_receptor() {
        let mut network = Network::new();
        let population = network.add_population(Population::Internal(InternalPopulation {
            neurons: vec![
                neuron_at(0, 0, false),
                neuron_at(1, 0, false),
                neuron_at(64, 0, false),
            ],
        }));
        // Two excitatory synapses onto neuron 2, one from each source; both
        // sources share event output 0, so both land on the same bus and the
        // row demand is 2.
        network
            .add_projection(Projection {
                pre: population,
                post: population,
                receptor: Receptor::Excitatory,
                connections: vec![
                    Connection { pre: (0, 0), post: (2, 0), weight: 1 },
                    Connection { pre: (1, 0), post: (2, 0), weight: 1 },
                ],
            })
            .unwrap();
        let constraints = RoutingConstraints::from_network(&network).unwrap();
        let bus = PadiBus::new(Hemisphere::Top, 0).unwrap();
        assert_eq!(
            constraints.num_synapse_rows(bus).get(&Receptor::Excitatory),
            Some(&2)
        );
        constraints.check().unwrap();
    }

    #[test]
    fn excessive_in_degree_fails_the_check() {
        let mut network = Network::new();
        let internal = network.add_population(Population::Internal(InternalPopulation {
            neurons: vec![neuron_at(0, 0, false)],
        }));
        let external = network.add_population(Population::External(ExternalPopulation {
            size: MAX_TOTAL_IN_DEGREE + 1,
        }));
        let connections = (0..MAX_TOTAL_IN_DEGREE + 1)
            .map(|i| Connection { pre: (i, 0), post: (0, 0), weight: 1 })
            .collect();
        network
            .add_projection(Projection {
                pre: external,
                post: internal,
                receptor: Receptor::Excitatory,
                connections,
            })
            .unwrap();
        let constraints = RoutingConstraints::from_network(&network).unwrap();
        assert!(matches!(
            constraints.check(),
            Err(RoutingError::UnsuccessfulRouting { stage: "constraint check", .. })
        ));
    }

    #[test]
    fn only_recorded_neurons_exclude_sources() {
        let (network, _) = two_neuron_network();
        let constraints = RoutingConstraints::from_network(&network).unwrap();
        // Neuron 0 is recorded but also a source, so nothing is
        // recorded-only.
        assert!(constraints.only_recorded_neurons().is_empty());
        assert_eq!(constraints.recorded_on_event_output().len(), 1);
    }
}
