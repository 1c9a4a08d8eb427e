// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
End-to-end checks: routing networks built from real placement results, and
the capacity limits of the source partitioning.
*/

use ahash::AHashMap;

use neurocarto_model::{GeneratorParameters, NeuronGenerator, ResourceManager};
use neurocarto_placement::{
    to_logical_compartments, CoordinateSystem, PlacementAlgorithm, RuleSet,
};
use neurocarto_routing::{
    Connection, Hemisphere, InternalPopulation, InternalSource, Network,
    NeuronCoordinate, PlacedCompartment, PlacedNeuron, Population, Projection, Receptor,
    RoutingBuilder, RoutingError, RoutingOptions, SourceOnPadiBusManager,
    SynapseRowMode,
};

/// Places a generated neuron and lifts it into a routable population.
fn place_neuron(seed: u64, num_compartments: usize) -> Option<PlacedNeuron> {
    let parameters = GeneratorParameters {
        num_compartments,
        p_synaptic_input: 0.0,
        max_inputs: 1,
    };
    let (neuron, environment) = NeuronGenerator::new(seed).generate(&parameters).ok()?;
    let resources = ResourceManager::from_neuron(&neuron, &environment).ok()?;
    let result = RuleSet::new().run(CoordinateSystem::new(), &neuron, &resources).ok()?;
    if !result.finished {
        return None;
    }

    let circuits = to_logical_compartments(&result.coordinate_system, &neuron);
    let mut compartments = Vec::new();
    for compartment in neuron.compartments() {
        let placed = circuits.get(&compartment)?;
        if placed.is_empty() {
            return None;
        }
        compartments.push(PlacedCompartment {
            circuits: placed
                .iter()
                .map(|&(x, y)| NeuronCoordinate::new(x, y).unwrap())
                .collect(),
            spike_master: Some(0),
            record_spikes: compartments.is_empty(),
        });
    }
    Some(PlacedNeuron { compartments })
}

#[test]
fn placed_neurons_route_end_to_end() {
    let mut routed = 0;
    for seed in 0..20 {
        let Some(neuron) = place_neuron(seed, 3) else { continue };
        let last = neuron.compartments.len() - 1;

        let mut network = Network::new();
        let population = network.add_population(Population::Internal(InternalPopulation {
            neurons: vec![neuron],
        }));
        let projection = network
            .add_projection(Projection {
                pre: population,
                post: population,
                receptor: Receptor::Inhibitory,
                connections: vec![Connection { pre: (0, 0), post: (0, last), weight: 7 }],
            })
            .unwrap();

        let solution = RoutingBuilder::route(&network, &RoutingOptions::default())
            .unwrap_or_else(|error| panic!("seed {seed} failed to route: {error}"));
        let placed = &solution.connections[&projection];
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].weight, 7);
        assert_eq!(
            solution.synapse_row_modes[&placed[0].row],
            SynapseRowMode::Inhibitory
        );
        assert!(!solution.crossbar.internal_routes.is_empty());
        routed += 1;
    }
    assert!(routed > 0, "no seed produced a placeable neuron");
}

#[test]
fn network_survives_a_serde_round_trip() {
    let mut network = Network::new();
    let population = network.add_population(Population::Internal(InternalPopulation {
        neurons: vec![PlacedNeuron {
            compartments: vec![PlacedCompartment {
                circuits: vec![NeuronCoordinate::new(12, 0).unwrap()],
                spike_master: Some(0),
                record_spikes: true,
            }],
        }],
    }));
    network
        .add_projection(Projection {
            pre: population,
            post: population,
            receptor: Receptor::Excitatory,
            connections: vec![Connection { pre: (0, 0), post: (0, 0), weight: 3 }],
        })
        .unwrap();

    let encoded = serde_json::to_string(&network).unwrap();
    let decoded: Network = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, network);
}

#[test]
fn oversized_source_demand_is_infeasible_not_an_error() {
    // 65 sources behind one event output need 33 of the 32 drivers on
    // their bus.
    let sources: Vec<InternalSource> = (0..65)
        .map(|n| {
            let mut out_degree = AHashMap::new();
            out_degree.insert((Hemisphere::Top, Receptor::Excitatory), 1);
            InternalSource {
                descriptor: neurocarto_routing::CompartmentOnNetwork {
                    population: neurocarto_routing::PopulationDescriptor(0),
                    neuron: n,
                    compartment: 0,
                },
                spike: NeuronCoordinate::new(n % 32, 0).unwrap(),
                out_degree,
            }
        })
        .collect();
    let manager = SourceOnPadiBusManager::default();
    assert_eq!(manager.solve(&sources, &[], &[]), Ok(None));
}

#[test]
fn oversized_source_population_fails_the_builder() {
    let mut network = Network::new();
    let mut neurons: Vec<PlacedNeuron> = Vec::new();
    for n in 0..65 {
        neurons.push(PlacedNeuron {
            compartments: vec![PlacedCompartment {
                circuits: vec![NeuronCoordinate::new(n % 32, 0).unwrap()],
                spike_master: Some(0),
                record_spikes: false,
            }],
        });
    }
    for n in 0..65 {
        neurons.push(PlacedNeuron {
            compartments: vec![PlacedCompartment {
                circuits: vec![NeuronCoordinate::new(n, 1).unwrap()],
                spike_master: Some(0),
                record_spikes: false,
            }],
        });
    }
    let population = network.add_population(Population::Internal(InternalPopulation {
        neurons,
    }));
    network
        .add_projection(Projection {
            pre: population,
            post: population,
            receptor: Receptor::Excitatory,
            connections: (0..65)
                .map(|n| Connection { pre: (n, 0), post: (65 + n, 0), weight: 1 })
                .collect(),
        })
        .unwrap();

    let error = RoutingBuilder::route(&network, &RoutingOptions::default()).unwrap_err();
    assert!(matches!(
        error,
        RoutingError::UnsuccessfulRouting { stage: "source partitioning", .. }
    ));
}
