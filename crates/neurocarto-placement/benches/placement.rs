// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
Placement benchmarks: rule-based strategy throughput and grid cleanup.
*/

use criterion::{criterion_group, criterion_main, Criterion};

use neurocarto_model::{GeneratorParameters, NeuronGenerator, ResourceManager};
use neurocarto_placement::{CoordinateSystem, NeuronCircuit, PlacementAlgorithm, RuleSet};

fn ruleset_chain(c: &mut Criterion) {
    let parameters = GeneratorParameters {
        num_compartments: 5,
        p_synaptic_input: 0.0,
        max_inputs: 1,
    };
    let (neuron, environment) = NeuronGenerator::new(3).generate(&parameters).unwrap();
    let resources = ResourceManager::from_neuron(&neuron, &environment).unwrap();

    c.bench_function("ruleset_place_5_compartments", |b| {
        b.iter(|| {
            let mut algorithm = RuleSet::new();
            let _ = algorithm.run(CoordinateSystem::new(), &neuron, &resources);
        })
    });
}

fn grid_cleanup(c: &mut Criterion) {
    let mut cs = CoordinateSystem::new();
    for x in 0..64 {
        let cell = NeuronCircuit {
            switch_right: x % 3 == 0,
            switch_top_bottom: x % 5 == 0,
            switch_shared_right: x % 2 == 0,
            switch_circuit_shared: false,
            switch_circuit_shared_conductance: false,
            compartment: None,
        };
        cs.set(x, x % 2, cell).unwrap();
    }

    c.bench_function("grid_cleanup_64_cells", |b| {
        b.iter(|| {
            let mut grid = cs.clone();
            grid.clear_empty_connections();
            grid
        })
    });
}

criterion_group!(benches, ruleset_chain, grid_cleanup);
criterion_main!(benches);
