// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
Baseline strategy for unbranched neurons.

Lays the compartments of a pure chain out left to right on the top row,
starting at column zero, and couples consecutive compartments over the shared
line. No bridges, no backtracking, no second row. Useful as a reference
result and for tests that need a placement without the rule machinery.
*/

use tracing::debug;

use neurocarto_model::{Neuron, ResourceManager};

use crate::algorithm::PlacementAlgorithm;
use crate::error::{PlacementError, PlacementResult};
use crate::grid::CoordinateSystem;
use crate::result::AlgorithmResult;

#[derive(Debug, Clone, Default)]
pub struct Dummy {
    results: Vec<AlgorithmResult>,
}

impl Dummy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> &[AlgorithmResult] {
        &self.results
    }
}

impl PlacementAlgorithm for Dummy {
    fn run(
        &mut self,
        initial: CoordinateSystem,
        neuron: &Neuron,
        resources: &ResourceManager,
    ) -> PlacementResult<AlgorithmResult> {
        self.reset();
        // Chain order: walk from one end.
        let mut start = None;
        for compartment in neuron.compartments() {
            let degree = neuron.degree(compartment)?;
            if degree > 2 {
                return Err(PlacementError::TooManyBranches);
            }
            if start.is_none() && degree <= 1 {
                start = Some(compartment);
            }
        }
        let start = start.ok_or(neurocarto_model::ModelError::LoopedChain)?;
        let order = if neuron.num_compartments() == 1 {
            vec![start]
        } else {
            let next = neuron
                .neighbours(start)?
                .into_iter()
                .next()
                .ok_or(neurocarto_model::ModelError::EmptyNeuron)?;
            let mut order = vec![start];
            order.extend(neuron.chain_from(next, start)?);
            order
        };

        let mut coordinate_system = initial;
        let mut x = 0;
        let mut previous_end: Option<usize> = None;
        let mut placed_compartments = Vec::new();
        for compartment in order {
            let required = resources.get_config(compartment)?;
            // Interior compartments need separate circuits for the incoming
            // and the outgoing shared attachment.
            let width = required.total.max(neuron.degree(compartment)?.min(2)).max(1);
            if required.bottom > 0 {
                // Single-row layout cannot satisfy a bottom-row demand.
                return Err(PlacementError::NoPlacementSpot);
            }
            for column in x..x + width {
                coordinate_system.assign_compartment_adjacent(column, 0, compartment)?;
                if column > x {
                    coordinate_system.set_switch_right(column - 1, 0, true)?;
                }
            }
            if let Some(end) = previous_end {
                coordinate_system.connect_shared(end, x, 0)?;
            }
            previous_end = Some(x + width - 1);
            x += width + 1;
            placed_compartments.push(compartment);
        }
        debug!(columns = x, "linear placement done");
        let result = AlgorithmResult {
            coordinate_system,
            placed_compartments,
            finished: true,
        };
        self.results.push(result.clone());
        Ok(result)
    }

    fn reset(&mut self) {
        self.results.clear();
    }

    fn fresh(&self) -> Box<dyn PlacementAlgorithm> {
        Box::new(Self::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::valid;
    use neurocarto_model::{
        Compartment, CompartmentConnection, Environment, Mechanism, ParameterInterval,
    };

    fn chain(n: usize) -> (Neuron, ResourceManager) {
        let mut neuron = Neuron::new();
        let compartments: Vec<_> = (0..n)
            .map(|_| {
                let mut c = Compartment::new();
                c.add(Mechanism::Capacitance {
                    capacitance: ParameterInterval::new(1.0, 1.0).unwrap(),
                })
                .unwrap();
                neuron.add_compartment(c)
            })
            .collect();
        for pair in compartments.windows(2) {
            neuron
                .add_compartment_connection(pair[0], pair[1], CompartmentConnection::default())
                .unwrap();
        }
        let resources = ResourceManager::from_neuron(&neuron, &Environment::new()).unwrap();
        (neuron, resources)
    }

    #[test]
    fn places_chains_of_any_length() {
        for n in [1, 2, 5] {
            let (neuron, resources) = chain(n);
            let mut algorithm = Dummy::new();
            let result = algorithm.run(CoordinateSystem::new(), &neuron, &resources).unwrap();
            assert!(result.finished);
            assert_eq!(result.placed_compartments.len(), n);
            assert!(valid(&result.coordinate_system, &neuron, &resources).unwrap());
        }
    }

    #[test]
    fn refuses_branched_neurons() {
        let mut neuron = Neuron::new();
        let center = neuron.add_compartment(Compartment::new());
        for _ in 0..3 {
            let leaf = neuron.add_compartment(Compartment::new());
            neuron
                .add_compartment_connection(center, leaf, CompartmentConnection::default())
                .unwrap();
        }
        let resources = ResourceManager::from_neuron(&neuron, &Environment::new()).unwrap();
        let mut algorithm = Dummy::new();
        assert_eq!(
            algorithm.run(CoordinateSystem::new(), &neuron, &resources),
            Err(PlacementError::TooManyBranches)
        );
    }
}
