// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
Genetic placement search (work in progress).

The genome is the raw switch configuration of a grid window. Individuals are
scored by [`fitness`], which rewards partial progress towards a valid
placement, so configurations that implement the wrong neuron still rank above
configurations that implement nothing.

The search loop itself is not wired up yet. The intended shape, which the
parameters below already describe:

1. seed a population of `population_size` random windows,
2. score, keep `number_hall_of_fame` elites, fill the rest by tournaments of
   `tournament_contestants`,
3. cross over column blocks of `mating_block_size` with probability `p_mate`,
4. mutate single switch states (`p_mutate_gene`), shift whole windows
   sideways (`p_shift`, between `min_shift` and `max_shift` columns) and
   grow or shrink the window (`p_add`, `p_remove`),
5. stop on a perfect score, `run_limit` generations or `time_limit`.

[`Evolutionary::run`] returns [`PlacementError::UnimplementedAlgorithm`]
until the loop lands. The fitness terms are final and tested.
*/

use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use neurocarto_model::{Environment, Neuron, ResourceManager};

use crate::algorithm::{construct_neuron, isomorphism_resources, PlacementAlgorithm};
use crate::error::{PlacementError, PlacementResult};
use crate::grid::{CoordinateSystem, GRID_COLUMNS};
use crate::result::AlgorithmResult;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvolutionaryParameters {
    pub seed: u64,
    pub time_limit: Duration,
    /// Generation limit.
    pub run_limit: usize,
    /// Columns of the genome window.
    pub x_max: usize,
    pub parallel_threads: usize,
    pub population_size: usize,
    pub number_hall_of_fame: usize,
    pub tournament_contestants: usize,
    pub p_mate: f64,
    /// Columns exchanged as one block during crossover.
    pub mating_block_size: usize,
    pub p_mutate_individual: f64,
    pub p_mutate_gene: f64,
    /// Gene mutation probability when seeding the initial population.
    pub p_mutate_initial: f64,
    pub p_shift: f64,
    pub min_shift: usize,
    pub max_shift: usize,
    pub p_add: f64,
    pub p_remove: f64,
    /// Couple add and remove so the window size stays put.
    pub together_add_remove: bool,
    pub number_columns_add_remove: usize,
    pub lower_limit_add_remove: usize,
    pub upper_limit_add_remove: usize,
}

impl Default for EvolutionaryParameters {
    fn default() -> Self {
        Self {
            seed: 1234,
            time_limit: Duration::from_secs(300),
            run_limit: 100,
            x_max: GRID_COLUMNS / 2,
            parallel_threads: 4,
            population_size: 128,
            number_hall_of_fame: 4,
            tournament_contestants: 3,
            p_mate: 0.6,
            mating_block_size: 8,
            p_mutate_individual: 0.4,
            p_mutate_gene: 0.05,
            p_mutate_initial: 0.3,
            p_shift: 0.2,
            min_shift: 1,
            max_shift: 8,
            p_add: 0.2,
            p_remove: 0.2,
            together_add_remove: false,
            number_columns_add_remove: 2,
            lower_limit_add_remove: 0,
            upper_limit_add_remove: 16,
        }
    }
}

/// Partial scores of one grid configuration, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Fitness {
    /// Closeness of the compartment count to the target.
    pub compartments: f64,
    /// Closeness of the conductance connection count to the target.
    pub connections: f64,
    /// Circuit usage, with a grace band for moderate over-allocation.
    pub resources: f64,
    /// Share of target compartments covered by the best subgraph match.
    pub isomorphism: f64,
    /// Share of recorded compartments owning a top-row circuit, where the
    /// readout chain sits.
    pub recording: f64,
}

impl Fitness {
    /// Weighted sum used for selection. Matching the target graph dominates;
    /// recording is a tie breaker.
    pub fn combined(&self) -> f64 {
        100.0 * self.compartments
            + 100.0 * self.connections
            + 50.0 * self.resources
            + 200.0 * self.isomorphism
            + 10.0 * self.recording
    }
}

fn count_score(built: usize, target: usize) -> f64 {
    let target = target.max(1);
    let diff = built.abs_diff(target);
    if diff >= target {
        0.0
    } else {
        (target - diff) as f64 / target as f64
    }
}

/// Scores a grid configuration against the target neuron.
pub fn fitness(
    coordinate_system: &CoordinateSystem,
    neuron: &Neuron,
    resources: &ResourceManager,
    environment: &Environment,
) -> PlacementResult<Fitness> {
    let constructed = construct_neuron(coordinate_system, GRID_COLUMNS)?;
    let compartments = if neuron.num_compartments() == 0 {
        0.0
    } else {
        count_score(constructed.neuron.num_compartments(), neuron.num_compartments())
    };
    let connections = if neuron.num_compartment_connections() == 0 {
        if constructed.neuron.num_compartment_connections() == 0 { 1.0 } else { 0.0 }
    } else {
        count_score(
            constructed.neuron.num_compartment_connections(),
            neuron.num_compartment_connections(),
        )
    };

    let allocated: usize = constructed.allocated.values().map(|n| n.total).sum();
    let required = resources.total().total;
    let resources_score = if allocated == 0 || required == 0 {
        0.0
    } else {
        let efficiency = required as f64 / allocated as f64;
        if efficiency >= 1.0 {
            1.0 / efficiency
        } else if efficiency >= 0.7 {
            1.0
        } else {
            efficiency / 0.7
        }
    };

    let (nulls, mapping) =
        isomorphism_resources(coordinate_system, neuron, resources, GRID_COLUMNS)?;
    let isomorphism = if neuron.num_compartments() == 0 {
        0.0
    } else {
        (neuron.num_compartments() - nulls.min(neuron.num_compartments())) as f64
            / neuron.num_compartments() as f64
    };

    let recorded: Vec<_> = environment.recorded().collect();
    let recording = if recorded.is_empty() {
        1.0
    } else {
        let mut reachable = 0;
        for target in &recorded {
            let covered = mapping.iter().any(|(tag, mapped)| {
                *mapped == *target
                    && coordinate_system
                        .find_neuron_circuits(*tag)
                        .iter()
                        .any(|&(_, y)| y == 0)
            });
            if covered {
                reachable += 1;
            }
        }
        reachable as f64 / recorded.len() as f64
    };

    Ok(Fitness {
        compartments,
        connections,
        resources: resources_score,
        isomorphism,
        recording,
    })
}

/// Genetic placement strategy. Scoring works; the generation loop does not
/// exist yet, so [`PlacementAlgorithm::run`] always fails.
#[derive(Debug, Clone)]
pub struct Evolutionary {
    parameters: EvolutionaryParameters,
    #[allow(dead_code)]
    rng: StdRng,
}

impl Evolutionary {
    pub fn new(parameters: EvolutionaryParameters) -> Self {
        Self { parameters, rng: StdRng::seed_from_u64(parameters.seed) }
    }

    pub fn parameters(&self) -> &EvolutionaryParameters {
        &self.parameters
    }
}

impl Default for Evolutionary {
    fn default() -> Self {
        Self::new(EvolutionaryParameters::default())
    }
}

impl PlacementAlgorithm for Evolutionary {
    fn run(
        &mut self,
        _initial: CoordinateSystem,
        _neuron: &Neuron,
        _resources: &ResourceManager,
    ) -> PlacementResult<AlgorithmResult> {
        Err(PlacementError::UnimplementedAlgorithm)
    }

    fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.parameters.seed);
    }

    fn fresh(&self) -> Box<dyn PlacementAlgorithm> {
        Box::new(Self::new(self.parameters))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurocarto_model::{
        Compartment, CompartmentConnection, CompartmentOnNeuron, Mechanism, ParameterInterval,
    };

    fn single_circuit_compartment() -> Compartment {
        let mut c = Compartment::new();
        c.add(Mechanism::Capacitance {
            capacitance: ParameterInterval::new(1.0, 1.0).unwrap(),
        })
        .unwrap();
        c
    }

    fn pair() -> (Neuron, ResourceManager, [CompartmentOnNeuron; 2]) {
        let mut neuron = Neuron::new();
        let a = neuron.add_compartment(single_circuit_compartment());
        let b = neuron.add_compartment(single_circuit_compartment());
        neuron
            .add_compartment_connection(a, b, CompartmentConnection::default())
            .unwrap();
        let resources = ResourceManager::from_neuron(&neuron, &Environment::new()).unwrap();
        (neuron, resources, [a, b])
    }

    fn paired_grid(y: usize, tags: [CompartmentOnNeuron; 2]) -> CoordinateSystem {
        let mut cs = CoordinateSystem::new();
        cs.assign_compartment_adjacent(0, y, tags[0]).unwrap();
        cs.assign_compartment_adjacent(1, y, tags[1]).unwrap();
        cs.connect_shared(0, 1, y).unwrap();
        cs
    }

    #[test]
    fn perfect_placement_scores_full_marks() {
        let (neuron, resources, tags) = pair();
        let cs = paired_grid(0, tags);
        let score = fitness(&cs, &neuron, &resources, &Environment::new()).unwrap();
        assert_eq!(score.compartments, 1.0);
        assert_eq!(score.connections, 1.0);
        assert_eq!(score.resources, 1.0);
        assert_eq!(score.isomorphism, 1.0);
        assert_eq!(score.recording, 1.0);
        assert_eq!(score.combined(), 460.0);
    }

    #[test]
    fn empty_grid_scores_near_zero() {
        let (neuron, resources, _) = pair();
        let cs = CoordinateSystem::new();
        let score = fitness(&cs, &neuron, &resources, &Environment::new()).unwrap();
        assert_eq!(score.isomorphism, 0.0);
        assert!(score.combined() < 50.0);
    }

    #[test]
    fn recording_needs_a_top_row_circuit() {
        let (neuron, resources, tags) = pair();
        let mut environment = Environment::new();
        environment.record(tags[0]);

        let top = paired_grid(0, tags);
        let bottom = paired_grid(1, tags);
        let top_score = fitness(&top, &neuron, &resources, &environment).unwrap();
        let bottom_score = fitness(&bottom, &neuron, &resources, &environment).unwrap();
        assert_eq!(top_score.recording, 1.0);
        assert_eq!(bottom_score.recording, 0.0);
        assert!(top_score.combined() > bottom_score.combined());
    }

    #[test]
    fn over_allocation_erodes_the_resource_score() {
        let (neuron, resources, tags) = pair();
        let mut cs = paired_grid(0, tags);
        // Four extra circuits claimed by the first compartment.
        for x in 3..7 {
            cs.assign_compartment_adjacent(x, 0, tags[0]).unwrap();
        }
        let wide = fitness(&cs, &neuron, &resources, &Environment::new()).unwrap();
        assert!(wide.resources < 1.0);
        assert_eq!(wide.isomorphism, 1.0);
    }

    #[test]
    fn run_is_not_implemented_yet() {
        let (neuron, resources, _) = pair();
        let mut algorithm = Evolutionary::default();
        assert_eq!(
            algorithm.run(CoordinateSystem::new(), &neuron, &resources),
            Err(PlacementError::UnimplementedAlgorithm)
        );
    }
}
