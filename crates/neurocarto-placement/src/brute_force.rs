// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
Exhaustive switch-state search.

The grid is treated as an odometer over the valid switch states of its cells,
visited in column-major order. Low cells cycle fastest, and the scanned window
widens as the odometer carries into higher cells, so small configurations near
the origin are found first. The odometer starts from the supplied initial
configuration, so a search can resume where an earlier one left off. Every
state is checked for implementing the target neuron; the first hit wins.

The search is complete but exponential, so it is only practical for small
neurons and narrow column limits. A wall-clock limit caps both modes; on
timeout the run reports `finished` with an empty grid, which callers detect
through the missing compartments.

In parallel mode the cells above `parallel_index_min` form an outer odometer
producing starting states, and a worker per starting state sweeps the cells
below it.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info};

use neurocarto_model::{Compartment, Neuron, ResourceManager};

use crate::algorithm::{isomorphism_resources, construct_neuron, PlacementAlgorithm};
use crate::circuit::NUM_SWITCH_STATES;
use crate::error::{PlacementError, PlacementResult};
use crate::grid::{CoordinateSystem, GRID_COLUMNS};
use crate::result::AlgorithmResult;

/// Search-space bounds of the exhaustive search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BruteForceParameters {
    /// Columns the search may use, at most half the grid.
    pub x_limit: usize,
    /// Number of parallel starting states; zero runs single-threaded.
    pub parallel_runs: usize,
    /// Wall-clock budget for the whole search.
    pub time_limit: Duration,
    /// First cell index owned by the outer odometer in parallel mode.
    pub parallel_index_min: usize,
}

impl Default for BruteForceParameters {
    fn default() -> Self {
        Self {
            x_limit: GRID_COLUMNS / 2,
            parallel_runs: 0,
            time_limit: Duration::from_secs(60),
            parallel_index_min: 5,
        }
    }
}

/// Exhaustive placement strategy.
#[derive(Debug, Clone, Default)]
pub struct BruteForce {
    parameters: BruteForceParameters,
    results: Vec<AlgorithmResult>,
}

impl BruteForce {
    pub fn new(parameters: BruteForceParameters) -> PlacementResult<Self> {
        if parameters.x_limit > GRID_COLUMNS / 2 {
            return Err(PlacementError::ColumnLimitOutOfRange { x_max: parameters.x_limit });
        }
        Ok(Self { parameters, results: Vec::new() })
    }

    pub fn results(&self) -> &[AlgorithmResult] {
        &self.results
    }

    /// Cells in odometer order: column-major, rows within a column first.
    fn cells(&self) -> Vec<(usize, usize)> {
        (0..self.parameters.x_limit).flat_map(|x| [(x, 0), (x, 1)]).collect()
    }

    /// A circuit takes part in a compartment when its membrane connects to
    /// anything: a direct neighbour or the shared line. A closed shared
    /// switch alone only routes the line over the circuit.
    fn membrane_connected(coordinate_system: &CoordinateSystem, x: usize, y: usize) -> bool {
        let cell = match coordinate_system.get(x, y) {
            Ok(cell) => cell,
            Err(_) => return false,
        };
        coordinate_system.connected_right(x, y)
            || coordinate_system.connected_left(x, y)
            || coordinate_system.connected_top_bottom(x)
            || cell.attached_to_shared()
    }

    /// Tests one switch configuration. On success returns the grid with its
    /// cells tagged by the target compartments.
    fn check(
        coordinate_system: &CoordinateSystem,
        neuron: &Neuron,
        resources: &ResourceManager,
        x_max: usize,
    ) -> PlacementResult<Option<CoordinateSystem>> {
        if coordinate_system.has_empty_connections(x_max)?
            || coordinate_system.double_switch(x_max)?
        {
            return Ok(None);
        }
        let mut temp = coordinate_system.clone();
        let mut scratch = Neuron::new();
        for x in 0..x_max {
            for y in 0..2 {
                if temp.compartment(x, y)?.is_none() && Self::membrane_connected(&temp, x, y) {
                    let tag = scratch.add_compartment(Compartment::default());
                    temp.assign_compartment_adjacent(x, y, tag)?;
                }
            }
        }
        if scratch.num_compartments() != neuron.num_compartments() {
            return Ok(None);
        }
        if temp.short_circuit(x_max)? {
            return Ok(None);
        }
        let constructed = construct_neuron(&temp, x_max)?;
        if constructed.neuron.num_compartment_connections() != neuron.num_compartment_connections()
        {
            return Ok(None);
        }
        let (nulls, mapping) = isomorphism_resources(&temp, neuron, resources, x_max)?;
        if nulls != 0 {
            return Ok(None);
        }
        temp.retag_compartments(&mapping);
        Ok(Some(temp))
    }

    /// Advances the odometer over `cells`, growing `index_max` on carries.
    /// Returns `false` when the whole space is exhausted.
    fn advance(
        coordinate_system: &mut CoordinateSystem,
        cells: &[(usize, usize)],
        index_max: &mut usize,
    ) -> PlacementResult<bool> {
        let mut index = 0;
        loop {
            let (x, y) = cells[index];
            let mut cell = coordinate_system.get(x, y)?;
            let wrapped = cell.advance();
            coordinate_system.set(x, y, cell)?;
            if !wrapped {
                if index + 1 > *index_max {
                    *index_max = index + 1;
                }
                return Ok(true);
            }
            index += 1;
            if index >= cells.len() {
                return Ok(false);
            }
        }
    }

    fn finish(&mut self, coordinate_system: CoordinateSystem, neuron: &Neuron) -> AlgorithmResult {
        let placed_compartments = neuron.compartments().collect();
        let result = AlgorithmResult {
            coordinate_system,
            placed_compartments,
            finished: true,
        };
        self.results.push(result.clone());
        result
    }

    /// Timeout sentinel: finished, but nothing placed.
    fn give_up(&mut self) -> AlgorithmResult {
        info!("search budget exhausted");
        let result = AlgorithmResult {
            coordinate_system: CoordinateSystem::new(),
            placed_compartments: Vec::new(),
            finished: true,
        };
        self.results.push(result.clone());
        result
    }

    fn run_single(
        &mut self,
        initial: CoordinateSystem,
        neuron: &Neuron,
        resources: &ResourceManager,
    ) -> PlacementResult<AlgorithmResult> {
        let cells = self.cells();
        let start = Instant::now();
        let mut coordinate_system = initial;
        let mut index_max = 1;
        let mut states: u64 = 0;
        loop {
            let x_max = (index_max / 2 + 2).min(self.parameters.x_limit);
            if let Some(tagged) = Self::check(&coordinate_system, neuron, resources, x_max)? {
                debug!(states, "exhaustive search succeeded");
                return Ok(self.finish(tagged, neuron));
            }
            if !Self::advance(&mut coordinate_system, &cells, &mut index_max)? {
                return Ok(self.give_up());
            }
            states += 1;
            if states % 1024 == 0 && start.elapsed() > self.parameters.time_limit {
                return Ok(self.give_up());
            }
        }
    }

    fn run_parallel(
        &mut self,
        initial: CoordinateSystem,
        neuron: &Neuron,
        resources: &ResourceManager,
    ) -> PlacementResult<AlgorithmResult> {
        let cells = self.cells();
        let index_min = self.parameters.parallel_index_min.min(cells.len());
        if index_min == 0 {
            return self.run_single(initial, neuron, resources);
        }
        let budget: u64 = (NUM_SWITCH_STATES as u64).saturating_pow(index_min as u32);
        let start = Instant::now();
        let stop = AtomicBool::new(false);
        let mut outer = initial;
        let mut outer_index_max = index_min + 1;
        loop {
            // One batch of starting states from the outer odometer.
            let mut starts: Vec<CoordinateSystem> = Vec::new();
            let mut exhausted = false;
            for _ in 0..self.parameters.parallel_runs.max(1) {
                if starts.contains(&outer) {
                    return Err(PlacementError::DuplicateParallelState);
                }
                starts.push(outer.clone());
                if !Self::advance(
                    &mut outer,
                    &cells[index_min..],
                    &mut outer_index_max,
                )? {
                    exhausted = true;
                    break;
                }
            }
            let found = starts
                .par_iter()
                .find_map_any(|state| {
                    let mut local = state.clone();
                    let mut local_index_max = 1;
                    for _ in 0..budget {
                        if stop.load(Ordering::Relaxed) {
                            return None;
                        }
                        let x_max = self.parameters.x_limit;
                        match Self::check(&local, neuron, resources, x_max) {
                            Ok(Some(tagged)) => {
                                stop.store(true, Ordering::Relaxed);
                                return Some(Ok(tagged));
                            }
                            Ok(None) => {}
                            Err(e) => return Some(Err(e)),
                        }
                        match Self::advance(
                            &mut local,
                            &cells[..index_min],
                            &mut local_index_max,
                        ) {
                            Ok(true) => {}
                            Ok(false) => return None,
                            Err(e) => return Some(Err(e)),
                        }
                    }
                    None
                })
                .transpose()?;
            if let Some(tagged) = found {
                return Ok(self.finish(tagged, neuron));
            }
            if exhausted || start.elapsed() > self.parameters.time_limit {
                return Ok(self.give_up());
            }
        }
    }
}

impl PlacementAlgorithm for BruteForce {
    fn run(
        &mut self,
        initial: CoordinateSystem,
        neuron: &Neuron,
        resources: &ResourceManager,
    ) -> PlacementResult<AlgorithmResult> {
        self.reset();
        // Trivial neurons skip the search entirely.
        if neuron.num_compartments() == 1 {
            let compartment = neuron
                .compartments()
                .next()
                .ok_or(neurocarto_model::ModelError::EmptyNeuron)?;
            let required = resources.get_config(compartment)?;
            if required.total <= 1 && required.bottom == 0 {
                let mut coordinate_system = initial;
                coordinate_system.assign_compartment_adjacent(0, 0, compartment)?;
                return Ok(self.finish(coordinate_system, neuron));
            }
        }
        if self.parameters.parallel_runs > 0 {
            self.run_parallel(initial, neuron, resources)
        } else {
            self.run_single(initial, neuron, resources)
        }
    }

    fn reset(&mut self) {
        self.results.clear();
    }

    fn fresh(&self) -> Box<dyn PlacementAlgorithm> {
        Box::new(Self { parameters: self.parameters, results: Vec::new() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::valid;
    use neurocarto_model::{
        CompartmentConnection, Environment, Mechanism, ParameterInterval,
        SynapticInputEnvironment, SynapticInputKind,
    };

    fn circuit_compartment() -> Compartment {
        let mut c = Compartment::new();
        c.add(Mechanism::Capacitance {
            capacitance: ParameterInterval::new(1.0, 1.0).unwrap(),
        })
        .unwrap();
        c
    }

    fn small_parameters() -> BruteForceParameters {
        BruteForceParameters {
            x_limit: 4,
            parallel_runs: 0,
            time_limit: Duration::from_secs(60),
            parallel_index_min: 3,
        }
    }

    #[test]
    fn single_compartment_shortcut() {
        let mut neuron = Neuron::new();
        let c = neuron.add_compartment(circuit_compartment());
        let resources = ResourceManager::from_neuron(&neuron, &Environment::new()).unwrap();
        let mut search = BruteForce::new(small_parameters()).unwrap();
        let result = search.run(CoordinateSystem::new(), &neuron, &resources).unwrap();
        assert!(result.finished);
        assert_eq!(result.coordinate_system.find_neuron_circuits(c), vec![(0, 0)]);
        assert!(valid(&result.coordinate_system, &neuron, &resources).unwrap());
    }

    #[test]
    fn finds_a_two_circuit_compartment() {
        let mut neuron = Neuron::new();
        let mut config = circuit_compartment();
        config
            .add(Mechanism::SynapticInputCurrent {
                time_constant: ParameterInterval::new(1.0, 1.0).unwrap(),
            })
            .unwrap();
        let c = neuron.add_compartment(config);
        let mut env = Environment::new();
        env.add(
            c,
            SynapticInputEnvironment {
                kind: SynapticInputKind::Current,
                excitatory: true,
                inputs: neurocarto_model::NumberTopBottom::new(300, 0, 0).unwrap(),
            },
        );
        let resources = ResourceManager::from_neuron(&neuron, &env).unwrap();
        assert_eq!(resources.get_config(c).unwrap().total, 2);

        let mut search = BruteForce::new(small_parameters()).unwrap();
        let result = search.run(CoordinateSystem::new(), &neuron, &resources).unwrap();
        assert!(result.finished);
        assert_eq!(result.coordinate_system.find_neuron_circuits(c).len(), 2);
        assert!(valid(&result.coordinate_system, &neuron, &resources).unwrap());
    }

    #[test]
    fn finds_a_connected_pair() {
        let mut neuron = Neuron::new();
        let a = neuron.add_compartment(circuit_compartment());
        let b = neuron.add_compartment(circuit_compartment());
        neuron
            .add_compartment_connection(a, b, CompartmentConnection::default())
            .unwrap();
        let resources = ResourceManager::from_neuron(&neuron, &Environment::new()).unwrap();

        let mut search = BruteForce::new(small_parameters()).unwrap();
        let result = search.run(CoordinateSystem::new(), &neuron, &resources).unwrap();
        assert!(result.finished);
        assert!(!result.placed_compartments.is_empty());
        assert!(valid(&result.coordinate_system, &neuron, &resources).unwrap());
    }

    #[test]
    fn parallel_search_agrees_on_validity() {
        let mut neuron = Neuron::new();
        let a = neuron.add_compartment(circuit_compartment());
        let b = neuron.add_compartment(circuit_compartment());
        neuron
            .add_compartment_connection(a, b, CompartmentConnection::default())
            .unwrap();
        let resources = ResourceManager::from_neuron(&neuron, &Environment::new()).unwrap();

        let parameters = BruteForceParameters { parallel_runs: 2, ..small_parameters() };
        let mut search = BruteForce::new(parameters).unwrap();
        let result = search.run(CoordinateSystem::new(), &neuron, &resources).unwrap();
        assert!(result.finished);
        assert!(valid(&result.coordinate_system, &neuron, &resources).unwrap());
    }

    #[test]
    fn timeout_yields_empty_sentinel() {
        // Unsatisfiable demand: more circuits than the window holds.
        let mut neuron = Neuron::new();
        let chain: Vec<_> =
            (0..6).map(|_| neuron.add_compartment(circuit_compartment())).collect();
        for pair in chain.windows(2) {
            neuron
                .add_compartment_connection(pair[0], pair[1], CompartmentConnection::default())
                .unwrap();
        }
        let resources = ResourceManager::from_neuron(&neuron, &Environment::new()).unwrap();
        let parameters = BruteForceParameters {
            x_limit: 2,
            time_limit: Duration::from_millis(200),
            ..small_parameters()
        };
        let mut search = BruteForce::new(parameters).unwrap();
        let result = search.run(CoordinateSystem::new(), &neuron, &resources).unwrap();
        assert!(result.finished);
        assert!(result.placed_compartments.is_empty());
        assert_eq!(result.coordinate_system, CoordinateSystem::new());
    }

    #[test]
    fn resumes_from_a_supplied_configuration() {
        // A pair already wired over the shared line is recognized before a
        // single odometer step.
        let mut neuron = Neuron::new();
        let a = neuron.add_compartment(circuit_compartment());
        let b = neuron.add_compartment(circuit_compartment());
        neuron
            .add_compartment_connection(a, b, CompartmentConnection::default())
            .unwrap();
        let resources = ResourceManager::from_neuron(&neuron, &Environment::new()).unwrap();

        let mut initial = CoordinateSystem::new();
        initial.connect_shared(0, 1, 0).unwrap();
        let mut search = BruteForce::new(small_parameters()).unwrap();
        let result = search.run(initial, &neuron, &resources).unwrap();
        assert!(result.finished);
        assert!(valid(&result.coordinate_system, &neuron, &resources).unwrap());
        // The supplied switch states were kept, only the tags were filled in.
        let placed_a = result.coordinate_system.find_neuron_circuits(a);
        let placed_b = result.coordinate_system.find_neuron_circuits(b);
        assert_eq!(placed_a.len() + placed_b.len(), 2);
        assert!(placed_a.iter().chain(&placed_b).all(|&(x, y)| x <= 1 && y == 0));
    }

    #[test]
    fn rejects_oversized_window() {
        let parameters =
            BruteForceParameters { x_limit: 200, ..BruteForceParameters::default() };
        assert!(BruteForce::new(parameters).is_err());
    }
}
