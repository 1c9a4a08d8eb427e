// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
The placement strategy interface and checks shared by all strategies.

A strategy consumes a neuron graph plus its resource requirements and
produces an [`AlgorithmResult`]. Strategies are stateful across steps, so the
trait exposes [`PlacementAlgorithm::reset`] and a [`PlacementAlgorithm::fresh`]
constructor yielding an unused instance with the same parameters.

[`valid`] is the single source of truth for whether a grid configuration
implements a neuron: every strategy's output is judged by it.
*/

use ahash::AHashMap;
use tracing::trace;

use neurocarto_model::{
    Compartment, CompartmentConnection, CompartmentOnNeuron, Neuron, NumberTopBottom,
    ResourceManager,
};

use crate::error::PlacementResult;
use crate::grid::{CoordinateSystem, GRID_COLUMNS, GRID_ROWS};
use crate::result::AlgorithmResult;

/// A placement strategy.
pub trait PlacementAlgorithm {
    /// Places `neuron` onto the grid, starting from the `initial`
    /// configuration. Implementations run to completion or fail; partial
    /// progress is visible through the returned snapshot.
    fn run(
        &mut self,
        initial: CoordinateSystem,
        neuron: &Neuron,
        resources: &ResourceManager,
    ) -> PlacementResult<AlgorithmResult>;

    /// Drops all run state, keeping the parameters.
    fn reset(&mut self);

    /// An unused instance with the same parameters.
    fn fresh(&self) -> Box<dyn PlacementAlgorithm>;
}

/// Checks that the grid configuration implements `neuron` exactly: no
/// dangling or invalid switches, every compartment covered by its required
/// circuits, compartment interiors fully connected, and the conductance
/// connections matching the graph one to one.
pub fn valid(
    coordinate_system: &CoordinateSystem,
    neuron: &Neuron,
    resources: &ResourceManager,
) -> PlacementResult<bool> {
    if coordinate_system.has_empty_connections(GRID_COLUMNS)? {
        trace!("invalid: empty connections");
        return Ok(false);
    }
    if coordinate_system.double_switch(GRID_COLUMNS)? {
        trace!("invalid: double shared attachment");
        return Ok(false);
    }
    if coordinate_system.short_circuit(GRID_COLUMNS)? {
        trace!("invalid: short circuit");
        return Ok(false);
    }

    let allocated = coordinate_system.allocated_resources(GRID_COLUMNS)?;
    if allocated.len() != neuron.num_compartments() {
        trace!("invalid: compartment count mismatch");
        return Ok(false);
    }
    for compartment in resources.compartments() {
        let required = resources.get_config(compartment)?;
        let granted = allocated.get(&compartment).copied().unwrap_or_default();
        if required.exceeds_any(&granted) {
            trace!(?compartment, "invalid: resources exceeded");
            return Ok(false);
        }
    }

    // Interior completeness: circuits of one compartment that sit next to
    // each other must be wired together; circuits of different compartments
    // must not be.
    for y in 0..GRID_ROWS {
        for x in 0..GRID_COLUMNS - 1 {
            let a = coordinate_system.compartment(x, y)?;
            let b = coordinate_system.compartment(x + 1, y)?;
            let wired = coordinate_system.connected_right(x, y);
            match (a, b) {
                (Some(a), Some(b)) if a == b && !wired => return Ok(false),
                (Some(a), Some(b)) if a != b && wired => return Ok(false),
                (None, _) | (_, None) if wired => return Ok(false),
                _ => {}
            }
        }
    }
    for x in 0..GRID_COLUMNS {
        let top = coordinate_system.compartment(x, 0)?;
        let bottom = coordinate_system.compartment(x, 1)?;
        let wired = coordinate_system.connected_top_bottom(x);
        match (top, bottom) {
            (Some(a), Some(b)) if a == b && !wired => return Ok(false),
            (Some(a), Some(b)) if a != b && wired => return Ok(false),
            (None, _) | (_, None) if wired => return Ok(false),
            _ => {}
        }
    }

    // Conductance connections between tagged circuits, deduplicated per
    // compartment pair, must match the graph connections.
    let mut pairs: Vec<(CompartmentOnNeuron, CompartmentOnNeuron)> = Vec::new();
    for y in 0..GRID_ROWS {
        for x in 0..GRID_COLUMNS {
            let Some(a) = coordinate_system.compartment(x, y)? else { continue };
            for partner in coordinate_system.connected_shared_conductance(x, y) {
                let Some(b) = coordinate_system.compartment(partner, y)? else { continue };
                if a == b {
                    // A conductance attachment within one compartment is a
                    // wasted switch, not a connection.
                    return Ok(false);
                }
                let pair = (a.min(b), a.max(b));
                if !pairs.contains(&pair) {
                    pairs.push(pair);
                }
            }
        }
    }
    if pairs.len() != neuron.num_compartment_connections() {
        trace!("invalid: connection count mismatch");
        return Ok(false);
    }
    for (a, b) in &pairs {
        if !neuron.connected(*a, *b) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Ratio of required circuits to allocated circuits; 1.0 means no circuit is
/// wasted.
pub fn resource_efficiency(
    coordinate_system: &CoordinateSystem,
    resources: &ResourceManager,
) -> PlacementResult<f64> {
    let allocated: NumberTopBottom = coordinate_system
        .allocated_resources(GRID_COLUMNS)?
        .values()
        .copied()
        .sum();
    if allocated.total == 0 {
        return Ok(0.0);
    }
    Ok(resources.total().total as f64 / allocated.total as f64)
}

/// Neuron constructed from the grid tags: one compartment per distinct tag,
/// one connection per conductance-coupled tag pair.
pub struct ConstructedNeuron {
    pub neuron: Neuron,
    /// Grid tag to constructed compartment.
    pub compartments: AHashMap<CompartmentOnNeuron, CompartmentOnNeuron>,
    /// Circuits claimed per constructed compartment.
    pub allocated: AHashMap<CompartmentOnNeuron, NumberTopBottom>,
}

/// Reads the neuron implemented by the grid back out of the tags.
pub fn construct_neuron(
    coordinate_system: &CoordinateSystem,
    x_max: usize,
) -> PlacementResult<ConstructedNeuron> {
    let mut neuron = Neuron::new();
    let mut compartments: AHashMap<CompartmentOnNeuron, CompartmentOnNeuron> = AHashMap::new();
    let mut allocated: AHashMap<CompartmentOnNeuron, NumberTopBottom> = AHashMap::new();
    for (tag, circuits) in coordinate_system.allocated_resources(x_max)? {
        let built = neuron.add_compartment(Compartment::default());
        compartments.insert(tag, built);
        allocated.insert(built, circuits);
    }
    for x in 0..x_max {
        for y in 0..GRID_ROWS {
            let Some(a) = coordinate_system.compartment(x, y)? else { continue };
            for partner in coordinate_system.connected_shared_conductance(x, y) {
                let Some(b) = coordinate_system.compartment(partner, y)? else { continue };
                if a == b {
                    continue;
                }
                let (Some(ba), Some(bb)) = (compartments.get(&a), compartments.get(&b)) else {
                    continue;
                };
                let (ba, bb) = (*ba, *bb);
                if neuron.connection_between(ba, bb).is_none() {
                    neuron.add_compartment_connection(
                        ba,
                        bb,
                        CompartmentConnection::default(),
                    )?;
                }
            }
        }
    }
    Ok(ConstructedNeuron { neuron, compartments, allocated })
}

/// Matches the constructed grid neuron against `neuron`, requiring every
/// matched target compartment to fit into the circuits of its image. Returns
/// the number of unmatched target compartments and the mapping from grid tags
/// to target compartments.
pub fn isomorphism_resources(
    coordinate_system: &CoordinateSystem,
    neuron: &Neuron,
    resources: &ResourceManager,
    x_max: usize,
) -> PlacementResult<(usize, AHashMap<CompartmentOnNeuron, CompartmentOnNeuron>)> {
    let constructed = construct_neuron(coordinate_system, x_max)?;
    let allocated = &constructed.allocated;
    let (nulls, mapping) = constructed.neuron.subgraph_isomorphism(neuron, |built, target| {
        let Ok(required) = resources.get_config(target) else {
            return false;
        };
        let granted = allocated.get(&built).copied().unwrap_or_default();
        !required.exceeds_any(&granted)
    });
    // Express the mapping in terms of grid tags.
    let mut by_tag = AHashMap::new();
    for (tag, built) in &constructed.compartments {
        if let Some(target) = mapping.get(built) {
            by_tag.insert(*tag, *target);
        }
    }
    Ok((nulls, by_tag))
}

/// Circuit coordinates per compartment, column-major, for handing a finished
/// placement to the routing stage.
pub fn to_logical_compartments(
    coordinate_system: &CoordinateSystem,
    neuron: &Neuron,
) -> AHashMap<CompartmentOnNeuron, Vec<(usize, usize)>> {
    neuron
        .compartments()
        .map(|c| (c, coordinate_system.find_neuron_circuits(c)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurocarto_model::{Environment, Mechanism, ParameterInterval};

    fn single_circuit_compartment() -> Compartment {
        let mut c = Compartment::new();
        c.add(Mechanism::Capacitance {
            capacitance: ParameterInterval::new(1.0, 1.0).unwrap(),
        })
        .unwrap();
        c
    }

    fn two_compartment_neuron() -> (Neuron, ResourceManager, [CompartmentOnNeuron; 2]) {
        let mut neuron = Neuron::new();
        let a = neuron.add_compartment(single_circuit_compartment());
        let b = neuron.add_compartment(single_circuit_compartment());
        neuron
            .add_compartment_connection(a, b, CompartmentConnection::default())
            .unwrap();
        let resources = ResourceManager::from_neuron(&neuron, &Environment::new()).unwrap();
        (neuron, resources, [a, b])
    }

    /// Two adjacent circuits, shared-line connected.
    fn place_two(cs: &mut CoordinateSystem, a: CompartmentOnNeuron, b: CompartmentOnNeuron) {
        cs.assign_compartment_adjacent(0, 0, a).unwrap();
        cs.assign_compartment_adjacent(1, 0, b).unwrap();
        cs.connect_shared(0, 1, 0).unwrap();
    }

    #[test]
    fn minimal_valid_placement() {
        let (neuron, resources, [a, b]) = two_compartment_neuron();
        let mut cs = CoordinateSystem::new();
        place_two(&mut cs, a, b);
        assert!(valid(&cs, &neuron, &resources).unwrap());
    }

    #[test]
    fn missing_connection_is_invalid() {
        let (neuron, resources, [a, b]) = two_compartment_neuron();
        let mut cs = CoordinateSystem::new();
        cs.assign_compartment_adjacent(0, 0, a).unwrap();
        cs.assign_compartment_adjacent(2, 0, b).unwrap();
        assert!(!valid(&cs, &neuron, &resources).unwrap());
    }

    #[test]
    fn split_compartment_is_invalid() {
        let (neuron, resources, [a, b]) = two_compartment_neuron();
        let mut cs = CoordinateSystem::new();
        place_two(&mut cs, a, b);
        // A second, unwired circuit of compartment a next to its first.
        let mut cell = cs.get(0, 1).unwrap();
        cell.compartment = Some(a);
        cs.set(0, 1, cell).unwrap();
        assert!(!valid(&cs, &neuron, &resources).unwrap());
    }

    #[test]
    fn under_allocation_is_invalid() {
        let mut neuron = Neuron::new();
        let mut config = Compartment::new();
        config
            .add(Mechanism::Capacitance {
                capacitance: ParameterInterval::new(1.0, 1.0).unwrap(),
            })
            .unwrap();
        config
            .add(Mechanism::SynapticInputCurrent {
                time_constant: ParameterInterval::new(1.0, 1.0).unwrap(),
            })
            .unwrap();
        let a = neuron.add_compartment(config);
        let mut env = Environment::new();
        env.add(
            a,
            neurocarto_model::SynapticInputEnvironment {
                kind: neurocarto_model::SynapticInputKind::Current,
                excitatory: true,
                inputs: NumberTopBottom::new(512, 0, 0).unwrap(),
            },
        );
        let resources = ResourceManager::from_neuron(&neuron, &env).unwrap();
        assert_eq!(resources.get_config(a).unwrap().total, 2);

        let mut cs = CoordinateSystem::new();
        cs.assign_compartment_adjacent(0, 0, a).unwrap();
        assert!(!valid(&cs, &neuron, &resources).unwrap());

        cs.set_switch_right(0, 0, true).unwrap();
        cs.assign_compartment_adjacent(1, 0, a).unwrap();
        assert!(valid(&cs, &neuron, &resources).unwrap());
    }

    #[test]
    fn efficiency_of_exact_placement_is_one() {
        let (neuron, resources, [a, b]) = two_compartment_neuron();
        let mut cs = CoordinateSystem::new();
        place_two(&mut cs, a, b);
        let _ = &neuron;
        assert!((resource_efficiency(&cs, &resources).unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn construct_neuron_reads_back_tags() {
        let (neuron, _, [a, b]) = two_compartment_neuron();
        let mut cs = CoordinateSystem::new();
        place_two(&mut cs, a, b);
        let constructed = construct_neuron(&cs, GRID_COLUMNS).unwrap();
        assert_eq!(constructed.neuron.num_compartments(), 2);
        assert_eq!(constructed.neuron.num_compartment_connections(), 1);
        let _ = &neuron;
    }

    #[test]
    fn isomorphism_resources_maps_tags_to_targets() {
        let (neuron, resources, [a, b]) = two_compartment_neuron();
        // Place under fresh tags, as an exhaustive search would.
        let mut scratch = Neuron::new();
        let ta = scratch.add_compartment(Compartment::default());
        let tb = scratch.add_compartment(Compartment::default());
        let mut cs = CoordinateSystem::new();
        place_two(&mut cs, ta, tb);
        let (nulls, mapping) = isomorphism_resources(&cs, &neuron, &resources, GRID_COLUMNS)
            .unwrap();
        assert_eq!(nulls, 0);
        let mapped: Vec<_> = [mapping[&ta], mapping[&tb]].to_vec();
        assert!(mapped.contains(&a) && mapped.contains(&b));
    }

    #[test]
    fn logical_compartments_list_circuits() {
        let (neuron, _, [a, b]) = two_compartment_neuron();
        let mut cs = CoordinateSystem::new();
        place_two(&mut cs, a, b);
        let logical = to_logical_compartments(&cs, &neuron);
        assert_eq!(logical[&a], vec![(0, 0)]);
        assert_eq!(logical[&b], vec![(1, 0)]);
    }
}
