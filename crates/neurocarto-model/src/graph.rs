// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
Arena-backed compartment graph.

[`Neuron`] owns compartments and the conductance connections between them.
Elements are addressed through generation-counted descriptors: removing an
element invalidates its descriptor, and a stale descriptor is detected instead
of silently aliasing a reused slot. Descriptors of untouched elements stay
valid across arbitrary mutation.

The graph is undirected and allows at most one connection per compartment
pair. Placement treats neurons as small graphs (tens of compartments), so the
isomorphism searches here use plain backtracking.
*/

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::compartment::Compartment;
use crate::error::{ModelError, ModelResult};
use crate::mechanism::ParameterInterval;

/// Descriptor of a compartment within one [`Neuron`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct CompartmentOnNeuron {
    index: u32,
    generation: u32,
}

impl CompartmentOnNeuron {
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

/// Descriptor of a connection within one [`Neuron`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct CompartmentConnectionOnNeuron {
    index: u32,
    generation: u32,
}

/// Conductance between two connected compartments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompartmentConnection {
    pub conductance: ParameterInterval,
}

/// Neighbours of a compartment, classified by the structure behind them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompartmentNeighbours {
    /// Degree 1.
    pub leafs: Vec<CompartmentOnNeuron>,
    /// Degree 2, heading a run of degree-two compartments that ends at a
    /// leaf.
    pub chains: Vec<CompartmentOnNeuron>,
    /// Degree above 2, or degree 2 with a run leading into a compartment of
    /// degree above 2.
    pub branches: Vec<CompartmentOnNeuron>,
}

impl CompartmentNeighbours {
    pub fn len(&self) -> usize {
        self.leafs.len() + self.chains.len() + self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CompartmentSlot {
    generation: u32,
    entry: Option<CompartmentEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CompartmentEntry {
    compartment: Compartment,
    connections: Vec<CompartmentConnectionOnNeuron>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ConnectionSlot {
    generation: u32,
    entry: Option<ConnectionEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ConnectionEntry {
    endpoints: (CompartmentOnNeuron, CompartmentOnNeuron),
    connection: CompartmentConnection,
}

/// Undirected multicompartment neuron graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Neuron {
    compartments: Vec<CompartmentSlot>,
    connections: Vec<ConnectionSlot>,
    free_compartments: Vec<u32>,
    free_connections: Vec<u32>,
    num_compartments: usize,
    num_connections: usize,
}

impl Neuron {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_compartments(&self) -> usize {
        self.num_compartments
    }

    pub fn num_compartment_connections(&self) -> usize {
        self.num_connections
    }

    pub fn add_compartment(&mut self, compartment: Compartment) -> CompartmentOnNeuron {
        self.num_compartments += 1;
        let entry = CompartmentEntry { compartment, connections: Vec::new() };
        if let Some(index) = self.free_compartments.pop() {
            let slot = &mut self.compartments[index as usize];
            slot.entry = Some(entry);
            CompartmentOnNeuron { index, generation: slot.generation }
        } else {
            let index = self.compartments.len() as u32;
            self.compartments.push(CompartmentSlot { generation: 0, entry: Some(entry) });
            CompartmentOnNeuron { index, generation: 0 }
        }
    }

    /// Removes a compartment together with all its connections.
    pub fn remove_compartment(&mut self, descriptor: CompartmentOnNeuron) -> ModelResult<()> {
        let incident = self.compartment_entry(descriptor)?.connections.clone();
        for connection in incident {
            self.remove_compartment_connection(connection)?;
        }
        let slot = &mut self.compartments[descriptor.index as usize];
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_compartments.push(descriptor.index);
        self.num_compartments -= 1;
        Ok(())
    }

    pub fn get(&self, descriptor: CompartmentOnNeuron) -> ModelResult<&Compartment> {
        Ok(&self.compartment_entry(descriptor)?.compartment)
    }

    pub fn get_mut(&mut self, descriptor: CompartmentOnNeuron) -> ModelResult<&mut Compartment> {
        let slot = self
            .compartments
            .get_mut(descriptor.index as usize)
            .filter(|s| s.generation == descriptor.generation)
            .and_then(|s| s.entry.as_mut())
            .ok_or(ModelError::UnknownCompartment(descriptor))?;
        Ok(&mut slot.compartment)
    }

    pub fn set(
        &mut self,
        descriptor: CompartmentOnNeuron,
        compartment: Compartment,
    ) -> ModelResult<()> {
        *self.get_mut(descriptor)? = compartment;
        Ok(())
    }

    pub fn contains(&self, descriptor: CompartmentOnNeuron) -> bool {
        self.compartment_entry(descriptor).is_ok()
    }

    /// Connects two distinct compartments. At most one connection may exist
    /// per pair.
    pub fn add_compartment_connection(
        &mut self,
        a: CompartmentOnNeuron,
        b: CompartmentOnNeuron,
        connection: CompartmentConnection,
    ) -> ModelResult<CompartmentConnectionOnNeuron> {
        self.compartment_entry(a)?;
        self.compartment_entry(b)?;
        let entry = ConnectionEntry { endpoints: (a, b), connection };
        let descriptor = if let Some(index) = self.free_connections.pop() {
            let slot = &mut self.connections[index as usize];
            slot.entry = Some(entry);
            CompartmentConnectionOnNeuron { index, generation: slot.generation }
        } else {
            let index = self.connections.len() as u32;
            self.connections.push(ConnectionSlot { generation: 0, entry: Some(entry) });
            CompartmentConnectionOnNeuron { index, generation: 0 }
        };
        self.compartment_entry_mut(a)?.connections.push(descriptor);
        self.compartment_entry_mut(b)?.connections.push(descriptor);
        self.num_connections += 1;
        Ok(descriptor)
    }

    pub fn remove_compartment_connection(
        &mut self,
        descriptor: CompartmentConnectionOnNeuron,
    ) -> ModelResult<()> {
        let (a, b) = self.connection_endpoints(descriptor)?;
        for endpoint in [a, b] {
            self.compartment_entry_mut(endpoint)?.connections.retain(|c| *c != descriptor);
        }
        let slot = &mut self.connections[descriptor.index as usize];
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_connections.push(descriptor.index);
        self.num_connections -= 1;
        Ok(())
    }

    pub fn connection(
        &self,
        descriptor: CompartmentConnectionOnNeuron,
    ) -> ModelResult<&CompartmentConnection> {
        Ok(&self.connection_entry(descriptor)?.connection)
    }

    pub fn connection_endpoints(
        &self,
        descriptor: CompartmentConnectionOnNeuron,
    ) -> ModelResult<(CompartmentOnNeuron, CompartmentOnNeuron)> {
        Ok(self.connection_entry(descriptor)?.endpoints)
    }

    /// Compartment descriptors in deterministic slot order.
    pub fn compartments(&self) -> impl Iterator<Item = CompartmentOnNeuron> + '_ {
        self.compartments.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|_| CompartmentOnNeuron {
                index: index as u32,
                generation: slot.generation,
            })
        })
    }

    pub fn compartment_connections(
        &self,
    ) -> impl Iterator<Item = CompartmentConnectionOnNeuron> + '_ {
        self.connections.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|_| CompartmentConnectionOnNeuron {
                index: index as u32,
                generation: slot.generation,
            })
        })
    }

    pub fn neighbours(
        &self,
        descriptor: CompartmentOnNeuron,
    ) -> ModelResult<Vec<CompartmentOnNeuron>> {
        let entry = self.compartment_entry(descriptor)?;
        let mut out = Vec::with_capacity(entry.connections.len());
        for connection in &entry.connections {
            let (a, b) = self.connection_endpoints(*connection)?;
            out.push(if a == descriptor { b } else { a });
        }
        Ok(out)
    }

    pub fn degree(&self, descriptor: CompartmentOnNeuron) -> ModelResult<usize> {
        Ok(self.compartment_entry(descriptor)?.connections.len())
    }

    pub fn connected(&self, a: CompartmentOnNeuron, b: CompartmentOnNeuron) -> bool {
        self.connection_between(a, b).is_some()
    }

    pub fn connection_between(
        &self,
        a: CompartmentOnNeuron,
        b: CompartmentOnNeuron,
    ) -> Option<CompartmentConnectionOnNeuron> {
        let entry = self.compartment_entry(a).ok()?;
        entry.connections.iter().copied().find(|connection| {
            self.connection_endpoints(*connection)
                .map(|(x, y)| (x == a && y == b) || (x == b && y == a))
                .unwrap_or(false)
        })
    }

    /// Splits the neighbours of `of` into leafs, chains and branches,
    /// skipping those for which `skip` holds. A degree-two neighbour counts
    /// as a chain only when its run of degree-two compartments ends at a
    /// leaf; a run into a higher-degree compartment makes it a branch.
    pub fn classify_neighbours<F>(
        &self,
        of: CompartmentOnNeuron,
        skip: F,
    ) -> ModelResult<CompartmentNeighbours>
    where
        F: Fn(CompartmentOnNeuron) -> bool,
    {
        let mut out = CompartmentNeighbours::default();
        for neighbour in self.neighbours(of)? {
            if skip(neighbour) {
                continue;
            }
            match self.degree(neighbour)? {
                0 | 1 => out.leafs.push(neighbour),
                2 => {
                    let run = self.chain_from(neighbour, of)?;
                    let terminal = run.last().copied().unwrap_or(neighbour);
                    if self.degree(terminal)? > 2 {
                        out.branches.push(neighbour);
                    } else {
                        out.chains.push(neighbour);
                    }
                }
                _ => out.branches.push(neighbour),
            }
        }
        Ok(out)
    }

    /// Walks a chain starting at `start`, coming from `from`, until a
    /// compartment of degree other than two is reached (inclusive).
    pub fn chain_from(
        &self,
        start: CompartmentOnNeuron,
        from: CompartmentOnNeuron,
    ) -> ModelResult<Vec<CompartmentOnNeuron>> {
        let mut chain = vec![start];
        let mut previous = from;
        let mut current = start;
        while self.degree(current)? == 2 {
            let next = self
                .neighbours(current)?
                .into_iter()
                .find(|n| *n != previous)
                .ok_or(ModelError::UnknownCompartment(current))?;
            previous = current;
            current = next;
            chain.push(current);
            if chain.len() > self.num_compartments {
                return Err(ModelError::LoopedChain);
            }
        }
        Ok(chain)
    }

    /// All compartments of the branch behind `start`: everything reachable
    /// from `start` without crossing back over `from`, in depth-first
    /// discovery order. The seen list doubles as the cycle guard.
    pub fn branch_compartments(
        &self,
        start: CompartmentOnNeuron,
        from: CompartmentOnNeuron,
    ) -> ModelResult<Vec<CompartmentOnNeuron>> {
        let mut seen = vec![from, start];
        let mut stack = vec![start];
        let mut out = vec![start];
        while let Some(current) = stack.pop() {
            for neighbour in self.neighbours(current)? {
                if !seen.contains(&neighbour) {
                    seen.push(neighbour);
                    out.push(neighbour);
                    stack.push(neighbour);
                }
            }
        }
        Ok(out)
    }

    /// Number of compartments on the branch behind `start`, seen from
    /// `from`.
    pub fn branch_size(
        &self,
        start: CompartmentOnNeuron,
        from: CompartmentOnNeuron,
    ) -> ModelResult<usize> {
        Ok(self.branch_compartments(start, from)?.len())
    }

    /// Searches for a full isomorphism from `self` onto `target`:
    /// a bijection preserving adjacency for which `equivalent` holds on every
    /// mapped pair. Returns the mapping from `self` compartments to `target`
    /// compartments, or `None`.
    pub fn isomorphism<E>(
        &self,
        target: &Neuron,
        equivalent: E,
    ) -> Option<AHashMap<CompartmentOnNeuron, CompartmentOnNeuron>>
    where
        E: Fn(CompartmentOnNeuron, CompartmentOnNeuron) -> bool,
    {
        if self.num_compartments != target.num_compartments
            || self.num_connections != target.num_connections
        {
            return None;
        }
        let (nulls, mapping) = self.subgraph_isomorphism(target, equivalent);
        (nulls == 0).then_some(mapping)
    }

    /// Best partial injection of `self` into `target` preserving adjacency:
    /// every connection between mapped compartments of `self` must map onto a
    /// connection of `target`, and `equivalent` must hold on mapped pairs.
    /// Returns the minimal number of unmatched `target` compartments together
    /// with a mapping attaining it.
    pub fn subgraph_isomorphism<E>(
        &self,
        target: &Neuron,
        equivalent: E,
    ) -> (usize, AHashMap<CompartmentOnNeuron, CompartmentOnNeuron>)
    where
        E: Fn(CompartmentOnNeuron, CompartmentOnNeuron) -> bool,
    {
        let own: Vec<_> = self.compartments().collect();
        let candidates: Vec<_> = target.compartments().collect();
        let mut assignment: Vec<Option<CompartmentOnNeuron>> = vec![None; own.len()];
        let mut best_nulls = target.num_compartments;
        let mut best: AHashMap<_, _> = AHashMap::new();
        self.search_mapping(
            target,
            &equivalent,
            &own,
            &candidates,
            0,
            &mut assignment,
            &mut best_nulls,
            &mut best,
        );
        (best_nulls, best)
    }

    #[allow(clippy::too_many_arguments)]
    fn search_mapping<E>(
        &self,
        target: &Neuron,
        equivalent: &E,
        own: &[CompartmentOnNeuron],
        candidates: &[CompartmentOnNeuron],
        position: usize,
        assignment: &mut Vec<Option<CompartmentOnNeuron>>,
        best_nulls: &mut usize,
        best: &mut AHashMap<CompartmentOnNeuron, CompartmentOnNeuron>,
    ) where
        E: Fn(CompartmentOnNeuron, CompartmentOnNeuron) -> bool,
    {
        if position == own.len() {
            let mapped = assignment.iter().filter(|a| a.is_some()).count();
            let nulls = target.num_compartments - mapped;
            if nulls < *best_nulls {
                *best_nulls = nulls;
                best.clear();
                for (i, slot) in assignment.iter().enumerate() {
                    if let Some(mapped_to) = slot {
                        best.insert(own[i], *mapped_to);
                    }
                }
            }
            return;
        }
        let source = own[position];
        for candidate in candidates {
            if assignment.iter().flatten().any(|used| used == candidate) {
                continue;
            }
            if !equivalent(source, *candidate) {
                continue;
            }
            // Adjacency of already mapped pairs must carry over exactly.
            let consistent = own[..position].iter().enumerate().all(|(i, earlier)| {
                match assignment[i] {
                    Some(mapped_earlier) => {
                        self.connected(source, *earlier)
                            == target.connected(*candidate, mapped_earlier)
                    }
                    None => true,
                }
            });
            if consistent {
                assignment[position] = Some(*candidate);
                self.search_mapping(
                    target, equivalent, own, candidates, position + 1, assignment, best_nulls,
                    best,
                );
                assignment[position] = None;
            }
        }
        // Leaving `source` unmapped is always an option; the mapping then
        // covers fewer target compartments.
        if *best_nulls > 0 {
            self.search_mapping(
                target, equivalent, own, candidates, position + 1, assignment, best_nulls, best,
            );
        }
    }

    fn compartment_entry(
        &self,
        descriptor: CompartmentOnNeuron,
    ) -> ModelResult<&CompartmentEntry> {
        self.compartments
            .get(descriptor.index as usize)
            .filter(|s| s.generation == descriptor.generation)
            .and_then(|s| s.entry.as_ref())
            .ok_or(ModelError::UnknownCompartment(descriptor))
    }

    fn compartment_entry_mut(
        &mut self,
        descriptor: CompartmentOnNeuron,
    ) -> ModelResult<&mut CompartmentEntry> {
        self.compartments
            .get_mut(descriptor.index as usize)
            .filter(|s| s.generation == descriptor.generation)
            .and_then(|s| s.entry.as_mut())
            .ok_or(ModelError::UnknownCompartment(descriptor))
    }

    fn connection_entry(
        &self,
        descriptor: CompartmentConnectionOnNeuron,
    ) -> ModelResult<&ConnectionEntry> {
        self.connections
            .get(descriptor.index as usize)
            .filter(|s| s.generation == descriptor.generation)
            .and_then(|s| s.entry.as_ref())
            .ok_or(ModelError::UnknownCompartmentConnection(descriptor))
    }
}
