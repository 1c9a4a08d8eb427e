// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
Synaptic environment of a neuron within its network.

The environment stores, per compartment, how many synaptic inputs of which
type the surrounding network delivers, plus which compartments are requested
for membrane-voltage recording. It is the external knowledge mechanisms need
to size their hardware demand.
*/

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::graph::CompartmentOnNeuron;
use crate::number::NumberTopBottom;

/// Electrical type of a synaptic input site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SynapticInputKind {
    Current,
    Conductance,
}

/// One synaptic input demand record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynapticInputEnvironment {
    pub kind: SynapticInputKind,
    pub excitatory: bool,
    /// Input counts, split by grid row where the network dictates one.
    pub inputs: NumberTopBottom,
}

/// Synaptic input and recording demands per compartment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    records: AHashMap<CompartmentOnNeuron, Vec<SynapticInputEnvironment>>,
    recorded: AHashSet<CompartmentOnNeuron>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, compartment: CompartmentOnNeuron, record: SynapticInputEnvironment) {
        self.records.entry(compartment).or_default().push(record);
    }

    /// Fails when nothing is known about `compartment`.
    pub fn get(
        &self,
        compartment: CompartmentOnNeuron,
    ) -> ModelResult<&[SynapticInputEnvironment]> {
        match self.records.get(&compartment) {
            Some(records) if !records.is_empty() => Ok(records),
            _ => Err(ModelError::MissingEnvironmentEntry(compartment)),
        }
    }

    /// Marks a compartment for membrane-voltage recording.
    pub fn record(&mut self, compartment: CompartmentOnNeuron) {
        self.recorded.insert(compartment);
    }

    pub fn is_recorded(&self, compartment: CompartmentOnNeuron) -> bool {
        self.recorded.contains(&compartment)
    }

    pub fn recorded(&self) -> impl Iterator<Item = CompartmentOnNeuron> + '_ {
        self.recorded.iter().copied()
    }
}
