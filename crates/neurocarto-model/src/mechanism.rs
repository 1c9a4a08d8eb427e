// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
Mechanisms and the hardware demands they induce.

A mechanism describes a biological property of a compartment (its membrane
capacitance, a synaptic input site). Given the synaptic environment of the
network, each mechanism translates into a list of hardware resource units plus
optional row constraints, summarized in [`HardwareResourcesWithConstraints`].
*/

use serde::{Deserialize, Serialize};

use crate::compartment::Compartment;
use crate::environment::{Environment, SynapticInputKind};
use crate::error::{ModelError, ModelResult};
use crate::graph::CompartmentOnNeuron;
use crate::number::NumberTopBottom;

/// Synapses a single neuron circuit can receive on its column.
pub const SYNAPSES_PER_CIRCUIT: usize = 256;

/// Closed interval of an analog model parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterInterval {
    lower: f64,
    upper: f64,
}

impl ParameterInterval {
    pub fn new(lower: f64, upper: f64) -> ModelResult<Self> {
        if lower > upper {
            return Err(ModelError::InvalidParameterInterval);
        }
        Ok(Self { lower, upper })
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }
}

/// Discriminant of the closed mechanism set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MechanismKind {
    Capacitance,
    SynapticInputCurrent,
    SynapticInputConductance,
}

/// One unit of demand on a neuron circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HardwareResourceKind {
    /// Membrane capacity of one circuit.
    Capacity,
    /// One circuit worth of excitatory synaptic fan-in.
    SynapticInputExcitatory,
    /// One circuit worth of inhibitory synaptic fan-in.
    SynapticInputInhibitory,
}

/// Row-placement constraint attached to a mechanism's resource request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareConstraint {
    pub kind: MechanismKind,
    pub numbers: NumberTopBottom,
}

/// Resource units and constraints requested by one mechanism.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareResourcesWithConstraints {
    pub resources: Vec<HardwareResourceKind>,
    pub constraints: Vec<HardwareConstraint>,
}

/// A mechanism placed on a compartment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mechanism {
    Capacitance {
        capacitance: ParameterInterval,
    },
    SynapticInputCurrent {
        time_constant: ParameterInterval,
    },
    SynapticInputConductance {
        time_constant: ParameterInterval,
    },
}

impl Mechanism {
    pub fn kind(&self) -> MechanismKind {
        match self {
            Mechanism::Capacitance { .. } => MechanismKind::Capacitance,
            Mechanism::SynapticInputCurrent { .. } => MechanismKind::SynapticInputCurrent,
            Mechanism::SynapticInputConductance { .. } => MechanismKind::SynapticInputConductance,
        }
    }

    /// A compartment carries at most one mechanism of each kind.
    pub fn conflicts(&self, other: &Mechanism) -> bool {
        self.kind() == other.kind()
    }

    /// Hardware demand of this mechanism on `compartment` given the synaptic
    /// `environment` of the surrounding network.
    pub fn hardware(
        &self,
        compartment: CompartmentOnNeuron,
        _config: &Compartment,
        environment: &Environment,
    ) -> ModelResult<HardwareResourcesWithConstraints> {
        match self {
            Mechanism::Capacitance { .. } => Ok(HardwareResourcesWithConstraints {
                resources: vec![HardwareResourceKind::Capacity],
                constraints: Vec::new(),
            }),
            Mechanism::SynapticInputCurrent { .. } => {
                synaptic_hardware(compartment, environment, SynapticInputKind::Current)
            }
            Mechanism::SynapticInputConductance { .. } => {
                synaptic_hardware(compartment, environment, SynapticInputKind::Conductance)
            }
        }
    }
}

/// Circuits needed to take up `inputs` synapses, rounding up.
fn circuits_for(inputs: usize) -> usize {
    inputs / SYNAPSES_PER_CIRCUIT + usize::from(inputs % SYNAPSES_PER_CIRCUIT != 0)
}

fn synaptic_hardware(
    compartment: CompartmentOnNeuron,
    environment: &Environment,
    input_kind: SynapticInputKind,
) -> ModelResult<HardwareResourcesWithConstraints> {
    let records = environment.get(compartment)?;
    let mut out = HardwareResourcesWithConstraints::default();
    let constraint_kind = match input_kind {
        SynapticInputKind::Current => MechanismKind::SynapticInputCurrent,
        SynapticInputKind::Conductance => MechanismKind::SynapticInputConductance,
    };
    for record in records.iter().filter(|r| r.kind == input_kind) {
        // Even an input count of zero occupies one circuit: the synaptic
        // input OTA of the circuit is enabled for it.
        let circuits = circuits_for(record.inputs.total).max(1);
        if record.inputs.top != 0 || record.inputs.bottom != 0 {
            let increment = NumberTopBottom {
                total: circuits,
                top: circuits_for(record.inputs.top),
                bottom: circuits_for(record.inputs.bottom),
            };
            match out.constraints.iter_mut().find(|c| c.kind == constraint_kind) {
                Some(existing) => existing.numbers += increment,
                None => out
                    .constraints
                    .push(HardwareConstraint { kind: constraint_kind, numbers: increment }),
            }
        }
        let resource = if record.excitatory {
            HardwareResourceKind::SynapticInputExcitatory
        } else {
            HardwareResourceKind::SynapticInputInhibitory
        };
        out.resources.extend(std::iter::repeat(resource).take(circuits));
    }
    Ok(out)
}
