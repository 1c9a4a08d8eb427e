// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
Aggregation of hardware resource requirements per compartment.

The [`ResourceManager`] asks every mechanism of a compartment for its hardware
demand and condenses the answers into a single [`NumberTopBottom`]
requirement. That triple is what the placement algorithms consume; mechanisms
and the environment are not consulted again after this point.
*/

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::environment::Environment;
use crate::error::{ModelError, ModelResult};
use crate::graph::{CompartmentOnNeuron, Neuron};
use crate::mechanism::{HardwareResourceKind, MechanismKind};
use crate::number::NumberTopBottom;

/// Per-compartment circuit requirements of one neuron.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceManager {
    requirements: AHashMap<CompartmentOnNeuron, NumberTopBottom>,
    total: NumberTopBottom,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a manager covering every compartment of `neuron`.
    pub fn from_neuron(neuron: &Neuron, environment: &Environment) -> ModelResult<Self> {
        let mut manager = Self::new();
        for compartment in neuron.compartments() {
            manager.add_config(compartment, neuron, environment)?;
        }
        Ok(manager)
    }

    /// Computes and stores the requirement of one compartment.
    ///
    /// Resource units are counted per kind; row constraints are accumulated
    /// per constraint kind. The requirement is the componentwise maximum over
    /// all of these partial demands, so independent demands share circuits
    /// where the rows allow it.
    pub fn add_config(
        &mut self,
        compartment: CompartmentOnNeuron,
        neuron: &Neuron,
        environment: &Environment,
    ) -> ModelResult<()> {
        let config = neuron.get(compartment)?;
        let mut units: AHashMap<HardwareResourceKind, usize> = AHashMap::new();
        let mut constrained: AHashMap<MechanismKind, NumberTopBottom> = AHashMap::new();
        for (_, mechanism) in config.mechanisms() {
            let hardware = mechanism.hardware(compartment, config, environment)?;
            for unit in hardware.resources {
                *units.entry(unit).or_default() += 1;
            }
            for constraint in hardware.constraints {
                *constrained.entry(constraint.kind).or_default() += constraint.numbers;
            }
        }
        let mut requirement = NumberTopBottom::zero();
        for count in units.values() {
            requirement = requirement.max(&NumberTopBottom { total: *count, top: 0, bottom: 0 });
        }
        for numbers in constrained.values() {
            requirement = requirement.max(numbers);
        }
        // Componentwise max of valid triples can over-pin the rows.
        let requirement =
            NumberTopBottom::new(requirement.total, requirement.top, requirement.bottom)?;
        debug!(?compartment, ?requirement, "resource requirement computed");
        if let Some(previous) = self.requirements.insert(compartment, requirement) {
            self.total = self.total.saturating_sub(&previous);
        }
        self.total += requirement;
        Ok(())
    }

    pub fn remove_config(&mut self, compartment: CompartmentOnNeuron) -> ModelResult<()> {
        let removed = self
            .requirements
            .remove(&compartment)
            .ok_or(ModelError::MissingResourceConfig(compartment))?;
        self.total = self.total.saturating_sub(&removed);
        Ok(())
    }

    pub fn get_config(&self, compartment: CompartmentOnNeuron) -> ModelResult<NumberTopBottom> {
        self.requirements
            .get(&compartment)
            .copied()
            .ok_or(ModelError::MissingResourceConfig(compartment))
    }

    /// Overrides the stored requirement. Used by placement steps that inflate
    /// demands on a scratch copy.
    pub fn set_config(&mut self, compartment: CompartmentOnNeuron, requirement: NumberTopBottom) {
        if let Some(previous) = self.requirements.insert(compartment, requirement) {
            self.total = self.total.saturating_sub(&previous);
        }
        self.total += requirement;
    }

    /// Compartments with a stored requirement, sorted for determinism.
    pub fn compartments(&self) -> Vec<CompartmentOnNeuron> {
        let mut out: Vec<_> = self.requirements.keys().copied().collect();
        out.sort();
        out
    }

    pub fn total(&self) -> NumberTopBottom {
        self.total
    }

    /// Graphviz rendering of the neuron annotated with requirements.
    pub fn to_graphviz(&self, neuron: &Neuron) -> ModelResult<String> {
        use std::fmt::Write;
        let mut out = String::from("graph neuron {\n");
        for compartment in neuron.compartments() {
            let requirement = self.get_config(compartment)?;
            let _ = writeln!(
                out,
                "    c{} [label=\"{} ({}/{}/{})\"];",
                compartment.index(),
                compartment.index(),
                requirement.total,
                requirement.top,
                requirement.bottom,
            );
        }
        for connection in neuron.compartment_connections() {
            let (a, b) = neuron.connection_endpoints(connection)?;
            let _ = writeln!(out, "    c{} -- c{};", a.index(), b.index());
        }
        out.push_str("}\n");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compartment::Compartment;
    use crate::environment::{SynapticInputEnvironment, SynapticInputKind};
    use crate::mechanism::{Mechanism, ParameterInterval};

    fn interval() -> ParameterInterval {
        ParameterInterval::new(1.0, 1.0).unwrap()
    }

    fn capacitance_compartment() -> Compartment {
        let mut c = Compartment::new();
        c.add(Mechanism::Capacitance { capacitance: interval() }).unwrap();
        c
    }

    #[test]
    fn capacitance_requires_one_circuit() {
        let mut neuron = Neuron::new();
        let c = neuron.add_compartment(capacitance_compartment());
        let manager = ResourceManager::from_neuron(&neuron, &Environment::new()).unwrap();
        assert_eq!(manager.get_config(c).unwrap(), NumberTopBottom::new(1, 0, 0).unwrap());
        assert_eq!(manager.total(), NumberTopBottom::new(1, 0, 0).unwrap());
    }

    #[test]
    fn demands_share_circuits_via_max() {
        let mut neuron = Neuron::new();
        let mut config = capacitance_compartment();
        config
            .add(Mechanism::SynapticInputCurrent { time_constant: interval() })
            .unwrap();
        let c = neuron.add_compartment(config);
        let mut env = Environment::new();
        env.add(
            c,
            SynapticInputEnvironment {
                kind: SynapticInputKind::Current,
                excitatory: true,
                inputs: NumberTopBottom::new(600, 300, 0).unwrap(),
            },
        );
        let manager = ResourceManager::from_neuron(&neuron, &env).unwrap();
        // 3 circuits of synaptic input, 2 pinned to the top row; the
        // capacitance unit shares one of them.
        assert_eq!(manager.get_config(c).unwrap(), NumberTopBottom::new(3, 2, 0).unwrap());
    }

    #[test]
    fn remove_and_missing_config() {
        let mut neuron = Neuron::new();
        let c = neuron.add_compartment(capacitance_compartment());
        let mut manager = ResourceManager::from_neuron(&neuron, &Environment::new()).unwrap();
        manager.remove_config(c).unwrap();
        assert_eq!(manager.total(), NumberTopBottom::zero());
        assert_eq!(manager.get_config(c).unwrap_err(), ModelError::MissingResourceConfig(c));
        assert_eq!(manager.remove_config(c).unwrap_err(), ModelError::MissingResourceConfig(c));
    }

    #[test]
    fn set_config_keeps_total_consistent() {
        let mut neuron = Neuron::new();
        let c = neuron.add_compartment(capacitance_compartment());
        let mut manager = ResourceManager::from_neuron(&neuron, &Environment::new()).unwrap();
        manager.set_config(c, NumberTopBottom::new(4, 2, 2).unwrap());
        assert_eq!(manager.total(), NumberTopBottom::new(4, 2, 2).unwrap());
    }

    #[test]
    fn graphviz_lists_compartments_and_edges() {
        let mut neuron = Neuron::new();
        let a = neuron.add_compartment(capacitance_compartment());
        let b = neuron.add_compartment(capacitance_compartment());
        neuron
            .add_compartment_connection(a, b, crate::graph::CompartmentConnection::default())
            .unwrap();
        let manager = ResourceManager::from_neuron(&neuron, &Environment::new()).unwrap();
        let dot = manager.to_graphviz(&neuron).unwrap();
        assert!(dot.contains("graph neuron"));
        assert!(dot.contains("c0 -- c1"));
    }
}
